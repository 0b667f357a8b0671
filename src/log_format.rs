//! Line grammar: `<Date> <Time> <Level> <Component>: <Content>` style formats.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Header that carries the free-text message mined for templates.
pub const CONTENT_HEADER: &str = "Content";

static RE_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^<>]+)>").unwrap());
static RE_HEADER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid header name <{0}> in log format")]
    InvalidHeader(String),
    #[error("duplicate header <{0}> in log format")]
    DuplicateHeader(String),
    #[error("log format must contain a <Content> header")]
    MissingContent,
    #[error("log format regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// A line split into its header values, in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLine {
    pub fields: Vec<String>,
    content_idx: usize,
}

impl SplitLine {
    pub fn content(&self) -> &str {
        &self.fields[self.content_idx]
    }
}

#[derive(Debug, Clone)]
pub struct LogFormat {
    headers: Vec<String>,
    content_idx: usize,
    regex: Regex,
}

impl LogFormat {
    /// Compiles a format string. Each `<Header>` becomes a lazy named group; the
    /// literal text between headers is escaped, with runs of spaces matching `\s+`.
    pub fn parse(format: &str) -> Result<Self, FormatError> {
        let mut headers: Vec<String> = Vec::new();
        let mut pattern = String::from("^");
        let mut last = 0;

        for caps in RE_HEADER.captures_iter(format) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else { continue };
            push_literal(&mut pattern, &format[last..whole.start()]);
            let name = name.as_str();
            if !RE_HEADER_NAME.is_match(name) {
                return Err(FormatError::InvalidHeader(name.to_string()));
            }
            if headers.iter().any(|h| h == name) {
                return Err(FormatError::DuplicateHeader(name.to_string()));
            }
            pattern.push_str(&format!("(?P<{name}>.*?)"));
            headers.push(name.to_string());
            last = whole.end();
        }
        push_literal(&mut pattern, &format[last..]);
        pattern.push('$');

        let content_idx = headers
            .iter()
            .position(|h| h == CONTENT_HEADER)
            .ok_or(FormatError::MissingContent)?;
        let regex = Regex::new(&pattern)?;
        Ok(Self { headers, content_idx, regex })
    }

    /// Format where the whole line is the content.
    pub fn content_only() -> Self {
        Self {
            headers: vec![CONTENT_HEADER.to_string()],
            content_idx: 0,
            regex: Regex::new(r"^(?P<Content>.*?)$").unwrap(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Splits a trimmed line into header fields; `None` when the grammar does not match.
    pub fn split(&self, line: &str) -> Option<SplitLine> {
        let caps = self.regex.captures(line.trim())?;
        let fields = self
            .headers
            .iter()
            .map(|h| caps.name(h).map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        Some(SplitLine { fields, content_idx: self.content_idx })
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::content_only()
    }
}

fn push_literal(pattern: &mut String, literal: &str) {
    let mut last = 0;
    for m in RE_SPACES.find_iter(literal) {
        pattern.push_str(&regex::escape(&literal[last..m.start()]));
        pattern.push_str(r"\s+");
        last = m.end();
    }
    pattern.push_str(&regex::escape(&literal[last..]));
}
