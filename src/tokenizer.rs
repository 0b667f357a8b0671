use once_cell::sync::Lazy;
use regex::Regex;

/// Delimiter class used to split content into tokens.
pub const DEFAULT_DELIMITERS: &str = r"[\s=:,]";

/// Replacement for runs of non-ASCII characters.
pub const NON_ASCII_MARKER: &str = "<NASCII>";

static RE_NON_ASCII: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\x00-\x7F]+").unwrap());

#[derive(Debug, Clone)]
pub struct Tokenizer {
    delimiters: Regex,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            delimiters: Regex::new(DEFAULT_DELIMITERS).unwrap(),
        }
    }
}

impl Tokenizer {
    /// Builds a tokenizer splitting on `pattern`, a regex matching one delimiter.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self { delimiters: Regex::new(pattern)? })
    }

    pub fn tokenize(&self, content: &str) -> Vec<String> {
        self.delimiters
            .split(content)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Collapses every run of non-ASCII characters into a single marker.
pub fn replace_non_ascii(line: &str) -> std::borrow::Cow<'_, str> {
    if line.is_ascii() {
        return std::borrow::Cow::Borrowed(line);
    }
    RE_NON_ASCII.replace_all(line, NON_ASCII_MARKER)
}
