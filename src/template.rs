use itertools::Itertools;
use sha2::{Digest, Sha256};
use std::fmt;

/// Rendered form of a wildcard position.
pub const WILDCARD: &str = "<*>";

/// Default number of hex characters kept from the template digest.
pub const DEFAULT_EVENT_ID_LEN: usize = 8;

/// Longest event id we can produce from a SHA-256 hex digest.
pub const MAX_EVENT_ID_LEN: usize = 64;

/// One position of a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    Literal(String),
    Wildcard,
}

impl Token {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Token::Wildcard)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Token::Literal(s) => s,
            Token::Wildcard => WILDCARD,
        }
    }
}

// A wildcard never equals an incoming literal, even the text "<*>".
impl PartialEq<String> for Token {
    fn eq(&self, other: &String) -> bool {
        match self {
            Token::Literal(s) => s == other,
            Token::Wildcard => false,
        }
    }
}

impl PartialEq<Token> for String {
    fn eq(&self, other: &Token) -> bool {
        other == self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Template {
    tokens: Vec<Token>,
}

impl Template {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Template that reproduces `seq` verbatim.
    pub fn from_sequence<S: AsRef<str>>(seq: &[S]) -> Self {
        Self {
            tokens: seq.iter().map(|t| Token::Literal(t.as_ref().to_string())).collect(),
        }
    }

    /// Parses the rendered form back, treating `<*>` as a wildcard.
    pub fn parse(rendered: &str) -> Self {
        Self {
            tokens: rendered
                .split_whitespace()
                .map(|t| if t == WILDCARD { Token::Wildcard } else { Token::Literal(t.to_string()) })
                .collect(),
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Token> {
        self.tokens.get(idx)
    }

    pub fn wildcard_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_wildcard()).count()
    }

    /// True when every literal position of `self` is also a literal of the same value in `other`.
    pub fn is_generalization_of(&self, other: &Template) -> bool {
        self.len() == other.len()
            && self.tokens.iter().zip(&other.tokens).all(|(a, b)| a.is_wildcard() || a == b)
    }

    /// Space-joined rendering used for event ids and regex construction.
    pub fn render(&self) -> String {
        self.tokens.iter().map(Token::as_str).join(" ")
    }

    pub fn event_id(&self, len: usize) -> String {
        event_id(&self.render(), len)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Short hash-derived identifier of a rendered template.
///
/// Truncation means two templates can collide on very large corpora; the id is a
/// correlation key, not a uniqueness guarantee.
pub fn event_id(rendered: &str, len: usize) -> String {
    let digest = format!("{:x}", Sha256::digest(rendered.as_bytes()));
    digest[..len.clamp(1, MAX_EVENT_ID_LEN)].to_string()
}
