use crate::template::WILDCARD;
use crate::watchdog::{Deadline, Watchdog};
use ahash::AHashMap;
use rayon::prelude::*;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Marker returned in place of parameters when extraction exceeds its deadline.
pub const TIMEOUT_SENTINEL: &str = "TIMEOUT";

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(1);

// Separator between template tokens: tokenization consumed the delimiters, so any
// run of non-alphanumerics may stand between two tokens in the raw content.
const SEPARATOR: &str = "[^A-Za-z0-9]+";
const EDGE: &str = "[^A-Za-z0-9]*";
const CAPTURE: &str = "(.*?)";

const REGEX_CACHE_CAPACITY: usize = 4096;

// Lines handed to one watchdog worker at a time during parallel extraction.
const EXTRACTION_CHUNK: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterList {
    Values(Vec<String>),
    TimedOut,
}

impl ParameterList {
    pub fn empty() -> Self {
        ParameterList::Values(Vec::new())
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, ParameterList::TimedOut)
    }

    /// Values as written to output; a timeout renders as the single sentinel.
    pub fn as_values(&self) -> Vec<&str> {
        match self {
            ParameterList::Values(v) => v.iter().map(String::as_str).collect(),
            ParameterList::TimedOut => vec![TIMEOUT_SENTINEL],
        }
    }
}

impl Serialize for ParameterList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_values().serialize(serializer)
    }
}

/// Regex source for a rendered template, or `None` when it has no wildcard.
///
/// Literal tokens are escaped, each `<*>` becomes a lazy capture, every gap between
/// tokens becomes a generic non-alphanumeric separator, and the whole pattern is
/// anchored to the full content.
pub fn template_pattern(template: &str) -> Option<String> {
    let tokens: Vec<&str> = template.split_whitespace().collect();
    if !tokens.contains(&WILDCARD) {
        return None;
    }

    let mut pattern = String::with_capacity(template.len() * 2 + 16);
    pattern.push('^');
    pattern.push_str(EDGE);
    for (i, tok) in tokens.iter().enumerate() {
        if i > 0 {
            pattern.push_str(SEPARATOR);
        }
        if *tok == WILDCARD {
            pattern.push_str(CAPTURE);
        } else {
            pattern.push_str(&regex::escape(tok));
        }
    }
    pattern.push_str(EDGE);
    pattern.push('$');
    Some(pattern)
}

pub fn compile_template(template: &str) -> Result<Option<Regex>, regex::Error> {
    template_pattern(template).map(|p| Regex::new(&p)).transpose()
}

/// Captures the wildcard slots of `content`, trimmed of punctuation and then spaces.
/// A non-matching line yields an empty list.
pub fn extract_with(regex: &Regex, content: &str) -> Vec<String> {
    let Some(caps) = regex.captures(content) else { return Vec::new() };
    caps.iter()
        .skip(1)
        .map(|m| m.map(|m| trim_param(m.as_str())).unwrap_or_default())
        .collect()
}

// Punctuation first, then spaces: " .x" keeps its dot.
fn trim_param(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_ascii_punctuation())
        .trim_matches(' ')
        .to_string()
}

/// One extraction request: the finalized template and the raw content of a line.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionJob<'a> {
    pub template: &'a str,
    pub content: &'a str,
}

/// Template-driven parameter extraction with a per-line deadline.
pub struct ParameterExtractor {
    timeout: Duration,
    // `None` marks templates without wildcards or that failed to compile.
    cache: lru::LruCache<String, Option<Arc<Regex>>>,
}

impl ParameterExtractor {
    pub fn new(timeout: Duration) -> Self {
        let capacity = NonZeroUsize::new(REGEX_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self { timeout, cache: lru::LruCache::new(capacity) }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn regex_for(&mut self, template: &str) -> Option<Arc<Regex>> {
        if let Some(cached) = self.cache.get(template) {
            return cached.clone();
        }
        let compiled = match compile_template(template) {
            Ok(re) => re.map(Arc::new),
            Err(e) => {
                tracing::warn!(template, error = %e, "template regex failed to compile, no parameters extracted");
                None
            }
        };
        self.cache.put(template.to_string(), compiled.clone());
        compiled
    }

    /// Extracts parameters for a single line under the deadline.
    pub fn extract(&mut self, template: &str, content: &str) -> ParameterList {
        let Some(regex) = self.regex_for(template) else { return ParameterList::empty() };
        let mut dog = Watchdog::new(self.timeout);
        run_guarded(&mut dog, regex, content)
    }

    /// Extracts parameters for every job, in input order.
    ///
    /// Regexes are resolved once per distinct template, then lines are processed in
    /// parallel chunks, each chunk with its own watchdog worker.
    pub fn extract_all(&mut self, jobs: &[ExtractionJob<'_>]) -> Vec<ParameterList> {
        let mut regexes: AHashMap<&str, Option<Arc<Regex>>> = AHashMap::new();
        for job in jobs {
            if !regexes.contains_key(job.template) {
                let re = self.regex_for(job.template);
                regexes.insert(job.template, re);
            }
        }

        let timeout = self.timeout;
        let results: Vec<ParameterList> = jobs
            .par_chunks(EXTRACTION_CHUNK)
            .flat_map_iter(|chunk| {
                let mut dog = Watchdog::new(timeout);
                chunk
                    .iter()
                    .map(|job| match regexes.get(job.template).cloned().flatten() {
                        Some(re) => run_guarded(&mut dog, re, job.content),
                        None => ParameterList::empty(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let timed_out = results.iter().filter(|p| p.is_timed_out()).count();
        if timed_out > 0 {
            tracing::warn!(timed_out, total = jobs.len(), "parameter extraction timed out on some lines");
        }
        results
    }
}

fn run_guarded(dog: &mut Watchdog<Vec<String>>, regex: Arc<Regex>, content: &str) -> ParameterList {
    let owned = content.to_string();
    into_parameters(dog.run(move || extract_with(&regex, &owned)), content)
}

fn into_parameters(outcome: Deadline<Vec<String>>, content: &str) -> ParameterList {
    match outcome {
        Deadline::Completed(values) => ParameterList::Values(values),
        Deadline::TimedOut => {
            tracing::debug!(content, "parameter extraction hit its deadline");
            ParameterList::TimedOut
        }
    }
}
