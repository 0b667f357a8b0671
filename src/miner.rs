use crate::log_format::{FormatError, LogFormat};
use crate::param_extractor::{ExtractionJob, ParameterExtractor, ParameterList, DEFAULT_EXTRACTION_TIMEOUT};
use crate::persistence::PersistedState;
use crate::registry::{ClusterId, ClusterRegistry, LineId, RegistryError};
use crate::template::{DEFAULT_EVENT_ID_LEN, MAX_EVENT_ID_LEN};
use crate::tokenizer::{self, Tokenizer, DEFAULT_DELIMITERS};
use crate::trie::{TrieIndex, DEFAULT_ANCHOR_DEPTH, MAX_ANCHOR_DEPTH};
use ahash::AHashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_TAU: f64 = 0.5;
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone)]
pub struct MinerOpts {
    /// Minimum LCS length as a fraction of the incoming sequence length.
    pub tau: f64,
    /// Lines longer than this (in bytes) are skipped.
    pub max_line_len: usize,
    pub keep_params: bool,
    pub extraction_timeout: Duration,
    pub event_id_len: usize,
    pub anchor_depth: usize,
    /// Regex matching a single token delimiter.
    pub delimiters: String,
    pub replace_non_ascii: bool,
    /// Line grammar; `None` treats the whole line as content.
    pub log_format: Option<String>,
}

impl Default for MinerOpts {
    fn default() -> Self {
        Self {
            tau: DEFAULT_TAU,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            keep_params: true,
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
            event_id_len: DEFAULT_EVENT_ID_LEN,
            anchor_depth: DEFAULT_ANCHOR_DEPTH,
            delimiters: DEFAULT_DELIMITERS.to_string(),
            replace_non_ascii: true,
            log_format: None,
        }
    }
}

impl MinerOpts {
    pub fn validate(&self) -> Result<(), MinerError> {
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return Err(MinerError::Config(format!("tau must be in (0, 1], got {}", self.tau)));
        }
        if self.max_line_len == 0 {
            return Err(MinerError::Config("max line length must be positive".into()));
        }
        if self.extraction_timeout.is_zero() {
            return Err(MinerError::Config("extraction timeout must be positive".into()));
        }
        if self.event_id_len == 0 || self.event_id_len > MAX_EVENT_ID_LEN {
            return Err(MinerError::Config(format!(
                "event id length must be in 1..={MAX_EVENT_ID_LEN}, got {}",
                self.event_id_len
            )));
        }
        if self.anchor_depth > MAX_ANCHOR_DEPTH {
            return Err(MinerError::Config(format!(
                "anchor depth must be at most {MAX_ANCHOR_DEPTH}, got {}",
                self.anchor_depth
            )));
        }
        Ok(())
    }
}

/// One structured output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedLine {
    pub line_id: LineId,
    /// Header values in format order.
    pub fields: Vec<String>,
    pub event_id: String,
    pub event_template: String,
    /// `None` when parameter extraction is disabled.
    pub parameters: Option<ParameterList>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub event_id: String,
    pub event_template: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub too_long: usize,
    pub unmatched: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.too_long + self.unmatched
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    pub lines: Vec<ParsedLine>,
    /// Every template mined so far, with its total cluster membership size.
    pub events: Vec<EventSummary>,
    pub skipped: SkipCounts,
}

impl BatchOutput {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

struct Prepared {
    fields: Vec<String>,
    content: String,
    tokens: Vec<String>,
}

enum Skip {
    TooLong,
    Unmatched,
}

/// Streaming template miner: preprocesses lines, assigns them to clusters in
/// order, and resolves final templates and parameters per batch.
pub struct LogMiner {
    opts: MinerOpts,
    format: LogFormat,
    tokenizer: Tokenizer,
    registry: ClusterRegistry,
    extractor: ParameterExtractor,
}

impl LogMiner {
    pub fn new(opts: MinerOpts) -> Result<Self, MinerError> {
        opts.validate()?;
        let registry = ClusterRegistry::new(opts.tau, opts.anchor_depth)?;
        Self::with_registry(opts, registry)
    }

    /// Resumes from restored state.
    pub fn with_state(opts: MinerOpts, state: PersistedState) -> Result<Self, MinerError> {
        opts.validate()?;
        let PersistedState { clusters, trie, .. } = state;
        let trie = if trie.anchor_depth() == opts.anchor_depth {
            trie
        } else {
            TrieIndex::from_templates(
                opts.anchor_depth,
                clusters.iter().enumerate().map(|(id, c)| (id, &c.template)),
            )
        };
        let registry = ClusterRegistry::from_parts(clusters, trie, opts.tau)?;
        Self::with_registry(opts, registry)
    }

    pub fn with_registry(opts: MinerOpts, registry: ClusterRegistry) -> Result<Self, MinerError> {
        opts.validate()?;
        let format = match opts.log_format.as_deref() {
            Some(f) => LogFormat::parse(f)?,
            None => LogFormat::content_only(),
        };
        let tokenizer = Tokenizer::new(&opts.delimiters)
            .map_err(|e| MinerError::Config(format!("invalid delimiter regex '{}': {e}", opts.delimiters)))?;
        let extractor = ParameterExtractor::new(opts.extraction_timeout);
        Ok(Self { opts, format, tokenizer, registry, extractor })
    }

    pub fn opts(&self) -> &MinerOpts {
        &self.opts
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Header names of structured rows, in order.
    pub fn headers(&self) -> &[String] {
        self.format.headers()
    }

    /// Every template mined so far, with total occurrences.
    pub fn all_events(&self) -> Vec<EventSummary> {
        self.registry
            .clusters()
            .iter()
            .map(|c| EventSummary {
                event_id: c.event_id(self.opts.event_id_len),
                event_template: c.template.render(),
                occurrences: c.size(),
            })
            .collect()
    }

    /// Mines one batch of raw lines.
    ///
    /// Accepted lines get ids continuing after the registry's current maximum.
    /// Each line's template is the final template of its cluster after the whole
    /// batch, so lines assigned early see generalizations made later.
    pub fn parse_lines(&mut self, lines: &[String]) -> Result<BatchOutput, MinerError> {
        let start = Instant::now();
        if lines.is_empty() {
            tracing::debug!("empty batch");
            return Ok(BatchOutput::default());
        }
        let offset = self.registry.max_line_id();

        let phase = Instant::now();
        let (opts, format, tokenizer) = (&self.opts, &self.format, &self.tokenizer);
        let prepared: Vec<Result<Prepared, Skip>> =
            lines.par_iter().map(|l| prepare(opts, format, tokenizer, l)).collect();
        let mut skipped = SkipCounts::default();
        let accepted: Vec<Prepared> = prepared
            .into_iter()
            .filter_map(|p| match p {
                Ok(p) => Some(p),
                Err(Skip::TooLong) => {
                    skipped.too_long += 1;
                    None
                }
                Err(Skip::Unmatched) => {
                    skipped.unmatched += 1;
                    None
                }
            })
            .collect();
        if skipped.total() > 0 {
            tracing::warn!(
                too_long = skipped.too_long,
                unmatched = skipped.unmatched,
                max_line_len = self.opts.max_line_len,
                "skipped lines"
            );
        }
        tracing::info!(
            lines = lines.len(),
            accepted = accepted.len(),
            elapsed_ms = phase.elapsed().as_millis() as u64,
            "preprocessing done"
        );

        let phase = Instant::now();
        let clusters_before = self.registry.len();
        for (i, p) in accepted.iter().enumerate() {
            let line_id = offset + i as LineId + 1;
            self.registry.process(line_id, &p.tokens)?;
            if (i + 1) % PROGRESS_EVERY == 0 {
                tracing::info!(
                    processed = i + 1,
                    total = accepted.len(),
                    clusters = self.registry.len(),
                    "clustering progress"
                );
            }
        }
        tracing::info!(
            clusters = self.registry.len(),
            new_clusters = self.registry.len() - clusters_before,
            elapsed_ms = phase.elapsed().as_millis() as u64,
            "clustering done"
        );

        // Walk cluster membership backwards; ids within a cluster are ascending,
        // so only the tail above the offset belongs to this batch.
        let mut owner: Vec<ClusterId> = vec![0; accepted.len()];
        let mut touched: AHashMap<ClusterId, (String, String)> = AHashMap::new();
        for (id, cluster) in self.registry.clusters().iter().enumerate() {
            let mut in_batch = false;
            for &line_id in cluster.line_ids.iter().rev().take_while(|l| **l > offset) {
                owner[(line_id - offset - 1) as usize] = id;
                in_batch = true;
            }
            if in_batch {
                touched.insert(id, (cluster.event_id(self.opts.event_id_len), cluster.template.render()));
            }
        }

        let mut parsed: Vec<ParsedLine> = accepted
            .iter()
            .zip(&owner)
            .enumerate()
            .map(|(i, (p, id))| {
                let (event_id, event_template) = touched
                    .get(id)
                    .map(|(e, t)| (e.clone(), t.clone()))
                    .unwrap_or_default();
                ParsedLine {
                    line_id: offset + i as LineId + 1,
                    fields: p.fields.clone(),
                    event_id,
                    event_template,
                    parameters: None,
                }
            })
            .collect();

        if self.opts.keep_params {
            let phase = Instant::now();
            let jobs: Vec<ExtractionJob<'_>> = parsed
                .iter()
                .zip(&accepted)
                .map(|(line, p)| ExtractionJob { template: &line.event_template, content: &p.content })
                .collect();
            let params = self.extractor.extract_all(&jobs);
            drop(jobs);
            for (line, list) in parsed.iter_mut().zip(params) {
                line.parameters = Some(list);
            }
            tracing::info!(elapsed_ms = phase.elapsed().as_millis() as u64, "parameter extraction done");
        }

        let events = self.all_events();
        tracing::info!(
            lines = parsed.len(),
            events = events.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch done"
        );
        Ok(BatchOutput {
            lines: parsed,
            events,
            skipped,
        })
    }
}

fn prepare(opts: &MinerOpts, format: &LogFormat, tokenizer: &Tokenizer, line: &str) -> Result<Prepared, Skip> {
    if line.len() > opts.max_line_len {
        return Err(Skip::TooLong);
    }
    let normalized = if opts.replace_non_ascii {
        tokenizer::replace_non_ascii(line)
    } else {
        std::borrow::Cow::Borrowed(line)
    };
    let split = format.split(&normalized).ok_or(Skip::Unmatched)?;
    let content = split.content().to_string();
    let tokens = tokenizer.tokenize(&content);
    Ok(Prepared { fields: split.fields, content, tokens })
}
