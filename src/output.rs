//! CSV output for mined batches.
//!
//! Structured rows go to `<stem>_structured.csv`, templates to `<stem>_templates.csv`.
//! In main-log mode a single structured file is appended to across batches and
//! only rows with a LineId above the file's current maximum are added.

use crate::miner::{BatchOutput, EventSummary, ParsedLine};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("cannot write '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("cannot encode parameters: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn structured_path(out_dir: &Path, stem: &str) -> PathBuf {
    out_dir.join(format!("{stem}_structured.csv"))
}

pub fn templates_path(out_dir: &Path, stem: &str) -> PathBuf {
    out_dir.join(format!("{stem}_templates.csv"))
}

fn structured_header(headers: &[String], with_params: bool) -> Vec<&str> {
    let mut row = vec!["LineId"];
    row.extend(headers.iter().map(String::as_str));
    row.extend(["EventId", "EventTemplate"]);
    if with_params {
        row.push("ParameterList");
    }
    row
}

fn structured_row(line: &ParsedLine, with_params: bool) -> Result<Vec<String>, OutputError> {
    let mut row = Vec::with_capacity(line.fields.len() + 4);
    row.push(line.line_id.to_string());
    row.extend(line.fields.iter().cloned());
    row.push(line.event_id.clone());
    row.push(line.event_template.clone());
    if with_params {
        let params = match &line.parameters {
            Some(p) => serde_json::to_string(p)?,
            None => "[]".to_string(),
        };
        row.push(params);
    }
    Ok(row)
}

/// Writes header and rows; returns the number of rows written.
pub fn write_structured<W: Write>(
    writer: W,
    headers: &[String],
    lines: &[ParsedLine],
    with_params: bool,
) -> Result<usize, OutputError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(structured_header(headers, with_params))?;
    for line in lines {
        w.write_record(structured_row(line, with_params)?)?;
    }
    w.flush().map_err(|source| OutputError::Io { path: PathBuf::new(), source })?;
    Ok(lines.len())
}

pub fn write_templates<W: Write>(writer: W, events: &[EventSummary]) -> Result<usize, OutputError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(["EventId", "EventTemplate", "Occurrences"])?;
    for e in events {
        w.write_record([e.event_id.as_str(), e.event_template.as_str(), e.occurrences.to_string().as_str()])?;
    }
    w.flush().map_err(|source| OutputError::Io { path: PathBuf::new(), source })?;
    Ok(events.len())
}

/// Largest LineId already present in a structured file, 0 if absent or empty.
pub fn max_line_id_in(path: &Path) -> Result<u64, OutputError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(source) => return Err(OutputError::Io { path: path.to_path_buf(), source }),
    };
    let mut reader = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(file);
    let mut max = 0;
    for record in reader.records() {
        let record = record?;
        if let Some(id) = record.get(0).and_then(|v| v.parse::<u64>().ok()) {
            max = max.max(id);
        }
    }
    Ok(max)
}

/// Appends rows newer than the file's current maximum LineId. The header is only
/// written when the file is new or empty. Returns the number of rows appended.
pub fn append_main(
    path: &Path,
    headers: &[String],
    lines: &[ParsedLine],
    with_params: bool,
) -> Result<usize, OutputError> {
    let existing_max = max_line_id_in(path)?;
    let fresh = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| OutputError::Io { path: path.to_path_buf(), source })?;
    let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if fresh {
        w.write_record(structured_header(headers, with_params))?;
    }
    let mut appended = 0;
    for line in lines.iter().filter(|l| l.line_id > existing_max) {
        w.write_record(structured_row(line, with_params)?)?;
        appended += 1;
    }
    w.flush().map_err(|source| OutputError::Io { path: path.to_path_buf(), source })?;

    if appended < lines.len() {
        tracing::debug!(
            path = %path.display(),
            existing_max,
            dropped = lines.len() - appended,
            "rows already present in main log"
        );
    }
    Ok(appended)
}

fn create(path: &Path) -> Result<File, OutputError> {
    File::create(path).map_err(|source| OutputError::Io { path: path.to_path_buf(), source })
}

/// Writes `<stem>_structured.csv` and `<stem>_templates.csv` for one batch.
pub fn write_batch(
    out_dir: &Path,
    stem: &str,
    headers: &[String],
    batch: &BatchOutput,
    with_params: bool,
) -> Result<(), OutputError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|source| OutputError::Io { path: out_dir.to_path_buf(), source })?;
    let structured = structured_path(out_dir, stem);
    let rows = write_structured(create(&structured)?, headers, &batch.lines, with_params)?;
    let templates = templates_path(out_dir, stem);
    let events = write_templates(create(&templates)?, &batch.events)?;
    tracing::info!(
        structured = %structured.display(),
        templates = %templates.display(),
        rows,
        events,
        "batch written"
    );
    Ok(())
}

/// Appends to `<name>_main_structured.csv` and rewrites `<name>_main_templates.csv`
/// with every template mined so far.
pub fn write_main(
    out_dir: &Path,
    name: &str,
    headers: &[String],
    batch: &BatchOutput,
    all_events: &[EventSummary],
    with_params: bool,
) -> Result<(), OutputError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|source| OutputError::Io { path: out_dir.to_path_buf(), source })?;
    let stem = format!("{name}_main");
    let structured = structured_path(out_dir, &stem);
    let rows = append_main(&structured, headers, &batch.lines, with_params)?;
    let templates = templates_path(out_dir, &stem);
    write_templates(create(&templates)?, all_events)?;
    tracing::info!(structured = %structured.display(), appended = rows, "main log updated");
    Ok(())
}
