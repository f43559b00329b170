use crate::check::CheckOutcome;
use crate::events::decode_events;
use crate::report::{Record, COLUMNS};
use crate::severity::{severity_of, Severity};
use clap::ValueEnum;
use comfy_table::{presets, Table};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("JSON serialize: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV serialize: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct JsonRecord<'a> {
    #[serde(flatten)]
    record: &'a Record,
    severity: Severity,
    events: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct JsonOutcome<'a> {
    status: Severity,
    exit_code: i32,
    records: Vec<JsonRecord<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonFailure {
    status: Severity,
    exit_code: i32,
    error: String,
}

pub fn render(outcome: &CheckOutcome, format: OutputFormat) -> Result<String, OutputError> {
    match format {
        OutputFormat::Text => Ok(render_text(outcome)),
        OutputFormat::Json => Ok(render_json(outcome)?),
        // status line works as preamble, so the body reads back with report::parse
        OutputFormat::Csv => Ok(format!("{}\n{}", outcome.status, outcome.records.to_csv()?)),
    }
}

/// Output for a check that could not be evaluated; always UNKNOWN.
pub fn render_failure(err: &dyn Display, format: OutputFormat) -> String {
    let status = Severity::Unknown;
    match format {
        OutputFormat::Text | OutputFormat::Csv => format!("{status}: {err}"),
        OutputFormat::Json => {
            let failure = JsonFailure {
                status,
                exit_code: status.exit_code(),
                error: err.to_string(),
            };
            serde_json::to_string_pretty(&failure)
                .unwrap_or_else(|_| format!("{{\"status\":\"{status}\"}}"))
        }
    }
}

fn render_text(outcome: &CheckOutcome) -> String {
    let mut table = Table::new();
    table.load_preset(presets::ASCII_FULL);
    table.set_header(COLUMNS);
    for record in &outcome.records {
        table.add_row(vec![
            record.id.to_string(),
            record.name.clone(),
            record.category.clone(),
            record.state.clone(),
            record.reading.clone(),
            record.unit.clone(),
            record.event.clone(),
        ]);
    }

    format!("{}\n\n{}", outcome.status, table)
}

fn render_json(outcome: &CheckOutcome) -> Result<String, serde_json::Error> {
    let doc = JsonOutcome {
        status: outcome.status,
        exit_code: outcome.status.exit_code(),
        records: outcome
            .records
            .iter()
            .map(|record| JsonRecord {
                record,
                severity: severity_of(record),
                events: decoded_events(record),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&doc)
}

fn decoded_events(record: &Record) -> Option<Vec<String>> {
    match decode_events(&record.event) {
        Ok(events) => Some(events),
        Err(err) => {
            warn!(record = record.id, event = %record.event, error = %err, "malformed event list");
            None
        }
    }
}
