use crate::collectors::ipmi::{self, SubprocessError};
use crate::config::{Config, ConfigError};
use crate::report::{self, ParseError, Report};
use crate::severity::{aggregate, severity_of, Severity};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("failed to read captured report from {path}: {source}")]
    Input {
        path: String,
        source: std::io::Error,
    },
    #[error("report parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("interrupted before the check completed")]
    Interrupted,
}

/// Where the raw report text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSource {
    Command,
    File(PathBuf),
    Stdin,
}

impl ReportSource {
    /// `-` selects stdin, any other value a file; no value runs the command.
    pub fn from_arg(arg: Option<PathBuf>) -> Self {
        match arg {
            None => ReportSource::Command,
            Some(path) if path.as_os_str() == "-" => ReportSource::Stdin,
            Some(path) => ReportSource::File(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub status: Severity,
    pub records: Report,
}

pub async fn run(cfg: &Config, source: &ReportSource) -> Result<CheckOutcome, CheckError> {
    let raw = load_raw(cfg, source).await?;
    let report = report::parse(&raw)?;
    debug!(records = report.len(), "report parsed");
    Ok(evaluate(&report, &cfg.categories))
}

/// Selects each category in turn and folds the records' severities.
pub fn evaluate(report: &Report, categories: &[String]) -> CheckOutcome {
    let mut selected = Vec::new();
    for category in categories {
        let subset = report.filter_by_category(category);
        debug!(category = %category, records = subset.len(), "sensors selected");
        selected.extend(subset);
    }

    let status = aggregate(selected.iter().map(severity_of));
    CheckOutcome {
        status,
        records: Report::new(selected),
    }
}

async fn load_raw(cfg: &Config, source: &ReportSource) -> Result<String, CheckError> {
    match source {
        ReportSource::Command => Ok(ipmi::capture(cfg).await?),
        ReportSource::File(path) => {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| CheckError::Input {
                    path: path.display().to_string(),
                    source,
                })
        }
        ReportSource::Stdin => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .map_err(|source| CheckError::Input {
                    path: "stdin".to_string(),
                    source,
                })?;
            Ok(buf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SCENARIO: &str = "Some banner\n\
        ID,Name,Type,State,Reading,Units,Event\n\
        1,PS1,Power Supply,Nominal,120,Watts,'N/A'\n\
        2,PU1,Power Unit,Critical,0,Watts,'Failed'\n";

    const MIXED: &str = "ID,Name,Type,State,Reading,Units,Event\n\
        10,PS1 Status,Power Supply,Nominal,N/A,N/A,'Presence detected'\n\
        11,CPU Temp,Temperature,Critical,98.00,C,'At or Above (>=) Upper Critical Threshold'\n\
        12,PS2 Status,Power Supply,Warning,N/A,N/A,'Presence detected' 'Power Supply input lost (AC/DC)'\n\
        13,PS Redundancy,Power Unit,N/A,N/A,N/A,'N/A'\n";

    fn power_categories() -> Vec<String> {
        Config::default().categories
    }

    fn captured(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn banner_scenario_is_critical() {
        let report = report::parse(SCENARIO).unwrap();
        let outcome = evaluate(&report, &power_categories());

        assert_eq!(outcome.status, Severity::Critical);
        let ids: Vec<i64> = outcome.records.iter().map(|r| r.id).collect();
        // power units are listed before power supplies
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn other_categories_do_not_affect_status() {
        let report = report::parse(MIXED).unwrap();
        let outcome = evaluate(&report, &power_categories());

        assert_eq!(outcome.status, Severity::Warning);
        assert_eq!(outcome.records.len(), 3);
        assert!(outcome.records.iter().all(|r| r.category != "Temperature"));
    }

    #[test]
    fn no_matching_sensors_is_ok() {
        let report = report::parse("ID,Name,Type,State,Reading,Units,Event\n").unwrap();
        let outcome = evaluate(&report, &power_categories());

        assert_eq!(outcome.status, Severity::Ok);
        assert!(outcome.records.is_empty());
    }

    #[test]
    fn report_source_from_arg() {
        assert_eq!(ReportSource::from_arg(None), ReportSource::Command);
        assert_eq!(
            ReportSource::from_arg(Some(PathBuf::from("-"))),
            ReportSource::Stdin
        );
        assert_eq!(
            ReportSource::from_arg(Some(PathBuf::from("capture.csv"))),
            ReportSource::File(PathBuf::from("capture.csv"))
        );
    }

    #[tokio::test]
    async fn run_reads_captured_file() {
        let file = captured(MIXED);
        let source = ReportSource::File(file.path().to_path_buf());
        let outcome = run(&Config::default(), &source)
            .await
            .expect("captured report evaluates");
        assert_eq!(outcome.status, Severity::Warning);
    }

    #[tokio::test]
    async fn run_fails_on_empty_capture() {
        let file = captured("");
        let source = ReportSource::File(file.path().to_path_buf());
        let result = run(&Config::default(), &source).await;

        assert!(matches!(
            result,
            Err(CheckError::Parse(ParseError::MissingHeader))
        ));
    }

    #[tokio::test]
    async fn run_reports_missing_capture_file() {
        let source = ReportSource::File(PathBuf::from("/nonexistent/capture.csv"));
        let result = run(&Config::default(), &source).await;

        assert!(matches!(result, Err(CheckError::Input { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_invokes_command() {
        let cfg = Config {
            command: "printf".to_string(),
            args: vec![SCENARIO.replace('\n', "\\n")],
            ..Config::default()
        };
        let outcome = run(&cfg, &ReportSource::Command).await.expect("printf succeeds");

        assert_eq!(outcome.status, Severity::Critical);
        assert_eq!(outcome.records.len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_surfaces_command_failure() {
        let cfg = Config {
            command: "false".to_string(),
            args: vec![],
            ..Config::default()
        };
        let result = run(&cfg, &ReportSource::Command).await;

        assert!(matches!(
            result,
            Err(CheckError::Subprocess(SubprocessError::Failed { .. }))
        ));
    }
}
