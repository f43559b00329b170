use crate::report::Record;
use serde::Serialize;
use std::fmt;

pub const STATE_NOMINAL: &str = "Nominal";
pub const STATE_WARNING: &str = "Warning";
pub const STATE_CRITICAL: &str = "Critical";

/// Check status, ordered from healthy to worst. `Unknown` ranks above
/// `Critical` so that a check which could not decide is escalated hardest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Severity {
    /// Process exit code expected by the monitoring scheduler.
    pub const fn exit_code(self) -> i32 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
            Severity::Unknown => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn severity_of(record: &Record) -> Severity {
    match record.state.as_str() {
        STATE_NOMINAL => Severity::Ok,
        STATE_WARNING => Severity::Warning,
        STATE_CRITICAL => Severity::Critical,
        // N/A and anything unrecognised: sensor has no data right now
        _ => Severity::Ok,
    }
}

/// Worst severity seen; `Ok` when nothing was observed.
pub fn aggregate<I>(severities: I) -> Severity
where
    I: IntoIterator<Item = Severity>,
{
    severities.into_iter().max().unwrap_or_default()
}
