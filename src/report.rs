use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Start of the real header row; anything before it is tool chatter.
pub const HEADER_MARKER: &str = "ID,";

/// `ipmimonitoring --comma-separated-output | head -n1`
pub const COLUMNS: [&str; 7] = ["ID", "Name", "Type", "State", "Reading", "Units", "Event"];

pub const CATEGORY_POWER_SUPPLY: &str = "Power Supply";
pub const CATEGORY_POWER_UNIT: &str = "Power Unit";

/// One sensor row of the diagnostic report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub category: String,
    pub state: String,
    pub reading: String,
    #[serde(rename = "units")]
    pub unit: String,
    pub event: String,
}

/// Sensor records in the order the diagnostic tool emitted them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    records: Vec<Record>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("report header not found")]
    MissingHeader,
    #[error("unexpected report header '{found}', expected '{}'", COLUMNS.join(","))]
    Header { found: String },
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: unbalanced quote")]
    UnbalancedQuote { line: u64 },
    #[error("line {line}: duplicate ID {id}")]
    DuplicateId { line: u64, id: i64 },
    #[error("line {line}: invalid {field} value '{value}'")]
    InvalidField {
        line: u64,
        field: &'static str,
        value: String,
    },
    #[error("csv read error: {0}")]
    Csv(#[from] csv::Error),
}

impl Report {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Returns a new report with the records matching `predicate`, order kept.
    pub fn filter<F>(&self, predicate: F) -> Report
    where
        F: Fn(&Record) -> bool,
    {
        self.records
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    /// Case-sensitive exact match on the record's `Type` column.
    pub fn filter_by_category(&self, category: &str) -> Report {
        self.filter(|record| record.category == category)
    }

    /// Serializes the report back into the seven-column layout `parse` accepts.
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(COLUMNS)?;
        for record in &self.records {
            let id = record.id.to_string();
            writer.write_record([
                id.as_str(),
                record.name.as_str(),
                record.category.as_str(),
                record.state.as_str(),
                record.reading.as_str(),
                record.unit.as_str(),
                record.event.as_str(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl FromIterator<Record> for Report {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Report {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Parses captured `ipmimonitoring --comma-separated-output` text.
///
/// Lines before the first `ID,` are skipped. The whole parse fails on the
/// first malformed row; no partial report is returned.
pub fn parse(raw: &str) -> Result<Report, ParseError> {
    let (table, skipped_lines) = match raw.find(HEADER_MARKER) {
        Some(idx) => (&raw[idx..], raw[..idx].matches('\n').count() as u64),
        None => (raw, 0),
    };

    // Fields never span lines, so every line must close the quotes it opens.
    // The csv reader would otherwise run an open quote to the end of the text.
    if let Some(idx) = table
        .lines()
        .position(|line| line.matches('"').count() % 2 != 0)
    {
        return Err(ParseError::UnbalancedQuote {
            line: skipped_lines + idx as u64 + 1,
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(table.as_bytes());
    let mut rows = reader.records();

    let header = match rows.next() {
        Some(row) => row?,
        None => return Err(ParseError::MissingHeader),
    };
    if !header.iter().eq(COLUMNS.iter().copied()) {
        return Err(ParseError::Header {
            found: header.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut records = Vec::new();
    let mut seen_ids = HashSet::new();
    for row in rows {
        let row = row?;
        let line = skipped_lines + row.position().map_or(0, |pos| pos.line());
        if row.len() != COLUMNS.len() {
            return Err(ParseError::FieldCount {
                line,
                expected: COLUMNS.len(),
                found: row.len(),
            });
        }

        let id = row[0]
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidField {
                line,
                field: "ID",
                value: row[0].to_string(),
            })?;
        if !seen_ids.insert(id) {
            return Err(ParseError::DuplicateId { line, id });
        }

        records.push(Record {
            id,
            name: row[1].to_string(),
            category: row[2].to_string(),
            state: row[3].to_string(),
            reading: row[4].to_string(),
            unit: row[5].to_string(),
            event: row[6].to_string(),
        });
    }

    Ok(Report::new(records))
}
