//! Roster input: raw rows from CSV or JSON files.
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::model::RawRow;

/// Header-only roster offered to users as a starting point.
pub const SAMPLE_ROSTER: &str =
    "phone_number,name,last_session_date,sessions_completed,language,voice_id\n";

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported roster shape: {0}")]
    Shape(&'static str),
}

/// Load a roster file; `.json` files are parsed as JSON, everything else as CSV.
pub fn load(path: &Path) -> Result<Vec<RawRow>, RosterError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        let content = fs::read_to_string(path)?;
        from_json(&content)
    } else {
        from_csv(fs::File::open(path)?)
    }
}

/// Rows from a CSV source with a header line. Cells are kept as raw strings.
pub fn from_csv<R: Read>(reader: R) -> Result<Vec<RawRow>, RosterError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Rows from a JSON array of objects, or an object whose values are objects
/// (keyed by user id). Scalars are coerced to strings and `null` drops the key.
pub fn from_json(content: &str) -> Result<Vec<RawRow>, RosterError> {
    let value: Value = serde_json::from_str(content)?;
    let entries: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        _ => return Err(RosterError::Shape("expected an array or object of recipients")),
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::Object(fields) => Ok(fields
                .into_iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k, s)))
                .collect()),
            _ => Err(RosterError::Shape("each recipient must be an object")),
        })
        .collect()
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
