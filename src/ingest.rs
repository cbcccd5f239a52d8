//! Batch entry points: raw CSV rows and JSON payloads into validated transactions

use crate::error::{PipelineError, Result};
use crate::types::transaction::{Record, Transaction};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Read and validate a CSV file with a header row.
///
/// Cells are handed to [`Transaction::from_record`] as strings; blank cells
/// count as missing. The first invalid row aborts the whole batch.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut transactions = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let row_values = result?;
        let record: Record = headers
            .iter()
            .zip(row_values.iter())
            .map(|(name, cell)| (name.to_string(), Value::String(cell.to_string())))
            .collect();
        let tx = Transaction::from_record(&record).inspect_err(|e| {
            warn!(path = %path.display(), row = row + 1, error = %e, "Rejected CSV row");
        })?;
        transactions.push(tx);
    }

    info!(path = %path.display(), rows = transactions.len(), "Loaded transactions");
    Ok(transactions)
}

/// Validate already-parsed JSON records.
pub fn from_json_records(records: &[Record]) -> Result<Vec<Transaction>> {
    records.iter().map(Transaction::from_record).collect()
}

/// Parse a JSON payload holding one transaction object or an array of them.
pub fn parse_json(payload: &str) -> Result<Vec<Transaction>> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| PipelineError::validation("payload", e.to_string()))?;
    let records = match value {
        Value::Object(record) => vec![record],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(PipelineError::validation(
                    "payload",
                    format!("expected a JSON object, got {}", other),
                )),
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(PipelineError::validation(
                "payload",
                format!("expected an object or array, got {}", other),
            ))
        }
    };
    from_json_records(&records)
}

/// Give every timestamp-less transaction the caller-chosen evaluation time.
pub fn stamp_missing(batch: &[Transaction], now: DateTime<Utc>) -> Vec<Transaction> {
    batch.iter().map(|tx| tx.with_timestamp_or(now)).collect()
}
