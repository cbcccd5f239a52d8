//! Transaction records as they enter the pipeline

use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Untyped field name -> value mapping, as received from an API payload or CSV row.
pub type Record = serde_json::Map<String, Value>;

/// A validated transaction.
///
/// Built once at batch entry by [`Transaction::from_record`]; everything
/// downstream works on this typed form and never re-checks field presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Record identifier, dropped before encoding
    #[serde(default)]
    pub transaction_id: Option<String>,

    /// Transaction amount
    pub amount: f64,

    /// Merchant category
    pub merchant_category: String,

    /// Card present (0 = no, 1 = yes)
    pub card_present: u8,

    /// Transaction type
    pub transaction_type: String,

    pub distance_from_home: f64,
    pub distance_from_last_transaction: f64,

    /// Seconds-scale gap since the customer's previous transaction
    pub time_since_last_transaction: f64,

    pub customer_age: i64,
    pub customer_tenure_days: i64,

    /// Average amount over the trailing 30 days
    pub avg_transaction_amount_30d: f64,

    pub num_transactions_24h: i64,
    pub num_transactions_7d: i64,

    /// When the transaction happened. Required for derivation.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Fraud label (training data only)
    #[serde(default)]
    pub is_fraud: Option<u8>,
}

impl Transaction {
    /// Validate an untyped record into a transaction.
    ///
    /// Numbers may be JSON numbers or numeric strings. The first missing or
    /// malformed field is reported by name.
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            transaction_id: optional_id(record, "transaction_id")?,
            amount: non_negative(record, "amount")?,
            merchant_category: required_str(record, "merchant_category")?,
            card_present: required_flag(record, "card_present")?,
            transaction_type: required_str(record, "transaction_type")?,
            distance_from_home: non_negative(record, "distance_from_home")?,
            distance_from_last_transaction: non_negative(record, "distance_from_last_transaction")?,
            time_since_last_transaction: non_negative(record, "time_since_last_transaction")?,
            customer_age: required_int(record, "customer_age")?,
            customer_tenure_days: required_int(record, "customer_tenure_days")?,
            avg_transaction_amount_30d: non_negative(record, "avg_transaction_amount_30d")?,
            num_transactions_24h: non_negative_int(record, "num_transactions_24h")?,
            num_transactions_7d: non_negative_int(record, "num_transactions_7d")?,
            timestamp: optional_timestamp(record, "timestamp")?,
            is_fraud: optional_flag(record, "is_fraud")?,
        })
    }

    /// Return a copy carrying `now` as its timestamp if it has none.
    ///
    /// This is the only place an evaluation time is substituted, and the
    /// caller chooses that time explicitly.
    pub fn with_timestamp_or(&self, now: DateTime<Utc>) -> Self {
        let mut tx = self.clone();
        tx.timestamp.get_or_insert(now);
        tx
    }
}

/// Get a field, treating JSON null and empty strings (blank CSV cells) as absent.
fn field<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    match record.get(name) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    }
}

fn as_f64(value: &Value, name: &str) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(PipelineError::validation(name, format!("non-finite number {}", v))),
        None => Err(PipelineError::validation(name, format!("expected a number, got {}", value))),
    }
}

fn as_i64(value: &Value, name: &str) -> Result<i64> {
    if let Value::Number(n) = value {
        if let Some(v) = n.as_i64() {
            return Ok(v);
        }
    }
    let v = as_f64(value, name)?;
    if v.fract() != 0.0 || v.abs() > i64::MAX as f64 {
        return Err(PipelineError::validation(name, format!("expected an integer, got {}", v)));
    }
    Ok(v as i64)
}

fn required_str(record: &Record, name: &str) -> Result<String> {
    match field(record, name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(PipelineError::validation(name, format!("expected a string, got {}", other))),
        None => Err(PipelineError::missing(name)),
    }
}

fn non_negative(record: &Record, name: &str) -> Result<f64> {
    let value = field(record, name).ok_or_else(|| PipelineError::missing(name))?;
    let v = as_f64(value, name)?;
    if v < 0.0 {
        return Err(PipelineError::validation(name, format!("must be >= 0, got {}", v)));
    }
    Ok(v)
}

fn required_int(record: &Record, name: &str) -> Result<i64> {
    let value = field(record, name).ok_or_else(|| PipelineError::missing(name))?;
    as_i64(value, name)
}

fn non_negative_int(record: &Record, name: &str) -> Result<i64> {
    let v = required_int(record, name)?;
    if v < 0 {
        return Err(PipelineError::validation(name, format!("must be >= 0, got {}", v)));
    }
    Ok(v)
}

fn flag(value: &Value, name: &str) -> Result<u8> {
    match as_i64(value, name)? {
        0 => Ok(0),
        1 => Ok(1),
        other => Err(PipelineError::validation(name, format!("expected 0 or 1, got {}", other))),
    }
}

fn required_flag(record: &Record, name: &str) -> Result<u8> {
    let value = field(record, name).ok_or_else(|| PipelineError::missing(name))?;
    flag(value, name)
}

fn optional_flag(record: &Record, name: &str) -> Result<Option<u8>> {
    field(record, name).map(|v| flag(v, name)).transpose()
}

fn optional_id(record: &Record, name: &str) -> Result<Option<String>> {
    match field(record, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(PipelineError::validation(name, format!("expected an identifier, got {}", other))),
    }
}

fn optional_timestamp(record: &Record, name: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = field(record, name) else {
        return Ok(None);
    };
    let Value::String(raw) = value else {
        return Err(PipelineError::validation(name, format!("expected a timestamp string, got {}", value)));
    };
    parse_timestamp(raw.trim())
        .map(Some)
        .ok_or_else(|| PipelineError::validation(name, format!("unrecognised timestamp `{}`", raw)))
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.f]` / `YYYY-MM-DDTHH:MM:SS[.f]` read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn base_record() -> Record {
        record(json!({
            "transaction_id": "tx_001",
            "amount": 1500.0,
            "merchant_category": "online",
            "card_present": 0,
            "transaction_type": "purchase",
            "distance_from_home": 150.0,
            "distance_from_last_transaction": 5.0,
            "time_since_last_transaction": 30.0,
            "customer_age": 40,
            "customer_tenure_days": 400,
            "avg_transaction_amount_30d": 200.0,
            "num_transactions_24h": 8,
            "num_transactions_7d": 25,
            "timestamp": "2024-03-02T14:30:00Z"
        }))
    }

    #[test]
    fn test_from_record() {
        let tx = Transaction::from_record(&base_record()).unwrap();
        assert_eq!(tx.transaction_id.as_deref(), Some("tx_001"));
        assert_eq!(tx.amount, 1500.0);
        assert_eq!(tx.card_present, 0);
        assert_eq!(tx.num_transactions_7d, 25);
        assert_eq!(tx.timestamp, Some(Utc.with_ymd_and_hms(2024, 3, 2, 14, 30, 0).unwrap()));
        assert_eq!(tx.is_fraud, None);
    }

    #[test]
    fn test_missing_field_is_named() {
        let mut rec = base_record();
        rec.remove("distance_from_home");
        match Transaction::from_record(&rec) {
            Err(PipelineError::MissingField(field)) => assert_eq!(field, "distance_from_home"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_cell_counts_as_missing() {
        let mut rec = base_record();
        rec.insert("merchant_category".into(), json!("  "));
        assert!(matches!(
            Transaction::from_record(&rec),
            Err(PipelineError::MissingField(f)) if f == "merchant_category"
        ));
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let mut rec = base_record();
        rec.insert("card_present".into(), json!(2));
        assert!(matches!(
            Transaction::from_record(&rec),
            Err(PipelineError::Validation { field, .. }) if field == "card_present"
        ));

        let mut rec = base_record();
        rec.insert("amount".into(), json!(-3.0));
        assert!(matches!(
            Transaction::from_record(&rec),
            Err(PipelineError::Validation { field, .. }) if field == "amount"
        ));

        let mut rec = base_record();
        rec.insert("customer_age".into(), json!("forty"));
        assert!(matches!(
            Transaction::from_record(&rec),
            Err(PipelineError::Validation { field, .. }) if field == "customer_age"
        ));

        let mut rec = base_record();
        rec.insert("num_transactions_24h".into(), json!(2.5));
        assert!(matches!(
            Transaction::from_record(&rec),
            Err(PipelineError::Validation { field, .. }) if field == "num_transactions_24h"
        ));
    }

    #[test]
    fn test_csv_style_strings() {
        let mut rec = base_record();
        rec.insert("amount".into(), json!("12.50"));
        rec.insert("customer_age".into(), json!("33"));
        rec.insert("is_fraud".into(), json!("1"));
        rec.insert("timestamp".into(), json!("2024-01-05 08:15:00"));
        let tx = Transaction::from_record(&rec).unwrap();
        assert_eq!(tx.amount, 12.5);
        assert_eq!(tx.customer_age, 33);
        assert_eq!(tx.is_fraud, Some(1));
        assert_eq!(tx.timestamp, Some(Utc.with_ymd_and_hms(2024, 1, 5, 8, 15, 0).unwrap()));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 5, 8, 15, 0).unwrap();
        for raw in [
            "2024-01-05T08:15:00Z",
            "2024-01-05T10:15:00+02:00",
            "2024-01-05 08:15:00",
            "2024-01-05 08:15:00.000",
            "2024-01-05T08:15:00",
            "2024-01-05T08:15:00.0",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "{}", raw);
        }
        assert_eq!(parse_timestamp("05/01/2024 08:15"), None);
    }

    #[test]
    fn test_with_timestamp_or_keeps_existing() {
        let tx = Transaction::from_record(&base_record()).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(tx.with_timestamp_or(now).timestamp, tx.timestamp);

        let mut rec = base_record();
        rec.remove("timestamp");
        let tx = Transaction::from_record(&rec).unwrap();
        assert_eq!(tx.timestamp, None);
        assert_eq!(tx.with_timestamp_or(now).timestamp, Some(now));
    }

    #[test]
    fn test_transaction_serialization() {
        let tx = Transaction::from_record(&base_record()).unwrap();
        let json = serde_json::to_string(&tx).unwrap();
        let deserialized: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, deserialized);
    }
}
