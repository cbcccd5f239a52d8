//! Shared fixtures for unit tests

use crate::types::transaction::Transaction;
use chrono::{Duration, TimeZone, Utc};

const MERCHANTS: [&str; 5] = ["grocery", "online", "gas", "restaurant", "travel"];
const TYPES: [&str; 3] = ["purchase", "withdrawal", "transfer"];

/// Deterministic, varied transaction number `i`.
pub(crate) fn transaction(i: usize) -> Transaction {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Transaction {
        transaction_id: Some(format!("tx_{:06}", i)),
        amount: 5.0 + ((i * 137) % 2400) as f64 * 0.75,
        merchant_category: MERCHANTS[i % MERCHANTS.len()].to_string(),
        card_present: (i % 3 != 0) as u8,
        transaction_type: TYPES[i % TYPES.len()].to_string(),
        distance_from_home: ((i * 31) % 320) as f64 * 0.9,
        distance_from_last_transaction: ((i * 17) % 90) as f64,
        time_since_last_transaction: ((i * 53) % 700) as f64,
        customer_age: 18 + (i % 60) as i64,
        customer_tenure_days: ((i * 11) % 3000) as i64,
        avg_transaction_amount_30d: 20.0 + ((i * 7) % 500) as f64,
        num_transactions_24h: (i % 9) as i64,
        num_transactions_7d: (i % 31) as i64,
        timestamp: Some(start + Duration::minutes((i * 97) as i64)),
        is_fraud: Some((i % 7 == 0) as u8),
    }
}

pub(crate) fn batch(n: usize) -> Vec<Transaction> {
    (0..n).map(transaction).collect()
}
