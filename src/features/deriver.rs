//! Feature derivation for transaction fraud models.
//!
//! Every derived column is a pure function of a single transaction, so a
//! record produces the same features whether it is scored alone or as part
//! of a training batch.

use crate::error::{PipelineError, Result};
use crate::features::schema::{CategoricalFeature, NumericFeature};
use crate::types::transaction::Transaction;
use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::debug;

/// Added to the 30 day average before dividing, so a zero average stays finite.
pub const AMOUNT_RATIO_EPSILON: f64 = 1e-5;

const HIGH_AMOUNT: f64 = 1000.0;
const HIGH_FREQUENCY_24H: i64 = 5;
const HIGH_FREQUENCY_7D: i64 = 20;
const FAR_FROM_HOME: f64 = 100.0;
const FAR_FROM_LAST: f64 = 50.0;
const PEAK_HOURS: [u32; 6] = [8, 9, 10, 17, 18, 19];

/// Amount bucket over (0,50], (50,200], (200,1000], (1000,inf).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountCategory {
    VeryLow,
    Low,
    Medium,
    High,
}

impl AmountCategory {
    pub fn from_amount(amount: f64) -> Self {
        bucket(
            amount,
            &[50.0, 200.0, 1000.0],
            &[
                AmountCategory::VeryLow,
                AmountCategory::Low,
                AmountCategory::Medium,
                AmountCategory::High,
            ],
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AmountCategory::VeryLow => "very_low",
            AmountCategory::Low => "low",
            AmountCategory::Medium => "medium",
            AmountCategory::High => "high",
        }
    }
}

/// Hour bucket over [0,6), [6,12), [12,18), [18,24).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => TimeOfDay::Night,
            6..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            _ => TimeOfDay::Evening,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::Night => "night",
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
        }
    }
}

/// Gap since the previous transaction over (0,10], (10,60], (60,300], (300,inf).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapCategory {
    Recent,
    Normal,
    LongGap,
    VeryLong,
}

impl GapCategory {
    pub fn from_gap(gap: f64) -> Self {
        bucket(
            gap,
            &[10.0, 60.0, 300.0],
            &[
                GapCategory::Recent,
                GapCategory::Normal,
                GapCategory::LongGap,
                GapCategory::VeryLong,
            ],
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GapCategory::Recent => "recent",
            GapCategory::Normal => "normal",
            GapCategory::LongGap => "long_gap",
            GapCategory::VeryLong => "very_long",
        }
    }
}

/// Distance from home over (0,10], (10,50], (50,200], (200,inf).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceCategory {
    VeryClose,
    Close,
    Medium,
    Far,
}

impl DistanceCategory {
    pub fn from_distance(distance: f64) -> Self {
        bucket(
            distance,
            &[10.0, 50.0, 200.0],
            &[
                DistanceCategory::VeryClose,
                DistanceCategory::Close,
                DistanceCategory::Medium,
                DistanceCategory::Far,
            ],
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceCategory::VeryClose => "very_close",
            DistanceCategory::Close => "close",
            DistanceCategory::Medium => "medium",
            DistanceCategory::Far => "far",
        }
    }
}

/// Right-closed binning: `labels[i]` covers `(edges[i-1], edges[i]]`.
/// Values at or below the first edge land in the first bucket, values above
/// the last edge in the last one.
fn bucket<T: Copy>(value: f64, upper_edges: &[f64], labels: &[T]) -> T {
    debug_assert_eq!(labels.len(), upper_edges.len() + 1);
    let idx = upper_edges
        .iter()
        .position(|&edge| value <= edge)
        .unwrap_or(upper_edges.len());
    labels[idx]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountFeatures {
    pub amount_log: f64,
    pub amount_category: AmountCategory,
    pub amount_to_avg_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFeatures {
    pub hour: u32,
    /// 0 = Monday ... 6 = Sunday
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub is_weekend: bool,
    pub time_of_day: TimeOfDay,
    pub is_peak_hour: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VelocityFeatures {
    pub is_high_frequency_24h: bool,
    pub is_high_frequency_7d: bool,
    pub time_since_last_cat: GapCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceFeatures {
    pub distance_home_cat: DistanceCategory,
    pub is_far_from_home: bool,
    pub is_far_from_last: bool,
}

pub fn amount_features(tx: &Transaction) -> AmountFeatures {
    AmountFeatures {
        amount_log: tx.amount.ln_1p(),
        amount_category: AmountCategory::from_amount(tx.amount),
        amount_to_avg_ratio: tx.amount / (tx.avg_transaction_amount_30d + AMOUNT_RATIO_EPSILON),
    }
}

pub fn temporal_features(timestamp: DateTime<Utc>) -> TemporalFeatures {
    let hour = timestamp.hour();
    let day_of_week = timestamp.weekday().num_days_from_monday();
    TemporalFeatures {
        hour,
        day_of_week,
        day_of_month: timestamp.day(),
        is_weekend: day_of_week >= 5,
        time_of_day: TimeOfDay::from_hour(hour),
        is_peak_hour: PEAK_HOURS.contains(&hour),
    }
}

pub fn velocity_features(tx: &Transaction) -> VelocityFeatures {
    VelocityFeatures {
        is_high_frequency_24h: tx.num_transactions_24h > HIGH_FREQUENCY_24H,
        is_high_frequency_7d: tx.num_transactions_7d > HIGH_FREQUENCY_7D,
        time_since_last_cat: GapCategory::from_gap(tx.time_since_last_transaction),
    }
}

pub fn distance_features(tx: &Transaction) -> DistanceFeatures {
    DistanceFeatures {
        distance_home_cat: DistanceCategory::from_distance(tx.distance_from_home),
        is_far_from_home: tx.distance_from_home > FAR_FROM_HOME,
        is_far_from_last: tx.distance_from_last_transaction > FAR_FROM_LAST,
    }
}

/// Composite risk score, 0..=5.
///
/// `2*[amount > 1000] + [card not present] + [distance_from_home > 100] +
/// [num_transactions_24h > 5]`. This is the only risk score formula in the
/// crate; training and inference both go through it.
pub fn risk_score(tx: &Transaction) -> u8 {
    let mut score = 0;
    if tx.amount > HIGH_AMOUNT {
        score += 2;
    }
    if tx.card_present == 0 {
        score += 1;
    }
    if tx.distance_from_home > FAR_FROM_HOME {
        score += 1;
    }
    if tx.num_transactions_24h > HIGH_FREQUENCY_24H {
        score += 1;
    }
    score
}

/// A transaction together with every derived column.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    pub transaction: Transaction,
    pub amount: AmountFeatures,
    pub temporal: TemporalFeatures,
    pub velocity: VelocityFeatures,
    pub distance: DistanceFeatures,
    pub risk_score: u8,
}

impl DerivedFeatures {
    /// Value of a numeric column.
    pub fn numeric(&self, feature: NumericFeature) -> f64 {
        let tx = &self.transaction;
        match feature {
            NumericFeature::Amount => tx.amount,
            NumericFeature::CardPresent => f64::from(tx.card_present),
            NumericFeature::DistanceFromHome => tx.distance_from_home,
            NumericFeature::DistanceFromLastTransaction => tx.distance_from_last_transaction,
            NumericFeature::TimeSinceLastTransaction => tx.time_since_last_transaction,
            NumericFeature::CustomerAge => tx.customer_age as f64,
            NumericFeature::CustomerTenureDays => tx.customer_tenure_days as f64,
            NumericFeature::AvgTransactionAmount30d => tx.avg_transaction_amount_30d,
            NumericFeature::NumTransactions24h => tx.num_transactions_24h as f64,
            NumericFeature::NumTransactions7d => tx.num_transactions_7d as f64,
            NumericFeature::AmountLog => self.amount.amount_log,
            NumericFeature::AmountToAvgRatio => self.amount.amount_to_avg_ratio,
            NumericFeature::Hour => f64::from(self.temporal.hour),
            NumericFeature::DayOfWeek => f64::from(self.temporal.day_of_week),
            NumericFeature::DayOfMonth => f64::from(self.temporal.day_of_month),
            NumericFeature::IsWeekend => flag(self.temporal.is_weekend),
            NumericFeature::IsPeakHour => flag(self.temporal.is_peak_hour),
            NumericFeature::IsHighFrequency24h => flag(self.velocity.is_high_frequency_24h),
            NumericFeature::IsHighFrequency7d => flag(self.velocity.is_high_frequency_7d),
            NumericFeature::IsFarFromHome => flag(self.distance.is_far_from_home),
            NumericFeature::IsFarFromLast => flag(self.distance.is_far_from_last),
            NumericFeature::RiskScore => f64::from(self.risk_score),
        }
    }

    /// Value of a categorical column.
    pub fn categorical(&self, feature: CategoricalFeature) -> &str {
        match feature {
            CategoricalFeature::MerchantCategory => &self.transaction.merchant_category,
            CategoricalFeature::TransactionType => &self.transaction.transaction_type,
            CategoricalFeature::AmountCategory => self.amount.amount_category.as_str(),
            CategoricalFeature::TimeOfDay => self.temporal.time_of_day.as_str(),
            CategoricalFeature::TimeSinceLastCat => self.velocity.time_since_last_cat.as_str(),
            CategoricalFeature::DistanceHomeCat => self.distance.distance_home_cat.as_str(),
        }
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Computes derived columns from validated transactions.
///
/// Stateless; the same instance may be shared across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureDeriver;

impl FeatureDeriver {
    pub fn new() -> Self {
        Self
    }

    /// Derive features for a single transaction.
    ///
    /// Fails with `MissingField("timestamp")` when the record carries no
    /// timestamp; callers that score live traffic stamp records explicitly
    /// with [`Transaction::with_timestamp_or`] first.
    pub fn derive(&self, tx: &Transaction) -> Result<DerivedFeatures> {
        let timestamp = tx
            .timestamp
            .ok_or_else(|| PipelineError::missing("timestamp"))?;

        Ok(DerivedFeatures {
            transaction: tx.clone(),
            amount: amount_features(tx),
            temporal: temporal_features(timestamp),
            velocity: velocity_features(tx),
            distance: distance_features(tx),
            risk_score: risk_score(tx),
        })
    }

    /// Derive features row by row. Identical to calling [`derive`](Self::derive) per record.
    pub fn derive_batch(&self, batch: &[Transaction]) -> Result<Vec<DerivedFeatures>> {
        let derived = batch
            .iter()
            .map(|tx| self.derive(tx))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            rows = derived.len(),
            features = self.feature_count(),
            "Feature derivation complete"
        );
        Ok(derived)
    }

    /// Number of model-facing columns.
    pub fn feature_count(&self) -> usize {
        NumericFeature::ALL.len() + CategoricalFeature::ALL.len()
    }

    /// Model-facing column names, numeric first, in schema order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        NumericFeature::ALL
            .iter()
            .map(|f| f.name())
            .chain(CategoricalFeature::ALL.iter().map(|f| f.name()))
            .collect()
    }
}
