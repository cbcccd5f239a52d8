//! Declared column schema.
//!
//! Every column the pipeline produces is named here exactly once, together
//! with its kind. Column order in the fitted artifact (and therefore in the
//! feature matrix) follows the order of the `ALL` arrays.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Columns that are standardized by the numeric scaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericFeature {
    Amount,
    CardPresent,
    DistanceFromHome,
    DistanceFromLastTransaction,
    TimeSinceLastTransaction,
    CustomerAge,
    CustomerTenureDays,
    AvgTransactionAmount30d,
    NumTransactions24h,
    NumTransactions7d,
    AmountLog,
    AmountToAvgRatio,
    Hour,
    DayOfWeek,
    DayOfMonth,
    IsWeekend,
    IsPeakHour,
    IsHighFrequency24h,
    IsHighFrequency7d,
    IsFarFromHome,
    IsFarFromLast,
    RiskScore,
}

impl NumericFeature {
    pub const ALL: [NumericFeature; 22] = [
        NumericFeature::Amount,
        NumericFeature::CardPresent,
        NumericFeature::DistanceFromHome,
        NumericFeature::DistanceFromLastTransaction,
        NumericFeature::TimeSinceLastTransaction,
        NumericFeature::CustomerAge,
        NumericFeature::CustomerTenureDays,
        NumericFeature::AvgTransactionAmount30d,
        NumericFeature::NumTransactions24h,
        NumericFeature::NumTransactions7d,
        NumericFeature::AmountLog,
        NumericFeature::AmountToAvgRatio,
        NumericFeature::Hour,
        NumericFeature::DayOfWeek,
        NumericFeature::DayOfMonth,
        NumericFeature::IsWeekend,
        NumericFeature::IsPeakHour,
        NumericFeature::IsHighFrequency24h,
        NumericFeature::IsHighFrequency7d,
        NumericFeature::IsFarFromHome,
        NumericFeature::IsFarFromLast,
        NumericFeature::RiskScore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NumericFeature::Amount => "amount",
            NumericFeature::CardPresent => "card_present",
            NumericFeature::DistanceFromHome => "distance_from_home",
            NumericFeature::DistanceFromLastTransaction => "distance_from_last_transaction",
            NumericFeature::TimeSinceLastTransaction => "time_since_last_transaction",
            NumericFeature::CustomerAge => "customer_age",
            NumericFeature::CustomerTenureDays => "customer_tenure_days",
            NumericFeature::AvgTransactionAmount30d => "avg_transaction_amount_30d",
            NumericFeature::NumTransactions24h => "num_transactions_24h",
            NumericFeature::NumTransactions7d => "num_transactions_7d",
            NumericFeature::AmountLog => "amount_log",
            NumericFeature::AmountToAvgRatio => "amount_to_avg_ratio",
            NumericFeature::Hour => "hour",
            NumericFeature::DayOfWeek => "day_of_week",
            NumericFeature::DayOfMonth => "day_of_month",
            NumericFeature::IsWeekend => "is_weekend",
            NumericFeature::IsPeakHour => "is_peak_hour",
            NumericFeature::IsHighFrequency24h => "is_high_frequency_24h",
            NumericFeature::IsHighFrequency7d => "is_high_frequency_7d",
            NumericFeature::IsFarFromHome => "is_far_from_home",
            NumericFeature::IsFarFromLast => "is_far_from_last",
            NumericFeature::RiskScore => "risk_score",
        }
    }
}

/// Columns that are label-encoded to integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CategoricalFeature {
    MerchantCategory,
    TransactionType,
    AmountCategory,
    TimeOfDay,
    TimeSinceLastCat,
    DistanceHomeCat,
}

impl CategoricalFeature {
    pub const ALL: [CategoricalFeature; 6] = [
        CategoricalFeature::MerchantCategory,
        CategoricalFeature::TransactionType,
        CategoricalFeature::AmountCategory,
        CategoricalFeature::TimeOfDay,
        CategoricalFeature::TimeSinceLastCat,
        CategoricalFeature::DistanceHomeCat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CategoricalFeature::MerchantCategory => "merchant_category",
            CategoricalFeature::TransactionType => "transaction_type",
            CategoricalFeature::AmountCategory => "amount_category",
            CategoricalFeature::TimeOfDay => "time_of_day",
            CategoricalFeature::TimeSinceLastCat => "time_since_last_cat",
            CategoricalFeature::DistanceHomeCat => "distance_home_cat",
        }
    }
}

/// Columns that never reach the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExcludedColumn {
    TransactionId,
    Timestamp,
    Label,
}

impl ExcludedColumn {
    pub const ALL: [ExcludedColumn; 3] = [
        ExcludedColumn::TransactionId,
        ExcludedColumn::Timestamp,
        ExcludedColumn::Label,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExcludedColumn::TransactionId => "transaction_id",
            ExcludedColumn::Timestamp => "timestamp",
            ExcludedColumn::Label => "is_fraud",
        }
    }
}

/// Kind of a named column, as classified by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric(NumericFeature),
    Categorical(CategoricalFeature),
    Excluded(ExcludedColumn),
}

impl ColumnKind {
    pub fn label(self) -> &'static str {
        match self {
            ColumnKind::Numeric(_) => "numeric",
            ColumnKind::Categorical(_) => "categorical",
            ColumnKind::Excluded(_) => "excluded",
        }
    }
}

/// Look a column name up in the schema.
pub fn classify(name: &str) -> Option<ColumnKind> {
    if let Ok(f) = name.parse::<NumericFeature>() {
        return Some(ColumnKind::Numeric(f));
    }
    if let Ok(f) = name.parse::<CategoricalFeature>() {
        return Some(ColumnKind::Categorical(f));
    }
    ExcludedColumn::ALL
        .into_iter()
        .find(|c| c.name() == name)
        .map(ColumnKind::Excluded)
}

/// Name was not found in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown column `{0}`")]
pub struct UnknownColumn(pub String);

impl FromStr for NumericFeature {
    type Err = UnknownColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NumericFeature::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| UnknownColumn(s.to_string()))
    }
}

impl FromStr for CategoricalFeature {
    type Err = UnknownColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategoricalFeature::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| UnknownColumn(s.to_string()))
    }
}

impl fmt::Display for NumericFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for CategoricalFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
