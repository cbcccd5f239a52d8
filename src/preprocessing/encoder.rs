//! Label encoding for categorical columns

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Code assigned to values that were not seen during fit.
pub const UNSEEN_CATEGORY: i64 = -1;

/// Fitted category -> code mapping for one column.
///
/// Classes are kept sorted; a value's code is its index in that order. The
/// order depends only on the set of values seen during fit, not on row order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCodes {
    classes: Vec<String>,
}

impl CategoryCodes {
    /// Build codes from the distinct values of a column.
    pub fn fit<S: AsRef<str>>(values: &[S]) -> Self {
        let mut classes: Vec<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
        classes.sort_unstable();
        classes.dedup();
        Self { classes }
    }

    /// Rebuild from a persisted class list. The list must be sorted and unique.
    pub fn from_classes(classes: Vec<String>) -> Option<Self> {
        classes
            .windows(2)
            .all(|w| w[0] < w[1])
            .then_some(Self { classes })
    }

    /// Code for a single value, or [`UNSEEN_CATEGORY`].
    pub fn code(&self, value: &str) -> i64 {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(value))
            .map(|idx| idx as i64)
            .unwrap_or(UNSEEN_CATEGORY)
    }

    /// Encode a whole column.
    pub fn encode<S: AsRef<str>>(&self, values: &[S]) -> Vec<i64> {
        values.iter().map(|v| self.code(v.as_ref())).collect()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Categorical encoder with explicit fit / apply phases.
#[derive(Debug, Clone, Default)]
pub struct CategoricalEncoder {
    codes: Option<CategoryCodes>,
}

impl CategoricalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap previously fitted codes.
    pub fn from_state(codes: CategoryCodes) -> Self {
        Self { codes: Some(codes) }
    }

    /// Fit on a column, replacing any earlier fit.
    pub fn fit<S: AsRef<str>>(&mut self, values: &[S]) -> &CategoryCodes {
        self.codes.insert(CategoryCodes::fit(values))
    }

    /// Encode a column; unseen values map to [`UNSEEN_CATEGORY`].
    pub fn apply<S: AsRef<str>>(&self, values: &[S]) -> Result<Vec<i64>> {
        let codes = self
            .codes
            .as_ref()
            .ok_or(PipelineError::NotFitted("CategoricalEncoder"))?;
        Ok(codes.encode(values))
    }

    pub fn state(&self) -> Option<&CategoryCodes> {
        self.codes.as_ref()
    }

    pub fn into_state(self) -> Option<CategoryCodes> {
        self.codes
    }

    pub fn is_fitted(&self) -> bool {
        self.codes.is_some()
    }
}
