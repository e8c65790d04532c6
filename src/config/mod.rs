use serde::{Deserialize, Serialize};

/// Tunable bounds for balance walks, month navigation, and money comparisons.
///
/// A plain value type injected into [`crate::core::Session`]; every field has
/// a production default, so `CoreConfig::default()` is the common case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Most months a balance walk may read backward before giving up with a
    /// partial result.
    pub walk_back_limit: u32,
    /// Most months a walk may project forward past the reference month.
    pub walk_forward_limit: u32,
    /// How far back from today months stay creatable.
    pub past_window_months: u32,
    /// How far ahead of today months may be created.
    pub future_window_months: u32,
    /// Absolute difference under which two money amounts count as equal.
    pub balance_tolerance: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            walk_back_limit: 120,
            walk_forward_limit: 24,
            past_window_months: 12,
            future_window_months: 3,
            balance_tolerance: 0.01,
        }
    }
}
