use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PAYEE_SCHEMA_VERSION: u8 = 1;

/// Deduplicated, sorted payee names for one budget. Document id equals the
/// budget id. Maintained best-effort after entry mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayeeBook {
    pub budget_id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default = "PayeeBook::schema_version_default")]
    pub schema_version: u8,
    pub updated_at: DateTime<Utc>,
}

impl PayeeBook {
    pub fn new(budget_id: impl Into<String>) -> Self {
        Self {
            budget_id: budget_id.into(),
            names: Vec::new(),
            schema_version: PAYEE_SCHEMA_VERSION,
            updated_at: Utc::now(),
        }
    }

    /// Inserts `name` keeping the list sorted. Returns whether it was new;
    /// comparison is exact, whitespace-trimmed.
    pub fn record(&mut self, name: &str) -> bool {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return false;
        }
        match self.names.binary_search_by(|n| n.as_str().cmp(trimmed)) {
            Ok(_) => false,
            Err(position) => {
                self.names.insert(position, trimmed.to_string());
                self.updated_at = Utc::now();
                true
            }
        }
    }

    pub fn schema_version_default() -> u8 {
        PAYEE_SCHEMA_VERSION
    }
}
