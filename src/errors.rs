use thiserror::Error;
use uuid::Uuid;

use crate::domain::MonthKey;
use crate::store::StoreError;

/// Error type that captures common ledger failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("budget not found: {0}")]
    BudgetNotFound(String),
    #[error("month {key} not found in budget {budget_id}")]
    MonthNotFound { budget_id: String, key: MonthKey },
    #[error("month {key} is outside the navigable window")]
    OutOfWindow { key: MonthKey },
    #[error("account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("category not found: {0}")]
    CategoryNotFound(Uuid),
    #[error("entry not found: {0}")]
    EntryNotFound(Uuid),
    #[error("allocations for {key} are finalized")]
    AllocationsFinalized { key: MonthKey },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
