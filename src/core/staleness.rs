use std::sync::Arc;

use tracing::warn;

use crate::cache::MonthRef;
use crate::domain::{MonthIndex, MonthKey};
use crate::store::Documents;

/// Which kinds of rows an edit touched. Decides how far staleness spreads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditScope {
    pub income: bool,
    pub expenses: bool,
    pub allocations: bool,
}

impl EditScope {
    pub fn income() -> Self {
        Self {
            income: true,
            ..Self::default()
        }
    }

    pub fn expenses() -> Self {
        Self {
            expenses: true,
            ..Self::default()
        }
    }

    pub fn allocations() -> Self {
        Self {
            allocations: true,
            ..Self::default()
        }
    }

    /// Category availability depends on allocations and spending.
    pub fn affects_categories(&self) -> bool {
        self.expenses || self.allocations
    }

    /// Account cash depends on money moving in or out.
    pub fn affects_accounts(&self) -> bool {
        self.income || self.expenses
    }

    pub fn any(&self) -> bool {
        self.income || self.expenses || self.allocations
    }
}

/// An edit that may invalidate months after the edited one.
#[derive(Debug, Clone)]
pub struct StalenessEdit {
    pub budget_id: String,
    pub month: MonthKey,
    pub scope: EditScope,
}

/// Spreads staleness from an edited month to everything downstream of it:
/// the following month's carried snapshot (any edit changes carried figures),
/// every later month's category rows, and the budget-wide snapshot (only
/// edits that move category availability).
///
/// The cache pass is synchronous and covers whatever is currently cached.
/// The store pass is asynchronous, idempotent (a month already marked is not
/// rewritten), and never fails the caller; a month that cannot be marked is
/// logged and will be caught by a later reconciliation instead.
pub struct StalenessPropagator {
    docs: Arc<Documents>,
}

impl StalenessPropagator {
    pub fn new(docs: Arc<Documents>) -> Self {
        Self { docs }
    }

    /// Marks downstream targets in the session cache.
    pub fn mark_cache(&self, edit: &StalenessEdit, index: &MonthIndex) {
        if !edit.scope.any() {
            return;
        }
        let affects_categories = edit.scope.affects_categories();
        let cache = self.docs.cache();
        let mut is_first = true;
        for later in index.after(edit.month) {
            let mark_snapshot = is_first;
            is_first = false;
            if !mark_snapshot && !affects_categories {
                break;
            }
            cache.modify_month(&MonthRef::new(&edit.budget_id, later), |month| {
                if mark_snapshot {
                    month.previous_month_snapshot_stale = true;
                }
                if affects_categories {
                    month.category_balances_stale = true;
                }
            });
            if !affects_categories {
                break;
            }
        }
        if affects_categories {
            cache.modify_budget(&edit.budget_id, |budget| {
                budget.mark_snapshot_stale();
            });
        }
    }

    /// Marks downstream targets in the store. Best effort; errors are logged
    /// and swallowed.
    pub async fn propagate_store(&self, edit: &StalenessEdit, index: &MonthIndex) {
        if !edit.scope.any() {
            return;
        }
        let affects_categories = edit.scope.affects_categories();
        let mut is_first = true;
        for later in index.after(edit.month) {
            let mark_snapshot = is_first;
            is_first = false;
            if !mark_snapshot && !affects_categories {
                break;
            }
            let month_ref = MonthRef::new(&edit.budget_id, later);
            let result = self
                .docs
                .update_month_in_store(&month_ref, |month| {
                    let mut changed = false;
                    if mark_snapshot && !month.previous_month_snapshot_stale {
                        month.previous_month_snapshot_stale = true;
                        changed = true;
                    }
                    if affects_categories && !month.category_balances_stale {
                        month.category_balances_stale = true;
                        changed = true;
                    }
                    if changed {
                        month.touch();
                    }
                    changed
                })
                .await;
            if let Err(error) = result {
                warn!(
                    budget = %edit.budget_id,
                    month = %later,
                    %error,
                    "failed to mark downstream month stale"
                );
            }
            if !affects_categories {
                break;
            }
        }
        if affects_categories {
            self.mark_budget_snapshot_stale(&edit.budget_id).await;
        }
    }

    /// Marks one month's carried snapshot stale in cache and store. Used when
    /// a reconcile discovers that its carried figures changed, so the chain
    /// heals one link per read.
    pub async fn mark_month_snapshot_stale(&self, budget_id: &str, key: MonthKey) {
        let month_ref = MonthRef::new(budget_id, key);
        self.docs.cache().modify_month(&month_ref, |month| {
            month.previous_month_snapshot_stale = true;
        });
        let result = self
            .docs
            .update_month_in_store(&month_ref, |month| {
                if month.previous_month_snapshot_stale {
                    false
                } else {
                    month.previous_month_snapshot_stale = true;
                    month.touch();
                    true
                }
            })
            .await;
        if let Err(error) = result {
            warn!(budget = budget_id, month = %key, %error, "failed to mark carried snapshot stale");
        }
    }

    /// Marks the budget-wide snapshot stale in cache and store.
    pub async fn mark_budget_snapshot_stale(&self, budget_id: &str) {
        self.docs.cache().modify_budget(budget_id, |budget| {
            budget.mark_snapshot_stale();
        });
        let result = self
            .docs
            .update_budget_in_store(budget_id, |budget| budget.mark_snapshot_stale())
            .await;
        if let Err(error) = result {
            warn!(budget = budget_id, %error, "failed to mark budget snapshot stale");
        }
    }
}
