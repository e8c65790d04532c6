use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::cache::MonthRef;
use crate::config::CoreConfig;
use crate::domain::{MonthIndex, MonthKey, MonthLedger};
use crate::errors::LedgerError;
use crate::store::Documents;

/// Ending balances reconstructed through one month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthEnds {
    pub category_ends: BTreeMap<Uuid, f64>,
    pub account_ends: BTreeMap<Uuid, f64>,
}

/// Per-category availability as of a reference month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkedBalances {
    /// Available through the reference month.
    pub current: BTreeMap<Uuid, f64>,
    /// Available including future months already entered.
    pub total: BTreeMap<Uuid, f64>,
}

/// Reconstructs balances from the month chain.
///
/// Backward: from the reference month, find the nearest month whose derived
/// aggregates are all trustworthy, take its endings as the seed, and replay
/// the raw activity of every month in between. Forward: extend the current
/// figures with the contributions of contiguous already-entered future
/// months. Both directions are bounded; hitting a bound logs a warning and
/// yields the best-effort partial figures rather than failing.
pub struct BalanceWalker {
    docs: Arc<Documents>,
    back_limit: u32,
    forward_limit: u32,
}

impl BalanceWalker {
    pub fn new(docs: Arc<Documents>, config: &CoreConfig) -> Self {
        Self {
            docs,
            back_limit: config.walk_back_limit,
            forward_limit: config.walk_forward_limit,
        }
    }

    /// Category and account endings through `as_of`, trusting stored rows
    /// where valid and replaying raw activity where not.
    pub async fn ends_through(
        &self,
        budget_id: &str,
        as_of: MonthKey,
        index: &MonthIndex,
    ) -> Result<MonthEnds, LedgerError> {
        let mut keys: Vec<MonthKey> = Vec::new();
        if index.contains(as_of) {
            keys.push(as_of);
        }
        keys.extend(index.before(as_of));

        let mut replay: Vec<MonthLedger> = Vec::new();
        let mut seed = MonthEnds::default();
        let mut visited = 0u32;

        for key in keys {
            if visited >= self.back_limit {
                warn!(
                    budget = budget_id,
                    reference = %as_of,
                    limit = self.back_limit,
                    "walk-back limit reached, older activity is excluded"
                );
                break;
            }
            let month_ref = MonthRef::new(budget_id, key);
            let Some(month) = self.docs.month(&month_ref).await? else {
                warn!(budget = budget_id, month = %key, "indexed month has no document, skipping");
                continue;
            };
            visited += 1;
            if month.fully_valid() {
                seed = MonthEnds {
                    category_ends: month.category_ends(),
                    account_ends: month.account_balances_end.clone(),
                };
                break;
            }
            replay.push(month);
        }

        let MonthEnds {
            mut category_ends,
            mut account_ends,
        } = seed;
        for month in replay.iter().rev() {
            month.accumulate_category_deltas(&mut category_ends);
            month.accumulate_account_deltas(&mut account_ends);
        }
        Ok(MonthEnds {
            category_ends,
            account_ends,
        })
    }

    /// Current and future-aware category availability as of `as_of`. The
    /// forward pass covers contiguous indexed months only; the first gap ends
    /// it.
    pub async fn compute(
        &self,
        budget_id: &str,
        as_of: MonthKey,
        index: &MonthIndex,
    ) -> Result<WalkedBalances, LedgerError> {
        let ends = self.ends_through(budget_id, as_of, index).await?;
        let current = ends.category_ends;
        let mut total = current.clone();

        let mut cursor = as_of.next();
        let mut steps = 0u32;
        while index.contains(cursor) {
            if steps >= self.forward_limit {
                warn!(
                    budget = budget_id,
                    reference = %as_of,
                    limit = self.forward_limit,
                    "walk-forward limit reached, later months are excluded from totals"
                );
                break;
            }
            let month_ref = MonthRef::new(budget_id, cursor);
            let Some(month) = self.docs.month(&month_ref).await? else {
                warn!(budget = budget_id, month = %cursor, "indexed month has no document, stopping forward walk");
                break;
            };
            month.accumulate_category_deltas(&mut total);
            steps += 1;
            cursor = cursor.next();
        }

        Ok(WalkedBalances { current, total })
    }

    /// Rederives a stale month's category rows from walked start balances and
    /// clears the flag. The caller persists the month.
    pub async fn rebuild_month_balances(
        &self,
        month: &mut MonthLedger,
        index: &MonthIndex,
    ) -> Result<(), LedgerError> {
        let starts = match index.nearest_before(month.key()) {
            Some(prior) => {
                self.ends_through(&month.budget_id, prior, index)
                    .await?
                    .category_ends
            }
            None => BTreeMap::new(),
        };
        month.recompute_category_balances(&starts);
        month.category_balances_stale = false;
        Ok(())
    }
}
