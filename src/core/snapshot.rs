use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::walker::BalanceWalker;
use crate::cache::MonthRef;
use crate::domain::{MonthIndex, MonthKey, MonthLedger, PreviousMonthSnapshot};
use crate::errors::LedgerError;
use crate::store::Documents;

/// Builds and refreshes the prior-month summary a month carries so that
/// viewing it never requires reading the whole history.
pub struct SnapshotCarryForward {
    docs: Arc<Documents>,
    walker: Arc<BalanceWalker>,
    tolerance: f64,
}

impl SnapshotCarryForward {
    pub fn new(docs: Arc<Documents>, walker: Arc<BalanceWalker>, tolerance: f64) -> Self {
        Self {
            docs,
            walker,
            tolerance,
        }
    }

    /// Summary of the nearest existing month before `key`. Endings come from
    /// the walker, so a prior month whose own aggregates are stale still
    /// yields correct carried figures. A budget with no prior months gets a
    /// zeroed summary.
    pub async fn build(
        &self,
        budget_id: &str,
        key: MonthKey,
        index: &MonthIndex,
        taken_at: DateTime<Utc>,
    ) -> Result<PreviousMonthSnapshot, LedgerError> {
        let Some(prior) = index.nearest_before(key) else {
            return Ok(PreviousMonthSnapshot::zeroed(taken_at));
        };
        let ends = self.walker.ends_through(budget_id, prior, index).await?;
        let total_income = self
            .docs
            .month(&MonthRef::new(budget_id, prior))
            .await?
            .map(|month| month.total_income)
            .unwrap_or(0.0);
        Ok(PreviousMonthSnapshot {
            total_income,
            account_balances_end: ends.account_ends,
            category_balances_end: ends.category_ends,
            taken_at,
        })
    }

    /// Replaces `month`'s carried summary with a freshly built one and
    /// rederives everything hanging off it, clearing all three staleness
    /// flags. Returns whether the carried figures changed beyond tolerance,
    /// which tells the caller to mark the following month in turn.
    pub async fn reconcile(
        &self,
        month: &mut MonthLedger,
        index: &MonthIndex,
        taken_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let fresh = self
            .build(&month.budget_id, month.key(), index, taken_at)
            .await?;
        let changed = match month.previous_month_snapshot {
            Some(ref old) => fresh.differs_from(old, self.tolerance),
            None => true,
        };
        debug!(
            budget = %month.budget_id,
            month = %month.key(),
            changed,
            "reconciled carried snapshot"
        );
        month.previous_month_snapshot = Some(fresh);
        month.recompute_derived();
        month.previous_month_snapshot_stale = false;
        month.account_balances_stale = false;
        month.category_balances_stale = false;
        month.touch();
        Ok(changed)
    }
}
