//! Month-level operations: opening months, entry CRUD, allocations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;
use uuid::Uuid;

use super::mutation::{LedgerMutation, MutationCoordinator};
use super::snapshot::SnapshotCarryForward;
use super::staleness::{EditScope, StalenessEdit, StalenessPropagator};
use super::walker::BalanceWalker;
use super::window::{MonthAccess, MonthWindowPolicy};
use crate::cache::{CachedDoc, EntityKey, MonthRef, SessionCache};
use crate::domain::{BudgetLedger, ExpenseEntry, IncomeEntry, MonthIndex, MonthKey, MonthLedger};
use crate::errors::LedgerError;
use crate::store::Documents;
use crate::time::Clock;

/// Fields for a new income entry.
#[derive(Debug, Clone)]
pub struct NewIncome {
    pub amount: f64,
    pub account_id: Uuid,
    pub date: NaiveDate,
    pub payee: Option<String>,
    pub description: Option<String>,
}

/// Fields for a new expense entry.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub amount: f64,
    pub category_id: Uuid,
    pub account_id: Uuid,
    pub date: NaiveDate,
    pub payee: Option<String>,
    pub description: Option<String>,
    pub cleared: bool,
}

/// Partial update for an income entry. `None` keeps the current value;
/// for the clearable fields, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct IncomePatch {
    pub amount: Option<f64>,
    pub account_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub payee: Option<Option<String>>,
    pub description: Option<Option<String>>,
}

impl IncomePatch {
    fn apply_to(&self, entry: &mut IncomeEntry) {
        if let Some(amount) = self.amount {
            entry.amount = amount;
        }
        if let Some(account_id) = self.account_id {
            entry.account_id = account_id;
        }
        if let Some(date) = self.date {
            entry.date = date;
        }
        if let Some(ref payee) = self.payee {
            entry.payee = payee.clone();
        }
        if let Some(ref description) = self.description {
            entry.description = description.clone();
        }
    }
}

/// Partial update for an expense entry.
#[derive(Debug, Clone, Default)]
pub struct ExpensePatch {
    pub amount: Option<f64>,
    pub category_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub payee: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub cleared: Option<bool>,
}

impl ExpensePatch {
    fn apply_to(&self, entry: &mut ExpenseEntry) {
        if let Some(amount) = self.amount {
            entry.amount = amount;
        }
        if let Some(category_id) = self.category_id {
            entry.category_id = category_id;
        }
        if let Some(account_id) = self.account_id {
            entry.account_id = account_id;
        }
        if let Some(date) = self.date {
            entry.date = date;
        }
        if let Some(ref payee) = self.payee {
            entry.payee = payee.clone();
        }
        if let Some(ref description) = self.description {
            entry.description = description.clone();
        }
        if let Some(cleared) = self.cleared {
            entry.cleared = cleared;
        }
    }
}

/// Rederives the edited month's own aggregates and sets the flags the edit
/// leaves behind. Category rows are marked for revalidation on any
/// category-affecting edit; account balances only stay suspect while the
/// carried snapshot itself is.
fn finish_edit(month: &mut MonthLedger, scope: EditScope) {
    month.recompute_derived();
    if scope.affects_categories() {
        month.category_balances_stale = true;
    }
    if scope.affects_accounts() && month.previous_month_snapshot_stale {
        month.account_balances_stale = true;
    }
    month.touch();
}

/// Generic optimistic edit of one month document. The closure is applied to
/// the cached copy during apply and to the authoritative copy during commit.
struct MonthEdit<F> {
    month_ref: MonthRef,
    scope: EditScope,
    edit: F,
}

#[async_trait]
impl<F> LedgerMutation for MonthEdit<F>
where
    F: Fn(&mut MonthLedger) -> Result<(), LedgerError> + Send + Sync,
{
    type Output = MonthLedger;

    fn touched(&self) -> Vec<EntityKey> {
        vec![EntityKey::Month(self.month_ref.clone())]
    }

    fn staleness(&self) -> Option<StalenessEdit> {
        Some(StalenessEdit {
            budget_id: self.month_ref.budget_id.clone(),
            month: self.month_ref.key,
            scope: self.scope,
        })
    }

    fn apply(&self, cache: &SessionCache) {
        cache.modify_month(&self.month_ref, |month| {
            if (self.edit)(month).is_ok() {
                finish_edit(month, self.scope);
            }
        });
    }

    async fn commit(&self, docs: &Documents) -> Result<MonthLedger, LedgerError> {
        let Some(mut month) = docs.month_from_store(&self.month_ref).await? else {
            return Err(LedgerError::MonthNotFound {
                budget_id: self.month_ref.budget_id.clone(),
                key: self.month_ref.key,
            });
        };
        (self.edit)(&mut month)?;
        finish_edit(&mut month, self.scope);
        docs.write_month(&month).await?;
        Ok(month)
    }
}

/// Creates a month document if it does not exist yet, carrying a snapshot of
/// the nearest prior month. Idempotent: an already-existing document is
/// adopted untouched, and a document missing from the index is re-indexed.
struct CreateMonth {
    month_ref: MonthRef,
    snapshots: Arc<SnapshotCarryForward>,
    now: DateTime<Utc>,
}

#[async_trait]
impl LedgerMutation for CreateMonth {
    type Output = MonthLedger;

    fn touched(&self) -> Vec<EntityKey> {
        vec![
            EntityKey::Month(self.month_ref.clone()),
            EntityKey::Budget(self.month_ref.budget_id.clone()),
        ]
    }

    fn apply(&self, cache: &SessionCache) {
        let month = MonthLedger::new(&self.month_ref.budget_id, self.month_ref.key);
        cache.overwrite(CachedDoc::Month(month));
        cache.modify_budget(&self.month_ref.budget_id, |budget| {
            budget.month_index.insert(self.month_ref.key);
        });
    }

    async fn commit(&self, docs: &Documents) -> Result<MonthLedger, LedgerError> {
        let budget_id = &self.month_ref.budget_id;
        if let Some(existing) = docs.month_from_store(&self.month_ref).await? {
            docs.cache().overwrite(CachedDoc::Month(existing.clone()));
            docs.update_budget_in_store(budget_id, |budget| {
                if budget.month_index.insert(self.month_ref.key) {
                    budget.touch();
                    true
                } else {
                    false
                }
            })
            .await?;
            return Ok(existing);
        }

        let Some(mut budget) = docs.budget_from_store(budget_id).await? else {
            return Err(LedgerError::BudgetNotFound(budget_id.clone()));
        };
        let mut month = MonthLedger::new(budget_id, self.month_ref.key);
        month.created_at = self.now;
        month.updated_at = self.now;
        month.previous_month_snapshot = Some(
            self.snapshots
                .build(budget_id, self.month_ref.key, &budget.month_index, self.now)
                .await?,
        );
        month.recompute_derived();
        docs.write_month(&month).await?;

        if budget.month_index.insert(self.month_ref.key) {
            budget.touch();
            docs.write_budget(&budget).await?;
        }
        Ok(month)
    }
}

/// Month-level API: navigation plus validated entry and allocation edits.
///
/// Every operation resolves the month through the window policy, lazily
/// creating creatable months, and heals staleness before handing the month
/// out. Edits run through the mutation coordinator.
pub struct MonthService {
    docs: Arc<Documents>,
    coordinator: Arc<MutationCoordinator>,
    propagator: Arc<StalenessPropagator>,
    snapshots: Arc<SnapshotCarryForward>,
    walker: Arc<BalanceWalker>,
    window: MonthWindowPolicy,
    clock: Arc<dyn Clock>,
}

impl MonthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        docs: Arc<Documents>,
        coordinator: Arc<MutationCoordinator>,
        propagator: Arc<StalenessPropagator>,
        snapshots: Arc<SnapshotCarryForward>,
        walker: Arc<BalanceWalker>,
        window: MonthWindowPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            docs,
            coordinator,
            propagator,
            snapshots,
            walker,
            window,
            clock,
        }
    }

    /// Opens a month for viewing or editing. Existing months are read and
    /// reconciled; months inside the creatable window are created lazily with
    /// a carried snapshot; anything else is rejected.
    pub async fn open_month(
        &self,
        budget_id: &str,
        key: MonthKey,
    ) -> Result<MonthLedger, LedgerError> {
        let budget = self.require_budget(budget_id).await?;
        let today = self.clock.current_month();
        let access = self.window.check(key, today, &budget.month_index)?;
        let month_ref = MonthRef::new(budget_id, key);

        if access == MonthAccess::Existing {
            if let Some(month) = self.docs.month(&month_ref).await? {
                return self.reconcile_on_read(month, &budget.month_index).await;
            }
            warn!(budget = budget_id, month = %key, "indexed month has no document, recreating");
        }

        let month = self
            .coordinator
            .execute(
                CreateMonth {
                    month_ref,
                    snapshots: self.snapshots.clone(),
                    now: self.clock.now(),
                },
                &budget.month_index,
            )
            .await?;
        // Filling a gap changes what the next month should carry forward.
        if let Some(next) = budget.month_index.after(key).next() {
            self.propagator
                .mark_month_snapshot_stale(budget_id, next)
                .await;
        }
        Ok(month)
    }

    /// Heals whatever the staleness flags say needs healing, in dependency
    /// order, and persists the result in one write. A failed persist is
    /// logged; the caller still gets the reconciled figures.
    async fn reconcile_on_read(
        &self,
        mut month: MonthLedger,
        index: &MonthIndex,
    ) -> Result<MonthLedger, LedgerError> {
        if month.fully_valid() {
            return Ok(month);
        }

        let mut carried_changed = false;
        if month.previous_month_snapshot_stale {
            carried_changed = self
                .snapshots
                .reconcile(&mut month, index, self.clock.now())
                .await?;
        } else {
            if month.category_balances_stale {
                self.walker.rebuild_month_balances(&mut month, index).await?;
                month.touch();
            }
            if month.account_balances_stale {
                month.recompute_account_balances();
                month.account_balances_stale = false;
                month.touch();
            }
        }

        if let Err(error) = self.docs.write_month(&month).await {
            warn!(
                budget = %month.budget_id,
                month = %month.key(),
                %error,
                "failed to persist reconciled month, serving computed figures"
            );
            self.docs.cache().overwrite(CachedDoc::Month(month.clone()));
        }
        if carried_changed {
            if let Some(next) = index.after(month.key()).next() {
                self.propagator
                    .mark_month_snapshot_stale(&month.budget_id, next)
                    .await;
            }
        }
        Ok(month)
    }

    pub async fn record_income(
        &self,
        budget_id: &str,
        key: MonthKey,
        input: NewIncome,
    ) -> Result<Uuid, LedgerError> {
        let budget = self.require_budget(budget_id).await?;
        ensure_amount(input.amount)?;
        ensure_account(&budget, input.account_id)?;
        self.open_month(budget_id, key).await?;

        let entry = IncomeEntry {
            id: Uuid::new_v4(),
            amount: input.amount,
            account_id: input.account_id,
            date: input.date,
            payee: input.payee,
            description: input.description,
        };
        let entry_id = entry.id;
        let payee = entry.payee.clone();
        let index = self.require_budget(budget_id).await?.month_index;
        self.coordinator
            .execute(
                MonthEdit {
                    month_ref: MonthRef::new(budget_id, key),
                    scope: EditScope::income(),
                    edit: move |month: &mut MonthLedger| {
                        month.income.push(entry.clone());
                        Ok(())
                    },
                },
                &index,
            )
            .await?;
        self.record_payee_best_effort(budget_id, payee.as_deref())
            .await;
        Ok(entry_id)
    }

    pub async fn update_income(
        &self,
        budget_id: &str,
        key: MonthKey,
        entry_id: Uuid,
        patch: IncomePatch,
    ) -> Result<(), LedgerError> {
        let budget = self.require_budget(budget_id).await?;
        if let Some(amount) = patch.amount {
            ensure_amount(amount)?;
        }
        if let Some(account_id) = patch.account_id {
            ensure_account(&budget, account_id)?;
        }
        let month = self.open_month(budget_id, key).await?;
        if month.income_entry(entry_id).is_none() {
            return Err(LedgerError::EntryNotFound(entry_id));
        }

        let payee = patch.payee.clone().flatten();
        let index = self.require_budget(budget_id).await?.month_index;
        self.coordinator
            .execute(
                MonthEdit {
                    month_ref: MonthRef::new(budget_id, key),
                    scope: EditScope::income(),
                    edit: move |month: &mut MonthLedger| {
                        let entry = month
                            .income_entry_mut(entry_id)
                            .ok_or(LedgerError::EntryNotFound(entry_id))?;
                        patch.apply_to(entry);
                        Ok(())
                    },
                },
                &index,
            )
            .await?;
        self.record_payee_best_effort(budget_id, payee.as_deref())
            .await;
        Ok(())
    }

    pub async fn remove_income(
        &self,
        budget_id: &str,
        key: MonthKey,
        entry_id: Uuid,
    ) -> Result<(), LedgerError> {
        self.require_budget(budget_id).await?;
        let month = self.open_month(budget_id, key).await?;
        if month.income_entry(entry_id).is_none() {
            return Err(LedgerError::EntryNotFound(entry_id));
        }
        let index = self.require_budget(budget_id).await?.month_index;
        self.coordinator
            .execute(
                MonthEdit {
                    month_ref: MonthRef::new(budget_id, key),
                    scope: EditScope::income(),
                    edit: move |month: &mut MonthLedger| {
                        month
                            .remove_income_entry(entry_id)
                            .map(|_| ())
                            .ok_or(LedgerError::EntryNotFound(entry_id))
                    },
                },
                &index,
            )
            .await?;
        Ok(())
    }

    pub async fn record_expense(
        &self,
        budget_id: &str,
        key: MonthKey,
        input: NewExpense,
    ) -> Result<Uuid, LedgerError> {
        let budget = self.require_budget(budget_id).await?;
        ensure_amount(input.amount)?;
        ensure_account(&budget, input.account_id)?;
        ensure_category(&budget, input.category_id)?;
        self.open_month(budget_id, key).await?;

        let entry = ExpenseEntry {
            id: Uuid::new_v4(),
            amount: input.amount,
            category_id: input.category_id,
            account_id: input.account_id,
            date: input.date,
            payee: input.payee,
            description: input.description,
            cleared: input.cleared,
        };
        let entry_id = entry.id;
        let payee = entry.payee.clone();
        let index = self.require_budget(budget_id).await?.month_index;
        self.coordinator
            .execute(
                MonthEdit {
                    month_ref: MonthRef::new(budget_id, key),
                    scope: EditScope::expenses(),
                    edit: move |month: &mut MonthLedger| {
                        month.expenses.push(entry.clone());
                        Ok(())
                    },
                },
                &index,
            )
            .await?;
        self.record_payee_best_effort(budget_id, payee.as_deref())
            .await;
        Ok(entry_id)
    }

    pub async fn update_expense(
        &self,
        budget_id: &str,
        key: MonthKey,
        entry_id: Uuid,
        patch: ExpensePatch,
    ) -> Result<(), LedgerError> {
        let budget = self.require_budget(budget_id).await?;
        if let Some(amount) = patch.amount {
            ensure_amount(amount)?;
        }
        if let Some(account_id) = patch.account_id {
            ensure_account(&budget, account_id)?;
        }
        if let Some(category_id) = patch.category_id {
            ensure_category(&budget, category_id)?;
        }
        let month = self.open_month(budget_id, key).await?;
        if month.expense_entry(entry_id).is_none() {
            return Err(LedgerError::EntryNotFound(entry_id));
        }

        let payee = patch.payee.clone().flatten();
        let index = self.require_budget(budget_id).await?.month_index;
        self.coordinator
            .execute(
                MonthEdit {
                    month_ref: MonthRef::new(budget_id, key),
                    scope: EditScope::expenses(),
                    edit: move |month: &mut MonthLedger| {
                        let entry = month
                            .expense_entry_mut(entry_id)
                            .ok_or(LedgerError::EntryNotFound(entry_id))?;
                        patch.apply_to(entry);
                        Ok(())
                    },
                },
                &index,
            )
            .await?;
        self.record_payee_best_effort(budget_id, payee.as_deref())
            .await;
        Ok(())
    }

    pub async fn remove_expense(
        &self,
        budget_id: &str,
        key: MonthKey,
        entry_id: Uuid,
    ) -> Result<(), LedgerError> {
        self.require_budget(budget_id).await?;
        let month = self.open_month(budget_id, key).await?;
        if month.expense_entry(entry_id).is_none() {
            return Err(LedgerError::EntryNotFound(entry_id));
        }
        let index = self.require_budget(budget_id).await?.month_index;
        self.coordinator
            .execute(
                MonthEdit {
                    month_ref: MonthRef::new(budget_id, key),
                    scope: EditScope::expenses(),
                    edit: move |month: &mut MonthLedger| {
                        month
                            .remove_expense_entry(entry_id)
                            .map(|_| ())
                            .ok_or(LedgerError::EntryNotFound(entry_id))
                    },
                },
                &index,
            )
            .await?;
        Ok(())
    }

    /// Upserts one category's budgeted amount for the month. Zero removes the
    /// row. Rejected while the month's allocations are finalized.
    pub async fn set_allocation(
        &self,
        budget_id: &str,
        key: MonthKey,
        category_id: Uuid,
        amount: f64,
    ) -> Result<(), LedgerError> {
        let budget = self.require_budget(budget_id).await?;
        ensure_category(&budget, category_id)?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::Validation(
                "allocation amount must be finite and non-negative".into(),
            ));
        }
        let month = self.open_month(budget_id, key).await?;
        if month.allocations_finalized {
            return Err(LedgerError::AllocationsFinalized { key });
        }
        let index = self.require_budget(budget_id).await?.month_index;
        self.coordinator
            .execute(
                MonthEdit {
                    month_ref: MonthRef::new(budget_id, key),
                    scope: EditScope::allocations(),
                    edit: move |month: &mut MonthLedger| {
                        if month.allocations_finalized {
                            return Err(LedgerError::AllocationsFinalized { key });
                        }
                        month.set_allocation(category_id, amount);
                        Ok(())
                    },
                },
                &index,
            )
            .await?;
        Ok(())
    }

    /// Locks the month's allocations in, making them count toward category
    /// balances.
    pub async fn finalize_allocations(
        &self,
        budget_id: &str,
        key: MonthKey,
    ) -> Result<(), LedgerError> {
        self.set_allocations_finalized(budget_id, key, true).await
    }

    /// Unlocks a finalized month for further allocation edits.
    pub async fn reopen_allocations(
        &self,
        budget_id: &str,
        key: MonthKey,
    ) -> Result<(), LedgerError> {
        self.set_allocations_finalized(budget_id, key, false).await
    }

    async fn set_allocations_finalized(
        &self,
        budget_id: &str,
        key: MonthKey,
        finalized: bool,
    ) -> Result<(), LedgerError> {
        self.require_budget(budget_id).await?;
        let month = self.open_month(budget_id, key).await?;
        if month.allocations_finalized == finalized {
            return Ok(());
        }
        let index = self.require_budget(budget_id).await?.month_index;
        self.coordinator
            .execute(
                MonthEdit {
                    month_ref: MonthRef::new(budget_id, key),
                    scope: EditScope::allocations(),
                    edit: move |month: &mut MonthLedger| {
                        month.allocations_finalized = finalized;
                        Ok(())
                    },
                },
                &index,
            )
            .await?;
        Ok(())
    }

    async fn require_budget(&self, budget_id: &str) -> Result<BudgetLedger, LedgerError> {
        self.docs
            .budget(budget_id)
            .await?
            .ok_or_else(|| LedgerError::BudgetNotFound(budget_id.to_string()))
    }

    async fn record_payee_best_effort(&self, budget_id: &str, payee: Option<&str>) {
        let Some(name) = payee else {
            return;
        };
        if let Err(error) = self.docs.record_payee(budget_id, name).await {
            warn!(budget = budget_id, %error, "failed to record payee");
        }
    }
}

// serde_json writes non-finite floats as null, so they must never reach a
// stored document.
fn ensure_amount(amount: f64) -> Result<(), LedgerError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(LedgerError::Validation(
            "amount must be positive and finite".into(),
        ))
    }
}

fn ensure_account(budget: &BudgetLedger, id: Uuid) -> Result<(), LedgerError> {
    budget
        .account(id)
        .map(|_| ())
        .ok_or(LedgerError::AccountNotFound(id))
}

fn ensure_category(budget: &BudgetLedger, id: Uuid) -> Result<(), LedgerError> {
    budget
        .category(id)
        .map(|_| ())
        .ok_or(LedgerError::CategoryNotFound(id))
}
