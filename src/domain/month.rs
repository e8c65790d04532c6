use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::month_key::MonthKey;

pub const MONTH_SCHEMA_VERSION: u8 = 1;

/// Money received during a month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeEntry {
    pub id: Uuid,
    pub amount: f64,
    pub account_id: Uuid,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Money spent during a month, always attributed to a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseEntry {
    pub id: Uuid,
    pub amount: f64,
    pub category_id: Uuid,
    pub account_id: Uuid,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub cleared: bool,
}

/// Budgeted amount for one category in one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub category_id: Uuid,
    pub amount: f64,
}

/// Per-category balance row derived for a month.
///
/// `end_balance = start_balance + allocated - spent`; `allocated` stays zero
/// until the month's allocations are finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBalance {
    pub category_id: Uuid,
    pub start_balance: f64,
    pub allocated: f64,
    pub spent: f64,
    pub end_balance: f64,
}

/// Compact summary carried forward from the nearest prior month so a month
/// view never has to read arbitrarily far back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousMonthSnapshot {
    pub total_income: f64,
    #[serde(default)]
    pub account_balances_end: BTreeMap<Uuid, f64>,
    #[serde(default)]
    pub category_balances_end: BTreeMap<Uuid, f64>,
    pub taken_at: DateTime<Utc>,
}

impl PreviousMonthSnapshot {
    /// Snapshot for a month with no history behind it.
    pub fn zeroed(taken_at: DateTime<Utc>) -> Self {
        Self {
            total_income: 0.0,
            account_balances_end: BTreeMap::new(),
            category_balances_end: BTreeMap::new(),
            taken_at,
        }
    }

    /// Whether the carried figures differ from `other` beyond `tolerance`.
    pub fn differs_from(&self, other: &PreviousMonthSnapshot, tolerance: f64) -> bool {
        if (self.total_income - other.total_income).abs() > tolerance {
            return true;
        }
        maps_differ(
            &self.account_balances_end,
            &other.account_balances_end,
            tolerance,
        ) || maps_differ(
            &self.category_balances_end,
            &other.category_balances_end,
            tolerance,
        )
    }
}

fn maps_differ(a: &BTreeMap<Uuid, f64>, b: &BTreeMap<Uuid, f64>, tolerance: f64) -> bool {
    let keys: std::collections::BTreeSet<&Uuid> = a.keys().chain(b.keys()).collect();
    keys.into_iter().any(|key| {
        let left = a.get(key).copied().unwrap_or(0.0);
        let right = b.get(key).copied().unwrap_or(0.0);
        (left - right).abs() > tolerance
    })
}

/// One budget month: raw activity, derived balances, the carried snapshot of
/// the prior month, and the staleness flags that gate reconciliation.
///
/// The `recompute_*` methods only derive values; setting and clearing the
/// staleness flags is owned by the components that perform the corresponding
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthLedger {
    pub budget_id: String,
    pub year: i32,
    pub month: u32,
    #[serde(default)]
    pub income: Vec<IncomeEntry>,
    #[serde(default)]
    pub total_income: f64,
    #[serde(default)]
    pub expenses: Vec<ExpenseEntry>,
    #[serde(default)]
    pub total_expenses: f64,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    #[serde(default)]
    pub allocations_finalized: bool,
    #[serde(default)]
    pub category_balances: Vec<CategoryBalance>,
    #[serde(default)]
    pub account_balances_start: BTreeMap<Uuid, f64>,
    #[serde(default)]
    pub account_balances_end: BTreeMap<Uuid, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_month_snapshot: Option<PreviousMonthSnapshot>,
    #[serde(default)]
    pub category_balances_stale: bool,
    #[serde(default)]
    pub account_balances_stale: bool,
    #[serde(default)]
    pub previous_month_snapshot_stale: bool,
    #[serde(default = "MonthLedger::schema_version_default")]
    pub schema_version: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonthLedger {
    /// Creates an empty month with no activity and no carried snapshot.
    pub fn new(budget_id: impl Into<String>, key: MonthKey) -> Self {
        let now = Utc::now();
        Self {
            budget_id: budget_id.into(),
            year: key.year,
            month: key.month,
            income: Vec::new(),
            total_income: 0.0,
            expenses: Vec::new(),
            total_expenses: 0.0,
            allocations: Vec::new(),
            allocations_finalized: false,
            category_balances: Vec::new(),
            account_balances_start: BTreeMap::new(),
            account_balances_end: BTreeMap::new(),
            previous_month_snapshot: None,
            category_balances_stale: false,
            account_balances_stale: false,
            previous_month_snapshot_stale: false,
            schema_version: MONTH_SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> MonthKey {
        MonthKey {
            year: self.year,
            month: self.month,
        }
    }

    pub fn document_id(&self) -> String {
        self.key().document_id(&self.budget_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn schema_version_default() -> u8 {
        MONTH_SCHEMA_VERSION
    }

    pub fn income_entry(&self, id: Uuid) -> Option<&IncomeEntry> {
        self.income.iter().find(|entry| entry.id == id)
    }

    pub fn income_entry_mut(&mut self, id: Uuid) -> Option<&mut IncomeEntry> {
        self.income.iter_mut().find(|entry| entry.id == id)
    }

    pub fn remove_income_entry(&mut self, id: Uuid) -> Option<IncomeEntry> {
        let index = self.income.iter().position(|entry| entry.id == id)?;
        Some(self.income.remove(index))
    }

    pub fn expense_entry(&self, id: Uuid) -> Option<&ExpenseEntry> {
        self.expenses.iter().find(|entry| entry.id == id)
    }

    pub fn expense_entry_mut(&mut self, id: Uuid) -> Option<&mut ExpenseEntry> {
        self.expenses.iter_mut().find(|entry| entry.id == id)
    }

    pub fn remove_expense_entry(&mut self, id: Uuid) -> Option<ExpenseEntry> {
        let index = self.expenses.iter().position(|entry| entry.id == id)?;
        Some(self.expenses.remove(index))
    }

    /// Upserts one category's allocation; an amount of exactly zero drops the
    /// row instead of storing it.
    pub fn set_allocation(&mut self, category_id: Uuid, amount: f64) {
        if amount == 0.0 {
            self.allocations.retain(|a| a.category_id != category_id);
            return;
        }
        match self
            .allocations
            .iter_mut()
            .find(|a| a.category_id == category_id)
        {
            Some(existing) => existing.amount = amount,
            None => self.allocations.push(Allocation {
                category_id,
                amount,
            }),
        }
    }

    pub fn allocation_amount(&self, category_id: Uuid) -> f64 {
        self.allocations
            .iter()
            .find(|a| a.category_id == category_id)
            .map(|a| a.amount)
            .unwrap_or(0.0)
    }

    /// Spent amounts grouped by category.
    pub fn expenses_by_category(&self) -> BTreeMap<Uuid, f64> {
        let mut totals = BTreeMap::new();
        for expense in &self.expenses {
            *totals.entry(expense.category_id).or_insert(0.0) += expense.amount;
        }
        totals
    }

    /// Adds this month's net contribution per category into `balances`:
    /// finalized allocations count positively, expenses always count
    /// negatively.
    pub fn accumulate_category_deltas(&self, balances: &mut BTreeMap<Uuid, f64>) {
        if self.allocations_finalized {
            for allocation in &self.allocations {
                *balances.entry(allocation.category_id).or_insert(0.0) += allocation.amount;
            }
        }
        for expense in &self.expenses {
            *balances.entry(expense.category_id).or_insert(0.0) -= expense.amount;
        }
    }

    /// Adds this month's net cash movement per account into `balances`:
    /// income in, expenses out.
    pub fn accumulate_account_deltas(&self, balances: &mut BTreeMap<Uuid, f64>) {
        for entry in &self.income {
            *balances.entry(entry.account_id).or_insert(0.0) += entry.amount;
        }
        for entry in &self.expenses {
            *balances.entry(entry.account_id).or_insert(0.0) -= entry.amount;
        }
    }

    /// Whether every derived aggregate on this month can be trusted as a
    /// walk-back seed.
    pub fn fully_valid(&self) -> bool {
        !self.category_balances_stale
            && !self.account_balances_stale
            && !self.previous_month_snapshot_stale
    }

    /// Ending category balances as a map, taken from the derived rows.
    pub fn category_ends(&self) -> BTreeMap<Uuid, f64> {
        self.category_balances
            .iter()
            .map(|row| (row.category_id, row.end_balance))
            .collect()
    }

    /// Start balances this month should use, taken from the carried snapshot.
    pub fn snapshot_category_starts(&self) -> BTreeMap<Uuid, f64> {
        self.previous_month_snapshot
            .as_ref()
            .map(|snapshot| snapshot.category_balances_end.clone())
            .unwrap_or_default()
    }

    pub fn recompute_totals(&mut self) {
        self.total_income = self.income.iter().map(|entry| entry.amount).sum();
        self.total_expenses = self.expenses.iter().map(|entry| entry.amount).sum();
    }

    /// Rederives per-account start/end balances from the carried snapshot and
    /// this month's activity: `end = start + income - expenses`.
    pub fn recompute_account_balances(&mut self) {
        let starts = self
            .previous_month_snapshot
            .as_ref()
            .map(|snapshot| snapshot.account_balances_end.clone())
            .unwrap_or_default();

        let mut income_by_account: BTreeMap<Uuid, f64> = BTreeMap::new();
        for entry in &self.income {
            *income_by_account.entry(entry.account_id).or_insert(0.0) += entry.amount;
        }
        let mut expenses_by_account: BTreeMap<Uuid, f64> = BTreeMap::new();
        for entry in &self.expenses {
            *expenses_by_account.entry(entry.account_id).or_insert(0.0) += entry.amount;
        }

        let mut accounts: std::collections::BTreeSet<Uuid> = starts.keys().copied().collect();
        accounts.extend(income_by_account.keys().copied());
        accounts.extend(expenses_by_account.keys().copied());

        let mut start_map = BTreeMap::new();
        let mut end_map = BTreeMap::new();
        for account in accounts {
            let start = starts.get(&account).copied().unwrap_or(0.0);
            let incoming = income_by_account.get(&account).copied().unwrap_or(0.0);
            let outgoing = expenses_by_account.get(&account).copied().unwrap_or(0.0);
            start_map.insert(account, start);
            end_map.insert(account, start + incoming - outgoing);
        }
        self.account_balances_start = start_map;
        self.account_balances_end = end_map;
    }

    /// Rederives the category rows from the given start balances. Allocations
    /// contribute only once finalized; expenses always contribute.
    pub fn recompute_category_balances(&mut self, starts: &BTreeMap<Uuid, f64>) {
        let spent = self.expenses_by_category();
        let mut categories: std::collections::BTreeSet<Uuid> = starts.keys().copied().collect();
        categories.extend(self.allocations.iter().map(|a| a.category_id));
        categories.extend(spent.keys().copied());

        self.category_balances = categories
            .into_iter()
            .map(|category_id| {
                let start_balance = starts.get(&category_id).copied().unwrap_or(0.0);
                let allocated = if self.allocations_finalized {
                    self.allocation_amount(category_id)
                } else {
                    0.0
                };
                let spent = spent.get(&category_id).copied().unwrap_or(0.0);
                CategoryBalance {
                    category_id,
                    start_balance,
                    allocated,
                    spent,
                    end_balance: start_balance + allocated - spent,
                }
            })
            .collect();
    }

    /// Runs every local recompute in dependency order. Correct only while the
    /// carried snapshot is trustworthy; callers consult the staleness flags.
    pub fn recompute_derived(&mut self) {
        self.recompute_totals();
        self.recompute_account_balances();
        let starts = self.snapshot_category_starts();
        self.recompute_category_balances(&starts);
    }

    /// Whether the derived category rows can be used without a walk.
    pub fn has_valid_category_balances(&self) -> bool {
        !self.category_balances_stale && !self.category_balances.is_empty()
    }
}
