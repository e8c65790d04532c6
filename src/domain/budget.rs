use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::month_key::MonthKey;

pub const BUDGET_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub on_budget: bool,
    /// Balance the account started with, before any recorded activity.
    #[serde(default)]
    pub opening_balance: f64,
    /// All-time balance, refreshed by budget recalculation.
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub closed: bool,
}

impl Account {
    pub fn new(name: impl Into<String>, on_budget: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            group_id: None,
            on_budget,
            opening_balance: 0.0,
            balance: 0.0,
            closed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountGroup {
    pub id: Uuid,
    pub name: String,
}

impl AccountGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    /// All-time balance, refreshed by budget recalculation.
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub hidden: bool,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            group_id: None,
            balance: 0.0,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub id: Uuid,
    pub name: String,
}

impl CategoryGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Ordered set of `YYYYMM` ordinals recording which month documents exist
/// for a budget. Serialized as a sorted array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthIndex(BTreeSet<i32>);

impl MonthIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: MonthKey) -> bool {
        self.0.insert(key.ordinal())
    }

    pub fn remove(&mut self, key: MonthKey) -> bool {
        self.0.remove(&key.ordinal())
    }

    pub fn contains(&self, key: MonthKey) -> bool {
        self.0.contains(&key.ordinal())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn earliest(&self) -> Option<MonthKey> {
        self.0.iter().next().copied().and_then(MonthKey::from_ordinal)
    }

    pub fn latest(&self) -> Option<MonthKey> {
        self.0.iter().next_back().copied().and_then(MonthKey::from_ordinal)
    }

    /// Months strictly before `key`, newest first.
    pub fn before(&self, key: MonthKey) -> impl Iterator<Item = MonthKey> + '_ {
        self.0
            .range(..key.ordinal())
            .rev()
            .copied()
            .filter_map(MonthKey::from_ordinal)
    }

    /// Months strictly after `key`, oldest first.
    pub fn after(&self, key: MonthKey) -> impl Iterator<Item = MonthKey> + '_ {
        self.0
            .range(key.ordinal() + 1..)
            .copied()
            .filter_map(MonthKey::from_ordinal)
    }

    /// Nearest existing month strictly before `key`.
    pub fn nearest_before(&self, key: MonthKey) -> Option<MonthKey> {
        self.before(key).next()
    }

    pub fn iter(&self) -> impl Iterator<Item = MonthKey> + '_ {
        self.0.iter().copied().filter_map(MonthKey::from_ordinal)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBalance {
    /// Available through the reference month.
    pub current: f64,
    /// Available including already-entered future months.
    pub total: f64,
}

/// Budget-wide cache of walker results, valid for exactly one reference month
/// until an edit marks it stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBalancesSnapshot {
    pub computed_at: DateTime<Utc>,
    pub computed_for_year: i32,
    pub computed_for_month: u32,
    #[serde(default)]
    pub is_stale: bool,
    #[serde(default)]
    pub balances: BTreeMap<Uuid, SnapshotBalance>,
}

impl CategoryBalancesSnapshot {
    pub fn computed_for(&self) -> Option<MonthKey> {
        MonthKey::new(self.computed_for_year, self.computed_for_month)
    }

    pub fn is_valid_for(&self, key: MonthKey) -> bool {
        !self.is_stale && self.computed_for() == Some(key)
    }
}

/// Advisory produced when stored aggregates drift from recomputed ones.
/// Surfaced, never fatal; a recalculation is the remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityReport {
    pub kind: IdentityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Uuid>,
    pub stored: f64,
    pub computed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityKind {
    /// `on_budget_cash` vs `Σ max(0, category balance) + available_to_allocate`.
    AvailableToAllocate,
    /// A category's stored all-time balance vs the walker's figure.
    CategoryBalance,
}

/// One budget: accounts, categories, the index of existing months, and the
/// cross-month snapshot cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLedger {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub account_groups: Vec<AccountGroup>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub category_groups: Vec<CategoryGroup>,
    #[serde(default)]
    pub month_index: MonthIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_balances_snapshot: Option<CategoryBalancesSnapshot>,
    /// Unallocated on-budget cash, refreshed by budget recalculation.
    #[serde(default)]
    pub available_to_allocate: f64,
    #[serde(default = "BudgetLedger::schema_version_default")]
    pub schema_version: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BudgetLedger {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            accounts: Vec::new(),
            account_groups: Vec::new(),
            categories: Vec::new(),
            category_groups: Vec::new(),
            month_index: MonthIndex::new(),
            category_balances_snapshot: None,
            available_to_allocate: 0.0,
            schema_version: BUDGET_SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_account(&mut self, account: Account) -> Uuid {
        let id = account.id;
        self.accounts.push(account);
        self.touch();
        id
    }

    pub fn add_account_group(&mut self, group: AccountGroup) -> Uuid {
        let id = group.id;
        self.account_groups.push(group);
        self.touch();
        id
    }

    pub fn add_category(&mut self, category: Category) -> Uuid {
        let id = category.id;
        self.categories.push(category);
        self.touch();
        id
    }

    pub fn add_category_group(&mut self, group: CategoryGroup) -> Uuid {
        let id = group.id;
        self.category_groups.push(group);
        self.touch();
        id
    }

    pub fn account(&self, id: Uuid) -> Option<&Account> {
        self.accounts.iter().find(|account| account.id == id)
    }

    pub fn account_mut(&mut self, id: Uuid) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|account| account.id == id)
    }

    pub fn category(&self, id: Uuid) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn category_mut(&mut self, id: Uuid) -> Option<&mut Category> {
        self.categories.iter_mut().find(|category| category.id == id)
    }

    /// Sum of open on-budget account balances.
    pub fn on_budget_cash(&self) -> f64 {
        self.accounts
            .iter()
            .filter(|account| account.on_budget && !account.closed)
            .map(|account| account.balance)
            .sum()
    }

    /// Sum of positive stored category balances.
    pub fn allocated_available(&self) -> f64 {
        self.categories
            .iter()
            .map(|category| category.balance.max(0.0))
            .sum()
    }

    /// Checks the accounting identity
    /// `on_budget_cash == Σ max(0, category balance) + available_to_allocate`
    /// against the stored aggregates. Drift beyond `tolerance` yields an
    /// advisory report.
    pub fn verify_available_identity(&self, tolerance: f64) -> Option<IdentityReport> {
        let stored = self.on_budget_cash();
        let computed = self.allocated_available() + self.available_to_allocate;
        if (stored - computed).abs() > tolerance {
            Some(IdentityReport {
                kind: IdentityKind::AvailableToAllocate,
                entity: None,
                stored,
                computed,
            })
        } else {
            None
        }
    }

    /// Marks the cross-month snapshot stale. Returns whether anything changed,
    /// so store-level marking can skip redundant writes.
    pub fn mark_snapshot_stale(&mut self) -> bool {
        match self.category_balances_snapshot.as_mut() {
            Some(snapshot) if !snapshot.is_stale => {
                snapshot.is_stale = true;
                self.touch();
                true
            }
            _ => false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn schema_version_default() -> u8 {
        BUDGET_SCHEMA_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(year: i32, month: u32) -> MonthKey {
        MonthKey::new(year, month).unwrap()
    }

    #[test]
    fn month_index_orders_and_ranges() {
        let mut index = MonthIndex::new();
        assert!(index.insert(key(2024, 3)));
        assert!(index.insert(key(2023, 11)));
        assert!(index.insert(key(2024, 1)));
        assert!(!index.insert(key(2024, 1)));

        assert_eq!(index.earliest(), Some(key(2023, 11)));
        assert_eq!(index.latest(), Some(key(2024, 3)));
        assert_eq!(index.nearest_before(key(2024, 3)), Some(key(2024, 1)));
        assert_eq!(index.nearest_before(key(2023, 11)), None);

        let before: Vec<MonthKey> = index.before(key(2024, 3)).collect();
        assert_eq!(before, vec![key(2024, 1), key(2023, 11)]);
        let after: Vec<MonthKey> = index.after(key(2023, 11)).collect();
        assert_eq!(after, vec![key(2024, 1), key(2024, 3)]);
    }

    #[test]
    fn month_index_serializes_as_sorted_array() {
        let mut index = MonthIndex::new();
        index.insert(key(2024, 2));
        index.insert(key(2023, 12));
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, "[202312,202402]");
    }

    #[test]
    fn snapshot_validity_requires_month_and_freshness() {
        let snapshot = CategoryBalancesSnapshot {
            computed_at: Utc::now(),
            computed_for_year: 2024,
            computed_for_month: 5,
            is_stale: false,
            balances: BTreeMap::new(),
        };
        assert!(snapshot.is_valid_for(key(2024, 5)));
        assert!(!snapshot.is_valid_for(key(2024, 6)));

        let mut stale = snapshot;
        stale.is_stale = true;
        assert!(!stale.is_valid_for(key(2024, 5)));
    }

    #[test]
    fn identity_check_reports_drift() {
        let mut budget = BudgetLedger::new("Household");
        let mut checking = Account::new("Checking", true);
        checking.balance = 1000.0;
        budget.add_account(checking);
        let mut groceries = Category::new("Groceries");
        groceries.balance = 600.0;
        budget.add_category(groceries);
        budget.available_to_allocate = 400.0;

        assert!(budget.verify_available_identity(0.01).is_none());

        budget.available_to_allocate = 390.0;
        let report = budget.verify_available_identity(0.01).expect("drift");
        assert_eq!(report.kind, IdentityKind::AvailableToAllocate);
        assert_eq!(report.stored, 1000.0);
        assert_eq!(report.computed, 990.0);
    }

    #[test]
    fn marking_snapshot_stale_is_idempotent() {
        let mut budget = BudgetLedger::new("Household");
        assert!(!budget.mark_snapshot_stale());

        budget.category_balances_snapshot = Some(CategoryBalancesSnapshot {
            computed_at: Utc::now(),
            computed_for_year: 2024,
            computed_for_month: 1,
            is_stale: false,
            balances: BTreeMap::new(),
        });
        assert!(budget.mark_snapshot_stale());
        assert!(!budget.mark_snapshot_stale());
    }

    #[test]
    fn closed_and_off_budget_accounts_are_excluded_from_cash() {
        let mut budget = BudgetLedger::new("Household");
        let mut checking = Account::new("Checking", true);
        checking.balance = 250.0;
        let mut brokerage = Account::new("Brokerage", false);
        brokerage.balance = 9000.0;
        let mut old = Account::new("Old", true);
        old.balance = 50.0;
        old.closed = true;
        budget.add_account(checking);
        budget.add_account(brokerage);
        budget.add_account(old);

        assert_eq!(budget.on_budget_cash(), 250.0);
    }
}
