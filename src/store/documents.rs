use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::{Collection, DocumentStore, StoreError, WhereClause, WriteMode};
use crate::cache::{CachedDoc, EntityKey, MonthRef, SessionCache};
use crate::domain::budget::BUDGET_SCHEMA_VERSION;
use crate::domain::month::MONTH_SCHEMA_VERSION;
use crate::domain::payee::PAYEE_SCHEMA_VERSION;
use crate::domain::{BudgetLedger, MonthKey, MonthLedger, PayeeBook};
use crate::errors::LedgerError;

/// Typed access to budget, month, and payee documents.
///
/// Reads go through the session cache; writes land in the store first and
/// then overwrite the cache with the same payload, so the cache never holds
/// state the store has not accepted. Store-only update helpers exist for
/// idempotent background marking and deliberately leave the cache alone.
pub struct Documents {
    store: Arc<dyn DocumentStore>,
    cache: SessionCache,
}

impl Documents {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            cache: SessionCache::new(),
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Cache-first month read. A store fetch that loses a race against a
    /// concurrent mutation is discarded and the cache's current value wins.
    pub async fn month(&self, month_ref: &MonthRef) -> Result<Option<MonthLedger>, LedgerError> {
        if let Some(month) = self.cache.month(month_ref) {
            return Ok(Some(month));
        }
        let ticket = self.cache.begin_read(EntityKey::Month(month_ref.clone()));
        let Some(month) = self.month_from_store(month_ref).await? else {
            return Ok(None);
        };
        if self.cache.complete_read(&ticket, CachedDoc::Month(month.clone())) {
            Ok(Some(month))
        } else {
            Ok(self.cache.month(month_ref))
        }
    }

    /// Direct store read, bypassing and never populating the cache.
    pub async fn month_from_store(
        &self,
        month_ref: &MonthRef,
    ) -> Result<Option<MonthLedger>, LedgerError> {
        let id = month_ref.document_id();
        match self.store.get(Collection::Months, &id).await? {
            Some(value) => Ok(Some(decode_month(&id, value)?)),
            None => Ok(None),
        }
    }

    pub async fn write_month(&self, month: &MonthLedger) -> Result<(), LedgerError> {
        let id = month.document_id();
        let value = serde_json::to_value(month).map_err(StoreError::from)?;
        self.store
            .put(Collection::Months, &id, value, WriteMode::Replace)
            .await?;
        self.cache.overwrite(CachedDoc::Month(month.clone()));
        Ok(())
    }

    /// Check-then-write against the store only. `apply` returns whether it
    /// changed anything; unchanged documents are not rewritten and a missing
    /// document is a no-op.
    pub async fn update_month_in_store(
        &self,
        month_ref: &MonthRef,
        apply: impl FnOnce(&mut MonthLedger) -> bool,
    ) -> Result<bool, LedgerError> {
        let Some(mut month) = self.month_from_store(month_ref).await? else {
            return Ok(false);
        };
        if !apply(&mut month) {
            return Ok(false);
        }
        let id = month_ref.document_id();
        let value = serde_json::to_value(&month).map_err(StoreError::from)?;
        self.store
            .put(Collection::Months, &id, value, WriteMode::Replace)
            .await?;
        Ok(true)
    }

    pub async fn delete_month(&self, month_ref: &MonthRef) -> Result<(), LedgerError> {
        self.store
            .delete(Collection::Months, &month_ref.document_id())
            .await?;
        self.cache.remove(&EntityKey::Month(month_ref.clone()));
        Ok(())
    }

    /// Cache-first budget read with the same race rules as [`Self::month`].
    pub async fn budget(&self, budget_id: &str) -> Result<Option<BudgetLedger>, LedgerError> {
        if let Some(budget) = self.cache.budget(budget_id) {
            return Ok(Some(budget));
        }
        let ticket = self
            .cache
            .begin_read(EntityKey::Budget(budget_id.to_string()));
        let Some(budget) = self.budget_from_store(budget_id).await? else {
            return Ok(None);
        };
        if self
            .cache
            .complete_read(&ticket, CachedDoc::Budget(budget.clone()))
        {
            Ok(Some(budget))
        } else {
            Ok(self.cache.budget(budget_id))
        }
    }

    pub async fn budget_from_store(
        &self,
        budget_id: &str,
    ) -> Result<Option<BudgetLedger>, LedgerError> {
        match self.store.get(Collection::Budgets, budget_id).await? {
            Some(value) => Ok(Some(decode_budget(budget_id, value)?)),
            None => Ok(None),
        }
    }

    pub async fn write_budget(&self, budget: &BudgetLedger) -> Result<(), LedgerError> {
        let value = serde_json::to_value(budget).map_err(StoreError::from)?;
        self.store
            .put(Collection::Budgets, &budget.id, value, WriteMode::Replace)
            .await?;
        self.cache.overwrite(CachedDoc::Budget(budget.clone()));
        Ok(())
    }

    pub async fn update_budget_in_store(
        &self,
        budget_id: &str,
        apply: impl FnOnce(&mut BudgetLedger) -> bool,
    ) -> Result<bool, LedgerError> {
        let Some(mut budget) = self.budget_from_store(budget_id).await? else {
            return Ok(false);
        };
        if !apply(&mut budget) {
            return Ok(false);
        }
        let value = serde_json::to_value(&budget).map_err(StoreError::from)?;
        self.store
            .put(Collection::Budgets, budget_id, value, WriteMode::Replace)
            .await?;
        Ok(true)
    }

    /// Month keys of every stored month document belonging to `budget_id`,
    /// ascending. Drives index rebuilds.
    pub async fn months_for_budget(&self, budget_id: &str) -> Result<Vec<MonthKey>, LedgerError> {
        let docs = self
            .store
            .query(
                Collection::Months,
                &[WhereClause::Eq("budget_id".into(), json!(budget_id))],
            )
            .await?;
        let mut keys: Vec<MonthKey> = docs
            .iter()
            .filter_map(|doc| {
                let year = doc.data.get("year")?.as_i64()? as i32;
                let month = doc.data.get("month")?.as_u64()? as u32;
                MonthKey::new(year, month)
            })
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Adds `name` to the budget's payee book, creating the book on first
    /// use. Returns whether the name was new.
    pub async fn record_payee(&self, budget_id: &str, name: &str) -> Result<bool, LedgerError> {
        let mut book = match self.store.get(Collection::Payees, budget_id).await? {
            Some(value) => decode_payees(budget_id, value)?,
            None => PayeeBook::new(budget_id),
        };
        if !book.record(name) {
            return Ok(false);
        }
        let value = serde_json::to_value(&book).map_err(StoreError::from)?;
        self.store
            .put(Collection::Payees, budget_id, value, WriteMode::Replace)
            .await?;
        Ok(true)
    }

    pub async fn payees(&self, budget_id: &str) -> Result<Vec<String>, LedgerError> {
        match self.store.get(Collection::Payees, budget_id).await? {
            Some(value) => Ok(decode_payees(budget_id, value)?.names),
            None => Ok(Vec::new()),
        }
    }
}

fn check_schema(id: &str, value: &Value, supported: u8) -> Result<(), StoreError> {
    let found = value
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u8;
    if found > supported {
        return Err(StoreError::UnsupportedSchema {
            id: id.to_string(),
            found,
            supported,
        });
    }
    Ok(())
}

fn decode_month(id: &str, mut value: Value) -> Result<MonthLedger, LedgerError> {
    check_schema(id, &value, MONTH_SCHEMA_VERSION)?;
    migrate_month_shape(id, &mut value);
    Ok(serde_json::from_value(value).map_err(StoreError::from)?)
}

fn decode_budget(id: &str, mut value: Value) -> Result<BudgetLedger, LedgerError> {
    check_schema(id, &value, BUDGET_SCHEMA_VERSION)?;
    migrate_budget_shape(id, &mut value);
    Ok(serde_json::from_value(value).map_err(StoreError::from)?)
}

fn decode_payees(id: &str, value: Value) -> Result<PayeeBook, LedgerError> {
    check_schema(id, &value, PAYEE_SCHEMA_VERSION)?;
    Ok(serde_json::from_value(value).map_err(StoreError::from)?)
}

/// Pre-1 month documents stored `category_balances` as an object keyed by
/// category id. Lift it into the row array the current shape uses.
fn migrate_month_shape(id: &str, value: &mut Value) {
    let Some(balances) = value.get("category_balances") else {
        return;
    };
    if !balances.is_object() {
        return;
    }
    let rows: Vec<Value> = balances
        .as_object()
        .into_iter()
        .flatten()
        .map(|(category_id, row)| {
            let mut lifted = match row {
                Value::Object(fields) => Value::Object(fields.clone()),
                Value::Number(end) => json!({ "end_balance": end }),
                _ => json!({}),
            };
            if let Value::Object(ref mut fields) = lifted {
                fields.insert("category_id".into(), json!(category_id));
                for field in ["start_balance", "allocated", "spent", "end_balance"] {
                    fields.entry(field).or_insert(json!(0.0));
                }
            }
            lifted
        })
        .collect();
    debug!(document = id, rows = rows.len(), "migrated legacy category balance map");
    value["category_balances"] = Value::Array(rows);
}

/// Pre-1 budget documents stored the month index as an object of
/// `"YYYYMM": true` markers. Lift it into the sorted ordinal array.
fn migrate_budget_shape(id: &str, value: &mut Value) {
    let Some(index) = value.get("month_index") else {
        return;
    };
    if !index.is_object() {
        return;
    }
    let mut ordinals: Vec<i64> = index
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(_, marked)| marked.as_bool().unwrap_or(true))
        .filter_map(|(ordinal, _)| ordinal.parse::<i64>().ok())
        .collect();
    ordinals.sort_unstable();
    debug!(document = id, months = ordinals.len(), "migrated legacy month index map");
    value["month_index"] = json!(ordinals);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn docs() -> Documents {
        Documents::new(Arc::new(MemoryStore::new()))
    }

    fn key(year: i32, month: u32) -> MonthKey {
        MonthKey::new(year, month).unwrap()
    }

    #[tokio::test]
    async fn month_documents_round_trip_and_cache() {
        let docs = docs();
        let month_ref = MonthRef::new("b1", key(2024, 3));
        let mut month = MonthLedger::new("b1", key(2024, 3));
        month.total_income = 42.0;
        docs.write_month(&month).await.unwrap();

        let loaded = docs.month(&month_ref).await.unwrap().unwrap();
        assert_eq!(loaded.total_income, 42.0);
        assert!(docs.cache().month(&month_ref).is_some());
    }

    #[tokio::test]
    async fn legacy_category_balance_map_is_lifted() {
        let store = Arc::new(MemoryStore::new());
        let docs = Documents::new(store.clone());
        let cat = uuid::Uuid::new_v4();
        let legacy = json!({
            "budget_id": "b1",
            "year": 2023,
            "month": 7,
            "category_balances": {
                (cat.to_string()): {"start_balance": 5.0, "end_balance": 11.0}
            },
            "created_at": "2023-07-01T00:00:00Z",
            "updated_at": "2023-07-01T00:00:00Z"
        });
        store
            .put(Collection::Months, "b1_2023_07", legacy, WriteMode::Replace)
            .await
            .unwrap();

        let month = docs
            .month(&MonthRef::new("b1", key(2023, 7)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(month.category_balances.len(), 1);
        let row = &month.category_balances[0];
        assert_eq!(row.category_id, cat);
        assert_eq!(row.start_balance, 5.0);
        assert_eq!(row.end_balance, 11.0);
        assert_eq!(row.allocated, 0.0);
        assert_eq!(month.schema_version, MONTH_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn legacy_month_index_map_is_lifted() {
        let store = Arc::new(MemoryStore::new());
        let docs = Documents::new(store.clone());
        let legacy = json!({
            "id": "b1",
            "name": "Household",
            "month_index": {"202401": true, "202312": true},
            "created_at": "2023-12-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        store
            .put(Collection::Budgets, "b1", legacy, WriteMode::Replace)
            .await
            .unwrap();

        let budget = docs.budget("b1").await.unwrap().unwrap();
        assert_eq!(budget.month_index.earliest(), Some(key(2023, 12)));
        assert_eq!(budget.month_index.latest(), Some(key(2024, 1)));
    }

    #[tokio::test]
    async fn newer_schema_versions_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let docs = Documents::new(store.clone());
        store
            .put(
                Collection::Budgets,
                "b1",
                json!({"id": "b1", "schema_version": 99}),
                WriteMode::Replace,
            )
            .await
            .unwrap();

        let err = docs.budget("b1").await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Store(StoreError::UnsupportedSchema { found: 99, .. })
        ));
    }

    #[tokio::test]
    async fn racing_read_yields_to_newer_cache_value() {
        let docs = docs();
        let month_ref = MonthRef::new("b1", key(2024, 1));
        let mut stored = MonthLedger::new("b1", key(2024, 1));
        stored.total_income = 1.0;
        docs.write_month(&stored).await.unwrap();

        // Simulate a fetch that started before an optimistic overwrite landed.
        let ticket = docs
            .cache()
            .begin_read(EntityKey::Month(month_ref.clone()));
        let mut newer = stored.clone();
        newer.total_income = 777.0;
        docs.cache().overwrite(CachedDoc::Month(newer));
        assert!(!docs.cache().complete_read(&ticket, CachedDoc::Month(stored)));

        let seen = docs.month(&month_ref).await.unwrap().unwrap();
        assert_eq!(seen.total_income, 777.0);
    }

    #[tokio::test]
    async fn update_in_store_skips_unchanged_documents() {
        let store = Arc::new(MemoryStore::new());
        let docs = Documents::new(store.clone());
        let month_ref = MonthRef::new("b1", key(2024, 1));
        docs.write_month(&MonthLedger::new("b1", key(2024, 1)))
            .await
            .unwrap();
        let writes_before = store.put_count();

        let changed = docs
            .update_month_in_store(&month_ref, |month| {
                if month.previous_month_snapshot_stale {
                    false
                } else {
                    month.previous_month_snapshot_stale = true;
                    true
                }
            })
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(store.put_count(), writes_before + 1);

        let changed = docs
            .update_month_in_store(&month_ref, |month| {
                if month.previous_month_snapshot_stale {
                    false
                } else {
                    month.previous_month_snapshot_stale = true;
                    true
                }
            })
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(store.put_count(), writes_before + 1);
    }

    #[tokio::test]
    async fn payee_book_records_names_best_effort() {
        let docs = docs();
        assert!(docs.record_payee("b1", "Grocer").await.unwrap());
        assert!(!docs.record_payee("b1", "Grocer").await.unwrap());
        assert!(docs.record_payee("b1", "Cafe").await.unwrap());
        assert_eq!(docs.payees("b1").await.unwrap(), vec!["Cafe", "Grocer"]);
    }
}
