use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    matches_clauses, merge_document, Collection, Document, DocumentStore, Result, StoreError,
    WhereClause, WriteMode,
};

/// In-memory [`DocumentStore`] for tests and ephemeral sessions.
///
/// Counts operations so tests can assert how many reads and writes a code
/// path performed, and can inject a one-shot `put` failure to exercise
/// rollback handling.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<(Collection, String), Value>>,
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    fail_next_put: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Makes the next `put` fail with a backend error.
    pub fn inject_put_failure(&self) {
        self.fail_next_put.store(true, Ordering::SeqCst);
    }

    /// Direct synchronous peek, bypassing counters.
    pub fn document(&self, collection: Collection, id: &str) -> Option<Value> {
        self.documents
            .read()
            .expect("memory store lock poisoned")
            .get(&(collection, id.to_string()))
            .cloned()
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.documents
            .read()
            .expect("memory store lock poisoned")
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.document(collection, id))
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
        mode: WriteMode,
    ) -> Result<()> {
        if self.fail_next_put.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected put failure".into()));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.write().expect("memory store lock poisoned");
        let key = (collection, id.to_string());
        match mode {
            WriteMode::Replace => {
                documents.insert(key, data);
            }
            WriteMode::Merge => match documents.get_mut(&key) {
                Some(existing) => merge_document(existing, data),
                None => {
                    documents.insert(key, data);
                }
            },
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.documents
            .write()
            .expect("memory store lock poisoned")
            .remove(&(collection, id.to_string()));
        Ok(())
    }

    async fn query(&self, collection: Collection, clauses: &[WhereClause]) -> Result<Vec<Document>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let documents = self.documents.read().expect("memory store lock poisoned");
        let mut matched: Vec<Document> = documents
            .iter()
            .filter(|((c, _), data)| *c == collection && matches_clauses(data, clauses))
            .map(|((_, id), data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replace_and_merge_writes() {
        let store = MemoryStore::new();
        store
            .put(
                Collection::Budgets,
                "b1",
                json!({"name": "old", "kept": 1}),
                WriteMode::Replace,
            )
            .await
            .unwrap();
        store
            .put(
                Collection::Budgets,
                "b1",
                json!({"name": "new"}),
                WriteMode::Merge,
            )
            .await
            .unwrap();

        let doc = store.get(Collection::Budgets, "b1").await.unwrap().unwrap();
        assert_eq!(doc, json!({"name": "new", "kept": 1}));
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn query_filters_by_collection_and_clause() {
        let store = MemoryStore::new();
        for (id, budget) in [("m1", "b1"), ("m2", "b1"), ("m3", "b2")] {
            store
                .put(
                    Collection::Months,
                    id,
                    json!({"budget_id": budget}),
                    WriteMode::Replace,
                )
                .await
                .unwrap();
        }
        store
            .put(
                Collection::Budgets,
                "b1",
                json!({"budget_id": "b1"}),
                WriteMode::Replace,
            )
            .await
            .unwrap();

        let docs = store
            .query(
                Collection::Months,
                &[WhereClause::Eq("budget_id".into(), json!("b1"))],
            )
            .await
            .unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn injected_failure_hits_exactly_one_put() {
        let store = MemoryStore::new();
        store.inject_put_failure();
        let err = store
            .put(Collection::Budgets, "b1", json!({}), WriteMode::Replace)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.put_count(), 0);

        store
            .put(Collection::Budgets, "b1", json!({}), WriteMode::Replace)
            .await
            .unwrap();
        assert_eq!(store.put_count(), 1);
    }
}
