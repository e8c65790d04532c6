pub mod documents;
pub mod json_backend;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("document {id} has schema version {found}, newest supported is {supported}")]
    UnsupportedSchema { id: String, found: u8, supported: u8 },
}

/// Top-level document collections. One document per budget or payee book,
/// one per budget-month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Budgets,
    Months,
    Payees,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Budgets, Collection::Months, Collection::Payees];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Budgets => "budgets",
            Collection::Months => "months",
            Collection::Payees => "payees",
        }
    }
}

/// How a `put` combines with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The payload becomes the whole document.
    Replace,
    /// Top-level fields of the payload overwrite or extend the existing
    /// document; other fields are kept.
    Merge,
}

/// Equality-style filters for [`DocumentStore::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// Top-level `field` equals `value`.
    Eq(String, Value),
    /// Top-level array `field` contains `value`.
    ArrayContains(String, Value),
}

impl WhereClause {
    pub fn matches(&self, data: &Value) -> bool {
        match self {
            WhereClause::Eq(field, expected) => data.get(field) == Some(expected),
            WhereClause::ArrayContains(field, expected) => data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(expected)),
        }
    }
}

pub fn matches_clauses(data: &Value, clauses: &[WhereClause]) -> bool {
    clauses.iter().all(|clause| clause.matches(data))
}

/// A raw stored document: its id within the collection plus the JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Abstraction over document persistence backends.
///
/// Documents are schemaless JSON at this layer; typed encoding, schema
/// versioning, and cache coherence live in [`documents::Documents`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>>;

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
        mode: WriteMode,
    ) -> Result<()>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// Returns every document in `collection` matching all `clauses`, in
    /// unspecified order.
    async fn query(&self, collection: Collection, clauses: &[WhereClause]) -> Result<Vec<Document>>;
}

/// Shallow merge of `incoming`'s top-level fields into `existing`. Shared by
/// backends implementing [`WriteMode::Merge`].
pub fn merge_document(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(fields)) => {
            for (key, value) in fields {
                current.insert(key, value);
            }
        }
        (existing, incoming) => *existing = incoming,
    }
}

pub use documents::Documents;
pub use json_backend::JsonStore;
pub use memory::MemoryStore;
