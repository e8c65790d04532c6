use std::env;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dirs::home_dir;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{
    matches_clauses, merge_document, Collection, Document, DocumentStore, Result, StoreError,
    WhereClause, WriteMode,
};

const DEFAULT_DIR_NAME: &str = ".monthwise";
const TMP_SUFFIX: &str = "tmp";

/// Returns the application-specific data directory, defaulting to `~/.monthwise`.
pub fn app_data_dir() -> PathBuf {
    if let Some(custom) = env::var_os("MONTHWISE_HOME") {
        return PathBuf::from(custom);
    }
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}

/// File-per-document [`DocumentStore`] rooted at one directory, with a
/// subdirectory per collection. Writes go through a temp file and a rename so
/// a crash never leaves a half-written document behind.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        for collection in Collection::ALL {
            std::fs::create_dir_all(root.join(collection.as_str()))?;
        }
        Ok(Self { root })
    }

    pub fn new_default() -> Result<Self> {
        Self::new(app_data_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, collection: Collection, id: &str) -> Result<PathBuf> {
        if !valid_id(id) {
            return Err(StoreError::Backend(format!("invalid document id `{}`", id)));
        }
        Ok(self
            .root
            .join(collection.as_str())
            .join(format!("{}.json", id)))
    }
}

#[async_trait]
impl DocumentStore for JsonStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let path = self.document_path(collection, id)?;
        match fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
        mode: WriteMode,
    ) -> Result<()> {
        let path = self.document_path(collection, id)?;
        let payload = match mode {
            WriteMode::Replace => data,
            WriteMode::Merge => match self.get(collection, id).await? {
                Some(mut existing) => {
                    merge_document(&mut existing, data);
                    existing
                }
                None => data,
            },
        };
        let json = serde_json::to_string_pretty(&payload)?;
        write_atomic(&path, &json).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let path = self.document_path(collection, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn query(&self, collection: Collection, clauses: &[WhereClause]) -> Result<Vec<Document>> {
        let dir = self.root.join(collection.as_str());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut matched = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let data: Value = serde_json::from_str(&fs::read_to_string(&path).await?)?;
            if matches_clauses(&data, clauses) {
                matched.push(Document {
                    id: id.to_string(),
                    data,
                });
            }
        }
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }
}

/// Ids become file names verbatim, so only path-safe characters are allowed.
fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

async fn write_atomic(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(data.as_bytes()).await?;
    file.flush().await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
