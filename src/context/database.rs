//! Database initialization layer.
//!
//! Establishes the handle placed in the shared context before any router
//! script is scanned. Only an in-process document store is provided; it
//! exposes the usual collection helpers to handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Supported database kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    Memory,
}

/// `[database]` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub kind: DatabaseKind,

    /// Abort startup if the database cannot be initialized.
    pub required: bool,

    /// JSON file of `{ "collection": [records...] }` loaded at startup.
    pub seed: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to read seed file {}: {source}", path.display())]
    SeedRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid seed file {}: {message}", path.display())]
    SeedFormat { path: PathBuf, message: String },

    #[error("records must be objects, got {0}")]
    NotAnObject(String),
}

/// Handle to the document store. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Database {
    collections: Arc<DashMap<String, Vec<Value>>>,
}

fn id_of(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Database {
    pub fn memory() -> Self {
        Self::default()
    }

    /// Load `{ "collection": [records...] }` from a JSON file.
    pub fn seed_from(&self, path: &Path) -> Result<(), DatabaseError> {
        let content = std::fs::read_to_string(path).map_err(|source| DatabaseError::SeedRead {
            path: path.to_path_buf(),
            source,
        })?;
        let seed: Map<String, Value> =
            serde_json::from_str(&content).map_err(|e| DatabaseError::SeedFormat {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        for (collection, records) in seed {
            let Value::Array(records) = records else {
                return Err(DatabaseError::SeedFormat {
                    path: path.to_path_buf(),
                    message: format!("collection `{}` is not an array", collection),
                });
            };
            for record in records {
                self.create(&collection, record)?;
            }
        }
        Ok(())
    }

    pub fn find_by_id(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .get(collection)?
            .iter()
            .find(|r| id_of(r).as_deref() == Some(id))
            .cloned()
    }

    /// All records, optionally only those whose fields equal `filter`'s.
    pub fn find_all(&self, collection: &str, filter: Option<&Map<String, Value>>) -> Vec<Value> {
        let Some(records) = self.collections.get(collection) else {
            return Vec::new();
        };
        records
            .iter()
            .filter(|record| match filter {
                Some(filter) => filter.iter().all(|(k, v)| record.get(k) == Some(v)),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Insert a record, assigning a UUID `id` when it has none.
    pub fn create(&self, collection: &str, record: Value) -> Result<Value, DatabaseError> {
        let Value::Object(mut fields) = record else {
            return Err(DatabaseError::NotAnObject(json_kind(&record).to_string()));
        };
        if !fields.contains_key("id") {
            fields.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        let record = Value::Object(fields);
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    /// Merge `patch` into the record with `id`. Returns the updated record.
    pub fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<Option<Value>, DatabaseError> {
        let Value::Object(patch) = patch else {
            return Err(DatabaseError::NotAnObject(json_kind(&patch).to_string()));
        };
        let Some(mut records) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(record) = records.iter_mut().find(|r| id_of(r).as_deref() == Some(id)) else {
            return Ok(None);
        };
        if let Value::Object(fields) = record {
            for (k, v) in patch {
                if k != "id" {
                    fields.insert(k, v);
                }
            }
        }
        Ok(Some(record.clone()))
    }

    /// Remove and return the record with `id`.
    pub fn remove(&self, collection: &str, id: &str) -> Option<Value> {
        let mut records = self.collections.get_mut(collection)?;
        let index = records.iter().position(|r| id_of(r).as_deref() == Some(id))?;
        Some(records.remove(index))
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|r| r.len()).unwrap_or(0)
    }
}

/// Initialize the configured database.
pub fn init_database(config: &DatabaseConfig) -> Result<Database, DatabaseError> {
    tracing::info!(kind = ?config.kind, "Connecting database");
    let db = match config.kind {
        DatabaseKind::Memory => Database::memory(),
    };
    if let Some(seed) = &config.seed {
        db.seed_from(seed)?;
    }
    tracing::info!(kind = ?config.kind, "Database ready");
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_crud_cycle() {
        let db = Database::memory();
        let created = db.create("users", json!({ "name": "ada", "role": "admin" })).unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        assert_eq!(db.find_by_id("users", &id), Some(created.clone()));

        let updated = db
            .update("users", &id, json!({ "name": "grace", "id": "ignored" }))
            .unwrap()
            .unwrap();
        assert_eq!(updated["name"], "grace");
        assert_eq!(updated["id"], id.as_str());

        assert_eq!(db.remove("users", &id).map(|r| r["name"].clone()), Some(json!("grace")));
        assert_eq!(db.count("users"), 0);
    }

    #[test]
    fn test_find_all_with_filter() {
        let db = Database::memory();
        db.create("users", json!({ "id": 1, "role": "admin" })).unwrap();
        db.create("users", json!({ "id": 2, "role": "guest" })).unwrap();

        let filter = json!({ "role": "admin" });
        let admins = db.find_all("users", filter.as_object());
        assert_eq!(admins.len(), 1);
        assert_eq!(db.find_by_id("users", "1").unwrap()["role"], "admin");
        assert_eq!(db.find_all("users", None).len(), 2);
        assert!(db.find_all("missing", None).is_empty());
    }

    #[test]
    fn test_create_rejects_non_objects() {
        let db = Database::memory();
        assert!(matches!(db.create("users", json!(3)), Err(DatabaseError::NotAnObject(_))));
    }

    #[test]
    fn test_seed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "users": [{{ "id": "u1", "name": "ada" }}] }}"#).unwrap();

        let config = DatabaseConfig {
            seed: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let db = init_database(&config).unwrap();
        assert_eq!(db.find_by_id("users", "u1").unwrap()["name"], "ada");
    }
}
