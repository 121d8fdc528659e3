//! Embedded key-space store
//!
//! Tables are named, ordered collections of rows, each persisted as one JSON
//! array under a namespaced key (`<prefix><table>`) of a [`KeyValueMedium`].
//! Every write serializes the whole table and every read deserializes it.
//!
//! Reads never fail: a missing table is empty, and a table whose persisted text
//! cannot be read or no longer parses is logged and treated as empty. Writes
//! through `modify_table` refuse to touch such a table.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{RelayError, Result};
use crate::types::Row;

pub mod medium;

pub use medium::{FileMedium, KeyValueMedium, MemoryMedium};

/// Default key namespace for persisted tables
pub const DEFAULT_KEY_PREFIX: &str = "relaysql:table:";

/// Table store over a persistent key/value medium
pub struct LocalStore {
    medium: Arc<dyn KeyValueMedium>,
    prefix: String,
    /// Serializes read-modify-write cycles issued through `modify_table`
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(medium: Arc<dyn KeyValueMedium>, prefix: impl Into<String>) -> Self {
        Self {
            medium,
            prefix: prefix.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store over a fresh in-memory medium
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryMedium::new()), DEFAULT_KEY_PREFIX)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key_for(&self, table: &str) -> String {
        format!("{}{}", self.prefix, table)
    }

    /// Load a whole table; missing or corrupted tables are empty
    pub fn get_table(&self, table: &str) -> Vec<Row> {
        match self.load_table(table) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Local table '{}' is unreadable ({}); treating it as empty", table, e);
                Vec::new()
            }
        }
    }

    /// Strict load: a missing table is empty, but a medium failure or
    /// unparsable contents are errors
    fn load_table(&self, table: &str) -> Result<Vec<Row>> {
        let raw = match self.medium.get(&self.key_for(table))? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };
        serde_json::from_str(&raw).map_err(|e| {
            RelayError::Store(format!("Local table '{}' is corrupted: {}", table, e))
        })
    }

    /// Replace a whole table
    pub fn set_table(&self, table: &str, rows: &[Row]) -> Result<()> {
        if table.is_empty() {
            return Err(RelayError::Store("Table name cannot be empty".into()));
        }
        let serialized = serde_json::to_string(rows)?;
        self.medium.set(&self.key_for(table), &serialized)?;
        debug!("Persisted local table '{}' ({} rows)", table, rows.len());
        Ok(())
    }

    /// Read-modify-write a table under the store's write lock. The table is
    /// persisted after `f` returns, whatever it did.
    ///
    /// Unlike [`get_table`](Self::get_table), the read is strict: if the
    /// medium fails or the persisted text does not parse, `f` is not run and
    /// nothing is written, so the stored bytes survive for inspection.
    /// `set_table` or `clear` replace a corrupted table deliberately.
    pub fn modify_table<F, T>(&self, table: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Row>) -> T,
    {
        let _guard = self.write_lock.lock().unwrap();
        let mut rows = self.load_table(table)?;
        let out = f(&mut rows);
        self.set_table(table, &rows)?;
        Ok(out)
    }

    /// Names of every table persisted under this store's prefix
    pub fn table_names(&self) -> Result<Vec<String>> {
        Ok(self
            .medium
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    /// Remove every table under this store's prefix, leaving other keys alone
    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        for table in self.table_names()? {
            self.medium.remove(&self.key_for(&table))?;
        }
        Ok(())
    }

    /// Seed tables from a `{"table": [rows...]}` document, replacing any
    /// existing contents of the named tables. Returns the number of tables written.
    pub fn import(&self, document: &serde_json::Value) -> Result<usize> {
        let tables: BTreeMap<String, Vec<Row>> = serde_json::from_value(document.clone())?;
        let _guard = self.write_lock.lock().unwrap();
        for (table, rows) in &tables {
            self.set_table(table, rows)?;
        }
        Ok(tables.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_missing_table_is_empty() {
        let store = LocalStore::in_memory();
        assert!(store.get_table("posts").is_empty());
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let store = LocalStore::in_memory();
        let rows = vec![
            row(json!({"id": "p1", "likes": 3, "pinned": true, "caption": null})),
            row(json!({"id": "p2", "score": 1.5, "caption": "hi"})),
        ];
        store.set_table("posts", &rows).unwrap();
        assert_eq!(store.get_table("posts"), rows);
    }

    #[test]
    fn test_corrupted_table_reads_as_empty() {
        let medium = Arc::new(MemoryMedium::new());
        medium.set("relaysql:table:posts", "{not json").unwrap();
        let store = LocalStore::new(medium, DEFAULT_KEY_PREFIX);
        assert!(store.get_table("posts").is_empty());
    }

    #[test]
    fn test_modify_refuses_unreadable_table() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(
            Arc::new(FileMedium::open(dir.path()).unwrap()),
            DEFAULT_KEY_PREFIX,
        );
        store
            .set_table("posts", &[row(json!({"id": "p1"})), row(json!({"id": "p2"}))])
            .unwrap();

        // Invalid UTF-8 makes the medium read itself fail
        let path = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .find(|path| path.is_file())
            .unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.push(0xFF);
        std::fs::write(&path, &bytes).unwrap();

        let mut ran = false;
        let result = store.modify_table("posts", |rows| {
            ran = true;
            rows.push(row(json!({"id": "p3"})));
        });
        assert!(result.is_err());
        assert!(!ran);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        assert!(store.get_table("posts").is_empty());
    }

    #[test]
    fn test_modify_refuses_corrupted_table() {
        let medium = Arc::new(MemoryMedium::new());
        medium.set("relaysql:table:posts", "[{\"id\": \"p1\"},").unwrap();
        let store = LocalStore::new(medium.clone(), DEFAULT_KEY_PREFIX);

        let err = store
            .modify_table("posts", |rows| rows.push(row(json!({"id": "p2"}))))
            .unwrap_err();
        assert!(matches!(err, RelayError::Store(_)));
        assert_eq!(
            medium.get("relaysql:table:posts").unwrap().as_deref(),
            Some("[{\"id\": \"p1\"},")
        );

        // An explicit replace still recovers the table
        store.set_table("posts", &[row(json!({"id": "p2"}))]).unwrap();
        assert_eq!(store.get_table("posts").len(), 1);
    }

    #[test]
    fn test_keys_are_namespaced() {
        let medium = Arc::new(MemoryMedium::new());
        medium.set("unrelated", "keep me").unwrap();
        let store = LocalStore::new(medium.clone(), "app:");

        store.set_table("likes", &[row(json!({"id": "l1"}))]).unwrap();
        assert_eq!(medium.keys().unwrap(), vec!["app:likes", "unrelated"]);
        assert_eq!(store.table_names().unwrap(), vec!["likes"]);

        store.clear().unwrap();
        assert_eq!(medium.keys().unwrap(), vec!["unrelated"]);
    }

    #[test]
    fn test_modify_table_persists() {
        let dir = tempdir().unwrap();
        let medium = Arc::new(FileMedium::open(dir.path()).unwrap());
        let store = LocalStore::new(medium, DEFAULT_KEY_PREFIX);

        let len = store
            .modify_table("comments", |rows| {
                rows.push(row(json!({"id": "c1"})));
                rows.len()
            })
            .unwrap();
        assert_eq!(len, 1);

        let reopened = LocalStore::new(
            Arc::new(FileMedium::open(dir.path()).unwrap()),
            DEFAULT_KEY_PREFIX,
        );
        assert_eq!(reopened.get_table("comments").len(), 1);
    }

    #[test]
    fn test_import_seeds_tables() {
        let store = LocalStore::in_memory();
        let count = store
            .import(&json!({
                "profiles": [{"id": "u1", "username": "bob"}],
                "posts": []
            }))
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.get_table("profiles")[0]["username"], json!("bob"));
    }

    #[test]
    fn test_import_rejects_non_table_document() {
        let store = LocalStore::in_memory();
        assert!(store.import(&json!({"profiles": "nope"})).is_err());
    }
}
