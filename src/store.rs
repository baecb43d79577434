// Document store on SQLite: generic records, secondary indexes, lifecycle

use crate::clock::{Clock, IdGenerator, SystemClock, UuidV7Generator};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::models::{Category, Task};
use crate::record::{IndexValue, Record};
use crate::schema::{self, CollectionDef, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Whether a write may replace an existing document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// Fail if the key is taken
    Add,
    /// Insert or replace
    Put,
}

/// Embedded document store backed by a single SQLite database
///
/// Opening runs the schema upgrade, so a `Store` value is always ready for
/// repository calls. Use [`crate::StoreHandle`] for async callers.
pub struct Store {
    path: Option<PathBuf>,
    pub(crate) db: Connection,
    pub(crate) config: StoreConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
}

impl Store {
    /// Open or create the store described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if config.in_memory {
            let db = Connection::open_in_memory()?;
            return Self::init(db, None, config.clone());
        }

        fs::create_dir_all(&config.data_dir)?;

        let db_path = config.db_path();
        let db = Connection::open(&db_path)?;
        info!(path = ?db_path, "Opened store database");

        Self::init(db, Some(db_path), config.clone())
    }

    /// Open a fresh store that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    fn init(db: Connection, path: Option<PathBuf>, config: StoreConfig) -> Result<Self> {
        db.pragma_update(None, "foreign_keys", true)?;
        db.busy_timeout(Duration::from_secs(5))?;

        let mut store = Self {
            path,
            db,
            config,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Generator),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Replace the time source used for `createdAt`/`updatedAt`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the generator used for new document ids
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Schema version recorded in the database
    pub fn version(&self) -> Result<u32> {
        schema::stored_version(&self.db)
    }

    /// Names of the collections created in this database
    pub fn collection_names(&self) -> Result<Vec<String>> {
        schema::registered_collections(&self.db)
    }

    /// Indexes created for `collection`, as `(name, unique)` pairs
    pub fn index_names(&self, collection: &str) -> Result<Vec<(String, bool)>> {
        schema::registered_indexes(&self.db, collection)
    }

    /// Release the database connection
    pub fn close(self) -> Result<()> {
        self.db.close().map_err(|(_, e)| StoreError::from(e))?;
        debug!("Store closed");
        Ok(())
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run the additive upgrade when the file predates this build
    fn migrate(&mut self) -> Result<()> {
        let stored = schema::stored_version(&self.db)?;

        if stored > SCHEMA_VERSION {
            return Err(StoreError::VersionMismatch {
                stored,
                supported: SCHEMA_VERSION,
            });
        }
        if stored == SCHEMA_VERSION {
            debug!(version = stored, "Store schema up to date");
            return Ok(());
        }

        let tx = self.db.transaction()?;
        let reindex = schema::upgrade(&tx, stored)?;
        for collection in reindex {
            let count = match collection {
                "tasks" => rebuild_indexes_in::<Task>(&tx)?,
                "categories" => rebuild_indexes_in::<Category>(&tx)?,
                _ => 0,
            };
            debug!(collection, count, "Reindexed existing records");
        }
        tx.commit()?;

        info!(version = SCHEMA_VERSION, "Store schema ready");
        Ok(())
    }

    // ========================================================================
    // Generic read API
    // ========================================================================

    /// Get a document by primary key
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        get_in(&self.db, id)
    }

    /// List documents, optionally narrowed by indexed-field filters
    ///
    /// Filters may only name fields the collection declares an index for.
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>> {
        list_in(&self.db, filters)
    }

    /// Number of documents in the collection
    pub fn count<T: Record>(&self) -> Result<usize> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            [T::collection_name()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Rebuild index rows for every document of type T
    ///
    /// Returns the number of documents indexed.
    pub fn rebuild_indexes<T: Record>(&mut self) -> Result<usize> {
        let tx = self.db.transaction()?;
        let count = rebuild_indexes_in::<T>(&tx)?;
        tx.commit()?;
        Ok(count)
    }
}

// ============================================================================
// Connection-level helpers, usable inside or outside a transaction
// ============================================================================

fn collection_def<T: Record>() -> Result<&'static CollectionDef> {
    let collection = T::collection_name();
    validate_collection_name(collection)?;
    schema::collection(collection).ok_or_else(|| StoreError::invalid(format!("Unknown collection: {}", collection)))
}

pub(crate) fn get_in<T: Record>(conn: &Connection, id: &str) -> Result<Option<T>> {
    let collection = T::collection_name();

    let json: Option<String> = conn
        .query_row(
            "SELECT data_json FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub(crate) fn list_in<T: Record>(conn: &Connection, filters: &[Filter]) -> Result<Vec<T>> {
    let def = collection_def::<T>()?;

    let mut query = String::from(
        "SELECT r.data_json
         FROM records r
         WHERE r.collection = ?1",
    );

    for (i, filter) in filters.iter().enumerate() {
        validate_field_name(&filter.field)?;
        if def.index(&filter.field).is_none() {
            return Err(StoreError::invalid(format!(
                "Collection {} has no index on {}",
                def.name, filter.field
            )));
        }

        let alias = format!("idx{}", i);
        let column = match &filter.value {
            IndexValue::String(_) => "field_value_str",
            IndexValue::Int(_) => "field_value_int",
        };
        let escape = if filter.op.is_like() { " ESCAPE '\\'" } else { "" };

        query.push_str(&format!(
            " AND EXISTS (
                SELECT 1 FROM record_indexes {alias}
                WHERE {alias}.collection = r.collection
                  AND {alias}.id = r.id
                  AND {alias}.field_name = ?{name_param}
                  AND {alias}.{column} {op} ?{value_param}{escape})",
            name_param = i + 2,
            value_param = i + 2 + filters.len(),
            op = filter.op.to_sql(),
        ));
    }

    query.push_str(" ORDER BY r.updated_at DESC, r.id");

    // Bind parameters: collection, then field names, then values
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    params.push(Box::new(def.name.to_string()));

    for filter in filters {
        params.push(Box::new(filter.field.clone()));
    }

    for filter in filters {
        match filter.bound_value() {
            IndexValue::String(s) => params.push(Box::new(s)),
            IndexValue::Int(i) => params.push(Box::new(i)),
        }
    }

    let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map(params_refs.as_slice(), |row| row.get::<_, String>(0))?;

    let mut results = Vec::new();
    for row in rows {
        let record: T = serde_json::from_str(&row?)?;
        results.push(record);
    }

    Ok(results)
}

/// Persist a document and refresh its index rows
pub(crate) fn write_in<T: Record>(conn: &Connection, record: &T, mode: WriteMode) -> Result<()> {
    let def = collection_def::<T>()?;
    let id = record.id();
    validate_id(id)?;

    let data_json = serde_json::to_string(record)?;

    let written = match mode {
        WriteMode::Add => conn.execute(
            "INSERT INTO records (collection, id, data_json, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![def.name, id, data_json, record.updated_at()],
        ),
        WriteMode::Put => conn.execute(
            "INSERT INTO records (collection, id, data_json, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (collection, id) DO UPDATE SET
                data_json = excluded.data_json,
                updated_at = excluded.updated_at",
            params![def.name, id, data_json, record.updated_at()],
        ),
    };

    if let Err(err) = written {
        if is_constraint_violation(&err) {
            return Err(StoreError::UniqueConstraint {
                collection: def.name.to_string(),
                field: def.key_path.to_string(),
                value: id.to_string(),
            });
        }
        return Err(err.into());
    }

    update_indexes_in(conn, def, id, &record.indexed_fields())?;
    debug!(collection = def.name, id, ?mode, "Wrote record");
    Ok(())
}

/// Remove a document; `Ok(false)` when there was nothing to remove
pub(crate) fn delete_in<T: Record>(conn: &Connection, id: &str) -> Result<bool> {
    let collection = T::collection_name();

    conn.execute(
        "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )?;
    let removed = conn.execute(
        "DELETE FROM records WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )?;

    Ok(removed > 0)
}

/// Remove every document in a collection, returning how many were removed
pub(crate) fn clear_in(conn: &Connection, collection: &str) -> Result<usize> {
    conn.execute("DELETE FROM record_indexes WHERE collection = ?1", [collection])?;
    let removed = conn.execute("DELETE FROM records WHERE collection = ?1", [collection])?;
    Ok(removed)
}

fn update_indexes_in(
    conn: &Connection,
    def: &CollectionDef,
    id: &str,
    fields: &HashMap<String, IndexValue>,
) -> Result<()> {
    // Delete old indexes
    conn.execute(
        "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
        params![def.name, id],
    )?;

    for (field_name, value) in fields {
        let Some(index) = def.index(field_name) else {
            continue;
        };
        validate_field_name(field_name)?;

        let unique_value = index.unique.then(|| value.to_string());
        let (value_str, value_int) = match value {
            IndexValue::String(s) => (Some(s.as_str()), None),
            IndexValue::Int(i) => (None, Some(*i)),
        };

        let inserted = conn.execute(
            "INSERT INTO record_indexes
                (collection, id, field_name, field_value_str, field_value_int, unique_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![def.name, id, field_name, value_str, value_int, unique_value],
        );

        match inserted {
            Ok(_) => {}
            Err(err) if index.unique && is_constraint_violation(&err) => {
                return Err(StoreError::UniqueConstraint {
                    collection: def.name.to_string(),
                    field: field_name.clone(),
                    value: value.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

/// Recompute index rows for all documents of type T
///
/// Documents that no longer decode as T are skipped with a warning.
pub(crate) fn rebuild_indexes_in<T: Record>(conn: &Connection) -> Result<usize> {
    let def = collection_def::<T>()?;

    let records_data: Vec<(String, String)> = {
        let mut stmt = conn.prepare("SELECT id, data_json FROM records WHERE collection = ?1")?;
        let rows = stmt.query_map([def.name], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut count = 0;
    for (id, data_json) in records_data {
        let record: T = match serde_json::from_str(&data_json) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    collection = def.name,
                    id = &id,
                    error = ?e,
                    "Skipping record that doesn't match type"
                );
                continue;
            }
        };

        update_indexes_in(conn, def, &id, &record.indexed_fields())?;
        count += 1;
    }

    Ok(count)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::invalid("Collection name cannot be empty"));
    }
    if name.len() > 64 {
        return Err(StoreError::invalid(format!(
            "Collection name too long: {} (max 64 chars)",
            name
        )));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(StoreError::invalid(format!(
            "Invalid collection name: {} (must be alphanumeric with _/-)",
            name
        )));
    }
    Ok(())
}

fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::invalid("Field name cannot be empty"));
    }
    if name.len() > 64 {
        return Err(StoreError::invalid(format!("Field name too long: {} (max 64 chars)", name)));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(StoreError::invalid(format!(
            "Invalid field name: {} (must be alphanumeric with _)",
            name
        )));
    }
    Ok(())
}

/// Validate a primary key
pub(crate) fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(StoreError::invalid("Record ID cannot be empty or whitespace-only"));
    }

    if id.len() > 256 {
        return Err(StoreError::invalid(format!("Record ID too long: {} chars (max 256)", id.len())));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use crate::models::{NewCategory, NewTask, Setting, TaskStatus};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn task(id: &str, status: TaskStatus) -> Task {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        NewTask::new(format!("Task {}", id))
            .status(status)
            .into_task(id.to_string(), now)
    }

    fn category(id: &str, name: &str) -> Category {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        NewCategory::new(name).into_category(id.to_string(), "#4f46e5", now)
    }

    #[test]
    fn test_store_open_creates_database() {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig::at(temp.path().join("data"));

        let store = Store::open(&config).unwrap();
        assert!(temp.path().join("data/TodoKanbanDB.db").exists());
        assert_eq!(store.path(), Some(config.db_path().as_path()));
        assert_eq!(store.version().unwrap(), SCHEMA_VERSION);
        assert_eq!(
            store.collection_names().unwrap(),
            vec!["categories", "settings", "tasks"]
        );
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig::at(temp.path());

        {
            let store = Store::open(&config).unwrap();
            write_in(&store.db, &task("t1", TaskStatus::Todo), WriteMode::Add).unwrap();
            store.close().unwrap();
        }

        let store = Store::open(&config).unwrap();
        let loaded: Option<Task> = store.get("t1").unwrap();
        assert_eq!(loaded.unwrap().title, "Task t1");
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig::at(temp.path());
        Store::open(&config).unwrap().close().unwrap();

        let conn = Connection::open(config.db_path()).unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        drop(conn);

        match Store::open(&config) {
            Err(StoreError::VersionMismatch { stored, supported }) => {
                assert_eq!(stored, SCHEMA_VERSION + 1);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("expected VersionMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_get_nonexistent() {
        let store = Store::open_in_memory().unwrap();
        let result: Option<Task> = store.get("nonexistent").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_add_rejects_existing_key() {
        let store = Store::open_in_memory().unwrap();
        write_in(&store.db, &task("t1", TaskStatus::Todo), WriteMode::Add).unwrap();

        let err = write_in(&store.db, &task("t1", TaskStatus::Completed), WriteMode::Add).unwrap_err();
        assert!(matches!(err, StoreError::UniqueConstraint { ref field, .. } if field == "id"));

        write_in(&store.db, &task("t1", TaskStatus::Completed), WriteMode::Put).unwrap();
        let loaded: Task = store.get("t1").unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
    }

    #[test]
    fn test_list_with_filter() {
        let store = Store::open_in_memory().unwrap();
        write_in(&store.db, &task("t1", TaskStatus::Todo), WriteMode::Add).unwrap();
        write_in(&store.db, &task("t2", TaskStatus::Completed), WriteMode::Add).unwrap();
        write_in(&store.db, &task("t3", TaskStatus::Todo), WriteMode::Add).unwrap();

        let all: Vec<Task> = store.list(&[]).unwrap();
        assert_eq!(all.len(), 3);

        let todo: Vec<Task> = store.list(&[Filter::eq("status", "todo")]).unwrap();
        let mut ids: Vec<&str> = todo.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["t1", "t3"]);

        let not_todo: Vec<Task> = store
            .list(&[Filter::new("status", FilterOp::Ne, "todo")])
            .unwrap();
        assert_eq!(not_todo.len(), 1);
        assert_eq!(not_todo[0].id, "t2");
    }

    #[test]
    fn test_list_rejects_unindexed_field() {
        let store = Store::open_in_memory().unwrap();
        let err = store.list::<Task>(&[Filter::eq("title", "x")]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));

        let err = store.list::<Setting>(&[Filter::eq("key", "x")]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn test_unique_index_enforced() {
        let store = Store::open_in_memory().unwrap();
        write_in(&store.db, &category("c1", "Work"), WriteMode::Add).unwrap();

        let err = write_in(&store.db, &category("c2", "Work"), WriteMode::Add).unwrap_err();
        match err {
            StoreError::UniqueConstraint { collection, field, value } => {
                assert_eq!(collection, "categories");
                assert_eq!(field, "name");
                assert_eq!(value, "Work");
            }
            other => panic!("expected UniqueConstraint, got {other:?}"),
        }

        // Case-sensitive, and rewriting a record with its own name is fine
        write_in(&store.db, &category("c3", "work"), WriteMode::Add).unwrap();
        write_in(&store.db, &category("c1", "Work"), WriteMode::Put).unwrap();
    }

    #[test]
    fn test_delete_frees_unique_value() {
        let store = Store::open_in_memory().unwrap();
        write_in(&store.db, &category("c1", "Work"), WriteMode::Add).unwrap();

        assert!(delete_in::<Category>(&store.db, "c1").unwrap());
        assert!(!delete_in::<Category>(&store.db, "c1").unwrap());

        write_in(&store.db, &category("c2", "Work"), WriteMode::Add).unwrap();
    }

    #[test]
    fn test_rebuild_indexes() {
        let mut store = Store::open_in_memory().unwrap();
        write_in(&store.db, &task("t1", TaskStatus::Todo), WriteMode::Add).unwrap();
        write_in(&store.db, &task("t2", TaskStatus::Todo), WriteMode::Add).unwrap();

        store.db.execute("DELETE FROM record_indexes", []).unwrap();
        assert!(store.list::<Task>(&[Filter::eq("status", "todo")]).unwrap().is_empty());

        assert_eq!(store.rebuild_indexes::<Task>().unwrap(), 2);
        assert_eq!(store.list::<Task>(&[Filter::eq("status", "todo")]).unwrap().len(), 2);
    }

    #[test]
    fn test_count_and_clear() {
        let store = Store::open_in_memory().unwrap();
        write_in(&store.db, &task("t1", TaskStatus::Todo), WriteMode::Add).unwrap();
        write_in(&store.db, &category("c1", "Work"), WriteMode::Add).unwrap();

        assert_eq!(store.count::<Task>().unwrap(), 1);
        assert_eq!(clear_in(&store.db, "tasks").unwrap(), 1);
        assert_eq!(store.count::<Task>().unwrap(), 0);
        assert_eq!(store.count::<Category>().unwrap(), 1);
    }

    #[test]
    fn test_validation_collection_name() {
        assert!(validate_collection_name("valid_name").is_ok());
        assert!(validate_collection_name("valid-name").is_ok());

        assert!(validate_collection_name("invalid/name").is_err());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validation_field_name() {
        assert!(validate_field_name("categoryId").is_ok());
        assert!(validate_field_name("valid_field").is_ok());

        assert!(validate_field_name("invalid-field").is_err());
        assert!(validate_field_name("").is_err());
        assert!(validate_field_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validation_id() {
        assert!(validate_id("t1").is_ok());
        assert!(validate_id("   ").is_err());
        assert!(validate_id(&"x".repeat(257)).is_err());
    }
}
