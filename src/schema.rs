// Collection and index definitions, and the additive upgrade that creates them

use crate::error::Result;
use rusqlite::{Connection, Transaction, params};
use tracing::{debug, info};

/// Bump when a collection or index is added below
pub const SCHEMA_VERSION: u32 = 1;

/// A secondary index over one document field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    /// JSON field the index reads
    pub key_path: &'static str,
    pub unique: bool,
}

/// A named group of same-shaped documents keyed by `key_path`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionDef {
    pub name: &'static str,
    pub key_path: &'static str,
    pub indexes: &'static [IndexDef],
}

impl CollectionDef {
    /// Index reading `field`, if one is declared
    pub fn index(&self, field: &str) -> Option<&'static IndexDef> {
        self.indexes.iter().find(|index| index.key_path == field)
    }
}

const fn index(key_path: &'static str, unique: bool) -> IndexDef {
    IndexDef {
        name: key_path,
        key_path,
        unique,
    }
}

pub const TASKS: CollectionDef = CollectionDef {
    name: "tasks",
    key_path: "id",
    indexes: &[
        index("status", false),
        index("priority", false),
        index("categoryId", false),
        index("createdAt", false),
        index("updatedAt", false),
        index("dueDate", false),
    ],
};

pub const CATEGORIES: CollectionDef = CollectionDef {
    name: "categories",
    key_path: "id",
    indexes: &[index("name", true), index("createdAt", false)],
};

pub const SETTINGS: CollectionDef = CollectionDef {
    name: "settings",
    key_path: "key",
    indexes: &[],
};

pub const COLLECTIONS: [CollectionDef; 3] = [TASKS, CATEGORIES, SETTINGS];

/// Look up a collection by name
pub fn collection(name: &str) -> Option<&'static CollectionDef> {
    COLLECTIONS.iter().find(|def| def.name == name)
}

/// Schema version recorded in the database file (0 for a fresh file)
pub(crate) fn stored_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Create whatever is missing and record the current version
///
/// Never drops anything. Returns the collections that gained an index, whose
/// existing documents need their index rows rebuilt.
pub(crate) fn upgrade(tx: &Transaction<'_>, from: u32) -> Result<Vec<&'static str>> {
    info!(from, to = SCHEMA_VERSION, "Upgrading store schema");

    tx.execute_batch(
        r#"
        -- Documents, one row per (collection, key)
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        );

        CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(collection, updated_at);

        -- Secondary index entries, one row per (document, indexed field)
        CREATE TABLE IF NOT EXISTS record_indexes (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            field_name TEXT NOT NULL,
            field_value_str TEXT,
            field_value_int INTEGER,
            unique_value TEXT,
            PRIMARY KEY (collection, id, field_name),
            FOREIGN KEY (collection, id) REFERENCES records(collection, id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_record_indexes_field_str ON record_indexes(collection, field_name, field_value_str);
        CREATE INDEX IF NOT EXISTS idx_record_indexes_field_int ON record_indexes(collection, field_name, field_value_int);

        -- unique_value is only set for fields declared unique
        CREATE UNIQUE INDEX IF NOT EXISTS idx_record_indexes_unique
            ON record_indexes(collection, field_name, unique_value)
            WHERE unique_value IS NOT NULL;

        -- Registry of what has been created so far
        CREATE TABLE IF NOT EXISTS collection_defs (
            name TEXT PRIMARY KEY,
            key_path TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS index_defs (
            collection TEXT NOT NULL,
            name TEXT NOT NULL,
            key_path TEXT NOT NULL,
            is_unique INTEGER NOT NULL,
            PRIMARY KEY (collection, name),
            FOREIGN KEY (collection) REFERENCES collection_defs(name)
        );
        "#,
    )?;

    let mut reindex = Vec::new();

    for def in &COLLECTIONS {
        let created = tx.execute(
            "INSERT OR IGNORE INTO collection_defs (name, key_path) VALUES (?1, ?2)",
            params![def.name, def.key_path],
        )?;
        if created > 0 {
            info!(collection = def.name, "Created collection");
        }

        let mut added = 0;
        for index in def.indexes {
            added += tx.execute(
                "INSERT OR IGNORE INTO index_defs (collection, name, key_path, is_unique) VALUES (?1, ?2, ?3, ?4)",
                params![def.name, index.name, index.key_path, index.unique],
            )?;
        }
        if added > 0 {
            debug!(collection = def.name, added, "Created indexes");
            reindex.push(def.name);
        }
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(reindex)
}

/// Names of the indexes registered for `collection`, sorted
pub(crate) fn registered_indexes(conn: &Connection, collection: &str) -> Result<Vec<(String, bool)>> {
    let mut stmt = conn.prepare("SELECT name, is_unique FROM index_defs WHERE collection = ?1 ORDER BY name")?;
    let rows = stmt.query_map([collection], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))?;

    let mut indexes = Vec::new();
    for row in rows {
        indexes.push(row?);
    }
    Ok(indexes)
}

/// Names of the registered collections, sorted
pub(crate) fn registered_collections(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM collection_defs ORDER BY name")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut names = Vec::new();
    for row in rows {
        names.push(row?);
    }
    Ok(names)
}
