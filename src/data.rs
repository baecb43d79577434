// Export, import and bulk clear

use crate::categories::{duplicate_name, validate_name};
use crate::clock::next_timestamp;
use crate::error::{ImportRecordError, Result, StoreError};
use crate::models::{Category, CategoryPatch, NewCategory, NewTask, Task, TaskPatch, serde_helpers, timestamp};
use crate::schema::{self, SCHEMA_VERSION};
use crate::store::{self, Store, WriteMode};
use crate::tasks::validate_title;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Snapshot written by [`Store::export_all`] and read back by [`Store::import`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub version: u32,
    #[serde(with = "timestamp")]
    pub export_date: DateTime<Utc>,
    pub data: ExportData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportData {
    pub tasks: Vec<Task>,
    pub categories: Vec<Category>,
}

/// Outcome of an import: what went in, and what didn't
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub tasks_imported: usize,
    pub categories_imported: usize,
    pub errors: Vec<ImportRecordError>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A category as it appears in an import file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedCategory {
    #[serde(default, deserialize_with = "serde_helpers::opt_id_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    fields: NewCategory,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedTask {
    #[serde(default, deserialize_with = "serde_helpers::opt_id_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    fields: NewTask,
}

impl Store {
    /// Snapshot of every task and category, read in one transaction
    pub fn export_all(&self) -> Result<ExportPayload> {
        let tx = self.db.unchecked_transaction()?;
        let tasks: Vec<Task> = store::list_in(&tx, &[])?;
        let categories: Vec<Category> = store::list_in(&tx, &[])?;
        tx.commit()?;

        info!(tasks = tasks.len(), categories = categories.len(), "Exported store");
        Ok(ExportPayload {
            version: SCHEMA_VERSION,
            export_date: self.now(),
            data: ExportData { tasks, categories },
        })
    }

    /// Merge an exported payload into the store
    ///
    /// Categories go first so imported tasks can refer to them. Existing ids
    /// are updated in place, new ids are created as given. A record that
    /// fails is reported in [`ImportReport::errors`] and the rest carry on.
    pub fn import(&mut self, payload: &Value) -> Result<ImportReport> {
        let data = payload
            .get("data")
            .ok_or_else(|| StoreError::InvalidImport("missing `data` object".to_string()))?;
        let categories = section(data, "categories")?;
        let tasks = section(data, "tasks")?;

        let mut report = ImportReport::default();

        for raw in categories {
            match self.import_category(raw) {
                Ok(()) => report.categories_imported += 1,
                Err(err) => report.errors.push(record_error("categories", raw, "name", err)),
            }
        }

        for raw in tasks {
            match self.import_task(raw) {
                Ok(()) => report.tasks_imported += 1,
                Err(err) => report.errors.push(record_error("tasks", raw, "title", err)),
            }
        }

        info!(
            tasks = report.tasks_imported,
            categories = report.categories_imported,
            errors = report.errors.len(),
            "Import finished"
        );
        Ok(report)
    }

    fn import_category(&mut self, raw: &Value) -> Result<()> {
        let incoming: ImportedCategory = serde_json::from_value(raw.clone())?;
        validate_name(&incoming.fields.name)?;
        let id = incoming.id.unwrap_or_else(|| self.ids.generate());
        let now = self.now();

        let tx = self.db.transaction()?;

        match store::get_in::<Category>(&tx, &id)? {
            Some(mut category) => {
                let before = category.clone();
                category.apply(CategoryPatch {
                    name: Some(incoming.fields.name),
                    color: incoming.fields.color,
                    description: incoming.fields.description,
                });
                if category == before {
                    debug!(id = %id, "Imported category unchanged");
                } else {
                    category.updated_at = next_timestamp(self.clock.as_ref(), before.updated_at);
                    store::write_in(&tx, &category, WriteMode::Put).map_err(duplicate_name)?;
                }
            }
            None => {
                let mut category = incoming
                    .fields
                    .into_category(id, &self.config.default_category_color, now);
                (category.created_at, category.updated_at) =
                    preserved_timestamps(incoming.created_at, incoming.updated_at, now);
                store::write_in(&tx, &category, WriteMode::Add).map_err(duplicate_name)?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn import_task(&mut self, raw: &Value) -> Result<()> {
        let incoming: ImportedTask = serde_json::from_value(raw.clone())?;
        validate_title(&incoming.fields.title)?;
        let id = incoming.id.unwrap_or_else(|| self.ids.generate());

        let now = self.now();
        let tx = self.db.transaction()?;

        match store::get_in::<Task>(&tx, &id)? {
            Some(mut task) => {
                // Only keys present in the record are merged, as with categories
                let patch: TaskPatch = serde_json::from_value(raw.clone())?;
                let before = task.clone();
                task.apply(patch);
                if task == before {
                    debug!(id = %id, "Imported task unchanged");
                } else {
                    task.updated_at = next_timestamp(self.clock.as_ref(), before.updated_at);
                    store::write_in(&tx, &task, WriteMode::Put)?;
                }
            }
            None => {
                let mut task = incoming.fields.into_task(id, now);
                (task.created_at, task.updated_at) = preserved_timestamps(incoming.created_at, incoming.updated_at, now);
                store::write_in(&tx, &task, WriteMode::Add)?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Empty every collection in one transaction
    ///
    /// Either all three collections are cleared or none is.
    pub fn clear_all(&mut self) -> Result<()> {
        let tx = self.db.transaction()?;
        let mut removed = 0;
        for def in &schema::COLLECTIONS {
            removed += store::clear_in(&tx, def.name)?;
        }
        tx.commit()?;

        info!(removed, "Cleared all collections");
        Ok(())
    }
}

fn section<'a>(data: &'a Value, key: &str) -> Result<&'a Vec<Value>> {
    data.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::InvalidImport(format!("`data.{key}` must be an array")))
}

/// Keep the incoming timestamps, never letting `updatedAt` precede `createdAt`
fn preserved_timestamps(
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let created_at = created_at.unwrap_or(now);
    let updated_at = updated_at.unwrap_or(created_at).max(created_at);
    (created_at, updated_at)
}

fn record_error(collection: &'static str, raw: &Value, label_key: &str, err: StoreError) -> ImportRecordError {
    let id = match raw.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let error = ImportRecordError {
        collection,
        id,
        label: raw.get(label_key).and_then(Value::as_str).map(str::to_string),
        message: err.to_string(),
    };
    warn!(%error, "Skipped record during import");
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{Priority, Setting, TaskStatus};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn store_with_clock() -> (Store, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()));
        let store = Store::open_in_memory().unwrap().with_clock(clock.clone());
        (store, clock)
    }

    fn populate(store: &mut Store) {
        let work = store.create_category(NewCategory::new("Work")).unwrap();
        store.create_category(NewCategory::new("Home").color("#22c55e")).unwrap();
        store
            .create_task(NewTask::new("Report").category(&work.id).due("2026-10-20"))
            .unwrap();
        let mut pinned = NewTask::new("Pinned").status(TaskStatus::InProgress);
        pinned.extra.insert("pinned".to_string(), json!(true));
        store.create_task(pinned).unwrap();
    }

    fn by_id<T: Serialize>(items: &[T]) -> BTreeMap<String, Value> {
        items
            .iter()
            .map(|item| {
                let value = serde_json::to_value(item).unwrap();
                (value["id"].as_str().unwrap().to_string(), value)
            })
            .collect()
    }

    #[test]
    fn test_export_shape() {
        let (mut store, _) = store_with_clock();
        populate(&mut store);

        let value = serde_json::to_value(store.export_all().unwrap()).unwrap();
        assert_eq!(value["version"], json!(SCHEMA_VERSION));
        assert_eq!(value["exportDate"], json!("2026-10-19T08:00:00.000Z"));
        assert_eq!(value["data"]["tasks"].as_array().unwrap().len(), 2);
        assert_eq!(value["data"]["categories"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_reimport_into_populated_store_is_a_no_op() {
        let (mut store, clock) = store_with_clock();
        populate(&mut store);
        let before = store.export_all().unwrap();

        clock.advance(Duration::hours(1));
        let report = store.import(&serde_json::to_value(&before).unwrap()).unwrap();

        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(report.tasks_imported, 2);
        assert_eq!(report.categories_imported, 2);

        let after = store.export_all().unwrap();
        assert_eq!(by_id(&after.data.tasks), by_id(&before.data.tasks));
        assert_eq!(by_id(&after.data.categories), by_id(&before.data.categories));
    }

    #[test]
    fn test_import_into_empty_store_preserves_ids_and_timestamps() {
        let (mut source, _) = store_with_clock();
        populate(&mut source);
        let exported = serde_json::to_value(source.export_all().unwrap()).unwrap();

        let (mut target, _) = store_with_clock();
        let report = target.import(&exported).unwrap();
        assert!(report.is_clean());

        let exported_tasks: Vec<Task> = serde_json::from_value(exported["data"]["tasks"].clone()).unwrap();
        assert_eq!(by_id(&target.get_all_tasks().unwrap()), by_id(&exported_tasks));
        let pinned = target.search_tasks("pinned").unwrap().pop().unwrap();
        assert_eq!(pinned.extra.get("pinned"), Some(&json!(true)));
    }

    #[test]
    fn test_import_updates_existing_records() {
        let (mut store, clock) = store_with_clock();
        let task = store.create_task(NewTask::new("Old title")).unwrap();

        clock.advance(Duration::minutes(5));
        let payload = json!({
            "version": 1,
            "data": {
                "categories": [],
                "tasks": [{ "id": task.id, "title": "New title", "status": "completed" }]
            }
        });
        let report = store.import(&payload).unwrap();
        assert_eq!(report.tasks_imported, 1);

        let updated = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(updated.title, "New title");
        assert_eq!(updated.status, TaskStatus::Completed);
        assert_eq!(updated.created_at, task.created_at);
        assert_eq!(updated.updated_at, task.updated_at + Duration::minutes(5));
    }

    #[test]
    fn test_partial_import_keeps_absent_fields() {
        let (mut store, _) = store_with_clock();
        let home = store
            .create_category(NewCategory::new("Home").color("#ff0000"))
            .unwrap();
        let task = store
            .create_task(
                NewTask::new("Original")
                    .status(TaskStatus::InProgress)
                    .priority(Priority::High)
                    .category(&home.id)
                    .due("2026-11-01"),
            )
            .unwrap();

        let payload = json!({
            "data": {
                "categories": [{ "id": home.id, "name": "House" }],
                "tasks": [{ "id": task.id, "title": "Renamed" }]
            }
        });
        let report = store.import(&payload).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);

        let task = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(task.title, "Renamed");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.category_id.as_deref(), Some(home.id.as_str()));
        assert_eq!(task.due_date.as_deref(), Some("2026-11-01"));

        let home = store.get_category(&home.id).unwrap().unwrap();
        assert_eq!(home.name, "House");
        assert_eq!(home.color, "#ff0000");

        // An explicit null still clears
        let payload = json!({
            "data": { "categories": [], "tasks": [{ "id": task.id, "title": "Renamed", "categoryId": null }] }
        });
        store.import(&payload).unwrap();
        assert_eq!(store.get_task(&task.id).unwrap().unwrap().category_id, None);
    }

    #[test]
    fn test_import_collects_record_failures() {
        let (mut store, _) = store_with_clock();
        store.create_category(NewCategory::new("Work")).unwrap();

        let payload = json!({
            "data": {
                "categories": [
                    { "id": "c-new", "name": "Home" },
                    { "id": "c-dup", "name": "Work" }
                ],
                "tasks": [
                    { "id": 17, "title": "Numeric id", "createdAt": "2026-01-01T00:00:00.000Z" },
                    { "id": "t-bad", "title": "Bad status", "status": "someday" },
                    { "id": "t-blank", "title": " " },
                    "not an object",
                    { "id": "t-late", "title": "Clamped", "createdAt": "2026-05-01T00:00:00.000Z",
                      "updatedAt": "2026-04-01T00:00:00.000Z" }
                ]
            }
        });

        let report = store.import(&payload).unwrap();

        assert_eq!(report.categories_imported, 1);
        assert_eq!(report.tasks_imported, 2);
        assert_eq!(report.errors.len(), 4);

        let dup = &report.errors[0];
        assert_eq!(dup.collection, "categories");
        assert_eq!(dup.id.as_deref(), Some("c-dup"));
        assert_eq!(dup.label.as_deref(), Some("Work"));
        assert!(dup.message.contains("already exists"));

        assert_eq!(report.errors[1].label.as_deref(), Some("Bad status"));
        assert_eq!(report.errors[3].id, None);

        let numeric = store.get_task("17").unwrap().unwrap();
        assert_eq!(numeric.created_at, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(numeric.updated_at, numeric.created_at);

        let clamped = store.get_task("t-late").unwrap().unwrap();
        assert_eq!(clamped.updated_at, clamped.created_at);

        assert!(store.get_category("c-new").unwrap().is_some());
        assert!(store.get_category("c-dup").unwrap().is_none());
    }

    #[test]
    fn test_import_rejects_bad_shape() {
        let (mut store, _) = store_with_clock();

        for payload in [
            json!({}),
            json!({ "data": { "tasks": [] } }),
            json!({ "data": { "tasks": {}, "categories": [] } }),
            json!([1, 2, 3]),
        ] {
            let err = store.import(&payload).unwrap_err();
            assert!(matches!(err, StoreError::InvalidImport(_)), "{payload}");
        }
    }

    #[test]
    fn test_clear_all_empties_every_collection() {
        let (mut store, _) = store_with_clock();
        populate(&mut store);
        store.save_setting("theme", json!("dark")).unwrap();

        store.clear_all().unwrap();

        assert_eq!(store.count::<Task>().unwrap(), 0);
        assert_eq!(store.count::<Category>().unwrap(), 0);
        assert_eq!(store.count::<Setting>().unwrap(), 0);
        assert!(store.get_tasks_by_status(TaskStatus::Todo).unwrap().is_empty());

        // Unique names are released too
        store.create_category(NewCategory::new("Work")).unwrap();
    }
}
