// Async handle over a Store: one lock, work runs on the blocking pool

use crate::clock::{Clock, IdGenerator, SystemClock, UuidV7Generator};
use crate::config::StoreConfig;
use crate::data::{ExportPayload, ImportReport};
use crate::error::{Result, StoreError};
use crate::models::{Category, CategoryPatch, NewCategory, NewTask, Priority, Setting, Task, TaskPatch, TaskStatus};
use crate::stats::TaskStatistics;
use crate::store::Store;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{debug, info};

/// Owned handle with an explicit open/close lifecycle.
///
/// Cloning is cheap; clones share the same underlying store. Any repository
/// call made before [`StoreHandle::open`] (or after [`StoreHandle::close`])
/// fails with [`StoreError::NotInitialized`].
#[derive(Clone)]
pub struct StoreHandle {
    config: StoreConfig,
    inner: Arc<Mutex<Option<Store>>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl StoreHandle {
    /// Create a closed handle for the store described by `config`.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(None)),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Generator),
        }
    }

    /// Time source handed to the store on open.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Id generator handed to the store on open.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Open the database, running the schema upgrade if needed.
    ///
    /// Opening an already open handle is a no-op.
    pub async fn open(&self) -> Result<()> {
        let mut guard = self.inner.clone().lock_owned().await;
        if guard.is_some() {
            debug!("Store already open");
            return Ok(());
        }

        let config = self.config.clone();
        let clock = self.clock.clone();
        let ids = self.ids.clone();
        let store = tokio::task::spawn_blocking(move || {
            Store::open(&config).map(|store| store.with_clock(clock).with_id_generator(ids))
        })
        .await
        .map_err(join_error)??;

        *guard = Some(store);
        info!(name = %self.config.name, "Store handle opened");
        Ok(())
    }

    /// Close the database; closing a closed handle is a no-op.
    pub async fn close(&self) -> Result<()> {
        let Some(store) = self.inner.lock().await.take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || store.close())
            .await
            .map_err(join_error)??;
        info!(name = %self.config.name, "Store handle closed");
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Run `op` against the open store on the blocking pool.
    async fn call<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Store) -> Result<T> + Send + 'static,
    {
        let mut guard = self.inner.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let store = guard.as_mut().ok_or(StoreError::NotInitialized)?;
            op(store)
        })
        .await
        .map_err(join_error)?
    }

    pub async fn version(&self) -> Result<u32> {
        self.call(|store| store.version()).await
    }

    // Tasks

    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        self.call(move |store| store.create_task(new)).await
    }

    pub async fn get_all_tasks(&self) -> Result<Vec<Task>> {
        self.call(|store| store.get_all_tasks()).await
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let id = id.to_string();
        self.call(move |store| store.get_task(&id)).await
    }

    pub async fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.call(move |store| store.get_tasks_by_status(status)).await
    }

    pub async fn get_tasks_by_category(&self, category_id: &str) -> Result<Vec<Task>> {
        let category_id = category_id.to_string();
        self.call(move |store| store.get_tasks_by_category(&category_id)).await
    }

    pub async fn get_tasks_by_priority(&self, priority: Priority) -> Result<Vec<Task>> {
        self.call(move |store| store.get_tasks_by_priority(priority)).await
    }

    pub async fn get_tasks_due_on(&self, date: NaiveDate) -> Result<Vec<Task>> {
        self.call(move |store| store.get_tasks_due_on(date)).await
    }

    pub async fn has_tasks_due_on(&self, date: NaiveDate) -> Result<bool> {
        self.call(move |store| store.has_tasks_due_on(date)).await
    }

    pub async fn get_tasks_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<Task>> {
        self.call(move |store| store.get_tasks_updated_since(since)).await
    }

    pub async fn search_tasks(&self, query: &str) -> Result<Vec<Task>> {
        let query = query.to_string();
        self.call(move |store| store.search_tasks(&query)).await
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let id = id.to_string();
        self.call(move |store| store.update_task(&id, patch)).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.call(move |store| store.delete_task(&id)).await
    }

    // Categories

    pub async fn create_category(&self, new: NewCategory) -> Result<Category> {
        self.call(move |store| store.create_category(new)).await
    }

    pub async fn get_all_categories(&self) -> Result<Vec<Category>> {
        self.call(|store| store.get_all_categories()).await
    }

    pub async fn get_category(&self, id: &str) -> Result<Option<Category>> {
        let id = id.to_string();
        self.call(move |store| store.get_category(&id)).await
    }

    pub async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let name = name.to_string();
        self.call(move |store| store.get_category_by_name(&name)).await
    }

    pub async fn update_category(&self, id: &str, patch: CategoryPatch) -> Result<Category> {
        let id = id.to_string();
        self.call(move |store| store.update_category(&id, patch)).await
    }

    /// Delete a category, detaching its tasks; returns how many were detached.
    pub async fn delete_category(&self, id: &str) -> Result<usize> {
        let id = id.to_string();
        self.call(move |store| store.delete_category(&id)).await
    }

    // Settings

    pub async fn save_setting(&self, key: &str, value: Value) -> Result<Setting> {
        let key = key.to_string();
        self.call(move |store| store.save_setting(&key, value)).await
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.call(move |store| store.get_setting(&key)).await
    }

    pub async fn get_setting_or(&self, key: &str, default: Value) -> Result<Value> {
        let key = key.to_string();
        self.call(move |store| store.get_setting_or(&key, default)).await
    }

    pub async fn delete_setting(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.call(move |store| store.delete_setting(&key)).await
    }

    // Data management

    pub async fn export_all(&self) -> Result<ExportPayload> {
        self.call(|store| store.export_all()).await
    }

    pub async fn import(&self, payload: Value) -> Result<ImportReport> {
        self.call(move |store| store.import(&payload)).await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.call(|store| store.clear_all()).await
    }

    pub async fn statistics(&self) -> Result<TaskStatistics> {
        self.call(|store| store.statistics()).await
    }

    pub async fn statistics_at<Tz>(&self, now: DateTime<Tz>) -> Result<TaskStatistics>
    where
        Tz: TimeZone + Send + 'static,
        Tz::Offset: Send,
    {
        self.call(move |store| store.statistics_at(now)).await
    }
}

fn join_error(err: JoinError) -> StoreError {
    StoreError::Join(format!("Task join error: {err}"))
}
