// Task repository

use crate::clock::next_timestamp;
use crate::error::{Result, StoreError};
use crate::filter::{Filter, FilterOp};
use crate::models::{NewTask, Priority, Task, TaskPatch, TaskStatus};
use crate::store::{self, Store, WriteMode};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

impl Store {
    /// Create a task with a store-generated id and timestamps
    pub fn create_task(&mut self, new: NewTask) -> Result<Task> {
        let id = self.ids.generate();
        let task = self.build_task(new, id)?;

        store::write_in(&self.db, &task, WriteMode::Add)?;
        info!(id = %task.id, "Task created");
        Ok(task)
    }

    fn build_task(&self, new: NewTask, id: String) -> Result<Task> {
        validate_title(&new.title)?;
        Ok(new.into_task(id, self.now()))
    }

    /// All tasks, newest write first
    pub fn get_all_tasks(&self) -> Result<Vec<Task>> {
        self.list(&[])
    }

    /// The task with this id, or `None`
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        self.get(id)
    }

    pub fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.list(&[Filter::eq("status", status.as_str())])
    }

    pub fn get_tasks_by_category(&self, category_id: &str) -> Result<Vec<Task>> {
        self.list(&[Filter::eq("categoryId", category_id)])
    }

    pub fn get_tasks_by_priority(&self, priority: Priority) -> Result<Vec<Task>> {
        self.list(&[Filter::eq("priority", priority.as_str())])
    }

    /// Tasks whose due date falls on `date` (matched on the `YYYY-MM-DD` prefix)
    pub fn get_tasks_due_on(&self, date: NaiveDate) -> Result<Vec<Task>> {
        let prefix = date.format("%Y-%m-%d").to_string();
        self.list(&[Filter::new("dueDate", FilterOp::StartsWith, prefix)])
    }

    pub fn has_tasks_due_on(&self, date: NaiveDate) -> Result<bool> {
        Ok(!self.get_tasks_due_on(date)?.is_empty())
    }

    /// Tasks written at or after `since`, newest first
    pub fn get_tasks_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<Task>> {
        self.list(&[Filter::new("updatedAt", FilterOp::Gte, since.timestamp_millis())])
    }

    /// Case-insensitive substring search over task titles
    pub fn search_tasks(&self, query: &str) -> Result<Vec<Task>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut tasks = self.get_all_tasks()?;
        tasks.retain(|task| task.title.to_lowercase().contains(&needle));
        Ok(tasks)
    }

    /// Overlay `patch` on an existing task and persist it
    ///
    /// The id never changes and `updatedAt` always moves forward. Fails with
    /// `NotFound` when there is no such task.
    pub fn update_task(&mut self, id: &str, patch: TaskPatch) -> Result<Task> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }

        let tx = self.db.transaction()?;

        let mut task: Task = store::get_in(&tx, id)?.ok_or_else(|| StoreError::not_found("tasks", id))?;
        task.apply(patch);
        task.updated_at = next_timestamp(self.clock.as_ref(), task.updated_at);

        store::write_in(&tx, &task, WriteMode::Put)?;
        tx.commit()?;

        info!(id, "Task updated");
        Ok(task)
    }

    /// Remove a task; removing a missing id is not an error
    pub fn delete_task(&mut self, id: &str) -> Result<()> {
        let removed = store::delete_in::<Task>(&self.db, id)?;
        if removed {
            info!(id, "Task deleted");
        } else {
            debug!(id, "Task delete: nothing to remove");
        }
        Ok(())
    }
}

pub(crate) fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(StoreError::invalid("Task title cannot be empty"));
    }
    Ok(())
}
