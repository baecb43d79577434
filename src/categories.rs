// Category repository

use crate::clock::next_timestamp;
use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::models::{Category, CategoryPatch, NewCategory, Task};
use crate::store::{self, Store, WriteMode};
use tracing::{debug, info};

impl Store {
    /// Create a category; fails with `DuplicateName` if the name is taken
    pub fn create_category(&mut self, new: NewCategory) -> Result<Category> {
        validate_name(&new.name)?;
        let category = new.into_category(self.ids.generate(), &self.config.default_category_color, self.now());

        store::write_in(&self.db, &category, WriteMode::Add).map_err(duplicate_name)?;
        info!(id = %category.id, name = %category.name, "Category created");
        Ok(category)
    }

    /// All categories, newest write first
    pub fn get_all_categories(&self) -> Result<Vec<Category>> {
        self.list(&[])
    }

    pub fn get_category(&self, id: &str) -> Result<Option<Category>> {
        self.get(id)
    }

    /// Exact, case-sensitive name lookup through the unique index
    pub fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let mut found: Vec<Category> = self.list(&[Filter::eq("name", name)])?;
        Ok(found.pop())
    }

    /// Overlay `patch` on an existing category
    ///
    /// Fails with `NotFound` for a missing id and `DuplicateName` when the new
    /// name belongs to another category.
    pub fn update_category(&mut self, id: &str, patch: CategoryPatch) -> Result<Category> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }

        let tx = self.db.transaction()?;

        let mut category: Category =
            store::get_in(&tx, id)?.ok_or_else(|| StoreError::not_found("categories", id))?;
        category.apply(patch);
        category.updated_at = next_timestamp(self.clock.as_ref(), category.updated_at);

        store::write_in(&tx, &category, WriteMode::Put).map_err(duplicate_name)?;
        tx.commit()?;

        info!(id, "Category updated");
        Ok(category)
    }

    /// Delete a category and detach its tasks, in one transaction
    ///
    /// Every task pointing at the category gets `categoryId = null` and a
    /// fresh `updatedAt`. Returns how many tasks were detached. Deleting a
    /// missing id succeeds and detaches nothing.
    pub fn delete_category(&mut self, id: &str) -> Result<usize> {
        let tx = self.db.transaction()?;

        let removed = store::delete_in::<Category>(&tx, id)?;

        let orphans: Vec<Task> = store::list_in(&tx, &[Filter::eq("categoryId", id)])?;
        let reassigned = orphans.len();
        for mut task in orphans {
            task.category_id = None;
            task.updated_at = next_timestamp(self.clock.as_ref(), task.updated_at);
            store::write_in(&tx, &task, WriteMode::Put)?;
            debug!(task_id = %task.id, category_id = id, "Detached task from deleted category");
        }

        tx.commit()?;

        if removed || reassigned > 0 {
            info!(id, reassigned, "Category deleted");
        } else {
            debug!(id, "Category delete: nothing to remove");
        }
        Ok(reassigned)
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StoreError::invalid("Category name cannot be empty"));
    }
    Ok(())
}

/// Present a name-index violation as the category-specific error
pub(crate) fn duplicate_name(err: StoreError) -> StoreError {
    match err {
        StoreError::UniqueConstraint { field, value, .. } if field == "name" => StoreError::DuplicateName(value),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{NewTask, TaskStatus};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn store_with_clock() -> (Store, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()));
        let store = Store::open_in_memory().unwrap().with_clock(clock.clone());
        (store, clock)
    }

    #[test]
    fn test_create_and_get() {
        let (mut store, _) = store_with_clock();
        let work = store.create_category(NewCategory::new("Work").description("Day job")).unwrap();

        assert_eq!(work.color, "#4f46e5");
        assert_eq!(store.get_category(&work.id).unwrap(), Some(work.clone()));
        assert_eq!(store.get_category_by_name("Work").unwrap(), Some(work));
        assert_eq!(store.get_category_by_name("work").unwrap(), None);
        assert_eq!(store.get_category("missing").unwrap(), None);
    }

    #[test]
    fn test_duplicate_name_on_create() {
        let (mut store, _) = store_with_clock();
        store.create_category(NewCategory::new("Work")).unwrap();

        let err = store.create_category(NewCategory::new("Work")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(ref name) if name == "Work"));
        assert_eq!(store.get_all_categories().unwrap().len(), 1);

        // Names are case-sensitive
        store.create_category(NewCategory::new("work")).unwrap();
    }

    #[test]
    fn test_names_stay_unique_across_sequences() {
        let (mut store, _) = store_with_clock();
        let names = ["Home", "Work", "Home", "Errands", "Work", "home", "Errands"];

        let mut duplicates = 0;
        for name in names {
            match store.create_category(NewCategory::new(name)) {
                Ok(_) => {}
                Err(StoreError::DuplicateName(_)) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let all = store.get_all_categories().unwrap();
        let unique: HashSet<&str> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(duplicates, 3);
        assert_eq!(all.len(), 4);
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_name_reusable_after_delete() {
        let (mut store, _) = store_with_clock();
        let first = store.create_category(NewCategory::new("Work")).unwrap();
        store.delete_category(&first.id).unwrap();

        let second = store.create_category(NewCategory::new("Work")).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_update_merges() {
        let (mut store, clock) = store_with_clock();
        let work = store.create_category(NewCategory::new("Work").color("#000000")).unwrap();

        clock.advance(Duration::seconds(30));
        let renamed = store.update_category(&work.id, CategoryPatch::name("Office")).unwrap();

        assert_eq!(renamed.id, work.id);
        assert_eq!(renamed.name, "Office");
        assert_eq!(renamed.color, "#000000");
        assert_eq!(renamed.created_at, work.created_at);
        assert_eq!(renamed.updated_at, work.updated_at + Duration::seconds(30));
        assert!(store.get_category_by_name("Work").unwrap().is_none());

        // Keeping its own name is not a conflict
        store.update_category(&work.id, CategoryPatch::name("Office")).unwrap();
    }

    #[test]
    fn test_update_duplicate_and_missing() {
        let (mut store, _) = store_with_clock();
        store.create_category(NewCategory::new("Work")).unwrap();
        let home = store.create_category(NewCategory::new("Home")).unwrap();

        let err = store.update_category(&home.id, CategoryPatch::name("Work")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));
        assert_eq!(store.get_category(&home.id).unwrap().unwrap().name, "Home");

        let err = store.update_category("ghost", CategoryPatch::name("x")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { collection: "categories", .. }));
    }

    #[test]
    fn test_delete_reassigns_orphans() {
        let (mut store, clock) = store_with_clock();
        let work = store.create_category(NewCategory::new("Work")).unwrap();
        let home = store.create_category(NewCategory::new("Home")).unwrap();

        let a = store.create_task(NewTask::new("a").category(&work.id)).unwrap();
        store
            .create_task(NewTask::new("b").category(&work.id).status(TaskStatus::Completed))
            .unwrap();
        let c = store.create_task(NewTask::new("c").category(&home.id)).unwrap();

        clock.advance(Duration::minutes(1));
        assert_eq!(store.delete_category(&work.id).unwrap(), 2);

        assert!(store.get_category(&work.id).unwrap().is_none());
        assert!(store.get_tasks_by_category(&work.id).unwrap().is_empty());
        for task in store.get_all_tasks().unwrap() {
            assert_ne!(task.category_id.as_deref(), Some(work.id.as_str()));
        }

        let a = store.get_task(&a.id).unwrap().unwrap();
        assert_eq!(a.category_id, None);
        assert!(a.updated_at > a.created_at);
        assert_eq!(store.get_task(&c.id).unwrap().unwrap().category_id, Some(home.id));
    }

    #[test]
    fn test_delete_without_tasks_and_missing() {
        let (mut store, _) = store_with_clock();
        let empty = store.create_category(NewCategory::new("Empty")).unwrap();

        assert_eq!(store.delete_category(&empty.id).unwrap(), 0);
        assert_eq!(store.delete_category(&empty.id).unwrap(), 0);
        assert_eq!(store.delete_category("never-existed").unwrap(), 0);
        assert!(store.get_all_categories().unwrap().is_empty());
    }
}
