// Aggregate task statistics

use crate::error::Result;
use crate::models::{Category, Priority, Task, TaskStatus};
use crate::store::{self, Store};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Key of the bucket holding tasks with no (or an unknown) category
///
/// A real category may own this id; it then keeps the key and the
/// synthetic count is only reported in [`TaskStatistics::uncategorized`].
pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}

/// Point-in-time counts over all tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatistics {
    pub total: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
    /// Keyed by category id, plus [`UNCATEGORIZED`]
    pub by_category: BTreeMap<String, CategoryCount>,
    /// Tasks with a null or dangling `categoryId`
    pub uncategorized: usize,
    /// Past due and not completed
    pub overdue: usize,
    pub completed_today: usize,
    pub completed_this_week: usize,
    pub completed_this_month: usize,
}

impl TaskStatistics {
    pub fn status(&self, status: TaskStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn priority(&self, priority: Priority) -> usize {
        self.by_priority.get(&priority).copied().unwrap_or(0)
    }

    pub fn category(&self, key: &str) -> usize {
        self.by_category.get(key).map(|bucket| bucket.count).unwrap_or(0)
    }
}

impl Store {
    /// Statistics as of now, with day/week/month boundaries in local time
    pub fn statistics(&self) -> Result<TaskStatistics> {
        self.statistics_at(self.now().with_timezone(&Local))
    }

    /// Statistics as of `now`; calendar boundaries follow `now`'s time zone
    pub fn statistics_at<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Result<TaskStatistics> {
        // One read transaction so tasks and categories come from the same snapshot
        let tx = self.db.unchecked_transaction()?;
        let tasks: Vec<Task> = store::list_in(&tx, &[])?;
        let categories: Vec<Category> = store::list_in(&tx, &[])?;
        tx.commit()?;

        Ok(compute(&tasks, &categories, &now, &self.config.uncategorized_label))
    }
}

/// Single pass over `tasks`
pub fn compute<Tz: TimeZone>(
    tasks: &[Task],
    categories: &[Category],
    now: &DateTime<Tz>,
    uncategorized_label: &str,
) -> TaskStatistics {
    let tz = now.timezone();
    let today = now.date_naive();
    let day_start = start_of(&tz, today);
    let week_start = start_of(&tz, today - Duration::days(i64::from(today.weekday().num_days_from_sunday())));
    let month_start = start_of(&tz, today.with_day(1).unwrap_or(today));
    let now_utc = now.with_timezone(&Utc);

    let mut by_category: BTreeMap<String, CategoryCount> = categories
        .iter()
        .map(|category| {
            (
                category.id.clone(),
                CategoryCount {
                    name: category.name.clone(),
                    count: 0,
                },
            )
        })
        .collect();

    let mut stats = TaskStatistics {
        total: tasks.len(),
        by_status: TaskStatus::ALL.into_iter().map(|s| (s, 0)).collect(),
        by_priority: Priority::ALL.into_iter().map(|p| (p, 0)).collect(),
        by_category: BTreeMap::new(),
        uncategorized: 0,
        overdue: 0,
        completed_today: 0,
        completed_this_week: 0,
        completed_this_month: 0,
    };

    for task in tasks {
        *stats.by_status.entry(task.status).or_insert(0) += 1;
        *stats.by_priority.entry(task.priority).or_insert(0) += 1;

        match task.category_id.as_deref().and_then(|id| by_category.get_mut(id)) {
            Some(entry) => entry.count += 1,
            None => stats.uncategorized += 1,
        }

        if task.status != TaskStatus::Completed {
            let due = task.due_date.as_deref().and_then(|raw| parse_due(raw, &tz));
            if due.is_some_and(|due| due < now_utc) {
                stats.overdue += 1;
            }
        } else {
            // updatedAt doubles as the completion time
            let completed = task.updated_at;
            if completed >= day_start {
                stats.completed_today += 1;
            }
            if completed >= week_start {
                stats.completed_this_week += 1;
            }
            if completed >= month_start {
                stats.completed_this_month += 1;
            }
        }
    }

    by_category
        .entry(UNCATEGORIZED.to_string())
        .or_insert_with(|| CategoryCount {
            name: uncategorized_label.to_string(),
            count: stats.uncategorized,
        });
    stats.by_category = by_category;
    stats
}

/// Midnight at the start of `date` in `tz`, as UTC
fn start_of<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Parse a due date the way browsers do
///
/// Full timestamps carry their own offset; a bare date is midnight UTC; a
/// date-time without an offset is local to `tz`.
fn parse_due<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|local| tz.from_local_datetime(&local).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}
