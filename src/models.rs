// Data models for the to-do store

use crate::record::{IndexValue, Record};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Color given to categories created without one
pub const DEFAULT_CATEGORY_COLOR: &str = "#4f46e5";

/// Serialized names of every declared `Task` field
///
/// A caller-supplied extra field with one of these names would be written
/// twice by `#[serde(flatten)]` and make the stored document unreadable.
const TASK_FIELDS: [&str; 9] = [
    "id",
    "title",
    "description",
    "status",
    "priority",
    "categoryId",
    "dueDate",
    "createdAt",
    "updatedAt",
];

/// Drop extra entries that collide with a declared field
fn strip_declared(extra: &mut Map<String, Value>) {
    extra.retain(|key, _| !TASK_FIELDS.contains(&key.as_str()));
}

/// Kanban column a task sits in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Completed];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown task status: {s} (expected todo, in-progress or completed)"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A to-do item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(deserialize_with = "serde_helpers::id_string")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    /// Not checked against the categories collection; a dangling id counts as uncategorized
    #[serde(default, deserialize_with = "serde_helpers::opt_id_string")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Caller-defined fields carried along untouched (e.g. `pinned`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// Overlay a partial update; `id` and the timestamps are left alone
    pub(crate) fn apply(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category_id) = patch.category_id {
            self.category_id = category_id.filter(|id| !id.is_empty());
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date.filter(|d| !d.is_empty());
        }
        let mut extra = patch.extra;
        strip_declared(&mut extra);
        self.extra.extend(extra);
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }

    fn collection_name() -> &'static str {
        "tasks"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::from(self.status.as_str()));
        fields.insert("priority".to_string(), IndexValue::from(self.priority.as_str()));
        if let Some(category_id) = &self.category_id {
            fields.insert("categoryId".to_string(), IndexValue::from(category_id.as_str()));
        }
        fields.insert("createdAt".to_string(), IndexValue::from(self.created_at.timestamp_millis()));
        fields.insert("updatedAt".to_string(), IndexValue::from(self.updated_at.timestamp_millis()));
        if let Some(due_date) = &self.due_date {
            fields.insert("dueDate".to_string(), IndexValue::from(due_date.as_str()));
        }
        fields
    }
}

/// Input for creating a task; everything but the title has a default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "serde_helpers::opt_id_string")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn due(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }

    /// Build the stored record; empty strings for nullable fields become null
    pub(crate) fn into_task(self, id: String, now: DateTime<Utc>) -> Task {
        let mut extra = self.extra;
        strip_declared(&mut extra);

        Task {
            id,
            title: self.title,
            description: self.description.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            category_id: self.category_id.filter(|id| !id.is_empty()),
            due_date: self.due_date.filter(|d| !d.is_empty()),
            created_at: now,
            updated_at: now,
            extra,
        }
    }
}

/// Partial update for a task
///
/// `None` leaves a field alone. For the nullable fields `Some(None)` (JSON
/// `null`) clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(
        default,
        deserialize_with = "serde_helpers::opt_opt_id_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub category_id: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "serde_helpers::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// A named group of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(deserialize_with = "serde_helpers::id_string")]
    pub id: String,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub(crate) fn apply(&mut self, patch: CategoryPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
    }
}

impl Record for Category {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }

    fn collection_name() -> &'static str {
        "categories"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), IndexValue::from(self.name.as_str()));
        fields.insert("createdAt".to_string(), IndexValue::from(self.created_at.timestamp_millis()));
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub(crate) fn into_category(self, id: String, default_color: &str, now: DateTime<Utc>) -> Category {
        Category {
            id,
            name: self.name,
            color: self
                .color
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| default_color.to_string()),
            description: self.description.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CategoryPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// A persisted key/value preference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub key: String,
    pub value: Value,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Record for Setting {
    fn id(&self) -> &str {
        &self.key
    }

    fn updated_at(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }

    fn collection_name() -> &'static str {
        "settings"
    }
}

fn default_color() -> String {
    DEFAULT_CATEGORY_COLOR.to_string()
}

/// ISO-8601 with millisecond precision and a `Z` suffix
pub fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter writing timestamps as `YYYY-MM-DDTHH:MM:SS.mmmZ`
pub mod timestamp {
    use chrono::{DateTime, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::iso(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc).trunc_subsecs(3))
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }

    /// For optional timestamps: absent or `null` both give `None`
    pub fn deserialize_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapped(#[serde(deserialize_with = "deserialize")] DateTime<Utc>);

        Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(ts)| ts))
    }
}

pub(crate) mod serde_helpers {
    use serde::{Deserialize, Deserializer};

    /// Ids written by older clients may be numbers
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Int(i64),
        Float(f64),
    }

    impl From<RawId> for String {
        fn from(raw: RawId) -> Self {
            match raw {
                RawId::Str(s) => s,
                RawId::Int(i) => i.to_string(),
                RawId::Float(f) => f.to_string(),
            }
        }
    }

    pub fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        RawId::deserialize(deserializer).map(String::from)
    }

    pub fn opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<RawId>::deserialize(deserializer)?
            .map(String::from)
            .filter(|id| !id.is_empty()))
    }

    /// Tri-state id: absent, `null` or a string/number
    pub fn opt_opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Option<String>>, D::Error> {
        Ok(Some(Option::<RawId>::deserialize(deserializer)?.map(String::from)))
    }

    /// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`)
    pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
