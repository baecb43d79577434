// TodoStore - embedded document store for a to-do kanban board on SQLite

pub mod categories;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod handle;
pub mod models;
pub mod record;
pub mod schema;
pub mod settings;
pub mod stats;
pub mod store;
pub mod tasks;

// Re-export main types for convenience
pub use clock::{Clock, FixedClock, IdGenerator, SystemClock, UuidV7Generator};
pub use config::StoreConfig;
pub use data::{ExportData, ExportPayload, ImportReport};
pub use error::{ImportRecordError, Result, StoreError};
pub use filter::{Filter, FilterOp};
pub use handle::StoreHandle;
pub use models::{Category, CategoryPatch, NewCategory, NewTask, Priority, Setting, Task, TaskPatch, TaskStatus};
pub use record::{IndexValue, Record};
pub use stats::{CategoryCount, TaskStatistics};
pub use store::Store;

// Re-export rusqlite for callers inspecting the database directly
pub use rusqlite;
