//! Example 01: Basic CRUD Operations
//!
//! Creates a category and a few tasks, moves one across the board, then
//! deletes the category and shows its tasks being detached.
//!
//! Run with: cargo run --example 01_basic_crud

use eyre::Result;
use todostore::{CategoryPatch, NewCategory, NewTask, Priority, Store, StoreConfig, TaskPatch, TaskStatus};

fn main() -> Result<()> {
    // Create a temporary directory for this example
    let temp_dir = tempfile::tempdir()?;
    let config = StoreConfig::at(temp_dir.path());

    println!("TodoStore Basic CRUD Example");
    println!("============================\n");
    println!("Database: {}\n", config.db_path().display());

    let mut store = Store::open(&config)?;

    // CREATE
    println!("1. CREATE - Adding a category and tasks...");
    let work = store.create_category(NewCategory::new("Work").color("#0ea5e9"))?;
    let report = store.create_task(NewTask::new("Write report").category(&work.id).priority(Priority::High))?;
    store.create_task(NewTask::new("Book flights").due("2026-11-01"))?;
    println!("   Category {} ({})", work.name, work.id);
    println!("   Task {} ({})\n", report.title, report.id);

    // READ
    println!("2. READ - Querying by index...");
    for task in store.get_tasks_by_status(TaskStatus::Todo)? {
        println!("   - [{}] {} ({})", task.status, task.title, task.priority);
    }
    println!();

    // UPDATE
    println!("3. UPDATE - Moving the report to in-progress...");
    let moved = store.update_task(&report.id, TaskPatch::status(TaskStatus::InProgress))?;
    println!("   {} is now {} (updated {})", moved.title, moved.status, moved.updated_at);
    store.update_category(&work.id, CategoryPatch::name("Office"))?;
    println!("   Category renamed to Office\n");

    // Duplicate names are rejected
    if let Err(err) = store.create_category(NewCategory::new("Office")) {
        println!("   Second \"Office\" rejected: {}\n", err);
    }

    // DELETE
    println!("4. DELETE - Removing the category...");
    let detached = store.delete_category(&work.id)?;
    println!("   Detached {} task(s)", detached);
    let report = store.get_task(&report.id)?;
    println!(
        "   Report category is now {:?}\n",
        report.and_then(|task| task.category_id)
    );

    store.close()?;
    println!("Example complete!");
    Ok(())
}
