//! Example 02: Export, Import and Statistics
//!
//! Exports one store to JSON, imports it into a second store, and prints
//! statistics. Importing the same payload twice changes nothing.
//!
//! Run with: cargo run --example 02_export_import

use eyre::Result;
use todostore::{NewCategory, NewTask, Store, TaskPatch, TaskStatus};

fn main() -> Result<()> {
    println!("TodoStore Export/Import Example");
    println!("===============================\n");

    let mut source = Store::open_in_memory()?;
    let home = source.create_category(NewCategory::new("Home"))?;
    let task = source.create_task(NewTask::new("Fix the sink").category(&home.id))?;
    source.create_task(NewTask::new("Pay rent").due("2026-01-01"))?;
    source.update_task(&task.id, TaskPatch::status(TaskStatus::Completed))?;

    // EXPORT
    let payload = serde_json::to_value(source.export_all()?)?;
    println!("1. EXPORT\n{}\n", serde_json::to_string_pretty(&payload)?);

    // IMPORT
    let mut target = Store::open_in_memory()?;
    for round in 1..=2 {
        let report = target.import(&payload)?;
        println!(
            "2. IMPORT round {} - {} tasks, {} categories, {} errors",
            round,
            report.tasks_imported,
            report.categories_imported,
            report.errors.len()
        );
    }
    println!();

    // STATISTICS
    let stats = target.statistics()?;
    println!("3. STATISTICS");
    println!("   Total: {}", stats.total);
    println!("   Completed today: {}", stats.completed_today);
    println!("   Overdue: {}", stats.overdue);
    for (id, bucket) in &stats.by_category {
        println!("   - {} ({}): {}", bucket.name, id, bucket.count);
    }
    println!();

    println!("Example complete!");
    Ok(())
}
