use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result, bail};
use std::fs;
use std::path::PathBuf;
use todostore::{Category, Store, StoreConfig, Task, TaskStatus};

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "TodoStore CLI - inspect, back up and restore a to-do kanban store")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Config file (default: <config dir>/todostore/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the database, overrides the config file
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write every task and category as JSON
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge a previously exported JSON file into the store
    Import {
        file: PathBuf,
    },

    /// Show task statistics
    Stats,

    /// Delete all tasks, categories and settings
    Clear {
        /// Required, to confirm
        #[arg(long)]
        yes: bool,
    },

    /// List tasks
    Tasks {
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// Only tasks in this category id
        #[arg(short, long)]
        category: Option<String>,
    },

    /// List categories
    Categories,
}

fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::load_default()?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let mut store = Store::open(&config).context("Failed to open store")?;

    match cli.command {
        Commands::Export { output } => {
            let json = serde_json::to_string_pretty(&store.export_all()?)?;
            match output {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} {}", "Exported to".green(), path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Import { file } => {
            let content = fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let payload: serde_json::Value =
                serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", file.display()))?;

            let report = store.import(&payload)?;
            println!(
                "{} {} tasks, {} categories",
                "Imported".green(),
                report.tasks_imported,
                report.categories_imported
            );
            for error in &report.errors {
                eprintln!("{} {}", "error:".red(), error);
            }
        }
        Commands::Stats => print_stats(&store)?,
        Commands::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear the store without --yes");
            }
            store.clear_all()?;
            println!("{}", "Store cleared".yellow());
        }
        Commands::Tasks { status, category } => {
            let mut tasks = match (status, &category) {
                (Some(status), _) => store.get_tasks_by_status(status)?,
                (None, Some(category)) => store.get_tasks_by_category(category)?,
                (None, None) => store.get_all_tasks()?,
            };
            if let Some(category) = &category {
                tasks.retain(|task| task.category_id.as_deref() == Some(category.as_str()));
            }
            for task in &tasks {
                print_task(task);
            }
        }
        Commands::Categories => {
            for category in store.get_all_categories()? {
                print_category(&category);
            }
        }
    }

    store.close()?;
    Ok(())
}

fn print_task(task: &Task) {
    let status = match task.status {
        TaskStatus::Todo => task.status.as_str().normal(),
        TaskStatus::InProgress => task.status.as_str().cyan(),
        TaskStatus::Completed => task.status.as_str().green(),
    };
    let due = task.due_date.as_deref().map(|d| format!(" due {d}")).unwrap_or_default();
    println!(
        "{} [{}] ({}) {}{}",
        task.id.dimmed(),
        status,
        task.priority,
        task.title.bold(),
        due
    );
}

fn print_category(category: &Category) {
    println!("{} {} {}", category.id.dimmed(), category.name.bold(), category.color);
}

fn print_stats(store: &Store) -> Result<()> {
    let stats = store.statistics()?;

    println!("{} {}", "Total:".bold(), stats.total);
    for (status, count) in &stats.by_status {
        println!("  {:<12} {}", status.as_str(), count);
    }
    println!("{}", "Priority:".bold());
    for (priority, count) in &stats.by_priority {
        println!("  {:<12} {}", priority.as_str(), count);
    }
    println!("{}", "Categories:".bold());
    for bucket in stats.by_category.values() {
        println!("  {:<12} {}", bucket.name, bucket.count);
    }
    println!("{} {}", "Uncategorized:".bold(), stats.uncategorized);
    println!("{} {}", "Overdue:".bold(), stats.overdue.to_string().red());
    println!(
        "{} today {}, this week {}, this month {}",
        "Completed:".bold(),
        stats.completed_today,
        stats.completed_this_week,
        stats.completed_this_month
    );
    Ok(())
}
