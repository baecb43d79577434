// Store configuration loaded from YAML

use crate::models::DEFAULT_CATEGORY_COLOR;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "todostore";

/// Where and how the store keeps its data
///
/// Every field is optional in the YAML file:
///
/// ```yaml
/// data_dir: /var/lib/todostore
/// name: TodoKanbanDB
/// default_category_color: "#4f46e5"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the database file
    pub data_dir: PathBuf,
    /// Store name; the database file is `<data_dir>/<name>.db`
    pub name: String,
    /// Keep everything in memory (nothing touches disk)
    pub in_memory: bool,
    pub default_category_color: String,
    /// Display name of the statistics bucket for tasks without a category
    pub uncategorized_label: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR),
            name: "TodoKanbanDB".to_string(),
            in_memory: false,
            default_category_color: DEFAULT_CATEGORY_COLOR.to_string(),
            uncategorized_label: "Uncategorized".to_string(),
        }
    }
}

impl StoreConfig {
    /// Configuration for a throwaway in-memory store
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }

    /// Configuration for an on-disk store under `data_dir`
    pub fn at<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: StoreConfig =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(path = ?path, "Loaded store config");
        Ok(config)
    }

    /// Load `<config_dir>/todostore/config.yaml` if it exists, else defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
    }

    /// Path of the SQLite database file
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.name, "TodoKanbanDB");
        assert_eq!(config.default_category_color, "#4f46e5");
        assert!(!config.in_memory);
        assert!(config.db_path().ends_with("todostore/TodoKanbanDB.db"));
    }

    #[test]
    fn test_load_partial_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "name: Kanban\nuncategorized_label: Inbox\n").unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.name, "Kanban");
        assert_eq!(config.uncategorized_label, "Inbox");
        assert_eq!(config.default_category_color, "#4f46e5");
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let temp = TempDir::new().unwrap();
        let err = StoreConfig::load(temp.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_db_path_uses_name() {
        let config = StoreConfig {
            name: "Work".to_string(),
            ..StoreConfig::at("/tmp/x")
        };
        assert_eq!(config.db_path(), PathBuf::from("/tmp/x/Work.db"));
    }
}
