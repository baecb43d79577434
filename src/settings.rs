// Key/value settings

use crate::error::Result;
use crate::models::Setting;
use crate::store::{self, Store, WriteMode};
use serde_json::Value;
use tracing::debug;

impl Store {
    /// Insert or replace the setting stored under `key`
    pub fn save_setting(&mut self, key: &str, value: Value) -> Result<Setting> {
        let setting = Setting {
            key: key.to_string(),
            value,
            updated_at: self.now(),
        };

        store::write_in(&self.db, &setting, WriteMode::Put)?;
        debug!(key, "Setting saved");
        Ok(setting)
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get::<Setting>(key)?.map(|setting| setting.value))
    }

    /// The stored value, or `default` when the key was never saved
    pub fn get_setting_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get_setting(key)?.unwrap_or(default))
    }

    /// Remove a setting; a missing key is not an error
    pub fn delete_setting(&mut self, key: &str) -> Result<()> {
        store::delete_in::<Setting>(&self.db, key)?;
        Ok(())
    }
}
