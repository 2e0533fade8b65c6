#![forbid(unsafe_code)]

//! Named configuration store, persisted at `<env>/<name>.cfg`.
//!
//! One top-level table per file, stored as JSON text. The client's store
//! carries the `components` section (array of `[key, address?, slot?,
//! extra…]` entries) and the `system` section (interpreter policies).

use std::fs;
use std::path::{Path, PathBuf};

use boxen_value::{Table, Value};
use tracing::debug;

use crate::error::ClientError;

/// A keyed store over [`Value`]s with file persistence.
#[derive(Debug)]
pub struct Config {
    path: PathBuf,
    name: String,
    data: Table,
}

impl Config {
    /// Load `<env>/<name>.cfg`, or create it from `default` when absent.
    pub fn load_or_create(env: &Path, name: &str, default: Table) -> Result<Self, ClientError> {
        let mut config = Self {
            path: env.to_path_buf(),
            name: name.to_string(),
            data: default,
        };
        let file = config.save_path();
        if file.exists() {
            let text = fs::read_to_string(&file)?;
            let json: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| ClientError::Config(format!("{}: {e}", file.display())))?;
            match Value::from_json(&json) {
                Value::Table(table) => config.data = table,
                other => {
                    return Err(ClientError::Config(format!(
                        "{}: expected a table at top level, got {}",
                        file.display(),
                        other.type_name()
                    )));
                }
            }
        } else {
            debug!(path = %file.display(), "creating configuration");
            config.save()?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn save_path(&self) -> PathBuf {
        self.path.join(format!("{}.cfg", self.name))
    }

    /// Section names, in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data
            .pairs()
            .filter_map(|(k, _)| k.as_str().map(str::to_string))
            .collect()
    }

    /// Look up a key; missing keys read as `Nil`.
    #[must_use]
    pub fn get(&self, key: &str) -> &Value {
        self.data.get_str(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.set_str(key, value);
    }

    /// Set only when the key is absent. Returns whether a write happened.
    pub fn set_create_only(&mut self, key: &str, value: Value) -> bool {
        if self.data.contains(&Value::from(key)) {
            return false;
        }
        self.data.set_str(key, value);
        true
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ClientError> {
        fs::create_dir_all(&self.path)?;
        let json = Value::Table(self.data.clone()).to_json();
        let text = serde_json::to_string_pretty(&json)
            .map_err(|e| ClientError::Config(e.to_string()))?;
        fs::write(self.save_path(), text)?;
        Ok(())
    }
}
