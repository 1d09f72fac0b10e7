//! Reloadable configuration handle.
//!
//! Readers take an `Arc<Config>` snapshot; `reload()` builds a fresh config
//! and swaps the pointer wholesale, so holders of an older snapshot keep a
//! consistent view.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::info;

use super::loader::{get_env_file_path, load_config, load_env_file, read_env_file};
use super::schema::Config;
use crate::error::ConfigError;

/// Variable names that changed between two reads of the `.env` file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl ConfigDiff {
    pub fn between(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> Self {
        let mut diff = ConfigDiff::default();
        for (key, value) in new {
            match old.get(key) {
                None => diff.added.push(key.clone()),
                Some(prev) if prev != value => diff.changed.push(key.clone()),
                Some(_) => {}
            }
        }
        diff.removed = old
            .keys()
            .filter(|k| !new.contains_key(*k))
            .cloned()
            .collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Shared, swappable configuration.
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<Config>>>,
    env_vars: Arc<RwLock<BTreeMap<String, String>>>,
    config_path: Option<PathBuf>,
    env_path: PathBuf,
}

impl ConfigHandle {
    /// Load `.env` from the working directory, then the config file.
    pub fn load(config_path: Option<&Path>) -> Self {
        Self::load_with_env_file(config_path, &get_env_file_path())
    }

    /// Like [`load`](Self::load) with an explicit `.env` location.
    pub fn load_with_env_file(config_path: Option<&Path>, env_path: &Path) -> Self {
        let env_vars = load_env_file(env_path);
        let config = load_config(config_path);
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            env_vars: Arc::new(RwLock::new(env_vars)),
            config_path: config_path.map(PathBuf::from),
            env_path: env_path.to_path_buf(),
        }
    }

    /// Wrap an already-built config (no files involved).
    pub fn from_config(config: Config) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            env_vars: Arc::new(RwLock::new(BTreeMap::new())),
            config_path: None,
            env_path: get_env_file_path(),
        }
    }

    /// The current configuration.
    pub fn snapshot(&self) -> Arc<Config> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Variables defined by the `.env` file at the last load.
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        self.env_vars
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn env_path(&self) -> &Path {
        &self.env_path
    }

    /// Swap in a new configuration.
    pub fn replace(&self, config: Config) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
    }

    /// Re-read the `.env` file into the process environment and rebuild the
    /// configuration from scratch.
    ///
    /// Values from the file win over the current process values. Variables
    /// that disappeared from the file are unset if they still hold the value
    /// the file gave them.
    pub fn reload(&self) -> Result<ConfigDiff, ConfigError> {
        let new_vars = read_env_file(&self.env_path)?;
        let old_vars = self.env_vars();
        let diff = ConfigDiff::between(&old_vars, &new_vars);

        for key in &diff.removed {
            if std::env::var(key).ok().as_ref() == old_vars.get(key) {
                std::env::remove_var(key);
            }
        }
        for (key, value) in &new_vars {
            std::env::set_var(key, value);
        }

        let config = load_config(self.config_path.as_deref());
        self.replace(config);
        *self.env_vars.write().unwrap_or_else(|e| e.into_inner()) = new_vars;

        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            "Configuration reloaded"
        );
        Ok(diff)
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("config_path", &self.config_path)
            .field("env_path", &self.env_path)
            .finish_non_exhaustive()
    }
}
