//! Configuration for the news store.
//!
//! Settings come from a TOML file. The `newsctl` binary then layers the
//! documented environment variables on top with
//! [`Config::apply_env_overrides`]; the library itself never reads the
//! process environment for configuration.
//!
//! ```toml
//! [store]
//! backend = "firestore"      # firestore | sqlite | memory
//! collection = "news"
//!
//! [firestore]
//! project_id = "my-project"
//! database_id = "(default)"
//! credentials_path = "/secrets/sa.json"
//!
//! [sqlite]
//! path = "./data/news.sqlite"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::credentials::CredentialSource;
use crate::error::StoreError;

pub const ENV_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const ENV_DATABASE: &str = "FIRESTORE_DATABASE_ID";
pub const ENV_COLLECTION: &str = "FIRESTORE_COLLECTION_NAME";
pub const ENV_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ENV_EMULATOR_HOST: &str = "FIRESTORE_EMULATOR_HOST";

pub const DEFAULT_DATABASE_ID: &str = "(default)";
pub const DEFAULT_COLLECTION: &str = "news";
pub const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub firestore: FirestoreConfig,
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Firestore,
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FirestoreConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_database_id")]
    pub database_id: String,
    /// Service-account or authorized-user key file. Ambient credentials
    /// are used when unset.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Base URL override, e.g. a local emulator. No credentials are sent
    /// when set.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            database_id: default_database_id(),
            credentials_path: None,
            endpoint: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_database_id() -> String {
    DEFAULT_DATABASE_ID.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl FirestoreConfig {
    pub fn credential_source(&self) -> CredentialSource {
        match &self.credentials_path {
            Some(path) => CredentialSource::ServiceAccountFile(path.clone()),
            None => CredentialSource::AmbientDefault,
        }
    }

    pub fn uses_emulator(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn base_endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or(DEFAULT_FIRESTORE_ENDPOINT)
            .trim_end_matches('/')
    }

    /// Check the Firestore settings.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self.project_id.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(StoreError::Configuration(format!(
                    "firestore.project_id is required (or set {})",
                    ENV_PROJECT
                )))
            }
            Some(p) if p.contains('/') => {
                return Err(StoreError::Configuration(format!(
                    "firestore.project_id must not contain '/': '{}'",
                    p
                )))
            }
            Some(_) => {}
        }
        if self.database_id.trim().is_empty() || self.database_id.contains('/') {
            return Err(StoreError::Configuration(format!(
                "firestore.database_id is invalid: '{}'",
                self.database_id
            )));
        }
        if self.timeout_secs == 0 {
            return Err(StoreError::Configuration(
                "firestore.timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SqliteConfig {
    #[serde(default = "default_sqlite_path")]
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./data/news.sqlite")
}

/// Check a collection name for use as a single, unescaped URL path
/// segment and Firestore collection ID.
pub fn validate_collection(collection: &str) -> Result<(), StoreError> {
    if collection.trim().is_empty() {
        return Err(StoreError::Configuration(
            "store.collection must not be empty".into(),
        ));
    }
    if let Some(bad) = collection
        .chars()
        .find(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
    {
        return Err(StoreError::Configuration(format!(
            "store.collection must not contain {:?}: '{}'",
            bad, collection
        )));
    }
    let reserved = collection == "."
        || collection == ".."
        || (collection.len() >= 4 && collection.starts_with("__") && collection.ends_with("__"));
    if reserved {
        return Err(StoreError::Configuration(format!(
            "store.collection is a reserved name: '{}'",
            collection
        )));
    }
    Ok(())
}

impl Config {
    /// Validate the settings relevant to the selected backend.
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_collection(&self.store.collection)?;
        if self.store.backend == Backend::Firestore {
            self.firestore.validate()?;
        }
        Ok(())
    }

    /// Overlay environment settings onto the file configuration.
    ///
    /// `lookup` returns the value of a variable, or `None` if unset. Empty
    /// values are ignored. The binary passes `std::env::var`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(project) = get(ENV_PROJECT) {
            self.firestore.project_id = Some(project);
        }
        if let Some(database) = get(ENV_DATABASE) {
            self.firestore.database_id = database;
        }
        if let Some(collection) = get(ENV_COLLECTION) {
            self.store.collection = collection;
        }
        if let Some(path) = get(ENV_CREDENTIALS) {
            self.firestore.credentials_path = Some(PathBuf::from(path));
        }
        if let Some(host) = get(ENV_EMULATOR_HOST) {
            self.firestore.endpoint = Some(if host.contains("://") {
                host
            } else {
                format!("http://{}", host)
            });
        }
    }
}

/// Read and parse a TOML configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}
