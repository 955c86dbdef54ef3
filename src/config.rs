use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::app::DEFAULT_LOCK_TIMEOUT;
use crate::catalog::DEFAULT_BASE_URL;
use crate::domain::{Credentials, DatasetRef};
use crate::error::PdbbindError;
use crate::store::DatasetStore;

pub const DEFAULT_CONFIG_FILE: &str = "pdbbind.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub dataset_directory: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub lock_timeout_secs: Option<u64>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DatasetEntry {
    Shorthand(String),
    Detailed(DatasetEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatasetEntryObject {
    pub release: u16,
    pub subset: String,
}

/// Values the rest of the crate reads from the environment.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub dataset_directory: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            dataset_directory: read("PDBBIND_DIR"),
            username: read("PDBBIND_USERNAME"),
            password: read("PDBBIND_PASSWORD"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub dataset_directory: Utf8PathBuf,
    pub base_url: String,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    pub lock_timeout: Duration,
    pub datasets: Vec<DatasetRef>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path`, or `pdbbind.json` in the current directory when it exists.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PdbbindError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| PdbbindError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| PdbbindError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, EnvOverrides::from_env())
    }

    pub fn resolve_config(
        config: Config,
        env: EnvOverrides,
    ) -> Result<ResolvedConfig, PdbbindError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let dataset_directory = match env.dataset_directory.or(config.dataset_directory) {
            Some(dir) => Utf8PathBuf::from(dir),
            None => DatasetStore::default_root()?,
        };

        let username = env.username.or(config.username);
        let password = env.password.or(config.password);
        let credentials = match (username, password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            (None, None) => None,
            _ => {
                return Err(PdbbindError::ConfigParse(
                    "username and password must be set together".to_string(),
                ));
            }
        };

        let datasets = config
            .datasets
            .into_iter()
            .map(|entry| match entry {
                DatasetEntry::Shorthand(value) => value.parse(),
                DatasetEntry::Detailed(obj) => DatasetRef::parse_subset(obj.release, &obj.subset),
            })
            .collect::<Result<Vec<_>, PdbbindError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            dataset_directory,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            credentials,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            lock_timeout: config
                .lock_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_LOCK_TIMEOUT),
            datasets,
        })
    }
}
