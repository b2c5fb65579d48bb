//! Harvester configuration
//!
//! Loaded from `harvester.toml` (see `bkh_common::config` for the lookup
//! order). Every field has a default, so an empty or missing file yields a
//! runnable configuration for the standard site layout.

use bkh_common::config::LoggingConfig;
use bkh_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::ArchiveNaming;
use crate::services::identifier_extractor::{IdentifierPolicy, KeepMatches};
use crate::services::process_runner::ProcessRunner;

/// Environment variable holding the config file path
pub const CONFIG_ENV_VAR: &str = "BKH_CONFIG";
/// Config file name looked up in the standard directories
pub const CONFIG_FILE_NAME: &str = "harvester.toml";
/// Environment variable overriding the decrypt passphrase
pub const PASSPHRASE_ENV_VAR: &str = "BKH_PASSPHRASE";

const DEFAULT_STORAGE_ROOT: &str = "/opt/digiverso/goobi/metadata";
const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 4 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Volume holding record directories (also measured by the space guard)
    pub storage_root: PathBuf,
    /// Free-space buffer, e.g. `"150G"`
    pub buffer: Option<String>,
    /// Conversions requested after each run
    pub conversions_per_run: usize,
    /// Template records are cloned from
    pub template_title: String,
    /// Overall deadline for each external invocation (0 disables)
    pub process_timeout_secs: u64,
    pub logging: LoggingConfig,
    pub sentinels: SentinelConfig,
    pub conversion: ConversionConfig,
    pub archive: ArchiveNaming,
    pub decryption: DecryptionConfig,
    pub identifier: IdentifierConfig,
    pub metadata: MetadataConfig,
    pub catalog: CatalogConfig,
    pub database: DatabaseConfig,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            buffer: None,
            conversions_per_run: 5,
            template_title: "Google_Books_Template".to_string(),
            process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
            logging: LoggingConfig::default(),
            sentinels: SentinelConfig::default(),
            conversion: ConversionConfig::default(),
            archive: ArchiveNaming::default(),
            decryption: DecryptionConfig::default(),
            identifier: IdentifierConfig::default(),
            metadata: MetadataConfig::default(),
            catalog: CatalogConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub stop_file: PathBuf,
    pub running_file: PathBuf,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            stop_file: PathBuf::from("/tmp/gbooksharvester_stop"),
            running_file: PathBuf::from("/tmp/gbooksharvester_running"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Command prefix; `--directory`/`--resource` are appended
    pub command: Vec<String>,
    /// Working directory of the conversion script
    pub script_dir: PathBuf,
    pub site_directory: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "/usr/bin/env".to_string(),
                "python".to_string(),
                "grin_oath.py".to_string(),
            ],
            script_dir: PathBuf::from("/opt/digiverso/goobi/scripts/googlebooks/"),
            site_directory: "NLI".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecryptionConfig {
    pub command: Vec<String>,
    pub passphrase: Option<String>,
    pub passphrase_file: Option<PathBuf>,
}

impl Default for DecryptionConfig {
    fn default() -> Self {
        Self {
            command: vec!["/usr/bin/gpg".to_string()],
            passphrase: None,
            passphrase_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierPolicyKind {
    #[default]
    StacksPair,
    ControlNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    pub policy: IdentifierPolicyKind,
    pub keep: KeepMatches,
    /// Catalog search field identifiers are tagged with
    pub search_field: String,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            policy: IdentifierPolicyKind::StacksPair,
            keep: KeepMatches::First,
            search_field: "1007".to_string(),
        }
    }
}

impl IdentifierConfig {
    pub fn policy(&self) -> IdentifierPolicy {
        match self.policy {
            IdentifierPolicyKind::ControlNumber => IdentifierPolicy::ControlNumber,
            IdentifierPolicyKind::StacksPair => IdentifierPolicy::StacksSubfieldPair { keep: self.keep },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataStrategy {
    /// Write identifiers into a metadata field of the bare record
    #[default]
    Direct,
    /// Fetch a full description from the catalog
    Catalog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub strategy: MetadataStrategy,
    pub catalog_name: String,
    pub field_name: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            strategy: MetadataStrategy::Direct,
            catalog_name: "NLI Alma".to_string(),
            field_name: "CatalogIDDigital".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog name → SRU base URL
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to `<storage_root>/harvester.db`
    pub path: Option<PathBuf>,
}

impl HarvesterConfig {
    /// Load from the standard locations, falling back to defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        bkh_common::config::load_or_default(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| self.storage_root.join("harvester.db"))
    }

    pub fn process_deadline(&self) -> Option<Duration> {
        (self.process_timeout_secs > 0).then(|| Duration::from_secs(self.process_timeout_secs))
    }

    /// Runner shared by every external invocation
    pub fn process_runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.process_deadline())
    }

    /// Decrypt passphrase: `BKH_PASSPHRASE`, then `passphrase_file`, then `passphrase`
    pub fn resolve_passphrase(&self) -> Result<Option<String>> {
        if let Ok(value) = std::env::var(PASSPHRASE_ENV_VAR) {
            if !value.is_empty() {
                info!("Decrypt passphrase loaded from environment variable");
                return Ok(Some(value));
            }
        }

        if let Some(path) = &self.decryption.passphrase_file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Read passphrase file {} failed: {}", path.display(), e))
            })?;
            let value = content.trim_end_matches(['\r', '\n']).to_string();
            if value.is_empty() {
                return Err(Error::Config(format!(
                    "Passphrase file {} is empty",
                    path.display()
                )));
            }
            return Ok(Some(value));
        }

        if let Some(value) = &self.decryption.passphrase {
            warn!(
                "Decrypt passphrase stored in config file; prefer passphrase_file or {}",
                PASSPHRASE_ENV_VAR
            );
            return Ok(Some(value.clone()));
        }

        Ok(None)
    }
}
