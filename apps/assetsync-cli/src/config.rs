//! Import configuration file.
//!
//! ```yaml
//! registry:
//!   base_url: https://api.example.com/instance/xmlmc
//!   api_key: ...
//! user_id_column: h_user_id
//! log_file: assetsync.log
//! source:
//!   file: assets.csv
//! generic_field_mapping:
//!   h_name: "{{.machine}}"
//! type_field_mapping:
//!   h_serial_number: "{{.serial}}"
//! asset_types:
//!   - asset_type: Laptop
//!     identifier: { entity_column: h_name, source_column: machine }
//! ```

use assetsync_engine::config::{AssetTypeConfig, FieldMappingConfig, SyncOptions, MAX_CONCURRENCY};
use assetsync_engine::mapping::FieldMapper;
use assetsync_registry::types::UserIdColumn;
use assetsync_registry_rest::RestRegistryConfig;
use assetsync_source::CsvSourceConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{CliError, CliResult};

/// Mappings written for the retired square-bracket syntax.
static LEGACY_MAPPING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r".*\[[A-Za-z0-9]{0,}\].*").expect("LEGACY_MAPPING is a valid regex pattern")
});

pub const ENV_REGISTRY_URL: &str = "ASSETSYNC_REGISTRY_URL";
pub const ENV_API_KEY: &str = "ASSETSYNC_API_KEY";
pub const ENV_CONCURRENCY: &str = "ASSETSYNC_CONCURRENCY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub registry: RestRegistryConfig,

    #[serde(default)]
    pub user_id_column: UserIdColumn,

    /// Worker count (default: 1).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub source: CsvSourceConfig,

    #[serde(default)]
    pub generic_field_mapping: BTreeMap<String, String>,

    #[serde(default)]
    pub type_field_mapping: BTreeMap<String, String>,

    #[serde(default)]
    pub asset_types: Vec<AssetTypeConfig>,
}

fn default_concurrency() -> usize {
    1
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            registry: RestRegistryConfig::default(),
            user_id_column: UserIdColumn::default(),
            concurrency: default_concurrency(),
            log_file: None,
            source: CsvSourceConfig::default(),
            generic_field_mapping: BTreeMap::new(),
            type_field_mapping: BTreeMap::new(),
            asset_types: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Read and parse a YAML configuration file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> CliResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply environment overrides, reading variables through `var`.
    pub fn apply_env_overrides<F>(&mut self, var: F) -> CliResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var(ENV_REGISTRY_URL).filter(|v| !v.is_empty()) {
            self.registry.base_url = url;
        }
        if let Some(key) = var(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.registry.api_key = key;
        }
        if let Some(value) = var(ENV_CONCURRENCY).filter(|v| !v.is_empty()) {
            self.concurrency = value.trim().parse().map_err(|_| {
                CliError::Config(format!("{ENV_CONCURRENCY} must be a number, got {value:?}"))
            })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn field_mapping(&self) -> FieldMappingConfig {
        FieldMappingConfig {
            generic: self.generic_field_mapping.clone(),
            type_specific: self.type_field_mapping.clone(),
        }
    }

    /// Every configured mapping as `(section, key, template)`.
    fn mappings(&self) -> Vec<(String, &str, &str)> {
        let mut all = Vec::new();
        for (k, v) in &self.generic_field_mapping {
            all.push(("generic_field_mapping".to_string(), k.as_str(), v.as_str()));
        }
        for (k, v) in &self.type_field_mapping {
            all.push(("type_field_mapping".to_string(), k.as_str(), v.as_str()));
        }
        for asset_type in &self.asset_types {
            if let Some(software) = &asset_type.software_inventory {
                let section = format!("{} software_inventory.mapping", asset_type.asset_type);
                for (k, v) in &software.mapping {
                    all.push((section.clone(), k.as_str(), v.as_str()));
                }
            }
        }
        all
    }

    /// Check run-wide settings and every mapping.
    ///
    /// Asset type definitions are checked separately so one bad type does
    /// not stop the others.
    pub fn validate(&self, mapper: &dyn FieldMapper) -> CliResult<()> {
        let options = SyncOptions {
            concurrency: self.concurrency,
            ..Default::default()
        };
        options.validate().map_err(|_| {
            CliError::Validation(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            ))
        })?;

        self.registry.validate()?;
        self.source.validate()?;

        if self.asset_types.is_empty() {
            return Err(CliError::Validation("no asset_types configured".to_string()));
        }

        let mut problems = Vec::new();
        for (section, key, template) in self.mappings() {
            if LEGACY_MAPPING.is_match(template) {
                problems.push(format!("{section} - {key}:{template}"));
            } else if let Err(e) = mapper.validate(template) {
                problems.push(format!("{section} - {key}: {e}"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(CliError::Validation(problems.join("\n")))
        }
    }
}
