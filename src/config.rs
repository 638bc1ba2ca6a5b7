use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::archive::ExtractionLimits;
use crate::error::SanitizeError;
use crate::extensions::{DEFAULT_DATA_EXTENSIONS, DEFAULT_SIDECAR_EXTENSIONS, ExtensionPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "geo-upload.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    #[serde(default)]
    pub strict_shapefile_validation: Option<bool>,
    #[serde(default)]
    pub max_archive_depth: Option<usize>,
    #[serde(default)]
    pub max_total_decompressed_bytes: Option<u64>,
    #[serde(default)]
    pub data_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub sidecar_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub output_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub ledger_path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SanitizerConfig {
    pub quota_bytes: Option<u64>,
    pub strict_shapefile_validation: bool,
    pub limits: ExtractionLimits,
    pub policy: ExtensionPolicy,
    pub output_root: Option<Utf8PathBuf>,
    pub ledger_path: Option<Utf8PathBuf>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            quota_bytes: None,
            strict_shapefile_validation: false,
            limits: ExtractionLimits::default(),
            policy: ExtensionPolicy::default(),
            output_root: None,
            ledger_path: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<SanitizerConfig, SanitizeError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(SanitizerConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SanitizeError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SanitizeError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<SanitizerConfig, SanitizeError> {
        let defaults = ExtractionLimits::default();
        let limits = ExtractionLimits {
            max_depth: config.max_archive_depth.unwrap_or(defaults.max_depth),
            max_total_bytes: config
                .max_total_decompressed_bytes
                .unwrap_or(defaults.max_total_bytes),
        };
        if limits.max_total_bytes == 0 {
            return Err(SanitizeError::ConfigParse(
                "max_total_decompressed_bytes must be positive".to_string(),
            ));
        }

        let data = config
            .data_extensions
            .unwrap_or_else(|| to_strings(DEFAULT_DATA_EXTENSIONS));
        let sidecar = config
            .sidecar_extensions
            .unwrap_or_else(|| to_strings(DEFAULT_SIDECAR_EXTENSIONS));

        Ok(SanitizerConfig {
            quota_bytes: config.quota_bytes,
            strict_shapefile_validation: config.strict_shapefile_validation.unwrap_or(false),
            limits,
            policy: ExtensionPolicy::new(data, sidecar),
            output_root: config.output_root,
            ledger_path: config.ledger_path,
        })
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
