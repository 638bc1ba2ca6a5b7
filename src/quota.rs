// Usage is read and compared without a lock; concurrent uploads by one user
// can both pass the check.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::error::SanitizeError;

pub trait QuotaStore {
    fn usage_for(&self, user: &str) -> Result<u64, SanitizeError>;
}

impl<T: QuotaStore + ?Sized> QuotaStore for &T {
    fn usage_for(&self, user: &str) -> Result<u64, SanitizeError> {
        (**self).usage_for(user)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticQuotaStore {
    usage: HashMap<String, u64>,
}

impl StaticQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_usage(mut self, user: impl Into<String>, bytes: u64) -> Self {
        self.usage.insert(user.into(), bytes);
        self
    }
}

impl QuotaStore for StaticQuotaStore {
    fn usage_for(&self, user: &str) -> Result<u64, SanitizeError> {
        Ok(self.usage.get(user).copied().unwrap_or(0))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub users: BTreeMap<String, Vec<UploadRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub size: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LedgerQuotaStore {
    path: Utf8PathBuf,
}

impl LedgerQuotaStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Result<Utf8PathBuf, SanitizeError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join("geo-upload")
                        .join("ledger.json"),
                )
                .ok()
            })
            .ok_or_else(|| SanitizeError::QuotaStore("unable to resolve ledger path".to_string()))
    }

    pub fn load(&self) -> Result<Ledger, SanitizeError> {
        if !self.path.as_std_path().exists() {
            return Ok(Ledger::default());
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| SanitizeError::QuotaStore(format!("read {}: {err}", self.path)))?;
        serde_json::from_str(&content)
            .map_err(|err| SanitizeError::QuotaStore(format!("parse {}: {err}", self.path)))
    }

    pub fn record(&self, user: &str, size: u64) -> Result<(), SanitizeError> {
        let mut ledger = self.load()?;
        ledger
            .users
            .entry(user.to_string())
            .or_default()
            .push(UploadRecord {
                size,
                recorded_at: Utc::now(),
            });

        let parent = self
            .path
            .parent()
            .ok_or_else(|| SanitizeError::QuotaStore("invalid ledger path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SanitizeError::QuotaStore(err.to_string()))?;
        let content = serde_json::to_vec_pretty(&ledger)
            .map_err(|err| SanitizeError::QuotaStore(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("geo-upload-ledger")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| SanitizeError::QuotaStore(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| SanitizeError::QuotaStore(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| SanitizeError::QuotaStore(err.to_string()))?;
        Ok(())
    }
}

impl QuotaStore for LedgerQuotaStore {
    fn usage_for(&self, user: &str) -> Result<u64, SanitizeError> {
        let ledger = self.load()?;
        Ok(ledger
            .users
            .get(user)
            .map(|records| records.iter().map(|record| record.size).sum())
            .unwrap_or(0))
    }
}

pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["bytes", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.1}{unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1}TB")
}

pub fn check_quota(quota: u64, used: u64, adding: u64) -> Result<(), SanitizeError> {
    if used.saturating_add(adding) > quota {
        return Err(SanitizeError::QuotaExceeded {
            quota: format_size(quota),
            used: format_size(used),
            adding: format_size(adding),
        });
    }
    Ok(())
}
