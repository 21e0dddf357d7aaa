//! Runtime configuration for the `custody` binary
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | CUSTODY_DB_PATH | ./custody-db | sled database holding world state and evidence |
//! | CUSTODY_LOG_LEVEL | info | default log filter when RUST_LOG is unset |
//! | CUSTODY_LOG_JSON | false | JSON log lines |
//! | CUSTODY_TAG_SECRET | development secret | key shared with the tag writers |
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "./custody-db";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEV_TAG_SECRET: &str = "custody-dev-tag-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_json: bool,
    pub tag_secret: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            tag_secret: DEV_TAG_SECRET.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from the process environment, falling back to
    /// defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            db_path: lookup("CUSTODY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            log_level: lookup("CUSTODY_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: lookup("CUSTODY_LOG_JSON")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_json),
            tag_secret: lookup("CUSTODY_TAG_SECRET").unwrap_or(defaults.tag_secret),
        }
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.tag_secret == DEV_TAG_SECRET
    }
}
