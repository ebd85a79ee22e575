//! Process configuration from the environment and an optional `.env` file.

use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_PROFILES_DIR: &str = "profiles";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_CLIENT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the profile store.
    pub profiles_dir: PathBuf,
    /// Tracing filter directive, used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Client used when none is given on the command line.
    pub default_client: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profiles_dir: PathBuf::from(DEFAULT_PROFILES_DIR),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
            default_client: DEFAULT_CLIENT.to_string(),
        }
    }
}

impl Config {
    /// Load `.env` from the working directory when present, then read
    /// `PROFILES_DIR`, `LOG_LEVEL`, `LOG_FILE` and `DEFAULT_CLIENT`.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenv::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();
        Self {
            profiles_dir: get("PROFILES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.profiles_dir),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_file: get("LOG_FILE").map(PathBuf::from),
            default_client: get("DEFAULT_CLIENT").unwrap_or(defaults.default_client),
        }
    }
}
