//! Runtime timing configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sotto_types::ErrorCode;

/// Tunable timings, loadable from a TOML file.
///
/// Missing keys fall back to their defaults; unknown keys are
/// rejected so typos surface instead of silently configuring nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Seconds an unused pooled resource survives before destruction.
    pub keep_alive_grace_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            keep_alive_grace_secs: 10,
        }
    }
}

impl RuntimeConfig {
    /// Reads a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// The keep-alive grace period as a [`Duration`].
    #[must_use]
    pub fn keep_alive_grace(&self) -> Duration {
        Duration::from_secs(self.keep_alive_grace_secs)
    }
}

/// Config loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read {path}")]
    Io {
        /// Path as given.
        path: String,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`RuntimeConfig`].
    #[error("could not parse {path}")]
    Parse {
        /// Path as given.
        path: String,
        /// Underlying TOML failure.
        #[source]
        source: toml::de::Error,
    },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "CONFIG_IO",
            Self::Parse { .. } => "CONFIG_PARSE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
