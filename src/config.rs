//! Bridge configuration.
//!
//! Layering: built-in defaults, then an optional JSON file, then CLI flags /
//! environment (applied by the binary on top of [`BridgeConfig::load`]).

use crate::error::{BridgeError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Directory under the user's config dir holding bridge settings
const CONFIG_DIR: &str = "sage";

/// Default config file name
const CONFIG_FILE: &str = "bridge.json";

/// Default number of suggestion candidates requested per fetch
pub const DEFAULT_LIMIT: usize = 3;

/// Default debounce interval for UI-triggered suggestion requests
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// How long after being shown a suggestion may still be correlated
pub const DEFAULT_CORRELATION_WINDOW_MS: i64 = 30_000;

/// External tool invoked for captures, suggestions and feedback
pub const DEFAULT_CLI_PROGRAM: &str = "sage";

/// Source tag attached to suggestion captures and legacy feedback
pub const DEFAULT_SOURCE: &str = "opencode";

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Maximum number of candidates requested from `suggest skill`
    pub limit: usize,

    /// Debounce interval for UI triggers, in milliseconds
    pub debounce_ms: u64,

    /// Ask the external tool to provision skill content with the results
    pub provision: bool,

    /// Master switch for both feedback dispatch paths
    pub feedback_enabled: bool,

    /// Suppress every external invocation (state machine still runs)
    pub dry_run: bool,

    /// Correlation window in milliseconds
    pub correlation_window_ms: i64,

    /// Opt-in: skip suggestion fetches for bare acknowledgements ("yes", "ok", ...)
    pub skip_trivial_prompts: bool,

    /// Program name or path of the external tool
    pub cli_program: String,

    /// Source tag passed to the external tool
    pub source: String,

    /// Workspace reported with prompt captures when the host gives none
    pub workspace: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            provision: false,
            feedback_enabled: true,
            dry_run: false,
            correlation_window_ms: DEFAULT_CORRELATION_WINDOW_MS,
            skip_trivial_prompts: false,
            cli_program: DEFAULT_CLI_PROGRAM.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            workspace: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration.
    ///
    /// With an explicit path the file must exist and parse. Without one the
    /// default location is tried and silently skipped when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Ok(path) if path.exists() => Self::from_file(&path)?,
                Ok(path) => {
                    debug!("No config at {:?}, using defaults", path);
                    Self::default()
                }
                Err(e) => {
                    debug!("{}, using defaults", e);
                    Self::default()
                }
            },
        };
        Ok(config.validate())
    }

    /// Parse a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BridgeError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| BridgeError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Clamp values that would make the bridge useless
    pub fn validate(mut self) -> Self {
        if self.limit == 0 {
            self.limit = 1;
        }
        if self.correlation_window_ms < 0 {
            self.correlation_window_ms = 0;
        }
        self
    }
}

/// `$CONFIG_DIR/sage/bridge.json`
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().ok_or(BridgeError::NoConfigDir)?;
    Ok(dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.limit, 3);
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.correlation_window_ms, 30_000);
        assert!(config.feedback_enabled);
        assert!(!config.dry_run);
        assert!(!config.skip_trivial_prompts);
        assert_eq!(config.cli_program, "sage");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"limit": 5, "dryRun": true, "debounceMs": 50}}"#).unwrap();

        let config = BridgeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.limit, 5);
        assert!(config.dry_run);
        assert_eq!(config.debounce_ms, 50);
        assert!(config.feedback_enabled);
        assert_eq!(config.source, "opencode");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigRead { .. }));
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = BridgeConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigParse { .. }));
    }

    #[test]
    fn test_validate_clamps() {
        let config = BridgeConfig {
            limit: 0,
            correlation_window_ms: -5,
            ..Default::default()
        }
        .validate();
        assert_eq!(config.limit, 1);
        assert_eq!(config.correlation_window_ms, 0);
    }
}
