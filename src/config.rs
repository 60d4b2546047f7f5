//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$EMLPARSE_CONFIG` (environment variable)
//! 2. `~/.config/emlparse/config.toml` (Linux/macOS)
//!    `%APPDATA%\emlparse\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::parser::multipart::DEFAULT_MAX_DEPTH;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Parser behavior, passed to [`crate::parse`].
    pub parser: ParseOptions,
    /// Attachment export defaults.
    pub export: ExportConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override directory for the log file.
    pub log_dir: Option<PathBuf>,
}

/// Options that change how a message is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Record malformed address headers as warnings instead of failing.
    pub ignore_header_errors: bool,
    /// Deepest multipart nesting that is still split into parts.
    pub max_depth: usize,
    /// Reverse base64/quoted-printable on text parts before transcoding.
    pub decode_text_transfer_encoding: bool,
}

/// Attachment export defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory used when `attachments` is run without `--output`.
    pub default_output_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            ignore_header_errors: false,
            max_depth: DEFAULT_MAX_DEPTH,
            decode_text_transfer_encoding: true,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from an explicit file, falling back to defaults.
pub fn load_config_from(path: &std::path::Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Save configuration to the standard location and return where it went.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save configuration to an explicit file.
pub fn save_config_to(config: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("EMLPARSE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("emlparse").join("config.toml"))
}

/// Return the directory for the log file.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("emlparse")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert!(!cfg.parser.ignore_header_errors);
        assert_eq!(cfg.parser.max_depth, 16);
        assert!(cfg.parser.decode_text_transfer_encoding);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.parser.ignore_header_errors = true;
        cfg.general.log_dir = Some(PathBuf::from("/tmp/emlparse-logs"));
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[parser]
max_depth = 4
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.parser.max_depth, 4);
        // Other fields use defaults
        assert!(cfg.parser.decode_text_transfer_encoding);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.general.log_level = "debug".into();
        save_config_to(&cfg, &path).expect("save");
        assert_eq!(load_config_from(&path), cfg);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "parser = 12").expect("write");
        assert_eq!(load_config_from(&path), Config::default());
    }

    #[test]
    fn test_log_dir_override() {
        let mut cfg = Config::default();
        cfg.general.log_dir = Some(PathBuf::from("/var/log/eml"));
        assert_eq!(log_dir(&cfg), PathBuf::from("/var/log/eml"));
    }
}
