//! Configuration loading for the wiremic daemon.
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/wiremic/config.toml` (system)
//! 2. `~/.config/wiremic/config.toml` (user)
//! 3. `./wiremic.toml` (local override)
//! 4. Environment variables (`WIREMIC_*`)
//!
//! Example config:
//!
//! ```toml
//! [bind]
//! socket_dir = "/tmp"
//! # zmq_base = "127.0.0.1:5590"   # switch the bus to TCP
//!
//! [cards]
//! enabled = [0]
//!
//! [telemetry]
//! log_level = "info"
//! ```

use std::env;
use std::path::{Path, PathBuf};

use micproto::MicEndpoints;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// Directory for the ipc:// sockets.
    pub socket_dir: PathBuf,
    /// When set (`host:base_port`), the bus binds TCP instead of ipc.
    pub zmq_base: Option<String>,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from("/tmp"),
            zmq_base: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardsConfig {
    /// Card indices to register at startup. Empty is a startup error.
    pub enabled: Vec<u32>,
}

impl Default for CardsConfig {
    fn default() -> Self {
        Self { enabled: vec![0] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Complete wiremic configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MicConfig {
    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub cards: CardsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl MicConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, optionally replacing the local override with a
    /// specific path. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = MicConfig::default();
        for path in discover_config_files(config_path) {
            let file_config = load_from_file(&path)?;
            config = merge_configs(config, file_config);
        }
        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Bus endpoints for the configured transport: TCP when `zmq_base` is
    /// set, ipc sockets under `socket_dir` otherwise.
    pub fn endpoints(&self) -> MicEndpoints {
        if let Some(base) = &self.bind.zmq_base {
            if let Some((host, port)) = base.rsplit_once(':') {
                if let Ok(port) = port.parse::<u16>() {
                    return MicEndpoints::tcp(host, port);
                }
            }
        }
        MicEndpoints::from_socket_dir(&self.bind.socket_dir.to_string_lossy())
    }
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local/cli).
/// Only returns files that exist.
fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/wiremic/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("wiremic/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("wiremic.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

fn load_from_file(path: &Path) -> Result<MicConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_toml(&contents, path)
}

fn parse_toml(contents: &str, path: &Path) -> Result<MicConfig, ConfigError> {
    let table: toml::Table = contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut config = MicConfig::default();

    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("socket_dir").and_then(|v| v.as_str()) {
            config.bind.socket_dir = PathBuf::from(v);
        }
        if let Some(v) = bind.get("zmq_base").and_then(|v| v.as_str()) {
            config.bind.zmq_base = Some(v.to_string());
        }
    }

    if let Some(cards) = table.get("cards").and_then(|v| v.as_table()) {
        if let Some(enabled) = cards.get("enabled").and_then(|v| v.as_array()) {
            config.cards.enabled = enabled
                .iter()
                .filter_map(|v| v.as_integer())
                .map(|v| v as u32)
                .collect();
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(config)
}

/// Merge two configs, field by field, with `overlay` winning wherever it
/// differs from the compiled default.
fn merge_configs(base: MicConfig, overlay: MicConfig) -> MicConfig {
    let defaults = MicConfig::default();
    MicConfig {
        bind: BindConfig {
            socket_dir: if overlay.bind.socket_dir != defaults.bind.socket_dir {
                overlay.bind.socket_dir
            } else {
                base.bind.socket_dir
            },
            zmq_base: overlay.bind.zmq_base.or(base.bind.zmq_base),
        },
        cards: CardsConfig {
            enabled: if overlay.cards.enabled != defaults.cards.enabled {
                overlay.cards.enabled
            } else {
                base.cards.enabled
            },
        },
        telemetry: TelemetryConfig {
            log_level: if overlay.telemetry.log_level != defaults.telemetry.log_level {
                overlay.telemetry.log_level
            } else {
                base.telemetry.log_level
            },
        },
    }
}

/// Apply environment variable overrides to config.
fn apply_env_overrides(config: &mut MicConfig) {
    if let Ok(v) = env::var("WIREMIC_SOCKET_DIR") {
        config.bind.socket_dir = PathBuf::from(v);
    }
    if let Ok(v) = env::var("WIREMIC_ZMQ_BASE") {
        config.bind.zmq_base = Some(v);
    }
    if let Ok(v) = env::var("WIREMIC_CARDS") {
        let enabled: Vec<u32> = v
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        if !enabled.is_empty() {
            config.cards.enabled = enabled;
        }
    }
    if let Ok(v) = env::var("WIREMIC_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MicConfig::default();
        assert_eq!(config.bind.socket_dir, PathBuf::from("/tmp"));
        assert!(config.bind.zmq_base.is_none());
        assert_eq!(config.cards.enabled, vec![0]);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = parse_toml("[cards]\nenabled = [0, 1]\n", Path::new("test.toml")).unwrap();
        assert_eq!(config.cards.enabled, vec![0, 1]);
        // unspecified sections keep their defaults
        assert_eq!(config.bind.socket_dir, PathBuf::from("/tmp"));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[bind]
socket_dir = "/run/wiremic"
zmq_base = "0.0.0.0:5590"

[cards]
enabled = [2]

[telemetry]
log_level = "debug"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.bind.socket_dir, PathBuf::from("/run/wiremic"));
        assert_eq!(config.bind.zmq_base.as_deref(), Some("0.0.0.0:5590"));
        assert_eq!(config.cards.enabled, vec![2]);
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let err = parse_toml("not [ valid", Path::new("broken.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_merge_overlay_wins_per_section() {
        let base = parse_toml(
            "[bind]\nsocket_dir = \"/run/a\"\n\n[telemetry]\nlog_level = \"warn\"\n",
            Path::new("a.toml"),
        )
        .unwrap();
        let overlay = parse_toml("[telemetry]\nlog_level = \"trace\"\n", Path::new("b.toml")).unwrap();

        let merged = merge_configs(base, overlay);
        assert_eq!(merged.bind.socket_dir, PathBuf::from("/run/a"));
        assert_eq!(merged.telemetry.log_level, "trace");
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cards]\nenabled = [5]").unwrap();

        let config = MicConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.cards.enabled, vec![5]);
    }

    #[test]
    fn test_endpoints_ipc_by_default() {
        let config = MicConfig::default();
        let endpoints = config.endpoints();
        assert!(endpoints.ingest.starts_with("ipc:///tmp/"));
    }

    #[test]
    fn test_endpoints_tcp_when_base_set() {
        let mut config = MicConfig::default();
        config.bind.zmq_base = Some("127.0.0.1:5590".to_string());
        let endpoints = config.endpoints();
        assert_eq!(endpoints.ingest, "tcp://127.0.0.1:5590");
        assert_eq!(endpoints.control, "tcp://127.0.0.1:5591");
        assert_eq!(endpoints.heartbeat, "tcp://127.0.0.1:5592");
    }
}
