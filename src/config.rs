//! Runtime configuration loading.
//!
//! Values are layered: built-in defaults, then an optional TOML file named by
//! `SLOT_RUNTIME_CONFIG`, then `SLOT_RUNTIME_*` environment variables.
//! Invalid values fall back to the lower layer without crashing; only an
//! unreadable or malformed config file is an error.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SLOT_RUNTIME_CONFIG` | unset | Path to a TOML config file |
//! | `SLOT_RUNTIME_BIND` | 0.0.0.0:8000 | HTTP listen address |
//! | `SLOT_RUNTIME_LOAD_TIMEOUT` | 1800 | Load timeout (secs, 0 = none) |
//! | `SLOT_RUNTIME_MAX_PENDING_LOADS` | 16 | Queued loads per slot |
//! | `SLOT_RUNTIME_STREAM_BUFFER` | 16 | Chunk channel capacity |
//! | `SLOT_RUNTIME_DEFAULT_MAX_TOKENS` | 2048 | Chat budget when omitted |
//! | `SLOT_RUNTIME_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `SLOT_RUNTIME_LOG_FORMAT` | pretty | `json` or `pretty` |
//! | `SLOT_RUNTIME_LOG_LEVEL` | info | `EnvFilter` directive |
//! | `SLOT_RUNTIME_BACKEND` | mock | Inference backend |

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{DEFAULT_MAX_TOKENS, DEFAULT_STREAM_BUFFER};
use crate::telemetry::{LogConfig, LogFormat};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("Invalid config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Optional overrides read from the TOML file. Every key may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub load_timeout_secs: Option<u64>,
    pub max_pending_loads: Option<usize>,
    pub stream_buffer: Option<usize>,
    pub default_max_tokens: Option<u32>,
    pub shutdown_timeout_secs: Option<u64>,
    pub log_format: Option<LogFormat>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub backend: Option<String>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub bind: String,
    pub load_timeout_secs: u64,
    pub max_pending_loads: usize,
    pub stream_buffer: usize,
    pub default_max_tokens: u32,
    pub shutdown_timeout_secs: u64,
    pub log_format: LogFormat,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub backend: String,
}

/// All runtime configuration after layering.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub bind: SocketAddr,
    /// None disables the load timeout.
    pub load_timeout: Option<Duration>,
    pub max_pending_loads: usize,
    pub stream_buffer: usize,
    pub default_max_tokens: u32,
    pub shutdown_timeout: Duration,
    pub log: LogConfig,
    pub backend: String,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Non-empty string env var, or `default`.
fn parse_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default,
    }
}

fn parse_bind(raw: &str) -> Option<SocketAddr> {
    raw.trim().parse().ok()
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

/// Load bind address: env, then file, then default.
fn load_bind(file: &FileConfig) -> SocketAddr {
    let from_file = file
        .bind
        .as_deref()
        .and_then(parse_bind)
        .unwrap_or_else(default_bind);
    match std::env::var("SLOT_RUNTIME_BIND") {
        Ok(val) => parse_bind(&val).unwrap_or(from_file),
        Err(_) => from_file,
    }
}

/// Load logging configuration.
fn load_log_config(file: &FileConfig) -> LogConfig {
    let file_format = file.log_format.unwrap_or_default();
    let format = match std::env::var("SLOT_RUNTIME_LOG_FORMAT") {
        Ok(val) => val.parse().unwrap_or(file_format),
        Err(_) => file_format,
    };
    let level = parse_string(
        "SLOT_RUNTIME_LOG_LEVEL",
        file.log_level.clone().unwrap_or_else(|| "info".to_string()),
    );
    LogConfig {
        format,
        level,
        output_path: file.log_file.clone(),
    }
}

/// Load all configuration. Reads the file named by `SLOT_RUNTIME_CONFIG`, if set.
pub fn load() -> Result<EnvConfig, ConfigError> {
    match std::env::var("SLOT_RUNTIME_CONFIG") {
        Ok(path) if !path.trim().is_empty() => load_from(Some(Path::new(path.trim()))),
        _ => load_from(None),
    }
}

/// Load configuration layered over an explicit config file.
pub fn load_from(path: Option<&Path>) -> Result<EnvConfig, ConfigError> {
    let file = match path {
        Some(path) => FileConfig::read(path)?,
        None => FileConfig::default(),
    };

    let load_timeout_secs = parse_u64(
        "SLOT_RUNTIME_LOAD_TIMEOUT",
        file.load_timeout_secs.unwrap_or(1800),
    );
    let max_pending_loads = parse_usize(
        "SLOT_RUNTIME_MAX_PENDING_LOADS",
        file.max_pending_loads.unwrap_or(16),
    );
    let stream_buffer = parse_usize(
        "SLOT_RUNTIME_STREAM_BUFFER",
        file.stream_buffer.unwrap_or(DEFAULT_STREAM_BUFFER),
    );
    let default_max_tokens = parse_u32(
        "SLOT_RUNTIME_DEFAULT_MAX_TOKENS",
        file.default_max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    );
    let shutdown_secs = parse_u64(
        "SLOT_RUNTIME_SHUTDOWN_TIMEOUT",
        file.shutdown_timeout_secs.unwrap_or(30),
    );
    let backend = parse_string(
        "SLOT_RUNTIME_BACKEND",
        file.backend.clone().unwrap_or_else(|| "mock".to_string()),
    );

    Ok(EnvConfig {
        bind: load_bind(&file),
        load_timeout: (load_timeout_secs > 0).then(|| Duration::from_secs(load_timeout_secs)),
        max_pending_loads: max_pending_loads.max(1),
        stream_buffer: stream_buffer.max(1),
        default_max_tokens: default_max_tokens.max(1),
        shutdown_timeout: Duration::from_secs(shutdown_secs.max(1)),
        log: load_log_config(&file),
        backend: backend.to_ascii_lowercase(),
    })
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            load_timeout: Some(Duration::from_secs(1800)),
            max_pending_loads: 16,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            default_max_tokens: DEFAULT_MAX_TOKENS,
            shutdown_timeout: Duration::from_secs(30),
            log: LogConfig::default(),
            backend: "mock".to_string(),
        }
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            bind: self.bind.to_string(),
            load_timeout_secs: self.load_timeout.map(|d| d.as_secs()).unwrap_or(0),
            max_pending_loads: self.max_pending_loads,
            stream_buffer: self.stream_buffer,
            default_max_tokens: self.default_max_tokens,
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            log_format: self.log.format,
            log_level: self.log.level.clone(),
            log_file: self.log.output_path.clone(),
            backend: self.backend.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const DEFAULT_BIND: &str = "0.0.0.0:8000";

    const ENV_KEYS: &[&str] = &[
        "SLOT_RUNTIME_CONFIG",
        "SLOT_RUNTIME_BIND",
        "SLOT_RUNTIME_LOAD_TIMEOUT",
        "SLOT_RUNTIME_MAX_PENDING_LOADS",
        "SLOT_RUNTIME_STREAM_BUFFER",
        "SLOT_RUNTIME_DEFAULT_MAX_TOKENS",
        "SLOT_RUNTIME_SHUTDOWN_TIMEOUT",
        "SLOT_RUNTIME_LOG_FORMAT",
        "SLOT_RUNTIME_LOG_LEVEL",
        "SLOT_RUNTIME_BACKEND",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load().unwrap();
        assert_eq!(cfg.bind.to_string(), DEFAULT_BIND);
        assert_eq!(cfg.load_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(cfg.max_pending_loads, 16);
        assert_eq!(cfg.stream_buffer, 16);
        assert_eq!(cfg.default_max_tokens, 2048);
        assert_eq!(cfg.shutdown_timeout.as_secs(), 30);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.backend, "mock");
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("SLOT_RUNTIME_BIND", "127.0.0.1:9000");
        std::env::set_var("SLOT_RUNTIME_LOAD_TIMEOUT", "60");
        std::env::set_var("SLOT_RUNTIME_STREAM_BUFFER", "4");
        std::env::set_var("SLOT_RUNTIME_LOG_FORMAT", "json");
        let cfg = load().unwrap();
        assert_eq!(cfg.bind.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.load_timeout, Some(Duration::from_secs(60)));
        assert_eq!(cfg.stream_buffer, 4);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("SLOT_RUNTIME_BIND", "not an address");
        std::env::set_var("SLOT_RUNTIME_MAX_PENDING_LOADS", "abc");
        std::env::set_var("SLOT_RUNTIME_LOG_FORMAT", "xml");
        let cfg = load().unwrap();
        assert_eq!(cfg.bind.to_string(), DEFAULT_BIND);
        assert_eq!(cfg.max_pending_loads, 16);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_floors_and_disabled_timeout() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("SLOT_RUNTIME_STREAM_BUFFER", "0");
        std::env::set_var("SLOT_RUNTIME_MAX_PENDING_LOADS", "0");
        std::env::set_var("SLOT_RUNTIME_LOAD_TIMEOUT", "0");
        let cfg = load().unwrap();
        assert_eq!(cfg.stream_buffer, 1);
        assert_eq!(cfg.max_pending_loads, 1);
        assert_eq!(cfg.load_timeout, None);
        clear_env_vars();
    }

    #[test]
    fn test_file_layer_under_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let file = write_config(
            "bind = \"127.0.0.1:7000\"\nstream_buffer = 8\nlog_format = \"json\"\nbackend = \"mock\"\n",
        );
        std::env::set_var("SLOT_RUNTIME_CONFIG", file.path());
        std::env::set_var("SLOT_RUNTIME_STREAM_BUFFER", "32");
        let cfg = load().unwrap();
        assert_eq!(cfg.bind.to_string(), "127.0.0.1:7000");
        assert_eq!(cfg.stream_buffer, 32);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let file = write_config("stream_buffer = \"lots\"\n");
        assert!(matches!(
            load_from(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
        let unknown = write_config("gpu_layers = 12\n");
        assert!(load_from(Some(unknown.path())).is_err());
        assert!(matches!(
            load_from(Some(Path::new("/nonexistent/slot-runtime.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_effective_config_round_trips_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("SLOT_RUNTIME_LOAD_TIMEOUT", "0");
        let eff = load().unwrap().effective_config();
        assert_eq!(eff.load_timeout_secs, 0);
        assert_eq!(eff.bind, DEFAULT_BIND);
        let json = serde_json::to_value(&eff).unwrap();
        assert_eq!(json["log_format"], "pretty");
        clear_env_vars();
    }
}
