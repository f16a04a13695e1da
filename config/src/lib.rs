//! Configuration for lsp-rocks.
//!
//! ```toml
//! disabled = ["eslint"]
//!
//! [log]
//! level = "info"
//!
//! [client]
//! shutdown_timeout_ms = 2000
//! max_restarts = 3
//!
//! [requests]
//! staleness = "document"
//!
//! [servers.pyright]
//! command = "pyright-langserver"
//! args = ["--stdio"]
//! file_extensions = ["py"]
//! root_markers = ["pyproject.toml", "setup.*"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use rocks_types::StalenessScope;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "LSP_ROCKS_CONFIG";

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;
const DEFAULT_MAX_RESTARTS: u32 = 3;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RocksConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub requests: RequestsConfig,
    /// Built-in servers to skip, by name.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Extra servers, keyed by name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerEntry>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}

impl RocksConfig {
    /// Load from [`Self::path`].
    ///
    /// A missing file is `None`. An unreadable or invalid file is logged and
    /// also `None`, so a broken config never keeps the bridge from starting.
    #[must_use]
    pub fn load() -> Option<Self> {
        let path = Self::path()?;
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("{err}");
                None
            }
        }
    }

    /// `Ok(None)` when `path` does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `$LSP_ROCKS_CONFIG`, else `~/.lsp-rocks/config.toml`.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|home| home.join(".lsp-rocks").join("config.toml"))
    }

    #[must_use]
    pub fn is_disabled(&self, server: &str) -> bool {
        self.disabled.iter().any(|name| name == server)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Explicit log file; a per-process file in the cache dir otherwise.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Automatic restarts after crashes over a client's lifetime.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            max_restarts: DEFAULT_MAX_RESTARTS,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

const fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

const fn default_max_restarts() -> u32 {
    DEFAULT_MAX_RESTARTS
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestsConfig {
    #[serde(default)]
    pub staleness: StalenessScope,
}

/// One extra language server.
///
/// Validated while deserializing: the command and the extension list must
/// be non-empty. `${VAR}` references in the command and args are expanded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawServerEntry")]
pub struct ServerEntry {
    pub command: String,
    pub args: Vec<String>,
    /// Without leading dots.
    pub file_extensions: Vec<String>,
    /// Globs matched against project-root entries; empty means always active.
    pub root_markers: Vec<String>,
    /// Sent with `workspace/didChangeConfiguration`.
    pub settings: Value,
    pub initialization_options: Option<Value>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerEntryError {
    #[error("server command must not be empty")]
    EmptyCommand,
    #[error("server must list at least one file extension")]
    NoExtensions,
    #[error("file extension must not be empty")]
    EmptyExtension,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServerEntry {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    file_extensions: Vec<String>,
    #[serde(default)]
    root_markers: Vec<String>,
    #[serde(default)]
    settings: Option<Value>,
    #[serde(default)]
    initialization_options: Option<Value>,
}

impl TryFrom<RawServerEntry> for ServerEntry {
    type Error = ServerEntryError;

    fn try_from(raw: RawServerEntry) -> Result<Self, Self::Error> {
        let command = expand_env_vars(raw.command.trim());
        if command.is_empty() {
            return Err(ServerEntryError::EmptyCommand);
        }
        if raw.file_extensions.is_empty() {
            return Err(ServerEntryError::NoExtensions);
        }
        let file_extensions = raw
            .file_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_string())
            .collect::<Vec<_>>();
        if file_extensions.iter().any(String::is_empty) {
            return Err(ServerEntryError::EmptyExtension);
        }

        Ok(Self {
            command,
            args: raw.args.iter().map(|arg| expand_env_vars(arg)).collect(),
            file_extensions,
            root_markers: raw.root_markers,
            settings: raw
                .settings
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            initialization_options: raw.initialization_options,
        })
    }
}

/// Replace `${VAR}` with the variable's value; unset variables become empty.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + len + 1..];
    }

    out.push_str(rest);
    out
}
