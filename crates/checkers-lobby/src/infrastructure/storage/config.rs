//! TOML-based configuration for the lobby.
//!
//! Reads and writes [`LobbyConfig`] from an explicit path or from the
//! platform-appropriate config file:
//! - Windows:  `%APPDATA%\CheckersLobby\config.toml`
//! - Linux:    `~/.config/checkers-lobby/config.toml`
//! - macOS:    `~/Library/Application Support/CheckersLobby/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [lobby]
//! log_level = "debug"
//!
//! [network]
//! bind_address = "0.0.0.0"
//! lobby_port = 10001
//! discovery_port = 10000
//! discovery_enabled = true
//!
//! [identity]
//! nickname = "bG9iYnk="
//! profile_image = "aW1n"
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section, or a
//! missing key all fall back to the values below.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use checkers_core::protocol::discovery::DEFAULT_DISCOVERY_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address `{0}`")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level lobby configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbyConfig {
    #[serde(default)]
    pub lobby: LobbySection,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// General lobby behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbySection {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Ports and bind address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// IP address the lobby listener binds to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port of the lobby.
    #[serde(default = "default_lobby_port")]
    pub lobby_port: u16,
    /// UDP port the discovery responder listens on.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Whether to answer LAN probes at all.
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,
}

/// Identity advertised in discovery responses, both fields base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityConfig {
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default = "default_profile_image")]
    pub profile_image: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_lobby_port() -> u16 {
    10001
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_true() -> bool {
    true
}
fn default_nickname() -> String {
    // "lobby"
    "bG9iYnk=".to_string()
}
fn default_profile_image() -> String {
    "aW1n".to_string()
}

impl Default for LobbySection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            lobby_port: default_lobby_port(),
            discovery_port: default_discovery_port(),
            discovery_enabled: default_true(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nickname: default_nickname(),
            profile_image: default_profile_image(),
        }
    }
}

impl NetworkConfig {
    /// Parses `bind_address`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if it is not an IP address.
    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.bind_address.clone()))
    }

    /// Socket address of the lobby listener.
    pub fn lobby_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.lobby_port))
    }

    /// Socket address of the discovery responder.
    pub fn discovery_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.discovery_port))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(platform_config_dir()
        .ok_or(ConfigError::NoPlatformConfigDir)?
        .join("config.toml"))
}

/// Loads the config at `path`, returning `LobbyConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<LobbyConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LobbyConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories.
pub fn save_config_to(path: &Path, config: &LobbyConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("CheckersLobby"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("checkers-lobby"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("CheckersLobby")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
