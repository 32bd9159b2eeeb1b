// git34 - A library to bridge Git repositories with NIP-34 and other code-related events in Nostr
// Copyright (C) 2025 Awiteb <a@4rs.nl>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://gnu.org/licenses/gpl-3.0.html>.

use std::{fs, path::PathBuf, time::Duration};

use nostr::types::{RelayUrl, Url};

use crate::error::Git34Result;

/// Default per-operation timeouts, in seconds.
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default freshness window for cached repository state, in minutes.
const DEFAULT_STATE_TTL_MINUTES: u64 = 60;

/// Errors that can occur when working with configuration files.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(
        "Could not determine the default config path: both `$XDG_CONFIG_HOME` and `$HOME` \
         environment variables are missing or unset."
    )]
    CanNotFindConfigPath,
    #[error("Couldn't read the config file: {0}")]
    ReadFile(std::io::Error),
    #[error("Couldn't write in the config file: {0}")]
    WriteFile(std::io::Error),
    #[error("Couldn't serialize the config. This is a bug, please report it: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to parse the config file: {0}")]
    ParseFile(toml::de::Error),
}

/// Whether the cache layer wraps the git backend.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    On,
    Off,
}

/// Library configuration.
///
/// Every knob has a serde default so a partial TOML file (or
/// [`Config::default`]) yields a working configuration.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
pub struct Config {
    /// Path to the configuration file (not serialized)
    #[serde(skip)]
    path: PathBuf,
    /// Relays queried for repository announcements and state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_relays: Vec<RelayUrl>,
    /// Relays used when none of the default relays answered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_relays: Vec<RelayUrl>,
    /// GRASP servers, as relay URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grasp_relays: Vec<RelayUrl>,
    /// Whether relay-backed (GRASP) provider features are active.
    #[serde(default)]
    pub enable_grasp: bool,
    /// Whether the facade publishes a repo state event (30618) on push.
    #[serde(default = "default_true")]
    pub publish_repo_state: bool,
    /// Whether the facade publishes repo announcements (30617) on push.
    #[serde(default)]
    pub publish_repo_announcements: bool,
    /// CORS proxy URL for browser-class git transports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_proxy: Option<Url>,
    /// Default per-operation timeout in milliseconds. When unset each
    /// operation uses its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Whether the cache layer wraps the backend.
    #[serde(default)]
    pub cache_mode: CacheMode,
    /// Freshness window in minutes before cached repository state is
    /// considered stale. A policy knob, not a protocol constant.
    #[serde(default = "default_state_ttl")]
    pub state_ttl_minutes: u64,
    /// Runtime schema validation of incoming events. Defaults on outside
    /// release builds.
    #[serde(default = "default_validate_events")]
    pub validate_events: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path:                       PathBuf::new(),
            default_relays:             Vec::new(),
            fallback_relays:            Vec::new(),
            grasp_relays:               Vec::new(),
            enable_grasp:               false,
            publish_repo_state:         true,
            publish_repo_announcements: false,
            cors_proxy:                 None,
            timeout_ms:                 None,
            cache_mode:                 CacheMode::On,
            state_ttl_minutes:          DEFAULT_STATE_TTL_MINUTES,
            validate_events:            default_validate_events(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_state_ttl() -> u64 {
    DEFAULT_STATE_TTL_MINUTES
}

fn default_validate_events() -> bool {
    cfg!(debug_assertions)
}

impl Config {
    /// Reads a TOML config file from the given path.
    ///
    /// A missing file is not an error: the library is usable without one,
    /// so first runs simply get the defaults and [`Config::dump`] creates
    /// the file when a host application decides to persist its settings.
    pub fn load(file_path: PathBuf) -> Git34Result<Self> {
        tracing::info!(path = %file_path.display(), "Loading configuration");
        let raw = match fs::read_to_string(&file_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(ConfigError::ReadFile(err).into()),
        };

        let mut config: Self = toml::from_str(&raw).map_err(ConfigError::ParseFile)?;
        config.path = file_path;

        Ok(config)
    }

    /// Serializes the config back to its TOML file, creating missing
    /// parent directories on the way.
    pub fn dump(self) -> Git34Result<()> {
        tracing::debug!(path = %self.path.display(), "Writing configuration");
        let serialized = toml::to_string_pretty(&self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFile)?;
        }
        fs::write(&self.path, serialized).map_err(ConfigError::WriteFile)?;

        Ok(())
    }

    /// Default config path
    pub fn default_path() -> Git34Result<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or(ConfigError::CanNotFindConfigPath)?
            .join("git34")
            .join("config.toml"))
    }

    /// Default root directory for on-disk repository caches.
    pub fn default_cache_dir() -> Git34Result<PathBuf> {
        Ok(dirs::cache_dir()
            .ok_or(ConfigError::CanNotFindConfigPath)?
            .join("git34"))
    }

    /// The freshness window as a [`Duration`].
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_minutes * 60)
    }

    /// The configured timeout for an operation, or the given default.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}
