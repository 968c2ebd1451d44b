//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wl_core::{DayZone, OwnerId, WeekStart};
use wl_remote::RemoteConfig;

/// Owner used when nothing else is configured.
pub const DEFAULT_OWNER: &str = "local-default-user";

/// Which storage backend to talk to. Chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Local,
    Remote,
}

/// Settings for the remote backend.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: Backend,
    /// Path to the local database file.
    pub database_path: PathBuf,
    /// Owner whose tasks and sessions every command acts on.
    pub owner: String,
    /// Zone that defines calendar days for summaries.
    pub day_zone: DayZone,
    pub week_start: WeekStart,
    pub remote: RemoteSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            backend: Backend::default(),
            database_path: data_dir.join("wl.db"),
            owner: DEFAULT_OWNER.to_string(),
            day_zone: DayZone::default(),
            week_start: WeekStart::default(),
            remote: RemoteSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, `~/.config/wl/config.toml`, `path`, then
    /// `WL_*` environment variables (`WL_REMOTE__URL` sets `remote.url`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("WL_").split("__"));

        figment.extract()
    }

    /// Resolves the acting owner; `--owner` overrides the configured one.
    ///
    /// A blank owner means the caller is not identified.
    pub fn owner_id(&self, override_owner: Option<&str>) -> Result<OwnerId, wl_core::Error> {
        let raw = override_owner.unwrap_or(&self.owner).trim();
        OwnerId::new(raw).map_err(|_| wl_core::Error::Unauthorized)
    }

    /// Connection settings for the remote backend.
    pub fn remote_config(&self) -> anyhow::Result<RemoteConfig> {
        let url = self
            .remote
            .url
            .clone()
            .context("remote.url must be set when backend = \"remote\"")?;
        let api_key = self
            .remote
            .api_key
            .clone()
            .context("remote.api_key must be set when backend = \"remote\"")?;
        Ok(RemoteConfig {
            url,
            api_key,
            access_token: self.remote.access_token.clone(),
        })
    }
}

/// Returns the platform-specific config directory for wl.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wl"))
}

/// Returns the platform-specific data directory for wl.
///
/// On Linux: `~/.local/share/wl`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("wl"))
}
