//! CLI configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/sendover/sendover.toml`
//! - Windows: `%APPDATA%/sendover/sendover.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sendover_session::SessionConfig;
use sendover_transfer::ChunkProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Chunk profile; unset means `SENDOVER_CHUNK_PROFILE` or standard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_profile: Option<ChunkProfile>,

    /// Where received files are written. `~` expands to the home directory.
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Simulated one-way link delay in milliseconds.
    #[serde(default)]
    pub link_delay_ms: u64,

    /// Identity lifetime before rotation, in seconds.
    #[serde(default = "default_code_lifetime_secs")]
    pub code_lifetime_secs: u64,

    /// Latency ping period, in seconds.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_log_filter() -> String {
    "info".into()
}

fn default_out_dir() -> String {
    "~/Downloads/SendOver".into()
}

fn default_code_lifetime_secs() -> u64 {
    120
}

fn default_ping_interval_secs() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            chunk_profile: None,
            out_dir: default_out_dir(),
            link_delay_ms: 0,
            code_lifetime_secs: default_code_lifetime_secs(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn chunk_profile(&self) -> ChunkProfile {
        self.chunk_profile.unwrap_or_else(ChunkProfile::detect)
    }

    pub fn link_delay(&self) -> Duration {
        Duration::from_millis(self.link_delay_ms)
    }

    /// Output directory with a leading `~` expanded.
    pub fn out_dir(&self) -> PathBuf {
        match self.out_dir.strip_prefix("~/") {
            Some(rest) => home_dir().join(rest),
            None if self.out_dir == "~" => home_dir(),
            None => PathBuf::from(&self.out_dir),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            code_lifetime: Duration::from_secs(self.code_lifetime_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            chunk_size: self.chunk_profile().chunk_size(),
            ..SessionConfig::default()
        }
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("sendover")
            .join("sendover.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("sendover").join("sendover.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/sendover/sendover.toml"))
    }
}
