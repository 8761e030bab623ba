use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Serve `public_dir` at `/` instead of redirecting to `/stream`.
    #[serde(default)]
    pub show_index_page: bool,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Chunks buffered per listener before new chunks are dropped for it.
    #[serde(default = "default_listener_queue")]
    pub listener_queue: usize,
}

/// Where the catalog comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_src_folder")]
    pub src_folder: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    /// Image served by `/albumcover` when the current track has no artwork.
    #[serde(default)]
    pub placeholder_cover: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub shuffle: bool,
    /// Pause before retrying once every track in the catalog failed in a row.
    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Explicit ffmpeg path. Falls back to `platform::find_ffmpeg_binary`.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Errors raised while applying environment overrides.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            show_index_page: false,
            public_dir: default_public_dir(),
            listener_queue: default_listener_queue(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            src_folder: default_src_folder(),
            extensions: default_extensions(),
            recursive: default_recursive(),
            placeholder_cover: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            shuffle: false,
            failure_backoff_secs: default_failure_backoff_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_listener_queue() -> usize {
    64
}

fn default_src_folder() -> PathBuf {
    PathBuf::from("playlist")
}

fn default_extensions() -> Vec<String> {
    vec!["mp3".to_string()]
}

fn default_recursive() -> bool {
    true
}

fn default_failure_backoff_secs() -> u64 {
    5
}

impl Config {
    /// Load the TOML config (if present) and apply environment overrides.
    ///
    /// A missing config file is not an error; the defaults are used as-is.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        match std::env::var_os(platform::CONFIG_PATH_ENV) {
            Some(p) => PathBuf::from(p),
            None => platform::config_dir().join("config.toml"),
        }
    }

    /// Apply `SRCFOLDER`, `PORT`, `USESHUFFLE` and `SHOWINDEXPAGE`.
    ///
    /// The boolean flags are enabled only by the literal string `"true"`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("SRCFOLDER").filter(|v| !v.is_empty()) {
            self.library.src_folder = PathBuf::from(dir);
        }

        if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
            self.http.port = port.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    key: "PORT",
                    value: port.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(flag) = lookup("USESHUFFLE") {
            self.playback.shuffle = flag == "true";
        }

        if let Some(flag) = lookup("SHOWINDEXPAGE") {
            self.http.show_index_page = flag == "true";
        }

        Ok(())
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.http.bind_address, self.http.port)
    }
}
