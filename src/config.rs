use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actors::POLL_INTERVAL;
use crate::log::LogLevel;
use crate::variables::VariableConfig;
use crate::{cwlog_debug, Error, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Base URL of the case service API.
    pub api_url: Option<String>,
    /// Active site. Nothing is listed or polled without one.
    pub site: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    /// Where downloaded results are saved (defaults to the working directory).
    pub download_dir: Option<String>,
    /// Variables shown in the variables dialog, in order.
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
    /// Minimum level written to the log file (defaults to info).
    pub log_level: Option<LogLevel>,
    /// Log file location (defaults to `~/.casewatch/casewatch.log`).
    pub log_file: Option<String>,
}

impl Config {
    pub fn casewatch_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".casewatch"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::casewatch_dir()?.join("casewatch.toml"))
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(POLL_INTERVAL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn download_dir(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(std::env::current_dir()?),
        }
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        match &self.log_file {
            Some(file) => Some(expand_tilde(file)),
            None => Self::casewatch_dir().ok().map(|dir| dir.join("casewatch.log")),
        }
    }

    /// Load `~/.casewatch/casewatch.toml`, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(
            std::env::var("CASEWATCH_API_URL").ok(),
            std::env::var("CASEWATCH_SITE").ok(),
        );
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        cwlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            cwlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        cwlog_debug!(
            "Config loaded: api_url={:?}, site={:?}, poll_interval_secs={:?}",
            config.api_url,
            config.site,
            config.poll_interval_secs
        );
        Ok(config)
    }

    /// Non-empty values replace what the file said.
    pub fn apply_overrides(&mut self, api_url: Option<String>, site: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = Some(url);
        }
        if let Some(site) = site.filter(|s| !s.trim().is_empty()) {
            self.site = Some(site);
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                cwlog_debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        cwlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
