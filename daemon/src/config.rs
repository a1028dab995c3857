//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Remote model endpoint and credential
    pub remote: RemoteConfig,

    /// Continuous auto-detection settings
    pub detection: DetectionConfig,

    /// Clip length for one-shot identification
    pub identify_clip: Duration,
}

/// Where and how to reach the generative model
#[derive(Clone)]
pub struct RemoteConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl RemoteConfig {
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("api_key", &if self.has_credential() { "<set>" } else { "<missing>" })
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Schedule and gate for background song detection
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Start with auto-detection on
    pub enabled: bool,
    /// Length of each recorded clip
    pub clip_duration: Duration,
    /// Gap between the end of one capture and the start of the next
    pub interval: Duration,
    /// Results must be strictly above this confidence
    pub confidence_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            clip_duration: Duration::from_secs(5),
            interval: Duration::from_secs(30),
            confidence_threshold: 0.6,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("neonflow");

        let socket_path = lookup("NEONFLOW_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .or_else(|| lookup("API_KEY"))
            .unwrap_or_default();

        let remote = RemoteConfig {
            api_key,
            base_url: lookup("NEONFLOW_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: lookup("NEONFLOW_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        let defaults = DetectionConfig::default();
        let detection = DetectionConfig {
            enabled: parse_var(&lookup, "NEONFLOW_AUTO_DETECT")?.unwrap_or(defaults.enabled),
            clip_duration: parse_secs(&lookup, "NEONFLOW_DETECT_CLIP_SECS")?
                .unwrap_or(defaults.clip_duration),
            interval: parse_secs(&lookup, "NEONFLOW_DETECT_INTERVAL_SECS")?
                .unwrap_or(defaults.interval),
            confidence_threshold: parse_var(&lookup, "NEONFLOW_DETECT_THRESHOLD")?
                .unwrap_or(defaults.confidence_threshold),
        };

        if !(0.0..=1.0).contains(&detection.confidence_threshold) {
            bail!(
                "NEONFLOW_DETECT_THRESHOLD must be between 0 and 1, got {}",
                detection.confidence_threshold
            );
        }

        let identify_clip = parse_secs(&lookup, "NEONFLOW_IDENTIFY_CLIP_SECS")?
            .unwrap_or(Duration::from_secs(6));

        Ok(Self {
            socket_path,
            data_dir,
            remote,
            detection,
            identify_clip,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    Ok(parse_var::<u64>(lookup, key)?.map(Duration::from_secs))
}
