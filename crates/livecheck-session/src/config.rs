use std::path::{Path, PathBuf};
use std::time::Duration;

use livecheck_core::LivenessConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Session configuration, loaded from an optional TOML file and `LIVECHECK_*`
/// environment variables with defaults.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Minimum interval between analyzed frames (default: 400 ms).
    pub throttle: Duration,
    /// Settle time between the gate firing and the capture request (default: 1000 ms).
    pub capture_delay: Duration,
    /// Re-run the classifier on the processed still before accepting it.
    pub validate_capture: bool,
    pub liveness: LivenessConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(400),
            capture_delay: Duration::from_millis(1000),
            validate_capture: true,
            liveness: LivenessConfig::default(),
        }
    }
}

/// On-disk shape: `[session]` and `[liveness]` tables, both optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    session: SessionSection,
    liveness: LivenessConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionSection {
    throttle_ms: Option<u64>,
    capture_delay_ms: Option<u64>,
    validate_capture: Option<bool>,
}

impl SessionConfig {
    /// Load from `LIVECHECK_CONFIG` (if set) and then apply environment overrides.
    pub fn from_env() -> Result<Self, SessionConfigError> {
        let base = match std::env::var("LIVECHECK_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        Ok(Self {
            throttle: Duration::from_millis(env_u64(
                "LIVECHECK_THROTTLE_MS",
                duration_ms(base.throttle),
            )),
            capture_delay: Duration::from_millis(env_u64(
                "LIVECHECK_CAPTURE_DELAY_MS",
                duration_ms(base.capture_delay),
            )),
            validate_capture: std::env::var("LIVECHECK_VALIDATE_CAPTURE")
                .map(|v| v != "0")
                .unwrap_or(base.validate_capture),
            liveness: base.liveness,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, SessionConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| SessionConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SessionConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let defaults = Self::default();
        Ok(Self {
            throttle: file
                .session
                .throttle_ms
                .map_or(defaults.throttle, Duration::from_millis),
            capture_delay: file
                .session
                .capture_delay_ms
                .map_or(defaults.capture_delay, Duration::from_millis),
            validate_capture: file
                .session
                .validate_capture
                .unwrap_or(defaults.validate_capture),
            liveness: file.liveness,
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
