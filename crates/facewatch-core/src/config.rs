use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::detector::DetectorParams;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
    #[error("{0}")]
    Invalid(String),
}

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// V4L2 camera device.
    Camera,
    /// Directory of still images played back in name order.
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// V4L2 device path.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub replay_dir: Option<PathBuf>,
    /// Restart from the first image instead of ending the stream.
    pub replay_loop: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Camera,
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            replay_dir: None,
            replay_loop: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// Directory used by the local backend.
    pub local_dir: PathBuf,
    /// Base URL of the remote image API.
    pub api_url: Option<String>,
    /// Bearer token for the remote image API.
    pub api_token: Option<String>,
    /// Ceiling on every remote call, in seconds.
    pub timeout_secs: u64,
    /// DANGEROUS: skip TLS certificate and hostname verification.
    pub accept_invalid_certs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            local_dir: PathBuf::from("faces"),
            api_url: None,
            api_token: None,
            timeout_secs: 30,
            accept_invalid_certs: false,
        }
    }
}

/// Application configuration, built once at startup and passed down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Correlation above which a face counts as already seen.
    pub similarity_threshold: f32,
    /// Compare against known faces. When false every face is stored.
    pub use_stored_images: bool,
    /// Verbose decision logging.
    pub debug: bool,
    /// Minimum seconds between two accepted faces.
    pub save_cooldown_secs: u64,
    /// Where to write the annotated last frame, if anywhere.
    pub preview_path: Option<PathBuf>,
    pub detector: DetectorParams,
    pub source: SourceConfig,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            use_stored_images: true,
            debug: false,
            save_cooldown_secs: 5,
            preview_path: None,
            detector: DetectorParams::default(),
            source: SourceConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if any), then `FACEWATCH_*` variables.
    ///
    /// With no explicit path, `FACEWATCH_CONFIG` names the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("FACEWATCH_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment overrides, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        env.parse("FACEWATCH_SIMILARITY_THRESHOLD", &mut self.similarity_threshold)?;
        env.flag("FACEWATCH_USE_STORED_IMAGES", &mut self.use_stored_images)?;
        env.flag("FACEWATCH_DEBUG", &mut self.debug)?;
        env.parse("FACEWATCH_SAVE_COOLDOWN_SECS", &mut self.save_cooldown_secs)?;
        if let Some(path) = lookup("FACEWATCH_PREVIEW_PATH") {
            self.preview_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("FACEWATCH_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        env.parse("FACEWATCH_SCALE_FACTOR", &mut self.detector.scale_factor)?;
        env.parse("FACEWATCH_MIN_NEIGHBORS", &mut self.detector.min_neighbors)?;
        env.parse("FACEWATCH_MIN_SIZE", &mut self.detector.min_size)?;

        if let Some(device) = lookup("FACEWATCH_CAMERA_DEVICE") {
            self.source.device = device;
        }
        if let Some(dir) = lookup("FACEWATCH_REPLAY_DIR") {
            self.source.kind = SourceKind::Replay;
            self.source.replay_dir = Some(PathBuf::from(dir));
        }

        if let Some(dir) = lookup("FACEWATCH_LOCAL_DIR") {
            self.storage.local_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("FACEWATCH_API_URL").or_else(|| lookup("FACE_STORAGE_API_URL")) {
            self.storage.api_url = Some(url);
        }
        if let Some(token) =
            lookup("FACEWATCH_API_TOKEN").or_else(|| lookup("FACE_STORAGE_API_KEY"))
        {
            self.storage.api_token = Some(token);
        }
        if let Some(backend) = lookup("FACEWATCH_BACKEND") {
            self.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "local" => Backend::Local,
                "remote" => Backend::Remote,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "FACEWATCH_BACKEND".into(),
                        value: backend,
                    })
                }
            };
        }
        env.parse("FACEWATCH_CLIENT_TIMEOUT_SECS", &mut self.storage.timeout_secs)?;

        Ok(())
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.similarity_threshold;
        if !t.is_finite() || !(-1.0..=1.0).contains(&t) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold must be within [-1, 1], got {t}"
            )));
        }
        if !(self.detector.scale_factor > 1.0) {
            return Err(ConfigError::Invalid(format!(
                "detector.scale_factor must be greater than 1, got {}",
                self.detector.scale_factor
            )));
        }
        if self.detector.min_size == 0 {
            return Err(ConfigError::Invalid("detector.min_size must be positive".into()));
        }
        if self.storage.timeout_secs == 0 {
            return Err(ConfigError::Invalid("storage.timeout_secs must be positive".into()));
        }
        if self.storage.backend == Backend::Remote {
            if self.storage.api_url.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Invalid(
                    "remote backend needs storage.api_url (or FACEWATCH_API_URL)".into(),
                ));
            }
            if self.storage.api_token.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Invalid(
                    "remote backend needs storage.api_token (or FACEWATCH_API_TOKEN)".into(),
                ));
            }
        }
        if self.source.kind == SourceKind::Replay && self.source.replay_dir.is_none() {
            return Err(ConfigError::Invalid("replay source needs source.replay_dir".into()));
        }
        Ok(())
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: std::str::FromStr>(&self, key: &str, slot: &mut T) -> Result<(), ConfigError> {
        if let Some(value) = (self.0)(key) {
            *slot = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            })?;
        }
        Ok(())
    }

    fn flag(&self, key: &str, slot: &mut bool) -> Result<(), ConfigError> {
        if let Some(value) = (self.0)(key) {
            *slot = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: key.to_string(),
                        value,
                    })
                }
            };
        }
        Ok(())
    }
}
