//! Configuration for visionary.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VISIONARY_HOME, VISIONARY_API_BASE)
//! 2. Config file (.visionary/config.yaml)
//! 3. Defaults (~/.visionary, public Gemini endpoint)
//!
//! Config file discovery:
//! - Searches current directory and parents for .visionary/config.yaml
//! - `paths.home` in the config file is relative to the .visionary/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::PollPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PLANNER_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub models: Option<ModelsConfig>,
    #[serde(default)]
    pub image: Option<ImageConfig>,
    #[serde(default)]
    pub video: Option<VideoConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to the .visionary/ directory)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub planner: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    pub aspect_ratio: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    pub aspect_ratio: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    pub max_poll_attempts: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

/// Resolved configuration with absolute paths and defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to visionary home (credential, downloaded videos)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Base URL of the generative API
    pub api_base_url: String,
    /// Model identifiers per stage
    pub models: ModelSettings,
    /// Image generation parameters
    pub image: ImageSettings,
    /// Video generation and polling parameters
    pub video: VideoSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub planner: String,
    pub image: String,
    pub video: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            planner: DEFAULT_PLANNER_MODEL.to_string(),
            image: DEFAULT_IMAGE_MODEL.to_string(),
            video: DEFAULT_VIDEO_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSettings {
    pub aspect_ratio: String,
    pub mime_type: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            mime_type: DEFAULT_IMAGE_MIME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    pub aspect_ratio: String,
    pub poll_interval_seconds: u64,
    /// No cap when unset
    pub max_poll_attempts: Option<u32>,
    /// No deadline when unset
    pub timeout_seconds: Option<u64>,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            max_poll_attempts: None,
            timeout_seconds: None,
        }
    }
}

impl VideoSettings {
    /// Poll policy for the video job
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_seconds),
            max_attempts: self.max_poll_attempts,
            timeout: self.timeout_seconds.map(Duration::from_secs),
        }
    }
}

impl ResolvedConfig {
    /// Defaults rooted at `home`, with no config file
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            home,
            config_file: None,
            api_base_url: DEFAULT_API_BASE.to_string(),
            models: ModelSettings::default(),
            image: ImageSettings::default(),
            video: VideoSettings::default(),
        }
    }

    /// Directory where fetched videos are written
    pub fn videos_dir(&self) -> PathBuf {
        self.home.join("videos")
    }

    /// Path of the stored credential
    pub fn credential_path(&self) -> PathBuf {
        self.home.join("credential")
    }

    /// Overlay settings from a parsed config file
    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(base_url) = file.api.and_then(|a| a.base_url) {
            self.api_base_url = base_url;
        }

        if let Some(models) = file.models {
            if let Some(planner) = models.planner {
                self.models.planner = planner;
            }
            if let Some(image) = models.image {
                self.models.image = image;
            }
            if let Some(video) = models.video {
                self.models.video = video;
            }
        }

        if let Some(image) = file.image {
            if let Some(aspect_ratio) = image.aspect_ratio {
                self.image.aspect_ratio = aspect_ratio;
            }
            if let Some(mime_type) = image.mime_type {
                self.image.mime_type = mime_type;
            }
        }

        if let Some(video) = file.video {
            if let Some(aspect_ratio) = video.aspect_ratio {
                self.video.aspect_ratio = aspect_ratio;
            }
            if let Some(interval) = video.poll_interval_seconds {
                self.video.poll_interval_seconds = interval;
            }
            self.video.max_poll_attempts = video.max_poll_attempts;
            self.video.timeout_seconds = video.timeout_seconds;
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".visionary").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".visionary");

    let config_file = find_config_file();

    let mut resolved = ResolvedConfig::with_home(default_home);

    if let Some(ref config_path) = config_file {
        let file = load_config_file(config_path)?;

        if let Some(ref home_path) = file.paths.home {
            let visionary_dir = config_path.parent().unwrap_or(Path::new("."));
            resolved.home = resolve_path(visionary_dir, home_path);
        }
        resolved.apply_file(file);
        resolved.config_file = config_file.clone();
    }

    if let Ok(env_home) = std::env::var("VISIONARY_HOME") {
        resolved.home = PathBuf::from(env_home);
    }
    if let Ok(env_base) = std::env::var("VISIONARY_API_BASE") {
        resolved.api_base_url = env_base;
    }

    Ok(resolved)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
