//! Credential access for the stage adapters.
//!
//! The pipeline never owns the API key. Adapters are constructed with a
//! [`CredentialProvider`] and ask it for the key on every remote call, so a
//! key saved or cleared mid-session is picked up by the next call.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Environment variables consulted after the stored key, in order
pub const API_KEY_ENV_VARS: [&str; 2] = ["VISIONARY_API_KEY", "GEMINI_API_KEY"];

/// Supplies the API key on demand
pub trait CredentialProvider: Send + Sync {
    /// Current key, or None when no key is configured
    fn api_key(&self) -> Option<String>;
}

/// Fixed key (or deliberately absent key)
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Some(key.into()))
    }

    /// A provider that never has a key
    pub fn absent() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredential {
    fn api_key(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Key stored in a local file, falling back to environment variables
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    env_vars: Vec<String>,
}

impl CredentialStore {
    /// Store at `path`, with the default environment fallbacks
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_vars: API_KEY_ENV_VARS.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Replace the environment fallbacks (empty disables them)
    pub fn with_env_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_vars = vars.into_iter().map(Into::into).collect();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a key, replacing any stored one
    pub fn save(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("API key cannot be empty");
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        write_private(&self.path, key)
            .with_context(|| format!("Failed to write credential: {}", self.path.display()))?;

        Ok(())
    }

    /// Remove the stored key. Environment fallbacks are unaffected.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove credential: {}", self.path.display())),
        }
    }

    /// Whether a key is stored in the file (ignores the environment)
    pub fn is_stored(&self) -> bool {
        self.read_stored().is_some()
    }

    /// Whether any key is available
    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    fn read_stored(&self) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let key = content.trim();
        (!key.is_empty()).then(|| key.to_string())
    }

    fn read_env(&self) -> Option<String> {
        self.env_vars
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }
}

/// Write `content` to a file only the owner can read
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);

        // mode only applies on creation; tighten a file left by an older save
        if path.exists() {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
    }

    let mut file = options.open(path)?;
    file.write_all(content.as_bytes())
}

impl CredentialProvider for CredentialStore {
    fn api_key(&self) -> Option<String> {
        self.read_stored().or_else(|| self.read_env())
    }
}
