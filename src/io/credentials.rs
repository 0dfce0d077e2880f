use crate::types::{YieldError, YieldResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_CLIENT_EMAIL: &str = "CROPYIELD_CLIENT_EMAIL";
pub const ENV_PRIVATE_KEY: &str = "CROPYIELD_PRIVATE_KEY";
pub const ENV_PROJECT_ID: &str = "CROPYIELD_PROJECT_ID";

/// Service-account identity for the remote compute service
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub project_id: String,
}

impl std::fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl ServiceAccountCredentials {
    /// Read credentials from the process environment
    pub fn from_env() -> YieldResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary key lookup (environment, secret store)
    pub fn from_lookup<F>(lookup: F) -> YieldResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| YieldError::InvalidFormat(format!("Secret '{}' is not set", key)))
        };
        Ok(Self {
            client_email: get(ENV_CLIENT_EMAIL)?,
            private_key: get(ENV_PRIVATE_KEY)?,
            project_id: get(ENV_PROJECT_ID)?,
        })
    }

    /// Read a JSON service-account key file
    pub fn from_file<P: AsRef<Path>>(path: P) -> YieldResult<Self> {
        log::info!("Reading credentials file: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Default key file location under the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cropyield").join("credentials.json"))
    }

    /// Environment first, then an explicit key file, then the default key file
    pub fn discover(key_file: Option<&Path>) -> YieldResult<Self> {
        Self::discover_with(|key| std::env::var(key).ok(), key_file)
    }

    /// [`discover`](Self::discover) with the secrets read through `lookup`
    pub fn discover_with<F>(lookup: F, key_file: Option<&Path>) -> YieldResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        match Self::from_lookup(lookup) {
            Ok(credentials) => {
                log::debug!("Using credentials from environment");
                return Ok(credentials);
            }
            Err(e) => log::debug!("Environment credentials unavailable: {}", e),
        }
        if let Some(path) = key_file {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Err(YieldError::InvalidFormat(
                "No service-account credentials found in environment or key file".to_string(),
            )),
        }
    }
}
