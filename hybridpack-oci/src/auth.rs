use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use oci_distribution::secrets::RegistryAuth;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::{OciError, Result};

/// Environment variable holding the registry username.
pub const USERNAME_ENV: &str = "HYBRIDPACK_REGISTRY_USERNAME";
/// Environment variable holding the registry password or token.
pub const PASSWORD_ENV: &str = "HYBRIDPACK_REGISTRY_PASSWORD";

/// Registry credentials.  Passwords stay wrapped so they are never printed
/// through `Debug`.
#[derive(Debug)]
pub enum Credentials {
    Anonymous,
    Basic {
        username: String,
        password: SecretString,
    },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Resolve credentials for `registry`: explicit environment variables
    /// win, then the Docker `config.json`, then anonymous access.
    pub fn resolve(registry: &str) -> Result<Self> {
        if let Some(creds) = Self::from_lookup(|key| std::env::var(key).ok())? {
            debug!(registry, "using registry credentials from environment");
            return Ok(creds);
        }

        if let Some(path) = docker_config_path() {
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                if let Some(creds) = Self::from_docker_config(&raw, registry)? {
                    debug!(registry, path = %path.display(), "using docker config credentials");
                    return Ok(creds);
                }
            }
        }

        debug!(registry, "no registry credentials found; using anonymous access");
        Ok(Self::Anonymous)
    }

    /// Read `HYBRIDPACK_REGISTRY_USERNAME` / `HYBRIDPACK_REGISTRY_PASSWORD`
    /// through `lookup`.  Setting only one of the pair is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup(USERNAME_ENV).unwrap_or_default();
        let password = lookup(PASSWORD_ENV).unwrap_or_default();
        match (username.is_empty(), password.is_empty()) {
            (true, true) => Ok(None),
            (false, false) => Ok(Some(Self::basic(username, password))),
            _ => Err(OciError::Auth(format!(
                "registry credentials incomplete: set both {} and {}",
                USERNAME_ENV, PASSWORD_ENV
            ))),
        }
    }

    /// Look up `registry` in the `auths` section of a Docker `config.json`.
    pub fn from_docker_config(raw: &str, registry: &str) -> Result<Option<Self>> {
        let config: DockerConfig = serde_json::from_str(raw)?;
        let aliases = registry_aliases(registry);

        let entry = config
            .auths
            .iter()
            .find(|(key, _)| aliases.contains(&normalize_config_key(key)))
            .map(|(_, entry)| entry);

        let Some(entry) = entry else {
            return Ok(None);
        };

        if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
            return Ok(Some(Self::basic(username.clone(), password.clone())));
        }

        match &entry.auth {
            Some(encoded) if !encoded.is_empty() => {
                let decoded = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| OciError::Auth(format!("invalid docker config auth: {}", e)))?;
                let decoded = String::from_utf8(decoded)
                    .map_err(|e| OciError::Auth(format!("invalid docker config auth: {}", e)))?;
                let (username, password) = decoded.split_once(':').ok_or_else(|| {
                    OciError::Auth("docker config auth is not user:password".to_string())
                })?;
                Ok(Some(Self::basic(username, password)))
            }
            _ => Ok(None),
        }
    }

    /// Hand the credentials to the distribution client.
    pub fn registry_auth(&self) -> RegistryAuth {
        match self {
            Self::Anonymous => RegistryAuth::Anonymous,
            Self::Basic { username, password } => {
                RegistryAuth::Basic(username.clone(), password.expose_secret().to_string())
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: BTreeMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// `$DOCKER_CONFIG/config.json`, falling back to `~/.docker/config.json`.
fn docker_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".docker").join("config.json"))
}

/// Docker Hub is stored under several historical keys.
fn registry_aliases(registry: &str) -> Vec<&str> {
    match registry {
        "registry-1.docker.io" | "index.docker.io" | "docker.io" => {
            vec!["index.docker.io", "docker.io", "registry-1.docker.io"]
        }
        other => vec![other],
    }
}

/// Strip scheme and path from a `config.json` key
/// (`https://index.docker.io/v1/` → `index.docker.io`).
fn normalize_config_key(key: &str) -> &str {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    key.split('/').next().unwrap_or(key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
