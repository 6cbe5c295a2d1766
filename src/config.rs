//! Configuration for repotrack.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (REPOTRACK_PULP_URL, REPOTRACK_PULP_USERNAME,
//!    REPOTRACK_PULP_PASSWORD, REPOTRACK_REQUESTS_TIMEOUT, REPOTRACK_DATABASE)
//! 2. Config file (.repotrack/config.yaml)
//! 3. Defaults (~/.repotrack/builds.db, 30 second timeout)
//!
//! Config file discovery:
//! - Searches current directory and parents for .repotrack/config.yaml
//! - The database path in the config file is relative to the project root
//!   (the directory containing .repotrack/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::RetryPolicy;

pub const ENV_PULP_URL: &str = "REPOTRACK_PULP_URL";
pub const ENV_PULP_USERNAME: &str = "REPOTRACK_PULP_USERNAME";
pub const ENV_PULP_PASSWORD: &str = "REPOTRACK_PULP_PASSWORD";
pub const ENV_REQUESTS_TIMEOUT: &str = "REPOTRACK_REQUESTS_TIMEOUT";
pub const ENV_DATABASE: &str = "REPOTRACK_DATABASE";

const DEFAULT_REQUESTS_TIMEOUT: u64 = 30;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub pulp: PulpConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PulpConfig {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout in seconds
    pub requests_timeout: Option<u64>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

/// Everything needed to construct a Pulp client
#[derive(Clone, PartialEq)]
pub struct PulpSettings {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub timeout_seconds: u64,
    pub retry: RetryPolicy,
}

impl PulpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl std::fmt::Debug for PulpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulpSettings")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"********")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Pulp settings, if every required value was provided
    pulp: Option<PulpSettings>,
    /// Names of the required Pulp settings that are missing
    missing: Vec<&'static str>,
    /// Absolute path to the build database
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Pulp settings, or an error naming what is missing
    pub fn pulp(&self) -> Result<&PulpSettings> {
        match self.pulp {
            Some(ref settings) => Ok(settings),
            None => anyhow::bail!(
                "Pulp is not configured: missing {}",
                self.missing.join(", ")
            ),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".repotrack").join("config.yaml");
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

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn default_database() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".repotrack")
        .join("builds.db"))
}

/// Combine an optional config file with environment lookups
fn resolve(
    file: Option<(&Path, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let (config_path, pulp, database) = match file {
        Some((path, config)) => (Some(path), config.pulp, config.database),
        None => (None, PulpConfig::default(), None),
    };

    // Project root is the parent of .repotrack/
    let base_dir = config_path
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."));

    let database = match env(ENV_DATABASE) {
        Some(path) => PathBuf::from(path),
        None => match database.and_then(|d| d.path) {
            Some(ref path) => resolve_path(base_dir, path),
            None => default_database()?,
        },
    };

    let timeout_seconds = match env(ENV_REQUESTS_TIMEOUT) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a number of seconds, got '{}'", ENV_REQUESTS_TIMEOUT, raw))?,
        None => pulp.requests_timeout.unwrap_or(DEFAULT_REQUESTS_TIMEOUT),
    };

    let retry = pulp.retry.unwrap_or_default();
    retry.validate().context("Invalid pulp.retry settings")?;

    let server_url = env(ENV_PULP_URL).or(pulp.server_url);
    let username = env(ENV_PULP_USERNAME).or(pulp.username);
    let password = env(ENV_PULP_PASSWORD).or(pulp.password);

    let mut missing = Vec::new();
    if server_url.is_none() {
        missing.push(ENV_PULP_URL);
    }
    if username.is_none() {
        missing.push(ENV_PULP_USERNAME);
    }
    if password.is_none() {
        missing.push(ENV_PULP_PASSWORD);
    }

    let pulp = match (server_url, username, password) {
        (Some(server_url), Some(username), Some(password)) => Some(PulpSettings {
            server_url,
            username,
            password,
            timeout_seconds,
            retry,
        }),
        _ => None,
    };

    Ok(ResolvedConfig {
        pulp,
        missing,
        database,
        config_file: config_path.map(Path::to_path_buf),
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

    match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            resolve(Some((path.as_path(), config)), env)
        }
        None => resolve(None, env),
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
