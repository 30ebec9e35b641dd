use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CrawlerConfig {
    pub site: SiteSettings,
    pub crawler: CrawlerSettings,
    pub http: HttpSettings,
    pub output: OutputSettings,
}

/// Target site layout and login form conventions
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SiteSettings {
    pub base_url: String,
    pub login_path: String,
    /// Tried after the login form's own `action`, in this order
    pub login_endpoints: Vec<String>,
    /// `{id}` is replaced with the candidate identifier
    pub profile_path: String,
    pub login_field: String,
    pub password_field: String,
    /// Case-insensitive markers of an authenticated page
    pub success_keywords: Vec<String>,
    pub credentials: CredentialSource,
}

/// Names of the environment variables holding the login secrets
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CredentialSource {
    pub login_env: String,
    pub password_env: String,
}

/// Batch loop settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CrawlerSettings {
    pub start_id: u32,
    pub end_id: u32,
    pub batch_size: usize,
    pub pause_min_ms: u64,
    pub pause_max_ms: u64,
    /// Extra attempts for transient failures; 0 disables retries
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

/// Transport settings for the shared session
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub timeout_secs: u64,
    pub max_connections: usize,
    pub max_connections_per_host: usize,
}

/// Where the result files go
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub csv_file: String,
    pub json_file: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_url: "https://1is.az".to_string(),
            login_path: "/login".to_string(),
            login_endpoints: vec![
                "/loginu".to_string(),
                "/login".to_string(),
                "/auth/login".to_string(),
                "/user/login".to_string(),
                "/account/login".to_string(),
                "/signin".to_string(),
            ],
            profile_path: "/jobsearcher/{id}".to_string(),
            login_field: "email".to_string(),
            password_field: "password".to_string(),
            success_keywords: vec![
                "dashboard".to_string(),
                "profile".to_string(),
                "jobsearcher".to_string(),
                "logout".to_string(),
            ],
            credentials: CredentialSource::default(),
        }
    }
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self {
            login_env: "login".to_string(),
            password_env: "password".to_string(),
        }
    }
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            start_id: 1,
            end_id: 1000,
            batch_size: 5,
            pause_min_ms: 1000,
            pause_max_ms: 3000,
            retry_attempts: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string(),
            accept_language: "en-US,en;q=0.5".to_string(),
            timeout_secs: 30,
            max_connections: 10,
            max_connections_per_host: 5,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            csv_file: "candidates.csv".to_string(),
            json_file: "candidates.json".to_string(),
        }
    }
}

/// Login identifier and secret read from the environment
#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Read the credentials from the variables named in `source`
    pub fn from_env(source: &CredentialSource) -> Result<Self> {
        let login = std::env::var(&source.login_env)
            .context(format!("Environment variable '{}' is not set", source.login_env))?;
        let password = std::env::var(&source.password_env)
            .context(format!("Environment variable '{}' is not set", source.password_env))?;

        Ok(Self::new(login, password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl CrawlerConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let path = if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "jobsearcher-crawler", "jobsearcher-crawler")
        {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path
    }

    /// Path of the default configuration file
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load the default configuration, writing it out on first use
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load from an explicit path, or fall back to the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}
