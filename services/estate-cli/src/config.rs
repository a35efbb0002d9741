//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The config file is optional unless named explicitly. Credentials never
//! live in the TOML; only the path of the credential file does.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use estate_client::ClientConfig;

/// Default config file name, looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "estate.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Session persistence settings
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Where the credential pair is kept between runs
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

fn default_base_url() -> String {
    ClientConfig::default().base_url
}

fn default_timeout() -> u64 {
    60
}

/// Where the config comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Named via `--config` or `ESTATE_CONFIG`; a missing file is an error
    pub explicit: bool,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Load from `source`. An implicit source that does not exist yields
    /// the defaults (plus env overlay).
    pub fn load_from(source: &ConfigSource) -> common::Result<Self> {
        match Config::load(&source.path) {
            Err(e) if !source.explicit && e.is_missing_file() => Config::default().finish(),
            loaded => loaded,
        }
    }

    /// Resolve config file path from CLI arg or ESTATE_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> ConfigSource {
        if let Some(p) = cli_path {
            return ConfigSource {
                path: p.to_path_buf(),
                explicit: true,
            };
        }
        if let Ok(p) = std::env::var("ESTATE_CONFIG") {
            return ConfigSource {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        ConfigSource {
            path: PathBuf::from(DEFAULT_CONFIG_FILE),
            explicit: false,
        }
    }

    /// Apply env overlays, then validate.
    fn finish(mut self) -> common::Result<Self> {
        if let Ok(url) = std::env::var("ESTATE_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(path) = std::env::var("ESTATE_CREDENTIALS") {
            self.session.credentials_path = Some(PathBuf::from(path));
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Url(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(self)
    }

    /// Settings for the API client library.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            ..ClientConfig::default()
        }
    }

    /// Credential file location, `~/` expanded.
    ///
    /// Defaults to `$XDG_CONFIG_HOME/estate/credentials.json`, falling back
    /// to `~/.config/estate/credentials.json`.
    pub fn credentials_path(&self) -> PathBuf {
        match &self.session.credentials_path {
            Some(path) => expand_home(path),
            None => default_credentials_path(),
        }
    }
}

fn default_credentials_path() -> PathBuf {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".config"),
            None => PathBuf::from("."),
        },
    };
    base.join("estate").join("credentials.json")
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
