use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "conftool/0.3";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const APP_NAME: &str = "conftool";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub confluence: ConfluenceSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ConfluenceSection {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl Config {
    /// Resolve the API base endpoint: env CONFLUENCE_BASE_URL > config.
    /// Required and non-empty; a trailing slash is stripped.
    pub fn base_url(&self) -> Result<String> {
        self.base_url_with_lookup(|key| env::var(key).ok())
    }

    fn base_url_with_lookup<F>(&self, lookup_env: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = lookup_env("CONFLUENCE_BASE_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| self.confluence.base_url.clone());
        match value {
            Some(url) if !url.trim().is_empty() => Ok(url.trim().trim_end_matches('/').to_string()),
            _ => bail!(
                "no base endpoint configured (set CONFLUENCE_BASE_URL or [confluence] base_url)"
            ),
        }
    }

    /// Resolve user agent: env CONFLUENCE_USER_AGENT > config > default.
    pub fn user_agent(&self) -> String {
        if let Ok(value) = env::var("CONFLUENCE_USER_AGENT") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.confluence
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve request timeout: env CONFLUENCE_TIMEOUT_MS > config > default.
    pub fn timeout_ms(&self) -> u64 {
        if let Ok(value) = env::var("CONFLUENCE_TIMEOUT_MS")
            && let Ok(parsed) = value.trim().parse::<u64>()
        {
            return parsed;
        }
        self.confluence.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }
}

/// Load and parse a Config from a TOML file. Returns default if the file
/// doesn't exist.
pub fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Default location of the user configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
}

/// Absolute path to an app-specific caching file, creating the cache
/// directory when needed.
pub fn cache_file(name: &str) -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .context("no cache directory available on this platform")?
        .join(APP_NAME);
    fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create {}", cache_dir.display()))?;
    Ok(cache_dir.join(name))
}
