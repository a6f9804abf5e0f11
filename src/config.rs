use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL of the API, without a trailing slash.
  pub api_url: String,
  /// Where the cache database lives. Defaults to the platform data
  /// directory.
  pub cache_db: Option<PathBuf>,
  /// API token. Usually supplied through the environment instead.
  pub token: Option<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: default_api_url(),
      cache_db: None,
      token: None,
    }
  }
}

fn default_api_url() -> String {
  "https://api.wanikani.com/v2".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./wanicache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/wanicache/config.yaml
  /// 4. ~/.config/wanicache/config.yaml
  ///
  /// A missing file is not an error; every field has a default.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Config(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("wanicache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("wanicache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      Error::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
      Error::Config(format!(
        "failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })?;

    Ok(config)
  }

  /// Resolve the cache database location.
  ///
  /// Checks the WANICACHE_DB environment variable first, then the config
  /// file, then falls back to the platform data directory.
  pub fn cache_db_path(&self) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("WANICACHE_DB") {
      return Ok(PathBuf::from(path));
    }
    if let Some(path) = &self.cache_db {
      return Ok(path.clone());
    }
    dirs::data_dir()
      .map(|dir| dir.join("wanicache").join("cache.db"))
      .ok_or_else(|| Error::Config("no data directory available for the cache database".to_string()))
  }

  /// Get the API token.
  ///
  /// Checks the `token` config field first, then WANICACHE_TOKEN, then
  /// WANIKANI_API_TOKEN as fallback.
  pub fn api_token(&self) -> Result<String> {
    if let Some(token) = &self.token {
      return Ok(token.clone());
    }
    std::env::var("WANICACHE_TOKEN")
      .or_else(|_| std::env::var("WANIKANI_API_TOKEN"))
      .map_err(|_| {
        Error::Config(
          "API token not found. Set WANICACHE_TOKEN or WANIKANI_API_TOKEN, or add `token` to the config file.".to_string(),
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_need_no_file() {
    let config = Config::default();
    assert_eq!(config.api_url, "https://api.wanikani.com/v2");
    assert!(config.cache_db.is_none());
    assert!(config.token.is_none());
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config: Config = serde_yaml::from_str("cache_db: /tmp/wk.db\n").unwrap();
    assert_eq!(config.api_url, "https://api.wanikani.com/v2");
    assert_eq!(config.cache_db, Some(PathBuf::from("/tmp/wk.db")));
  }
}
