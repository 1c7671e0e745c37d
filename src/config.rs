use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Immutable worker configuration, constructed once at process start and
/// passed into every handler. Defaults match the built-in application shell.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Cache generation tag. Bumping this supersedes the previous generation
  /// on the next install/activate cycle.
  pub version: String,

  /// Application origin that seed paths and relative request URLs resolve
  /// against.
  pub origin: String,

  /// Essential resources seeded into the cache generation on install.
  pub seed_paths: Vec<String>,

  /// Application name, used for offline page branding and as the fallback
  /// notification title when push data fails to decode.
  pub app_name: String,

  /// Generic title applied to payloads that carry none.
  pub notification_title: String,

  /// Generic body applied to payloads that carry none.
  pub notification_body: String,

  /// Gates automatic-notification extras (the deferred housekeeping pass).
  pub auto_notifications: bool,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      version: "standby-v1".to_string(),
      origin: "http://localhost:8080".to_string(),
      seed_paths: vec![
        "/".to_string(),
        "/manifest.json".to_string(),
        "/pwa_api.html".to_string(),
      ],
      app_name: "Standby".to_string(),
      notification_title: "Standby".to_string(),
      notification_body: "You have a new notification".to_string(),
      auto_notifications: true,
    }
  }
}

impl WorkerConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./standby.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/standby/config.yaml
  ///
  /// Falls back to the built-in defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => {
        tracing::info!("no configuration file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("standby.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("standby").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: WorkerConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
