//! Application configuration.

use std::{fs, path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    models::Coordinates,
    storage::{self, FileStore},
    store::DEFAULT_STORAGE_KEY,
};

/// Directory under `~/.config` holding the configuration file.
pub const CONFIG_DIR: &str = "mapty";
/// Name of the configuration file.
pub const CONFIG_FILE: &str = "config.toml";
/// Prefix of environment variable overrides, e.g. `MAPTY__MAP__ZOOM=15`.
pub const ENV_PREFIX: &str = "MAPTY";

const DEFAULT_CONFIG: &str = r#"# Mapty configuration.
#
# Directory holding stored workouts. Defaults to the platform data directory.
# data_dir = "/home/me/.local/share/mapty"

# Key the workouts are stored under.
storage_key = "workouts"

[map]
# Zoom used when jumping to a workout.
zoom = 13
# Zoom of the first view.
initial_zoom = 3

[position]
# "ip" asks an IP geolocation service, "fixed" uses latitude/longitude below.
source = "ip"
endpoint = "http://ip-api.com/json"
timeout_secs = 5
# latitude = 52.37
# longitude = 4.89
"#;

/// How the initial map position is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    /// Use `position.latitude` / `position.longitude`.
    Fixed,
    /// Query `position.endpoint`.
    #[default]
    Ip,
}

/// Map view settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Zoom used when re-centering on a workout.
    pub zoom: u8,
    /// Zoom of the first view.
    pub initial_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            zoom: 13,
            initial_zoom: 3,
        }
    }
}

/// Positioning provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Which provider to use.
    pub source: PositionSource,
    /// Fixed latitude.
    pub latitude: Option<f64>,
    /// Fixed longitude.
    pub longitude: Option<f64>,
    /// IP geolocation endpoint.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            source: PositionSource::Ip,
            latitude: None,
            longitude: None,
            endpoint: "http://ip-api.com/json".to_string(),
            timeout_secs: 5,
        }
    }
}

impl PositionConfig {
    /// Configured fixed position, when both components are set.
    pub fn fixed(&self) -> Option<Coordinates> {
        Some(Coordinates::new(self.latitude?, self.longitude?))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory of the file-backed workout storage.
    pub data_dir: PathBuf,
    /// Key the workouts are stored under.
    pub storage_key: String,
    /// Map view settings.
    pub map: MapConfig,
    /// Positioning provider settings.
    pub position: PositionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: FileStore::default_root(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            map: MapConfig::default(),
            position: PositionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the default config file, overlaid by environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` (optional), overlaid by environment variables.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("failed to parse configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the rest of the application cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !storage::is_valid_key(&self.storage_key) {
            bail!(
                "storage_key '{}' may only contain letters, digits, '-' and '_'",
                self.storage_key
            );
        }
        if self.position.source == PositionSource::Fixed {
            let Some(fixed) = self.position.fixed() else {
                bail!("position.source = \"fixed\" needs position.latitude and position.longitude");
            };
            if !fixed.is_finite()
                || !(-90.0..=90.0).contains(&fixed.latitude)
                || !(-180.0..=180.0).contains(&fixed.longitude)
            {
                bail!("fixed position {fixed} is out of range");
            }
        }
        Ok(())
    }
}

/// Location of the configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Write the commented default configuration if no file exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = AppConfig::load_from(dir.path().join("absent.toml"))?;
        assert_eq!(config.storage_key, "workouts");
        assert_eq!(config.map, MapConfig::default());
        assert_eq!(config.position.source, PositionSource::Ip);
        Ok(())
    }

    #[test]
    fn default_file_parses_and_is_not_overwritten() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mapty").join(CONFIG_FILE);
        write_default_config(&path)?;
        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.map.zoom, 13);
        assert_eq!(config.position.timeout_secs, 5);

        fs::write(&path, "storage_key = \"mine\"\n")?;
        write_default_config(&path)?;
        assert_eq!(AppConfig::load_from(&path)?.storage_key, "mine");
        Ok(())
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
data_dir = "/tmp/mapty-test"
storage_key = "runs"

[map]
zoom = 15

[position]
source = "fixed"
latitude = 52.1
longitude = 4.3
"#,
        )?;

        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.data_dir, PathBuf::from("/tmp/mapty-test"));
        assert_eq!(config.storage_key, "runs");
        assert_eq!(config.map.zoom, 15);
        assert_eq!(config.map.initial_zoom, 3);
        assert_eq!(config.position.fixed(), Some(Coordinates::new(52.1, 4.3)));
        Ok(())
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig {
            storage_key: "../workouts".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        config.storage_key = "workouts".to_string();
        config.position.source = PositionSource::Fixed;
        assert!(config.validate().is_err());

        config.position.latitude = Some(95.0);
        config.position.longitude = Some(4.3);
        assert!(config.validate().is_err());

        config.position.latitude = Some(52.1);
        assert!(config.validate().is_ok());
    }
}
