use crate::error::Result;
use crate::geofence::GeofenceSettings;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Trip database location, relative to the project root unless absolute.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(paths::STORE_FILE)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub geofence: GeofenceSettings,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            geofence: GeofenceSettings::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Load `.arrival/config.yaml`, falling back to defaults when it is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn store_path(&self, root: &Path) -> PathBuf {
        paths::store_path(root, &self.store.path)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let fence = &self.geofence;

        if fence.request_id.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "geofence.request_id must not be empty".to_string(),
            });
        }

        if !(fence.radius_m.is_finite() && fence.radius_m > 0.0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("geofence.radius_m must be positive, got {}", fence.radius_m),
            });
        }

        if fence.loitering_delay_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "geofence.loitering_delay_ms is 0: dwell fires on entry".to_string(),
            });
        }

        if fence.notification_responsiveness_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "geofence.notification_responsiveness_ms is 0: provider may drain battery"
                    .to_string(),
            });
        }

        if self.store.path.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "store.path must not be empty".to_string(),
            });
        }

        warnings
    }
}
