use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ARRIVAL_DIR: &str = ".arrival";

pub const CONFIG_FILE: &str = ".arrival/config.yaml";
pub const STORE_FILE: &str = ".arrival/trip.redb";
pub const GEOFENCES_FILE: &str = ".arrival/geofences.json";
pub const COMPLETIONS_FILE: &str = ".arrival/completions.log";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn arrival_dir(root: &Path) -> PathBuf {
    root.join(ARRIVAL_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve the trip store location. Relative paths are taken from `root`.
pub fn store_path(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

pub fn geofences_path(root: &Path) -> PathBuf {
    root.join(GEOFENCES_FILE)
}

pub fn completions_path(root: &Path) -> PathBuf {
    root.join(COMPLETIONS_FILE)
}
