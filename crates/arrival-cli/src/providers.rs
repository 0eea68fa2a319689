//! File-backed stand-ins for the tracking and geofencing services.
//!
//! Each CLI invocation is a separate process, so provider-side state lives
//! under `.arrival/` where the next invocation (and the tests) can see it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arrival_core::geofence::{
    ConnectionListener, GeofencingProvider, GeofencingRequest, PendingTrigger, ProviderError,
};
use arrival_core::io;
use arrival_core::tracking::TrackingProvider;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Status code reported when the registry file cannot be read or written.
const STATUS_INTERNAL_ERROR: i32 = 13;

pub type Registry = BTreeMap<String, GeofencingRequest>;

// ---------------------------------------------------------------------------
// LocalTrackingProvider
// ---------------------------------------------------------------------------

/// Records completions as `<rfc3339> <action id>` lines.
pub struct LocalTrackingProvider {
    path: PathBuf,
}

impl LocalTrackingProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TrackingProvider for LocalTrackingProvider {
    fn complete_action(&self, action_id: &str) {
        let line = format!("{} {action_id}", chrono::Utc::now().to_rfc3339());
        if let Err(e) = io::append_line(&self.path, &line) {
            warn!(error = %e, %action_id, "failed to record completion");
        }
    }
}

// ---------------------------------------------------------------------------
// LocalGeofencingProvider
// ---------------------------------------------------------------------------

/// Keeps registrations in a JSON object keyed by request id. Submitting under
/// an existing id replaces the entry.
pub struct LocalGeofencingProvider {
    path: PathBuf,
    connected: Arc<AtomicBool>,
}

impl LocalGeofencingProvider {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn save(&self, registry: &Registry) -> Result<(), ProviderError> {
        let data = serde_json::to_vec_pretty(registry).map_err(internal)?;
        io::atomic_write(&self.path, &data).map_err(internal)
    }
}

/// Read the registry file. A missing file is an empty registry.
pub fn load_registry(path: &Path) -> Result<Registry, ProviderError> {
    if !path.exists() {
        return Ok(Registry::new());
    }
    let data = std::fs::read(path).map_err(internal)?;
    serde_json::from_slice(&data).map_err(internal)
}

fn internal(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Status {
        code: STATUS_INTERNAL_ERROR,
        message: e.to_string(),
    }
}

#[async_trait]
impl GeofencingProvider for LocalGeofencingProvider {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self, listener: ConnectionListener) {
        let connected = Arc::clone(&self.connected);
        tokio::spawn(async move {
            connected.store(true, Ordering::SeqCst);
            debug!("local geofencing session connected");
            listener.connected();
        });
    }

    async fn add_geofences(
        &self,
        request: &GeofencingRequest,
        trigger: &PendingTrigger,
    ) -> Result<(), ProviderError> {
        if request.geofences.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "request contains no geofence".into(),
            ));
        }
        let mut registry = load_registry(&self.path)?;
        registry.insert(trigger.request_id.clone(), request.clone());
        self.save(&registry)?;
        debug!(request_id = %trigger.request_id, "geofence registered");
        Ok(())
    }

    async fn remove_geofences(&self, trigger: &PendingTrigger) -> Result<(), ProviderError> {
        let mut registry = load_registry(&self.path)?;
        if registry.remove(&trigger.request_id).is_some() {
            self.save(&registry)?;
            debug!(request_id = %trigger.request_id, "geofence removed");
        }
        Ok(())
    }
}
