use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::controller::ControllerMsg;
use super::request::GeofencingRequest;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("provider connection failed: {0}")]
    Connection(String),

    #[error("location permission denied: {0}")]
    Security(String),

    #[error("malformed geofencing request: {0}")]
    InvalidRequest(String),

    #[error("provider returned status {code}: {message}")]
    Status { code: i32, message: String },
}

/// Handle the provider delivers transitions through.
///
/// Derived from the fixed request id, so the same value is produced after a
/// restart and can be used to remove a registration made by an earlier process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTrigger {
    pub request_id: String,
}

impl PendingTrigger {
    pub fn for_request(request: &GeofencingRequest) -> Option<Self> {
        request.request_id().map(|id| Self {
            request_id: id.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Suspended { cause: i32 },
    Failed { message: String },
}

/// Connection notifications from the provider session back to the controller.
///
/// Cheap to clone; each entry point may be called from any thread. Holding a
/// listener does not keep the controller alive.
#[derive(Debug, Clone)]
pub struct ConnectionListener {
    tx: mpsc::WeakUnboundedSender<ControllerMsg>,
}

impl ConnectionListener {
    pub(crate) fn new(tx: mpsc::WeakUnboundedSender<ControllerMsg>) -> Self {
        Self { tx }
    }

    pub fn connected(&self) {
        self.notify(ConnectionEvent::Connected);
    }

    pub fn suspended(&self, cause: i32) {
        self.notify(ConnectionEvent::Suspended { cause });
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.notify(ConnectionEvent::Failed {
            message: message.into(),
        });
    }

    fn notify(&self, event: ConnectionEvent) {
        // The controller may already be gone during shutdown.
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(ControllerMsg::Connection(event));
        }
    }
}

/// Location-based triggering service that monitors the geofence.
#[async_trait]
pub trait GeofencingProvider: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Start connecting. The outcome is reported through `listener`.
    fn connect(&self, listener: ConnectionListener);

    async fn add_geofences(
        &self,
        request: &GeofencingRequest,
        trigger: &PendingTrigger,
    ) -> Result<(), ProviderError>;

    async fn remove_geofences(&self, trigger: &PendingTrigger) -> Result<(), ProviderError>;
}
