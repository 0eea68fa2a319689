//! Wiring shared by every command: config, store, providers, controller and
//! the lifecycle manager, restored from disk.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arrival_core::config::Config;
use arrival_core::geofence::{ArmState, ControllerSnapshot, GeofenceController, GeofenceEvent};
use arrival_core::paths;
use arrival_core::store::{RedbSlotStore, TripStore};
use arrival_core::telemetry::{Telemetry, TracingTelemetry};
use arrival_core::{ActionLifecycleManager, LifecycleEvent};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::providers::{LocalGeofencingProvider, LocalTrackingProvider};

/// Upper bound on how long a command waits to report an arm outcome.
const ARM_WAIT: Duration = Duration::from_secs(5);

pub struct App {
    pub config: Config,
    pub manager: Arc<ActionLifecycleManager>,
}

impl App {
    /// Open the trip store and restore the current trip. Must be called
    /// within a Tokio runtime.
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load config")?;
        let store_path = config.store_path(root);
        let slots = RedbSlotStore::open(&store_path)
            .with_context(|| format!("failed to open trip store at {}", store_path.display()))?;

        let telemetry: Arc<dyn Telemetry> = Arc::new(TracingTelemetry);
        let provider = Arc::new(LocalGeofencingProvider::new(paths::geofences_path(root)));
        let tracking = Arc::new(LocalTrackingProvider::new(paths::completions_path(root)));
        let controller = GeofenceController::spawn(provider, Arc::clone(&telemetry));

        let manager = ActionLifecycleManager::new(
            TripStore::new(Arc::new(slots)),
            controller,
            tracking,
            telemetry,
        )
        .with_settings(config.geofence.clone());
        manager.restore_state();

        Ok(Self {
            config,
            manager: Arc::new(manager),
        })
    }

    /// Controller state after every command sent so far has been handled.
    pub async fn settle(&self) -> anyhow::Result<ControllerSnapshot> {
        self.manager
            .geofence()
            .snapshot()
            .await
            .context("geofence controller stopped")
    }

    /// Subscribe before calling anything that may arm; pass the receivers to
    /// [`App::await_arm`] afterwards.
    pub fn watch(&self) -> ArmWatch {
        ArmWatch {
            lifecycle: self.manager.subscribe(),
            geofence: self.manager.geofence().subscribe(),
        }
    }

    /// Wait until the geofence is confirmed or the attempt fails.
    pub async fn await_arm(&self, mut watch: ArmWatch) -> anyhow::Result<ArmOutcome> {
        // Lifecycle failures (e.g. no destination) are published synchronously
        while let Ok(event) = watch.lifecycle.try_recv() {
            if let LifecycleEvent::ArmingFailed { message } = event {
                return Ok(ArmOutcome::Failed { message });
            }
        }

        match self.settle().await?.state {
            ArmState::Armed => return Ok(ArmOutcome::Armed),
            ArmState::Unarmed => return Ok(ArmOutcome::Unarmed),
            ArmState::Pending => {}
        }

        let wait = async {
            loop {
                match watch.geofence.recv().await {
                    Ok(GeofenceEvent::Armed) => return ArmOutcome::Armed,
                    Ok(GeofenceEvent::ArmFailed { message }) => {
                        return ArmOutcome::Failed { message }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return ArmOutcome::Failed {
                            message: "geofence controller stopped".to_string(),
                        }
                    }
                }
            }
        };
        Ok(tokio::time::timeout(ARM_WAIT, wait)
            .await
            .unwrap_or(ArmOutcome::Pending))
    }
}

pub struct ArmWatch {
    lifecycle: broadcast::Receiver<LifecycleEvent>,
    geofence: broadcast::Receiver<GeofenceEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArmOutcome {
    /// Nothing was requested.
    Unarmed,
    Armed,
    /// No answer from the provider yet; the arm stays pending.
    Pending,
    Failed { message: String },
}
