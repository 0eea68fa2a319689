//! GeofenceController - actor that owns the destination geofence registration
//!
//! Every state change happens on the actor task in response to a message,
//! either a call from the lifecycle or a connection notification from the
//! provider. Provider calls are awaited on the actor task, so a removal can
//! never overtake the registration it undoes. Nothing here blocks the caller
//! and no provider failure escapes the actor.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::error::{ArrivalError, Result};
use crate::telemetry::{Level, Telemetry};

use super::provider::{
    ConnectionEvent, ConnectionListener, GeofencingProvider, PendingTrigger, ProviderError,
};
use super::request::GeofencingRequest;

const TAG: &str = "GeofenceController";

/// Registration state of the destination geofence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmState {
    /// Nothing requested.
    Unarmed,
    /// Requested but not confirmed: waiting for a connection, waiting for the
    /// provider's answer, or the last attempt failed and awaits a retry.
    Pending,
    /// Provider confirmed the registration.
    Armed,
}

/// Broadcast when the controller changes state, for observers and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceEvent {
    Connecting,
    Connected,
    ConnectionSuspended { cause: i32 },
    ConnectionFailed { message: String },
    ArmSubmitted,
    Armed,
    ArmFailed { message: String },
    Disarmed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub state: ArmState,
    pub request: Option<GeofencingRequest>,
    /// Whether a provider-side registration handle is held.
    pub registered: bool,
}

#[derive(Debug)]
pub(crate) enum ControllerMsg {
    Arm(GeofencingRequest),
    Adopt(GeofencingRequest),
    Disarm,
    Connection(ConnectionEvent),
    Snapshot(oneshot::Sender<ControllerSnapshot>),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to send commands to the controller actor.
#[derive(Clone)]
pub struct GeofenceController {
    tx: mpsc::UnboundedSender<ControllerMsg>,
    events: broadcast::Sender<GeofenceEvent>,
}

impl GeofenceController {
    /// Spawn the controller actor. Must be called within a Tokio runtime.
    ///
    /// The actor stops once every handle has been dropped.
    pub fn spawn(provider: Arc<dyn GeofencingProvider>, telemetry: Arc<dyn Telemetry>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);

        let actor = ControllerActor {
            provider,
            telemetry,
            tx: tx.downgrade(),
            events: events.clone(),
            state: ArmState::Unarmed,
            request: None,
            trigger: None,
            connecting: false,
        };
        tokio::spawn(actor_loop(actor, rx));

        debug!("geofence controller spawned");
        Self { tx, events }
    }

    /// Register `request` with the provider, connecting first if needed.
    pub fn arm(&self, request: GeofencingRequest) -> Result<()> {
        self.send(ControllerMsg::Arm(request))
    }

    /// Re-attach to a registration the provider still holds from an earlier
    /// process, without resubmitting it.
    pub fn adopt(&self, request: GeofencingRequest) -> Result<()> {
        self.send(ControllerMsg::Adopt(request))
    }

    /// Remove the registration, if any.
    pub fn disarm(&self) -> Result<()> {
        self.send(ControllerMsg::Disarm)
    }

    /// Current state. Resolves after every previously sent command was handled.
    pub async fn snapshot(&self) -> Result<ControllerSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ControllerMsg::Snapshot(reply_tx))?;
        reply_rx.await.map_err(|_| ArrivalError::ControllerStopped)
    }

    pub async fn state(&self) -> Result<ArmState> {
        Ok(self.snapshot().await?.state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GeofenceEvent> {
        self.events.subscribe()
    }

    fn send(&self, msg: ControllerMsg) -> Result<()> {
        self.tx.send(msg).map_err(|_| ArrivalError::ControllerStopped)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ControllerActor {
    provider: Arc<dyn GeofencingProvider>,
    telemetry: Arc<dyn Telemetry>,
    tx: mpsc::WeakUnboundedSender<ControllerMsg>,
    events: broadcast::Sender<GeofenceEvent>,
    state: ArmState,
    request: Option<GeofencingRequest>,
    trigger: Option<PendingTrigger>,
    connecting: bool,
}

async fn actor_loop(mut actor: ControllerActor, mut rx: mpsc::UnboundedReceiver<ControllerMsg>) {
    while let Some(msg) = rx.recv().await {
        actor.handle(msg).await;
    }
    debug!("geofence controller stopped");
}

impl ControllerActor {
    async fn handle(&mut self, msg: ControllerMsg) {
        match msg {
            ControllerMsg::Arm(request) => self.arm(request).await,
            ControllerMsg::Adopt(request) => self.adopt(request),
            ControllerMsg::Disarm => self.disarm().await,
            ControllerMsg::Connection(event) => self.on_connection(event).await,
            ControllerMsg::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            request: self.request.clone(),
            registered: self.trigger.is_some(),
        }
    }

    fn emit(&self, event: GeofenceEvent) {
        let _ = self.events.send(event);
    }

    async fn arm(&mut self, request: GeofencingRequest) {
        if self.state == ArmState::Armed && self.request.as_ref() == Some(&request) {
            debug!("geofence already armed for this request");
            return;
        }
        self.request = Some(request);
        self.submit().await;
    }

    async fn submit(&mut self) {
        let Some(request) = self.request.clone() else {
            return;
        };
        self.state = ArmState::Pending;

        if !self.provider.is_connected() {
            if !self.connecting {
                self.connecting = true;
                debug!("provider not connected, arming deferred");
                self.emit(GeofenceEvent::Connecting);
                self.provider.connect(ConnectionListener::new(self.tx.clone()));
            }
            return;
        }

        let Some(trigger) = PendingTrigger::for_request(&request) else {
            self.report_failure(ProviderError::InvalidRequest(
                "request contains no geofence".into(),
            ));
            return;
        };

        self.trigger = Some(trigger.clone());
        self.emit(GeofenceEvent::ArmSubmitted);
        let result = self.provider.add_geofences(&request, &trigger).await;
        self.on_arm_result(result);
    }

    fn on_arm_result(&mut self, result: std::result::Result<(), ProviderError>) {
        match result {
            Ok(()) => {
                self.state = ArmState::Armed;
                self.telemetry
                    .log(Level::Info, TAG, "Geofence set at expected place");
                self.emit(GeofenceEvent::Armed);
            }
            Err(e) => {
                self.state = ArmState::Pending;
                self.report_failure(e);
            }
        }
    }

    fn report_failure(&self, error: ProviderError) {
        self.telemetry.log(
            Level::Error,
            TAG,
            &format!("Geofence error at expected place: {error}"),
        );
        self.telemetry.log_error(&error);
        self.emit(GeofenceEvent::ArmFailed {
            message: error.to_string(),
        });
    }

    async fn on_connection(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                self.connecting = false;
                self.emit(GeofenceEvent::Connected);
                if self.state == ArmState::Pending {
                    debug!("provider connected, retrying deferred arm");
                    self.submit().await;
                }
            }
            ConnectionEvent::Suspended { cause } => {
                self.telemetry.log(
                    Level::Debug,
                    TAG,
                    &format!("provider connection suspended (cause {cause})"),
                );
                self.emit(GeofenceEvent::ConnectionSuspended { cause });
            }
            ConnectionEvent::Failed { message } => {
                self.connecting = false;
                let error = ProviderError::Connection(message.clone());
                self.telemetry.log(Level::Warn, TAG, &error.to_string());
                self.telemetry.log_error(&error);
                self.emit(GeofenceEvent::ConnectionFailed { message });
            }
        }
    }

    fn adopt(&mut self, request: GeofencingRequest) {
        if self.trigger.is_some() && self.request.as_ref() == Some(&request) {
            return;
        }
        let Some(trigger) = PendingTrigger::for_request(&request) else {
            return;
        };
        debug!(request_id = %trigger.request_id, "adopting existing registration");
        self.trigger = Some(trigger);
        self.request = Some(request);
        self.state = ArmState::Armed;
    }

    async fn disarm(&mut self) {
        self.request = None;
        self.state = ArmState::Unarmed;

        let Some(trigger) = self.trigger.take() else {
            return;
        };
        if let Err(e) = self.provider.remove_geofences(&trigger).await {
            self.telemetry.log(
                Level::Warn,
                TAG,
                &format!("failed to remove geofence: {e}"),
            );
            self.telemetry.log_error(&e);
        }
        self.emit(GeofenceEvent::Disarmed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
