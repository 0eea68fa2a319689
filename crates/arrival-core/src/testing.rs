//! Test doubles shared by the controller and lifecycle tests.

use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{ArrivalError, Result as StoreResult};
use crate::geofence::{
    ConnectionListener, GeofencingProvider, GeofencingRequest, PendingTrigger, ProviderError,
};
use crate::store::{MemorySlotStore, Slot, SlotStore};
use crate::telemetry::{Level, Telemetry};
use crate::tracking::TrackingProvider;

/// Wait for the first event matching `pred`, skipping others.
pub(crate) async fn next_matching<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    pred: impl Fn(&T) -> bool,
) -> T {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("timed out waiting for event")
}

// ---------------------------------------------------------------------------
// FakeProvider
// ---------------------------------------------------------------------------

pub(crate) struct FakeProvider {
    connected: AtomicBool,
    auto_connect: bool,
    listener: Mutex<Option<ConnectionListener>>,
    failures: Mutex<VecDeque<ProviderError>>,
    registrations: Mutex<HashMap<String, GeofencingRequest>>,
    connect_calls: AtomicUsize,
    add_calls: AtomicUsize,
    remove_calls: AtomicUsize,
}

impl FakeProvider {
    fn new(connected: bool, auto_connect: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            auto_connect,
            listener: Mutex::new(None),
            failures: Mutex::new(VecDeque::new()),
            registrations: Mutex::new(HashMap::new()),
            connect_calls: AtomicUsize::new(0),
            add_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
        }
    }

    /// Session already connected.
    pub(crate) fn connected() -> Self {
        Self::new(true, true)
    }

    /// Disconnected; `connect` succeeds immediately.
    pub(crate) fn disconnected() -> Self {
        Self::new(false, true)
    }

    /// Disconnected; the test drives the connection outcome.
    pub(crate) fn manual() -> Self {
        Self::new(false, false)
    }

    fn listener(&self) -> ConnectionListener {
        self.listener
            .lock()
            .unwrap()
            .clone()
            .expect("connect was never called")
    }

    pub(crate) fn finish_connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.listener().connected();
    }

    pub(crate) fn fail_connect(&self, message: &str) {
        self.listener().failed(message);
    }

    pub(crate) fn fail_next_add(&self, error: ProviderError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn registration_count(&self) -> usize {
        self.registrations.lock().unwrap().len()
    }

    pub(crate) fn is_registered(&self, request_id: &str) -> bool {
        self.registrations.lock().unwrap().contains_key(request_id)
    }
}

#[async_trait]
impl GeofencingProvider for FakeProvider {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self, listener: ConnectionListener) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.listener.lock().unwrap() = Some(listener.clone());
        if self.auto_connect {
            self.connected.store(true, Ordering::SeqCst);
            listener.connected();
        }
    }

    async fn add_geofences(
        &self,
        request: &GeofencingRequest,
        trigger: &PendingTrigger,
    ) -> Result<(), ProviderError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        // Give other tasks a chance to run while the submission is in flight
        tokio::task::yield_now().await;
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.registrations
            .lock()
            .unwrap()
            .insert(trigger.request_id.clone(), request.clone());
        Ok(())
    }

    async fn remove_geofences(&self, trigger: &PendingTrigger) -> Result<(), ProviderError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.registrations.lock().unwrap().remove(&trigger.request_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recorders
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct RecordingTelemetry {
    lines: Mutex<Vec<(Level, String)>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingTelemetry {
    pub(crate) fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    pub(crate) fn has_line(&self, level: Level, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl Telemetry for RecordingTelemetry {
    fn log(&self, level: Level, _tag: &str, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }

    fn log_error(&self, error: &dyn Error) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

#[derive(Default)]
pub(crate) struct RecordingTracker {
    completed: Mutex<Vec<String>>,
}

impl RecordingTracker {
    pub(crate) fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

impl TrackingProvider for RecordingTracker {
    fn complete_action(&self, action_id: &str) {
        self.completed.lock().unwrap().push(action_id.to_string());
    }
}

// ---------------------------------------------------------------------------
// ReadOnlySlots
// ---------------------------------------------------------------------------

/// Slot store that serves pre-seeded values but rejects every write.
#[derive(Default)]
pub(crate) struct ReadOnlySlots {
    inner: MemorySlotStore,
}

impl ReadOnlySlots {
    pub(crate) fn seed(self, slot: Slot, value: &[u8]) -> Self {
        self.inner.set(slot, value).unwrap();
        self
    }
}

impl SlotStore for ReadOnlySlots {
    fn get(&self, slot: Slot) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(slot)
    }

    fn set(&self, slot: Slot, _value: &[u8]) -> StoreResult<()> {
        Err(ArrivalError::Store(format!("{} is read-only", slot.as_str())))
    }

    fn delete(&self, slot: Slot) -> StoreResult<()> {
        Err(ArrivalError::Store(format!("{} is read-only", slot.as_str())))
    }
}
