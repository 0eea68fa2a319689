//! ActionLifecycleManager - owner of the current trip
//!
//! One instance per process, constructed explicitly and shared behind an
//! `Arc`. Trip fields live behind a single mutex; listener, tracking and
//! controller calls are always made with the lock released.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{ArrivalError, Result};
use crate::geofence::{ArmState, GeofenceController, GeofenceSettings, GeofencingRequest};
use crate::model::{Action, Place};
use crate::store::{Slot, TripRecord, TripStore};
use crate::telemetry::{Level, Telemetry};
use crate::tracking::TrackingProvider;

use super::events::{CompletionListener, LifecycleEvent, TripPhase};

const TAG: &str = "ActionLifecycleManager";

#[derive(Default)]
struct TripState {
    action: Option<Action>,
    action_id: Option<String>,
    place: Option<Place>,
    listener: Option<Arc<dyn CompletionListener>>,
    /// Set once `start()` has requested a geofence for this trip.
    started: bool,
}

pub struct ActionLifecycleManager {
    store: TripStore,
    controller: GeofenceController,
    tracking: Arc<dyn TrackingProvider>,
    telemetry: Arc<dyn Telemetry>,
    settings: GeofenceSettings,
    inner: Mutex<TripState>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl ActionLifecycleManager {
    pub fn new(
        store: TripStore,
        controller: GeofenceController,
        tracking: Arc<dyn TrackingProvider>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            controller,
            tracking,
            telemetry,
            settings: GeofenceSettings::default(),
            inner: Mutex::new(TripState::default()),
            events,
        }
    }

    pub fn with_settings(mut self, settings: GeofenceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn geofence(&self) -> &GeofenceController {
        &self.controller
    }

    fn lock(&self) -> MutexGuard<'_, TripState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.events.send(event);
    }

    fn report(&self, context: &str, error: &ArrivalError) {
        self.telemetry
            .log(Level::Warn, TAG, &format!("{context}: {error}"));
        self.telemetry.log_error(error);
    }

    // === Trip lifecycle ===

    /// Load the persisted trip into memory.
    ///
    /// Returns true iff an action was restored. When nothing was restored the
    /// registered listener (if any) is invoked right away, so callers can treat
    /// "no trip" the same as "trip finished".
    pub fn restore_state(&self) -> bool {
        let record = self.store.load().unwrap_or_else(|e| {
            self.report("failed to restore trip state", &e);
            TripRecord::default()
        });
        let restored = record.action.is_some();
        let adopt = record.geofencing_request.filter(|_| restored);

        let listener = {
            let mut state = self.lock();
            state.action = record.action;
            state.action_id = record.action_id;
            state.place = record.place;
            state.started = adopt.is_some();
            if restored {
                None
            } else {
                state.listener.clone()
            }
        };

        if let Some(request) = adopt {
            if let Err(e) = self.controller.adopt(request) {
                self.report("failed to adopt persisted geofence", &e);
            }
        }

        debug!(restored, "trip state restored");
        self.emit(LifecycleEvent::Restored { live: restored });

        if let Some(listener) = listener {
            listener.on_callback();
            self.emit(LifecycleEvent::ListenerNotified);
        }
        restored
    }

    /// Arm the geofence around the current place.
    ///
    /// Failures are logged and published as [`LifecycleEvent::ArmingFailed`];
    /// they never reach the caller.
    pub fn start(&self) {
        if let Err(e) = self.arm_geofence() {
            self.telemetry
                .log(Level::Error, TAG, &format!("unable to arm geofence: {e}"));
            self.telemetry.log_error(&e);
            self.emit(LifecycleEvent::ArmingFailed {
                message: e.to_string(),
            });
        }
    }

    fn arm_geofence(&self) -> Result<()> {
        let place = self.place();
        let request = GeofencingRequest::build_with(place.as_ref(), &self.settings)
            .ok_or(ArrivalError::MissingPlace)?;
        // Persisted so a later process can re-attach to the registration
        self.store.set_geofencing_request(&request)?;
        self.controller.arm(request)?;
        self.lock().started = true;
        self.emit(LifecycleEvent::ArmRequested);
        Ok(())
    }

    /// Entry point for the arrival trigger.
    ///
    /// A registered listener decides how to finish the trip; without one the
    /// action is completed automatically.
    pub fn on_trigger_fired(&self) {
        let listener = self.lock().listener.clone();
        match listener {
            Some(listener) => {
                debug!("arrival trigger fired, notifying listener");
                listener.on_callback();
                self.emit(LifecycleEvent::ListenerNotified);
            }
            None => {
                debug!("arrival trigger fired with no listener, completing action");
                if let Err(e) = self.complete() {
                    self.report("automatic completion failed", &e);
                }
            }
        }
    }

    /// Ask the tracking provider to complete the current action.
    ///
    /// Returns the completed id once the call is issued; the provider's
    /// acknowledgment is not awaited.
    pub fn complete(&self) -> Result<String> {
        let Some(action_id) = self.action_id() else {
            self.emit(LifecycleEvent::CompletionRejected);
            return Err(ArrivalError::MissingActionId);
        };
        self.tracking.complete_action(&action_id);
        info!(%action_id, "action completion issued");
        self.emit(LifecycleEvent::Completed {
            action_id: action_id.clone(),
        });
        Ok(action_id)
    }

    /// Tear down the trip in memory and in the store. Idempotent.
    pub fn clear(&self) {
        if let Err(e) = self.controller.disarm() {
            self.report("failed to disarm geofence", &e);
        }
        {
            let mut state = self.lock();
            state.listener = None;
            state.place = None;
            state.action = None;
            state.action_id = None;
            state.started = false;
        }
        if let Err(e) = self.store.clear_all() {
            self.report("failed to clear stored trip", &e);
        }
        debug!("trip state cleared");
        self.emit(LifecycleEvent::Cleared);
    }

    pub async fn phase(&self) -> TripPhase {
        if !self.is_live() {
            return TripPhase::Idle;
        }
        match self.controller.state().await {
            Ok(ArmState::Armed) => TripPhase::Armed,
            _ => TripPhase::Active,
        }
    }

    // === Accessors ===

    /// True iff an action is held and a non-empty id is resolvable.
    pub fn is_live(&self) -> bool {
        self.action().is_some() && self.action_id().is_some()
    }

    pub fn action(&self) -> Option<Action> {
        if let Some(action) = self.lock().action.clone() {
            return Some(action);
        }
        let loaded = self.store.action().unwrap_or_else(|e| {
            self.report("failed to read action", &e);
            None
        });
        if let Some(action) = &loaded {
            self.lock().action.get_or_insert_with(|| action.clone());
        }
        loaded
    }

    /// Resolve the action id: memory, then the id slot, then the id embedded
    /// in the stored action (which is then written to the id slot).
    pub fn action_id(&self) -> Option<String> {
        let cached = self.lock().action_id.clone().filter(|id| !id.is_empty());
        if cached.is_some() {
            return cached;
        }

        let stored = self.store.action_id().unwrap_or_else(|e| {
            self.report("failed to read action id", &e);
            None
        });
        if let Some(id) = stored {
            self.lock().action_id = Some(id.clone());
            return Some(id);
        }

        let id = self.action()?.non_empty_id()?.to_owned();
        self.lock().action_id = Some(id.clone());
        if let Err(e) = self.store.set_action_id(&id) {
            self.report("failed to persist migrated action id", &e);
        }
        Some(id)
    }

    pub fn lookup_id(&self) -> Option<String> {
        self.action().and_then(|a| a.lookup_id)
    }

    /// Hold and persist a new action. Writes the object, then the id; a failed
    /// second write leaves the object in place.
    pub fn set_action(&self, action: Action) -> Result<()> {
        let action_id = action.non_empty_id().map(str::to_owned);
        {
            let mut state = self.lock();
            state.action = Some(action.clone());
            state.action_id = action_id.clone();
        }
        self.store.set_action(&action)?;
        match action_id {
            Some(id) => self.store.set_action_id(&id),
            None => self.store.delete(Slot::ActionId),
        }
    }

    pub fn place(&self) -> Option<Place> {
        if let Some(place) = self.lock().place.clone() {
            return Some(place);
        }
        let loaded = self.store.place().unwrap_or_else(|e| {
            self.report("failed to read place", &e);
            None
        });
        if let Some(place) = &loaded {
            self.lock().place.get_or_insert_with(|| place.clone());
        }
        loaded
    }

    /// Hold and persist a new destination. A started trip is re-armed around it.
    pub fn set_place(&self, place: Place) -> Result<()> {
        let rearm = {
            let mut state = self.lock();
            let changed = state.place.as_ref() != Some(&place);
            state.place = Some(place.clone());
            changed && state.started
        };
        self.store.set_place(&place)?;
        if rearm {
            debug!("destination changed, re-arming geofence");
            self.start();
        }
        Ok(())
    }

    pub fn set_completion_listener(&self, listener: Arc<dyn CompletionListener>) {
        self.lock().listener = Some(listener);
    }

    pub fn clear_completion_listener(&self) {
        self.lock().listener = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::{GeofenceEvent, ProviderError};
    use crate::store::MemorySlotStore;
    use crate::testing::{
        next_matching, FakeProvider, ReadOnlySlots, RecordingTelemetry, RecordingTracker,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        manager: Arc<ActionLifecycleManager>,
        slots: Arc<MemorySlotStore>,
        provider: Arc<FakeProvider>,
        tracker: Arc<RecordingTracker>,
        telemetry: Arc<RecordingTelemetry>,
    }

    impl Harness {
        fn new(provider: FakeProvider) -> Self {
            Self::with_slots(Arc::new(MemorySlotStore::new()), Arc::new(provider))
        }

        fn with_slots(slots: Arc<MemorySlotStore>, provider: Arc<FakeProvider>) -> Self {
            let tracker = Arc::new(RecordingTracker::default());
            let telemetry = Arc::new(RecordingTelemetry::default());
            let controller = GeofenceController::spawn(provider.clone(), telemetry.clone());
            let manager = Arc::new(ActionLifecycleManager::new(
                TripStore::new(slots.clone()),
                controller,
                tracker.clone(),
                telemetry.clone(),
            ));
            Self {
                manager,
                slots,
                provider,
                tracker,
                telemetry,
            }
        }

        /// A second process over the same store and provider.
        fn restart(&self) -> Self {
            Self::with_slots(self.slots.clone(), self.provider.clone())
        }
    }

    fn counting_listener() -> (Arc<AtomicUsize>, Arc<dyn CompletionListener>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let listener: Arc<dyn CompletionListener> = Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[tokio::test]
    async fn restore_on_empty_store_notifies_listener() {
        let h = Harness::new(FakeProvider::connected());
        let (count, listener) = counting_listener();
        h.manager.set_completion_listener(listener);

        assert!(!h.manager.restore_state());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn restore_after_restart_finds_action() {
        let h = Harness::new(FakeProvider::connected());
        h.manager.set_action(Action::with_id("act-1")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();

        let next = h.restart();
        let (count, listener) = counting_listener();
        next.manager.set_completion_listener(listener);
        assert!(next.manager.restore_state());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(next.manager.action_id().as_deref(), Some("act-1"));
        assert_eq!(next.manager.place(), Some(Place::at(12.9, 77.6)));
        assert!(next.manager.is_live());
    }

    #[tokio::test]
    async fn restore_after_clear_is_empty_and_notifies_once() {
        let h = Harness::new(FakeProvider::connected());
        h.manager.set_action(Action::with_id("act-1")).unwrap();
        h.manager.clear();

        let (count, listener) = counting_listener();
        h.manager.set_completion_listener(listener);
        assert!(!h.manager.restore_state());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn is_live_requires_action_and_id() {
        let h = Harness::new(FakeProvider::connected());
        assert!(!h.manager.is_live());

        // Action without any id anywhere
        h.manager.set_action(Action::default()).unwrap();
        assert!(!h.manager.is_live());

        h.manager.set_action(Action::with_id("act-2")).unwrap();
        assert!(h.manager.is_live());
    }

    #[tokio::test]
    async fn legacy_state_is_healed_on_access() {
        let h = Harness::new(FakeProvider::connected());
        // Older writers stored only the full object
        TripStore::new(h.slots.clone())
            .set_action(&Action::with_id("legacy-9").lookup_id("order-3"))
            .unwrap();

        assert!(h.manager.is_live());
        assert_eq!(h.manager.lookup_id().as_deref(), Some("order-3"));
        assert_eq!(
            TripStore::new(h.slots.clone()).action_id().unwrap().as_deref(),
            Some("legacy-9")
        );
    }

    #[tokio::test]
    async fn complete_without_id_fails_without_remote_call() {
        let h = Harness::new(FakeProvider::connected());
        let err = h.manager.complete().unwrap_err();
        assert!(matches!(err, ArrivalError::MissingActionId));
        assert!(h.tracker.completed().is_empty());
    }

    #[tokio::test]
    async fn complete_with_id_issues_one_call() {
        let h = Harness::new(FakeProvider::connected());
        h.manager.set_action(Action::with_id("act-3")).unwrap();

        assert_eq!(h.manager.complete().unwrap(), "act-3");
        assert_eq!(h.tracker.completed(), vec!["act-3".to_string()]);
    }

    #[tokio::test]
    async fn trigger_without_listener_completes_once() {
        let h = Harness::new(FakeProvider::connected());
        h.manager.set_action(Action::with_id("act-4")).unwrap();

        h.manager.on_trigger_fired();
        assert_eq!(h.tracker.completed(), vec!["act-4".to_string()]);
    }

    #[tokio::test]
    async fn trigger_with_listener_defers_to_it() {
        let h = Harness::new(FakeProvider::connected());
        h.manager.set_action(Action::with_id("act-5")).unwrap();
        let (count, listener) = counting_listener();
        h.manager.set_completion_listener(listener);

        h.manager.on_trigger_fired();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(h.tracker.completed().is_empty());
    }

    #[tokio::test]
    async fn trigger_without_action_is_logged_not_raised() {
        let h = Harness::new(FakeProvider::connected());
        h.manager.on_trigger_fired();
        assert!(h.tracker.completed().is_empty());
        assert!(h.telemetry.has_line(Level::Warn, "automatic completion failed"));
    }

    #[tokio::test]
    async fn clear_twice_matches_clear_once() {
        let h = Harness::new(FakeProvider::connected());
        h.manager.set_action(Action::with_id("act-6")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();
        h.manager.start();

        h.manager.clear();
        h.manager.clear();

        assert!(!h.manager.is_live());
        assert!(h.manager.place().is_none());
        assert_eq!(h.slots.occupied(), 0);
        assert_eq!(h.manager.phase().await, TripPhase::Idle);
    }

    #[tokio::test]
    async fn clear_when_idle_is_safe() {
        let h = Harness::new(FakeProvider::connected());
        h.manager.clear();
        assert_eq!(h.slots.occupied(), 0);
        assert_eq!(h.provider.remove_calls(), 0);
    }

    #[tokio::test]
    async fn start_without_place_is_swallowed_but_observable() {
        let h = Harness::new(FakeProvider::connected());
        let mut events = h.manager.subscribe();
        h.manager.set_action(Action::with_id("act-7")).unwrap();

        h.manager.start();
        let event = next_matching(&mut events, |e| {
            matches!(e, LifecycleEvent::ArmingFailed { .. })
        })
        .await;
        assert!(matches!(event, LifecycleEvent::ArmingFailed { message } if message.contains("destination")));
        assert_eq!(h.telemetry.error_count(), 1);
        assert_eq!(h.provider.add_calls(), 0);
    }

    #[tokio::test]
    async fn provider_failure_keeps_trip_active() {
        let h = Harness::new(FakeProvider::connected());
        h.provider
            .fail_next_add(ProviderError::InvalidRequest("radius".into()));
        let mut geofence = h.manager.geofence().subscribe();
        h.manager.set_action(Action::with_id("act-8")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();

        h.manager.start();
        next_matching(&mut geofence, |e| matches!(e, GeofenceEvent::ArmFailed { .. })).await;
        assert_eq!(h.manager.phase().await, TripPhase::Active);
        assert!(h.manager.is_live());
    }

    #[tokio::test]
    async fn start_on_disconnected_provider_arms_after_connect() {
        let h = Harness::new(FakeProvider::disconnected());
        let mut geofence = h.manager.geofence().subscribe();
        h.manager.set_action(Action::with_id("act-9")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();

        h.manager.start();
        next_matching(&mut geofence, |e| *e == GeofenceEvent::Armed).await;
        assert_eq!(h.provider.connect_calls(), 1);
        assert_eq!(h.manager.phase().await, TripPhase::Armed);
    }

    #[tokio::test]
    async fn new_place_after_start_rearms() {
        let h = Harness::new(FakeProvider::connected());
        let mut geofence = h.manager.geofence().subscribe();
        h.manager.set_action(Action::with_id("act-10")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();
        h.manager.start();
        next_matching(&mut geofence, |e| *e == GeofenceEvent::Armed).await;

        h.manager.set_place(Place::at(13.1, 77.4)).unwrap();
        next_matching(&mut geofence, |e| *e == GeofenceEvent::Armed).await;

        let snap = h.manager.geofence().snapshot().await.unwrap();
        assert_eq!(snap.request.unwrap().geofences[0].latitude, 13.1);
        assert_eq!(h.provider.registration_count(), 1);
        let stored = TripStore::new(h.slots.clone())
            .geofencing_request()
            .unwrap()
            .unwrap();
        assert_eq!(stored.geofences[0].latitude, 13.1);
    }

    #[tokio::test]
    async fn restart_adopts_registration_so_clear_removes_it() {
        let h = Harness::new(FakeProvider::connected());
        let mut geofence = h.manager.geofence().subscribe();
        h.manager.set_action(Action::with_id("act-11")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();
        h.manager.start();
        next_matching(&mut geofence, |e| *e == GeofenceEvent::Armed).await;

        let next = h.restart();
        assert!(next.manager.restore_state());
        assert_eq!(next.manager.phase().await, TripPhase::Armed);

        // Identical arm after restart is not resubmitted
        next.manager.start();
        assert_eq!(next.manager.phase().await, TripPhase::Armed);
        assert_eq!(h.provider.add_calls(), 1);

        next.manager.clear();
        next.manager.geofence().snapshot().await.unwrap();
        assert_eq!(h.provider.registration_count(), 0);
    }

    #[tokio::test]
    async fn restore_keeps_trip_when_id_heal_cannot_be_written() {
        let slots = ReadOnlySlots::default().seed(Slot::Action, br#"{"id":"legacy-1"}"#);
        let provider = Arc::new(FakeProvider::connected());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let manager = ActionLifecycleManager::new(
            TripStore::new(Arc::new(slots)),
            GeofenceController::spawn(provider, telemetry.clone()),
            Arc::new(RecordingTracker::default()),
            telemetry,
        );
        let (count, listener) = counting_listener();
        manager.set_completion_listener(listener);

        assert!(manager.restore_state());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(manager.action_id().as_deref(), Some("legacy-1"));
        assert!(manager.is_live());
    }

    #[tokio::test]
    async fn clear_right_after_start_leaves_nothing_registered() {
        let h = Harness::new(FakeProvider::connected());
        h.manager.set_action(Action::with_id("act-12")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();

        h.manager.start();
        h.manager.clear();
        let snap = h.manager.geofence().snapshot().await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(snap.state, ArmState::Unarmed);
        assert!(!snap.registered);
        assert_eq!(h.provider.registration_count(), 0);
        assert_eq!(h.slots.occupied(), 0);
    }

    #[tokio::test]
    async fn clear_while_connecting_never_registers() {
        let h = Harness::new(FakeProvider::manual());
        h.manager.set_action(Action::with_id("act-13")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();

        h.manager.start();
        assert_eq!(h.manager.phase().await, TripPhase::Active);
        h.manager.clear();
        h.manager.geofence().snapshot().await.unwrap();

        // A connection that completes after the teardown arms nothing
        h.provider.finish_connect();
        let snap = h.manager.geofence().snapshot().await.unwrap();
        assert_eq!(snap.state, ArmState::Unarmed);
        assert_eq!(h.provider.add_calls(), 0);
        assert_eq!(h.provider.registration_count(), 0);
        assert_eq!(h.manager.phase().await, TripPhase::Idle);
    }

    #[tokio::test]
    async fn new_place_while_pending_arms_only_the_latest() {
        let h = Harness::new(FakeProvider::manual());
        let mut geofence = h.manager.geofence().subscribe();
        h.manager.set_action(Action::with_id("act-14")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();

        h.manager.start();
        h.manager.set_place(Place::at(13.1, 77.4)).unwrap();
        assert_eq!(h.manager.geofence().state().await.unwrap(), ArmState::Pending);

        h.provider.finish_connect();
        next_matching(&mut geofence, |e| *e == GeofenceEvent::Armed).await;

        let snap = h.manager.geofence().snapshot().await.unwrap();
        assert_eq!(snap.request.unwrap().geofences[0].latitude, 13.1);
        assert_eq!(h.provider.connect_calls(), 1);
        assert_eq!(h.provider.add_calls(), 1);
        assert_eq!(h.provider.registration_count(), 1);
    }

    #[tokio::test]
    async fn arrival_scenario_completes_and_clears() {
        let h = Harness::new(FakeProvider::connected());
        let mut geofence = h.manager.geofence().subscribe();
        h.manager.set_action(Action::with_id("trip-42")).unwrap();
        h.manager.set_place(Place::at(12.9, 77.6)).unwrap();

        h.manager.start();
        next_matching(&mut geofence, |e| *e == GeofenceEvent::Armed).await;
        assert_eq!(h.manager.phase().await, TripPhase::Armed);

        h.manager.on_trigger_fired();
        assert_eq!(h.tracker.completed(), vec!["trip-42".to_string()]);

        h.manager.clear();
        h.manager.geofence().snapshot().await.unwrap();
        assert!(!h.manager.is_live());
        assert_eq!(h.slots.occupied(), 0);
        assert_eq!(h.provider.registration_count(), 0);
    }
}
