use std::fmt;

use serde::Serialize;

/// Callback registered by the owner of the trip, invoked when the trip is
/// considered done (arrival trigger, or nothing to restore at startup).
pub trait CompletionListener: Send + Sync {
    fn on_callback(&self);
}

impl<F> CompletionListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_callback(&self) {
        self()
    }
}

/// Observable phase of the current trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripPhase {
    /// No live action.
    Idle,
    /// Live action, geofence not confirmed by the provider.
    Active,
    /// Live action with a confirmed geofence.
    Armed,
}

impl fmt::Display for TripPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TripPhase::Idle => "idle",
            TripPhase::Active => "active",
            TripPhase::Armed => "armed",
        };
        f.write_str(s)
    }
}

/// Broadcast on every lifecycle step, including swallowed failures.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Restored { live: bool },
    ArmRequested,
    ArmingFailed { message: String },
    ListenerNotified,
    Completed { action_id: String },
    CompletionRejected,
    Cleared,
}
