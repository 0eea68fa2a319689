//! Lifecycle of the single active trip.
//!
//! [`ActionLifecycleManager`] owns the current action and destination, arms the
//! geofence through the controller, and completes the action when the
//! arrival trigger fires.

mod events;
mod manager;

pub use events::{CompletionListener, LifecycleEvent, TripPhase};
pub use manager::ActionLifecycleManager;
