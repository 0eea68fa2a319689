//! Destination geofence: request construction, the provider seam, and the
//! controller that keeps one registration alive.

pub mod controller;
pub mod provider;
pub mod request;

pub use controller::{ArmState, ControllerSnapshot, GeofenceController, GeofenceEvent};
pub use provider::{
    ConnectionEvent, ConnectionListener, GeofencingProvider, PendingTrigger, ProviderError,
};
pub use request::{
    Expiration, GeofenceSettings, GeofenceSpec, GeofencingRequest, TransitionMask,
    ARRIVAL_TRANSITIONS, GEOFENCE_RADIUS_METERS, GEOFENCE_REQUEST_ID, LOITERING_DELAY_MS,
    NOTIFICATION_RESPONSIVENESS_MS,
};
