//! Geofence request construction.
//!
//! Only one geofence ever exists: a circle around the destination place,
//! registered under a fixed request id so that resubmitting replaces the
//! provider-side registration instead of adding a second one.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::model::Place;

pub const GEOFENCE_REQUEST_ID: &str = "arrival:destination-geofence";
pub const GEOFENCE_RADIUS_METERS: f32 = 100.0;
pub const LOITERING_DELAY_MS: u32 = 30_000;
pub const NOTIFICATION_RESPONSIVENESS_MS: u32 = 5_000;

// ---------------------------------------------------------------------------
// TransitionMask
// ---------------------------------------------------------------------------

/// Set of geofence transitions, encoded as provider bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionMask(u8);

impl TransitionMask {
    pub const ENTER: Self = Self(1);
    pub const EXIT: Self = Self(2);
    pub const DWELL: Self = Self(4);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for TransitionMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Transitions that complete a trip.
pub const ARRIVAL_TRANSITIONS: TransitionMask = TransitionMask::ENTER.union(TransitionMask::DWELL);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expiration {
    /// Registration stays until removed.
    Never,
}

// ---------------------------------------------------------------------------
// GeofenceSettings
// ---------------------------------------------------------------------------

/// Tunables for the destination geofence. Defaults are the production values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceSettings {
    #[serde(default = "default_request_id")]
    pub request_id: String,
    #[serde(default = "default_radius")]
    pub radius_m: f32,
    #[serde(default = "default_loitering_delay")]
    pub loitering_delay_ms: u32,
    #[serde(default = "default_responsiveness")]
    pub notification_responsiveness_ms: u32,
}

fn default_request_id() -> String {
    GEOFENCE_REQUEST_ID.to_string()
}

fn default_radius() -> f32 {
    GEOFENCE_RADIUS_METERS
}

fn default_loitering_delay() -> u32 {
    LOITERING_DELAY_MS
}

fn default_responsiveness() -> u32 {
    NOTIFICATION_RESPONSIVENESS_MS
}

impl Default for GeofenceSettings {
    fn default() -> Self {
        Self {
            request_id: default_request_id(),
            radius_m: default_radius(),
            loitering_delay_ms: default_loitering_delay(),
            notification_responsiveness_ms: default_responsiveness(),
        }
    }
}

// ---------------------------------------------------------------------------
// GeofenceSpec / GeofencingRequest
// ---------------------------------------------------------------------------

/// One circular geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceSpec {
    pub request_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f32,
    pub transitions: TransitionMask,
    pub loitering_delay_ms: u32,
    pub notification_responsiveness_ms: u32,
    pub expiration: Expiration,
}

/// What gets submitted to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofencingRequest {
    /// Transitions to report immediately if the device is already inside.
    pub initial_trigger: TransitionMask,
    pub geofences: Vec<GeofenceSpec>,
}

impl GeofencingRequest {
    /// Build the destination request with default settings.
    ///
    /// Returns `None` when there is no place or it has no coordinate.
    pub fn build(place: Option<&Place>) -> Option<Self> {
        Self::build_with(place, &GeofenceSettings::default())
    }

    pub fn build_with(place: Option<&Place>, settings: &GeofenceSettings) -> Option<Self> {
        let location = place?.location?;
        Some(Self {
            initial_trigger: ARRIVAL_TRANSITIONS,
            geofences: vec![GeofenceSpec {
                request_id: settings.request_id.clone(),
                latitude: location.latitude,
                longitude: location.longitude,
                radius_m: settings.radius_m,
                transitions: ARRIVAL_TRANSITIONS,
                loitering_delay_ms: settings.loitering_delay_ms,
                notification_responsiveness_ms: settings.notification_responsiveness_ms,
                expiration: Expiration::Never,
            }],
        })
    }

    /// Request id of the (single) geofence.
    pub fn request_id(&self) -> Option<&str> {
        self.geofences.first().map(|g| g.request_id.as_str())
    }
}
