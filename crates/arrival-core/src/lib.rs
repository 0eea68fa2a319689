pub mod config;
pub mod error;
pub mod geofence;
pub mod io;
pub mod lifecycle;
pub mod model;
pub mod paths;
pub mod store;
pub mod telemetry;
pub mod tracking;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ArrivalError, Result};
pub use lifecycle::{ActionLifecycleManager, CompletionListener, LifecycleEvent, TripPhase};
pub use model::{Action, Coordinate, Place};
