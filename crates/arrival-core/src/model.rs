//! Trip data model: the tracked [`Action`] and its destination [`Place`].
//!
//! Both types are owned by the tracking provider; this crate only carries them
//! around and persists them. Fields the provider adds that we do not model are
//! kept verbatim in [`Action::extra`] so a save/load cycle never drops them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One tracked real-world task, e.g. a delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Provider-assigned identifier. May be absent until the provider saves it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// External correlation key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_id: Option<String>,
    /// Opaque status fields owned by the tracking provider.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Action {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn lookup_id(mut self, lookup_id: impl Into<String>) -> Self {
        self.lookup_id = Some(lookup_id.into());
        self
    }

    /// The id, if present and non-empty.
    pub fn non_empty_id(&self) -> Option<&str> {
        non_empty(self.id.as_deref())
    }
}

pub(crate) fn non_empty(id: Option<&str>) -> Option<&str> {
    id.filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Place
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Destination of the current action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,
}

impl Place {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            location: Some(Coordinate::new(latitude, longitude)),
            ..Default::default()
        }
    }
}
