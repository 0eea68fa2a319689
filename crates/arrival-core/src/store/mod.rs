//! Trip persistence.
//!
//! State is kept in four independent slots (see [`Slot`]). There is no
//! transaction across slots, so readers must tolerate partial state such as an
//! action id with no action object. [`TripStore::load`] reconciles the known
//! partial shapes once, at load time, through [`migrate`].

pub mod db;
pub mod memory;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::geofence::GeofencingRequest;
use crate::model::{non_empty, Action, Place};

pub use db::RedbSlotStore;
pub use memory::MemorySlotStore;

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Action,
    ActionId,
    Place,
    GeofencingRequest,
}

impl Slot {
    /// Every slot, in teardown order.
    pub const ALL: [Slot; 4] = [
        Slot::Place,
        Slot::Action,
        Slot::ActionId,
        Slot::GeofencingRequest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Action => "current_action",
            Slot::ActionId => "current_action_id",
            Slot::Place => "current_place",
            Slot::GeofencingRequest => "current_geofencing_request",
        }
    }
}

/// Durable mapping from [`Slot`] to raw bytes. Every operation is idempotent.
pub trait SlotStore: Send + Sync {
    fn get(&self, slot: Slot) -> Result<Option<Vec<u8>>>;

    fn set(&self, slot: Slot, value: &[u8]) -> Result<()>;

    /// Remove the slot. Deleting an empty slot is not an error.
    fn delete(&self, slot: Slot) -> Result<()>;
}

// ---------------------------------------------------------------------------
// TripRecord
// ---------------------------------------------------------------------------

/// Everything persisted for the current trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub action: Option<Action>,
    pub action_id: Option<String>,
    pub place: Option<Place>,
    pub geofencing_request: Option<GeofencingRequest>,
}

#[cfg(test)]
impl TripRecord {
    pub(crate) fn is_empty(&self) -> bool {
        self.action.is_none()
            && self.action_id.is_none()
            && self.place.is_none()
            && self.geofencing_request.is_none()
    }
}

/// Bring an older record shape up to date. Returns true if anything changed.
///
/// Older writers persisted only the full action object; the id slot is then
/// filled from the id embedded in that object.
pub fn migrate(record: &mut TripRecord) -> bool {
    if non_empty(record.action_id.as_deref()).is_some() {
        return false;
    }
    let embedded = record
        .action
        .as_ref()
        .and_then(|a| a.non_empty_id())
        .map(str::to_owned);
    match embedded {
        Some(id) => {
            record.action_id = Some(id);
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// TripStore
// ---------------------------------------------------------------------------

/// Typed access to the trip slots.
#[derive(Clone)]
pub struct TripStore {
    slots: Arc<dyn SlotStore>,
}

impl TripStore {
    pub fn new(slots: Arc<dyn SlotStore>) -> Self {
        Self { slots }
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self::new(Arc::new(MemorySlotStore::new()))
    }

    /// Read and decode a slot. Undecodable bytes are reported and read as empty.
    fn read<T: DeserializeOwned>(&self, slot: Slot) -> Result<Option<T>> {
        let Some(bytes) = self.slots.get(slot)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(slot = slot.as_str(), error = %e, "ignoring undecodable slot");
                Ok(None)
            }
        }
    }

    fn write<T: Serialize>(&self, slot: Slot, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.slots.set(slot, &bytes)
    }

    pub fn delete(&self, slot: Slot) -> Result<()> {
        self.slots.delete(slot)
    }

    pub fn action(&self) -> Result<Option<Action>> {
        self.read(Slot::Action)
    }

    pub fn set_action(&self, action: &Action) -> Result<()> {
        self.write(Slot::Action, action)
    }

    pub fn action_id(&self) -> Result<Option<String>> {
        Ok(self
            .read::<String>(Slot::ActionId)?
            .filter(|id| !id.is_empty()))
    }

    pub fn set_action_id(&self, id: &str) -> Result<()> {
        self.write(Slot::ActionId, &id)
    }

    pub fn place(&self) -> Result<Option<Place>> {
        self.read(Slot::Place)
    }

    pub fn set_place(&self, place: &Place) -> Result<()> {
        self.write(Slot::Place, place)
    }

    pub fn geofencing_request(&self) -> Result<Option<GeofencingRequest>> {
        self.read(Slot::GeofencingRequest)
    }

    pub fn set_geofencing_request(&self, request: &GeofencingRequest) -> Result<()> {
        self.write(Slot::GeofencingRequest, request)
    }

    /// Load every slot and apply [`migrate`], persisting a healed id.
    ///
    /// A failed write of the healed id is logged; the record is still returned
    /// and the id is healed again on the next load.
    pub fn load(&self) -> Result<TripRecord> {
        let mut record = TripRecord {
            action: self.action()?,
            action_id: self.action_id()?,
            place: self.place()?,
            geofencing_request: self.geofencing_request()?,
        };
        if migrate(&mut record) {
            if let Some(id) = record.action_id.as_deref() {
                debug!(action_id = id, "migrated action id from stored action");
                if let Err(e) = self.set_action_id(id) {
                    warn!(
                        action_id = id,
                        error = %e,
                        "failed to persist migrated action id"
                    );
                }
            }
        }
        Ok(record)
    }

    /// Delete every slot. Safe to call on an empty store.
    ///
    /// A failed delete is logged and the remaining slots are still attempted;
    /// the first failure is returned.
    pub fn clear_all(&self) -> Result<()> {
        let mut first_err = None;
        for slot in Slot::ALL {
            if let Err(e) = self.slots.delete(slot) {
                warn!(slot = slot.as_str(), error = %e, "failed to delete slot");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
