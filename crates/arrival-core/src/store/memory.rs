use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;

use super::{Slot, SlotStore};

/// Non-durable [`SlotStore`] for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<Slot, Vec<u8>>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn occupied(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl SlotStore for MemorySlotStore {
    fn get(&self, slot: Slot) -> Result<Option<Vec<u8>>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Ok(slots.get(&slot).cloned())
    }

    fn set(&self, slot: Slot, value: &[u8]) -> Result<()> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert(slot, value.to_vec());
        Ok(())
    }

    fn delete(&self, slot: Slot) -> Result<()> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(&slot);
        Ok(())
    }
}
