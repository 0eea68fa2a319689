//! Durable slot storage using redb.
//!
//! # Table design
//!
//! A single `SLOTS` table maps the slot name (see [`Slot::as_str`]) to the
//! JSON-encoded value. Each operation runs in its own transaction, so every
//! slot write is durable on return but there is no cross-slot atomicity.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{ArrivalError, Result};

use super::{Slot, SlotStore};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: slot name
/// Value: JSON bytes
const SLOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("slots");

fn store_err(e: impl std::fmt::Display) -> ArrivalError {
    ArrivalError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// RedbSlotStore
// ---------------------------------------------------------------------------

/// Persistent [`SlotStore`] backed by a redb file.
pub struct RedbSlotStore {
    db: Database,
}

impl RedbSlotStore {
    /// Open or create the redb database at `path`.
    ///
    /// Creates parent directories and the `SLOTS` table if they don't exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        // Ensure the table exists before any reads
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(SLOTS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Number of slots currently holding a value.
    #[cfg(test)]
    pub(crate) fn occupied(&self) -> Result<usize> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SLOTS).map_err(store_err)?;
        let mut count = 0;
        for entry in table.iter().map_err(store_err)? {
            entry.map_err(store_err)?;
            count += 1;
        }
        Ok(count)
    }
}

impl SlotStore for RedbSlotStore {
    fn get(&self, slot: Slot) -> Result<Option<Vec<u8>>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SLOTS).map_err(store_err)?;
        let value = table
            .get(slot.as_str())
            .map_err(store_err)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn set(&self, slot: Slot, value: &[u8]) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(SLOTS).map_err(store_err)?;
            table.insert(slot.as_str(), value).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    fn delete(&self, slot: Slot) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(SLOTS).map_err(store_err)?;
            table.remove(slot.as_str()).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
