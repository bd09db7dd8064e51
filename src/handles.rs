//! The engine-owned foreign handle table.
//!
//! Every handle the engine mints for script code is a generational
//! index into this table. Finalizing a slot bumps its generation, so a
//! handle that outlives its entry reads as stale instead of aliasing
//! whatever reuses the slot. The script garbage collector owns handle
//! lifetime; the table does no reference counting of its own.

use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::error::ConvertError;
use crate::host::value::HostValue;

/// A generational handle onto engine-owned host data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    pub index: u32,
    pub generation: u32,
}

/// What a live handle points at: the wrapped host value and the
/// descriptor driving proxy behavior on it.
#[derive(Debug, Clone)]
pub struct ProxyEntry {
    pub value: HostValue,
    pub descriptor: Arc<TypeDescriptor>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<ProxyEntry>,
}

/// Slot table with a free list; never shrinks, never reorders.
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable::default()
    }

    pub fn insert(&mut self, entry: ProxyEntry) -> HandleId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return HandleId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        HandleId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: HandleId) -> Result<&ProxyEntry, ConvertError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(ConvertError::StaleHandle)
    }

    pub fn get_mut(&mut self, id: HandleId) -> Result<&mut ProxyEntry, ConvertError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(ConvertError::StaleHandle)
    }

    /// Release a slot. Returns false when the handle was already stale;
    /// double finalization is not an error.
    pub fn finalize(&mut self, id: HandleId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return false;
        };
        if slot.generation != id.generation || slot.entry.is_none() {
            return false;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        true
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(v: HostValue) -> ProxyEntry {
        ProxyEntry {
            descriptor: crate::descriptor::descriptor_for(&v),
            value: v,
        }
    }

    #[test]
    fn insert_get_finalize() {
        let mut table = HandleTable::new();
        let id = table.insert(entry(HostValue::Int(7)));
        assert!(table.get(id).unwrap().value.host_eq(&HostValue::Int(7)));
        assert_eq!(table.live_count(), 1);
        assert!(table.finalize(id));
        assert_eq!(table.live_count(), 0);
        assert!(matches!(table.get(id), Err(ConvertError::StaleHandle)));
    }

    #[test]
    fn reused_slot_does_not_honor_old_handles() {
        let mut table = HandleTable::new();
        let old = table.insert(entry(HostValue::Int(1)));
        table.finalize(old);
        let new = table.insert(entry(HostValue::Int(2)));
        assert_eq!(old.index, new.index);
        assert_ne!(old.generation, new.generation);
        assert!(table.get(old).is_err());
        assert!(table.get(new).is_ok());
    }

    #[test]
    fn double_finalize_is_a_no_op() {
        let mut table = HandleTable::new();
        let id = table.insert(entry(HostValue::Bool(true)));
        assert!(table.finalize(id));
        assert!(!table.finalize(id));
    }

    #[test]
    fn entries_are_mutable_in_place() {
        let mut table = HandleTable::new();
        let id = table.insert(entry(HostValue::Int(1)));
        table.get_mut(id).unwrap().value = HostValue::Int(2);
        assert!(table.get(id).unwrap().value.host_eq(&HostValue::Int(2)));
    }
}
