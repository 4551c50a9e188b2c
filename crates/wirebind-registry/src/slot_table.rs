//! Generational slot table backing the handle registries.

use std::fmt;

/// Host-side handle to a slot.
///
/// Native code only ever sees `index`. The generation lets host-side holders
/// detect that a slot was released and recycled behind their back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    /// Index into the table; the value handed to native code.
    pub index: u32,
    /// Generation of the slot when the handle was issued.
    pub generation: u32,
}

/// Growable slot array plus an explicit free-list stack.
///
/// Freed indices are reused last-in first-out before the array grows, so
/// handle values stay small and dense. A table created with
/// [`SlotTable::with_sentinel`] never issues index 0.
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
    ref_count: u32,
}

impl<T> Slot<T> {
    fn vacant() -> Self {
        Self {
            generation: 0,
            value: None,
            ref_count: 0,
        }
    }
}

impl<T> SlotTable<T> {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Create a table whose slot 0 is permanently reserved.
    pub fn with_sentinel() -> Self {
        Self {
            slots: vec![Slot::vacant()],
            free_list: Vec::new(),
        }
    }

    /// Store a value with a reference count of one.
    pub fn insert(&mut self, value: T) -> SlotHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            slot.ref_count = 1;
            SlotHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
                ref_count: 1,
            });
            SlotHandle {
                index,
                generation: 0,
            }
        }
    }

    /// Get the value stored at `index`.
    pub fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize)?.value.as_ref()
    }

    /// Get the value for a handle, rejecting stale generations.
    pub fn get_checked(&self, handle: SlotHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Current handle for a live index.
    pub fn handle(&self, index: u32) -> Option<SlotHandle> {
        let slot = self.slots.get(index as usize)?;
        slot.value.as_ref().map(|_| SlotHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Increment the reference count. Returns the new count.
    pub fn retain(&mut self, index: u32) -> Option<u32> {
        let slot = self.slots.get_mut(index as usize)?;
        slot.value.as_ref()?;
        slot.ref_count = slot.ref_count.saturating_add(1);
        Some(slot.ref_count)
    }

    /// Decrement the reference count, freeing the slot at zero.
    ///
    /// Returns the remaining count, or `None` if the slot was not live.
    pub fn release(&mut self, index: u32) -> Option<u32> {
        let slot = self.slots.get_mut(index as usize)?;
        slot.value.as_ref()?;
        slot.ref_count = slot.ref_count.saturating_sub(1);
        let remaining = slot.ref_count;
        if remaining == 0 {
            self.vacate(index);
        }
        Some(remaining)
    }

    /// Remove and return the value regardless of its reference count.
    pub fn take(&mut self, index: u32) -> Option<T> {
        self.slots.get(index as usize)?.value.as_ref()?;
        self.vacate(index)
    }

    fn vacate(&mut self, index: u32) -> Option<T> {
        let slot = &mut self.slots[index as usize];
        let value = slot.value.take();
        slot.ref_count = 0;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(index);
        value
    }

    /// Get the reference count of a live slot.
    pub fn ref_count(&self, index: u32) -> Option<u32> {
        let slot = self.slots.get(index as usize)?;
        slot.value.as_ref().map(|_| slot.ref_count)
    }

    /// Number of live slots.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    /// Number of slots ever allocated, including the sentinel.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SlotTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .finish()
    }
}
