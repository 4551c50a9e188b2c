//! Pool of transient by-value objects crossing the boundary.
//!
//! The host stashes a value and hands native code its index; native code
//! retrieves it exactly once, which clears the slot.

use wirebind_core::{BindError, Value};

use crate::SlotTable;

#[derive(Debug, Default)]
pub struct ValueObjectPool {
    table: SlotTable<Value>,
}

impl ValueObjectPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stash a value, returning its index.
    pub fn push(&mut self, value: Value) -> u32 {
        let index = self.table.insert(value).index;
        tracing::trace!(index, "value stashed");
        index
    }

    /// Retrieve and clear a stashed value.
    ///
    /// A second pop of the same index fails until it is reused by a push.
    pub fn pop(&mut self, index: u32) -> Result<Value, BindError> {
        self.table
            .take(index)
            .ok_or(BindError::StaleHandle { index })
    }

    /// Number of stashed values not yet retrieved.
    pub fn len(&self) -> usize {
        self.table.live()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
