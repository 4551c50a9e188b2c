//! Callback registry: host functions exposed to native code as handles.
//!
//! Native code may keep a callback handle inside a long-lived structure, so
//! every slot is reference counted. Slot 0 is a permanent sentinel, which
//! keeps every valid handle non-zero.

use std::num::NonZeroU32;

use wirebind_core::{BindError, HostFunction, Value};

use crate::{SlotHandle, SlotTable};

/// Small non-zero integer standing in for a host function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(NonZeroU32);

impl CallbackHandle {
    /// The value passed across the boundary.
    pub fn raw(self) -> u32 {
        self.0.get()
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(CallbackHandle)
    }
}

/// Indexed, ref-counted table of host functions.
#[derive(Debug)]
pub struct CallbackRegistry {
    table: SlotTable<HostFunction>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            table: SlotTable::with_sentinel(),
        }
    }

    /// Register a host value as a callback.
    ///
    /// Anything but a function is rejected with a type mismatch.
    pub fn register(&mut self, value: &Value) -> Result<CallbackHandle, BindError> {
        match value {
            Value::Function(func) => Ok(self.register_fn(func.clone())),
            other => Err(BindError::mismatch("function", other.type_name())),
        }
    }

    /// Register a host function with a reference count of one.
    pub fn register_fn(&mut self, func: HostFunction) -> CallbackHandle {
        let SlotHandle { index, .. } = self.table.insert(func);
        tracing::trace!(handle = index, "callback registered");
        // The sentinel occupies index 0, so inserted indices start at 1.
        CallbackHandle(NonZeroU32::new(index).unwrap_or(NonZeroU32::MIN))
    }

    /// Add a reference. Returns the new count.
    pub fn retain(&mut self, handle: u32) -> Result<u32, BindError> {
        self.table
            .retain(handle)
            .ok_or(BindError::StaleHandle { index: handle })
    }

    /// Drop a reference; the slot is recycled when the count reaches zero.
    ///
    /// Returns the remaining count.
    pub fn release(&mut self, handle: u32) -> Result<u32, BindError> {
        let remaining = self
            .table
            .release(handle)
            .ok_or(BindError::StaleHandle { index: handle })?;
        if remaining == 0 {
            tracing::trace!(handle, "callback released");
        }
        Ok(remaining)
    }

    /// Get the function behind a live handle.
    pub fn get(&self, handle: u32) -> Result<HostFunction, BindError> {
        self.table
            .get(handle)
            .cloned()
            .ok_or(BindError::StaleHandle { index: handle })
    }

    /// Get the function for a generation-checked host-side handle.
    pub fn get_checked(&self, handle: SlotHandle) -> Option<&HostFunction> {
        self.table.get_checked(handle)
    }

    /// Generation-carrying handle for a live callback.
    pub fn slot_handle(&self, handle: u32) -> Option<SlotHandle> {
        self.table.handle(handle)
    }

    pub fn ref_count(&self, handle: u32) -> Option<u32> {
        self.table.ref_count(handle)
    }

    /// Number of live callbacks.
    pub fn len(&self) -> usize {
        self.table.live()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Value {
        Value::Function(HostFunction::new(|_| Ok(Value::Undefined)))
    }

    #[test]
    fn rejects_non_functions() {
        let mut registry = CallbackRegistry::new();
        let err = registry.register(&Value::Number(1.0)).unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { .. }));
        assert!(err.to_string().starts_with("type mismatch"));
        assert!(registry.is_empty());
    }

    #[test]
    fn first_handle_is_one() {
        let mut registry = CallbackRegistry::new();
        let handle = registry.register(&noop()).unwrap();
        assert_eq!(handle.raw(), 1);
        assert_eq!(registry.ref_count(1), Some(1));
    }

    #[test]
    fn release_at_zero_recycles() {
        let mut registry = CallbackRegistry::new();
        let a = registry.register(&noop()).unwrap();
        let _b = registry.register(&noop()).unwrap();

        assert_eq!(registry.retain(a.raw()).unwrap(), 2);
        assert_eq!(registry.release(a.raw()).unwrap(), 1);
        assert!(registry.get(a.raw()).is_ok());
        assert_eq!(registry.release(a.raw()).unwrap(), 0);
        assert!(matches!(
            registry.get(a.raw()),
            Err(BindError::StaleHandle { index: 1 })
        ));

        let c = registry.register(&noop()).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn sentinel_handle_is_rejected() {
        let mut registry = CallbackRegistry::new();
        assert!(registry.retain(0).is_err());
        assert!(registry.release(0).is_err());
        assert!(CallbackHandle::from_raw(0).is_none());
    }

    #[test]
    fn stale_slot_handle_is_detected() {
        let mut registry = CallbackRegistry::new();
        let h = registry.register(&noop()).unwrap();
        let slot = registry.slot_handle(h.raw()).unwrap();
        registry.release(h.raw()).unwrap();
        registry.register(&noop()).unwrap();
        assert!(registry.get_checked(slot).is_none());
    }
}
