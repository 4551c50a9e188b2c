//! Per-module runtime configuration.

use wirebind_core::Endianness;

/// What to do when an overload is registered for an arity that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverloadCollision {
    /// Last registration wins silently.
    Overwrite,
    /// Last registration wins; the overwrite is logged and reported to the hook.
    #[default]
    Warn,
    /// The registration fails with a fatal error.
    Reject,
}

/// An overload replaced an existing branch of the same arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverloadCollisionEvent {
    /// Where the member lives: `module`, `Foo` (statics) or `Foo.prototype`.
    pub owner: String,
    pub name: String,
    pub arity: usize,
}

/// Configuration of a [`BindingContext`](crate::BindingContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingConfig {
    pub overload_collision: OverloadCollision,
    /// Byte order assumed until `registerEndianness` says otherwise.
    pub endianness: Endianness,
    /// Retry id misses through placeholder records.
    pub placeholder_indirection: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            overload_collision: OverloadCollision::default(),
            endianness: Endianness::Little,
            placeholder_indirection: true,
        }
    }
}

impl BindingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overload_collision(mut self, policy: OverloadCollision) -> Self {
        self.overload_collision = policy;
        self
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn with_placeholder_indirection(mut self, enabled: bool) -> Self {
        self.placeholder_indirection = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BindingConfig::default();
        assert_eq!(config.overload_collision, OverloadCollision::Warn);
        assert_eq!(config.endianness, Endianness::Little);
        assert!(config.placeholder_indirection);
    }

    #[test]
    fn builder() {
        let config = BindingConfig::new()
            .with_overload_collision(OverloadCollision::Reject)
            .with_endianness(Endianness::Big)
            .with_placeholder_indirection(false);
        assert_eq!(config.overload_collision, OverloadCollision::Reject);
        assert_eq!(config.endianness, Endianness::Big);
        assert!(!config.placeholder_indirection);
    }
}
