//! Arity-dispatched member tables.
//!
//! A name starts out bound to a single callable. Registering a second arity
//! under the same name promotes the binding to an [`OverloadSet`]; calls then
//! pick the branch whose arity equals the argument count. No argument-type
//! matching is performed.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use wirebind_core::BindError;

use crate::config::OverloadCollision;

/// Mapping from arity to callable.
#[derive(Debug, Clone)]
pub struct OverloadSet<F> {
    branches: BTreeMap<usize, F>,
}

impl<F> OverloadSet<F> {
    fn new() -> Self {
        Self {
            branches: BTreeMap::new(),
        }
    }

    /// Get the branch for an arity.
    pub fn get(&self, arity: usize) -> Option<&F> {
        self.branches.get(&arity)
    }

    /// Registered arities, ascending.
    pub fn arities(&self) -> impl Iterator<Item = usize> + '_ {
        self.branches.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

/// A name's binding: one callable, or an arity-keyed overload set.
#[derive(Debug, Clone)]
pub enum Bound<F> {
    Single { arity: usize, func: F },
    Overloaded(OverloadSet<F>),
}

/// How [`Bound::add`] changed a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The name was unbound.
    Bound,
    /// A single binding became an overload set.
    Promoted,
    /// A new arity joined an existing overload set.
    Extended,
    /// An existing branch of this arity was overwritten.
    Replaced,
}

impl<F> Bound<F> {
    pub fn single(func: F, arity: usize) -> Self {
        Bound::Single { arity, func }
    }

    /// Select the callable for a call with `arity` arguments.
    pub fn resolve(&self, arity: usize) -> Option<&F> {
        match self {
            Bound::Single { arity: a, func } if *a == arity => Some(func),
            Bound::Single { .. } => None,
            Bound::Overloaded(set) => set.get(arity),
        }
    }

    pub fn arities(&self) -> Vec<usize> {
        match self {
            Bound::Single { arity, .. } => vec![*arity],
            Bound::Overloaded(set) => set.arities().collect(),
        }
    }

    pub fn is_overloaded(&self) -> bool {
        matches!(self, Bound::Overloaded(_))
    }

    /// Add a callable, promoting a single binding to an overload set.
    pub fn add(&mut self, func: F, arity: usize) -> AddOutcome {
        let mut set = match std::mem::replace(self, Bound::Overloaded(OverloadSet::new())) {
            Bound::Overloaded(set) => set,
            Bound::Single { arity: existing, func: first } => {
                let mut set = OverloadSet::new();
                set.branches.insert(existing, first);
                let replaced = set.branches.insert(arity, func).is_some();
                *self = Bound::Overloaded(set);
                return if replaced {
                    AddOutcome::Replaced
                } else {
                    AddOutcome::Promoted
                };
            }
        };
        let outcome = match set.branches.insert(arity, func) {
            Some(_) => AddOutcome::Replaced,
            None => AddOutcome::Extended,
        };
        *self = Bound::Overloaded(set);
        outcome
    }
}

/// A getter/setter pair exposed as one property.
#[derive(Debug, Clone)]
pub struct Accessor<F> {
    pub getter: F,
    pub setter: Option<F>,
    pub configurable: bool,
    pub enumerable: bool,
}

/// One named entry of a member table.
#[derive(Debug, Clone)]
pub enum Member<F> {
    Method(Bound<F>),
    /// A setter waiting for its getter.
    PendingSetter(F),
    Accessor(Accessor<F>),
}

/// Named members of a class prototype, class statics or module namespace.
#[derive(Debug, Clone)]
pub struct MethodTable<F> {
    members: FxHashMap<String, Member<F>>,
    order: Vec<String>,
}

impl<F: Clone> MethodTable<F> {
    pub fn new() -> Self {
        Self {
            members: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    fn put(&mut self, name: &str, member: Member<F>) {
        if self.members.insert(name.to_string(), member).is_none() {
            self.order.push(name.to_string());
        }
    }

    /// Bind `func` under `name`, overloading any existing binding by arity.
    ///
    /// An existing branch of the same arity, or an accessor of the same name,
    /// is overwritten unless `collision` is [`OverloadCollision::Reject`], in
    /// which case the table is left untouched.
    pub fn add_method(
        &mut self,
        name: &str,
        func: F,
        arity: usize,
        collision: OverloadCollision,
    ) -> Result<AddOutcome, BindError> {
        let reject = |bound: &Bound<F>| {
            if collision == OverloadCollision::Reject && bound.resolve(arity).is_some() {
                Err(BindError::OverloadCollision {
                    name: name.to_string(),
                    arity,
                })
            } else {
                Ok(())
            }
        };

        match self.members.get_mut(name) {
            Some(Member::Method(bound)) => {
                reject(&*bound)?;
                Ok(bound.add(func, arity))
            }
            Some(Member::PendingSetter(setter)) => {
                // An unpaired setter behaves as a one-argument method.
                let mut bound = Bound::single(setter.clone(), 1);
                reject(&bound)?;
                let outcome = bound.add(func, arity);
                self.members.insert(name.to_string(), Member::Method(bound));
                Ok(outcome)
            }
            Some(Member::Accessor(_)) => {
                if collision == OverloadCollision::Reject {
                    return Err(BindError::OverloadCollision {
                        name: name.to_string(),
                        arity,
                    });
                }
                self.members
                    .insert(name.to_string(), Member::Method(Bound::single(func, arity)));
                Ok(AddOutcome::Replaced)
            }
            None => {
                self.put(name, Member::Method(Bound::single(func, arity)));
                Ok(AddOutcome::Bound)
            }
        }
    }

    /// Stash a setter under the bare property name until its getter arrives.
    pub fn stash_setter(&mut self, name: &str, setter: F) {
        self.put(name, Member::PendingSetter(setter));
    }

    /// Define a configurable, enumerable accessor, pairing the getter with a
    /// stashed setter of the same name if there is one.
    pub fn define_accessor(&mut self, name: &str, getter: F) {
        let setter = match self.members.get(name) {
            Some(Member::PendingSetter(setter)) => Some(setter.clone()),
            _ => None,
        };
        self.put(
            name,
            Member::Accessor(Accessor {
                getter,
                setter,
                configurable: true,
                enumerable: true,
            }),
        );
    }

    pub fn get(&self, name: &str) -> Option<&Member<F>> {
        self.members.get(name)
    }

    /// Select the callable of method `name` for a call with `arity` arguments.
    ///
    /// A missing member or arity is a lookup failure for the caller.
    pub fn resolve(&self, name: &str, arity: usize) -> Result<F, BindError> {
        match self.members.get(name) {
            Some(Member::Method(bound)) => {
                bound.resolve(arity).cloned().ok_or_else(|| BindError::NoOverload {
                    name: name.to_string(),
                    arity,
                })
            }
            Some(Member::PendingSetter(setter)) if arity == 1 => Ok(setter.clone()),
            Some(Member::PendingSetter(_)) => Err(BindError::NoOverload {
                name: name.to_string(),
                arity,
            }),
            Some(Member::Accessor(_)) | None => Err(BindError::UndefinedMember(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Member names in registration order, skipping non-enumerable accessors.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str).filter(|name| {
            !matches!(
                self.members.get(*name),
                Some(Member::Accessor(Accessor { enumerable: false, .. }))
            )
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<F: Clone> Default for MethodTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a property name from an accessor's native name.
///
/// A leading `get`/`set` (either case) followed by `_` or an uppercase letter
/// is removed. The next letter is lowercased unless it starts an acronym:
/// `getValue` is `value`, `get_value` is `value`, `getURL` is `URL`.
pub fn remove_accessor_prefix(name: &str) -> String {
    let Some(prefix) = name.get(..3) else {
        return name.to_string();
    };
    if !matches!(prefix, "get" | "Get" | "set" | "Set") {
        return name.to_string();
    }

    let rest = &name[3..];
    let rest = match rest.strip_prefix('_') {
        Some(stripped) => stripped,
        None if rest.starts_with(|c: char| c.is_ascii_uppercase()) => rest,
        None => return name.to_string(),
    };

    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (None, _) => name.to_string(),
        (Some(first), Some(second)) if first.is_ascii_uppercase() && second.is_ascii_uppercase() => {
            rest.to_string()
        }
        (Some(first), _) => {
            let mut out = String::with_capacity(rest.len());
            out.push(first.to_ascii_lowercase());
            out.push_str(&rest[first.len_utf8()..]);
            out
        }
    }
}
