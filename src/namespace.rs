//! The module namespace: classes and free functions exported to the host.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use wirebind_core::BindError;

use crate::class::BoundClass;
use crate::invoker::Invoker;
use crate::overload::MethodTable;

/// Everything a loaded module exports, by name.
#[derive(Debug, Default)]
pub struct ModuleNamespace {
    classes: RefCell<FxHashMap<String, Rc<BoundClass>>>,
    class_order: RefCell<Vec<String>>,
    functions: RefCell<MethodTable<Rc<Invoker>>>,
}

impl ModuleNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a class under its name. A later class of the same name wins.
    pub(crate) fn export_class(&self, class: Rc<BoundClass>) {
        let name = class.name().to_string();
        if self.classes.borrow_mut().insert(name.clone(), class).is_none() {
            self.class_order.borrow_mut().push(name);
        }
    }

    pub(crate) fn functions(&self) -> &RefCell<MethodTable<Rc<Invoker>>> {
        &self.functions
    }

    pub fn class(&self, name: &str) -> Option<Rc<BoundClass>> {
        self.classes.borrow().get(name).cloned()
    }

    /// Select the overload of free function `name` taking `arity` arguments.
    pub fn function(&self, name: &str, arity: usize) -> Result<Rc<Invoker>, BindError> {
        self.functions.borrow().resolve(name, arity)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.borrow().contains_key(name) || self.functions.borrow().contains(name)
    }

    /// Exported names: classes first, then functions, each in registration order.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.class_order.borrow().clone();
        names.extend(self.functions.borrow().names().map(str::to_string));
        names
    }
}

#[cfg(test)]
mod tests {
    use wirebind_core::{ClassIndex, TypeId};

    use super::*;
    use crate::class::ClassIds;

    fn class(name: &str, index: u32) -> Rc<BoundClass> {
        Rc::new(BoundClass::new(
            name,
            ClassIndex(index),
            ClassIds {
                value: TypeId(index * 3),
                pointer: TypeId(index * 3 + 1),
                const_pointer: TypeId(index * 3 + 2),
            },
        ))
    }

    #[test]
    fn exports_in_order() {
        let ns = ModuleNamespace::new();
        ns.export_class(class("B", 1));
        ns.export_class(class("A", 2));
        assert_eq!(ns.names(), vec!["B".to_string(), "A".to_string()]);
        assert!(ns.contains("A"));
        assert!(!ns.contains("C"));
    }

    #[test]
    fn later_class_wins() {
        let ns = ModuleNamespace::new();
        ns.export_class(class("A", 1));
        ns.export_class(class("A", 2));
        assert_eq!(ns.class("A").unwrap().index(), ClassIndex(2));
        assert_eq!(ns.names().len(), 1);
    }

    #[test]
    fn missing_function() {
        let ns = ModuleNamespace::new();
        assert_eq!(
            ns.function("f", 0).unwrap_err(),
            BindError::UndefinedMember("f".into())
        );
    }
}
