use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// Inherited key/value map carried by a scope. `Scope::with` returns a
/// child scope whose `ContextMap` chains to its parent's, so a lookup
/// walks up the scope tree until it finds a binding or runs out of
/// ancestors.
#[derive(Clone, Default)]
pub struct ContextMap {
    local: Rc<HashMap<&'static str, Rc<dyn Any>>>,
    parent: Option<Box<ContextMap>>,
}

impl ContextMap {
    pub fn child_with(&self, key: &'static str, value: Rc<dyn Any>) -> ContextMap {
        let mut local = HashMap::with_capacity(1);
        local.insert(key, value);
        ContextMap {
            local: Rc::new(local),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn get(&self, key: &'static str) -> Option<Rc<dyn Any>> {
        if let Some(v) = self.local.get(key) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(key))
    }

    pub fn get_typed<T: 'static>(&self, key: &'static str) -> Option<Rc<T>> {
        self.get(key).and_then(|v| v.downcast::<T>().ok())
    }
}
