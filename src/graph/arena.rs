//! Typed arena storage (spec.md §9 "arena + indices"). One `Arena<T>`
//! per entity type, holding `IndexMap<EntityId, T>` so iteration order
//! is stable without a separate sort pass — useful for edges that track
//! insertion order directly.

use crate::error::Error;
use crate::graph::id::{EntityId, EntityKind, IdMinter};
use indexmap::IndexMap;
use std::cell::RefCell;

pub struct Arena<T> {
    kind: EntityKind,
    items: RefCell<IndexMap<EntityId, T>>,
}

impl<T> Arena<T> {
    pub fn new(kind: EntityKind) -> Self {
        Arena {
            kind,
            items: RefCell::new(IndexMap::new()),
        }
    }

    pub fn insert(&self, minter: &IdMinter, value: T) -> EntityId {
        let id = minter.mint(self.kind);
        self.items.borrow_mut().insert(id, value);
        id
    }

    pub fn remove(&self, id: EntityId) -> Option<T> {
        self.items.borrow_mut().shift_remove(&id)
    }

    pub fn with<R>(&self, id: EntityId, f: impl FnOnce(&T) -> R) -> Result<R, Error> {
        self.items.borrow().get(&id).map(f).ok_or(Error::EntityNotFound(id))
    }

    pub fn with_mut<R>(&self, id: EntityId, f: impl FnOnce(&mut T) -> R) -> Result<R, Error> {
        self.items.borrow_mut().get_mut(&id).map(f).ok_or(Error::EntityNotFound(id))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.items.borrow().contains_key(&id)
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.items.borrow().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}
