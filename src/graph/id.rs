//! Entity identity (spec.md §9 "Cyclic ownership... arena + indices").
//! All entities live in type-homogeneous arenas keyed by a stable id;
//! edges store ids, never references, so the graph has no lifetime
//! parameter and no reference cycles for the borrow checker to untangle.

use std::fmt;

/// Discriminates which arena an [`EntityId`] indexes into. Kept as part
/// of the id itself (rather than relying on callers to track it) so a
/// stale or mistyped id shows up clearly in `Error::EntityNotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Debugger,
    Session,
    Thread,
    Stack,
    Frame,
    Scope,
    Variable,
    Source,
    SourceBinding,
    Breakpoint,
    BreakpointBinding,
    ExceptionFilter,
    FilterBinding,
    Output,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Opaque handle to an entity. Comparable, hashable, `Copy`; carries no
/// borrow and outlives any particular graph transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId {
    kind: EntityKind,
    index: u64,
}

impl EntityId {
    pub(crate) fn new(kind: EntityKind, index: u64) -> Self {
        EntityId { kind, index }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The per-kind arena index. Used by the URI resolver's `:key`
    /// accessor as a fallback identifier for entities with no more
    /// natural key (spec.md §4.C.4).
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.index)
    }
}

/// Monotonic per-kind counter. One lives in each arena; ids it mints are
/// never reused, so a stale `EntityId` can never alias a live entity.
#[derive(Default)]
pub(crate) struct IdMinter {
    next: std::cell::Cell<u64>,
}

impl IdMinter {
    pub(crate) fn mint(&self, kind: EntityKind) -> EntityId {
        let index = self.next.get();
        self.next.set(index + 1);
        EntityId::new(kind, index)
    }
}
