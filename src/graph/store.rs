//! The graph store: one arena per entity type plus the singleton
//! `Debugger` entity that owns the top-level edges (spec.md §3.1, §3.3
//! "Ownership"). This is the root consumers reach every other entity
//! through.

use crate::error::Error;
use crate::graph::arena::Arena;
use crate::graph::entities::{self, Debugger};
use crate::graph::id::{EntityId, EntityKind, IdMinter};
use crate::graph::snapshot::*;

pub struct GraphStore {
    minter: IdMinter,
    pub debugger: Debugger,
    pub sessions: Arena<entities::Session>,
    pub threads: Arena<entities::Thread>,
    pub stacks: Arena<entities::Stack>,
    pub frames: Arena<entities::Frame>,
    pub scopes: Arena<entities::Scope>,
    pub variables: Arena<entities::Variable>,
    pub sources: Arena<entities::Source>,
    pub source_bindings: Arena<entities::SourceBinding>,
    pub breakpoints: Arena<entities::Breakpoint>,
    pub breakpoint_bindings: Arena<entities::BreakpointBinding>,
    pub exception_filters: Arena<entities::ExceptionFilter>,
    pub filter_bindings: Arena<entities::FilterBinding>,
    pub outputs: Arena<entities::Output>,
}

impl GraphStore {
    pub fn new() -> Self {
        GraphStore {
            minter: IdMinter::default(),
            debugger: Debugger::new(),
            sessions: Arena::new(EntityKind::Session),
            threads: Arena::new(EntityKind::Thread),
            stacks: Arena::new(EntityKind::Stack),
            frames: Arena::new(EntityKind::Frame),
            scopes: Arena::new(EntityKind::Scope),
            variables: Arena::new(EntityKind::Variable),
            sources: Arena::new(EntityKind::Source),
            source_bindings: Arena::new(EntityKind::SourceBinding),
            breakpoints: Arena::new(EntityKind::Breakpoint),
            breakpoint_bindings: Arena::new(EntityKind::BreakpointBinding),
            exception_filters: Arena::new(EntityKind::ExceptionFilter),
            filter_bindings: Arena::new(EntityKind::FilterBinding),
            outputs: Arena::new(EntityKind::Output),
        }
    }

    pub fn minter(&self) -> &IdMinter {
        &self.minter
    }

    /// Finds an existing Source by correlation key (spec.md §4.B "Source
    /// correlation", §8 invariant 2 — same key, same entity).
    pub fn find_source_by_key(&self, key: &str) -> Option<EntityId> {
        self.sources
            .ids()
            .into_iter()
            .find(|id| self.sources.with(*id, |s| s.correlation_key == key).unwrap_or(false))
    }

    /// Materializes one entity as a `query(uri)` snapshot DTO (SPEC_FULL.md
    /// §4.C.5). Returns `EntityNotFound` if `id` no longer resolves.
    pub fn snapshot(&self, id: EntityId) -> Result<EntitySnapshot, Error> {
        match id.kind() {
            EntityKind::Session => self.sessions.with(id, |s| {
                EntitySnapshot::Session(SessionSnapshot {
                    id: format_id(id),
                    name: s.name.get(),
                    state: s.state.get(),
                    start_method: s.start_method.get(),
                    is_auto_attached: s.is_auto_attached.get(),
                    process_id: s.process_id.get(),
                    parent: s.parent.get().map(format_id),
                })
            }),
            EntityKind::Thread => self.threads.with(id, |t| {
                EntitySnapshot::Thread(ThreadSnapshot {
                    id: format_id(id),
                    dap_id: t.dap_id,
                    session: format_id(t.session),
                    state: t.state.get(),
                    stop_reason: t.stop_reason.get(),
                })
            }),
            EntityKind::Stack => self.stacks.with(id, |s| {
                EntitySnapshot::Stack(StackSnapshot {
                    id: format_id(id),
                    sequence: s.sequence,
                    thread: format_id(s.thread),
                    valid: s.valid.get(),
                })
            }),
            EntityKind::Frame => self.frames.with(id, |f| {
                EntitySnapshot::Frame(FrameSnapshot {
                    id: format_id(id),
                    index: f.index,
                    name: f.name.get(),
                    line: f.line.get(),
                    column: f.column.get(),
                    stack: format_id(f.stack),
                    source: f.source.get().map(format_id),
                })
            }),
            EntityKind::Scope => self.scopes.with(id, |s| {
                EntitySnapshot::Scope(ScopeSnapshot {
                    id: format_id(id),
                    kind: s.kind,
                    name: s.name.clone(),
                    variables_reference: s.variables_reference,
                    expensive: s.expensive,
                    frame: format_id(s.frame),
                })
            }),
            EntityKind::Variable => self.variables.with(id, |v| {
                EntitySnapshot::Variable(VariableSnapshot {
                    id: format_id(id),
                    name: v.name.clone(),
                    value: v.value.get(),
                    type_name: v.type_name.get(),
                    variables_reference: v.variables_reference,
                    scope: format_id(v.scope),
                })
            }),
            EntityKind::Source => self.sources.with(id, |s| {
                EntitySnapshot::Source(SourceSnapshot {
                    id: format_id(id),
                    correlation_key: s.correlation_key.clone(),
                    origin: SourceOriginSnapshot::from(&s.origin.get()),
                    name: s.name.get(),
                })
            }),
            EntityKind::Breakpoint => self.breakpoints.with(id, |b| {
                EntitySnapshot::Breakpoint(BreakpointSnapshot {
                    id: format_id(id),
                    source: format_id(b.location.source),
                    line: b.location.line,
                    column: b.location.column,
                    enabled: b.enabled.get(),
                    condition: b.condition.get(),
                    hit_condition: b.hit_condition.get(),
                    log_message: b.log_message.get(),
                })
            }),
            EntityKind::ExceptionFilter => self.exception_filters.with(id, |f| {
                EntitySnapshot::ExceptionFilter(ExceptionFilterSnapshot {
                    id: format_id(id),
                    adapter_type: f.adapter_type.clone(),
                    filter_id: f.filter_id.clone(),
                    label: f.label.clone(),
                    enabled: f.enabled.get(),
                })
            }),
            EntityKind::Output => self.outputs.with(id, |o| {
                EntitySnapshot::Output(OutputSnapshot {
                    id: format_id(id),
                    sequence: o.sequence,
                    session: format_id(o.session),
                    category: o.category.clone(),
                    content: o.content.clone(),
                    source: o.source.map(format_id),
                    line: o.line,
                })
            }),
            EntityKind::Debugger | EntityKind::SourceBinding | EntityKind::BreakpointBinding | EntityKind::FilterBinding => {
                Err(Error::EntityNotFound(id))
            }
        }
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        GraphStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entities::{BreakpointLocation, SourceOrigin};

    #[test]
    fn find_source_by_key_returns_the_matching_id() {
        let store = GraphStore::new();
        let a = store.sources.insert(store.minter(), entities::Source::new("key-a", SourceOrigin::Path("/a.rs".into()), "a.rs"));
        let _b = store.sources.insert(store.minter(), entities::Source::new("key-b", SourceOrigin::Path("/b.rs".into()), "b.rs"));
        assert_eq!(store.find_source_by_key("key-a"), Some(a));
        assert_eq!(store.find_source_by_key("missing"), None);
    }

    #[test]
    fn snapshot_of_a_session_reflects_current_signal_values() {
        let store = GraphStore::new();
        let session_id = store.sessions.insert(store.minter(), entities::Session::new("launch", "launch", None));
        store.sessions.with(session_id, |s| s.process_id.set(Some(42))).unwrap();

        let snap = store.snapshot(session_id).unwrap();
        match snap {
            EntitySnapshot::Session(s) => {
                assert_eq!(s.process_id, Some(42));
                assert_eq!(s.state, entities::SessionState::Initializing);
            }
            _ => panic!("expected a session snapshot"),
        }
    }

    #[test]
    fn snapshot_of_a_breakpoint_reports_its_location() {
        let store = GraphStore::new();
        let source = store.sources.insert(store.minter(), entities::Source::new("key", SourceOrigin::Path("/a.rs".into()), "a.rs"));
        let bp = store.breakpoints.insert(
            store.minter(),
            entities::Breakpoint::new(BreakpointLocation {
                source,
                line: 10,
                column: None,
            }),
        );

        let snap = store.snapshot(bp).unwrap();
        match snap {
            EntitySnapshot::Breakpoint(b) => {
                assert_eq!(b.line, 10);
                assert!(b.enabled);
            }
            _ => panic!("expected a breakpoint snapshot"),
        }
    }

    #[test]
    fn snapshot_of_an_unresolvable_id_is_an_error() {
        let store = GraphStore::new();
        let session_id = store.sessions.insert(store.minter(), entities::Session::new("launch", "launch", None));
        store.sessions.remove(session_id);
        assert!(matches!(store.snapshot(session_id), Err(Error::EntityNotFound(_))));
    }
}
