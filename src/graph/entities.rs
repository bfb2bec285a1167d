//! Entity types (spec.md §3.1). Scalar attributes that can change after
//! creation are [`Signal`]s; links to other entities are [`Edge`]s;
//! attributes fixed at creation (ids, sequence numbers) are plain
//! fields. Deep inheritance in the source's scope/source subclasses
//! collapses into capability fields (`kind`, `origin`) per spec.md §9.

use crate::graph::edge::Edge;
use crate::graph::id::EntityId;
use crate::graph::signal::Signal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Initializing,
    Initialized,
    Running,
    Stopped,
    Failed,
    Terminated,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadState {
    Running,
    Stopped,
    Exited,
}

pub struct Debugger {
    pub sessions: Edge,
    pub breakpoints: Edge,
    pub sources: Edge,
    pub exception_filters: Edge,
}

impl Debugger {
    pub fn new() -> Self {
        Debugger {
            sessions: Edge::unsorted(),
            breakpoints: Edge::unsorted(),
            sources: Edge::unsorted(),
            exception_filters: Edge::unsorted(),
        }
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Debugger::new()
    }
}

pub struct Session {
    pub dap_id: Signal<Option<i64>>,
    pub name: Signal<String>,
    pub state: Signal<SessionState>,
    pub start_method: Signal<String>,
    pub is_auto_attached: Signal<bool>,
    pub process_id: Signal<Option<i64>>,
    pub parent: Signal<Option<EntityId>>,
    pub threads: Edge,
    pub outputs: Edge,
    pub source_bindings: Edge,
    pub bindings: Edge,
    pub filter_bindings: Edge,
    pub children: Edge,
}

impl Session {
    pub fn new(name: impl Into<String>, start_method: impl Into<String>, parent: Option<EntityId>) -> Self {
        Session {
            dap_id: Signal::new(None),
            name: Signal::new(name.into()),
            state: Signal::new(SessionState::Initializing),
            start_method: Signal::new(start_method.into()),
            is_auto_attached: Signal::new(parent.is_some()),
            process_id: Signal::new(None),
            parent: Signal::new(parent),
            threads: Edge::unsorted(),
            outputs: Edge::sorted(),
            source_bindings: Edge::unsorted(),
            bindings: Edge::unsorted(),
            filter_bindings: Edge::unsorted(),
            children: Edge::unsorted(),
        }
    }
}

pub struct Thread {
    pub dap_id: i64,
    pub session: EntityId,
    pub state: Signal<ThreadState>,
    pub stop_reason: Signal<Option<String>>,
    /// Sorted by sequence; `[0]` (`nth_from_end(0)`) is always the
    /// newest stack (spec.md §3.1, §3.2 invariant 2).
    pub stacks: Edge,
}

impl Thread {
    pub fn new(dap_id: i64, session: EntityId) -> Self {
        Thread {
            dap_id,
            session,
            state: Signal::new(ThreadState::Running),
            stop_reason: Signal::new(None),
            stacks: Edge::sorted(),
        }
    }
}

pub struct Stack {
    pub sequence: i64,
    pub thread: EntityId,
    pub valid: Signal<bool>,
    /// Sorted by ascending index; `[0]` is the innermost (top) frame.
    pub frames: Edge,
}

impl Stack {
    pub fn new(sequence: i64, thread: EntityId) -> Self {
        Stack {
            sequence,
            thread,
            valid: Signal::new(true),
            frames: Edge::sorted(),
        }
    }
}

pub struct Frame {
    pub dap_id: i64,
    pub index: i64,
    pub name: Signal<String>,
    pub line: Signal<i64>,
    pub column: Signal<i64>,
    pub stack: EntityId,
    pub source: Signal<Option<EntityId>>,
    pub scopes: Edge,
    pub scopes_fetched: Signal<bool>,
}

impl Frame {
    pub fn new(dap_id: i64, index: i64, name: impl Into<String>, line: i64, column: i64, stack: EntityId, source: Option<EntityId>) -> Self {
        Frame {
            dap_id,
            index,
            name: Signal::new(name.into()),
            line: Signal::new(line),
            column: Signal::new(column),
            stack,
            source: Signal::new(source),
            scopes: Edge::sorted(),
            scopes_fetched: Signal::new(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    Arguments,
    Locals,
    Globals,
    Registers,
    ReturnValue,
    Generic,
}

pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
    pub presentation_hint: Signal<Option<String>>,
    pub variables_reference: i64,
    pub expensive: bool,
    pub frame: EntityId,
    pub variables: Edge,
    pub variables_fetched: Signal<bool>,
}

impl Scope {
    pub fn new(kind: ScopeKind, name: impl Into<String>, variables_reference: i64, expensive: bool, frame: EntityId) -> Self {
        Scope {
            kind,
            name: name.into(),
            presentation_hint: Signal::new(None),
            variables_reference,
            expensive,
            frame,
            variables: Edge::sorted(),
            variables_fetched: Signal::new(false),
        }
    }
}

pub struct Variable {
    pub name: String,
    pub value: Signal<String>,
    pub type_name: Signal<Option<String>>,
    pub evaluate_name: Option<String>,
    pub variables_reference: i64,
    pub scope: EntityId,
    pub variables: Edge,
    pub variables_fetched: Signal<bool>,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>, variables_reference: i64, scope: EntityId) -> Self {
        Variable {
            name: name.into(),
            value: Signal::new(value.into()),
            type_name: Signal::new(None),
            evaluate_name: None,
            variables_reference,
            scope,
            variables: Edge::sorted(),
            variables_fetched: Signal::new(false),
        }
    }
}

/// Collapses FileSource / VirtualSource / GenericSource into one
/// sum-typed `origin` attribute (spec.md §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    Path(String),
    Reference { hash: String },
    Name(String),
}

pub struct Source {
    pub correlation_key: String,
    pub origin: Signal<SourceOrigin>,
    pub source_reference: Signal<Option<i64>>,
    pub name: Signal<String>,
    pub checksums: Signal<Vec<String>>,
    pub content_hash: Signal<Option<String>>,
    pub bindings: Edge,
}

impl Source {
    pub fn new(correlation_key: impl Into<String>, origin: SourceOrigin, name: impl Into<String>) -> Self {
        Source {
            correlation_key: correlation_key.into(),
            origin: Signal::new(origin),
            source_reference: Signal::new(None),
            name: Signal::new(name.into()),
            checksums: Signal::new(Vec::new()),
            content_hash: Signal::new(None),
            bindings: Edge::unsorted(),
        }
    }
}

pub struct SourceBinding {
    pub session: EntityId,
    pub source: EntityId,
}

impl SourceBinding {
    pub fn new(session: EntityId, source: EntityId) -> Self {
        SourceBinding { session, source }
    }
}

#[derive(Debug, Clone)]
pub struct BreakpointLocation {
    pub source: EntityId,
    pub line: i64,
    pub column: Option<i64>,
}

pub struct Breakpoint {
    pub location: BreakpointLocation,
    pub enabled: Signal<bool>,
    pub condition: Signal<Option<String>>,
    pub hit_condition: Signal<Option<String>>,
    pub log_message: Signal<Option<String>>,
    pub bindings: Edge,
}

impl Breakpoint {
    pub fn new(location: BreakpointLocation) -> Self {
        Breakpoint {
            location,
            enabled: Signal::new(true),
            condition: Signal::new(None),
            hit_condition: Signal::new(None),
            log_message: Signal::new(None),
            bindings: Edge::unsorted(),
        }
    }
}

pub struct BreakpointBinding {
    pub session: EntityId,
    pub breakpoint: EntityId,
    /// The id the adapter assigned this binding in its `setBreakpoints`
    /// response, used to correlate later `breakpoint` events back to the
    /// binding they update (spec.md §4.B event translation table).
    pub adapter_id: Signal<Option<i64>>,
    pub verified: Signal<bool>,
    pub hit: Signal<bool>,
    pub actual_line: Signal<Option<i64>>,
    pub actual_column: Signal<Option<i64>>,
}

impl BreakpointBinding {
    pub fn new(session: EntityId, breakpoint: EntityId) -> Self {
        BreakpointBinding {
            session,
            breakpoint,
            adapter_id: Signal::new(None),
            verified: Signal::new(false),
            hit: Signal::new(false),
            actual_line: Signal::new(None),
            actual_column: Signal::new(None),
        }
    }
}

pub struct ExceptionFilter {
    pub adapter_type: String,
    pub filter_id: String,
    pub label: String,
    pub enabled: Signal<bool>,
    pub bindings: Edge,
}

impl ExceptionFilter {
    pub fn new(adapter_type: impl Into<String>, filter_id: impl Into<String>, label: impl Into<String>, enabled: bool) -> Self {
        ExceptionFilter {
            adapter_type: adapter_type.into(),
            filter_id: filter_id.into(),
            label: label.into(),
            enabled: Signal::new(enabled),
            bindings: Edge::unsorted(),
        }
    }
}

pub struct FilterBinding {
    pub session: EntityId,
    pub filter: EntityId,
    pub hit: Signal<bool>,
}

impl FilterBinding {
    pub fn new(session: EntityId, filter: EntityId) -> Self {
        FilterBinding {
            session,
            filter,
            hit: Signal::new(false),
        }
    }
}

pub struct Output {
    pub sequence: i64,
    pub session: EntityId,
    pub category: String,
    pub content: String,
    pub source: Option<EntityId>,
    pub line: Option<i64>,
}
