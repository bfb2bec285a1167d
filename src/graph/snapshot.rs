//! Snapshot DTOs (SPEC_FULL.md §4.C.5). `query(uri)` materializes graph
//! state for a consumer outside the graph; these types fix what that
//! materialization looks like, mirrored 1:1 from the entity attribute
//! tables in spec.md §3.1.

use crate::graph::entities::{ScopeKind, SessionState, SourceOrigin, ThreadState};
use crate::graph::id::EntityId;
use serde::Serialize;

fn id_str(id: EntityId) -> String {
    format!("{:?}", id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum EntitySnapshot {
    Session(SessionSnapshot),
    Thread(ThreadSnapshot),
    Stack(StackSnapshot),
    Frame(FrameSnapshot),
    Scope(ScopeSnapshot),
    Variable(VariableSnapshot),
    Source(SourceSnapshot),
    Breakpoint(BreakpointSnapshot),
    ExceptionFilter(ExceptionFilterSnapshot),
    Output(OutputSnapshot),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub name: String,
    pub state: SessionState,
    pub start_method: String,
    pub is_auto_attached: bool,
    pub process_id: Option<i64>,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadSnapshot {
    pub id: String,
    pub dap_id: i64,
    pub session: String,
    pub state: ThreadState,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StackSnapshot {
    pub id: String,
    pub sequence: i64,
    pub thread: String,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub id: String,
    pub index: i64,
    pub name: String,
    pub line: i64,
    pub column: i64,
    pub stack: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeSnapshot {
    pub id: String,
    pub kind: ScopeKind,
    pub name: String,
    pub variables_reference: i64,
    pub expensive: bool,
    pub frame: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableSnapshot {
    pub id: String,
    pub name: String,
    pub value: String,
    pub type_name: Option<String>,
    pub variables_reference: i64,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSnapshot {
    pub id: String,
    pub correlation_key: String,
    pub origin: SourceOriginSnapshot,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SourceOriginSnapshot {
    Path { path: String },
    Reference { hash: String },
    Name { name: String },
}

impl From<&SourceOrigin> for SourceOriginSnapshot {
    fn from(origin: &SourceOrigin) -> Self {
        match origin {
            SourceOrigin::Path(p) => SourceOriginSnapshot::Path { path: p.clone() },
            SourceOrigin::Reference { hash } => SourceOriginSnapshot::Reference { hash: hash.clone() },
            SourceOrigin::Name(n) => SourceOriginSnapshot::Name { name: n.clone() },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakpointSnapshot {
    pub id: String,
    pub source: String,
    pub line: i64,
    pub column: Option<i64>,
    pub enabled: bool,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExceptionFilterSnapshot {
    pub id: String,
    pub adapter_type: String,
    pub filter_id: String,
    pub label: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputSnapshot {
    pub id: String,
    pub sequence: i64,
    pub session: String,
    pub category: String,
    pub content: String,
    pub source: Option<String>,
    pub line: Option<i64>,
}

pub(crate) use id_str as format_id;
