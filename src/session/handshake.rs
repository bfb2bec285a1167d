//! DAP handshake and breakpoint/exception-filter resync (spec.md §4.B
//! "Handshake sequence", "Breakpoint resync"). Grounded on the teacher's
//! own multi-step `initialize`→`launch`→`configurationDone` sequencing
//! (`src/dap/yadap/mod.rs`, read in an earlier pass), generalized from
//! its one hard-coded adapter to an arbitrary caller-supplied launch or
//! attach payload.

use crate::error::Error;
use crate::graph::entities::{BreakpointBinding, FilterBinding, Source, SessionState, SourceOrigin};
use crate::graph::{transaction, EntityId, GraphStore};
use crate::runtime::Scope;
use crate::transport::{Channel, Client};
use serde_json::{json, Value};
use std::rc::Rc;

/// How a session is told to start (spec.md §4.B step 2: "Send `launch`
/// or `attach` (chosen by caller)").
pub enum StartMethod {
    Launch(Value),
    Attach(Value),
}

/// Runs the full handshake for `session` to completion, transitioning it
/// through `initializing → initialized → running`, or to `failed` if any
/// step is rejected (spec.md §4.B "Failure semantics").
pub async fn run<W: Channel + 'static>(store: Rc<GraphStore>, session: EntityId, scope: &Scope, client: &Client<W>, adapter_type: &str, start: StartMethod) -> Result<(), Error> {
    let init_args = json!({
        "clientID": "dap-core",
        "adapterID": adapter_type,
        "linesStartAt1": true,
        "columnsStartAt1": true,
        "supportsStartDebuggingRequest": true,
        "supportsRunInTerminalRequest": true,
    });

    if let Err(e) = client.call(scope, "initialize", init_args).await {
        fail(&store, session);
        return Err(e);
    }

    transaction(|| {
        let _ = store.sessions.with(session, |s| s.state.set(SessionState::Initialized));
    });

    let launch = match start {
        StartMethod::Launch(args) => client.call(scope, "launch", args).await,
        StartMethod::Attach(args) => client.call(scope, "attach", args).await,
    };
    if let Err(e) = launch {
        fail(&store, session);
        return Err(e);
    }

    resync_all_breakpoints(&store, session, scope, client).await?;
    resync_exception_filters(&store, session, scope, client, adapter_type).await?;
    client.call(scope, "configurationDone", Value::Null).await?;

    transaction(|| {
        let _ = store.sessions.with(session, |s| s.state.set(SessionState::Running));
    });
    Ok(())
}

fn fail(store: &GraphStore, session: EntityId) {
    transaction(|| {
        let _ = store.sessions.with(session, |s| s.state.set(SessionState::Failed));
    });
}

/// Sends the complete `setBreakpoints` payload for every source that has
/// at least one Breakpoint or is pathless, grouped per source (spec.md
/// §4.B step 3a, "Breakpoint resync" — "It never sends a partial update").
pub async fn resync_all_breakpoints<W: Channel + 'static>(store: &Rc<GraphStore>, session: EntityId, scope: &Scope, client: &Client<W>) -> Result<(), Error> {
    let mut by_source: Vec<EntityId> = Vec::new();
    for bp in store.debugger.breakpoints.iter() {
        let source = store.breakpoints.with(bp, |b| b.location.source)?;
        if !by_source.contains(&source) {
            by_source.push(source);
        }
    }
    for source in by_source {
        resync_source(store, session, scope, client, source).await?;
    }
    Ok(())
}

/// Resends the full `setBreakpoints` payload for `source` to `session`
/// (spec.md §4.B "Breakpoint resync"). Used both by the initial handshake
/// and by `SessionSupervisor` when a Breakpoint changes at the Debugger
/// level.
pub async fn resync_source<W: Channel + 'static>(store: &Rc<GraphStore>, session: EntityId, scope: &Scope, client: &Client<W>, source: EntityId) -> Result<(), Error> {
    let breakpoints: Vec<EntityId> = store
        .debugger
        .breakpoints
        .iter()
        .into_iter()
        .filter(|bp| store.breakpoints.with(*bp, |b| b.location.source == source).unwrap_or(false))
        .collect();

    let mut payload = Vec::with_capacity(breakpoints.len());
    for bp in &breakpoints {
        store.breakpoints.with(*bp, |b| {
            let mut entry = json!({ "line": b.location.line });
            if let Some(col) = b.location.column {
                entry["column"] = json!(col);
            }
            if let Some(cond) = b.condition.get() {
                entry["condition"] = json!(cond);
            }
            if let Some(hc) = b.hit_condition.get() {
                entry["hitCondition"] = json!(hc);
            }
            if let Some(lm) = b.log_message.get() {
                entry["logMessage"] = json!(lm);
            }
            payload.push(entry);
        })?;
    }

    let source_descriptor = store.sources.with(source, |s| source_descriptor(s))?;
    let body = client
        .call(scope, "setBreakpoints", json!({ "source": source_descriptor, "breakpoints": payload }))
        .await?;

    let returned = body.get("breakpoints").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    transaction(|| {
        for (bp, result) in breakpoints.iter().zip(returned.iter()) {
            let binding = find_or_create_binding(store, session, *bp);
            let verified = result.get("verified").and_then(|v| v.as_bool()).unwrap_or(false);
            let line = result.get("line").and_then(|v| v.as_i64());
            let column = result.get("column").and_then(|v| v.as_i64());
            let adapter_id = result.get("id").and_then(|v| v.as_i64());
            let _ = store.breakpoint_bindings.with(binding, |b| {
                b.verified.set(verified);
                b.actual_line.set(line);
                b.actual_column.set(column);
                b.adapter_id.set(adapter_id);
            });
        }
    });
    Ok(())
}

fn source_descriptor(source: &Source) -> Value {
    match source.origin.get() {
        SourceOrigin::Path(p) => json!({ "path": p }),
        SourceOrigin::Reference { .. } => {
            json!({ "name": source.name.get(), "sourceReference": source.source_reference.get() })
        }
        SourceOrigin::Name(n) => json!({ "name": n }),
    }
}

fn find_or_create_binding(store: &GraphStore, session: EntityId, breakpoint: EntityId) -> EntityId {
    let existing = store
        .breakpoints
        .with(breakpoint, |b| b.bindings.iter())
        .unwrap_or_default()
        .into_iter()
        .find(|binding| store.breakpoint_bindings.with(*binding, |b| b.session == session).unwrap_or(false));
    if let Some(id) = existing {
        return id;
    }
    let id = store.breakpoint_bindings.insert(store.minter(), BreakpointBinding::new(session, breakpoint));
    let _ = store.breakpoints.with(breakpoint, |b| b.bindings.link(id));
    let _ = store.sessions.with(session, |s| s.bindings.link(id));
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entities::{Breakpoint, BreakpointLocation, Session};

    #[test]
    fn source_descriptor_reflects_the_origin_variant() {
        let path_source = Source::new("k1", SourceOrigin::Path("/a.rs".into()), "a.rs");
        assert_eq!(source_descriptor(&path_source), json!({ "path": "/a.rs" }));

        let name_source = Source::new("k2", SourceOrigin::Name("eval".into()), "eval");
        assert_eq!(source_descriptor(&name_source), json!({ "name": "eval" }));

        let ref_source = Source::new("k3", SourceOrigin::Reference { hash: "h".into() }, "eval");
        ref_source.source_reference.set(Some(9));
        assert_eq!(source_descriptor(&ref_source), json!({ "name": "eval", "sourceReference": 9 }));
    }

    #[test]
    fn find_or_create_binding_reuses_an_existing_binding_for_the_same_session() {
        let store = GraphStore::new();
        let session = store.sessions.insert(store.minter(), Session::new("launch", "launch", None));
        let source = store.sources.insert(store.minter(), Source::new("k", SourceOrigin::Path("/a.rs".into()), "a.rs"));
        let bp = store.breakpoints.insert(store.minter(), Breakpoint::new(BreakpointLocation { source, line: 1, column: None }));

        let first = find_or_create_binding(&store, session, bp);
        let second = find_or_create_binding(&store, session, bp);
        assert_eq!(first, second);
        assert_eq!(store.breakpoints.with(bp, |b| b.bindings.count()).unwrap(), 1);
    }

    #[test]
    fn find_or_create_binding_makes_a_separate_binding_per_session() {
        let store = GraphStore::new();
        let session_a = store.sessions.insert(store.minter(), Session::new("a", "launch", None));
        let session_b = store.sessions.insert(store.minter(), Session::new("b", "launch", None));
        let source = store.sources.insert(store.minter(), Source::new("k", SourceOrigin::Path("/a.rs".into()), "a.rs"));
        let bp = store.breakpoints.insert(store.minter(), Breakpoint::new(BreakpointLocation { source, line: 1, column: None }));

        let binding_a = find_or_create_binding(&store, session_a, bp);
        let binding_b = find_or_create_binding(&store, session_b, bp);
        assert_ne!(binding_a, binding_b);
        assert_eq!(store.breakpoints.with(bp, |b| b.bindings.count()).unwrap(), 2);
    }
}

/// Sends `setExceptionBreakpoints` with the ids of every enabled
/// `ExceptionFilter` registered for `adapter_type` (spec.md §4.B step 3b).
pub async fn resync_exception_filters<W: Channel + 'static>(store: &Rc<GraphStore>, session: EntityId, scope: &Scope, client: &Client<W>, adapter_type: &str) -> Result<(), Error> {
    let filters: Vec<EntityId> = store
        .debugger
        .exception_filters
        .iter()
        .into_iter()
        .filter(|f| {
            store
                .exception_filters
                .with(*f, |filter| filter.adapter_type == adapter_type && filter.enabled.get())
                .unwrap_or(false)
        })
        .collect();

    let filter_ids: Vec<String> = filters
        .iter()
        .map(|f| store.exception_filters.with(*f, |filter| filter.filter_id.clone()).unwrap_or_default())
        .collect();

    client.call(scope, "setExceptionBreakpoints", json!({ "filters": filter_ids })).await?;

    transaction(|| {
        for filter in filters {
            let already_bound = store
                .exception_filters
                .with(filter, |f| f.bindings.iter())
                .unwrap_or_default()
                .into_iter()
                .any(|b| store.filter_bindings.with(b, |fb| fb.session == session).unwrap_or(false));
            if !already_bound {
                let binding = store.filter_bindings.insert(store.minter(), FilterBinding::new(session, filter));
                let _ = store.exception_filters.with(filter, |f| f.bindings.link(binding));
                let _ = store.sessions.with(session, |s| s.filter_bindings.link(binding));
            }
        }
    });
    Ok(())
}
