//! Event translation (spec.md §4.B "Event translation"). Each handler's
//! graph mutations run inside one [`transaction`] so subscribers observe
//! a consistent snapshot; a handler that itself needs to call back into
//! the adapter (`stopped` → `stackTrace`) spawns a child task instead of
//! blocking the event-dispatch loop, matching the teacher's pattern of
//! never doing blocking work inside a callback (`src/dap/yadap/io.rs`,
//! read in an earlier pass, dispatched requests onto its own worker
//! rather than answering inline).

use crate::error::Error;
use crate::graph::entities::{
    BreakpointBinding, Frame, Output, Session, SessionState, Source, SourceBinding, SourceOrigin, Stack, Thread, ThreadState,
};
use crate::graph::{transaction, EntityId, GraphStore};
use crate::runtime::{current_runtime, Scope};
use crate::session::supervisor::SessionSupervisor;
use crate::transport::{Channel, Client};
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Registers every translated event and the two reverse-request handlers
/// for one session's client. `run_in_terminal` is the consumer's
/// callback for the `runInTerminal` reverse request (spec.md §4.B
/// "Reverse requests") — `None` responds with failure, per spec.
pub fn install<W: Channel + 'static>(
    store: Rc<GraphStore>,
    supervisor: Rc<SessionSupervisor>,
    session: EntityId,
    scope: Scope,
    client: Client<W>,
    run_in_terminal: Option<Rc<dyn Fn(Value) -> Result<Value, Error>>>,
) {
    client.on_event("thread", {
        let store = store.clone();
        move |body| on_thread(&store, session, &body)
    });
    client.on_event("stopped", {
        let store = store.clone();
        let scope = scope.clone();
        let client = client.clone();
        move |body| on_stopped(store.clone(), session, scope.clone(), client.clone(), body)
    });
    client.on_event("continued", {
        let store = store.clone();
        move |body| on_continued(&store, session, &body)
    });
    client.on_event("loadedSource", {
        let store = store.clone();
        move |body| on_loaded_source(&store, session, &body)
    });
    client.on_event("breakpoint", {
        let store = store.clone();
        move |body| on_breakpoint(&store, &body)
    });
    client.on_event("output", {
        let store = store.clone();
        move |body| on_output(&store, session, &body)
    });
    client.on_event("process", {
        let store = store.clone();
        move |body| on_process(&store, session, &body)
    });
    client.on_event("terminated", {
        let store = store.clone();
        move |_| on_terminated(&store, session)
    });
    client.on_event("exited", {
        let store = store.clone();
        move |_| on_terminated(&store, session)
    });

    client.register_reverse_handler("startDebugging", {
        let store = store.clone();
        let supervisor = supervisor.clone();
        move |body| {
            let configuration = body.get("configuration").cloned().unwrap_or(Value::Null);
            let request = body.get("request").and_then(|v| v.as_str()).unwrap_or("launch").to_string();
            let child = on_start_debugging(&store, session, configuration, request);
            supervisor.register_child(session, child);
            Ok(json!({}))
        }
    });
    client.register_reverse_handler("runInTerminal", move |body| match &run_in_terminal {
        Some(cb) => cb(body),
        None => Err(Error::protocol("no runInTerminal handler registered")),
    });
}

fn find_thread(store: &GraphStore, session: EntityId, dap_id: i64) -> Option<EntityId> {
    store
        .sessions
        .with(session, |s| s.threads.iter())
        .ok()?
        .into_iter()
        .find(|id| store.threads.with(*id, |t| t.dap_id == dap_id).unwrap_or(false))
}

fn on_thread(store: &GraphStore, session: EntityId, body: &Value) {
    let Some(thread_id) = body.get("threadId").and_then(|v| v.as_i64()) else {
        return;
    };
    let started = body.get("reason").and_then(|v| v.as_str()) == Some("started");

    transaction(|| {
        if started {
            if find_thread(store, session, thread_id).is_some() {
                return;
            }
            let id = store.threads.insert(store.minter(), Thread::new(thread_id, session));
            let _ = store.sessions.with(session, |s| s.threads.link(id));
        } else if let Some(id) = find_thread(store, session, thread_id) {
            let _ = store.threads.with(id, |t| t.state.set(ThreadState::Exited));
            let _ = store.sessions.with(session, |s| s.threads.unlink(id));
        }
    });
}

fn on_stopped<W: Channel + 'static>(store: Rc<GraphStore>, session: EntityId, scope: Scope, client: Client<W>, body: Value) {
    let Some(thread_id) = body.get("threadId").and_then(|v| v.as_i64()) else {
        return;
    };
    let reason = body.get("reason").and_then(|v| v.as_str()).map(str::to_string);
    let Some(thread) = find_thread(&store, session, thread_id) else {
        return;
    };

    transaction(|| {
        let _ = store.threads.with(thread, |t| {
            t.state.set(ThreadState::Stopped);
            t.stop_reason.set(reason.clone());
        });
        let _ = store.sessions.with(session, |s| {
            if matches!(s.state.get(), SessionState::Running) {
                s.state.set(SessionState::Stopped);
            }
        });
    });

    current_runtime().run(
        async move {
            let args = json!({ "threadId": thread_id });
            match client.call(&scope, "stackTrace", args).await {
                Ok(body) => apply_stack_trace(&store, thread, &body),
                Err(e) => log::warn!(target: "dap-core::session", "stackTrace request failed: {e}"),
            }
        },
        None,
        Some(&scope),
    );
}

fn apply_stack_trace(store: &GraphStore, thread: EntityId, body: &Value) {
    let Some(frames) = body.get("stackFrames").and_then(|v| v.as_array()) else {
        return;
    };
    transaction(|| {
        let sequence = store.threads.with(thread, |t| t.stacks.count() as i64).unwrap_or(0) + 1;
        let stack_id = store.stacks.insert(store.minter(), Stack::new(sequence, thread));
        let _ = store.threads.with(thread, |t| t.stacks.link_ranked(stack_id, -sequence));

        for (index, frame) in frames.iter().enumerate() {
            let name = frame.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let line = frame.get("line").and_then(|v| v.as_i64()).unwrap_or(0);
            let column = frame.get("column").and_then(|v| v.as_i64()).unwrap_or(0);
            let dap_id = frame.get("id").and_then(|v| v.as_i64()).unwrap_or(0);
            let source = frame.get("source").and_then(|s| correlate_source(store, s));
            let frame_id = store.frames.insert(store.minter(), Frame::new(dap_id, index as i64, name, line, column, stack_id, source));
            let _ = store.stacks.with(stack_id, |s| s.frames.link_ranked(frame_id, index as i64));
        }
    });
}

fn on_continued(store: &GraphStore, session: EntityId, body: &Value) {
    let Some(thread_id) = body.get("threadId").and_then(|v| v.as_i64()) else {
        return;
    };
    let Some(thread) = find_thread(store, session, thread_id) else {
        return;
    };
    transaction(|| {
        let newest = store.threads.with(thread, |t| {
            t.state.set(ThreadState::Running);
            t.stacks.nth_from_end(0)
        });
        if let Ok(Some(stack)) = newest {
            let _ = store.stacks.with(stack, |s| s.valid.set(false));
        }
        let other_stopped = store
            .sessions
            .with(session, |s| s.threads.iter())
            .unwrap_or_default()
            .into_iter()
            .any(|id| store.threads.with(id, |t| t.state.get() == ThreadState::Stopped).unwrap_or(false));
        if !other_stopped {
            let _ = store.sessions.with(session, |s| {
                if matches!(s.state.get(), SessionState::Stopped) {
                    s.state.set(SessionState::Running);
                }
            });
        }
    });
}

fn on_loaded_source(store: &GraphStore, session: EntityId, body: &Value) {
    let Some(source_json) = body.get("source") else {
        return;
    };
    transaction(|| {
        let Some(source_id) = correlate_source(store, source_json) else {
            return;
        };
        let already_bound = store
            .sessions
            .with(session, |s| s.source_bindings.iter())
            .unwrap_or_default()
            .into_iter()
            .any(|b| store.source_bindings.with(b, |sb| sb.source == source_id).unwrap_or(false));
        if !already_bound {
            let binding_id = store.source_bindings.insert(store.minter(), SourceBinding::new(session, source_id));
            let _ = store.sessions.with(session, |s| s.source_bindings.link(binding_id));
            let _ = store.sources.with(source_id, |s| s.bindings.link(binding_id));
        }
    });
}

fn on_breakpoint(store: &GraphStore, body: &Value) {
    let Some(bp) = body.get("breakpoint") else {
        return;
    };
    let Some(adapter_id) = bp.get("id").and_then(|v| v.as_i64()) else {
        return;
    };
    let Some(binding) = find_binding_by_adapter_id(store, adapter_id) else {
        return;
    };
    let verified = bp.get("verified").and_then(|v| v.as_bool()).unwrap_or(false);
    let line = bp.get("line").and_then(|v| v.as_i64());
    let column = bp.get("column").and_then(|v| v.as_i64());
    transaction(|| {
        let _ = store.breakpoint_bindings.with(binding, |b| {
            b.verified.set(verified);
            b.actual_line.set(line);
            b.actual_column.set(column);
        });
    });
}

fn find_binding_by_adapter_id(store: &GraphStore, adapter_id: i64) -> Option<EntityId> {
    store
        .breakpoint_bindings
        .ids()
        .into_iter()
        .find(|id| store.breakpoint_bindings.with(*id, |b| b.adapter_id.get() == Some(adapter_id)).unwrap_or(false))
}

fn on_output(store: &GraphStore, session: EntityId, body: &Value) {
    let category = body.get("category").and_then(|v| v.as_str()).unwrap_or("console").to_string();
    let content = body.get("output").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let line = body.get("line").and_then(|v| v.as_i64());
    let source = body.get("source").and_then(|s| correlate_source(store, s));

    transaction(|| {
        let sequence = store.sessions.with(session, |s| s.outputs.count() as i64).unwrap_or(0) + 1;
        let output_id = store.outputs.insert(
            store.minter(),
            Output {
                sequence,
                session,
                category,
                content,
                source,
                line,
            },
        );
        let _ = store.sessions.with(session, |s| s.outputs.link_ranked(output_id, sequence));
    });
}

fn on_process(store: &GraphStore, session: EntityId, body: &Value) {
    let start_method = body.get("startMethod").and_then(|v| v.as_str()).unwrap_or("launch").to_string();
    let process_id = body.get("systemProcessId").and_then(|v| v.as_i64());
    let is_auto_attached = matches!(start_method.as_str(), "attach" | "attachForSuspendedLaunch");

    transaction(|| {
        let _ = store.sessions.with(session, |s| {
            s.start_method.set(start_method.clone());
            s.process_id.set(process_id);
            s.is_auto_attached.set(is_auto_attached);
        });
    });
}

fn on_terminated(store: &GraphStore, session: EntityId) {
    transaction(|| {
        let already_terminal = store
            .sessions
            .with(session, |s| matches!(s.state.get(), SessionState::Terminated | SessionState::Disconnected))
            .unwrap_or(true);
        if already_terminal {
            return;
        }
        let _ = store.sessions.with(session, |s| s.state.set(SessionState::Terminated));
        dispose_session_entities(store, session);
        let _ = store.sessions.with(session, |s| s.state.set(SessionState::Disconnected));
    });
}

/// Removes every entity this session owns from its arena, leaving the
/// `Session` itself (still reachable via `/sessions` for post-mortem
/// inspection) in `disconnected` state (spec.md §4.B "Entering
/// `terminated` disposes all owned child entities").
fn dispose_session_entities(store: &GraphStore, session: EntityId) {
    let threads = store.sessions.with(session, |s| s.threads.iter()).unwrap_or_default();
    for thread in threads {
        let stacks = store.threads.with(thread, |t| t.stacks.iter()).unwrap_or_default();
        for stack in stacks {
            let frames = store.stacks.with(stack, |s| s.frames.iter()).unwrap_or_default();
            for frame in frames {
                dispose_frame_scopes(store, frame);
                store.frames.remove(frame);
            }
            store.stacks.remove(stack);
        }
        store.threads.remove(thread);
        let _ = store.sessions.with(session, |s| s.threads.unlink(thread));
    }

    let bindings = store.sessions.with(session, |s| s.bindings.iter()).unwrap_or_default();
    for binding in bindings {
        store.breakpoint_bindings.remove(binding);
    }
    let filter_bindings = store.sessions.with(session, |s| s.filter_bindings.iter()).unwrap_or_default();
    for binding in filter_bindings {
        store.filter_bindings.remove(binding);
    }
    let source_bindings = store.sessions.with(session, |s| s.source_bindings.iter()).unwrap_or_default();
    for binding in source_bindings {
        store.source_bindings.remove(binding);
    }
}

fn dispose_frame_scopes(store: &GraphStore, frame: EntityId) {
    let scopes = store.frames.with(frame, |f| f.scopes.iter()).unwrap_or_default();
    for scope in scopes {
        let variables = store.scopes.with(scope, |s| s.variables.iter()).unwrap_or_default();
        for variable in variables {
            store.variables.remove(variable);
        }
        store.scopes.remove(scope);
    }
}

/// Creates the child `Session` entity a `startDebugging` reverse request
/// asks for (spec.md §4.B "Reverse requests"). Opening the child's own
/// transport connection is left to the embedding host — spawning adapter
/// processes or sockets is explicitly out of scope (SPEC_FULL.md
/// Non-goals) — so this only performs the graph bookkeeping side: mint
/// the entity, link parentage, and hand the caller enough to drive the
/// rest (`configuration`/`request` from the reverse request body).
fn on_start_debugging(store: &GraphStore, parent: EntityId, configuration: Value, request: String) -> EntityId {
    transaction(|| {
        let name = configuration.get("name").and_then(|v| v.as_str()).unwrap_or("child session").to_string();
        let child = store.sessions.insert(store.minter(), Session::new(name, request, Some(parent)));
        let _ = store.debugger.sessions.link(child);
        let _ = store.sessions.with(parent, |s| s.children.link(child));
        child
    })
}

pub(crate) fn correlate_source(store: &GraphStore, source: &Value) -> Option<EntityId> {
    let path = source.get("path").and_then(|v| v.as_str());
    let name = source.get("name").and_then(|v| v.as_str());
    let source_reference = source.get("sourceReference").and_then(|v| v.as_i64()).filter(|r| *r != 0);
    let key = correlation_key(path, name, source_reference);

    if let Some(existing) = store.find_source_by_key(&key) {
        if let Some(sr) = source_reference {
            let _ = store.sources.with(existing, |s| s.source_reference.set(Some(sr)));
        }
        return Some(existing);
    }

    let origin = match (path, name) {
        (Some(p), _) => SourceOrigin::Path(p.to_string()),
        (None, Some(n)) if source_reference.is_none() => SourceOrigin::Name(n.to_string()),
        _ => SourceOrigin::Reference { hash: key.clone() },
    };
    let id = store.sources.insert(store.minter(), Source::new(key, origin, name.unwrap_or_default()));
    if let Some(sr) = source_reference {
        let _ = store.sources.with(id, |s| s.source_reference.set(Some(sr)));
    }
    store.debugger.sources.link(id);
    Some(id)
}

/// Two sources are the same entity iff this key matches (spec.md §4.B
/// "Source correlation"): the normalized absolute path when one exists,
/// otherwise a stability hash of the adapter-provided name and reference
/// (the *content* fingerprint half of the rule — reusing the entity once
/// a matching content hash is seen on a later fetch — is applied by
/// whichever operation actually fetches source content, not here).
fn correlation_key(path: Option<&str>, name: Option<&str>, source_reference: Option<i64>) -> String {
    if let Some(p) = path {
        return normalize_path(p);
    }
    let mut hasher = DefaultHasher::new();
    name.unwrap_or_default().hash(&mut hasher);
    source_reference.unwrap_or(0).hash(&mut hasher);
    format!("ref:{:016x}", hasher.finish())
}

fn normalize_path(path: &str) -> String {
    std::path::Path::new(path).components().collect::<std::path::PathBuf>().to_string_lossy().into_owned()
}
