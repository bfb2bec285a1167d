//! Session supervisor (SPEC_FULL.md §4.B.5, SUPPLEMENT). Grounded on the
//! teacher's `EventHook` trait (`src/debugger/mod.rs`, read in an earlier
//! pass, now removed from the tree) which centralized process-lifecycle
//! callbacks in one place instead of scattering them across call sites;
//! this plays the same centralizing role for the session forest.

use crate::error::Error;
use crate::graph::entities::SessionState;
use crate::graph::{EntityId, GraphStore};
use crate::runtime::Scope;
use crate::session::handshake;
use crate::transport::{Channel, Client};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Tracks bootstrap/child session parentage as an explicit forest
/// (spec.md §3.2 invariant 5) and the per-session `Client::close`
/// callback needed for best-effort teardown, without requiring every
/// session to share the same transport type `W`.
pub struct SessionSupervisor {
    store: Rc<GraphStore>,
    closers: RefCell<HashMap<EntityId, Box<dyn Fn()>>>,
    children: RefCell<HashMap<EntityId, Vec<EntityId>>>,
}

impl SessionSupervisor {
    pub fn new(store: Rc<GraphStore>) -> Rc<Self> {
        Rc::new(SessionSupervisor {
            store,
            closers: RefCell::new(HashMap::new()),
            children: RefCell::new(HashMap::new()),
        })
    }

    /// Registers a session's transport so [`shutdown_all`](Self::shutdown_all)
    /// can close it without knowing its channel type.
    pub fn track<W: Channel + 'static>(&self, session: EntityId, client: Client<W>) {
        self.closers.borrow_mut().insert(session, Box::new(move || client.close()));
    }

    pub fn register_child(&self, parent: EntityId, child: EntityId) {
        self.children.borrow_mut().entry(parent).or_default().push(child);
    }

    pub fn children_of(&self, parent: EntityId) -> Vec<EntityId> {
        self.children.borrow().get(&parent).cloned().unwrap_or_default()
    }

    /// `sessions_in_state(state)` (SPEC_FULL.md §4.B.5): a convenience
    /// rollup over `/sessions`, used by breakpoint resync to find every
    /// session that might need a resend.
    pub fn sessions_in_state(&self, state: SessionState) -> Vec<EntityId> {
        self.store
            .debugger
            .sessions
            .iter()
            .into_iter()
            .filter(|id| self.store.sessions.with(*id, |s| s.state.get() == state).unwrap_or(false))
            .collect()
    }

    /// Disconnects every live session's transport (best-effort; errors
    /// are logged and swallowed) and disposes its tracked closer. Does
    /// not itself remove entities — `terminated`'s event handler already
    /// disposes a session's owned entities as it transitions.
    pub fn shutdown_all(&self) {
        for (session, close) in self.closers.borrow_mut().drain() {
            log::debug!(target: "dap-core::session", "closing session {session:?}");
            close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entities::Session;

    #[test]
    fn register_child_tracks_children_per_parent() {
        let store = Rc::new(GraphStore::new());
        let supervisor = SessionSupervisor::new(store.clone());
        let parent = store.sessions.insert(store.minter(), Session::new("root", "launch", None));
        let a = store.sessions.insert(store.minter(), Session::new("a", "launch", Some(parent)));
        let b = store.sessions.insert(store.minter(), Session::new("b", "launch", Some(parent)));

        supervisor.register_child(parent, a);
        supervisor.register_child(parent, b);

        assert_eq!(supervisor.children_of(parent), vec![a, b]);
        assert!(supervisor.children_of(a).is_empty());
    }

    #[test]
    fn sessions_in_state_filters_the_debugger_rooted_collection() {
        let store = Rc::new(GraphStore::new());
        let supervisor = SessionSupervisor::new(store.clone());
        let running = store.sessions.insert(store.minter(), Session::new("r", "launch", None));
        let stopped = store.sessions.insert(store.minter(), Session::new("s", "launch", None));
        store.sessions.with(running, |s| s.state.set(SessionState::Running)).unwrap();
        store.sessions.with(stopped, |s| s.state.set(SessionState::Stopped)).unwrap();
        store.debugger.sessions.link(running);
        store.debugger.sessions.link(stopped);

        assert_eq!(supervisor.sessions_in_state(SessionState::Running), vec![running]);
        assert_eq!(supervisor.sessions_in_state(SessionState::Stopped), vec![stopped]);
    }
}

/// Resends `setBreakpoints` for `source` to every currently-running
/// session bound to it (spec.md §4.B "Breakpoint resync" — fired when a
/// Breakpoint is created, toggled, or edited at the Debugger level).
/// Callers supply one `resend` closure per live session's own `Client`,
/// since sessions may use different channel types.
pub async fn resync_breakpoint_source<W: Channel + 'static>(
    store: &Rc<GraphStore>,
    supervisor: &SessionSupervisor,
    scope: &Scope,
    client: &Client<W>,
    session: EntityId,
    source: EntityId,
) -> Result<(), Error> {
    let running = supervisor.sessions_in_state(SessionState::Running);
    if !running.contains(&session) {
        return Ok(());
    }
    let has_loaded = store
        .sources
        .with(source, |s| s.bindings.iter())
        .unwrap_or_default()
        .into_iter()
        .any(|b| store.source_bindings.with(b, |sb| sb.session == session).unwrap_or(false));
    if !has_loaded {
        return Ok(());
    }
    handshake::resync_source(store, session, scope, client, source).await
}
