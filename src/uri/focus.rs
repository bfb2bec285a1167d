//! Per-consumer focus (spec.md §4.C.4 "Contextual focus", §6.4
//! "Focus"). A focus is a single URI; `@kind` resolution walks that
//! URI's path and picks the nearest entity of the requested kind, so
//! `@session` from a focus pointing at a frame still resolves to that
//! frame's owning session.

use crate::graph::{EntityId, EntityKind, GraphStore};
use crate::uri::grammar::{parse, FocusKind, ParsedUri, Root};
use crate::uri::resolver::Resolved;
use std::cell::RefCell;

pub struct Focus {
    uri: RefCell<Option<String>>,
    path: RefCell<Vec<EntityId>>,
}

impl Focus {
    pub fn new() -> Self {
        Focus {
            uri: RefCell::new(None),
            path: RefCell::new(Vec::new()),
        }
    }

    /// Sets the focus to `uri`, re-walking it to capture every entity
    /// along the path (not just the final one) so `@session`/`@thread`/
    /// `@frame` can each resolve even when the focus points deep into a
    /// frame.
    pub fn set(&self, store: &GraphStore, uri: &str) {
        *self.uri.borrow_mut() = Some(uri.to_string());
        let path = match parse(uri) {
            Some(parsed) => walk_path(store, &parsed),
            None => Vec::new(),
        };
        *self.path.borrow_mut() = path;
    }

    pub fn clear(&self) {
        *self.uri.borrow_mut() = None;
        self.path.borrow_mut().clear();
    }

    pub fn uri(&self) -> Option<String> {
        self.uri.borrow().clone()
    }

    pub fn entity_for(&self, kind: FocusKind) -> Option<EntityId> {
        let want = match kind {
            FocusKind::Debugger => return None,
            FocusKind::Session => EntityKind::Session,
            FocusKind::Thread => EntityKind::Thread,
            FocusKind::Frame => EntityKind::Frame,
        };
        self.path.borrow().iter().rev().find(|id| id.kind() == want).copied()
    }

    pub fn resolver(&self) -> impl Fn(FocusKind) -> Option<EntityId> + '_ {
        move |kind| self.entity_for(kind)
    }
}

impl Default for Focus {
    fn default() -> Self {
        Focus::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entities::{Session, Thread};

    #[test]
    fn setting_focus_through_a_filter_segment_still_resolves_session_and_thread() {
        let store = GraphStore::new();
        let session_id = store.sessions.insert(store.minter(), Session::new("launch", "launch", None));
        let thread_id = store.threads.insert(store.minter(), Thread::new(1, session_id));
        store.sessions.with(session_id, |s| s.threads.link(thread_id)).unwrap();
        store.debugger.sessions.link(session_id);

        let focus = Focus::new();
        focus.set(&store, "/sessions/threads(state=running)");
        assert_eq!(focus.entity_for(FocusKind::Session), Some(session_id));
        assert_eq!(focus.entity_for(FocusKind::Thread), Some(thread_id));
    }

    #[test]
    fn setting_focus_walks_the_full_path_to_the_target() {
        let store = GraphStore::new();
        let session_id = store.sessions.insert(store.minter(), Session::new("launch", "launch", None));
        let thread_id = store.threads.insert(store.minter(), Thread::new(1, session_id));
        store.sessions.with(session_id, |s| s.threads.link(thread_id)).unwrap();
        store.debugger.sessions.link(session_id);

        let session_key = format!("/sessions:{}/threads:{}", session_id.index(), thread_id.index());
        let focus = Focus::new();
        focus.set(&store, &session_key);
        assert_eq!(focus.entity_for(FocusKind::Session), Some(session_id));
        assert_eq!(focus.entity_for(FocusKind::Thread), Some(thread_id));
        assert_eq!(focus.entity_for(FocusKind::Frame), None);
    }

    #[test]
    fn clear_resets_focus_and_path() {
        let store = GraphStore::new();
        let session_id = store.sessions.insert(store.minter(), Session::new("launch", "launch", None));
        store.debugger.sessions.link(session_id);

        let session_key = format!("/sessions:{}", session_id.index());
        let focus = Focus::new();
        focus.set(&store, &session_key);
        assert!(focus.uri().is_some());
        focus.clear();
        assert!(focus.uri().is_none());
        assert_eq!(focus.entity_for(FocusKind::Session), None);
    }

    #[test]
    fn focus_on_a_malformed_uri_resolves_nothing() {
        let store = GraphStore::new();
        let focus = Focus::new();
        focus.set(&store, "not-a-uri");
        assert_eq!(focus.entity_for(FocusKind::Session), None);
    }
}

/// Resolves `parsed` step by step (ignoring accessors' filtering beyond
/// what's needed to keep walking a single-entity path), recording every
/// entity the walk passes through.
fn walk_path(store: &GraphStore, parsed: &ParsedUri) -> Vec<EntityId> {
    use crate::uri::resolver::resolve;

    // Focus targets are themselves resolved without a focus context —
    // `@frame/..`-style chained focus is not part of the grammar.
    let no_focus = |_: FocusKind| None;
    match &parsed.root {
        Root::Focus { .. } => Vec::new(),
        Root::Debugger => {
            let mut path = Vec::new();
            let mut prefix = ParsedUri { root: Root::Debugger, segments: Vec::new() };
            for segment in &parsed.segments {
                prefix.segments.push(segment.clone());
                match resolve(store, &no_focus, &prefix) {
                    Resolved::Entity(id) => path.push(id),
                    Resolved::Collection(ids) if ids.len() == 1 => path.push(ids[0]),
                    _ => {}
                }
            }
            path
        }
    }
}
