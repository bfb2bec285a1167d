//! URI addressing (component C.4, spec.md §4.C.4, §6.3). Grammar and
//! parsing live in [`grammar`], pure resolution in [`resolver`],
//! per-consumer focus tracking in [`focus`]; this module ties them
//! together into the consumer-facing `query`/`subscribe`/`wait_url`
//! operations (spec.md §6.4).

pub mod focus;
pub mod grammar;
pub mod resolver;

pub use focus::Focus;
pub use grammar::{parse, FocusKind, ParsedUri};
pub use resolver::{resolve, resolve_tracking, Resolved};

use crate::error::Error;
use crate::graph::snapshot::EntitySnapshot;
use crate::graph::{GraphStore, Unsubscribe};
use crate::runtime::{timeout, Scope};
use grammar::Root;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// A URI string, opaque beyond what's needed for error display (spec.md
/// §4.C "Errors" — malformed URIs never raise, so this type does no
/// validation; `grammar::parse` is where validity actually matters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri(String);

impl Uri {
    pub fn new(s: impl Into<String>) -> Self {
        Uri(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `query(uri)` (spec.md §6.4): a snapshot materialization of whatever
/// the URI currently resolves to.
pub enum QueryResult {
    Nil,
    Entity(EntitySnapshot),
    Collection(Vec<EntitySnapshot>),
}

pub fn query(store: &GraphStore, focus: &Focus, uri: &str) -> QueryResult {
    let Some(parsed) = parse(uri) else {
        return QueryResult::Nil;
    };
    match resolve(store, &focus.resolver(), &parsed) {
        Resolved::Nil => QueryResult::Nil,
        Resolved::Entity(id) => store.snapshot(id).map(QueryResult::Entity).unwrap_or(QueryResult::Nil),
        Resolved::Collection(ids) => QueryResult::Collection(ids.into_iter().filter_map(|id| store.snapshot(id).ok()).collect()),
    }
}

struct LiveQuery {
    store: Rc<GraphStore>,
    focus: Rc<Focus>,
    parsed: ParsedUri,
    cb: RefCell<Box<dyn FnMut(Resolved)>>,
    subs: RefCell<Vec<Unsubscribe>>,
}

impl LiveQuery {
    fn refresh(self: &Rc<Self>) {
        let old = std::mem::take(&mut *self.subs.borrow_mut());
        for u in old {
            u.call();
        }
        let mut touched = Vec::new();
        let resolved = resolve_tracking(&self.store, &self.focus.resolver(), &self.parsed, &mut touched);
        (self.cb.borrow_mut())(resolved);

        let mut subs = Vec::new();
        for edge in touched {
            let this = self.clone();
            subs.push(edge.subscribe(move || this.refresh()));
        }
        *self.subs.borrow_mut() = subs;
    }
}

/// `subscribe(uri, cb)` (spec.md §6.4): re-evaluates `uri` and invokes
/// `cb` whenever any edge the resolution passed through changes
/// membership (spec.md §4.C.4 "Reactivity"). Re-subscribes to the
/// (possibly different) set of touched edges after every firing.
pub fn subscribe(store: Rc<GraphStore>, focus: Rc<Focus>, uri: &str, cb: impl FnMut(Resolved) + 'static) -> Unsubscribe {
    let parsed = parse(uri).unwrap_or(ParsedUri { root: Root::Debugger, segments: Vec::new() });
    let lq = Rc::new(LiveQuery {
        store,
        focus,
        parsed,
        cb: RefCell::new(Box::new(cb)),
        subs: RefCell::new(Vec::new()),
    });
    lq.refresh();
    Unsubscribe::new(move || {
        let old = std::mem::take(&mut *lq.subs.borrow_mut());
        for u in old {
            u.call();
        }
    })
}

struct WaitUrlFuture {
    store: Rc<GraphStore>,
    focus: Rc<Focus>,
    parsed: ParsedUri,
    subs: Vec<Unsubscribe>,
}

impl Future for WaitUrlFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        for u in this.subs.drain(..) {
            u.call();
        }
        let mut touched = Vec::new();
        let resolved = resolve_tracking(&this.store, &this.focus.resolver(), &this.parsed, &mut touched);
        if !resolved.is_empty() {
            return Poll::Ready(());
        }
        let waker = cx.waker().clone();
        for edge in touched {
            let waker = waker.clone();
            this.subs.push(edge.subscribe(move || waker.wake_by_ref()));
        }
        Poll::Pending
    }
}

impl Drop for WaitUrlFuture {
    fn drop(&mut self) {
        for u in self.subs.drain(..) {
            u.call();
        }
    }
}

/// `wait_url(uri, timeout_ms)` (spec.md §4.C.4): suspends until `uri`
/// resolves to a non-empty, non-nil result, the timeout elapses (`Ok
/// (false)`), or `scope` is cancelled (`Err(Cancelled)`). Subscriptions
/// created while waiting are torn down on every re-check and on drop, so
/// cancellation never leaks a subscription (spec.md §8 scenario S5).
pub fn wait_url(store: Rc<GraphStore>, focus: Rc<Focus>, scope: &Scope, uri: String, timeout_ms: u64) -> impl Future<Output = Result<bool, Error>> {
    let scope = scope.clone();
    async move {
        let Some(parsed) = parse(&uri) else {
            return Ok(false);
        };
        let inner = WaitUrlFuture {
            store,
            focus,
            parsed,
            subs: Vec::new(),
        };
        let fut: Pin<Box<dyn Future<Output = Result<bool, Error>>>> = Box::pin(async move {
            inner.await;
            Ok(true)
        });
        match timeout(&scope, timeout_ms, fut).await {
            Ok(v) => Ok(v),
            Err(Error::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entities::Session;
    use crate::runtime::Runtime;
    use std::cell::Cell;

    #[test]
    fn query_on_a_malformed_uri_is_nil() {
        let store = GraphStore::new();
        let focus = Focus::new();
        assert!(matches!(query(&store, &focus, "not-a-uri"), QueryResult::Nil));
    }

    #[test]
    fn query_resolves_an_entity_snapshot() {
        let store = GraphStore::new();
        let focus = Focus::new();
        let session_id = store.sessions.insert(store.minter(), Session::new("launch", "launch", None));
        store.debugger.sessions.link(session_id);

        let uri = format!("/sessions:{}", session_id.index());
        match query(&store, &focus, &uri) {
            QueryResult::Entity(EntitySnapshot::Session(s)) => assert_eq!(s.name, "launch"),
            _ => panic!("expected a session entity snapshot"),
        }
    }

    #[test]
    fn query_resolves_a_collection_snapshot() {
        let store = GraphStore::new();
        let focus = Focus::new();
        let a = store.sessions.insert(store.minter(), Session::new("a", "launch", None));
        let b = store.sessions.insert(store.minter(), Session::new("b", "launch", None));
        store.debugger.sessions.link(a);
        store.debugger.sessions.link(b);

        match query(&store, &focus, "/sessions") {
            QueryResult::Collection(items) => assert_eq!(items.len(), 2),
            _ => panic!("expected a session collection snapshot"),
        }
    }

    #[test]
    fn subscribe_fires_when_a_touched_edge_changes_and_stops_after_unsubscribe() {
        let store = Rc::new(GraphStore::new());
        let focus = Rc::new(Focus::new());
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        let unsub = subscribe(store.clone(), focus, "/sessions", move |_| calls2.set(calls2.get() + 1));
        // initial `refresh` call on subscribe.
        assert_eq!(calls.get(), 1);

        let session_id = store.sessions.insert(store.minter(), Session::new("launch", "launch", None));
        store.debugger.sessions.link(session_id);
        assert_eq!(calls.get(), 2);

        unsub.call();
        store.debugger.sessions.unlink(session_id);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn wait_url_resolves_immediately_when_already_non_empty() {
        let store = Rc::new(GraphStore::new());
        let focus = Rc::new(Focus::new());
        let session_id = store.sessions.insert(store.minter(), Session::new("launch", "launch", None));
        store.debugger.sessions.link(session_id);

        let runtime = Runtime::new();
        let scope = runtime.root_scope();
        let result = Rc::new(Cell::new(None));
        let result2 = result.clone();
        runtime.run(
            {
                let store = store.clone();
                let focus = focus.clone();
                let scope = scope.clone();
                async move {
                    let r = wait_url(store, focus, &scope, "/sessions".to_string(), 1000).await;
                    result2.set(Some(r.unwrap()));
                }
            },
            None,
            Some(&scope),
        );
        runtime.run_until_idle();
        assert_eq!(result.get(), Some(true));
    }

    #[test]
    fn wait_url_times_out_when_the_uri_never_resolves() {
        let store = Rc::new(GraphStore::new());
        let focus = Rc::new(Focus::new());

        let runtime = Runtime::new();
        let scope = runtime.root_scope();
        let result = Rc::new(Cell::new(None));
        let result2 = result.clone();
        runtime.run(
            {
                let store = store.clone();
                let focus = focus.clone();
                let scope = scope.clone();
                async move {
                    let r = wait_url(store, focus, &scope, "/sessions".to_string(), 10).await;
                    result2.set(Some(r.unwrap()));
                }
            },
            None,
            Some(&scope),
        );
        runtime.run_until_idle();
        assert_eq!(result.get(), Some(false));
    }

    #[test]
    fn wait_url_wakes_once_the_awaited_entity_appears() {
        let store = Rc::new(GraphStore::new());
        let focus = Rc::new(Focus::new());

        let runtime = Runtime::new();
        let scope = runtime.root_scope();
        let result = Rc::new(Cell::new(None));
        let result2 = result.clone();
        runtime.run(
            {
                let store = store.clone();
                let focus = focus.clone();
                let scope = scope.clone();
                async move {
                    let r = wait_url(store, focus, &scope, "/sessions".to_string(), 5000).await;
                    result2.set(Some(r.unwrap()));
                }
            },
            None,
            Some(&scope),
        );
        runtime.poll_tick();
        assert_eq!(result.get(), None, "still pending — no session exists yet");

        let session_id = store.sessions.insert(store.minter(), Session::new("launch", "launch", None));
        store.debugger.sessions.link(session_id);
        runtime.run_until_idle();
        assert_eq!(result.get(), Some(true));
    }

    #[test]
    fn uri_display_and_accessors_are_stable() {
        let uri = Uri::new("/sessions");
        assert_eq!(uri.as_str(), "/sessions");
        assert_eq!(format!("{}", uri), "/sessions");
    }
}
