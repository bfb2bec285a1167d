use crate::runtime::context::ContextMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct ScopeInner {
    cancelled: Cell<bool>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    children: RefCell<Vec<Scope>>,
    ctx: ContextMap,
}

/// Structured-cancellation container. Distinct from the DAP `Scope` entity
/// in the entity graph (`crate::graph::entities::Scope`) — this is the
/// async-runtime sense of the word, per spec.md's glossary.
///
/// Scopes form a tree mirroring async parentage. Cancelling a scope runs
/// its own cleanups (reverse registration order) then cancels children
/// depth-first, siblings in reverse registration order.
#[derive(Clone)]
pub struct Scope(Rc<ScopeInner>);

impl Scope {
    pub fn root() -> Scope {
        Scope(Rc::new(ScopeInner {
            cancelled: Cell::new(false),
            cleanups: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            ctx: ContextMap::default(),
        }))
    }

    /// Spawn a child scope. The child is cancelled automatically when
    /// `self` is cancelled.
    pub fn child(&self) -> Scope {
        let child = Scope(Rc::new(ScopeInner {
            cancelled: Cell::new(self.0.cancelled.get()),
            cleanups: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            ctx: self.0.ctx.clone(),
        }));
        self.0.children.borrow_mut().push(child.clone());
        child
    }

    /// A child scope with one additional context binding visible to
    /// descendants (`ctx:with` in spec.md §4.D).
    pub fn with(&self, key: &'static str, value: Rc<dyn Any>) -> Scope {
        let child = Scope(Rc::new(ScopeInner {
            cancelled: Cell::new(self.0.cancelled.get()),
            cleanups: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            ctx: self.0.ctx.child_with(key, value),
        }));
        self.0.children.borrow_mut().push(child.clone());
        child
    }

    pub fn get_ctx<T: 'static>(&self, key: &'static str) -> Option<Rc<T>> {
        self.0.ctx.get_typed(key)
    }

    /// Register a cleanup callback. Runs immediately, inline, if the
    /// scope is already cancelled — a subscription registered after
    /// cancellation should never be left dangling.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        if self.0.cancelled.get() {
            f();
            return;
        }
        self.0.cleanups.borrow_mut().push(Box::new(f));
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.get()
    }

    /// True once this scope has been cancelled, directly or by
    /// propagation from an ancestor.
    pub fn done(&self) -> bool {
        self.0.cancelled.get()
    }

    /// Cancel this scope. Idempotent: cancelling an already-cancelled
    /// scope is a no-op.
    pub fn cancel(&self) {
        if self.0.cancelled.replace(true) {
            return;
        }
        let cleanups = std::mem::take(&mut *self.0.cleanups.borrow_mut());
        for cb in cleanups.into_iter().rev() {
            cb();
        }
        let children = std::mem::take(&mut *self.0.children.borrow_mut());
        for child in children.into_iter().rev() {
            child.cancel();
        }
    }
}

thread_local! {
    static CURRENT_SCOPE: RefCell<Vec<Scope>> = RefCell::new(Vec::new());
}

/// Returns the scope most recently pushed by the scheduler while polling
/// the currently-running task, if any. Used by `Signal::use_` so callers
/// don't have to thread a `Scope` through every reactive read.
pub fn current_scope() -> Option<Scope> {
    CURRENT_SCOPE.with(|s| s.borrow().last().cloned())
}

pub(crate) fn push_current_scope(scope: Scope) {
    CURRENT_SCOPE.with(|s| s.borrow_mut().push(scope));
}

pub(crate) fn pop_current_scope() {
    CURRENT_SCOPE.with(|s| {
        s.borrow_mut().pop();
    });
}
