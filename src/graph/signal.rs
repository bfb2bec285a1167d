//! Signals (spec.md §4.C.1): a cell holding a value plus a set of
//! subscribers, notified post-commit, deduplicated per transaction.

use crate::graph::transaction::schedule_notify;
use crate::runtime::Scope;
use std::cell::RefCell;
use std::rc::Rc;

struct Inner<T> {
    value: T,
    subscribers: Vec<(u64, Box<dyn FnMut(&T)>)>,
    next_sub_id: u64,
}

/// A reactive cell. Cheap to clone — clones share the same value and
/// subscriber list.
pub struct Signal<T>(Rc<RefCell<Inner<T>>>);

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal(self.0.clone())
    }
}

/// A cleanup handle returned by [`Signal::subscribe`]. Dropping it does
/// *not* unsubscribe — call [`Unsubscribe::call`] (or let a `Scope` own
/// it via [`Signal::use_scoped`]).
pub struct Unsubscribe(Box<dyn FnOnce()>);

impl Unsubscribe {
    pub(crate) fn new(f: impl FnOnce() + 'static) -> Self {
        Unsubscribe(Box::new(f))
    }

    pub fn call(self) {
        (self.0)()
    }
}

impl<T: 'static> Signal<T> {
    pub fn new(value: T) -> Self {
        Signal(Rc::new(RefCell::new(Inner {
            value,
            subscribers: Vec::new(),
            next_sub_id: 0,
        })))
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.borrow().value.clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.borrow().value)
    }

    /// Updates the value; if it differs from the current one, schedules
    /// subscriber notification (deduplicated within the active
    /// transaction, or fired immediately if there is none).
    pub fn set(&self, value: T)
    where
        T: PartialEq + Clone,
    {
        let changed = {
            let mut inner = self.0.borrow_mut();
            if inner.value == value {
                false
            } else {
                inner.value = value;
                true
            }
        };
        if changed {
            self.schedule_notify();
        }
    }

    fn schedule_notify(&self)
    where
        T: Clone,
    {
        let inner = self.0.clone();
        let key = Rc::as_ptr(&self.0) as *const () as usize;
        schedule_notify(key, move || notify(&inner));
    }

    /// Registers `cb`, returning a handle to remove it later.
    pub fn subscribe(&self, cb: impl FnMut(&T) + 'static) -> Unsubscribe {
        let mut inner = self.0.borrow_mut();
        let id = inner.next_sub_id;
        inner.next_sub_id += 1;
        inner.subscribers.push((id, Box::new(cb)));
        drop(inner);

        let weak = Rc::downgrade(&self.0);
        Unsubscribe(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().subscribers.retain(|(sid, _)| *sid != id);
            }
        }))
    }

    /// As [`subscribe`](Self::subscribe), but registers the cleanup with
    /// `scope` so cancelling it removes the subscription automatically
    /// (spec.md §4.C.1 `use`).
    pub fn use_scoped(&self, scope: &Scope, cb: impl FnMut(&T) + 'static) {
        let unsub = self.subscribe(cb);
        scope.on_cleanup(move || unsub.call());
    }
}

/// Calls every subscriber with the current value. Subscribers are
/// swapped out for a no-op placeholder while running so a callback that
/// subscribes or unsubscribes (re-entering this signal) never observes
/// a held `RefMut`.
fn notify<T: Clone>(inner: &Rc<RefCell<Inner<T>>>) {
    let len = inner.borrow().subscribers.len();
    for i in 0..len {
        let value = inner.borrow().value.clone();
        let taken = {
            let mut borrowed = inner.borrow_mut();
            if i >= borrowed.subscribers.len() {
                break;
            }
            std::mem::replace(&mut borrowed.subscribers[i].1, Box::new(|_: &T| {}))
        };
        let mut cb = taken;
        cb(&value);
        let mut borrowed = inner.borrow_mut();
        if i < borrowed.subscribers.len() {
            borrowed.subscribers[i].1 = cb;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::transaction::transaction;
    use std::cell::Cell;

    #[test]
    fn set_notifies_immediately_outside_a_transaction() {
        let sig = Signal::new(1);
        let seen = Rc::new(Cell::new(0));
        let seen2 = seen.clone();
        sig.subscribe(move |v| seen2.set(*v));
        sig.set(2);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn set_to_the_same_value_does_not_notify() {
        let sig = Signal::new(1);
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        sig.subscribe(move |_| calls2.set(calls2.get() + 1));
        sig.set(1);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn multiple_sets_in_one_transaction_notify_once() {
        let sig = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        sig.subscribe(move |_| calls2.set(calls2.get() + 1));
        transaction(|| {
            sig.set(1);
            sig.set(2);
            sig.set(3);
        });
        assert_eq!(calls.get(), 1);
        assert_eq!(sig.get(), 3);
    }

    #[test]
    fn unsubscribe_stops_future_notifications() {
        let sig = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        let unsub = sig.subscribe(move |_| calls2.set(calls2.get() + 1));
        sig.set(1);
        unsub.call();
        sig.set(2);
        assert_eq!(calls.get(), 1);
    }
}
