//! Transaction batching (spec.md §4.C.1). A mutator opens a transaction,
//! performs `set`/`link`/`unlink` calls, then commits; subscriber
//! notifications fire after commit, deduplicated per signal so each
//! subscriber observes at most one notification per transaction
//! regardless of how many times its signal changed (spec.md §8,
//! quantified invariant 5).

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

type PendingMap = Rc<RefCell<IndexMap<usize, Box<dyn FnOnce()>>>>;

thread_local! {
    static TX_STACK: RefCell<Vec<PendingMap>> = RefCell::new(Vec::new());
}

/// Runs `f` inside a graph transaction. Transactions nest: a nested call
/// shares its parent's pending-notification set and only the outermost
/// call flushes it, so a mutator that calls another mutator still sees
/// one coalesced notification pass.
pub fn transaction<R>(f: impl FnOnce() -> R) -> R {
    let is_outer = TX_STACK.with(|s| s.borrow().is_empty());
    let pending = TX_STACK.with(|s| {
        let existing = s.borrow().last().cloned();
        let map = existing.unwrap_or_else(|| Rc::new(RefCell::new(IndexMap::new())));
        s.borrow_mut().push(map.clone());
        map
    });

    let result = f();

    TX_STACK.with(|s| {
        s.borrow_mut().pop();
    });

    if is_outer {
        let callbacks = match Rc::try_unwrap(pending) {
            Ok(cell) => cell.into_inner(),
            Err(rc) => std::mem::take(&mut *rc.borrow_mut()),
        };
        for (_, cb) in callbacks {
            cb();
        }
    }

    result
}

/// Schedules `notify` to run once, keyed by `key` (the address of the
/// signal/edge's shared inner cell). Inside an active transaction the
/// call is deferred and deduplicated against any other schedule with the
/// same key this transaction; outside one it fires immediately (every
/// mutation is its own implicit single-op transaction).
pub(crate) fn schedule_notify(key: usize, notify: impl FnOnce() + 'static) {
    let deferred = TX_STACK.with(|s| {
        if let Some(pending) = s.borrow().last() {
            pending.borrow_mut().entry(key).or_insert_with(|| Box::new(notify) as Box<dyn FnOnce()>);
            true
        } else {
            false
        }
    });
    if !deferred {
        notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn schedule_notify_outside_a_transaction_fires_immediately() {
        let fired = Rc::new(Cell::new(false));
        let fired2 = fired.clone();
        schedule_notify(1, move || fired2.set(true));
        assert!(fired.get());
    }

    #[test]
    fn repeated_schedule_with_the_same_key_coalesces_to_one_call() {
        let calls = Rc::new(Cell::new(0));
        transaction(|| {
            for _ in 0..5 {
                let calls2 = calls.clone();
                schedule_notify(42, move || calls2.set(calls2.get() + 1));
            }
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn nested_transactions_share_the_parent_pending_set_and_flush_once_at_the_outermost_commit() {
        let order = Rc::new(RefCell::new(Vec::new()));
        transaction(|| {
            let order1 = order.clone();
            schedule_notify(1, move || order1.borrow_mut().push(1));
            transaction(|| {
                let order2 = order.clone();
                schedule_notify(2, move || order2.borrow_mut().push(2));
                assert!(order.borrow().is_empty(), "inner commit must not flush yet");
            });
            assert!(order.borrow().is_empty(), "still inside the outer transaction");
        });
        let mut seen = order.borrow().clone();
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
    }
}
