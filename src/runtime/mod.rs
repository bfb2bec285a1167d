//! Cooperative, single-threaded async runtime with scoped cancellation
//! (component D in spec.md §4.D). No OS thread parallelism: one ready
//! queue, tasks suspend only at the primitives in `primitives.rs`.

mod context;
mod primitives;
mod scope;
mod task;

pub use context::ContextMap;
pub use primitives::{event, memoize, mutex, timeout, wait, wait_all, Event, Memoized, Mutex, MutexGuard, WaitCallback};
pub use scope::{current_scope, Scope};

use std::cell::{Cell, RefCell};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::task::Waker;
use std::time::{Duration, Instant};

use task::Task;

pub(crate) struct WaitSlot {
    pub(crate) waker: RefCell<Option<Waker>>,
    pub(crate) result: RefCell<Option<Box<dyn std::any::Any>>>,
}

pub(crate) struct InboundMessage {
    pub(crate) wait_id: u64,
    pub(crate) payload: Box<dyn std::any::Any + Send>,
}

struct TimerEntry {
    deadline: Instant,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse so `BinaryHeap` (a max-heap) pops the earliest deadline first.
        other.deadline.cmp(&self.deadline)
    }
}

struct RuntimeInner {
    ready: Rc<RefCell<VecDeque<Rc<Task>>>>,
    next_task_id: Cell<u64>,
    wait_slots: RefCell<HashMap<u64, Rc<WaitSlot>>>,
    next_wait_id: Cell<u64>,
    inbound_tx: Sender<InboundMessage>,
    inbound_rx: Receiver<InboundMessage>,
    timers: RefCell<BinaryHeap<TimerEntry>>,
    root_scope: Scope,
    memo_cache: RefCell<HashMap<(usize, std::any::TypeId), Rc<dyn std::any::Any>>>,
}

/// A handle to the cooperative executor. Cheap to clone (reference-counted);
/// all clones share the same ready queue and wait tables.
#[derive(Clone)]
pub struct Runtime(Rc<RuntimeInner>);

thread_local! {
    static CURRENT_RUNTIME: RefCell<Vec<Runtime>> = RefCell::new(Vec::new());
}

/// Returns the runtime currently driving the calling task. Panics if
/// called outside of `Runtime::run_until_idle`/`poll_tick` — the
/// suspension primitives (`wait`, `timeout`, ...) are only meaningful
/// while a runtime is actively polling.
pub(crate) fn current_runtime() -> Runtime {
    CURRENT_RUNTIME
        .with(|r| r.borrow().last().cloned())
        .expect("runtime primitive used outside of an active Runtime tick")
}

impl Runtime {
    pub fn new() -> Runtime {
        let (inbound_tx, inbound_rx) = channel();
        Runtime(Rc::new(RuntimeInner {
            ready: Rc::new(RefCell::new(VecDeque::new())),
            next_task_id: Cell::new(1),
            wait_slots: RefCell::new(HashMap::new()),
            next_wait_id: Cell::new(1),
            inbound_tx,
            inbound_rx,
            timers: RefCell::new(BinaryHeap::new()),
            root_scope: Scope::root(),
            memo_cache: RefCell::new(HashMap::new()),
        }))
    }

    pub fn root_scope(&self) -> Scope {
        self.0.root_scope.clone()
    }

    /// A cloneable sender host code can use to deliver completions back
    /// into the runtime from another OS thread (e.g. a blocking socket
    /// read running on a dedicated reader thread). Drained on the next
    /// tick — see spec.md §5 "Suspension points".
    pub(crate) fn inbound_sender(&self) -> Sender<InboundMessage> {
        self.0.inbound_tx.clone()
    }

    pub(crate) fn alloc_wait_id(&self) -> u64 {
        let id = self.0.next_wait_id.get();
        self.0.next_wait_id.set(id + 1);
        id
    }

    pub(crate) fn register_wait_slot(&self, id: u64) -> Rc<WaitSlot> {
        let slot = Rc::new(WaitSlot {
            waker: RefCell::new(None),
            result: RefCell::new(None),
        });
        self.0.wait_slots.borrow_mut().insert(id, slot.clone());
        slot
    }

    pub(crate) fn wait_slot(&self, id: u64) -> Option<Rc<WaitSlot>> {
        self.0.wait_slots.borrow().get(&id).cloned()
    }

    pub(crate) fn remove_wait_slot(&self, id: u64) {
        self.0.wait_slots.borrow_mut().remove(&id);
    }

    pub(crate) fn register_timer(&self, deadline: Instant, waker: Waker) {
        self.0.timers.borrow_mut().push(TimerEntry { deadline, waker });
    }

    pub(crate) fn memo_cache_get<T: 'static>(&self, key: usize) -> Option<Rc<T>> {
        let type_id = std::any::TypeId::of::<T>();
        self.0
            .memo_cache
            .borrow()
            .get(&(key, type_id))
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    pub(crate) fn memo_cache_insert<T: 'static>(&self, key: usize, value: Rc<T>) {
        let type_id = std::any::TypeId::of::<T>();
        self.0.memo_cache.borrow_mut().insert((key, type_id), value);
    }

    pub(crate) fn memo_cache_remove(&self, key: usize, type_id: std::any::TypeId) {
        self.0.memo_cache.borrow_mut().remove(&(key, type_id));
    }

    /// Spawn a task under `parent_scope` (or the root scope if `None`).
    /// Returns a `TaskCtx` the caller uses to cancel it or check whether
    /// it has finished.
    pub fn run<F>(&self, fut: F, on_complete: Option<Box<dyn FnOnce()>>, parent_scope: Option<&Scope>) -> TaskCtx
    where
        F: Future<Output = ()> + 'static,
    {
        let scope = parent_scope.unwrap_or(&self.0.root_scope).child();
        let id = self.0.next_task_id.get();
        self.0.next_task_id.set(id + 1);
        let task = Task::new(id, Box::pin(fut), scope.clone(), on_complete);
        self.0.ready.borrow_mut().push_back(task.clone());
        TaskCtx { scope, task_id: id }
    }

    fn drain_inbound(&self) {
        while let Ok(msg) = self.0.inbound_rx.try_recv() {
            if let Some(slot) = self.wait_slot(msg.wait_id) {
                *slot.result.borrow_mut() = Some(msg.payload);
                if let Some(waker) = slot.waker.borrow_mut().take() {
                    waker.wake();
                }
            }
        }
    }

    fn fire_due_timers(&self) {
        let now = Instant::now();
        let mut timers = self.0.timers.borrow_mut();
        while matches!(timers.peek(), Some(t) if t.deadline <= now) {
            let entry = timers.pop().unwrap();
            entry.waker.wake();
        }
    }

    fn next_timer_deadline(&self) -> Option<Instant> {
        self.0.timers.borrow().peek().map(|t| t.deadline)
    }

    /// Run one scheduling tick: drain inbound completions, fire due
    /// timers, poll every currently-ready task once. Intended to be
    /// called from a host event loop (spec.md §4.D "host-driven" mode).
    pub fn poll_tick(&self) {
        CURRENT_RUNTIME.with(|r| r.borrow_mut().push(self.clone()));
        self.drain_inbound();
        self.fire_due_timers();
        let ready = self.0.ready.clone();
        let drained: Vec<Rc<Task>> = ready.borrow_mut().drain(..).collect();
        for task in drained {
            task.poll(&ready);
        }
        CURRENT_RUNTIME.with(|r| {
            r.borrow_mut().pop();
        });
    }

    /// Standalone entry point: ticks until there is no ready work and no
    /// pending timer, sleeping between ticks when only a timer remains.
    pub fn run_until_idle(&self) {
        loop {
            self.poll_tick();
            let has_ready = !self.0.ready.borrow().is_empty();
            if has_ready {
                continue;
            }
            match self.next_timer_deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep((deadline - now).min(Duration::from_millis(5)));
                    }
                }
                None => break,
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new()
    }
}


/// Handle to a spawned task, returned by `Runtime::run`.
pub struct TaskCtx {
    scope: Scope,
    task_id: u64,
}

impl TaskCtx {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn cancel(&self) {
        self.scope.cancel();
    }

    pub fn done(&self) -> bool {
        self.scope.done()
    }

    pub fn id(&self) -> u64 {
        self.task_id
    }
}
