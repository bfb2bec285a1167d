use crate::error::Error;
use crate::runtime::scope::Scope;
use crate::runtime::{current_runtime, InboundMessage};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Callback a `wait`-registered operation must eventually invoke, exactly
/// once, with the outcome. May be invoked from another OS thread — the
/// call is delivered back to the runtime thread via the inbound queue
/// (spec.md §5 "Suspension points").
pub type WaitCallback<T> = Box<dyn FnOnce(Result<T, Error>) + Send>;

enum WaitState<T> {
    Start(Option<Box<dyn FnOnce(WaitCallback<T>)>>),
    Registered(u64),
    Done,
}

/// `wait(fn)` — suspends until `fn(cb)` invokes `cb` with a result, or
/// the enclosing scope is cancelled first.
pub struct WaitFuture<T> {
    state: WaitState<T>,
    scope: Scope,
}

pub fn wait<T: Send + 'static>(
    scope: &Scope,
    register: impl FnOnce(WaitCallback<T>) + 'static,
) -> WaitFuture<T> {
    WaitFuture {
        state: WaitState::Start(Some(Box::new(register))),
        scope: scope.clone(),
    }
}

impl<T: Send + 'static> Future for WaitFuture<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.scope.is_cancelled() {
            this.state = WaitState::Done;
            return Poll::Ready(Err(Error::Cancelled));
        }

        loop {
            match &mut this.state {
                WaitState::Start(register) => {
                    let rt = current_runtime();
                    let wait_id = rt.alloc_wait_id();
                    let slot = rt.register_wait_slot(wait_id);
                    *slot.waker.borrow_mut() = Some(cx.waker().clone());
                    let sender = rt.inbound_sender();
                    let register = register.take().expect("WaitFuture polled after Start consumed");
                    let cb: WaitCallback<T> = Box::new(move |res: Result<T, Error>| {
                        let _ = sender.send(InboundMessage {
                            wait_id,
                            payload: Box::new(res),
                        });
                    });
                    register(cb);
                    this.state = WaitState::Registered(wait_id);
                    return Poll::Pending;
                }
                WaitState::Registered(wait_id) => {
                    let rt = current_runtime();
                    let Some(slot) = rt.wait_slot(*wait_id) else {
                        return Poll::Pending;
                    };
                    let mut result_slot = slot.result.borrow_mut();
                    if let Some(payload) = result_slot.take() {
                        drop(result_slot);
                        rt.remove_wait_slot(*wait_id);
                        this.state = WaitState::Done;
                        let res = *payload
                            .downcast::<Result<T, Error>>()
                            .expect("wait slot payload type mismatch");
                        return Poll::Ready(res);
                    }
                    *slot.waker.borrow_mut() = Some(cx.waker().clone());
                    return Poll::Pending;
                }
                WaitState::Done => panic!("WaitFuture polled after completion"),
            }
        }
    }
}

/// One-shot latch. All waiters receive the same value; `set` after the
/// first call is a no-op.
pub struct Event<T>(Rc<EventInner<T>>);

struct EventInner<T> {
    value: RefCell<Option<T>>,
    wakers: RefCell<VecDeque<Waker>>,
}

impl<T: Clone> Event<T> {
    pub fn new() -> Self {
        Event(Rc::new(EventInner {
            value: RefCell::new(None),
            wakers: RefCell::new(VecDeque::new()),
        }))
    }

    pub fn set(&self, value: T) {
        if self.0.value.borrow().is_some() {
            return;
        }
        *self.0.value.borrow_mut() = Some(value);
        for waker in self.0.wakers.borrow_mut().drain(..) {
            waker.wake();
        }
    }

    pub fn wait(&self) -> EventWait<T> {
        EventWait(self.0.clone())
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Event(self.0.clone())
    }
}

impl<T: Clone> Default for Event<T> {
    fn default() -> Self {
        Event::new()
    }
}

pub struct EventWait<T>(Rc<EventInner<T>>);

impl<T: Clone> Future for EventWait<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if let Some(v) = self.0.value.borrow().clone() {
            return Poll::Ready(v);
        }
        self.0.wakers.borrow_mut().push_back(cx.waker().clone());
        Poll::Pending
    }
}

/// `wait_all(fns)` — run every future to completion concurrently under a
/// shared child scope; cancel the remaining peers on the first error.
/// Empty input resolves immediately to `Ok(vec![])` (spec.md §9, open
/// question 3).
pub async fn wait_all<T: 'static>(
    scope: &Scope,
    futures: Vec<Pin<Box<dyn Future<Output = Result<T, Error>>>>>,
) -> Result<Vec<T>, Error> {
    if futures.is_empty() {
        return Ok(Vec::new());
    }
    let rt = current_runtime();
    let child_scope = scope.child();
    let total = futures.len();
    let results: Rc<RefCell<Vec<Option<T>>>> =
        Rc::new(RefCell::new((0..total).map(|_| None).collect()));
    let error: Rc<RefCell<Option<Error>>> = Rc::new(RefCell::new(None));
    let remaining = Rc::new(Cell::new(total));
    let done = Event::new();

    for (idx, fut) in futures.into_iter().enumerate() {
        let results = results.clone();
        let error = error.clone();
        let remaining = remaining.clone();
        let done = done.clone();
        let cancel_scope = child_scope.clone();
        rt.run(
            async move {
                match fut.await {
                    Ok(value) => {
                        results.borrow_mut()[idx] = Some(value);
                    }
                    Err(e) => {
                        if error.borrow().is_none() {
                            *error.borrow_mut() = Some(e);
                        }
                        cancel_scope.cancel();
                    }
                }
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 || error.borrow().is_some() {
                    done.set(());
                }
            },
            None,
            Some(&child_scope),
        );
    }

    done.wait().await;

    if let Some(e) = error.borrow_mut().take() {
        return Err(e);
    }
    let values = results
        .borrow_mut()
        .iter_mut()
        .map(|slot| slot.take().expect("wait_all: missing result for completed peer"))
        .collect();
    Ok(values)
}

struct TimerFuture {
    deadline: Instant,
}

impl Future for TimerFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }
        current_runtime().register_timer(self.deadline, cx.waker().clone());
        Poll::Pending
    }
}

struct TimeoutFuture<T> {
    fut: Pin<Box<dyn Future<Output = Result<T, Error>>>>,
    timer: TimerFuture,
    scope: Scope,
}

impl<T> Future for TimeoutFuture<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.scope.is_cancelled() {
            return Poll::Ready(Err(Error::Cancelled));
        }
        if let Poll::Ready(res) = this.fut.as_mut().poll(cx) {
            return Poll::Ready(res);
        }
        match Pin::new(&mut this.timer).poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(Error::Timeout)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// `timeout(ms, fn)` — races `fut` against a timer; on expiry raises
/// `Timeout` with no side effects on the peer (the underlying operation,
/// if still running, is simply abandoned — it is the caller's
/// responsibility to have wired its scope for cancellation).
pub fn timeout<T: 'static>(
    scope: &Scope,
    ms: u64,
    fut: Pin<Box<dyn Future<Output = Result<T, Error>>>>,
) -> impl Future<Output = Result<T, Error>> {
    TimeoutFuture {
        fut,
        timer: TimerFuture {
            deadline: Instant::now() + Duration::from_millis(ms),
        },
        scope: scope.clone(),
    }
}

/// `event()` — construct a fresh one-shot latch.
pub fn event<T: Clone + 'static>() -> Event<T> {
    Event::new()
}

/// FIFO serializer.
pub struct Mutex(Rc<MutexInner>);

struct MutexInner {
    locked: Cell<bool>,
    waiters: RefCell<VecDeque<Waker>>,
}

/// `mutex()` — construct a fresh FIFO serializer.
pub fn mutex() -> Mutex {
    Mutex::new()
}

impl Mutex {
    pub fn new() -> Self {
        Mutex(Rc::new(MutexInner {
            locked: Cell::new(false),
            waiters: RefCell::new(VecDeque::new()),
        }))
    }

    pub fn lock(&self) -> LockFuture {
        LockFuture(self.0.clone())
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Mutex::new()
    }
}

impl Clone for Mutex {
    fn clone(&self) -> Self {
        Mutex(self.0.clone())
    }
}

pub struct LockFuture(Rc<MutexInner>);

impl Future for LockFuture {
    type Output = MutexGuard;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<MutexGuard> {
        if !self.0.locked.get() {
            self.0.locked.set(true);
            return Poll::Ready(MutexGuard(self.0.clone()));
        }
        self.0.waiters.borrow_mut().push_back(cx.waker().clone());
        Poll::Pending
    }
}

pub struct MutexGuard(Rc<MutexInner>);

impl Drop for MutexGuard {
    fn drop(&mut self) {
        self.0.locked.set(false);
        if let Some(waker) = self.0.waiters.borrow_mut().pop_front() {
            waker.wake();
        }
    }
}

/// `memoize(fn)` — coalesces concurrent calls keyed by `key` (typically a
/// `self` identity such as an entity id) into one underlying execution.
/// All concurrent waiters observe the same `Rc<Result<T, Error>>`; once
/// it resolves the cache entry is evicted so the next call starts fresh.
pub struct Memoized;

impl Memoized {
    pub async fn run<T: 'static>(
        key: usize,
        make: impl FnOnce() -> Pin<Box<dyn Future<Output = Result<T, Error>>>> + 'static,
    ) -> Rc<Result<T, Error>> {
        let rt = current_runtime();
        let type_id = std::any::TypeId::of::<MemoEntry<T>>();

        if let Some(entry) = rt.memo_cache_get::<MemoEntry<T>>(key) {
            return entry.done.wait().await;
        }

        let done = Event::new();
        let entry = Rc::new(MemoEntry { done: done.clone() });
        rt.memo_cache_insert(key, entry);

        let fut = make();
        let rt_for_task = rt.clone();
        rt.run(
            async move {
                let res = fut.await;
                rt_for_task.memo_cache_remove(key, type_id);
                done.set(Rc::new(res));
            },
            None,
            None,
        );

        done.wait().await
    }
}

struct MemoEntry<T> {
    done: Event<Rc<Result<T, Error>>>,
}

pub fn memoize<T: 'static>(
    key: usize,
    make: impl FnOnce() -> Pin<Box<dyn Future<Output = Result<T, Error>>>> + 'static,
) -> impl Future<Output = Rc<Result<T, Error>>> {
    Memoized::run(key, make)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn wait_all_collects_results_in_input_order() {
        let runtime = Runtime::new();
        let scope = runtime.root_scope();
        let out = Rc::new(RefCell::new(None));
        let out2 = out.clone();
        runtime.run(
            {
                let scope = scope.clone();
                async move {
                    let futures: Vec<Pin<Box<dyn Future<Output = Result<i32, Error>>>>> =
                        vec![Box::pin(async { Ok(1) }), Box::pin(async { Ok(2) }), Box::pin(async { Ok(3) })];
                    let r = wait_all(&scope, futures).await;
                    *out2.borrow_mut() = Some(r);
                }
            },
            None,
            Some(&scope),
        );
        runtime.run_until_idle();
        match out.borrow().as_ref() {
            Some(Ok(v)) => assert_eq!(v, &vec![1, 2, 3]),
            other => panic!("expected Ok([1, 2, 3]), got {other:?}"),
        }
    }

    #[test]
    fn wait_all_on_empty_input_resolves_immediately_to_an_empty_vec() {
        let runtime = Runtime::new();
        let scope = runtime.root_scope();
        let out: Rc<RefCell<Option<Result<Vec<i32>, Error>>>> = Rc::new(RefCell::new(None));
        let out2 = out.clone();
        runtime.run(
            {
                let scope = scope.clone();
                async move {
                    let r = wait_all(&scope, Vec::new()).await;
                    *out2.borrow_mut() = Some(r);
                }
            },
            None,
            Some(&scope),
        );
        runtime.poll_tick();
        match out.borrow().as_ref() {
            Some(Ok(v)) => assert!(v.is_empty()),
            other => panic!("expected Ok([]), got {other:?}"),
        }
    }

    #[test]
    fn wait_all_surfaces_the_first_error_and_cancels_the_remaining_peers() {
        let runtime = Runtime::new();
        let scope = runtime.root_scope();
        let out = Rc::new(RefCell::new(None));
        let out2 = out.clone();
        runtime.run(
            {
                let scope = scope.clone();
                async move {
                    let futures: Vec<Pin<Box<dyn Future<Output = Result<i32, Error>>>>> = vec![
                        Box::pin(async { Ok(1) }),
                        Box::pin(async { Err(Error::protocol("boom")) }),
                    ];
                    let r = wait_all(&scope, futures).await;
                    *out2.borrow_mut() = Some(r);
                }
            },
            None,
            Some(&scope),
        );
        runtime.run_until_idle();
        assert!(matches!(&*out.borrow(), Some(Err(Error::Protocol(_)))));
    }

    #[test]
    fn event_delivers_the_same_value_to_every_waiter_and_ignores_a_second_set() {
        let runtime = Runtime::new();
        let scope = runtime.root_scope();
        let ev: Event<i32> = event();
        let a = Rc::new(RefCell::new(None));
        let b = Rc::new(RefCell::new(None));

        for out in [&a, &b] {
            let out = out.clone();
            let ev = ev.clone();
            runtime.run(
                async move {
                    *out.borrow_mut() = Some(ev.wait().await);
                },
                None,
                Some(&scope),
            );
        }
        runtime.poll_tick();
        assert!(a.borrow().is_none());

        ev.set(7);
        ev.set(9);
        runtime.run_until_idle();
        assert_eq!(*a.borrow(), Some(7));
        assert_eq!(*b.borrow(), Some(7));
    }

    #[test]
    fn memoize_coalesces_concurrent_callers_under_the_same_key() {
        let runtime = Runtime::new();
        let scope = runtime.root_scope();
        let calls = Rc::new(Cell::new(0));
        let a = Rc::new(RefCell::new(None));
        let b = Rc::new(RefCell::new(None));

        for out in [&a, &b] {
            let out = out.clone();
            let calls = calls.clone();
            runtime.run(
                async move {
                    let r = memoize(42, move || {
                        calls.set(calls.get() + 1);
                        Box::pin(async { Ok::<i32, Error>(5) }) as Pin<Box<dyn Future<Output = Result<i32, Error>>>>
                    })
                    .await;
                    *out.borrow_mut() = Some(r);
                },
                None,
                Some(&scope),
            );
        }
        runtime.run_until_idle();
        assert_eq!(calls.get(), 1);
        assert!(matches!(a.borrow().as_deref(), Some(Ok(5))));
        assert!(matches!(b.borrow().as_deref(), Some(Ok(5))));
    }

    #[test]
    fn timer_future_resolves_once_its_deadline_has_passed() {
        let deadline = Instant::now();
        let mut fut = TimerFuture { deadline };
        let waker = futures_noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert_eq!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(()));
    }

    fn futures_noop_waker() -> Waker {
        use std::task::{RawWaker, RawWakerVTable};
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            raw_waker()
        }
        fn raw_waker() -> RawWaker {
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        unsafe { Waker::from_raw(raw_waker()) }
    }
}
