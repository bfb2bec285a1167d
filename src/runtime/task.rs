use crate::runtime::scope::{pop_current_scope, push_current_scope, Scope};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

pub(crate) struct Task {
    pub(crate) id: u64,
    future: RefCell<Option<Pin<Box<dyn Future<Output = ()>>>>>,
    pub(crate) scope: Scope,
    on_complete: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Task {
    pub(crate) fn new(
        id: u64,
        future: Pin<Box<dyn Future<Output = ()>>>,
        scope: Scope,
        on_complete: Option<Box<dyn FnOnce()>>,
    ) -> Rc<Task> {
        Rc::new(Task {
            id,
            future: RefCell::new(Some(future)),
            scope,
            on_complete: RefCell::new(on_complete),
        })
    }

    /// Polls the task once. Returns `true` if it finished (the future
    /// resolved or the task was cancelled and dropped).
    pub(crate) fn poll(self: &Rc<Task>, ready_queue: &Rc<RefCell<std::collections::VecDeque<Rc<Task>>>>) -> bool {
        if self.scope.is_cancelled() && self.future.borrow().is_none() {
            return true;
        }
        let waker = waker_for(self.clone(), ready_queue.clone());
        let mut cx = Context::from_waker(&waker);

        let mut slot = self.future.borrow_mut();
        let Some(fut) = slot.as_mut() else {
            return true;
        };

        push_current_scope(self.scope.clone());
        let poll_result = fut.as_mut().poll(&mut cx);
        pop_current_scope();

        match poll_result {
            Poll::Ready(()) => {
                *slot = None;
                drop(slot);
                if let Some(cb) = self.on_complete.borrow_mut().take() {
                    cb();
                }
                true
            }
            Poll::Pending => false,
        }
    }
}

type ReadyQueue = Rc<RefCell<std::collections::VecDeque<Rc<Task>>>>;

fn waker_for(task: Rc<Task>, ready_queue: ReadyQueue) -> Waker {
    let data: Rc<(Rc<Task>, ReadyQueue)> = Rc::new((task, ready_queue));
    let raw = RawWaker::new(Rc::into_raw(data) as *const (), &VTABLE);
    unsafe { Waker::from_raw(raw) }
}

type WakeData = (Rc<Task>, ReadyQueue);

unsafe fn clone_fn(ptr: *const ()) -> RawWaker {
    let data = Rc::from_raw(ptr as *const WakeData);
    let cloned = data.clone();
    std::mem::forget(data);
    RawWaker::new(Rc::into_raw(cloned) as *const (), &VTABLE)
}

unsafe fn wake_fn(ptr: *const ()) {
    let data = Rc::from_raw(ptr as *const WakeData);
    enqueue(&data);
}

unsafe fn wake_by_ref_fn(ptr: *const ()) {
    let data = &*(ptr as *const WakeData);
    enqueue(data);
}

unsafe fn drop_fn(ptr: *const ()) {
    drop(Rc::from_raw(ptr as *const WakeData));
}

fn enqueue(data: &WakeData) {
    let (task, ready_queue) = data;
    let mut q = ready_queue.borrow_mut();
    if !q.iter().any(|t| Rc::ptr_eq(t, task)) {
        q.push_back(task.clone());
    }
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_fn, wake_fn, wake_by_ref_fn, drop_fn);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct YieldOnce(bool);

    impl Future for YieldOnce {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    #[test]
    fn poll_drives_a_pending_future_through_to_completion() {
        let queue: ReadyQueue = Rc::new(RefCell::new(VecDeque::new()));
        let scope = Scope::root();
        let task = Task::new(1, Box::pin(YieldOnce(false)), scope, None);

        assert!(!task.poll(&queue));
        assert_eq!(queue.borrow().len(), 1);

        let requeued = queue.borrow_mut().pop_front().unwrap();
        assert!(requeued.poll(&queue));
    }

    #[test]
    fn waking_the_same_task_twice_before_it_is_drained_only_queues_it_once() {
        let queue: ReadyQueue = Rc::new(RefCell::new(VecDeque::new()));
        let scope = Scope::root();
        let task = Task::new(1, Box::pin(YieldOnce(false)), scope, None);
        let waker = waker_for(task.clone(), queue.clone());
        waker.wake_by_ref();
        waker.wake_by_ref();
        assert_eq!(queue.borrow().len(), 1);
    }

    #[test]
    fn a_cancelled_task_with_no_future_left_reports_done_without_polling() {
        let queue: ReadyQueue = Rc::new(RefCell::new(VecDeque::new()));
        let scope = Scope::root();
        let task = Task::new(1, Box::pin(std::future::pending::<()>()), scope.clone(), None);
        task.poll(&queue);
        scope.cancel();
        *task.future.borrow_mut() = None;
        assert!(task.poll(&queue));
    }

    #[test]
    fn on_complete_runs_exactly_once_when_the_future_resolves() {
        let queue: ReadyQueue = Rc::new(RefCell::new(VecDeque::new()));
        let scope = Scope::root();
        let fired = Rc::new(RefCell::new(0));
        let fired2 = fired.clone();
        let task = Task::new(1, Box::pin(async {}), scope, Some(Box::new(move || *fired2.borrow_mut() += 1)));
        assert!(task.poll(&queue));
        assert_eq!(*fired.borrow(), 1);
    }
}
