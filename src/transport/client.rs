//! Client-facing transport API (spec.md §4.A): `call`, `on_event`,
//! `register_reverse_handler`, `close`. Grounded on the teacher's
//! `dap::yadap::io::DapIo` (a background reader paired with a
//! request/response correlation table) but rewritten end-to-end for the
//! client's direction of travel — the teacher's `DapIo` answers requests
//! arriving from an editor; this answers requests the adapter sends
//! *back* to us (reverse requests) while we are the one calling out.
//!
//! Reading a `Channel` is a blocking operation, so the read side runs on
//! a dedicated OS thread and feeds decoded frames back across an
//! `Arc<Mutex<..>>`-guarded table into the single-threaded runtime via
//! `runtime::wait`'s cross-thread delivery path (spec.md §5).

use crate::error::Error;
use crate::runtime::{current_runtime, wait, Scope, WaitCallback};
use crate::transport::channel::Channel;
use crate::transport::framing::{FrameReader, FrameWriter};
use crate::transport::protocol::{EventMessage, Message, RequestMessage, ResponseMessage};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct Shared {
    pending: Mutex<HashMap<i64, WaitCallback<ResponseMessage>>>,
    backlog: Mutex<VecDeque<Message>>,
    next_waiter: Mutex<Option<WaitCallback<Message>>>,
    closed: AtomicBool,
}

impl Shared {
    fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().unwrap();
        for (_, cb) in pending.drain() {
            cb(Err(Error::ChannelClosed));
        }
        if let Some(cb) = self.next_waiter.lock().unwrap().take() {
            cb(Err(Error::ChannelClosed));
        }
    }
}

type EventHandler = Box<dyn FnMut(Value)>;
type ReverseHandler = Box<dyn FnMut(Value) -> Result<Value, Error>>;

struct ClientInner<W> {
    writer: RefCell<FrameWriter<W>>,
    next_seq: std::cell::Cell<i64>,
    shared: Arc<Shared>,
    event_handlers: RefCell<HashMap<String, Vec<EventHandler>>>,
    reverse_handlers: RefCell<HashMap<String, ReverseHandler>>,
}

/// A connected DAP client. Cheap to clone; clones share one connection.
pub struct Client<W>(Rc<ClientInner<W>>);

impl<W> Clone for Client<W> {
    fn clone(&self) -> Self {
        Client(self.0.clone())
    }
}

impl<W: Channel + 'static> Client<W> {
    /// Spawns the background reader thread over `read_channel` and a
    /// dispatch task over `scope` that drains events/reverse-requests as
    /// they arrive. `write_channel` stays on the calling thread and backs
    /// outgoing `call`s.
    pub fn spawn<R>(read_channel: R, write_channel: W, scope: &Scope) -> Client<W>
    where
        R: Channel + Send + 'static,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            backlog: Mutex::new(VecDeque::new()),
            next_waiter: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let reader_shared = shared.clone();
        std::thread::spawn(move || read_loop(read_channel, reader_shared));

        let client = Client(Rc::new(ClientInner {
            writer: RefCell::new(FrameWriter::new(write_channel)),
            next_seq: std::cell::Cell::new(1),
            shared,
            event_handlers: RefCell::new(HashMap::new()),
            reverse_handlers: RefCell::new(HashMap::new()),
        }));

        let dispatch_client = client.clone();
        let dispatch_scope = scope.child();
        current_runtime().run(
            async move { dispatch_client.dispatch_loop(&dispatch_scope).await },
            None,
            Some(scope),
        );

        client
    }

    /// Sends `command` with `arguments` and suspends until the adapter's
    /// response arrives, or the scope is cancelled, or the channel closes
    /// — in which case any request still pending is rejected with
    /// `Error::ChannelClosed` (spec.md §4.A "pending-future rejection").
    pub async fn call(&self, scope: &Scope, command: impl Into<String>, arguments: Value) -> Result<Value, Error> {
        let command = command.into();
        let seq = self.0.next_seq.get();
        self.0.next_seq.set(seq + 1);

        self.0
            .writer
            .borrow_mut()
            .write_message(&Message::Request(RequestMessage {
                seq,
                command: command.clone(),
                arguments,
            }))?;

        let pending = self.0.shared.pending.clone();
        let shared_for_check = self.0.shared.clone();
        let response = wait(scope, move |cb| {
            if shared_for_check.closed.load(Ordering::SeqCst) {
                cb(Err(Error::ChannelClosed));
                return;
            }
            pending.lock().unwrap().insert(seq, cb);
        })
        .await?;

        if response.success {
            Ok(response.body.unwrap_or(Value::Null))
        } else {
            Err(Error::adapter(command, response.message.unwrap_or_default()))
        }
    }

    /// Registers `handler` for events named `name`. Multiple handlers may
    /// be registered for the same event; they run in registration order.
    pub fn on_event(&self, name: impl Into<String>, handler: impl FnMut(Value) + 'static) {
        self.0
            .event_handlers
            .borrow_mut()
            .entry(name.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Registers the (single) handler for a reverse request named
    /// `command` (e.g. `runInTerminal`, `startDebugging`). Replaces any
    /// previously-registered handler for the same command.
    pub fn register_reverse_handler(
        &self,
        command: impl Into<String>,
        handler: impl FnMut(Value) -> Result<Value, Error> + 'static,
    ) {
        self.0
            .reverse_handlers
            .borrow_mut()
            .insert(command.into(), Box::new(handler));
    }

    /// Marks the connection closed and rejects every request still
    /// awaiting a response. Idempotent.
    pub fn close(&self) {
        self.0.shared.closed.store(true, Ordering::SeqCst);
        self.0.shared.fail_all_pending();
    }

    async fn dispatch_loop(&self, scope: &Scope) {
        loop {
            match self.next_message(scope).await {
                Ok(Message::Event(EventMessage { event, body, .. })) => {
                    if let Some(handlers) = self.0.event_handlers.borrow_mut().get_mut(&event) {
                        let payload = body.unwrap_or(Value::Null);
                        for handler in handlers.iter_mut() {
                            handler(payload.clone());
                        }
                    }
                }
                Ok(Message::Request(req)) => self.handle_reverse_request(req),
                Ok(Message::Response(_)) => {
                    // Correlated responses are resolved directly by `read_loop`;
                    // reaching here would mean a response slipped past the
                    // pending table (already answered, or never sent).
                }
                Err(_) => {
                    self.close();
                    return;
                }
            }
        }
    }

    fn handle_reverse_request(&self, req: RequestMessage) {
        let outcome = match self.0.reverse_handlers.borrow_mut().get_mut(&req.command) {
            Some(handler) => handler(req.arguments),
            None => Err(Error::protocol(format!("no handler registered for reverse request `{}`", req.command))),
        };
        let seq = self.0.next_seq.get();
        self.0.next_seq.set(seq + 1);
        let response = match outcome {
            Ok(body) => ResponseMessage::success(req.seq, seq, req.command.clone(), Some(body)),
            Err(e) => ResponseMessage::failure(req.seq, seq, req.command.clone(), e.to_string()),
        };
        let _ = self.0.writer.borrow_mut().write_message(&Message::Response(response));
    }

    fn next_message(&self, scope: &Scope) -> impl std::future::Future<Output = Result<Message, Error>> {
        let shared = self.0.shared.clone();
        wait(scope, move |cb| {
            let mut backlog = shared.backlog.lock().unwrap();
            if let Some(msg) = backlog.pop_front() {
                drop(backlog);
                cb(Ok(msg));
                return;
            }
            drop(backlog);
            if shared.closed.load(Ordering::SeqCst) {
                cb(Err(Error::ChannelClosed));
                return;
            }
            *shared.next_waiter.lock().unwrap() = Some(cb);
        })
    }
}

fn read_loop<R: Channel>(channel: R, shared: Arc<Shared>) {
    let mut reader = FrameReader::new(channel);
    loop {
        let value = match reader.read_message() {
            Ok(value) => value,
            Err(_) => {
                shared.closed.store(true, Ordering::SeqCst);
                shared.fail_all_pending();
                return;
            }
        };
        let message: Message = match serde_json::from_value(value) {
            Ok(m) => m,
            Err(_) => continue,
        };
        match message {
            Message::Response(resp) => {
                if let Some(cb) = shared.pending.lock().unwrap().remove(&resp.request_seq) {
                    cb(Ok(resp));
                }
            }
            other => {
                let mut waiter = shared.next_waiter.lock().unwrap();
                if let Some(cb) = waiter.take() {
                    drop(waiter);
                    cb(Ok(other));
                } else {
                    shared.backlog.lock().unwrap().push_back(other);
                }
            }
        }
    }
}
