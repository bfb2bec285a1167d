//! Session lifecycle & DAP state machine (component B, spec.md §4.B).
//! [`start`] brings up one session end-to-end: mints the `Session`
//! entity, spawns its `Client`, wires event translation, and drives the
//! handshake. [`supervisor::SessionSupervisor`] tracks the resulting
//! forest for bulk teardown and breakpoint resync.

pub mod events;
pub mod handshake;
pub mod supervisor;

pub use handshake::StartMethod;
pub use supervisor::SessionSupervisor;

use crate::error::Error;
use crate::graph::entities::Session;
use crate::graph::{transaction, EntityId, GraphStore};
use crate::runtime::Scope;
use crate::transport::{Channel, Client};
use serde_json::Value;
use std::rc::Rc;

/// A running session's id and its transport client, returned by
/// [`start`]. Generic in the channel type so a consumer can hold
/// sessions over different transports (stdio vs. socket) side by side.
pub struct SessionHandle<W: Channel + 'static> {
    pub id: EntityId,
    pub client: Client<W>,
}

/// Creates a new top-level `Session` entity, connects its transport,
/// wires event translation and reverse-request handling, then drives the
/// handshake to completion (spec.md §4.B "Handshake sequence"). Returns
/// once the session reaches `running` or `failed`.
#[allow(clippy::too_many_arguments)]
pub async fn start<R, W>(
    store: Rc<GraphStore>,
    supervisor: Rc<SessionSupervisor>,
    scope: &Scope,
    read_channel: R,
    write_channel: W,
    name: impl Into<String>,
    adapter_type: impl Into<String>,
    start_method: StartMethod,
    run_in_terminal: Option<Rc<dyn Fn(Value) -> Result<Value, Error>>>,
) -> Result<SessionHandle<W>, Error>
where
    R: Channel + Send + 'static,
    W: Channel + 'static,
{
    let adapter_type = adapter_type.into();
    let method_name = match &start_method {
        StartMethod::Launch(_) => "launch",
        StartMethod::Attach(_) => "attach",
    };

    let session = transaction(|| {
        let id = store.sessions.insert(store.minter(), Session::new(name, method_name, None));
        store.debugger.sessions.link(id);
        id
    });

    let client = Client::spawn(read_channel, write_channel, scope);
    supervisor.track(session, client.clone());

    events::install(store.clone(), supervisor.clone(), session, scope.clone(), client.clone(), run_in_terminal);

    handshake::run(store, session, scope, &client, &adapter_type, start_method).await?;

    Ok(SessionHandle { id: session, client })
}
