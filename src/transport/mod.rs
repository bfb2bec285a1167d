//! Transport layer (component A, spec.md §4.A): framed I/O over a
//! `Channel`, and the client-facing request/event/reverse-request API
//! built on top of it.

pub mod channel;
pub mod client;
pub mod framing;
pub mod protocol;

pub use channel::Channel;
pub use client::Client;
pub use protocol::{EventMessage, Message, RequestMessage, ResponseMessage};
