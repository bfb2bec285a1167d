//! Core runtime for a Debug Adapter Protocol client (spec.md §1-§2):
//! transport (`transport`), session lifecycle (`session`), a reactive
//! entity graph with URI addressing (`graph`, `uri`), and a cooperative
//! async scheduler (`runtime`). [`debugger::Debugger`] is the
//! consumer-facing facade tying all four together (spec.md §6.4).

pub mod config;
pub mod debugger;
pub mod error;
pub mod graph;
pub mod log;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod uri;

pub use config::RuntimeConfig;
pub use debugger::Debugger;
pub use error::{Error, Result};
