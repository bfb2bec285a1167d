use crate::graph::EntityId;
use crate::uri::Uri;
use std::fmt;

/// Crate-wide error type. Variants are grouped by the subsystem that raises
/// them; see `is_fatal` for the propagation policy attached to each.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- transport errors -------------------------------------------
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("adapter rejected `{command}`: {message}")]
    Adapter { command: String, message: String },
    #[error("channel closed")]
    ChannelClosed,
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("malformed DAP frame: {0}")]
    Json(#[from] serde_json::Error),

    // --------------------------------- entity graph errors -----------------------------------------
    #[error("operation on invalidated entity {0:?}")]
    StaleEntity(EntityId),
    #[error("entity {0:?} not found")]
    EntityNotFound(EntityId),

    // --------------------------------- async runtime errors -----------------------------------------
    #[error("scope cancelled")]
    Cancelled,
    #[error("operation timed out")]
    Timeout,

    // --------------------------------- schema / resolution --------------------------------------
    #[error("malformed event or unknown field: {0}")]
    Schema(String),
    #[error("failed to resolve uri `{0}`")]
    Resolve(Uri),

    // --------------------------------- session lifecycle ---------------------------------------
    #[error("session is not in a state that allows this operation: {0}")]
    InvalidSessionState(String),
}

impl Error {
    /// Whether this error is fatal to the owning session (forces a state
    /// transition to `terminated`/`disconnected`) or local to the calling
    /// task/operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::ChannelClosed)
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn adapter(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Adapter {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Context path attached to an error for diagnostics, e.g. `session(3)/stackTrace`.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext(pub Vec<String>);

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Transforms a `Result` into an `Option`, logging the error if it occurs.
/// Mirrors the teacher's `weak_error!`/`muted_error!` pair: non-fatal
/// errors are expected in normal operation (a stale frame, a cancelled
/// speculative fetch) and should not unwind the caller.
#[macro_export]
macro_rules! weak_error {
    ($res:expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "dap-core", "{e:#}");
                None
            }
        }
    };
    ($res:expr, $msg:tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "dap-core", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

#[macro_export]
macro_rules! muted_error {
    ($res:expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!(target: "dap-core", "{e:#}");
                None
            }
        }
    };
}
