use std::time::Duration;

/// Programmatic settings for the core's own ambient concerns. The crate
/// does not parse a configuration file or discover launch configurations
/// (spec non-goal) — a host embeds this crate and constructs a
/// `RuntimeConfig` directly, the same way the teacher's binaries build an
/// `Args` struct instead of reading ad-hoc environment variables inline.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Default timeout applied to `call()` if the caller does not wrap it
    /// in an explicit `timeout()`.
    pub default_request_timeout: Duration,
    /// Upper bound on requests awaiting a response on a single channel
    /// before `call()` itself starts rejecting with `ChannelClosed`-style
    /// backpressure. `None` disables the bound.
    pub max_in_flight_requests: Option<usize>,
    /// `log` target used for transport frame tracing.
    pub transport_log_target: &'static str,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_request_timeout: Duration::from_secs(10),
            max_in_flight_requests: Some(256),
            transport_log_target: "dap-core::transport",
        }
    }
}
