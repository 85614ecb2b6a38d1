//! Receiver configuration.

use std::time::Duration;

/// Default MCS endpoint host.
pub const DEFAULT_MCS_HOST: &str = "mtalk.google.com";

/// Default MCS endpoint port.
pub const DEFAULT_MCS_PORT: u16 = 5228;

/// Tunable knobs for a [`crate::PushReceiver`].
///
/// The defaults track the behaviour of the production MCS endpoint: the
/// server heartbeats roughly every four minutes, so a five-minute read
/// deadline detects a dead link one missed heartbeat late.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Per-read deadline on the connection; expiry is treated as a dead
    /// link. Default five minutes.
    pub read_timeout: Duration,
    /// Interval between client-originated keepalive pings. Default four
    /// minutes.
    pub heartbeat_interval: Duration,
    /// Ceiling on the linear reconnect backoff. Default 15 seconds.
    pub max_backoff: Duration,
    /// Bound on the event queue to the caller. Default 100 events.
    pub event_buffer: usize,
    /// Log per-frame protocol traffic at debug level. Default off.
    pub debug_log: bool,
    /// MCS endpoint host; also used as the TLS server name.
    pub mcs_host: String,
    /// MCS endpoint port.
    pub mcs_port: u16,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5 * 60),
            heartbeat_interval: Duration::from_secs(4 * 60),
            max_backoff: Duration::from_secs(15),
            event_buffer: 100,
            debug_log: false,
            mcs_host: DEFAULT_MCS_HOST.to_owned(),
            mcs_port: DEFAULT_MCS_PORT,
        }
    }
}

impl ReceiverConfig {
    /// Set the per-read deadline.
    #[must_use]
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Set the keepalive ping interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Set the reconnect backoff ceiling.
    #[must_use]
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Set the event queue capacity.
    #[must_use]
    pub fn event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    /// Enable or disable per-frame debug logging.
    #[must_use]
    pub fn debug_log(mut self, debug_log: bool) -> Self {
        self.debug_log = debug_log;
        self
    }

    /// Point the receiver at a different MCS endpoint.
    #[must_use]
    pub fn mcs_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.mcs_host = host.into();
        self.mcs_port = port;
        self
    }

    /// Clamp values to sane bounds.
    ///
    /// Zero durations and a zero-capacity event queue cannot work; they are
    /// raised to one millisecond and one slot respectively rather than
    /// panicking at run time.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let floor = Duration::from_millis(1);
        self.read_timeout = self.read_timeout.max(floor);
        self.heartbeat_interval = self.heartbeat_interval.max(floor);
        self.max_backoff = self.max_backoff.max(Duration::from_secs(1));
        self.event_buffer = self.event_buffer.max(1);
        self
    }
}
