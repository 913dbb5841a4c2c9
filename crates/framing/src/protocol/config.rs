//! Per-message framing configuration.

use std::time::Duration;

/// Unacknowledged bytes above which `write` asks the producer to pause.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Knobs that influence how an outgoing message is framed.
///
/// The defaults describe a server response that is date-stamped and, unless
/// the caller sets a length or enables chunked framing, delimited by closing
/// the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingConfig {
    pub high_water_mark: usize,
    pub send_date: bool,
    pub use_chunked_encoding_by_default: bool,
    pub keep_alive_timeout: Option<Duration>,
    pub max_requests_on_connection_reached: bool,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            send_date: true,
            use_chunked_encoding_by_default: false,
            keep_alive_timeout: None,
            max_requests_on_connection_reached: false,
        }
    }
}

impl FramingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    #[must_use]
    pub fn with_send_date(mut self, send_date: bool) -> Self {
        self.send_date = send_date;
        self
    }

    /// Frame bodies of unknown length with `Transfer-Encoding: chunked` instead
    /// of closing the connection after the message.
    #[must_use]
    pub fn with_chunked_encoding_by_default(mut self, chunked: bool) -> Self {
        self.use_chunked_encoding_by_default = chunked;
        self
    }

    #[must_use]
    pub fn with_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.keep_alive_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_max_requests_on_connection_reached(mut self, reached: bool) -> Self {
        self.max_requests_on_connection_reached = reached;
        self
    }
}
