//! Watch / informer constants.

/// Default period of the forced full re-list, in seconds.
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 30;

/// Delay before a new list+watch attempt after a failure or a closed stream, in seconds.
pub const RELIST_RETRY_SECS: u64 = 1;

/// Number of recent watch events kept by the in-memory store.
pub const WATCH_HISTORY_CAPACITY: usize = 1024;

/// Capacity of the live watch broadcast channel.
pub const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the outgoing event channel of the event broadcaster.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default HTTP request timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Server-side timeout requested for a single watch call, in seconds.
pub const WATCH_TIMEOUT_SECS: u64 = 290;
