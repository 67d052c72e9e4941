//! Application-wide constants for slackirc.
//!
//! This module centralizes timing and sizing constants so the Slack session
//! client, the IRC link and the bridge glue agree on them. Constants are
//! grouped by domain.
//!
//! # Categories
//!
//! - **Slack session**: keepalive, retry and queue sizing
//! - **Dispatch**: handler worker pool
//! - **IRC**: reconnect and authentication pacing
//! - **Bridge**: relay buffering and shutdown pacing

use std::time::Duration;

// ============================================================================
// Slack session
// ============================================================================

/// Default Slack Web API base URL.
pub const SLACK_API_BASE_URL: &str = "https://slack.com/api";

/// HTTP client request timeout for Slack Web API calls.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed to read the next pong from the Slack socket.
///
/// The read deadline is pushed forward by this amount every time a pong
/// arrives. A socket that stays silent longer than this is considered dead.
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Delay between failed bootstrap/dial attempts.
///
/// Fixed, no backoff growth and no ceiling.
pub const SESSION_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Capacity of the outbound message queue feeding the write pump.
///
/// Small on purpose: `Client::send` waits when the queue is full.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 3;

/// Keepalive ping period for a given pong wait (9/10 of it).
#[must_use]
pub const fn ping_period(pong_wait: Duration) -> Duration {
    Duration::from_millis(pong_wait.as_millis() as u64 * 9 / 10)
}

// ============================================================================
// Dispatch
// ============================================================================

/// Number of worker tasks draining the handler job queue.
pub const DISPATCH_WORKERS: usize = 4;

// ============================================================================
// IRC
// ============================================================================

/// Delay between failed IRC reconnect attempts.
pub const IRC_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Wait after IRC registration before sending the auth message.
pub const IRC_AUTH_DELAY: Duration = Duration::from_secs(5);

/// Wait after the auth message before joining the channel.
pub const IRC_AUTH_SETTLE: Duration = Duration::from_secs(3);

/// Buffered IRC events between the reader task and the bridge.
pub const IRC_EVENT_BUFFER: usize = 256;

// ============================================================================
// Bridge
// ============================================================================

/// IRC lines waiting to be posted to Slack. Further lines are dropped
/// while Slack is unreachable.
pub const SLACK_RELAY_BUFFER: usize = 64;

/// Time given to Slack handlers to post their last notices before `QUIT`.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_period_is_nine_tenths_of_pong_wait() {
        assert_eq!(ping_period(PONG_WAIT), Duration::from_secs(54));
        assert_eq!(
            ping_period(Duration::from_millis(1000)),
            Duration::from_millis(900)
        );
    }
}
