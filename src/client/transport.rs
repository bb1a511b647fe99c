//! Connection lifecycle for one turn request.
//!
//! Opening the event stream is modelled as an explicit state machine:
//!
//! ```text
//! Connecting ──ok──▶ Open ──▶ Closed
//!     │  ▲
//!  retriable  retry()
//!     ▼  │
//!   Retrying ──attempts exhausted / fatal──▶ Closed
//! ```
//!
//! Only failures that happen before the server accepted the turn are
//! retried. Once the stream is open the server has persisted the user
//! message, so replaying the request would duplicate it.

use std::time::Duration;

use rand::Rng;

use crate::client::error::ClientError;

/// What to do about a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Fatal,
    Retriable,
}

/// Map a failure to fatal or retriable.
pub fn classify(error: &ClientError) -> Disposition {
    match error {
        ClientError::Transport { connect: true, .. } => Disposition::Retriable,
        ClientError::Http { status, .. } if matches!(status, 429 | 502 | 503 | 504) => {
            Disposition::Retriable
        }
        _ => Disposition::Fatal,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Completed,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting { attempt: u32 },
    Open,
    Retrying { attempt: u32, delay: Duration },
    Closed(CloseReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt + 1`: doubling from `base_delay`,
    /// capped at `max_delay`, plus up to 20% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        let jitter_ms = (backoff.as_millis() / 5) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        backoff + Duration::from_millis(jitter)
    }
}

#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    policy: RetryPolicy,
}

impl Connection {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Connecting { attempt: 1 },
            policy,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ConnectionState::Closed(_))
    }

    pub fn on_open(&mut self) {
        if let ConnectionState::Connecting { .. } = self.state {
            self.state = ConnectionState::Open;
        }
    }

    /// Record a failed attempt. Returns the delay before the next attempt,
    /// or `None` once the connection is closed.
    pub fn on_failure(&mut self, error: &ClientError) -> Option<Duration> {
        let ConnectionState::Connecting { attempt } = self.state else {
            self.state = ConnectionState::Closed(CloseReason::Failed(error.to_string()));
            return None;
        };

        if classify(error) == Disposition::Retriable && attempt < self.policy.max_attempts {
            let delay = self.policy.delay_for(attempt);
            tracing::debug!(attempt, ?delay, "Retrying turn request: {}", error);
            self.state = ConnectionState::Retrying { attempt, delay };
            Some(delay)
        } else {
            self.state = ConnectionState::Closed(CloseReason::Failed(error.to_string()));
            None
        }
    }

    /// Leave `Retrying` for the next attempt.
    pub fn retry(&mut self) {
        if let ConnectionState::Retrying { attempt, .. } = self.state {
            self.state = ConnectionState::Connecting { attempt: attempt + 1 };
        }
    }

    pub fn close(&mut self, reason: CloseReason) {
        if !self.is_closed() {
            self.state = ConnectionState::Closed(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_error() -> ClientError {
        ClientError::Transport {
            message: "connection refused".into(),
            connect: true,
        }
    }

    fn http(status: u16) -> ClientError {
        ClientError::Http {
            status,
            message: "nope".into(),
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(&connect_error()), Disposition::Retriable);
        assert_eq!(classify(&http(503)), Disposition::Retriable);
        assert_eq!(classify(&http(429)), Disposition::Retriable);
        assert_eq!(classify(&http(400)), Disposition::Fatal);
        assert_eq!(classify(&http(401)), Disposition::Fatal);
        assert_eq!(classify(&http(500)), Disposition::Fatal);
        assert_eq!(
            classify(&ClientError::Transport {
                message: "reset".into(),
                connect: false
            }),
            Disposition::Fatal
        );
        assert_eq!(classify(&ClientError::Cancelled), Disposition::Fatal);
    }

    #[test]
    fn test_retry_until_attempts_exhausted() {
        let mut connection = Connection::new(RetryPolicy::default());
        assert_eq!(connection.state(), &ConnectionState::Connecting { attempt: 1 });

        assert!(connection.on_failure(&connect_error()).is_some());
        assert!(matches!(connection.state(), ConnectionState::Retrying { attempt: 1, .. }));
        connection.retry();
        assert_eq!(connection.state(), &ConnectionState::Connecting { attempt: 2 });

        assert!(connection.on_failure(&connect_error()).is_some());
        connection.retry();
        assert_eq!(connection.state(), &ConnectionState::Connecting { attempt: 3 });

        assert!(connection.on_failure(&connect_error()).is_none());
        assert!(connection.is_closed());
    }

    #[test]
    fn test_fatal_failure_closes_immediately() {
        let mut connection = Connection::new(RetryPolicy::default());
        assert!(connection.on_failure(&http(403)).is_none());
        assert!(matches!(
            connection.state(),
            ConnectionState::Closed(CloseReason::Failed(_))
        ));
    }

    #[test]
    fn test_open_then_close() {
        let mut connection = Connection::new(RetryPolicy::no_retry());
        connection.on_open();
        assert_eq!(connection.state(), &ConnectionState::Open);

        // Failures after open are never retried.
        assert!(connection.on_failure(&connect_error()).is_none());

        connection.close(CloseReason::Completed);
        assert!(matches!(
            connection.state(),
            ConnectionState::Closed(CloseReason::Failed(_))
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };

        let first = policy.delay_for(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(120));

        let second = policy.delay_for(2);
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(240));

        let capped = policy.delay_for(9);
        assert!(capped >= Duration::from_millis(500) && capped <= Duration::from_millis(600));
    }
}
