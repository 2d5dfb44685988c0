//! Deadlines driving the engine's periodic behaviors.
//!
//! All timing is on the monotonic clock. The worker passes `now` into
//! every check, so the schedule is a pure function of `Instant` values
//! and tests can walk through hours of behavior without sleeping.

use std::time::{Duration, Instant};

/// How often to ask the heater for a status report.
pub const STATUS_PERIOD: Duration = Duration::from_secs(5);

/// How often to ask the heater for its settings.
pub const SETTINGS_PERIOD: Duration = Duration::from_secs(5);

/// Spacing of repeated off-commands while a shutdown request is active.
pub const SHUTDOWN_PERIOD: Duration = Duration::from_secs(10);

/// How long an observed controller frame inhibits host injection.
pub const WRITE_LOCK_HOLD: Duration = Duration::from_secs(10);

/// Pause before re-trying to open the links after a total failure.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// Poll and retry bookkeeping owned by the worker.
///
/// Poll deadlines reset on *receipt* of the matching heater reply, not on
/// send; a send-side throttle keeps the engine from queueing more than one
/// outstanding ask per period when the heater stays silent.
#[derive(Debug, Clone, Copy)]
pub struct Polls {
    last_status_reply: Instant,
    last_status_ask: Option<Instant>,
    last_settings_reply: Instant,
    last_settings_ask: Option<Instant>,
    last_shutdown_send: Option<Instant>,
}

impl Polls {
    /// Fresh bookkeeping; both polls count from `now`.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            last_status_reply: now,
            last_status_ask: None,
            last_settings_reply: now,
            last_settings_ask: None,
            last_shutdown_send: None,
        }
    }

    /// Whether a status poll should be sent now. Marks the send.
    pub fn status_due(&mut self, now: Instant) -> bool {
        if now < self.last_status_reply + STATUS_PERIOD {
            return false;
        }
        if let Some(ask) = self.last_status_ask {
            if now < ask + STATUS_PERIOD {
                return false;
            }
        }
        self.last_status_ask = Some(now);
        true
    }

    /// The heater answered a status poll.
    pub fn status_seen(&mut self, now: Instant) {
        self.last_status_reply = now;
        self.last_status_ask = None;
    }

    /// Whether a settings poll should be sent now. Marks the send.
    pub fn settings_due(&mut self, now: Instant) -> bool {
        if now < self.last_settings_reply + SETTINGS_PERIOD {
            return false;
        }
        if let Some(ask) = self.last_settings_ask {
            if now < ask + SETTINGS_PERIOD {
                return false;
            }
        }
        self.last_settings_ask = Some(now);
        true
    }

    /// The heater answered a settings poll.
    pub fn settings_seen(&mut self, now: Instant) {
        self.last_settings_reply = now;
        self.last_settings_ask = None;
    }

    /// Whether an off-command retry is due while a shutdown request is
    /// active. Fires immediately on the first call, then every
    /// [`SHUTDOWN_PERIOD`]. Marks the send.
    pub fn shutdown_due(&mut self, now: Instant) -> bool {
        match self.last_shutdown_send {
            Some(sent) if now < sent + SHUTDOWN_PERIOD => false,
            _ => {
                self.last_shutdown_send = Some(now);
                true
            }
        }
    }

    /// The shutdown request was satisfied; a future request starts its
    /// retry schedule from scratch.
    pub fn shutdown_cleared(&mut self) {
        self.last_shutdown_send = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_poll_waits_a_full_period() {
        let start = Instant::now();
        let mut polls = Polls::new(start);
        assert!(!polls.status_due(start));
        assert!(!polls.status_due(start + STATUS_PERIOD - Duration::from_millis(1)));
        assert!(polls.status_due(start + STATUS_PERIOD));
    }

    #[test]
    fn test_status_poll_throttles_while_unanswered() {
        let start = Instant::now();
        let mut polls = Polls::new(start);
        let first_ask = start + STATUS_PERIOD;
        assert!(polls.status_due(first_ask));
        // No re-fire until another full period without a reply.
        assert!(!polls.status_due(first_ask + Duration::from_secs(1)));
        assert!(polls.status_due(first_ask + STATUS_PERIOD));
    }

    #[test]
    fn test_status_poll_resets_on_receipt() {
        let start = Instant::now();
        let mut polls = Polls::new(start);
        assert!(polls.status_due(start + STATUS_PERIOD));
        let reply = start + STATUS_PERIOD + Duration::from_millis(200);
        polls.status_seen(reply);
        assert!(!polls.status_due(reply + STATUS_PERIOD - Duration::from_millis(1)));
        assert!(polls.status_due(reply + STATUS_PERIOD));
    }

    #[test]
    fn test_settings_poll_independent_of_status() {
        let start = Instant::now();
        let mut polls = Polls::new(start);
        assert!(polls.status_due(start + STATUS_PERIOD));
        polls.status_seen(start + STATUS_PERIOD);
        // The settings poll still fires on its own schedule.
        assert!(polls.settings_due(start + SETTINGS_PERIOD));
    }

    #[test]
    fn test_shutdown_retry_every_period() {
        let start = Instant::now();
        let mut polls = Polls::new(start);
        // First retry fires immediately once the request is active.
        assert!(polls.shutdown_due(start));
        assert!(!polls.shutdown_due(start + Duration::from_secs(9)));
        assert!(polls.shutdown_due(start + SHUTDOWN_PERIOD));
        assert!(!polls.shutdown_due(start + SHUTDOWN_PERIOD + Duration::from_secs(1)));
        assert!(polls.shutdown_due(start + 2 * SHUTDOWN_PERIOD));
    }

    #[test]
    fn test_shutdown_clear_restarts_schedule() {
        let start = Instant::now();
        let mut polls = Polls::new(start);
        assert!(polls.shutdown_due(start));
        polls.shutdown_cleared();
        // A fresh request fires immediately again.
        assert!(polls.shutdown_due(start + Duration::from_secs(1)));
    }
}
