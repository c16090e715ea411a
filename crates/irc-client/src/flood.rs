//! Send-side flood prevention (component B): a token-bucket-like delay
//! computation the write loop consults before draining the send queue.

use std::time::{Duration, Instant};

/// Minimum gap the write loop enforces between sends even when a
/// [`FloodPreventer`] says it's fine to send immediately, so a misbehaving
/// or absent preventer can't cause a tight loop.
pub const MIN_SEND_GAP: Duration = Duration::from_millis(50);

/// Contract for send pacing. `get_send_delay` is consulted before each send;
/// `handle_message_sent` is called right after the send actually happens.
pub trait FloodPreventer {
    fn get_send_delay(&mut self) -> Duration;
    fn handle_message_sent(&mut self);
}

/// The standard algorithm: a counter that decays over time and caps how many
/// messages may go out within a burst window.
pub struct StdFloodPreventer {
    max_burst: u32,
    counter_period: Duration,
    counter: u32,
    last_decrement: Instant,
}

impl StdFloodPreventer {
    pub fn new(max_burst: u32, counter_period: Duration) -> StdFloodPreventer {
        StdFloodPreventer {
            max_burst,
            counter_period,
            counter: 0,
            last_decrement: Instant::now(),
        }
    }
}

impl Default for StdFloodPreventer {
    /// 4 messages per 2 second window, matching common ircd defaults.
    fn default() -> Self {
        StdFloodPreventer::new(4, Duration::from_millis(2000))
    }
}

impl FloodPreventer for StdFloodPreventer {
    fn get_send_delay(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_decrement);

        let periods_elapsed = (elapsed.as_millis() / self.counter_period.as_millis().max(1)) as u32;
        self.counter = self.counter.saturating_sub(periods_elapsed);

        let remainder = Duration::from_millis(
            (elapsed.as_millis() % self.counter_period.as_millis().max(1)) as u64,
        );
        self.last_decrement = now - remainder;

        if self.counter < self.max_burst {
            Duration::ZERO
        } else {
            self.counter_period - remainder
        }
    }

    fn handle_message_sent(&mut self) {
        self.counter += 1;
    }
}

/// Explicit opt-out: the caller manages rate limiting itself, so the write
/// loop should never add pacing delay (it still enforces [`MIN_SEND_GAP`]).
/// Distinct from simply not having configured a preventer.
#[derive(Debug, Default)]
pub struct NoFloodPreventer;

impl FloodPreventer for NoFloodPreventer {
    fn get_send_delay(&mut self) -> Duration {
        Duration::ZERO
    }

    fn handle_message_sent(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_a_full_burst_before_delaying() {
        let mut fp = StdFloodPreventer::new(4, Duration::from_millis(2000));
        for _ in 0..4 {
            assert_eq!(fp.get_send_delay(), Duration::ZERO);
            fp.handle_message_sent();
        }
        let delay = fp.get_send_delay();
        assert!(delay > Duration::ZERO && delay <= Duration::from_millis(2000));
    }

    #[test]
    fn no_flood_preventer_never_delays() {
        let mut fp = NoFloodPreventer;
        for _ in 0..100 {
            assert_eq!(fp.get_send_delay(), Duration::ZERO);
            fp.handle_message_sent();
        }
    }
}
