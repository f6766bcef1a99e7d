//! One timer model used on every platform (§9 Open Question resolution,
//! recorded in `DESIGN.md`): a deadline-ascending sorted list rather than
//! the original's split timerfd/list-per-platform design, since `mio`
//! already erases the epoll-vs-poll distinction that motivated it.

use mio::Token;
use std::time::{Duration, Instant};

struct TimerEntry {
    token: Token,
    deadline: Instant,
}

/// Timer list (§3 invariant: maintained sorted by expiry ascending; head has
/// the nearest deadline).
#[derive(Default)]
pub struct TimerList {
    entries: Vec<TimerEntry>,
}

impl TimerList {
    pub fn new() -> TimerList {
        TimerList { entries: Vec::new() }
    }

    /// **AddTimer(ctx, timeout_ms)** (§4.4): inserts sorted by deadline.
    pub fn add(&mut self, token: Token, timeout: Duration) {
        self.insert_sorted(token, Instant::now() + timeout);
    }

    /// **ExtendTimer(timer, timeout_ms)** (§4.4): detaches and reinserts, so
    /// repeated arming from a callback simply pushes the deadline out.
    pub fn extend(&mut self, token: Token, timeout: Duration) {
        self.remove(token);
        self.add(token, timeout);
    }

    pub fn remove(&mut self, token: Token) {
        self.entries.retain(|entry| entry.token != token);
    }

    fn insert_sorted(&mut self, token: Token, deadline: Instant) {
        let pos = self.entries.partition_point(|entry| entry.deadline <= deadline);
        self.entries.insert(pos, TimerEntry { token, deadline });
    }

    /// Nearest deadline, used to compute `Service`'s effective poll timeout.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.first().map(|entry| entry.deadline)
    }

    /// Removes and returns every timer whose deadline has passed.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<Token> {
        let split = self.entries.partition_point(|entry| entry.deadline <= now);
        self.entries.drain(..split).map(|entry| entry.token).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_insertion_and_nearest_deadline() {
        let mut timers = TimerList::new();
        timers.add(Token(2), Duration::from_millis(50));
        timers.add(Token(1), Duration::from_millis(10));
        timers.add(Token(3), Duration::from_millis(100));

        let first_deadline = timers.next_deadline().unwrap();
        let second = timers.entries[1].deadline;
        assert!(first_deadline <= second);
        assert_eq!(timers.entries[0].token, Token(1));
    }

    #[test]
    fn test_extend_pushes_deadline_out() {
        let mut timers = TimerList::new();
        timers.add(Token(1), Duration::from_millis(0));
        let original = timers.next_deadline().unwrap();

        timers.extend(Token(1), Duration::from_secs(10));
        let extended = timers.next_deadline().unwrap();

        assert!(extended >= original);
        assert_eq!(timers.entries.len(), 1);
    }

    #[test]
    fn test_pop_expired_drains_only_due_timers() {
        let mut timers = TimerList::new();
        timers.add(Token(1), Duration::from_millis(0));
        timers.add(Token(2), Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(5));
        let expired = timers.pop_expired(Instant::now());

        assert_eq!(expired, vec![Token(1)]);
        assert_eq!(timers.next_deadline().is_some(), true);
    }
}
