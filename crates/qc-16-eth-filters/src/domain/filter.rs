//! A single client filter: interest, unread buffer and expiry deadline.

use crate::domain::criteria::LogCriteria;
use crate::domain::types::{FilterChanges, FilterId, FilterKind};
use parking_lot::Mutex;
use shared_types::entities::{BlockNumber, Hash, Log};
use std::time::Duration;
use tokio::time::Instant;

/// What a filter listens for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    /// Logs matching the criteria.
    Logs(LogCriteria),
    /// Hashes of new blocks.
    Blocks,
    /// Hashes of new pending transactions.
    PendingTransactions,
}

impl Interest {
    pub fn kind(&self) -> FilterKind {
        match self {
            Interest::Logs(_) => FilterKind::Logs,
            Interest::Blocks => FilterKind::Block,
            Interest::PendingTransactions => FilterKind::PendingTransaction,
        }
    }

    pub fn as_criteria(&self) -> Option<&LogCriteria> {
        match self {
            Interest::Logs(criteria) => Some(criteria),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    /// Fires at the given instant.
    Armed(Instant),
    /// Fired and not yet consumed.
    Fired,
    Stopped,
}

/// Result of inspecting a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Deadline still ahead.
    Pending,
    /// Deadline passed without being reset.
    Expired,
    /// Timer was left stopped; never observable outside the filter lock.
    Inconsistent,
}

/// Expiry timer of a filter.
///
/// Mirrors a one-shot timer whose firing is observed lazily: the timer fires
/// once `now` passes the armed instant, and the firing stays pending until it
/// is either discarded by [`Deadline::rearm`] or observed by the sweep.
#[derive(Debug, Clone)]
pub struct Deadline {
    state: TimerState,
}

impl Deadline {
    pub fn new(ttl: Duration, now: Instant) -> Self {
        Self {
            state: TimerState::Armed(now + ttl),
        }
    }

    /// Stop the timer. Returns false if it had already fired.
    fn stop(&mut self, now: Instant) -> bool {
        match self.state {
            TimerState::Armed(at) if now < at => {
                self.state = TimerState::Stopped;
                true
            }
            TimerState::Armed(_) | TimerState::Fired => {
                self.state = TimerState::Fired;
                false
            }
            TimerState::Stopped => true,
        }
    }

    fn discard_fired(&mut self) {
        if self.state == TimerState::Fired {
            self.state = TimerState::Stopped;
        }
    }

    fn reset(&mut self, ttl: Duration, now: Instant) {
        self.state = TimerState::Armed(now + ttl);
    }

    /// Push the deadline to `now + ttl`, discarding a firing that was not
    /// yet observed. Callers hold the filter lock, so the intermediate
    /// stopped state is never visible to the sweep.
    pub fn rearm(&mut self, ttl: Duration, now: Instant) {
        if !self.stop(now) {
            self.discard_fired();
        }
        self.reset(ttl, now);
    }

    /// Observe the timer at `now`.
    pub fn check(&mut self, now: Instant) -> Expiry {
        match self.state {
            TimerState::Armed(at) if now < at => Expiry::Pending,
            TimerState::Armed(_) | TimerState::Fired => {
                self.state = TimerState::Fired;
                Expiry::Expired
            }
            TimerState::Stopped => Expiry::Inconsistent,
        }
    }

    /// Instant the timer fires at, if armed.
    pub fn fires_at(&self) -> Option<Instant> {
        match self.state {
            TimerState::Armed(at) => Some(at),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct FilterState {
    deadline: Deadline,
    changes: FilterChanges,
}

/// One client subscription.
#[derive(Debug)]
pub struct Filter {
    id: FilterId,
    interest: Interest,
    state: Mutex<FilterState>,
}

impl Filter {
    pub fn new(id: FilterId, interest: Interest, ttl: Duration, now: Instant) -> Self {
        let changes = FilterChanges::empty(interest.kind());
        Self {
            id,
            interest,
            state: Mutex::new(FilterState {
                deadline: Deadline::new(ttl, now),
                changes,
            }),
        }
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn kind(&self) -> FilterKind {
        self.interest.kind()
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    /// Rearm the deadline and take the unread buffer, leaving an empty one.
    pub fn drain(&self, ttl: Duration, now: Instant) -> FilterChanges {
        let empty = FilterChanges::empty(self.kind());
        let mut state = self.state.lock();
        state.deadline.rearm(ttl, now);
        std::mem::replace(&mut state.changes, empty)
    }

    /// Feed a finalized block. Returns the number of appended entries.
    pub fn apply_block(&self, height: BlockNumber, block_hash: Hash, logs: &[&Log]) -> usize {
        match &self.interest {
            Interest::Blocks => self.append_hashes(&[block_hash]),
            Interest::Logs(criteria) => {
                let matched = criteria.filter_logs(height, &block_hash, logs.iter().copied());
                self.append_logs(matched)
            }
            Interest::PendingTransactions => 0,
        }
    }

    /// Feed newly pending transaction hashes.
    pub fn apply_pending(&self, hashes: &[Hash]) -> usize {
        match self.interest {
            Interest::PendingTransactions => self.append_hashes(hashes),
            _ => 0,
        }
    }

    fn append_hashes(&self, hashes: &[Hash]) -> usize {
        if hashes.is_empty() {
            return 0;
        }
        let mut state = self.state.lock();
        if let FilterChanges::Hashes(buffer) = &mut state.changes {
            buffer.extend_from_slice(hashes);
            hashes.len()
        } else {
            0
        }
    }

    fn append_logs(&self, logs: Vec<Log>) -> usize {
        if logs.is_empty() {
            return 0;
        }
        let mut state = self.state.lock();
        if let FilterChanges::Logs(buffer) = &mut state.changes {
            let count = logs.len();
            buffer.extend(logs);
            count
        } else {
            0
        }
    }

    /// Observe the expiry deadline.
    pub fn check_expiry(&self, now: Instant) -> Expiry {
        self.state.lock().deadline.check(now)
    }

    /// Number of unread entries.
    pub fn pending_len(&self) -> usize {
        self.state.lock().changes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::entities::Address;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_deadline_expires() {
        let start = Instant::now();
        let mut deadline = Deadline::new(TTL, start);

        assert_eq!(deadline.check(start), Expiry::Pending);
        assert_eq!(deadline.check(start + TTL), Expiry::Expired);
        // firing stays observable
        assert_eq!(deadline.check(start), Expiry::Expired);
    }

    #[test]
    fn test_rearm_discards_unobserved_firing() {
        let start = Instant::now();
        let mut deadline = Deadline::new(TTL, start);
        let late = start + TTL * 2;

        deadline.rearm(TTL, late);
        assert_eq!(deadline.check(late), Expiry::Pending);
        assert_eq!(deadline.fires_at(), Some(late + TTL));
    }

    #[test]
    fn test_rearm_discards_observed_firing() {
        let start = Instant::now();
        let mut deadline = Deadline::new(TTL, start);
        let late = start + TTL;

        assert_eq!(deadline.check(late), Expiry::Expired);
        deadline.rearm(TTL, late);
        assert_eq!(deadline.check(late), Expiry::Pending);
    }

    #[test]
    fn test_drain_twice() {
        let now = Instant::now();
        let filter = Filter::new(FilterId::random(), Interest::Blocks, TTL, now);

        filter.apply_block(1, Hash::repeat_byte(1), &[]);
        filter.apply_block(2, Hash::repeat_byte(2), &[]);

        let first = filter.drain(TTL, now);
        assert_eq!(
            first.as_hashes(),
            Some(&[Hash::repeat_byte(1), Hash::repeat_byte(2)][..])
        );
        let second = filter.drain(TTL, now);
        assert!(second.is_empty());
        assert!(second.as_hashes().is_some());
    }

    #[test]
    fn test_pending_filter_ignores_blocks() {
        let now = Instant::now();
        let filter = Filter::new(FilterId::random(), Interest::PendingTransactions, TTL, now);

        assert_eq!(filter.apply_block(1, Hash::repeat_byte(1), &[]), 0);
        assert_eq!(filter.apply_pending(&[Hash::repeat_byte(9)]), 1);
        assert_eq!(filter.pending_len(), 1);
    }

    #[test]
    fn test_log_filter_no_match_no_mutation() {
        let now = Instant::now();
        let filter = Filter::new(
            FilterId::random(),
            Interest::Logs(LogCriteria::range(10, 10)),
            TTL,
            now,
        );
        let log = Log::new(Address::repeat_byte(1), vec![], vec![]);

        assert_eq!(filter.apply_block(9, Hash::zero(), &[&log]), 0);
        assert_eq!(filter.apply_block(10, Hash::zero(), &[&log]), 1);
        assert_eq!(filter.drain(TTL, now).as_logs().map(<[Log]>::len), Some(1));
    }
}
