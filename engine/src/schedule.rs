use std::{cmp::Ordering, collections::BinaryHeap, time::Duration};

use minefield_common::models::Pos;

/// Deferred work queued by the engine. Every variant carries the generation
/// of the game that queued it so work left over from an earlier game can be
/// dropped when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// Continue the flood fill from a zero cell.
    FillStep { generation: u64, pos: Pos },
    /// Debounced end of turn. Only the most recent token is honoured.
    TurnSettle { generation: u64, token: u64 },
    /// One second of game time.
    Tick { generation: u64 },
}

impl PendingAction {
    /// Fill continuations and turn settling belong to the current turn;
    /// ticks run for as long as the game clock does.
    pub fn is_turn_work(&self) -> bool {
        !matches!(self, PendingAction::Tick { .. })
    }
}

#[derive(Debug)]
struct Entry {
    due: Duration,
    seq: u64,
    action: PendingAction,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap yields the earliest entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Virtual clock plus a queue of pending actions ordered by due time, FIFO
/// among actions due at the same instant.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    seq: u64,
    turn_work: usize,
    queue: BinaryHeap<Entry>,
}

impl Scheduler {
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule(&mut self, delay: Duration, action: PendingAction) {
        self.seq += 1;
        if action.is_turn_work() {
            self.turn_work += 1;
        }
        self.queue.push(Entry {
            due: self.now + delay,
            seq: self.seq,
            action,
        });
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.queue.peek().map(|entry| entry.due)
    }

    /// Pops the earliest action if it is due at or before `until`, moving the
    /// clock to its due time.
    pub fn pop_due(&mut self, until: Duration) -> Option<PendingAction> {
        if self.next_due()? > until {
            return None;
        }
        self.pop_next()
    }

    /// Pops the earliest action regardless of its due time.
    pub fn pop_next(&mut self) -> Option<PendingAction> {
        let entry = self.queue.pop()?;
        if entry.action.is_turn_work() {
            self.turn_work -= 1;
        }
        self.now = self.now.max(entry.due);
        Some(entry.action)
    }

    /// Moves the clock forward. The clock never runs backwards.
    pub fn advance_to(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    /// Whether any fill step or turn settle is still queued, stale or not.
    pub fn has_turn_work(&self) -> bool {
        self.turn_work > 0
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(generation: u64) -> PendingAction {
        PendingAction::Tick { generation }
    }

    #[test]
    fn pops_in_due_order_then_fifo() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(Duration::from_millis(50), tick(1));
        scheduler.schedule(Duration::from_millis(10), tick(2));
        scheduler.schedule(Duration::from_millis(50), tick(3));

        assert_eq!(scheduler.pop_next(), Some(tick(2)));
        assert_eq!(scheduler.now(), Duration::from_millis(10));
        assert_eq!(scheduler.pop_next(), Some(tick(1)));
        assert_eq!(scheduler.pop_next(), Some(tick(3)));
        assert_eq!(scheduler.pop_next(), None);
    }

    #[test]
    fn pop_due_respects_limit() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(Duration::from_millis(40), tick(1));

        assert_eq!(scheduler.pop_due(Duration::from_millis(39)), None);
        assert_eq!(scheduler.pop_due(Duration::from_millis(40)), Some(tick(1)));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn turn_work_is_counted_apart_from_ticks() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(Duration::from_secs(1), tick(1));
        assert!(!scheduler.has_turn_work());

        scheduler.schedule(
            Duration::from_millis(40),
            PendingAction::FillStep {
                generation: 1,
                pos: Pos::new(0, 0),
            },
        );
        assert!(scheduler.has_turn_work());

        scheduler.pop_next();
        assert!(!scheduler.has_turn_work());
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn delays_are_relative_to_clock() {
        let mut scheduler = Scheduler::default();
        scheduler.advance_to(Duration::from_secs(2));
        scheduler.advance_to(Duration::from_secs(1));
        scheduler.schedule(Duration::from_millis(100), tick(1));

        assert_eq!(scheduler.now(), Duration::from_secs(2));
        assert_eq!(scheduler.next_due(), Some(Duration::from_millis(2100)));
    }
}
