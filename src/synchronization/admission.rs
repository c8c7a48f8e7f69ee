use std::ops::Range;

use crate::message::{Clock, Flag, Key, WorkerId};

/// What an admission controller gets to see about an ahead-of-min operation.
#[derive(Debug, Clone, Copy)]
pub struct Ticket<'a> {
    pub worker: WorkerId,
    pub flag: Flag,
    pub keys: &'a [Key],
    pub progress: Clock,
    pub min_clock: Clock,
    pub round: Clock,
}

/// Decides whether an operation targeting a round past the min clock may be buffered.
///
/// Only consulted for rounds inside the staleness window, the window itself is
/// enforced by the model.
pub trait Admission: Send {
    /// Whether the operation described by `ticket` may be buffered now.
    fn admit(&mut self, ticket: &Ticket<'_>) -> bool;

    /// Notifies the controller that the min clock changed, a worker set reset brings it back to 0.
    fn on_min_clock(&mut self, _min_clock: Clock) {}
}

impl<A: Admission + ?Sized> Admission for Box<A> {
    fn admit(&mut self, ticket: &Ticket<'_>) -> bool {
        (**self).admit(ticket)
    }

    fn on_min_clock(&mut self, min_clock: Clock) {
        (**self).on_min_clock(min_clock)
    }
}

/// Admits every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl Admission for AdmitAll {
    fn admit(&mut self, _ticket: &Ticket<'_>) -> bool {
        true
    }
}

/// Admits ahead-of-min operations whose keys all fall inside the configured sparse ranges.
#[derive(Debug, Clone)]
pub struct KeyRanges {
    ranges: Vec<Range<Key>>,
}

impl KeyRanges {
    /// Creates a new `KeyRanges` controller.
    ///
    /// # Arguments
    /// * `ranges` - Half open key ranges that may be touched ahead of the min clock.
    pub fn new(ranges: Vec<Range<Key>>) -> Self {
        Self { ranges }
    }

    fn covers(&self, key: Key) -> bool {
        self.ranges.iter().any(|r| r.contains(&key))
    }
}

impl Admission for KeyRanges {
    fn admit(&mut self, ticket: &Ticket<'_>) -> bool {
        ticket.keys.iter().all(|&k| self.covers(k))
    }
}
