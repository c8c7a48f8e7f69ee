use std::collections::HashMap;

use crate::{
    error::{ConsistencyViolation, EngineErr, Result, Violation},
    message::{Clock, Flag, ModelId, WorkerId},
};

/// Tracks every live worker's clock and the minimum clock among them.
///
/// It is the only place where worker clocks are mutated, consistency models
/// consult it before buffering or releasing any operation.
#[derive(Debug)]
pub struct ProgressTracker {
    model_id: ModelId,
    bound: Clock,
    min_clock: Clock,
    clocks: HashMap<WorkerId, Clock>,
}

impl ProgressTracker {
    /// Creates a new `ProgressTracker` with no live workers.
    ///
    /// # Arguments
    /// * `model_id` - The model this tracker belongs to, used in diagnostics.
    /// * `bound` - How many rounds a worker may run ahead of the min clock.
    pub fn new(model_id: ModelId, bound: Clock) -> Self {
        Self {
            model_id,
            bound,
            min_clock: 0,
            clocks: HashMap::new(),
        }
    }

    /// Replaces the live worker set, every clock and the min clock start over at 0.
    ///
    /// # Arguments
    /// * `workers` - The new live worker set.
    pub fn init<I>(&mut self, workers: I)
    where
        I: IntoIterator<Item = WorkerId>,
    {
        self.clocks = workers.into_iter().map(|w| (w, 0)).collect();
        self.min_clock = 0;
    }

    /// Advances `worker`'s clock by one.
    ///
    /// # Arguments
    /// * `worker` - The advancing worker.
    ///
    /// # Returns
    /// The new min clock if it strictly increased, `None` otherwise. Fails without
    /// mutating anything if `worker` isn't live or would run past the lead bound.
    pub fn advance_and_get_changed_min_clock(&mut self, worker: WorkerId) -> Result<Option<Clock>> {
        let clock = self.progress(worker)?;
        let next = clock + 1;

        let new_min = self
            .clocks
            .iter()
            .map(|(&w, &c)| if w == worker { next } else { c })
            .min()
            .unwrap_or(next);

        if next > new_min + self.bound {
            return Err(EngineErr::Consistency(ConsistencyViolation {
                model_id: self.model_id,
                worker,
                flag: Flag::Advance,
                progress: clock,
                min_clock: self.min_clock,
                kind: Violation::LeadBound { bound: self.bound },
            }));
        }

        self.clocks.insert(worker, next);

        if new_min > self.min_clock {
            self.min_clock = new_min;
            return Ok(Some(new_min));
        }

        Ok(None)
    }

    /// Returns the clock of a live worker.
    pub fn progress(&self, worker: WorkerId) -> Result<Clock> {
        self.clocks
            .get(&worker)
            .copied()
            .ok_or(EngineErr::UnknownWorker {
                model_id: self.model_id,
                worker,
            })
    }

    /// Whether `worker` belongs to the live set.
    pub fn is_valid(&self, worker: WorkerId) -> bool {
        self.clocks.contains_key(&worker)
    }

    /// The current barrier value.
    pub fn min_clock(&self) -> Clock {
        self.min_clock
    }

    /// The lead bound this tracker enforces.
    pub fn bound(&self) -> Clock {
        self.bound
    }

    /// The sorted live worker ids.
    pub fn workers(&self) -> Vec<WorkerId> {
        let mut workers: Vec<_> = self.clocks.keys().copied().collect();
        workers.sort_unstable();
        workers
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    fn tracker(workers: &[WorkerId], bound: Clock) -> ProgressTracker {
        let mut tracker = ProgressTracker::new(0, bound);
        tracker.init(workers.iter().copied());
        tracker
    }

    #[test]
    fn test_min_clock_changes_when_last_worker_advances() {
        let mut tracker = tracker(&[1, 2, 3], 1);

        assert_eq!(tracker.advance_and_get_changed_min_clock(1).unwrap(), None);
        assert_eq!(tracker.advance_and_get_changed_min_clock(2).unwrap(), None);
        assert_eq!(tracker.min_clock(), 0);
        assert_eq!(tracker.advance_and_get_changed_min_clock(3).unwrap(), Some(1));
        assert_eq!(tracker.min_clock(), 1);

        for w in [1, 2, 3] {
            assert_eq!(tracker.progress(w).unwrap(), 1);
        }
    }

    #[test]
    fn test_single_worker_always_moves_min_clock() {
        let mut tracker = tracker(&[9], 1);

        for round in 1..=5 {
            assert_eq!(
                tracker.advance_and_get_changed_min_clock(9).unwrap(),
                Some(round)
            );
        }
    }

    #[test]
    fn test_empty_tracker_never_moves() {
        let mut tracker = ProgressTracker::new(0, 1);
        assert!(tracker.is_empty());
        assert_eq!(tracker.len(), 0);
        assert!(tracker.advance_and_get_changed_min_clock(0).is_err());

        tracker.init([]);
        assert!(tracker.is_empty());
        assert_eq!(tracker.min_clock(), 0);
    }

    #[test]
    fn test_unknown_worker_is_reported() {
        let mut tracker = tracker(&[1], 1);

        assert!(matches!(
            tracker.advance_and_get_changed_min_clock(2),
            Err(EngineErr::UnknownWorker { worker: 2, .. })
        ));
        assert!(matches!(
            tracker.progress(2),
            Err(EngineErr::UnknownWorker { worker: 2, .. })
        ));
        assert!(!tracker.is_valid(2));
    }

    #[test]
    fn test_lead_bound_breach_leaves_state_untouched() {
        let mut tracker = tracker(&[1, 2], 1);
        tracker.advance_and_get_changed_min_clock(1).unwrap();

        let err = tracker.advance_and_get_changed_min_clock(1).unwrap_err();
        let EngineErr::Consistency(v) = err else {
            panic!("expected a consistency violation, got {err:?}");
        };

        assert_eq!(v.worker, 1);
        assert_eq!(v.progress, 1);
        assert_eq!(v.min_clock, 0);
        assert_eq!(v.kind, Violation::LeadBound { bound: 1 });
        assert_eq!(tracker.progress(1).unwrap(), 1);
        assert_eq!(tracker.min_clock(), 0);
    }

    #[test]
    fn test_larger_bound_lets_worker_run_ahead() {
        let mut tracker = tracker(&[1, 2], 3);

        for _ in 0..3 {
            assert_eq!(tracker.advance_and_get_changed_min_clock(1).unwrap(), None);
        }

        assert!(tracker.advance_and_get_changed_min_clock(1).is_err());
        assert_eq!(tracker.advance_and_get_changed_min_clock(2).unwrap(), Some(1));
        assert_eq!(tracker.advance_and_get_changed_min_clock(1).unwrap(), None);
        assert_eq!(tracker.progress(1).unwrap(), 4);
    }

    #[test]
    fn test_reset_replaces_membership() {
        let mut tracker = tracker(&[1, 2], 1);
        tracker.advance_and_get_changed_min_clock(1).unwrap();
        tracker.advance_and_get_changed_min_clock(2).unwrap();
        assert_eq!(tracker.min_clock(), 1);

        tracker.init([3, 4, 5]);

        assert_eq!(tracker.workers(), [3, 4, 5]);
        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.min_clock(), 0);
        for w in [3, 4, 5] {
            assert!(tracker.is_valid(w));
            assert_eq!(tracker.progress(w).unwrap(), 0);
        }
        for w in [1, 2] {
            assert!(matches!(
                tracker.progress(w),
                Err(EngineErr::UnknownWorker { .. })
            ));
        }
    }

    #[test]
    fn test_random_advances_keep_clocks_within_bound() {
        const WORKERS: [WorkerId; 4] = [0, 1, 2, 3];

        for bound in 1..=3 {
            let mut rng = StdRng::seed_from_u64(bound);
            let mut tracker = tracker(&WORKERS, bound);
            let mut last_min = 0;

            for _ in 0..500 {
                let worker = WORKERS[rng.random_range(0..WORKERS.len())];
                let changed = tracker.advance_and_get_changed_min_clock(worker);

                let min = tracker.min_clock();
                assert!(min >= last_min);
                if let Ok(Some(new_min)) = changed {
                    assert_eq!(new_min, last_min + 1);
                }
                last_min = min;

                for w in WORKERS {
                    let clock = tracker.progress(w).unwrap();
                    assert!(clock >= min);
                    assert!(clock <= min + bound);
                }
            }
        }
    }
}
