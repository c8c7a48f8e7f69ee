use std::{collections::BTreeMap, mem, num::NonZeroU64, path::Path};

use log::{debug, info, warn};

use super::{
    Admission, Checkpointer, ConsistencyModel, ReplyQueue, Ticket,
    model::{PendingRead, decoded, violation},
};
use crate::{
    error::{Result, Violation},
    message::{Clock, Flag, Key, KvPairs, Message, Meta, ModelId, WorkerId},
    progress::ProgressTracker,
    storage::Store,
};

/// Bounded staleness, workers may run up to `staleness` rounds ahead of the min clock.
///
/// Operations are buffered per round since several rounds can be in flight at once.
/// Anything targeting a round past the min clock must first pass the admission controller.
pub struct SparseSspModel<S: Store, A: Admission> {
    model_id: ModelId,
    store: S,
    tracker: ProgressTracker,
    replies: ReplyQueue,
    checkpointer: Checkpointer,
    admission: A,
    adds: BTreeMap<Clock, Vec<KvPairs>>,
    gets: BTreeMap<Clock, Vec<PendingRead>>,
}

impl<S: Store, A: Admission> SparseSspModel<S, A> {
    /// Creates a new `SparseSspModel`.
    ///
    /// # Arguments
    /// * `model_id` - The model this instance serves.
    /// * `store` - The store, owned by the model from now on.
    /// * `replies` - Where answers and acknowledgements are pushed.
    /// * `staleness` - How many rounds a worker may run ahead of the min clock.
    /// * `admission` - The controller for ahead-of-min operations.
    /// * `checkpointer` - The snapshot policy.
    pub fn new(
        model_id: ModelId,
        store: S,
        replies: ReplyQueue,
        staleness: NonZeroU64,
        admission: A,
        checkpointer: Checkpointer,
    ) -> Self {
        info!(model_id = model_id, staleness = staleness.get(); "sparse ssp model created");

        Self {
            model_id,
            store,
            tracker: ProgressTracker::new(model_id, staleness.get()),
            replies,
            checkpointer,
            admission,
            adds: BTreeMap::new(),
            gets: BTreeMap::new(),
        }
    }

    /// Sets the initial live worker set.
    pub fn with_workers<I>(mut self, workers: I) -> Self
    where
        I: IntoIterator<Item = WorkerId>,
    {
        self.tracker.init(workers);
        self
    }

    /// The amount of reads released once the min clock reaches `round`.
    pub fn pending_read_count(&self, round: Clock) -> usize {
        self.gets.get(&round).map_or(0, Vec::len)
    }

    /// The amount of writes applied once `round` closes.
    pub fn pending_write_count(&self, round: Clock) -> usize {
        self.adds.get(&round).map_or(0, Vec::len)
    }

    /// Checks that `round` lies in the staleness window and, if it's ahead of the
    /// min clock, that the admission controller lets it through.
    fn admit(&mut self, meta: &Meta, keys: &[Key], progress: Clock, round: Clock) -> Result<()> {
        let min_clock = self.tracker.min_clock();
        let bound = self.tracker.bound();

        if round < min_clock || round > min_clock + bound {
            let kind = Violation::Window { round, bound };
            return Err(violation(meta, progress, min_clock, kind));
        }

        if round == min_clock {
            return Ok(());
        }

        let ticket = Ticket {
            worker: meta.sender,
            flag: meta.flag,
            keys,
            progress,
            min_clock,
            round,
        };

        if !self.admission.admit(&ticket) {
            let kind = Violation::Rejected { round };
            return Err(violation(meta, progress, min_clock, kind));
        }

        Ok(())
    }

    /// Applies every round below `min_clock`, commits them and answers the reads
    /// that became visible.
    fn close_rounds(&mut self, min_clock: Clock) {
        let open = self.adds.split_off(&min_clock);
        let closed = mem::replace(&mut self.adds, open);

        let mut adds = 0;
        for req in closed.into_values().flatten() {
            self.store.add(&req);
            adds += 1;
        }

        self.store.finish_iter();

        let waiting = self.gets.split_off(&(min_clock + 1));
        let released = mem::replace(&mut self.gets, waiting);

        let mut gets = 0;
        for read in released.into_values().flatten() {
            read.answer(&self.store, &self.replies);
            gets += 1;
        }

        self.admission.on_min_clock(min_clock);

        debug!(
            model_id = self.model_id,
            min_clock = min_clock,
            adds = adds,
            gets = gets;
            "round closed"
        );

        self.checkpointer
            .maybe_dump(self.model_id, min_clock, &self.store);
    }
}

impl<S: Store, A: Admission> ConsistencyModel for SparseSspModel<S, A> {
    fn model_id(&self) -> ModelId {
        self.model_id
    }

    fn advance(&mut self, msg: Message) -> Result<()> {
        let sender = msg.meta.sender;

        if let Some(min_clock) = self.tracker.advance_and_get_changed_min_clock(sender)? {
            self.close_rounds(min_clock);
        }

        Ok(())
    }

    fn write(&mut self, msg: Message) -> Result<()> {
        let progress = self.tracker.progress(msg.meta.sender)?;
        let kvs = decoded(self.model_id, msg.kv_pairs())?;

        self.admit(&msg.meta, &kvs.keys, progress, progress)?;
        self.adds.entry(progress).or_default().push(kvs);
        Ok(())
    }

    fn read(&mut self, msg: Message) -> Result<()> {
        let progress = self.tracker.progress(msg.meta.sender)?;
        let keys = decoded(self.model_id, msg.keys())?;

        // Rounds below `release` must be committed before the read is answered.
        let release = (progress + 1).saturating_sub(self.tracker.bound());
        let read = PendingRead {
            meta: msg.meta,
            keys,
        };

        if release <= self.tracker.min_clock() {
            read.answer(&self.store, &self.replies);
            return Ok(());
        }

        self.admit(&read.meta, &read.keys, progress, release)?;
        self.gets.entry(release).or_default().push(read);
        Ok(())
    }

    fn init_read(&mut self, msg: Message) -> Result<()> {
        self.tracker.progress(msg.meta.sender)?;
        let keys = decoded(self.model_id, msg.keys())?;

        PendingRead {
            meta: msg.meta,
            keys,
        }
        .answer(&self.store, &self.replies);

        Ok(())
    }

    fn reset_workers(&mut self, msg: Message) -> Result<()> {
        let workers = decoded(self.model_id, msg.worker_ids())?;

        if !self.adds.is_empty() || !self.gets.is_empty() {
            warn!(
                model_id = self.model_id,
                adds = self.adds.values().map(Vec::len).sum::<usize>(),
                gets = self.gets.values().map(Vec::len).sum::<usize>();
                "discarding buffered operations of the previous worker set"
            );
            self.adds.clear();
            self.gets.clear();
        }

        info!(model_id = self.model_id; "resetting workers to {workers:?}");
        self.tracker.init(workers);
        self.admission.on_min_clock(self.tracker.min_clock());
        self.replies
            .push(Message::reply_to(&msg.meta, Flag::ResetAck, Vec::new()));

        Ok(())
    }

    fn progress(&self, worker: WorkerId) -> Result<Clock> {
        self.tracker.progress(worker)
    }

    fn min_clock(&self) -> Clock {
        self.tracker.min_clock()
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.store.load_from(path)?;
        info!(model_id = self.model_id; "store loaded from {}", path.display());
        Ok(())
    }
}
