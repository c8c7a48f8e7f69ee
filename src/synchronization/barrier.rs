use std::path::Path;

use log::{debug, info, warn};

use super::{
    Checkpointer, ConsistencyModel, ReplyQueue,
    model::{PendingRead, decoded, violation},
};
use crate::{
    error::{Result, Violation},
    message::{Clock, Flag, KvPairs, Message, ModelId, WorkerId},
    progress::ProgressTracker,
    storage::Store,
};

/// Strict bulk synchronous rounds, no worker may be more than one round ahead of the min clock.
///
/// Writes of a round are applied together once every worker finished it, reads issued by
/// workers that already finished the round wait for it to close.
pub struct BarrierModel<S: Store> {
    model_id: ModelId,
    store: S,
    tracker: ProgressTracker,
    replies: ReplyQueue,
    checkpointer: Checkpointer,
    adds: Vec<KvPairs>,
    gets: Vec<PendingRead>,
}

impl<S: Store> BarrierModel<S> {
    /// Creates a new `BarrierModel`.
    ///
    /// # Arguments
    /// * `model_id` - The model this instance serves.
    /// * `store` - The store, owned by the model from now on.
    /// * `replies` - Where answers and acknowledgements are pushed.
    /// * `checkpointer` - The snapshot policy.
    pub fn new(model_id: ModelId, store: S, replies: ReplyQueue, checkpointer: Checkpointer) -> Self {
        info!(model_id = model_id; "barrier model created");

        Self {
            model_id,
            store,
            tracker: ProgressTracker::new(model_id, 1),
            replies,
            checkpointer,
            adds: Vec::new(),
            gets: Vec::new(),
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

    /// The amount of reads waiting for the current round to close.
    pub fn pending_read_count(&self) -> usize {
        self.gets.len()
    }

    /// The amount of writes waiting for the current round to close.
    pub fn pending_write_count(&self) -> usize {
        self.adds.len()
    }

    /// Applies the closed round's writes, commits them and answers the waiting reads.
    fn close_round(&mut self, min_clock: Clock) {
        let (adds, gets) = (self.adds.len(), self.gets.len());

        for req in self.adds.drain(..) {
            self.store.add(&req);
        }

        self.store.finish_iter();

        for read in self.gets.drain(..) {
            read.answer(&self.store, &self.replies);
        }

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

impl<S: Store> ConsistencyModel for BarrierModel<S> {
    fn model_id(&self) -> ModelId {
        self.model_id
    }

    fn advance(&mut self, msg: Message) -> Result<()> {
        let sender = msg.meta.sender;

        if let Some(min_clock) = self.tracker.advance_and_get_changed_min_clock(sender)? {
            self.close_round(min_clock);
        }

        Ok(())
    }

    fn write(&mut self, msg: Message) -> Result<()> {
        let progress = self.tracker.progress(msg.meta.sender)?;
        let min_clock = self.tracker.min_clock();

        if progress != min_clock {
            let kind = Violation::Progress {
                expected: min_clock,
            };
            return Err(violation(&msg.meta, progress, min_clock, kind));
        }

        let kvs = decoded(self.model_id, msg.kv_pairs())?;
        self.adds.push(kvs);
        Ok(())
    }

    fn read(&mut self, msg: Message) -> Result<()> {
        let progress = self.tracker.progress(msg.meta.sender)?;
        let min_clock = self.tracker.min_clock();
        let keys = decoded(self.model_id, msg.keys())?;
        let read = PendingRead {
            meta: msg.meta,
            keys,
        };

        if progress == min_clock + 1 {
            self.gets.push(read);
        } else if progress == min_clock {
            read.answer(&self.store, &self.replies);
        } else {
            let kind = Violation::Progress {
                expected: min_clock,
            };
            return Err(violation(&msg.meta, progress, min_clock, kind));
        }

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
                adds = self.adds.len(),
                gets = self.gets.len();
                "discarding buffered operations of the previous worker set"
            );
            self.adds.clear();
            self.gets.clear();
        }

        info!(model_id = self.model_id; "resetting workers to {workers:?}");
        self.tracker.init(workers);
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

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use parking_lot::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::{
        error::EngineErr,
        message::{Key, Val},
        storage::{Call, RecordingStore},
    };

    const MODEL: ModelId = 0;

    struct Fixture {
        model: BarrierModel<RecordingStore>,
        calls: Arc<Mutex<Vec<Call>>>,
        replies: UnboundedReceiver<Message>,
    }

    fn fixture(workers: &[WorkerId], checkpointer: Checkpointer) -> Fixture {
        let (store, calls) = RecordingStore::new();
        let (queue, replies) = ReplyQueue::channel();
        let model = BarrierModel::new(MODEL, store, queue, checkpointer)
            .with_workers(workers.iter().copied());

        Fixture {
            model,
            calls,
            replies,
        }
    }

    fn pairs(keys: &[Key], vals: &[Val]) -> KvPairs {
        KvPairs {
            keys: keys.to_vec(),
            vals: vals.to_vec(),
        }
    }

    fn advance_all(model: &mut BarrierModel<RecordingStore>, workers: &[WorkerId]) {
        for &w in workers {
            model.advance(Message::advance(MODEL, w)).unwrap();
        }
    }

    #[test]
    fn test_round_closes_when_every_worker_advanced() {
        let mut fx = fixture(&[1, 2, 3], Checkpointer::disabled(0));
        fx.model.write(Message::write(MODEL, 1, &[10], &[1.0])).unwrap();
        fx.model.write(Message::write(MODEL, 2, &[10], &[2.0])).unwrap();

        fx.model.advance(Message::advance(MODEL, 1)).unwrap();
        fx.model.read(Message::read(MODEL, 1, &[10])).unwrap();
        fx.model.advance(Message::advance(MODEL, 2)).unwrap();

        assert_eq!(fx.model.min_clock(), 0);
        assert!(fx.calls.lock().is_empty());
        assert_eq!(fx.model.pending_write_count(), 2);
        assert_eq!(fx.model.pending_read_count(), 1);
        assert!(fx.replies.try_recv().is_err());

        fx.model.advance(Message::advance(MODEL, 3)).unwrap();

        assert_eq!(fx.model.min_clock(), 1);
        assert_eq!(
            *fx.calls.lock(),
            [
                Call::Add(pairs(&[10], &[1.0])),
                Call::Add(pairs(&[10], &[2.0])),
                Call::FinishIter,
            ]
        );
        assert_eq!(fx.model.pending_write_count(), 0);
        assert_eq!(fx.model.pending_read_count(), 0);

        let reply = fx.replies.try_recv().unwrap();
        assert_eq!(reply.meta.flag, Flag::ReadReply);
        assert_eq!(reply.meta.recver, 1);
        assert_eq!(reply.kv_pairs().unwrap(), pairs(&[10], &[3.0]));
        assert!(fx.replies.try_recv().is_err());
    }

    #[test]
    fn test_finish_iter_only_when_min_clock_moves() {
        let mut fx = fixture(&[1, 2], Checkpointer::disabled(0));

        fx.model.advance(Message::advance(MODEL, 1)).unwrap();
        assert!(fx.calls.lock().is_empty());

        fx.model.advance(Message::advance(MODEL, 2)).unwrap();
        fx.model.advance(Message::advance(MODEL, 2)).unwrap();
        fx.model.advance(Message::advance(MODEL, 1)).unwrap();

        let finishes = fx
            .calls
            .lock()
            .iter()
            .filter(|c| **c == Call::FinishIter)
            .count();
        assert_eq!(finishes, 2);
    }

    #[test]
    fn test_writes_keep_buffering_order() {
        let mut fx = fixture(&[1], Checkpointer::disabled(0));

        fx.model.write(Message::write(MODEL, 1, &[1], &[1.0])).unwrap();
        fx.model.write(Message::write(MODEL, 1, &[2], &[2.0])).unwrap();
        fx.model.write(Message::write(MODEL, 1, &[1], &[3.0])).unwrap();
        fx.model.advance(Message::advance(MODEL, 1)).unwrap();

        assert_eq!(
            *fx.calls.lock(),
            [
                Call::Add(pairs(&[1], &[1.0])),
                Call::Add(pairs(&[2], &[2.0])),
                Call::Add(pairs(&[1], &[3.0])),
                Call::FinishIter,
            ]
        );
    }

    #[test]
    fn test_write_ahead_of_round_is_violation() {
        let mut fx = fixture(&[1, 2], Checkpointer::disabled(0));
        fx.model.write(Message::write(MODEL, 1, &[1], &[1.0])).unwrap();
        fx.model.write(Message::write(MODEL, 1, &[1], &[1.0])).unwrap();
        fx.model.advance(Message::advance(MODEL, 1)).unwrap();

        let err = fx
            .model
            .write(Message::write(MODEL, 1, &[1], &[1.0]))
            .unwrap_err();

        let EngineErr::Consistency(v) = err else {
            panic!("expected a consistency violation, got {err:?}");
        };
        assert_eq!(v.worker, 1);
        assert_eq!(v.flag, Flag::Write);
        assert_eq!(v.progress, 1);
        assert_eq!(v.min_clock, 0);
        assert_eq!(v.kind, Violation::Progress { expected: 0 });
        assert_eq!(fx.model.pending_write_count(), 2);
    }

    #[test]
    fn test_same_round_read_is_answered_immediately() {
        let mut fx = fixture(&[1, 2], Checkpointer::disabled(0));
        fx.model.write(Message::write(MODEL, 2, &[4], &[5.0])).unwrap();

        fx.model.read(Message::read(MODEL, 1, &[4])).unwrap();

        let reply = fx.replies.try_recv().unwrap();
        assert_eq!(reply.kv_pairs().unwrap(), pairs(&[4], &[0.0]));
        assert_eq!(fx.model.pending_read_count(), 0);
    }

    #[test]
    fn test_buffered_reads_are_answered_once_in_order() {
        let mut fx = fixture(&[1, 2, 3], Checkpointer::disabled(0));
        advance_all(&mut fx.model, &[1, 2]);

        fx.model.read(Message::read(MODEL, 1, &[1])).unwrap();
        fx.model.read(Message::read(MODEL, 2, &[2])).unwrap();
        fx.model.read(Message::read(MODEL, 1, &[3])).unwrap();
        assert!(fx.replies.try_recv().is_err());

        fx.model.advance(Message::advance(MODEL, 3)).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| fx.replies.try_recv().ok())
            .map(|r| (r.meta.recver, r.kv_pairs().unwrap().keys))
            .collect();
        assert_eq!(order, [(1, vec![1]), (2, vec![2]), (1, vec![3])]);

        advance_all(&mut fx.model, &[1, 2, 3]);
        assert!(fx.replies.try_recv().is_err());
    }

    #[test]
    fn test_unknown_worker_is_rejected() {
        let mut fx = fixture(&[1], Checkpointer::disabled(0));

        for msg in [
            Message::advance(MODEL, 9),
            Message::write(MODEL, 9, &[1], &[1.0]),
            Message::read(MODEL, 9, &[1]),
            Message::init_read(MODEL, 9, &[1]),
        ] {
            let flag = msg.meta.flag;
            let res = match flag {
                Flag::Advance => fx.model.advance(msg),
                Flag::Write => fx.model.write(msg),
                Flag::Read => fx.model.read(msg),
                _ => fx.model.init_read(msg),
            };

            assert!(matches!(
                res,
                Err(EngineErr::UnknownWorker { worker: 9, .. })
            ));
        }
    }

    #[test]
    fn test_malformed_write_is_decode_error() {
        let mut fx = fixture(&[1], Checkpointer::disabled(0));
        let mut msg = Message::write(MODEL, 1, &[1, 2], &[1.0, 2.0]);
        msg.data.pop();

        assert!(matches!(
            fx.model.write(msg),
            Err(EngineErr::Decode { model_id: MODEL, .. })
        ));
        assert_eq!(fx.model.pending_write_count(), 0);
    }

    #[test]
    fn test_init_read_ignores_progress() {
        let mut fx = fixture(&[1, 2], Checkpointer::disabled(0));
        fx.model.advance(Message::advance(MODEL, 1)).unwrap();

        fx.model.init_read(Message::init_read(MODEL, 1, &[3])).unwrap();

        let reply = fx.replies.try_recv().unwrap();
        assert_eq!(reply.meta.flag, Flag::ReadReply);
        assert_eq!(fx.model.pending_read_count(), 0);
    }

    #[test]
    fn test_reset_reinitializes_and_acknowledges() {
        let mut fx = fixture(&[1, 2], Checkpointer::disabled(0));
        advance_all(&mut fx.model, &[1, 2]);
        fx.model.write(Message::write(MODEL, 1, &[1], &[1.0])).unwrap();
        fx.model.advance(Message::advance(MODEL, 1)).unwrap();
        fx.model.read(Message::read(MODEL, 1, &[1])).unwrap();

        let mut msg = Message::reset(MODEL, 7, &[4, 5, 6]);
        msg.meta.recver = 3;
        fx.model.reset_workers(msg).unwrap();

        assert_eq!(fx.model.min_clock(), 0);
        assert_eq!(fx.model.pending_write_count(), 0);
        assert_eq!(fx.model.pending_read_count(), 0);
        for w in [4, 5, 6] {
            assert_eq!(fx.model.progress(w).unwrap(), 0);
        }
        assert!(matches!(
            fx.model.progress(1),
            Err(EngineErr::UnknownWorker { worker: 1, .. })
        ));

        let ack = fx.replies.try_recv().unwrap();
        assert_eq!(ack.meta.flag, Flag::ResetAck);
        assert_eq!(ack.meta.model_id, MODEL);
        assert_eq!(ack.meta.recver, 7);
        assert_eq!(ack.meta.sender, 3);
        assert!(fx.replies.try_recv().is_err());
    }

    #[test]
    fn test_checkpoint_every_interval() {
        let mut fx = fixture(&[1, 2], Checkpointer::new(2, "ckpt/", 5));

        for _ in 0..5 {
            advance_all(&mut fx.model, &[1, 2]);
        }

        let dumps: Vec<_> = fx
            .calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::WriteTo(path) => Some(path.clone()),
                _ => None,
            })
            .collect();

        assert_eq!(
            dumps,
            [
                PathBuf::from("ckpt/MODEL_v2_part5"),
                PathBuf::from("ckpt/MODEL_v4_part5"),
            ]
        );
    }

    #[test]
    fn test_failed_checkpoint_is_skipped() {
        let (store, calls) = RecordingStore::new();
        let (queue, _replies) = ReplyQueue::channel();
        let checkpointer = Checkpointer::new(1, "", 0);
        let mut model =
            BarrierModel::new(MODEL, store.failing_writes(), queue, checkpointer).with_workers([1]);

        model.advance(Message::advance(MODEL, 1)).unwrap();
        model.advance(Message::advance(MODEL, 1)).unwrap();

        assert_eq!(model.min_clock(), 2);
        let writes = calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::WriteTo(_)))
            .count();
        assert_eq!(writes, 2);
    }
}
