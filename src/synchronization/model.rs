use std::path::Path;

use crate::{
    error::{ConsistencyViolation, DecodeErr, EngineErr, Result, Violation},
    message::{Clock, Flag, Key, Message, Meta, ModelId, WorkerId},
    storage::Store,
    synchronization::ReplyQueue,
};

/// The capability set every consistency model offers to the model host.
///
/// Implementations are driven by a single consumer, so none of these methods
/// need internal synchronization.
pub trait ConsistencyModel: Send {
    /// The model this instance serves.
    fn model_id(&self) -> ModelId;

    /// Advances the sender's clock, releasing buffered operations if the min clock moved.
    fn advance(&mut self, msg: Message) -> Result<()>;

    /// Buffers the sender's write until the round it belongs to closes.
    fn write(&mut self, msg: Message) -> Result<()>;

    /// Answers the sender's read now or buffers it until its round is visible.
    fn read(&mut self, msg: Message) -> Result<()>;

    /// Answers an initial read regardless of the sender's progress.
    fn init_read(&mut self, msg: Message) -> Result<()>;

    /// Replaces the live worker set and acknowledges it to the sender.
    fn reset_workers(&mut self, msg: Message) -> Result<()>;

    /// The clock of a live worker.
    fn progress(&self, worker: WorkerId) -> Result<Clock>;

    /// The current barrier value.
    fn min_clock(&self) -> Clock;

    /// Restores the store from a snapshot.
    fn load(&mut self, path: &Path) -> Result<()>;
}

/// A read waiting for its round to become visible.
#[derive(Debug)]
pub(super) struct PendingRead {
    pub meta: Meta,
    pub keys: Vec<Key>,
}

impl PendingRead {
    /// Answers this read against the committed state of `store`.
    pub fn answer<S: Store + ?Sized>(self, store: &S, replies: &ReplyQueue) {
        let data = store.get(&self.keys).into_blocks();
        replies.push(Message::reply_to(&self.meta, Flag::ReadReply, data));
    }
}

/// Attaches the model id to a payload decoding failure.
pub(super) fn decoded<T>(model_id: ModelId, res: std::result::Result<T, DecodeErr>) -> Result<T> {
    res.map_err(|source| EngineErr::Decode { model_id, source })
}

/// Builds the violation for an operation issued at the wrong progress.
pub(super) fn violation(
    meta: &Meta,
    progress: Clock,
    min_clock: Clock,
    kind: Violation,
) -> EngineErr {
    EngineErr::Consistency(ConsistencyViolation {
        model_id: meta.model_id,
        worker: meta.sender,
        flag: meta.flag,
        progress,
        min_clock,
        kind,
    })
}
