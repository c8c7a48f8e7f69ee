use log::warn;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::message::Message;

/// The sending end of the queue every reply is pushed into.
///
/// Owned by the model host and handed to each model at construction, the draining
/// side lives outside of the engine.
#[derive(Debug, Clone)]
pub struct ReplyQueue {
    tx: UnboundedSender<Message>,
}

impl ReplyQueue {
    /// Creates a new reply queue.
    ///
    /// # Returns
    /// The pushing end and the draining end of the queue.
    pub fn channel() -> (Self, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Pushes a reply, never blocks.
    pub fn push(&self, msg: Message) {
        if let Err(e) = self.tx.send(msg) {
            let meta = e.0.meta;
            warn!(
                model_id = meta.model_id,
                recver = meta.recver;
                "reply queue closed, dropping {:?} reply", meta.flag
            );
        }
    }
}
