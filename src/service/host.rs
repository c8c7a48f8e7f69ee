use std::{
    collections::{HashMap, hash_map::Entry},
    path::Path,
};

use log::{error, warn};

use crate::{
    error::{ConsistencyViolation, EngineErr, Result},
    message::{Flag, Message, ModelId},
    synchronization::{ConsistencyModel, ReplyQueue},
};

enum Slot {
    Live(Box<dyn ConsistencyModel>),
    Halted(ConsistencyViolation),
}

/// Owns a set of model instances and routes operations to them.
///
/// A host is driven by exactly one consumer, which is what lets the models
/// mutate their buffers and trackers without locking.
pub struct ModelHost {
    server_id: u32,
    replies: ReplyQueue,
    models: HashMap<ModelId, Slot>,
}

impl ModelHost {
    /// Creates a new `ModelHost` without models.
    ///
    /// # Arguments
    /// * `server_id` - The identity of this server, used in checkpoint names.
    /// * `replies` - The reply queue handed to every model this host builds.
    pub fn new(server_id: u32, replies: ReplyQueue) -> Self {
        Self {
            server_id,
            replies,
            models: HashMap::new(),
        }
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    /// A handle to the reply queue, for models built to be registered here.
    pub fn replies(&self) -> ReplyQueue {
        self.replies.clone()
    }

    /// Takes ownership of `model` and serves it under `model_id`.
    ///
    /// # Returns
    /// A `DuplicateModel` error if `model_id` is already taken, or `ModelIdMismatch`
    /// if `model` serves another id.
    pub fn register(&mut self, model_id: ModelId, model: Box<dyn ConsistencyModel>) -> Result<()> {
        if model.model_id() != model_id {
            return Err(EngineErr::ModelIdMismatch {
                key: model_id,
                model_id: model.model_id(),
            });
        }

        match self.models.entry(model_id) {
            Entry::Occupied(_) => Err(EngineErr::DuplicateModel(model_id)),
            Entry::Vacant(slot) => {
                slot.insert(Slot::Live(model));
                Ok(())
            }
        }
    }

    /// Routes `msg` to the operation its flag names on the addressed model.
    ///
    /// A consistency violation halts the model that raised it, every later
    /// message addressed to it fails with `Halted`.
    pub fn dispatch(&mut self, msg: Message) -> Result<()> {
        let model_id = msg.meta.model_id;
        let slot = self
            .models
            .get_mut(&model_id)
            .ok_or(EngineErr::UnknownModel(model_id))?;

        let Slot::Live(model) = slot else {
            return Err(EngineErr::Halted(model_id));
        };

        let flag = msg.meta.flag;
        let res = match flag {
            Flag::Advance => model.advance(msg),
            Flag::Write => model.write(msg),
            Flag::Read => model.read(msg),
            Flag::InitRead => model.init_read(msg),
            Flag::Reset => model.reset_workers(msg),
            flag => Err(EngineErr::UnexpectedFlag { model_id, flag }),
        };

        if let Err(EngineErr::Consistency(v)) = &res {
            error!(
                server_id = self.server_id,
                model_id = model_id,
                worker = v.worker,
                progress = v.progress,
                min_clock = v.min_clock;
                "halting model: {v}"
            );
            *slot = Slot::Halted(v.clone());
        }

        res
    }

    /// Dispatches `msg`, answering any failure to its originator.
    pub fn handle(&mut self, msg: Message) {
        let meta = msg.meta;

        if let Err(e) = self.dispatch(msg) {
            if !e.is_fatal() {
                warn!(
                    server_id = self.server_id,
                    model_id = meta.model_id,
                    sender = meta.sender;
                    "{:?} failed: {e}", meta.flag
                );
            }

            let data = vec![e.to_string().into_bytes()];
            self.replies.push(Message::reply_to(&meta, Flag::Err, data));
        }
    }

    /// Restores a live model's store from a snapshot.
    pub fn load(&mut self, model_id: ModelId, path: &Path) -> Result<()> {
        match self.models.get_mut(&model_id) {
            Some(Slot::Live(model)) => model.load(path),
            Some(Slot::Halted(_)) => Err(EngineErr::Halted(model_id)),
            None => Err(EngineErr::UnknownModel(model_id)),
        }
    }

    /// The live model served under `model_id`.
    pub fn model(&self, model_id: ModelId) -> Option<&dyn ConsistencyModel> {
        match self.models.get(&model_id)? {
            Slot::Live(model) => Some(&**model),
            Slot::Halted(_) => None,
        }
    }

    /// The violation that halted `model_id`, if any.
    pub fn halted(&self, model_id: ModelId) -> Option<&ConsistencyViolation> {
        match self.models.get(&model_id)? {
            Slot::Halted(v) => Some(v),
            Slot::Live(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
