use std::path::PathBuf;

use log::{info, warn};

use crate::{
    message::{Clock, ModelId},
    storage::Store,
};

/// Decides when a model's store gets snapshotted and under which name.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    interval: i64,
    prefix: String,
    server_id: u32,
}

impl Checkpointer {
    /// Creates a new `Checkpointer`.
    ///
    /// # Arguments
    /// * `interval` - Snapshot every `interval` min clock advances, never if not positive.
    /// * `prefix` - Prepended verbatim to every snapshot name.
    /// * `server_id` - The hosting server, part of every snapshot name.
    pub fn new(interval: i64, prefix: impl Into<String>, server_id: u32) -> Self {
        Self {
            interval,
            prefix: prefix.into(),
            server_id,
        }
    }

    /// A checkpointer that never fires.
    pub fn disabled(server_id: u32) -> Self {
        Self::new(0, "", server_id)
    }

    /// Whether a snapshot is due at `min_clock`.
    pub fn due(&self, min_clock: Clock) -> bool {
        let Ok(interval) = Clock::try_from(self.interval) else {
            return false;
        };

        interval > 0 && min_clock > 0 && min_clock % interval == 0
    }

    /// The snapshot name for `min_clock`.
    pub fn path(&self, min_clock: Clock) -> PathBuf {
        PathBuf::from(format!(
            "{}MODEL_v{min_clock}_part{}",
            self.prefix, self.server_id
        ))
    }

    /// Snapshots `store` if one is due at `min_clock`.
    ///
    /// A failed write is logged and skipped, the next due round will try again.
    pub fn maybe_dump<S: Store + ?Sized>(&self, model_id: ModelId, min_clock: Clock, store: &S) {
        if !self.due(min_clock) {
            return;
        }

        let path = self.path(min_clock);
        match store.write_to(&path) {
            Ok(()) => info!(
                model_id = model_id,
                min_clock = min_clock;
                "checkpoint written to {}", path.display()
            ),
            Err(e) => warn!(
                model_id = model_id,
                min_clock = min_clock;
                "skipping checkpoint {}: {e}", path.display()
            ),
        }
    }
}
