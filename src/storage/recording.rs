use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

use super::{MapStore, Store};
use crate::message::{Key, KvPairs};

/// A store call observed by a `RecordingStore`.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Add(KvPairs),
    FinishIter,
    WriteTo(PathBuf),
}

/// A `MapStore` that logs the mutating calls it receives.
///
/// The log is shared so tests can inspect it after the store moved into a model.
pub struct RecordingStore {
    inner: MapStore,
    calls: Arc<Mutex<Vec<Call>>>,
    fail_writes: bool,
}

impl RecordingStore {
    pub fn new() -> (Self, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let store = Self {
            inner: MapStore::new(),
            calls: Arc::clone(&calls),
            fail_writes: false,
        };

        (store, calls)
    }

    /// Makes every `write_to` call fail after recording it.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

impl Store for RecordingStore {
    fn add(&mut self, req: &KvPairs) {
        self.calls.lock().push(Call::Add(req.clone()));
        self.inner.add(req);
    }

    fn get(&self, keys: &[Key]) -> KvPairs {
        self.inner.get(keys)
    }

    fn finish_iter(&mut self) {
        self.calls.lock().push(Call::FinishIter);
        self.inner.finish_iter();
    }

    fn write_to(&self, path: &Path) -> io::Result<()> {
        self.calls.lock().push(Call::WriteTo(path.to_path_buf()));

        if self.fail_writes {
            return Err(io::Error::other("disk full"));
        }

        Ok(())
    }

    fn load_from(&mut self, path: &Path) -> io::Result<()> {
        self.inner.load_from(path)
    }
}
