use std::{io, path::Path};

use crate::message::{Key, KvPairs};

/// The key/value engine a model instance applies writes to and answers reads from.
///
/// Writes land through `add` and only become readable after `finish_iter` closes the round.
pub trait Store: Send {
    /// Applies one buffered write.
    fn add(&mut self, req: &KvPairs);

    /// Reads `keys` against the last committed round, missing keys read as zero.
    fn get(&self, keys: &[Key]) -> KvPairs;

    /// Commits every write added since the previous call.
    fn finish_iter(&mut self);

    /// Persists the committed state to `path`.
    fn write_to(&self, path: &Path) -> io::Result<()>;

    /// Replaces the current state with the one stored at `path`.
    fn load_from(&mut self, path: &Path) -> io::Result<()>;
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn add(&mut self, req: &KvPairs) {
        (**self).add(req)
    }

    fn get(&self, keys: &[Key]) -> KvPairs {
        (**self).get(keys)
    }

    fn finish_iter(&mut self) {
        (**self).finish_iter()
    }

    fn write_to(&self, path: &Path) -> io::Result<()> {
        (**self).write_to(path)
    }

    fn load_from(&mut self, path: &Path) -> io::Result<()> {
        (**self).load_from(path)
    }
}
