use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use super::Store;
use crate::message::{Key, KvPairs, Val};

/// A sparse in-memory store, writes accumulate into their key.
#[derive(Debug, Default)]
pub struct MapStore {
    committed: HashMap<Key, Val>,
    staged: HashMap<Key, Val>,
    iters: u64,
}

/// The on-disk layout of a `MapStore` snapshot.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    iters: u64,
    entries: Vec<(Key, Val)>,
}

impl MapStore {
    /// Creates a new empty `MapStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The amount of committed rounds.
    pub fn iters(&self) -> u64 {
        self.iters
    }

    /// The amount of committed keys.
    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }
}

impl Store for MapStore {
    fn add(&mut self, req: &KvPairs) {
        for (&k, &v) in req.keys.iter().zip(&req.vals) {
            *self.staged.entry(k).or_default() += v;
        }
    }

    fn get(&self, keys: &[Key]) -> KvPairs {
        let vals = keys
            .iter()
            .map(|k| self.committed.get(k).copied().unwrap_or_default())
            .collect();

        KvPairs {
            keys: keys.to_vec(),
            vals,
        }
    }

    fn finish_iter(&mut self) {
        for (k, v) in self.staged.drain() {
            *self.committed.entry(k).or_default() += v;
        }

        self.iters += 1;
    }

    fn write_to(&self, path: &Path) -> io::Result<()> {
        let mut entries: Vec<_> = self.committed.iter().map(|(&k, &v)| (k, v)).collect();
        entries.sort_unstable_by_key(|&(k, _)| k);

        let snapshot = Snapshot {
            iters: self.iters,
            entries,
        };

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &snapshot)?;
        writer.flush()
    }

    fn load_from(&mut self, path: &Path) -> io::Result<()> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;

        self.committed = snapshot.entries.into_iter().collect();
        self.staged.clear();
        self.iters = snapshot.iters;
        Ok(())
    }
}
