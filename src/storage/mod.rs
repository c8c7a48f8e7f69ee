mod map;
#[cfg(test)]
mod recording;
mod store;

pub use map::MapStore;
#[cfg(test)]
pub(crate) use recording::{Call, RecordingStore};
pub use store::Store;
