mod admission;
mod barrier;
mod checkpoint;
mod model;
mod reply;
mod sparse;

pub use admission::{Admission, AdmitAll, KeyRanges, Ticket};
pub use barrier::BarrierModel;
pub use checkpoint::Checkpointer;
pub use model::ConsistencyModel;
pub use reply::ReplyQueue;
pub use sparse::SparseSspModel;
