pub mod config;
pub mod error;
pub mod message;
pub mod progress;
pub mod service;
pub mod storage;
pub mod synchronization;

pub use error::{EngineErr, Result};
pub use message::{Flag, Message};
pub use service::{ModelBuilder, ModelHost, ServerThread};
