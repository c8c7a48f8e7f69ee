mod builder;
mod host;
mod server;

pub use builder::ModelBuilder;
pub use host::ModelHost;
pub use server::ServerThread;
