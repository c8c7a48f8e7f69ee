use std::{
    io,
    thread::{self, JoinHandle},
};

use log::info;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::ModelHost;
use crate::message::{Flag, Message};

/// Binds a `ModelHost` to its own OS thread fed by an unbounded work queue.
///
/// Producers push into the queue from anywhere, the thread pops and handles one
/// message at a time until it sees an `Exit` message.
pub struct ServerThread {
    server_id: u32,
    work_tx: UnboundedSender<Message>,
    idle: Option<(ModelHost, UnboundedReceiver<Message>)>,
    handle: Option<JoinHandle<ModelHost>>,
}

impl ServerThread {
    /// Creates a new `ServerThread`, it doesn't run until `start` is called.
    ///
    /// # Arguments
    /// * `host` - The models this thread will serve.
    pub fn new(host: ModelHost) -> Self {
        let (work_tx, work_rx) = mpsc::unbounded_channel();

        Self {
            server_id: host.server_id(),
            work_tx,
            idle: Some((host, work_rx)),
            handle: None,
        }
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    /// A producer handle for the work queue, pushing never blocks.
    pub fn work_queue(&self) -> UnboundedSender<Message> {
        self.work_tx.clone()
    }

    /// Spawns the serving thread, calling it twice is a no-op.
    pub fn start(&mut self) -> io::Result<()> {
        let Some((host, work_rx)) = self.idle.take() else {
            return Ok(());
        };

        let handle = thread::Builder::new()
            .name(format!("server-{}", self.server_id))
            .spawn(move || serve(host, work_rx))?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Stops the serving thread after the messages queued before this call are handled.
    ///
    /// # Returns
    /// The host, for inspection, or an error if the serving thread panicked.
    pub fn stop(mut self) -> io::Result<ModelHost> {
        if let Some((host, _)) = self.idle.take() {
            return Ok(host);
        }

        // The receiver outlives the sender only if the thread already died.
        let _ = self.work_tx.send(Message::exit());

        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::other("server thread panicked")),
            None => Err(io::Error::other("server thread was never started")),
        }
    }
}

/// The serving loop, the only consumer of the work queue.
fn serve(mut host: ModelHost, mut work_rx: UnboundedReceiver<Message>) -> ModelHost {
    let server_id = host.server_id();
    info!(server_id = server_id, models = host.len(); "server thread started");

    while let Some(msg) = work_rx.blocking_recv() {
        if msg.meta.flag == Flag::Exit {
            break;
        }

        host.handle(msg);
    }

    info!(server_id = server_id; "server thread stopped");
    host
}
