use std::{env, io};

use log::{debug, info, warn};
use tokio::signal;

use param_sync::{
    ModelBuilder, ServerThread, config::NodeConfig, message::Flag, synchronization::ReplyQueue,
};

const DEFAULT_CONFIG: &str = "param_sync.json";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let path = env::var("PARAM_SYNC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let config = NodeConfig::from_path(&path)?;
    info!("loaded config from {path}");

    let (replies, mut reply_rx) = ReplyQueue::channel();
    let builder = ModelBuilder::new(replies);

    let mut servers = Vec::with_capacity(config.servers.len());
    for server_config in &config.servers {
        let mut server = ServerThread::new(builder.build_host(server_config)?);
        server.start()?;
        servers.push(server);
    }

    // Replies have no transport here, they are only traced.
    let drain = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            let meta = reply.meta;
            match meta.flag {
                Flag::Err => warn!(
                    model_id = meta.model_id,
                    recver = meta.recver;
                    "error reply: {}", reply.err_text().unwrap_or_default()
                ),
                flag => debug!(
                    model_id = meta.model_id,
                    recver = meta.recver;
                    "{flag:?} reply with {} blocks", reply.data.len()
                ),
            }
        }
    });

    signal::ctrl_c().await?;
    info!("received ctrl-c, stopping {} servers", servers.len());

    for server in servers {
        let server_id = server.server_id();
        let host = tokio::task::spawn_blocking(move || server.stop())
            .await
            .map_err(io::Error::other)??;
        info!(server_id = server_id, models = host.len(); "server stopped");
    }

    // Dropping the builder closes the last reply sender outside the hosts.
    drop(builder);
    drain.await.map_err(io::Error::other)?;

    Ok(())
}
