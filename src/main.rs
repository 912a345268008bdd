use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use deso_node::config::Settings;
use deso_node::logging::{init_logging, LogFormat};
use deso_node::{NetworkManager, Node, PeerAddr};

#[derive(Parser, Debug, Clone)]
#[command(name = "deso-node", version, about = "Serverless flood-gossip overlay node")]
struct Args {
    /// TOML config file (DESO_* env vars override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// listen host
    #[arg(long)]
    host: Option<String>,

    /// listen port
    #[arg(long)]
    port: Option<u16>,

    /// host announced to peers in hello
    #[arg(long)]
    advertise_host: Option<String>,

    /// peer to say hello to at startup, host:port (can be repeated)
    #[arg(long)]
    connect: Vec<String>,

    /// disable subnet scan and peer exchange
    #[arg(long)]
    no_discovery: bool,

    /// disable ping/pong pruning
    #[arg(long)]
    no_liveness: bool,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// also write daily-rolling logs here
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.node.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.node.port = port;
        }
        if let Some(host) = &self.advertise_host {
            settings.node.advertise_host = Some(host.clone());
        }
        if self.no_discovery {
            settings.network.enable_discovery = false;
        }
        if self.no_liveness {
            settings.network.enable_liveness = false;
        }
        if let Some(level) = &self.log_level {
            settings.log.level = level.clone();
        }
        if let Some(format) = self.log_format {
            settings.log.format = format;
        }
        if let Some(dir) = &self.log_dir {
            settings.log.dir = Some(dir.clone());
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("failed to load config")?;
    args.apply(&mut settings);
    settings.validate().context("invalid config")?;

    if args.print_config {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    let _log_guard = init_logging(&settings.log.level, settings.log.format, settings.log.dir.as_deref());

    let node = Node::new(settings.clone()).context("invalid config")?;
    let server = node.bind().await.context("failed to start node")?;
    let serve = tokio::spawn(server.serve());

    for target in &args.connect {
        match PeerAddr::parse(target) {
            Some(peer) => {
                node.connect_to_peer(&peer.host, peer.port).await;
            }
            None => tracing::warn!(addr = %target, "ignoring malformed --connect address"),
        }
    }

    let manager = NetworkManager::new(node.peer_set().clone(), settings).context("invalid config")?;
    tokio::spawn(manager.run());

    tokio::select! {
        res = serve => {
            res.context("server task panicked")?.context("server stopped")?;
        }
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            tracing::info!(peers = node.peers().len(), known_txs = node.known_transactions().len(), "shutting down");
        }
    }

    Ok(())
}
