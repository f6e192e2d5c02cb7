//! Geowitness replica daemon
//!
//! One process per replica. Loads (or provisions) the cluster key file,
//! wires the coordinator over the websocket transport, advances the logical
//! clock on a timer, and serves until interrupted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use geowitness_crypto::{
    directory_of, generate_cluster_keys, load_cluster_keys, save_cluster_keys,
};
use geowitness_replica::{Coordinator, ReplicaConfig, Transport};
use geowitness_types::{replica_id, LogicalClock, PartyId};

mod net;

/// Byzantine-tolerant witnessed location report cluster
#[derive(Parser, Debug)]
#[command(name = "geowitness")]
#[command(about = "Replica daemon for the geowitness location-report cluster", long_about = None)]
struct Args {
    /// This replica's index in the cluster ordering
    #[arg(long)]
    replica_index: usize,

    /// Number of replicas in the cluster
    #[arg(long, default_value = "4")]
    replicas: usize,

    /// Tolerated Byzantine replicas
    #[arg(long, default_value = "0")]
    faults: usize,

    /// Bind address for this replica
    #[arg(long, default_value = "127.0.0.1:9000")]
    listen_addr: String,

    /// Peer addresses in replica-index order, comma separated
    #[arg(long, value_delimiter = ',')]
    peer_addrs: Vec<String>,

    /// Cluster key file, shared by the simulated deployment
    #[arg(long, default_value = "./data/keys.json")]
    key_file: PathBuf,

    /// Client ids to provision when generating a fresh key file
    #[arg(long, default_value = "16")]
    provision_clients: u32,

    /// Witness detection range, in grid units
    #[arg(long, default_value = "2.0")]
    detection_range: f64,

    /// Milliseconds per logical tick
    #[arg(long, default_value = "1000")]
    tick_ms: u64,

    /// Broadcast round deadline in milliseconds
    #[arg(long, default_value = "30000")]
    round_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    ensure!(
        args.peer_addrs.len() == args.replicas,
        "expected {} peer addresses, got {}",
        args.replicas,
        args.peer_addrs.len()
    );
    ensure!(
        args.replica_index < args.replicas,
        "replica index {} out of range for a cluster of {}",
        args.replica_index,
        args.replicas
    );

    tracing::info!("Starting geowitness replica {}", args.replica_index);
    tracing::info!("  Cluster: {} replicas, f = {}", args.replicas, args.faults);
    tracing::info!("  Listening on: {}", args.listen_addr);
    tracing::info!("  Key file: {:?}", args.key_file);

    // Load the shared key file, provisioning a fresh one on first start
    let keys = if args.key_file.exists() {
        load_cluster_keys(&args.key_file)?
    } else {
        if let Some(parent) = args.key_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let client_ids: Vec<PartyId> = (1..=args.provision_clients).collect();
        let keys = generate_cluster_keys(&client_ids, args.replicas);
        save_cluster_keys(&args.key_file, &keys)?;
        tracing::info!("Provisioned fresh cluster keys at {:?}", args.key_file);
        keys
    };
    let directory = directory_of(&keys);
    let local_id = replica_id(args.replica_index);
    let keypair = keys
        .get(&local_id)
        .cloned()
        .ok_or_else(|| anyhow!("key file has no entry for replica {}", args.replica_index))?;

    let config = ReplicaConfig {
        replicas: args.replicas,
        faults: args.faults,
        detection_range: args.detection_range,
        round_timeout_ms: args.round_timeout_ms,
        ..Default::default()
    };

    let mut peers = HashMap::new();
    for (index, addr) in args.peer_addrs.iter().enumerate() {
        peers.insert(replica_id(index), addr.clone());
    }
    let transport: Arc<dyn Transport> = Arc::new(net::WsTransport::new(peers));

    let clock = LogicalClock::new();
    let coordinator = Coordinator::new(
        args.replica_index,
        keypair,
        directory,
        config,
        clock.clone(),
        transport,
    );

    net::start(&args.listen_addr, coordinator).await?;

    // Advance the logical clock; ticks drive nonces and session-key expiry
    let tick_ms = args.tick_ms;
    let tick_clock = clock.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        loop {
            interval.tick().await;
            tick_clock.advance();
        }
    });

    tracing::info!("Replica running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    ticker.abort();
    tracing::info!("Replica {} stopped at tick {}", args.replica_index, clock.now());

    Ok(())
}
