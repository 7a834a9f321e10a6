#[macro_use]
extern crate log;

mod node_config;

use std::sync::Arc;

use anyhow::{anyhow, bail, Error};
use futures::{channel::mpsc, Future, StreamExt};
use itertools::Itertools;
use rand::thread_rng;
use tokio::runtime;
use shallot::core::mem_network::MemNetwork;
use shallot::core::node::Node;
use shallot::crypto::*;
#[cfg(unix)]
use syslog::Facility;

use crate::node_config::*;

/// Run a future with the runtime specified by config.
fn run<F>(future: F, threads: Threads) -> Result<(), Error>
    where F: Future<Output = Result<(), Error>>
{
    let runtime = if threads == Threads::N(1) {
        runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
    } else {
        let mut builder = runtime::Builder::new_multi_thread();
        match threads {
            Threads::N(n) => { builder.worker_threads(n as usize); },
            Threads::Auto => { }, // builder will detect number of cores automatically
        }
        builder
            .enable_all()
            .build()?
    };
    runtime.block_on(future)
}

/// Create nodes with fresh keys and add them to the network.
async fn create_nodes(network: &MemNetwork, config: &NodeConfig) -> Vec<Node> {
    let protocol_config = config.protocol_config();
    let mut nodes = Vec::with_capacity(config.nodes);
    for _ in 0 .. config.nodes {
        let keys = NodeKeys::generate(&mut thread_rng());
        let node = Node::new(keys, Arc::new(network.endpoint(&protocol_config)), protocol_config.clone());
        network.publish_identity(&node.public_identity()).await;
        network.join(node.dht_key(), Arc::new(node.clone())).await;
        debug!("Node {} identity: {}", node.dht_key(), hex::encode_upper(node.public_identity().to_bytes()));
        nodes.push(node);
    }
    nodes
}

/// Build a circuit from the first node to the last one and send all
/// configured messages through it.
async fn run_simulation(config: NodeConfig) -> Result<(), Error> {
    if config.nodes < 2 {
        bail!("At least 2 nodes are required, got {}", config.nodes);
    }

    let network = MemNetwork::new();
    let nodes = create_nodes(&network, &config).await;
    info!("Running {} nodes", nodes.len());

    let origin = &nodes[0];
    let destination = &nodes[nodes.len() - 1];
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded();
    destination.set_inbound_sink(inbound_tx).await;

    let mut session = origin.connect_to(&destination.dht_key()).await?;
    let (close_tx, mut close_rx) = mpsc::unbounded();
    session.set_close_sink(close_tx);
    info!("Circuit: {} -> {}", origin.dht_key(), session.route().iter().map(|identity| identity.dht_key()).format(" -> "));

    let mut inbound = inbound_rx.next().await
        .ok_or_else(|| anyhow!("Destination didn't get the circuit"))?;
    info!("Destination got circuit {} from {}", inbound.circuit_id(), inbound.entry());

    for message in &config.messages {
        if let Err(e) = session.send(message.as_bytes()).await {
            if let Ok(Some(destination)) = close_rx.try_next() {
                warn!("Session to {} is closed", destination);
            }
            return Err(e.into());
        }
        let data = inbound.next().await
            .ok_or_else(|| anyhow!("Inbound session is closed"))?;
        info!("Received: {}", String::from_utf8_lossy(&data));
    }

    Ok(())
}

fn main() -> Result<(), Error> {
    let config = node_config::cli_parse()?;

    match config.log_type {
        LogType::Stderr => {
            let env = env_logger::Env::default()
                .filter_or("RUST_LOG", "info");
            env_logger::Builder::from_env(env)
                .init();
        },
        LogType::Stdout => {
            let env = env_logger::Env::default()
                .filter_or("RUST_LOG", "info");
            env_logger::Builder::from_env(env)
                .target(env_logger::fmt::Target::Stdout)
                .init();
        },
        #[cfg(unix)]
        LogType::Syslog => {
            syslog::init(Facility::LOG_USER, log::LevelFilter::Info, None)
                .map_err(|e| anyhow!("Failed to initialize syslog backend: {}", e))?;
        },
        LogType::None => { },
    }

    for key in config.unused.keys() {
        warn!("Unused configuration key: {:?}", key);
    }

    let threads = config.threads;
    run(run_simulation(config), threads)
}
