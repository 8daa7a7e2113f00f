//! The default simulation.
//!
//! A server and a crowd of standard nodes. Every node connects to the server,
//! introduces itself to a few random peers with the handshake dialogue and
//! then asks one of them for its node list. After that the network is ticked
//! for a number of rounds and a [`Report`] is produced.

use futures::future::join_all;
use netemu_core::{
    config::{ConfigError, NetworkConfig},
    connection::ConnectionError,
    dialogues::{HANDSHAKE, REQUEST_NODE_LIST},
    network::NetworkError,
    protocols::StandardProtocol,
    registry::RegistryError,
    shutdown::ExitStatus,
    Address, Network, Registry, Shutdown,
};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use std::{fmt::Display, sync::Arc, time::Duration};
use thiserror::Error as ThisError;

/// The header of the connection every node keeps to the server.
pub const SERVER_HEADER: &str = "server";

/// Everything that can be tuned about a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOptions {
    pub config: NetworkConfig,
    /// Number of standard nodes, not counting the server.
    pub nodes: usize,
    pub rounds: u32,
    pub tick: Duration,
    /// Number of random peers each node handshakes with.
    pub peers: usize,
    pub seed: Option<u64>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            config: NetworkConfig::default(),
            nodes: 10,
            rounds: 5,
            tick: Duration::from_millis(100),
            peers: 2,
            seed: None,
        }
    }
}

/// The outcome of a run, summed over every standard node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub status: ExitStatus,
    pub nodes: usize,
    pub dialogues_ok: usize,
    pub dialogues_failed: usize,
    pub known_peers: usize,
    /// Connection pairs still in the transport once the run is over.
    pub open_pairs: usize,
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} with {} nodes: {} dialogues succeeded, {} failed, {} peer records known, {} pairs left open",
            self.status,
            self.nodes,
            self.dialogues_ok,
            self.dialogues_failed,
            self.known_peers,
            self.open_pairs
        )
    }
}

#[derive(Debug, ThisError)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Runs the simulation until it finishes or Ctrl-C is pressed.
pub async fn run(options: SimulationOptions) -> Result<Report, SimulationError> {
    let shutdown = Shutdown::new();
    let interrupt = shutdown.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.shut_down_with_status(ExitStatus::Interrupted);
        }
    });
    let report = run_until(options, shutdown).await;
    ctrl_c.abort();
    report
}

/// Runs the simulation until it finishes or `shutdown` is triggered.
pub async fn run_until(
    options: SimulationOptions,
    mut shutdown: Shutdown,
) -> Result<Report, SimulationError> {
    let registry = Arc::new(Registry::standard()?);
    let (network, mut rng) = match options.seed {
        Some(seed) => (
            Network::seeded(registry, options.config, seed)?,
            SmallRng::seed_from_u64(seed.wrapping_add(2)),
        ),
        None => (
            Network::new(registry, options.config)?,
            SmallRng::from_entropy(),
        ),
    };

    network.add_server()?;
    let nodes: Vec<Arc<StandardProtocol>> = network
        .populate(options.nodes)?
        .iter()
        .filter_map(|node| node.protocol_as::<StandardProtocol>())
        .collect();
    let addresses: Vec<Address> = nodes.iter().map(|node| node.address()).collect();
    let plan: Vec<(Arc<StandardProtocol>, Vec<Address>)> = nodes
        .iter()
        .map(|node| {
            let others: Vec<Address> = addresses
                .iter()
                .copied()
                .filter(|address| *address != node.address())
                .collect();
            let peers = others
                .choose_multiple(&mut rng, options.peers)
                .copied()
                .collect();
            (node.clone(), peers)
        })
        .collect();

    let exchange = async {
        for (node, _) in plan.iter() {
            node.attach(network.connect_to_server(node.address(), SERVER_HEADER)?)?;
        }

        let mut handshakes = Vec::new();
        for (node, peers) in plan.iter() {
            for peer in peers {
                let endpoint = network.connect(node.address(), *peer, HANDSHAKE)?;
                handshakes.push(node.initiate(endpoint));
            }
        }
        let failed = join_all(handshakes)
            .await
            .iter()
            .filter(|outcome| outcome.is_err())
            .count();
        tracing::info!(failed, "Handshakes finished");

        let mut requests = Vec::new();
        for (node, peers) in plan.iter() {
            if let Some(peer) = peers.first() {
                let endpoint = network.connect(node.address(), *peer, REQUEST_NODE_LIST)?;
                requests.push(node.initiate(endpoint));
            }
        }
        join_all(requests).await;
        tracing::info!("Node lists exchanged");

        let mut ticks = tokio::time::interval(options.tick);
        for round in 0..options.rounds {
            ticks.tick().await;
            tracing::debug!(round, "Tick");
            network.update();
        }
        Ok::<(), SimulationError>(())
    };

    let status = tokio::select! {
        outcome = exchange => {
            outcome?;
            ExitStatus::Exited
        }
        status = shutdown.wait_for_shutdown() => status,
    };

    // Give responders time to read the last packets of finished walks. Walks
    // still waiting after that, or cut short by an interrupt, are failed by
    // closing their connections.
    if status == ExitStatus::Exited {
        let grace = options.config.delay * 10 + Duration::from_secs(1);
        if tokio::time::timeout(grace, settle(&nodes)).await.is_err() {
            tracing::warn!("Responders still running after {:?}", grace);
        }
    }
    close_all(&nodes);
    settle(&nodes).await;
    // Lets the server release its side of every pair.
    network.update();
    network.drain().await;

    let report = Report {
        status,
        nodes: nodes.len(),
        dialogues_ok: nodes.iter().map(|node| node.dialogues_ok()).sum(),
        dialogues_failed: nodes.iter().map(|node| node.dialogues_failed()).sum(),
        known_peers: nodes.iter().map(|node| node.known_peers().len()).sum(),
        open_pairs: network.transport().pair_count(),
    };
    tracing::info!(%report, "Simulation finished");
    Ok(report)
}

async fn settle(nodes: &[Arc<StandardProtocol>]) {
    for node in nodes {
        node.settle().await;
    }
}

fn close_all(nodes: &[Arc<StandardProtocol>]) {
    for endpoint in nodes.iter().flat_map(|node| node.connections()) {
        endpoint.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn reports_are_logged() {
        let options = SimulationOptions {
            nodes: 3,
            peers: 1,
            rounds: 1,
            seed: Some(5),
            ..Default::default()
        };
        let report = run_until(options, Shutdown::new()).await.unwrap();
        assert_eq!(report.dialogues_ok, 2 * 3 * 2);
        assert!(logs_contain("Handshakes finished"));
        assert!(logs_contain("Simulation finished"));
    }
}
