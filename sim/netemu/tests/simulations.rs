use netemu::simulation::{run_until, SimulationOptions};
use netemu_core::{shutdown::ExitStatus, NetworkConfig, Shutdown};
use std::time::Duration;

fn options(seed: u64) -> SimulationOptions {
    SimulationOptions {
        seed: Some(seed),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn default_simulation() -> anyhow::Result<()> {
    let report = run_until(options(0xBAD5EED), Shutdown::new()).await?;
    assert_eq!(report.status, ExitStatus::Exited);
    assert_eq!(report.nodes, 10);
    // Two handshakes and one node list request per node, each walked by both
    // sides.
    assert_eq!(report.dialogues_ok, 2 * 10 * 3);
    assert_eq!(report.dialogues_failed, 0);
    // Everyone learns at least about the peer whose node list they asked for.
    assert!(report.known_peers >= 10);
    // Server connections included, every pair is torn down at the end.
    assert_eq!(report.open_pairs, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn seeded_runs_are_reproducible() {
    let first = run_until(options(42), Shutdown::new()).await.unwrap();
    let second = run_until(options(42), Shutdown::new()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
#[ntest::timeout(2000)]
async fn instant_network_with_many_peers() {
    let options = SimulationOptions {
        config: NetworkConfig::instant(),
        nodes: 30,
        peers: 29,
        rounds: 2,
        tick: Duration::from_millis(1),
        seed: Some(1),
    };
    let report = run_until(options, Shutdown::new()).await.unwrap();
    assert_eq!(report.dialogues_failed, 0);
    // With every node handshaking with every other one, everyone knows
    // everyone.
    assert_eq!(report.known_peers, 30 * 29);
}

#[tokio::test(start_paused = true)]
async fn interrupted_simulation_still_reports() {
    let shutdown = Shutdown::new();
    shutdown.shut_down_with_status(ExitStatus::Interrupted);
    let report = run_until(options(7), shutdown).await.unwrap();
    assert_eq!(report.status, ExitStatus::Interrupted);
    assert_eq!(report.nodes, 10);
    assert_eq!(report.open_pairs, 0);
}

#[tokio::test(start_paused = true)]
async fn lone_node_has_nobody_to_talk_to() {
    let options = SimulationOptions {
        nodes: 1,
        ..options(3)
    };
    let report = run_until(options, Shutdown::new()).await.unwrap();
    assert_eq!(report.dialogues_ok, 0);
    assert_eq!(report.known_peers, 0);
}
