//! Simulated peer churn against an in-memory network.
//!
//! Peers connect, finish identification, and disconnect at random, while the
//! maintainer keeps the routing table in sync and a refresh routine drains
//! refresh requests.
//!
//! Run: `cargo run --example membership -- --peers 50 --threshold 8`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use dht_membership::network::Connection;
use dht_membership::testnet::Testnet;
use dht_membership::{Maintainer, PeerId, SigningKey};
use rand::Rng;
use tracing::{info, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of simulated peers.
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u16).range(1..))]
    peers: u16,
    /// Minimum usable routing table size.
    #[arg(long, default_value_t = 4)]
    threshold: usize,
    /// Share of peers that speak the DHT protocol, between 0 and 1.
    #[arg(long, default_value_t = 0.7)]
    dht_ratio: f64,
    /// Milliseconds between churn steps.
    #[arg(long, default_value_t = 50)]
    interval: u64,
    /// Do not request refreshes when the table is small.
    #[arg(long)]
    no_auto_refresh: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_thread_names(true)
        .init();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .expect("Error setting Ctrl-C handler");
    }

    let testnet = Testnet::new();
    let maintainer = testnet.maintainer(
        Maintainer::builder()
            .min_refresh_threshold(cli.threshold)
            .auto_refresh(!cli.no_auto_refresh),
    );

    // A refresh routine would run a find_node query for the local id here.
    let requests = maintainer.refresh_requests();
    thread::spawn(move || {
        while requests.wait() {
            info!("Refreshing routing table");
        }
    });

    maintainer.start().expect("Failed to start maintainer");

    let mut rng = rand::thread_rng();
    let peers: Vec<(PeerId, bool)> = (0..usize::from(cli.peers))
        .map(|_| {
            let key = SigningKey::from_bytes(&rng.gen());
            let id = PeerId::from_public_key(&key.verifying_key());

            (id, rng.gen_bool(cli.dht_ratio.clamp(0.0, 1.0)))
        })
        .collect();

    let mut connections: Vec<Option<Connection>> = vec![None; peers.len()];

    while running.load(Ordering::SeqCst) {
        let index = rng.gen_range(0..peers.len());
        let (peer, speaks_dht) = peers[index];

        match connections[index].take() {
            Some(connection) => {
                testnet.network.close(&connection);
            }
            None => {
                let protocols: &[&str] = if speaks_dht {
                    &["/ipfs/kad/1.0.0", "/ipfs/id/1.0.0"]
                } else {
                    &["/ipfs/id/1.0.0"]
                };

                connections[index] = Some(testnet.connect_and_identify(peer, protocols));
            }
        }

        let connected = connections.iter().filter(|c| c.is_some()).count();
        info!(
            connected,
            routing_table = maintainer.routing_table_size(),
            "Churn step"
        );

        thread::sleep(Duration::from_millis(cli.interval));
    }

    let exit = maintainer.shutdown();
    info!(?exit, "Maintainer stopped");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_zero_peers() {
        assert!(Cli::try_parse_from(["membership", "--peers", "0"]).is_err());

        let cli = Cli::try_parse_from(["membership", "--peers", "1"]).unwrap();
        assert_eq!(cli.peers, 1);
    }
}
