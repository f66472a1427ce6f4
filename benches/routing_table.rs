//! Micro-benchmarks for RoutingTable operations used under the membership
//! lock: update, refresh of existing members and remove.
//! Reports nanoseconds-per-operation.
//!
//! Every admission and recovery pass holds the membership lock while doing
//! these, so they bound how long disconnect notifications can wait.
//!
//! Run: `cargo bench --bench routing_table`

use dht_membership::{PeerId, RoutingTable};
use std::time::Instant;

fn main() {
    println!("routing_table\n");

    bench_update();
    bench_refresh();
    bench_remove();
}

fn bench_update() {
    println!("update");

    // Pre-generate random peers outside the timed section
    let peers: Vec<_> = (0..1000).map(|_| PeerId::random()).collect();

    // Empty table
    {
        let mut table = RoutingTable::new(PeerId::random());
        let start = Instant::now();
        for peer in &peers {
            table.update(*peer);
        }
        let per_op = start.elapsed().as_nanos() / peers.len() as u128;
        println!(
            "empty table:     {per_op}ns/op (final size: {})",
            table.size()
        );
    }

    // Saturated table (400 peers)
    {
        let mut table = RoutingTable::new(PeerId::random());
        for _ in 0..400 {
            table.update(PeerId::random());
        }

        let start = Instant::now();
        for peer in &peers {
            table.update(*peer);
        }
        let per_op = start.elapsed().as_nanos() / peers.len() as u128;
        println!("full table:      {per_op}ns/op");
    }

    println!();
}

/// A recovery pass re-updates every connected peer, most of them already members.
fn bench_refresh() {
    println!("refresh");

    for size in [20, 100, 400] {
        let mut table = RoutingTable::new(PeerId::random()).with_bucket_size(size);
        let peers: Vec<_> = (0..size).map(|_| PeerId::random()).collect();
        for peer in &peers {
            table.update(*peer);
        }

        let start = Instant::now();
        for peer in &peers {
            table.update(*peer);
        }
        let per_op = start.elapsed().as_nanos() / peers.len() as u128;
        println!("{size:>3} members: {per_op}ns/op");
    }

    println!();
}

fn bench_remove() {
    println!("remove");

    let mut table = RoutingTable::new(PeerId::random());

    let mut peers = Vec::new();
    for _ in 0..200 {
        let peer = PeerId::random();
        peers.push(peer);
        table.update(peer);
    }

    let n = peers.len();
    let start = Instant::now();
    for peer in &peers {
        table.remove(peer);
    }
    let per_op = start.elapsed().as_nanos() / n as u128;
    println!("{per_op}ns/op ({n} removals)");
    println!();
}
