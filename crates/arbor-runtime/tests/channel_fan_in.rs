//! Fan-in over per-direction channels.
//!
//! Models one node's 26 inbound boundary channels with one producer task
//! per direction, repeated over several rounds. Every channel must see
//! exactly one set and one get per round, regardless of scheduling.

use std::sync::Arc;

use arbor_core::ProtocolError;
use arbor_runtime::{join_all, spawn, Channel, ChannelStats};

const DIRECTIONS: usize = 26;
const ROUNDS: u64 = 25;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_direction_delivered_once_per_round() {
    let inbox: Arc<Vec<Channel<(u64, usize)>>> =
        Arc::new((0..DIRECTIONS).map(|_| Channel::new()).collect());

    for round in 0..ROUNDS {
        let producers: Vec<_> = (0..DIRECTIONS)
            .map(|d| {
                let inbox = Arc::clone(&inbox);
                spawn(async move {
                    inbox[d].set((round, d)).map_err(|_| {
                        ProtocolError::InconsistentTopology {
                            reason: format!("double set on {d}"),
                        }
                    })
                })
                .unwrap()
            })
            .collect();

        // Consume in reverse order so producers and consumer interleave.
        for d in (0..DIRECTIONS).rev() {
            assert_eq!(inbox[d].get().await, (round, d));
        }
        join_all(producers).await.unwrap();
    }

    for ch in inbox.iter() {
        assert_eq!(
            ch.stats(),
            ChannelStats {
                sets: ROUNDS,
                gets: ROUNDS
            }
        );
        assert!(!ch.is_set());
    }
}

#[tokio::test]
async fn skipped_direction_is_never_touched() {
    let inbox: Vec<Channel<u8>> = (0..DIRECTIONS).map(|_| Channel::new()).collect();
    let skipped = 4;
    for (d, ch) in inbox.iter().enumerate() {
        if d != skipped {
            ch.set(d as u8).unwrap();
        }
    }
    for (d, ch) in inbox.iter().enumerate() {
        if d != skipped {
            assert_eq!(ch.get().await, d as u8);
        }
    }
    assert_eq!(inbox[skipped].stats(), ChannelStats::default());
}
