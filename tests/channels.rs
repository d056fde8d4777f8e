use std::{future::Future, time::Duration};

use anyhow::Result;
use cspchan::{Capacity, CancelToken, Channel, ChannelError};
use futures::StreamExt;
use itertools::Itertools;
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::task::{self, LocalSet};

fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

async fn run_local<F: Future>(f: F) -> F::Output {
    LocalSet::new().run_until(f).await
}

async fn random_pause(rng: &mut StdRng) {
    for _ in 0..rng.gen_range(0..4) {
        task::yield_now().await;
    }
}

fn spawn_producer(
    ch: &Channel<u32>,
    values: impl IntoIterator<Item = u32> + 'static,
) -> task::JoinHandle<()> {
    let ch = ch.clone();
    task::spawn_local(async move {
        for v in values {
            ch.send(v).await.unwrap();
        }
        ch.close();
    })
}

#[tokio::test(flavor = "current_thread")]
async fn test_bounded_keeps_order_and_limit() {
    init_logger();

    run_local(async {
        let ch = Channel::new(5usize);
        let producer = spawn_producer(&ch, 0..100);

        let got: Vec<u32> = ch.iter().collect().await;
        producer.await.unwrap();

        assert_eq!(got, (0..100).collect_vec());
        assert!(ch.stat().data.peak_length <= 5);
        assert!(ch.stat().data.peak_length > 0);
    })
    .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_rendezvous_never_buffers() {
    init_logger();

    run_local(async {
        let ch = Channel::rendezvous();
        let producer = spawn_producer(&ch, 0..10);

        let got: Vec<u32> = ch.iter().collect().await;
        producer.await.unwrap();

        assert_eq!(got, (0..10).collect_vec());
        assert_eq!(ch.stat().data.peak_length, 0);
    })
    .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_order_independent_of_pacing() {
    init_logger();

    let capacities = [
        Capacity::Rendezvous,
        Capacity::from(1usize),
        Capacity::from(5usize),
        Capacity::Unbounded,
    ];

    for capacity in capacities {
        for seed in 0..5u64 {
            let got = run_local(async move {
                let ch = Channel::new(capacity);

                let producer = {
                    let ch = ch.clone();
                    task::spawn_local(async move {
                        let mut rng = StdRng::seed_from_u64(seed);
                        for v in 0..50u32 {
                            random_pause(&mut rng).await;
                            ch.send(v).await.unwrap();
                        }
                        ch.close();
                    })
                };

                let mut rng = StdRng::seed_from_u64(seed + 100);
                let mut got = vec![];
                while let Some(v) = ch.recv().await.unwrap() {
                    got.push(v);
                    random_pause(&mut rng).await;
                }
                producer.await.unwrap();

                if let Some(limit) = capacity.limit() {
                    assert!(ch.stat().data.peak_length <= limit);
                }
                got
            })
            .await;

            assert_eq!(got, (0..50).collect_vec(), "capacity {capacity}, seed {seed}");
        }
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_multiple_readers_share_values() {
    init_logger();

    run_local(async {
        let ch = Channel::new(3usize);
        let producer = spawn_producer(&ch, 0..300);

        let readers = (0..4)
            .map(|_| {
                let ch = ch.clone();
                task::spawn_local(async move { ch.iter().collect::<Vec<u32>>().await })
            })
            .collect_vec();

        let mut parts = vec![];
        for r in readers {
            parts.push(r.await.unwrap());
        }
        producer.await.unwrap();

        // Each reader sees its own share in order.
        for part in &parts {
            assert!(part.windows(2).all(|w| w[0] < w[1]));
        }

        let all = parts.into_iter().flatten().sorted().collect_vec();
        assert_eq!(all, (0..300).collect_vec());
    })
    .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_multiple_writers_single_reader() {
    init_logger();

    run_local(async {
        let ch = Channel::new(4usize);

        let writers = (0..10u32)
            .map(|w| {
                let ch = ch.clone();
                task::spawn_local(async move {
                    for i in 0..100 {
                        ch.send(w * 1000 + i).await.unwrap();
                    }
                })
            })
            .collect_vec();

        let closer = {
            let ch = ch.clone();
            task::spawn_local(async move {
                for w in writers {
                    w.await.unwrap();
                }
                ch.close();
            })
        };

        let got: Vec<u32> = ch.iter().collect().await;
        closer.await.unwrap();

        assert_eq!(got.len(), 1000);

        // Values of each writer arrive in the order it sent them.
        let by_writer = got.iter().into_group_map_by(|v| *v / 1000);
        assert_eq!(by_writer.len(), 10);
        for values in by_writer.values() {
            assert_eq!(values.len(), 100);
            assert!(values.windows(2).all(|w| w[0] < w[1]));
        }

        assert!(ch.stat().writers.peak_length <= 10);
    })
    .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_send_on_closed_always_fails() {
    init_logger();

    for capacity in [0usize, 1, 10] {
        let ch = Channel::new(capacity);
        ch.close();

        for v in 0..3 {
            assert_eq!(ch.send(v).await, Err(ChannelError::Closed));
        }
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_recv_on_closed_and_drained() -> Result<()> {
    init_logger();

    let ch = Channel::new(2usize);
    ch.send("last").await?;
    ch.close();

    assert_eq!(ch.recv().await?, Some("last"));
    for _ in 0..5 {
        assert_eq!(ch.recv().await?, None);
    }
    assert!(ch.can_recv_immediately());

    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn test_recv_cancelled_by_timer() {
    init_logger();

    run_local(async {
        let ch = Channel::<u32>::rendezvous();
        let token = CancelToken::new();

        let _timer = {
            let token = token.clone();
            task::spawn_local(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                token.cancel();
            })
        };

        assert_eq!(ch.recv_with(Some(&token)).await, Err(ChannelError::Aborted));
        assert!(token.is_cancelled());
        assert_eq!(ch.num_blocked_receivers(), 0);

        // The channel itself is unaffected.
        assert!(!ch.is_closed());
    })
    .await;
}
