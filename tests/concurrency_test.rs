// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of LindaSpace.
//
// LindaSpace is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// LindaSpace is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with LindaSpace. If not, see <https://www.gnu.org/licenses/>.

//! Concurrency tests: many producers and consumers sharing one Space.

use lindaspace::TemplateField::Wildcard;
use lindaspace::{template, tuple, Space, Timeout, Value};
use std::collections::HashSet;
use std::time::Duration;

const WORKERS: i64 = 4;
const TUPLES_PER_WORKER: i64 = 25;

/// Task farm: producers and consumers on disjoint tuple sets run to
/// completion, every consumer receives exactly its intended tuples, and the
/// Space ends up empty.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_producers_many_consumers() {
    let space = Space::new("farm");

    let mut producers = Vec::new();
    for worker in 0..WORKERS {
        let space = space.clone();
        producers.push(tokio::spawn(async move {
            for seq in 0..TUPLES_PER_WORKER {
                space
                    .put(tuple! {"worker" => worker, "seq" => seq}, None, None)
                    .await
                    .expect("put failed");
                // Let consumers interleave
                if seq % 5 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    let mut consumers = Vec::new();
    for worker in 0..WORKERS {
        let space = space.clone();
        consumers.push(tokio::spawn(async move {
            let mut seen = HashSet::new();
            for _ in 0..TUPLES_PER_WORKER {
                let fields = space
                    .take(
                        template! {"worker" => worker, "seq" => Wildcard},
                        Timeout::Forever,
                        None,
                    )
                    .await
                    .expect("take failed")
                    .expect("forever take cannot miss");
                assert_eq!(fields.get("worker"), Some(&Value::from(worker)));
                let Some(Value::Integer(seq)) = fields.get("seq") else {
                    panic!("seq missing");
                };
                assert!(seen.insert(*seq), "duplicate delivery of seq {seq}");
            }
            seen
        }));
    }

    for producer in producers {
        producer.await.expect("producer panicked");
    }
    for consumer in consumers {
        let seen = tokio::time::timeout(Duration::from_secs(30), consumer)
            .await
            .expect("consumer starved")
            .expect("consumer panicked");
        assert_eq!(seen.len(), TUPLES_PER_WORKER as usize);
    }

    let snapshot = space.snapshot().await;
    assert_eq!(snapshot.primary.tuple_count(), 0);
    assert_eq!(snapshot.primary.template_count(), 0);
}

/// A single tuple satisfies exactly one of two competing takers.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_tuple_single_taker() {
    let space = Space::new("compete");

    let takers: Vec<_> = (0..2)
        .map(|_| {
            let space = space.clone();
            tokio::spawn(async move {
                space
                    .take(template! {"prize" => Wildcard}, Timeout::Millis(1000), None)
                    .await
                    .unwrap()
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    space.put(tuple! {"prize" => 1}, None, None).await.unwrap();

    let mut winners = 0;
    for taker in takers {
        if taker.await.expect("taker panicked").is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(space.snapshot().await.primary.tuple_count(), 0);
}

/// One put satisfies every non-destructive reader waiting on the shape.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_put_satisfies_all_readers() {
    let space = Space::new("readers");

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let space = space.clone();
            tokio::spawn(async move {
                space
                    .get(template! {"news" => Wildcard}, Timeout::Millis(5000), None)
                    .await
                    .unwrap()
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    space.put(tuple! {"news" => "flash"}, None, None).await.unwrap();

    for reader in readers {
        let result = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("reader starved")
            .expect("reader panicked");
        assert!(result.is_some());
    }

    // Non-destructive reads leave the tuple behind
    assert_eq!(space.snapshot().await.primary.tuple_count(), 1);
}

/// Producer threads never block on tuple availability: a burst of puts with
/// no consumer completes promptly.
#[tokio::test]
async fn test_put_never_blocks() {
    let space = Space::new("burst");
    let started = std::time::Instant::now();
    for i in 0..200 {
        space.put(tuple! {"n" => i}, None, None).await.unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(space.snapshot().await.primary.tuple_count(), 200);
}
