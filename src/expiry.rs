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

//! TTL expiry scheduler.
//!
//! One background task per Space. Armed deadlines arrive over a channel and
//! sit in a min-heap; at or after each deadline the task asks the Space to
//! remove the tuple from whatever store still holds it, tolerating absence
//! (the tuple may already have been taken, committed elsewhere, or the Space
//! closed). The task holds only a weak reference to its Space and is aborted
//! on close, so it never keeps a Space alive or a process running.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;
use ulid::Ulid;

use crate::space::Space;
use crate::tuple::Tuple;

/// Far-enough-away placeholder used while the heap is empty.
const IDLE_PARK: Duration = Duration::from_secs(3600);

struct ExpiryEntry {
    deadline: Instant,
    tuple: Arc<Tuple>,
    txn: Option<Ulid>,
}

/// Heap entry; ordered by deadline then arrival so ties pop in arming order.
struct Pending {
    deadline: Instant,
    seq: u64,
    tuple: Arc<Tuple>,
    txn: Option<Ulid>,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Per-Space deadline timer.
pub(crate) struct ExpiryScheduler {
    sender: mpsc::UnboundedSender<ExpiryEntry>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ExpiryScheduler {
    /// Spawn the scheduler task. Must be called within a tokio runtime.
    pub(crate) fn spawn(space: Weak<Space>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(space, receiver));
        ExpiryScheduler {
            sender,
            task: Mutex::new(Some(task)),
        }
    }

    /// Arm a one-shot removal at `deadline` for a tuple, remembering the
    /// transaction it was staged under, if any.
    pub(crate) fn schedule(&self, deadline: Instant, tuple: Arc<Tuple>, txn: Option<Ulid>) {
        // Send fails only after stop(); pending removals are moot then.
        let _ = self.sender.send(ExpiryEntry {
            deadline,
            tuple,
            txn,
        });
    }

    /// Stop the background task. Idempotent.
    pub(crate) fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

async fn run(space: Weak<Space>, mut receiver: mpsc::UnboundedReceiver<ExpiryEntry>) {
    let mut heap: BinaryHeap<Reverse<Pending>> = BinaryHeap::new();
    let mut seq = 0u64;
    loop {
        let next_deadline = heap.peek().map(|Reverse(pending)| pending.deadline);
        tokio::select! {
            entry = receiver.recv() => {
                match entry {
                    Some(entry) => {
                        seq += 1;
                        heap.push(Reverse(Pending {
                            deadline: entry.deadline,
                            seq,
                            tuple: entry.tuple,
                            txn: entry.txn,
                        }));
                    }
                    // Space dropped without close; nothing left to expire.
                    None => return,
                }
            }
            _ = sleep_until(next_deadline.unwrap_or_else(|| Instant::now() + IDLE_PARK)),
                if next_deadline.is_some() =>
            {
                let now = Instant::now();
                while heap
                    .peek()
                    .is_some_and(|Reverse(pending)| pending.deadline <= now)
                {
                    let Some(Reverse(pending)) = heap.pop() else {
                        break;
                    };
                    let Some(space) = space.upgrade() else {
                        return;
                    };
                    debug!(space = %space.name(), "tuple lifetime elapsed");
                    space.expire(pending.tuple, pending.txn).await;
                }
            }
        }
    }
}
