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

//! The Space coordination engine.
//!
//! ## Purpose
//! A Space is the synchronisation point between concurrent producers and
//! consumers. Producers `put` immutable tuples; consumers retrieve them by
//! value-pattern matching with `take` (destructive) or `get`
//! (non-destructive), blocking with a bounded or indefinite timeout until a
//! match appears. Tuples may carry a TTL after which they expire. A
//! two-phase transactional overlay stages `put`s and `take`s per
//! transaction until commit or rollback.
//!
//! ## Transactional visibility
//! - A tuple `put` under transaction T sits in T's *rollback store*:
//!   visible inside T immediately, invisible outside until commit.
//! - A tuple `take`n from the primary store under T moves into T's
//!   *working store*: invisible inside T, still readable (non-destructively)
//!   by everyone else, restored by rollback.
//! - Commit re-publishes the rollback store through the normal `put` path
//!   (waking matching waiters) and discards the working store; rollback is
//!   the mirror image.
//!
//! ## Blocking
//! Each registered template owns its wakeup condition, so a producer wakes
//! exactly the waiters its tuple can satisfy: every matching reader up to
//! and including the first matching taker, in registration order. Waiters
//! re-verify the store, the shutdown flag, and their remaining budget after
//! every wakeup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};
use ulid::Ulid;

use crate::config::SpaceConfig;
use crate::error::SpaceResult;
use crate::expiry::ExpiryScheduler;
use crate::storage::memory::MemoryStore;
use crate::storage::{StoreSnapshot, TupleStore};
use crate::transaction::Transaction;
use crate::tuple::{Fields, Template, TemplateFields, Tuple};

/// How long a retrieval may wait for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return after at most one match attempt
    NoWait,
    /// Wait up to the given number of milliseconds
    Millis(u64),
    /// Wait indefinitely
    Forever,
}

impl Timeout {
    /// A zero budget is the same thing as not waiting.
    fn normalized(self) -> Timeout {
        match self {
            Timeout::Millis(0) => Timeout::NoWait,
            other => other,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::Millis(duration.as_millis() as u64).normalized()
    }
}

/// How long a tuple lives in the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Expire the tuple after the given number of milliseconds
    Millis(u64),
    /// Keep the tuple until taken or the space closes
    Forever,
}

impl From<Duration> for Lifetime {
    fn from(duration: Duration) -> Self {
        Lifetime::Millis(duration.as_millis() as u64)
    }
}

/// Per-transaction overlay stores.
#[derive(Clone)]
struct TxnOverlay {
    /// Staged `put`s, invisible outside the transaction until commit
    rollback: Arc<dyn TupleStore>,
    /// Tuples `take`n from the primary store, restored on rollback
    working: Arc<dyn TupleStore>,
}

impl TxnOverlay {
    fn new() -> Self {
        TxnOverlay {
            rollback: Arc::new(MemoryStore::default()),
            working: Arc::new(MemoryStore::default()),
        }
    }
}

/// Point-in-time view of a Space.
#[derive(Debug, Clone)]
pub struct SpaceSnapshot {
    /// Space name
    pub name: String,
    /// Bucket counts of the primary store
    pub primary: StoreSnapshot,
    /// Number of transactions with live overlays
    pub open_transactions: usize,
}

/// Unregisters a waiter's template on every exit path, including future
/// cancellation. An abandoning taker may have absorbed the one signal a
/// tuple's arrival produced, so it hands the wakeup on to its bucket
/// siblings; they re-verify and go back to sleep if nothing is there.
struct TemplateGuard {
    station: Arc<dyn TupleStore>,
    template: Arc<Template>,
    matched: bool,
}

impl Drop for TemplateGuard {
    fn drop(&mut self) {
        self.station.remove_template(&self.template);
        if !self.matched && self.template.destructive() {
            for sibling in self.station.shape_templates(self.template.shape()) {
                sibling.signal();
            }
        }
    }
}

/// An in-process associative tuplespace.
///
/// Created through [`Space::new`] (or the
/// [`SpaceRegistry`](crate::registry::SpaceRegistry)); all operations take
/// `&self` and are safe to call concurrently.
pub struct Space {
    name: String,
    config: SpaceConfig,
    primary: Arc<dyn TupleStore>,
    overlays: RwLock<HashMap<Ulid, TxnOverlay>>,
    shutting_down: AtomicBool,
    expiry: ExpiryScheduler,
    self_weak: Weak<Space>,
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Space {
    /// Create a new Space with default configuration.
    ///
    /// Must be called within a tokio runtime (the Space spawns its expiry
    /// task at construction).
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_config(name, SpaceConfig::default())
    }

    /// Create a new Space with explicit configuration.
    pub fn with_config(name: impl Into<String>, config: SpaceConfig) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak: &Weak<Space>| Space {
            primary: Arc::new(MemoryStore::new(config.initial_capacity)),
            overlays: RwLock::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
            expiry: ExpiryScheduler::spawn(weak.clone()),
            self_weak: weak.clone(),
            name,
            config,
        })
    }

    /// Name of this Space.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once [`close`](Space::close) has run.
    pub fn is_closed(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Publish a tuple.
    ///
    /// Inserts into the primary store (or the transaction's rollback store),
    /// arms TTL expiry for a finite lifetime, and wakes matching waiters.
    /// Never blocks on tuple availability. A `put` on a closed Space is
    /// silently ignored.
    ///
    /// ## Arguments
    /// * `fields` - field map of the tuple; must be non-empty
    /// * `ttl` - tuple lifetime; `None` uses the configured default
    /// * `txn` - optional transaction to stage the tuple under
    ///
    /// ## Errors
    /// `InvalidTuple` on an empty map or empty field name;
    /// `TransactionFinished` when `txn` has already completed.
    pub async fn put(
        &self,
        fields: Fields,
        ttl: Option<Lifetime>,
        txn: Option<&Transaction>,
    ) -> SpaceResult<()> {
        let tuple = Arc::new(Tuple::new(fields)?);
        if self.is_closed() {
            debug!(space = %self.name, "put ignored, space is closed");
            return Ok(());
        }
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        match txn {
            None => {
                self.primary.store_tuple(tuple.clone());
                self.arm_expiry(&tuple, ttl, None);
                self.signal_arrival(&tuple).await;
            }
            Some(txn) => {
                // Staged atomically with the overlay's existence: the open
                // check under the overlays lock orders this insert before
                // any commit or rollback of the same transaction.
                let waiting = {
                    let mut overlays = self.overlays.write().await;
                    txn.ensure_open()?;
                    txn.enroll(&self.self_weak);
                    let overlay = overlays.entry(txn.id()).or_insert_with(TxnOverlay::new);
                    overlay.rollback.store_tuple(tuple.clone());
                    // Staged tuples are visible inside the transaction only,
                    // so only its own waiters are candidates.
                    overlay.rollback.waiting_templates(&tuple)
                };
                self.arm_expiry(&tuple, ttl, Some(txn.id()));
                for template in waiting {
                    template.signal();
                }
            }
        }
        Ok(())
    }

    /// Retrieve and remove a matching tuple.
    ///
    /// Blocks up to `timeout` until a match appears. Returns `Ok(None)` on
    /// timeout or when the Space closes while waiting.
    ///
    /// ## Errors
    /// `InvalidTemplate` on an empty map or empty field name;
    /// `TransactionFinished` when `txn` has already completed.
    pub async fn take(
        &self,
        fields: TemplateFields,
        timeout: Timeout,
        txn: Option<&Transaction>,
    ) -> SpaceResult<Option<Fields>> {
        self.retrieve(fields, timeout, txn, true).await
    }

    /// Retrieve a matching tuple without removing it.
    ///
    /// As [`take`](Space::take), but the tuple stays in the space. The
    /// search is broader: after its own view a reader also sees tuples held
    /// in other transactions' working stores (an in-flight `take` elsewhere
    /// does not hide a tuple from readers).
    pub async fn get(
        &self,
        fields: TemplateFields,
        timeout: Timeout,
        txn: Option<&Transaction>,
    ) -> SpaceResult<Option<Fields>> {
        self.retrieve(fields, timeout, txn, false).await
    }

    /// Apply this Space's share of a transaction commit: staged `put`s are
    /// re-published through the normal arrival path, consumed `take`s are
    /// gone for good, and the overlay is discarded. Absent enrolment makes
    /// this a no-op.
    pub async fn commit(&self, txn: &Transaction) {
        let overlay = { self.overlays.write().await.remove(&txn.id()) };
        let Some(overlay) = overlay else {
            return;
        };
        debug!(space = %self.name, txn = %txn.id(), "applying commit");
        if !self.is_closed() {
            for tuple in overlay.rollback.all_tuples() {
                self.primary.store_tuple(tuple.clone());
                self.signal_arrival(&tuple).await;
            }
            for tuple in overlay.working.all_tuples() {
                // Already removed at take time; tolerate the absence.
                self.primary.remove_tuple(&tuple);
            }
        }
        // Waiters still parked on this transaction observe the finish flag.
        for template in overlay.rollback.all_templates() {
            template.signal();
        }
        overlay.rollback.delete_storage();
        overlay.working.delete_storage();
    }

    /// Apply this Space's share of a transaction rollback: staged `put`s
    /// vanish, consumed `take`s are restored through the normal arrival
    /// path, and the overlay is discarded.
    pub async fn rollback(&self, txn: &Transaction) {
        let overlay = { self.overlays.write().await.remove(&txn.id()) };
        let Some(overlay) = overlay else {
            return;
        };
        debug!(space = %self.name, txn = %txn.id(), "applying rollback");
        if !self.is_closed() {
            for tuple in overlay.working.all_tuples() {
                self.primary.store_tuple(tuple.clone());
                self.signal_arrival(&tuple).await;
            }
        }
        for template in overlay.rollback.all_templates() {
            template.signal();
        }
        overlay.rollback.delete_storage();
        overlay.working.delete_storage();
    }

    /// Shut the Space down.
    ///
    /// Every blocked waiter is woken once and returns `None`; all storage is
    /// cleared; the expiry task stops. Idempotent, and every subsequent
    /// operation is a no-op.
    pub async fn close(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(space = %self.name, "closing space");
        for template in self.primary.all_templates() {
            template.signal();
        }
        let overlays: Vec<TxnOverlay> = {
            self.overlays.write().await.drain().map(|(_, o)| o).collect()
        };
        for overlay in &overlays {
            for template in overlay.rollback.all_templates() {
                template.signal();
            }
            overlay.rollback.delete_storage();
            overlay.working.delete_storage();
        }
        self.primary.delete_storage();
        self.expiry.stop();
    }

    /// Consistent observability snapshot: primary bucket counts per shape
    /// hash plus the number of live transaction overlays.
    pub async fn snapshot(&self) -> SpaceSnapshot {
        SpaceSnapshot {
            name: self.name.clone(),
            primary: self.primary.snapshot(),
            open_transactions: self.overlays.read().await.len(),
        }
    }

    /// Remove an expired tuple from whatever store still holds it.
    pub(crate) async fn expire(&self, tuple: Arc<Tuple>, txn: Option<Ulid>) {
        if self.is_closed() {
            return;
        }
        if let Some(id) = txn {
            let overlays = self.overlays.read().await;
            if let Some(overlay) = overlays.get(&id) {
                if overlay.rollback.remove_tuple(&tuple) {
                    debug!(space = %self.name, txn = %id, "expired staged tuple");
                    return;
                }
            }
        }
        if self.primary.remove_tuple(&tuple) {
            debug!(space = %self.name, "expired tuple");
            return;
        }
        // The tuple may have moved: committed into the primary store (handled
        // above) or taken into a working store.
        let overlays = self.overlays.read().await;
        for overlay in overlays.values() {
            if overlay.rollback.remove_tuple(&tuple) || overlay.working.remove_tuple(&tuple) {
                debug!(space = %self.name, "expired tuple from overlay");
                return;
            }
        }
    }

    fn arm_expiry(&self, tuple: &Arc<Tuple>, ttl: Lifetime, txn: Option<Ulid>) {
        if let Lifetime::Millis(ms) = ttl {
            let deadline = Instant::now() + Duration::from_millis(ms);
            self.expiry.schedule(deadline, tuple.clone(), txn);
        }
    }

    /// Wake the waiters a freshly visible primary tuple can satisfy: the
    /// primary store's matching templates, and matching templates parked
    /// under any live transaction (their view includes the primary store,
    /// and nothing else would ever wake them when a commit elsewhere
    /// publishes the tuple they wait for).
    async fn signal_arrival(&self, tuple: &Tuple) {
        for template in self.primary.waiting_templates(tuple) {
            template.signal();
        }
        let overlays = self.overlays.read().await;
        for overlay in overlays.values() {
            for template in overlay.rollback.waiting_templates(tuple) {
                template.signal();
            }
        }
    }

    /// Overlay stores for a transaction, created and enrolled on first use.
    /// The open check runs under the overlays lock, so a passing call is
    /// ordered before any commit or rollback of the same transaction.
    async fn ensure_overlay(&self, txn: &Transaction) -> SpaceResult<TxnOverlay> {
        let mut overlays = self.overlays.write().await;
        txn.ensure_open()?;
        txn.enroll(&self.self_weak);
        Ok(overlays.entry(txn.id()).or_insert_with(TxnOverlay::new).clone())
    }

    async fn txn_overlay(&self, txn: &Transaction) -> Option<TxnOverlay> {
        self.overlays.read().await.get(&txn.id()).cloned()
    }

    async fn retrieve(
        &self,
        fields: TemplateFields,
        timeout: Timeout,
        txn: Option<&Transaction>,
        destructive: bool,
    ) -> SpaceResult<Option<Fields>> {
        let template = Arc::new(Template::new(fields, destructive)?);
        if self.is_closed() {
            return Ok(None);
        }

        let timeout = timeout.normalized();
        if timeout == Timeout::NoWait {
            // Single match attempt, no registration.
            if let Some(txn) = txn {
                self.ensure_overlay(txn).await?;
            }
            let found = self.try_match(&template, txn).await;
            return Ok(found.map(|tuple| tuple.fields().clone()));
        }

        // Registration is atomic with the overlay's existence; a commit or
        // rollback racing past it will still signal this template.
        let station: Arc<dyn TupleStore> = match txn {
            None => {
                self.primary.store_template(template.clone());
                self.primary.clone()
            }
            Some(txn) => {
                let mut overlays = self.overlays.write().await;
                txn.ensure_open()?;
                txn.enroll(&self.self_weak);
                let overlay = overlays.entry(txn.id()).or_insert_with(TxnOverlay::new);
                overlay.rollback.store_template(template.clone());
                overlay.rollback.clone()
            }
        };
        let mut guard = TemplateGuard {
            station,
            template: template.clone(),
            matched: false,
        };

        let started = Instant::now();
        loop {
            if self.is_closed() {
                return Ok(None);
            }
            if let Some(txn) = txn {
                if txn.is_finished() || self.txn_overlay(txn).await.is_none() {
                    return Ok(None);
                }
            }
            if let Some(tuple) = self.try_match(&template, txn).await {
                guard.matched = true;
                return Ok(Some(tuple.fields().clone()));
            }
            match timeout {
                Timeout::NoWait => return Ok(None),
                Timeout::Forever => template.wait().await,
                Timeout::Millis(ms) => {
                    let budget = Duration::from_millis(ms);
                    let elapsed = started.elapsed();
                    if elapsed >= budget {
                        return Ok(None);
                    }
                    // Spurious and shutdown wakeups fall through to the
                    // re-checks at the top of the loop.
                    let _ = tokio::time::timeout(budget - elapsed, template.wait()).await;
                }
            }
        }
    }

    /// One match attempt under the caller's visibility rules.
    async fn try_match(&self, template: &Template, txn: Option<&Transaction>) -> Option<Arc<Tuple>> {
        let destroy = template.destructive();
        match txn {
            None if destroy => self.primary.get_match(template, true),
            None => {
                if let Some(tuple) = self.primary.get_match(template, false) {
                    return Some(tuple);
                }
                // Tuples mid-take inside a transaction stay readable.
                let overlays = self.overlays.read().await;
                for overlay in overlays.values() {
                    if let Some(tuple) = overlay.working.get_match(template, false) {
                        return Some(tuple);
                    }
                }
                None
            }
            Some(txn) if destroy => {
                let overlay = self.txn_overlay(txn).await?;
                // A tuple staged by this transaction is consumed outright; it
                // was never visible outside, so rollback must not resurrect
                // it and it never enters the working store.
                if let Some(tuple) = overlay.rollback.get_match(template, true) {
                    return Some(tuple);
                }
                if let Some(tuple) = self.primary.get_match(template, true) {
                    overlay.working.store_tuple(tuple.clone());
                    return Some(tuple);
                }
                None
            }
            Some(txn) => {
                let overlay = self.txn_overlay(txn).await?;
                if let Some(tuple) = overlay.rollback.get_match(template, false) {
                    return Some(tuple);
                }
                if let Some(tuple) = self.primary.get_match(template, false) {
                    return Some(tuple);
                }
                // Other transactions' in-flight takes remain readable; this
                // transaction's own working store stays invisible to it.
                let overlays = self.overlays.read().await;
                for (id, other) in overlays.iter() {
                    if *id == txn.id() {
                        continue;
                    }
                    if let Some(tuple) = other.working.get_match(template, false) {
                        return Some(tuple);
                    }
                }
                None
            }
        }
    }
}

impl Drop for Space {
    fn drop(&mut self) {
        self.expiry.stop();
    }
}
