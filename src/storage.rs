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

//! TupleStore backend abstraction.
//!
//! ## Purpose
//! Defines the associative-index contract behind a `Space`: insert and
//! remove tuples and templates, first-fit matching, and the waiting-template
//! scan that drives wakeups. The trait is a capability set, not a concrete
//! representation; the only provided variant is in-memory.
//!
//! ## Design
//! - **Bucketing**: both sides are keyed by the shape hash of their field
//!   names, so matching never crosses shapes.
//! - **Synchronous methods**: every operation is a short lock-held scan with
//!   no suspension point. This keeps `get_match` atomic with respect to
//!   concurrent inserts and removals on the same bucket, and lets a waiter
//!   unregister its template from a drop guard during async cancellation.
//! - **Selection**: tuples are inserted at a random index and matched
//!   first-fit, approximating Linda's "arbitrary one" semantics without
//!   collecting all matches.

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use crate::tuple::{Template, Tuple};

/// Point-in-time view of a store: bucket counts per shape hash.
///
/// This is the supported observability surface; raw bucket contents are
/// never exposed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Tuple count per shape-hash bucket
    pub tuple_buckets: HashMap<u64, usize>,
    /// Template count per shape-hash bucket
    pub template_buckets: HashMap<u64, usize>,
}

impl StoreSnapshot {
    /// Total number of stored tuples
    pub fn tuple_count(&self) -> usize {
        self.tuple_buckets.values().sum()
    }

    /// Total number of registered templates
    pub fn template_count(&self) -> usize {
        self.template_buckets.values().sum()
    }
}

/// Associative index of tuples and waiting templates.
///
/// Implementations must be safe for concurrent calls from multiple threads;
/// the scan in [`get_match`](TupleStore::get_match) is atomic with respect
/// to concurrent tuple inserts and removals on the same bucket.
pub trait TupleStore: Send + Sync {
    /// Place a tuple into the bucket keyed by its shape hash, at a uniformly
    /// random index within the bucket.
    fn store_tuple(&self, tuple: Arc<Tuple>);

    /// Append a template to the tail of the bucket keyed by its shape hash
    /// (FIFO within the bucket).
    fn store_template(&self, template: Arc<Template>);

    /// Remove a tuple by identity. Returns false when absent; the bucket is
    /// dropped when emptied.
    fn remove_tuple(&self, tuple: &Arc<Tuple>) -> bool;

    /// Remove a template by its unique id. Returns false when absent; the
    /// bucket is dropped when emptied.
    fn remove_template(&self, template: &Template) -> bool;

    /// Find the first tuple in the template's bucket that matches.
    ///
    /// With `destroy`, the matched tuple is removed from the bucket. In
    /// either case a produced match also removes the template itself from
    /// the template index (a registered waiter is owed at most one match).
    fn get_match(&self, template: &Template, destroy: bool) -> Option<Arc<Tuple>>;

    /// Scan the template bucket for the tuple's shape in insertion order and
    /// collect each matching template, stopping after the first destructive
    /// one (inclusive): a single new tuple can satisfy only one taker, while
    /// non-destructive readers ahead of that taker may all be satisfied.
    fn waiting_templates(&self, tuple: &Tuple) -> Vec<Arc<Template>>;

    /// All templates currently registered under a shape hash, in insertion
    /// order.
    fn shape_templates(&self, shape: u64) -> Vec<Arc<Template>>;

    /// Snapshot of all currently stored tuples.
    fn all_tuples(&self) -> Vec<Arc<Tuple>>;

    /// Snapshot of all currently registered templates.
    fn all_templates(&self) -> Vec<Arc<Template>>;

    /// Drop all tuples and templates.
    fn delete_storage(&self);

    /// Bucket counts per shape hash.
    fn snapshot(&self) -> StoreSnapshot;
}
