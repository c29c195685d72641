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

//! In-memory TupleStore backend.
//!
//! ## Design
//! - **Storage**: two shape-hash keyed bucket maps, one for tuples and one
//!   for templates, each behind its own mutex.
//! - **Identity**: tuples are removed by pointer identity (`Arc::ptr_eq`),
//!   so equal-valued tuples never shadow each other; templates are removed
//!   by their unique id.
//! - **Performance**: insert is O(bucket), matching is a linear first-fit
//!   scan of one bucket.

use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{StoreSnapshot, TupleStore};
use crate::tuple::{Template, Tuple};

/// Lock a mutex, recovering the inner data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory tuple store implementation.
pub struct MemoryStore {
    tuples: Mutex<HashMap<u64, Vec<Arc<Tuple>>>>,
    templates: Mutex<HashMap<u64, Vec<Arc<Template>>>>,
}

impl MemoryStore {
    /// Create a new in-memory store with pre-allocated bucket capacity.
    pub fn new(initial_capacity: usize) -> Self {
        MemoryStore {
            tuples: Mutex::new(HashMap::with_capacity(initial_capacity)),
            templates: Mutex::new(HashMap::with_capacity(initial_capacity)),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TupleStore for MemoryStore {
    fn store_tuple(&self, tuple: Arc<Tuple>) {
        let shape = tuple.shape();
        let mut buckets = lock(&self.tuples);
        let bucket = buckets.entry(shape).or_default();
        // Random insertion index + first-fit scan in get_match approximates
        // nondeterministic selection among matching tuples.
        let index = rand::thread_rng().gen_range(0..=bucket.len());
        bucket.insert(index, tuple);
    }

    fn store_template(&self, template: Arc<Template>) {
        let shape = template.shape();
        let mut buckets = lock(&self.templates);
        buckets.entry(shape).or_default().push(template);
    }

    fn remove_tuple(&self, tuple: &Arc<Tuple>) -> bool {
        let shape = tuple.shape();
        let mut buckets = lock(&self.tuples);
        let Some(bucket) = buckets.get_mut(&shape) else {
            return false;
        };
        let Some(position) = bucket.iter().position(|t| Arc::ptr_eq(t, tuple)) else {
            return false;
        };
        bucket.remove(position);
        if bucket.is_empty() {
            buckets.remove(&shape);
        }
        true
    }

    fn remove_template(&self, template: &Template) -> bool {
        let shape = template.shape();
        let mut buckets = lock(&self.templates);
        let Some(bucket) = buckets.get_mut(&shape) else {
            return false;
        };
        let Some(position) = bucket.iter().position(|t| t.id() == template.id()) else {
            return false;
        };
        bucket.remove(position);
        if bucket.is_empty() {
            buckets.remove(&shape);
        }
        true
    }

    fn get_match(&self, template: &Template, destroy: bool) -> Option<Arc<Tuple>> {
        let shape = template.shape();
        let found = {
            let mut buckets = lock(&self.tuples);
            let bucket = buckets.get_mut(&shape)?;
            let position = bucket.iter().position(|t| template.matches(t))?;
            let tuple = if destroy {
                bucket.remove(position)
            } else {
                bucket[position].clone()
            };
            if bucket.is_empty() {
                buckets.remove(&shape);
            }
            tuple
        };
        // A produced match settles the template; a waiter is owed one match.
        self.remove_template(template);
        Some(found)
    }

    fn waiting_templates(&self, tuple: &Tuple) -> Vec<Arc<Template>> {
        let buckets = lock(&self.templates);
        let mut matching = Vec::new();
        if let Some(bucket) = buckets.get(&tuple.shape()) {
            for template in bucket {
                if template.matches(tuple) {
                    let destructive = template.destructive();
                    matching.push(template.clone());
                    if destructive {
                        break;
                    }
                }
            }
        }
        matching
    }

    fn shape_templates(&self, shape: u64) -> Vec<Arc<Template>> {
        let buckets = lock(&self.templates);
        buckets.get(&shape).cloned().unwrap_or_default()
    }

    fn all_tuples(&self) -> Vec<Arc<Tuple>> {
        let buckets = lock(&self.tuples);
        buckets.values().flatten().cloned().collect()
    }

    fn all_templates(&self) -> Vec<Arc<Template>> {
        let buckets = lock(&self.templates);
        buckets.values().flatten().cloned().collect()
    }

    fn delete_storage(&self) {
        lock(&self.tuples).clear();
        lock(&self.templates).clear();
    }

    fn snapshot(&self) -> StoreSnapshot {
        let tuple_buckets = lock(&self.tuples)
            .iter()
            .map(|(shape, bucket)| (*shape, bucket.len()))
            .collect();
        let template_buckets = lock(&self.templates)
            .iter()
            .map(|(shape, bucket)| (*shape, bucket.len()))
            .collect();
        StoreSnapshot {
            tuple_buckets,
            template_buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{Fields, TemplateFields};
    use crate::TemplateField::Wildcard;
    use crate::{template, tuple};

    fn tuple_of(fields: Fields) -> Arc<Tuple> {
        Arc::new(Tuple::new(fields).unwrap())
    }

    fn template_of(fields: TemplateFields, destructive: bool) -> Arc<Template> {
        Arc::new(Template::new(fields, destructive).unwrap())
    }

    #[test]
    fn test_store_and_match_destructive() {
        let store = MemoryStore::default();
        let tuple = tuple_of(tuple! {"k" => "a"});
        store.store_tuple(tuple.clone());

        let template = template_of(template! {"k" => Wildcard}, true);
        let found = store.get_match(&template, true).unwrap();
        assert!(Arc::ptr_eq(&found, &tuple));

        // Destroyed: second attempt finds nothing and the bucket is gone
        assert!(store.get_match(&template, true).is_none());
        assert_eq!(store.snapshot().tuple_count(), 0);
        assert!(store.snapshot().tuple_buckets.is_empty());
    }

    #[test]
    fn test_match_non_destructive_keeps_tuple() {
        let store = MemoryStore::default();
        store.store_tuple(tuple_of(tuple! {"k" => "a"}));

        let template = template_of(template! {"k" => Wildcard}, false);
        assert!(store.get_match(&template, false).is_some());
        assert!(store.get_match(&template, false).is_some());
        assert_eq!(store.snapshot().tuple_count(), 1);
    }

    #[test]
    fn test_match_settles_registered_template() {
        let store = MemoryStore::default();
        let template = template_of(template! {"k" => Wildcard}, true);
        store.store_template(template.clone());
        assert_eq!(store.snapshot().template_count(), 1);

        store.store_tuple(tuple_of(tuple! {"k" => 1}));
        assert!(store.get_match(&template, true).is_some());
        assert_eq!(store.snapshot().template_count(), 0);
    }

    #[test]
    fn test_no_cross_shape_match() {
        let store = MemoryStore::default();
        store.store_tuple(tuple_of(tuple! {"x" => 1}));

        let other_shape = template_of(template! {"y" => Wildcard}, true);
        assert!(store.get_match(&other_shape, true).is_none());
        assert!(store.waiting_templates(&tuple_of(tuple! {"x" => 1})).is_empty());
    }

    #[test]
    fn test_random_insertion_stays_in_bucket() {
        let store = MemoryStore::default();
        for i in 0..50 {
            store.store_tuple(tuple_of(tuple! {"n" => i}));
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.tuple_buckets.len(), 1);
        assert_eq!(snapshot.tuple_count(), 50);

        // Every stored tuple is still retrievable
        let template = template_of(template! {"n" => Wildcard}, true);
        for _ in 0..50 {
            assert!(store.get_match(&template, true).is_some());
        }
        assert!(store.get_match(&template, true).is_none());
    }

    #[test]
    fn test_waiting_templates_fifo_stops_after_first_destructive() {
        let store = MemoryStore::default();
        let reader_one = template_of(template! {"k" => Wildcard}, false);
        let reader_two = template_of(template! {"k" => Wildcard}, false);
        let taker = template_of(template! {"k" => Wildcard}, true);
        let late_reader = template_of(template! {"k" => Wildcard}, false);

        store.store_template(reader_one.clone());
        store.store_template(reader_two.clone());
        store.store_template(taker.clone());
        store.store_template(late_reader);

        let tuple = tuple_of(tuple! {"k" => 7});
        let waiting = store.waiting_templates(&tuple);
        let ids: Vec<_> = waiting.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![reader_one.id(), reader_two.id(), taker.id()]);
    }

    #[test]
    fn test_waiting_templates_skips_non_matching() {
        let store = MemoryStore::default();
        let narrow = template_of(template! {"k" => "other"}, true);
        let broad = template_of(template! {"k" => Wildcard}, true);
        store.store_template(narrow);
        store.store_template(broad.clone());

        let waiting = store.waiting_templates(&tuple_of(tuple! {"k" => "a"}));
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id(), broad.id());
    }

    #[test]
    fn test_remove_tuple_by_identity() {
        let store = MemoryStore::default();
        let first = tuple_of(tuple! {"k" => 1});
        let twin = tuple_of(tuple! {"k" => 1});
        store.store_tuple(first.clone());
        store.store_tuple(twin.clone());

        assert!(store.remove_tuple(&first));
        assert!(!store.remove_tuple(&first));

        // The equal-valued twin is untouched
        let remaining = store.all_tuples();
        assert_eq!(remaining.len(), 1);
        assert!(Arc::ptr_eq(&remaining[0], &twin));
    }

    #[test]
    fn test_remove_template_leaves_siblings() {
        let store = MemoryStore::default();
        let a = template_of(template! {"k" => Wildcard}, true);
        let b = template_of(template! {"k" => Wildcard}, true);
        store.store_template(a.clone());
        store.store_template(b.clone());

        assert!(store.remove_template(&a));
        let remaining = store.shape_templates(b.shape());
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), b.id());
    }

    #[test]
    fn test_delete_storage() {
        let store = MemoryStore::default();
        store.store_tuple(tuple_of(tuple! {"k" => 1}));
        store.store_template(template_of(template! {"k" => Wildcard}, true));

        store.delete_storage();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.tuple_count(), 0);
        assert_eq!(snapshot.template_count(), 0);
    }
}
