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

//! Tuple and template value model.
//!
//! A tuple is a finite, non-empty mapping from field names to immutable
//! values. A template has the same shape but each field is either a concrete
//! value, a wildcard, or a unary predicate over values. Both sides compute a
//! *shape hash* over the key set alone; the shape hash is the bucketing key
//! for all matching, so two records with the same field names always land in
//! the same bucket regardless of their values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Notify;
use ulid::Ulid;

use crate::error::SpaceError;

/// Field map of a tuple: field name to immutable value.
pub type Fields = HashMap<String, Value>;

/// Field map of a template: field name to concrete value, wildcard, or
/// predicate.
pub type TemplateFields = HashMap<String, TemplateField>;

/// An immutable field value.
///
/// The enum is closed and every variant owns its data, so a value placed in
/// the space can never be mutated behind the store's back; the recursive
/// immutability check of hand-rolled value models becomes a type-level fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Integer value (all signed and unsigned widths up to 64/32 bits
    /// convert losslessly via `From`)
    Integer(i64),
    /// Floating point value
    Float(OrderedFloat),
    /// Boolean value
    Boolean(bool),
    /// Single character
    Char(char),
    /// String value
    String(String),
    /// Binary data
    Binary(Vec<u8>),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
    /// Finite container of values
    List(Vec<Value>),
}

/// Ordered float for equality and hashing by bit pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedFloat(f64);

impl OrderedFloat {
    /// Create a new OrderedFloat from a float value
    pub fn new(value: f64) -> Self {
        OrderedFloat(value)
    }

    /// Get the inner float value
    pub fn get(&self) -> f64 {
        self.0
    }
}

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        // NaN sorts above every number and equal to itself
        match (self.0.is_nan(), other.0.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal),
        }
    }
}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Commutative hash over a record's key set.
///
/// Per-key hashes are XOR-combined, so the result is independent of
/// iteration order and identical for a tuple and any template over the same
/// field names.
pub fn shape_hash<'a, I>(keys: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    let mut combined = 0u64;
    for key in keys {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        combined ^= hasher.finish();
    }
    combined
}

/// A tuple in the space.
///
/// Validated and logically frozen at construction; two tuples are equal iff
/// their field mappings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    fields: Fields,
}

impl Tuple {
    /// Create a new tuple, validating the field map.
    ///
    /// ## Errors
    /// `SpaceError::InvalidTuple` if the map is empty or any field name is
    /// empty.
    pub fn new(fields: Fields) -> Result<Self, SpaceError> {
        if fields.is_empty() {
            return Err(SpaceError::InvalidTuple(
                "tuple requires at least one field".to_string(),
            ));
        }
        if fields.keys().any(|k| k.is_empty()) {
            return Err(SpaceError::InvalidTuple(
                "field names must be non-empty".to_string(),
            ));
        }
        Ok(Tuple { fields })
    }

    /// Get the field map of the tuple
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Look up a single field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// A tuple is never empty; provided for completeness
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Shape hash over the field names
    pub fn shape(&self) -> u64 {
        shape_hash(self.fields.keys().map(String::as_str))
    }

    /// Consume the tuple and return its field map
    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

/// Field in a template.
///
/// The matcher dispatches on the tag; the shape hash ignores it.
#[derive(Clone)]
pub enum TemplateField {
    /// Exact match against a concrete value of the same variant
    Value(Value),
    /// Wildcard, matches any value
    Wildcard,
    /// Unary predicate over the candidate value
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl std::fmt::Debug for TemplateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateField::Value(value) => f.debug_tuple("Value").field(value).finish(),
            TemplateField::Wildcard => f.debug_tuple("Wildcard").finish(),
            TemplateField::Predicate(_) => {
                f.debug_tuple("Predicate").field(&"<function>").finish()
            }
        }
    }
}

impl TemplateField {
    /// Wrap a predicate function as a template field
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        TemplateField::Predicate(Arc::new(f))
    }

    /// Check whether a concrete value satisfies this field
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            TemplateField::Value(expected) => expected == value,
            TemplateField::Wildcard => true,
            TemplateField::Predicate(pred) => pred(value),
        }
    }

    /// True for wildcard and predicate fields
    pub fn is_formal(&self) -> bool {
        !matches!(self, TemplateField::Value(_))
    }
}

/// A template (anti-tuple): a tuple-shaped query.
///
/// Carries a destructive flag (`take` vs `get`) and a per-instance unique id
/// so that one of several otherwise-equal waiting templates can be removed
/// without affecting its siblings. Each template also owns its wakeup
/// condition; a producer that matches a waiting template signals exactly
/// that template.
pub struct Template {
    fields: TemplateFields,
    destructive: bool,
    id: Ulid,
    notify: Notify,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("fields", &self.fields)
            .field("destructive", &self.destructive)
            .field("id", &self.id)
            .finish()
    }
}

impl Template {
    /// Create a new template, validating the field map.
    ///
    /// ## Errors
    /// `SpaceError::InvalidTemplate` if the map is empty or any field name
    /// is empty.
    pub fn new(fields: TemplateFields, destructive: bool) -> Result<Self, SpaceError> {
        if fields.is_empty() {
            return Err(SpaceError::InvalidTemplate(
                "template requires at least one field".to_string(),
            ));
        }
        if fields.keys().any(|k| k.is_empty()) {
            return Err(SpaceError::InvalidTemplate(
                "field names must be non-empty".to_string(),
            ));
        }
        Ok(Template {
            fields,
            destructive,
            id: Ulid::new(),
            notify: Notify::new(),
        })
    }

    /// Get the field map of the template
    pub fn fields(&self) -> &TemplateFields {
        &self.fields
    }

    /// True when this template was built for a destructive retrieval
    pub fn destructive(&self) -> bool {
        self.destructive
    }

    /// Per-instance unique id
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Shape hash over the field names
    pub fn shape(&self) -> u64 {
        shape_hash(self.fields.keys().map(String::as_str))
    }

    /// Check whether a tuple matches this template.
    ///
    /// True iff the key sets are equal and every template field accepts the
    /// tuple's value under that key. Field order is irrelevant.
    pub fn matches(&self, tuple: &Tuple) -> bool {
        if self.fields.len() != tuple.len() {
            return false;
        }
        self.fields.iter().all(|(key, field)| {
            tuple.get(key).is_some_and(|value| field.matches(value))
        })
    }

    /// Signal the owning waiter. A permit is stored when the waiter is not
    /// yet parked, so register-then-match cannot lose a wakeup.
    pub(crate) fn signal(&self) {
        self.notify.notify_one();
    }

    /// Park until signalled.
    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Template {}

// Conversion traits for the immutable value universe
impl From<i8> for Value {
    fn from(val: i8) -> Self {
        Value::Integer(val as i64)
    }
}

impl From<i16> for Value {
    fn from(val: i16) -> Self {
        Value::Integer(val as i64)
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Value::Integer(val as i64)
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value::Integer(val)
    }
}

impl From<u8> for Value {
    fn from(val: u8) -> Self {
        Value::Integer(val as i64)
    }
}

impl From<u16> for Value {
    fn from(val: u16) -> Self {
        Value::Integer(val as i64)
    }
}

impl From<u32> for Value {
    fn from(val: u32) -> Self {
        Value::Integer(val as i64)
    }
}

impl From<f32> for Value {
    fn from(val: f32) -> Self {
        Value::Float(OrderedFloat(val as f64))
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value::Float(OrderedFloat(val))
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value::Boolean(val)
    }
}

impl From<char> for Value {
    fn from(val: char) -> Self {
        Value::Char(val)
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::String(val.to_string())
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value::String(val)
    }
}

impl From<Vec<u8>> for Value {
    fn from(val: Vec<u8>) -> Self {
        Value::Binary(val)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(val: DateTime<Utc>) -> Self {
        Value::Timestamp(val)
    }
}

impl From<Vec<Value>> for Value {
    fn from(val: Vec<Value>) -> Self {
        Value::List(val)
    }
}

impl From<Value> for TemplateField {
    fn from(val: Value) -> Self {
        TemplateField::Value(val)
    }
}

impl From<i8> for TemplateField {
    fn from(val: i8) -> Self {
        TemplateField::Value(Value::from(val))
    }
}

impl From<i16> for TemplateField {
    fn from(val: i16) -> Self {
        TemplateField::Value(Value::from(val))
    }
}

impl From<i32> for TemplateField {
    fn from(val: i32) -> Self {
        TemplateField::Value(Value::from(val))
    }
}

impl From<i64> for TemplateField {
    fn from(val: i64) -> Self {
        TemplateField::Value(Value::from(val))
    }
}

impl From<f64> for TemplateField {
    fn from(val: f64) -> Self {
        TemplateField::Value(Value::from(val))
    }
}

impl From<bool> for TemplateField {
    fn from(val: bool) -> Self {
        TemplateField::Value(Value::from(val))
    }
}

impl From<char> for TemplateField {
    fn from(val: char) -> Self {
        TemplateField::Value(Value::from(val))
    }
}

impl From<&str> for TemplateField {
    fn from(val: &str) -> Self {
        TemplateField::Value(Value::from(val))
    }
}

impl From<String> for TemplateField {
    fn from(val: String) -> Self {
        TemplateField::Value(Value::from(val))
    }
}

/// Helper macro for building tuple field maps from named values
///
/// # Examples
/// ```ignore
/// # use lindaspace::tuple;
/// let fields = tuple! {"name" => "v", "age" => 22};
/// ```
#[macro_export]
macro_rules! tuple {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut fields = ::std::collections::HashMap::new();
        $( fields.insert(($key).to_string(), $crate::Value::from($value)); )*
        fields
    }};
}

/// Helper macro for building template field maps
///
/// # Examples
/// ```ignore
/// # use lindaspace::{template, TemplateField::Wildcard};
/// let query = template! {"name" => "v", "age" => Wildcard};
/// ```
#[macro_export]
macro_rules! template {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut fields = ::std::collections::HashMap::new();
        $( fields.insert(($key).to_string(), $crate::TemplateField::from($value)); )*
        fields
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TemplateField::Wildcard;

    #[test]
    fn test_shape_hash_order_independent() {
        let forward = shape_hash(["a", "b", "c"]);
        let backward = shape_hash(["c", "a", "b"]);
        assert_eq!(forward, backward);

        let other = shape_hash(["a", "b", "d"]);
        assert_ne!(forward, other);
    }

    #[test]
    fn test_shape_hash_shared_by_tuple_and_template() {
        let tuple = Tuple::new(tuple! {"name" => "v", "age" => 22}).unwrap();
        let template = Template::new(template! {"age" => Wildcard, "name" => "x"}, false).unwrap();
        assert_eq!(tuple.shape(), template.shape());
    }

    #[test]
    fn test_shape_hash_ignores_values() {
        let t1 = Tuple::new(tuple! {"k" => 1}).unwrap();
        let t2 = Tuple::new(tuple! {"k" => "different"}).unwrap();
        assert_eq!(t1.shape(), t2.shape());
        assert_ne!(t1, t2);
    }

    #[test]
    fn test_tuple_rejects_empty() {
        let result = Tuple::new(Fields::new());
        assert!(matches!(result, Err(SpaceError::InvalidTuple(_))));
    }

    #[test]
    fn test_tuple_rejects_empty_field_name() {
        let result = Tuple::new(tuple! {"" => 1});
        assert!(matches!(result, Err(SpaceError::InvalidTuple(_))));
    }

    #[test]
    fn test_template_rejects_empty() {
        let result = Template::new(TemplateFields::new(), true);
        assert!(matches!(result, Err(SpaceError::InvalidTemplate(_))));
    }

    #[test]
    fn test_match_concrete_and_wildcard() {
        let tuple = Tuple::new(tuple! {"name" => "v", "age" => 22}).unwrap();

        let exact = Template::new(template! {"name" => "v", "age" => 22}, false).unwrap();
        assert!(exact.matches(&tuple));

        let wild = Template::new(template! {"name" => "v", "age" => Wildcard}, false).unwrap();
        assert!(wild.matches(&tuple));

        let wrong_value = Template::new(template! {"name" => "w", "age" => Wildcard}, false).unwrap();
        assert!(!wrong_value.matches(&tuple));
    }

    #[test]
    fn test_match_requires_same_key_set() {
        let tuple = Tuple::new(tuple! {"x" => 1}).unwrap();

        let missing = Template::new(template! {"y" => Wildcard}, false).unwrap();
        assert!(!missing.matches(&tuple));

        let extra = Template::new(template! {"x" => Wildcard, "y" => Wildcard}, false).unwrap();
        assert!(!extra.matches(&tuple));
    }

    #[test]
    fn test_match_requires_same_dynamic_type() {
        let tuple = Tuple::new(tuple! {"n" => 5}).unwrap();
        // Float 5.0 is not Integer 5
        let template = Template::new(template! {"n" => 5.0}, false).unwrap();
        assert!(!template.matches(&tuple));
    }

    #[test]
    fn test_match_predicate() {
        let tuple = Tuple::new(tuple! {"price" => 10}).unwrap();

        let above = Template::new(
            template! {"price" => TemplateField::predicate(|v| matches!(v, Value::Integer(n) if *n > 5))},
            true,
        )
        .unwrap();
        assert!(above.matches(&tuple));

        let below = Template::new(
            template! {"price" => TemplateField::predicate(|v| matches!(v, Value::Integer(n) if *n > 50))},
            true,
        )
        .unwrap();
        assert!(!below.matches(&tuple));
    }

    #[test]
    fn test_template_ids_distinguish_equal_shapes() {
        let a = Template::new(template! {"k" => Wildcard}, true).unwrap();
        let b = Template::new(template! {"k" => Wildcard}, true).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42i8), Value::Integer(42));
        assert_eq!(Value::from(42u16), Value::Integer(42));
        assert_eq!(Value::from(42i64), Value::Integer(42));
        assert_eq!(Value::from(2.5f64), Value::Float(OrderedFloat::new(2.5)));
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from('x'), Value::Char('x'));
        assert_eq!(Value::from("s"), Value::String("s".to_string()));
        assert_eq!(Value::from(vec![1u8, 2]), Value::Binary(vec![1, 2]));
        assert_eq!(
            Value::from(vec![Value::from(1), Value::from(2)]),
            Value::List(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn test_ordered_float_nan() {
        let nan = OrderedFloat::new(f64::NAN);
        let one = OrderedFloat::new(1.0);
        assert_eq!(nan, OrderedFloat::new(f64::NAN));
        assert!(nan > one);
        assert!(one < nan);
    }

    #[test]
    fn test_tuple_serde_roundtrip() {
        let tuple = Tuple::new(tuple! {"name" => "v", "weight" => 1.5, "tags" => vec![Value::from("a")]})
            .unwrap();
        let json = serde_json::to_string(&tuple).unwrap();
        let back: Tuple = serde_json::from_str(&json).unwrap();
        assert_eq!(tuple, back);
        assert_eq!(tuple.shape(), back.shape());
    }

    #[test]
    fn test_is_formal() {
        assert!(TemplateField::Wildcard.is_formal());
        assert!(TemplateField::predicate(|_| true).is_formal());
        assert!(!TemplateField::from(3).is_formal());
    }
}
