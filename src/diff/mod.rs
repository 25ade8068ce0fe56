//! Tree/diff algebra over JSON-like course data.
//!
//! A [`Tree`] is either a string-keyed map or an atom (any non-object JSON
//! value; arrays are atoms and are never descended into). A [`Diff`] is the
//! same shape extended with a delete sentinel, and describes a transformation
//! of one tree into another. The three pure functions [`compute`], [`apply`]
//! and [`merge`] obey:
//!
//! - `apply(a, compute(a, b)) == b`
//! - `apply(a, merge(compute(a, b), compute(b, c))) == c`
//! - `apply(a, {}) == a`
//! - `merge` is associative

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub mod manager;

/// Wire sentinel marking a key for removal. Reserved at the diff level;
/// snapshots must never contain it.
pub const DELETE_SENTINEL: &str = "$delete";

/// A JSON-like tree. Objects become [`Tree::Map`]; everything else (null,
/// booleans, numbers, strings, arrays) is an opaque [`Tree::Atom`].
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Atom(Value),
    Map(BTreeMap<String, Tree>),
}

impl Tree {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from_value(value)))
                    .collect(),
            ),
            other => Self::Atom(other),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Atom(value) => value.clone(),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_value()))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for Tree {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Atom(value) => value.serialize(serializer),
            Self::Map(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

/// A transformation of one [`Tree`] into another. A non-map diff replaces its
/// target wholesale; a map diff is applied key-wise, with [`Diff::Delete`]
/// removing the key. The empty map is the identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    Delete,
    Atom(Value),
    Map(BTreeMap<String, Diff>),
}

impl Diff {
    pub fn empty() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// True for the identity diff.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Map(map) if map.is_empty())
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) if text == DELETE_SENTINEL => Self::Delete,
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from_value(value)))
                    .collect(),
            ),
            other => Self::Atom(other),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Delete => Value::String(DELETE_SENTINEL.to_owned()),
            Self::Atom(value) => value.clone(),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_value()))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Diff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Delete => serializer.serialize_str(DELETE_SENTINEL),
            Self::Atom(value) => value.serialize(serializer),
            Self::Map(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Diff {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

/// A sentinel-free tree is a valid replacement diff.
impl From<&Tree> for Diff {
    fn from(tree: &Tree) -> Self {
        match tree {
            Tree::Atom(value) => Self::Atom(value.clone()),
            Tree::Map(map) => Self::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.into()))
                    .collect(),
            ),
        }
    }
}

/// Verbatim conversion used when a diff subtree lands on a missing key.
/// A bare delete turns into the sentinel atom, matching the wire format.
impl From<&Diff> for Tree {
    fn from(diff: &Diff) -> Self {
        match diff {
            Diff::Delete => Self::Atom(Value::String(DELETE_SENTINEL.to_owned())),
            Diff::Atom(value) => Self::Atom(value.clone()),
            Diff::Map(map) => Self::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.into()))
                    .collect(),
            ),
        }
    }
}

/// Compute a diff that, when applied to `old`, yields `new`. Neither argument
/// is modified.
pub fn compute(old: &Tree, new: &Tree) -> Diff {
    let (Tree::Map(old_map), Tree::Map(new_map)) = (old, new) else {
        return new.into();
    };
    let mut diff = BTreeMap::new();
    for (key, new_value) in new_map {
        match old_map.get(key) {
            None => {
                diff.insert(key.clone(), new_value.into());
            }
            Some(old_value) if old_value != new_value => {
                diff.insert(key.clone(), compute(old_value, new_value));
            }
            Some(_) => {}
        }
    }
    for key in old_map.keys() {
        if !new_map.contains_key(key) {
            diff.insert(key.clone(), Diff::Delete);
        }
    }
    Diff::Map(diff)
}

/// Apply `diff` to `target`, returning a new tree. Neither argument is
/// modified.
pub fn apply(target: &Tree, diff: &Diff) -> Tree {
    let (Tree::Map(target_map), Diff::Map(diff_map)) = (target, diff) else {
        return diff.into();
    };
    let mut result = target_map.clone();
    for (key, value) in diff_map {
        match value {
            Diff::Delete => {
                result.remove(key);
            }
            _ => match target_map.get(key) {
                None => {
                    result.insert(key.clone(), value.into());
                }
                Some(existing) => {
                    result.insert(key.clone(), apply(existing, value));
                }
            },
        }
    }
    Tree::Map(result)
}

/// Merge two diffs into one equivalent to applying `first` then `second`.
/// Neither argument is modified.
pub fn merge(first: &Diff, second: &Diff) -> Diff {
    let (Diff::Map(first_map), Diff::Map(second_map)) = (first, second) else {
        return second.clone();
    };
    let mut merged = first_map.clone();
    for (key, value) in second_map {
        let value = match first_map.get(key) {
            Some(existing) => merge(existing, value),
            None => value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    Diff::Map(merged)
}

/// Check whether a JSON value contains the delete sentinel anywhere, keys
/// included. Used to reject malformed scraper output and POST bodies.
pub fn contains_sentinel(value: &Value) -> bool {
    match value {
        Value::String(text) => text == DELETE_SENTINEL,
        Value::Array(items) => items.iter().any(contains_sentinel),
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key == DELETE_SENTINEL || contains_sentinel(value)),
        _ => false,
    }
}
