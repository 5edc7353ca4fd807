//! Addressing of fields inside JSON payloads.
//!
//! A [`FieldPath`] is a dot separated list of object keys such as `Power.RawBytePower` or
//! `Blocks.Miner` with `$` denoting the payload itself. Segments are never array indices. Arrays
//! are traversed transparently: a path that reaches an array applies to every element of that
//! array. This keeps paths stable for responses which contain lists of objects.

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROOT_MARKER: &str = "$";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the object keys leading to `location` are exactly this path.
    pub fn matches(&self, location: &Location) -> bool {
        location.keys().eq(self.0.iter().map(String::as_str))
    }

    /// Removes the field from the value, wherever arrays fan the path out.
    pub fn remove_from(&self, value: &mut Value) {
        remove(value, &self.0)
    }

    /// Sorts every collection found at this path into canonical order so that two collections
    /// holding the same elements compare equal regardless of the order the nodes returned them in.
    pub fn sort_collections_in(&self, value: &mut Value) {
        sort_collections(value, &self.0)
    }
}

impl FromStr for FieldPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == ROOT_MARKER {
            return Ok(Self::root());
        }
        let s = s
            .strip_prefix(ROOT_MARKER)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(s);

        let segments = s.split('.').map(str::to_owned).collect::<Vec<_>>();
        if segments.iter().any(String::is_empty) {
            return Err(format!("field path `{s}` contains an empty segment"));
        }
        Ok(Self(segments))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldPath> for String {
    fn from(value: FieldPath) -> Self {
        value.to_string()
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            f.write_str(ROOT_MARKER)
        } else {
            f.write_str(&self.0.join("."))
        }
    }
}

fn remove(value: &mut Value, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    match value {
        Value::Array(items) => items.iter_mut().for_each(|item| remove(item, segments)),
        Value::Object(map) if rest.is_empty() => {
            map.remove(first);
        }
        Value::Object(map) => {
            if let Some(child) = map.get_mut(first) {
                remove(child, rest)
            }
        }
        _ => {}
    }
}

fn sort_collections(value: &mut Value, segments: &[String]) {
    match (value, segments.split_first()) {
        (Value::Array(items), None) => {
            items.iter_mut().for_each(canonicalize);
            items.sort_by_cached_key(|item| item.to_string());
        }
        (Value::Array(items), Some(_)) => items
            .iter_mut()
            .for_each(|item| sort_collections(item, segments)),
        (Value::Object(map), Some((first, rest))) => {
            if let Some(child) = map.get_mut(first) {
                sort_collections(child, rest)
            }
        }
        _ => {}
    }
}

/// Rewrites every object in the value so that its keys are stored in lexicographic order.
pub fn canonicalize(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(canonicalize),
        Value::Object(map) => {
            let sorted = std::mem::take(map)
                .into_iter()
                .map(|(key, mut value)| {
                    canonicalize(&mut value);
                    (key, value)
                })
                .collect::<BTreeMap<_, _>>();
            *map = sorted.into_iter().collect();
        }
        _ => {}
    }
}

/// A position inside a payload, used to point at the place where two payloads diverge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location(Vec<LocationSegment>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocationSegment {
    Key(String),
    Index(usize),
}

impl Location {
    pub fn push(&mut self, segment: LocationSegment) {
        self.0.push(segment)
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }

    /// The object keys leading to this location, array indices skipped.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|segment| match segment {
            LocationSegment::Key(key) => Some(key.as_str()),
            LocationSegment::Index(_) => None,
        })
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(ROOT_MARKER)?;
        for segment in self.0.iter() {
            match segment {
                LocationSegment::Key(key) => write!(f, ".{key}")?,
                LocationSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}
