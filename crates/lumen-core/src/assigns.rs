// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The assigns bag: a component's keyed mutable state, paired with the
//! change tracker that detects which fields moved since the last render.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::hash::Fnv64a;

/// A value held in an assigns field. Mirrors the `nil | bool | integer |
/// float | string | sequence | mapping` union from the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Hash this value per the canonical encoding: per-type sentinel byte,
    /// sorted-key map encoding, element-by-element sequence encoding, and a
    /// canonical-JSON fallback for anything this tagged union can't express
    /// natively (kept for completeness — every variant above is handled
    /// directly, so the fallback only fires for malformed `serde_json`
    /// round-trips that somehow bypass the enum).
    pub fn content_hash(&self) -> u64 {
        let mut acc = Fnv64a::new();
        hash_value(&mut acc, self);
        acc.finish()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

/// Type sentinel bytes, each distinct, fed before a value's content so that
/// e.g. the integer `0` and the string `"0"` never collide.
mod sentinel {
    pub const NULL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const INT: u8 = 2;
    pub const FLOAT: u8 = 3;
    pub const STR: u8 = 4;
    pub const SEQ: u8 = 5;
    pub const MAP: u8 = 6;
    pub const JSON_FALLBACK: u8 = 7;
}

fn hash_value(acc: &mut Fnv64a, value: &Value) {
    match value {
        Value::Null => {
            acc.write(&[sentinel::NULL]);
        }
        Value::Bool(b) => {
            acc.write(&[sentinel::BOOL, u8::from(*b)]);
        }
        Value::Int(i) => {
            acc.write(&[sentinel::INT]);
            acc.write(&i.to_le_bytes());
        }
        Value::Float(v) => {
            acc.write(&[sentinel::FLOAT]);
            acc.write(&v.to_bits().to_le_bytes());
        }
        Value::Str(s) => {
            acc.write(&[sentinel::STR]);
            acc.write(s.as_bytes());
        }
        Value::Seq(items) => {
            acc.write(&[sentinel::SEQ]);
            for item in items {
                let h = item.content_hash();
                acc.write(&h.to_le_bytes());
            }
        }
        Value::Map(map) => {
            acc.write(&[sentinel::MAP]);
            // BTreeMap already iterates in sorted key order.
            for (key, val) in map {
                acc.write(key.as_bytes());
                acc.write(&val.content_hash().to_le_bytes());
            }
        }
    }
}

/// Fallback path for foreign types that don't round-trip through [`Value`].
/// Defined (and test-visible) per the change-tracker design even though every
/// current caller goes through the tagged union above.
pub fn hash_json_fallback(json: &serde_json::Value) -> u64 {
    let mut acc = Fnv64a::new();
    acc.write(&[sentinel::JSON_FALLBACK]);
    let canonical = canonical_json(json);
    acc.write(canonical.as_bytes());
    acc.finish()
}

fn canonical_json(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::from("{");
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k).unwrap_or_default());
                out.push(':');
                out.push_str(&canonical_json(&map[*k]));
            }
            out.push('}');
            out
        }
        serde_json::Value::Array(items) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&canonical_json(item));
            }
            out.push(']');
            out
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Per-field shadow state kept by the change tracker: the last-observed
/// content hash and a monotonic version at which it was last bumped.
#[derive(Debug, Clone, Copy)]
struct FieldShadow {
    hash: u64,
}

/// Shadow index detecting which assigns fields changed since the last
/// `changed_and_clear`.
#[derive(Debug, Default)]
struct ChangeTracker {
    shadow: HashMap<String, FieldShadow>,
    changed: HashSet<String>,
    version: u64,
}

impl ChangeTracker {
    fn note_write(&mut self, key: &str, value: &Value) {
        let hash = value.content_hash();
        let changed = match self.shadow.get(key) {
            Some(prev) => prev.hash != hash,
            None => true, // newly introduced counts as changed
        };
        self.shadow.insert(key.to_owned(), FieldShadow { hash });
        if changed {
            self.changed.insert(key.to_owned());
        }
    }

    fn note_delete(&mut self, key: &str) {
        if self.shadow.remove(key).is_some() {
            self.changed.insert(key.to_owned());
        }
    }

    fn mark_changed(&mut self, key: &str) {
        self.changed.insert(key.to_owned());
    }

    fn changed_and_clear(&mut self) -> HashSet<String> {
        let out = std::mem::take(&mut self.changed);
        self.version += 1;
        out
    }
}

struct Inner {
    values: BTreeMap<String, Value>,
    tracker: ChangeTracker,
}

/// The per-component assigns bag: a thread-safe `field name -> Value` map
/// whose writes always feed a [`ChangeTracker`].
pub struct Assigns {
    inner: RwLock<Inner>,
}

impl Assigns {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner { values: BTreeMap::new(), tracker: ChangeTracker::default() }) }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.values.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut guard = self.inner.write().await;
        guard.tracker.note_write(&key, &value);
        guard.values.insert(key, value);
    }

    pub async fn set_all(&self, fields: impl IntoIterator<Item = (String, Value)>) {
        let mut guard = self.inner.write().await;
        for (key, value) in fields {
            guard.tracker.note_write(&key, &value);
            guard.values.insert(key, value);
        }
    }

    pub async fn delete(&self, key: &str) {
        let mut guard = self.inner.write().await;
        if guard.values.remove(key).is_some() {
            guard.tracker.note_delete(key);
        }
    }

    /// Mutate a field in place, then mark it changed. Useful after a direct
    /// nested mutation (e.g. pushing onto a `Seq`) where the caller already
    /// holds a fresh value rather than constructing one from scratch.
    pub async fn update(&self, key: &str, f: impl FnOnce(&mut Value)) {
        let mut guard = self.inner.write().await;
        let mut value = guard.values.get(key).cloned().unwrap_or(Value::Null);
        f(&mut value);
        guard.tracker.note_write(key, &value);
        guard.values.insert(key.to_owned(), value);
    }

    /// Force a field to be reported changed on the next `changed_and_clear`,
    /// without altering its stored value or hash shadow.
    pub async fn mark_changed(&self, key: &str) {
        self.inner.write().await.tracker.mark_changed(key);
    }

    /// Snapshot the full bag (deep clone — mutable containers never alias).
    pub async fn data(&self) -> BTreeMap<String, Value> {
        self.inner.read().await.values.clone()
    }

    /// Deep-clone into a fresh, independent `Assigns` with the same values
    /// and an empty change/shadow state (a clone is a new session's baseline,
    /// not a continuation of the source's change history).
    pub async fn clone_deep(&self) -> Assigns {
        let values = self.inner.read().await.values.clone();
        let fresh = Assigns::new();
        {
            let mut guard = fresh.inner.write().await;
            for (key, value) in &values {
                guard.tracker.note_write(key, value);
            }
            guard.values = values;
            // A freshly cloned bag's baseline render hasn't happened yet, so
            // the clone itself has no "changed" fields to report.
            guard.tracker.changed.clear();
        }
        fresh
    }

    /// Return the set of fields whose hash differs from the last emit,
    /// clear the change set, and bump the version. A field never appears
    /// twice; calling this twice in a row with no intervening write returns
    /// the empty set the second time.
    pub async fn changed_and_clear(&self) -> HashSet<String> {
        self.inner.write().await.tracker.changed_and_clear()
    }

    /// The tracker's current version counter (bumped once per
    /// `changed_and_clear`, regardless of whether any field changed).
    pub async fn version(&self) -> u64 {
        self.inner.read().await.tracker.version
    }

    /// Replace the bag wholesale and mark every key changed, so the next
    /// render recomputes every slot. Used by recovery-token restoration.
    pub async fn restore(&self, values: BTreeMap<String, Value>) {
        let mut guard = self.inner.write().await;
        for (key, value) in &values {
            guard.tracker.note_write(key, value);
        }
        guard.values = values;
    }
}

impl Default for Assigns {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "assigns_tests.rs"]
mod tests;
