// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Presence: per-topic keyed membership tracking (who's in this room, with
//! what metadata), used to render "N others online" style UI without a
//! separate application-level bookkeeping layer.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use tokio::sync::RwLock;

/// One presence entry: arbitrary metadata the joining session chooses to
/// publish (display name, cursor position, client version...).
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceMeta(pub Json);

/// The diff emitted when membership changes: who joined, who left, keyed by
/// presence key (typically a session or user id). Leaves carry the departing
/// member's last-known metadata (per the wire shape `{joins, leaves}`, both
/// keyed maps of `{metas: [...]}`), not a bare key list, so a client can
/// render "Alice left" without having cached her metadata itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceDiff {
    pub joins: BTreeMap<String, PresenceMeta>,
    pub leaves: BTreeMap<String, PresenceMeta>,
}

impl PresenceDiff {
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.leaves.is_empty()
    }
}

#[derive(Default)]
struct TopicState {
    members: BTreeMap<String, PresenceMeta>,
}

/// Tracks membership across every topic a process hosts. Single `RwLock`
/// over a `BTreeMap` keeps topic iteration deterministic; contention is low
/// since joins/leaves are comparatively rare next to render ticks.
#[derive(Default)]
pub struct PresenceRegistry {
    topics: RwLock<BTreeMap<String, TopicState>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` joining `topic` with `meta`, returning the diff to
    /// broadcast to existing members.
    pub async fn track(&self, topic: &str, key: &str, meta: Json) -> PresenceDiff {
        let mut topics = self.topics.write().await;
        let state = topics.entry(topic.to_owned()).or_default();
        state.members.insert(key.to_owned(), PresenceMeta(meta.clone()));
        PresenceDiff {
            joins: BTreeMap::from([(key.to_owned(), PresenceMeta(meta))]),
            leaves: BTreeMap::new(),
        }
    }

    /// Remove `key` from `topic`, returning the diff to broadcast. A no-op
    /// leave (key wasn't present) returns an empty diff.
    pub async fn untrack(&self, topic: &str, key: &str) -> PresenceDiff {
        let mut topics = self.topics.write().await;
        let Some(state) = topics.get_mut(topic) else {
            return PresenceDiff::default();
        };
        let Some(meta) = state.members.remove(key) else {
            return PresenceDiff::default();
        };
        if state.members.is_empty() {
            topics.remove(topic);
        }
        PresenceDiff { joins: BTreeMap::new(), leaves: BTreeMap::from([(key.to_owned(), meta)]) }
    }

    /// Replace `key`'s metadata within `topic`, re-announced as a join.
    pub async fn update(&self, topic: &str, key: &str, meta: Json) -> PresenceDiff {
        self.track(topic, key, meta).await
    }

    /// Full current membership snapshot for `topic`, keyed in sorted order.
    pub async fn list(&self, topic: &str) -> BTreeMap<String, PresenceMeta> {
        self.topics.read().await.get(topic).map(|s| s.members.clone()).unwrap_or_default()
    }

    /// Drop every member of `topic` at once (e.g. topic torn down), returning
    /// the leave diff for the members that were present.
    pub async fn clear_topic(&self, topic: &str) -> PresenceDiff {
        let mut topics = self.topics.write().await;
        match topics.remove(topic) {
            Some(state) => PresenceDiff { joins: BTreeMap::new(), leaves: state.members },
            None => PresenceDiff::default(),
        }
    }

    /// Compare `topic`'s current membership against a `prior` snapshot
    /// (typically one returned by an earlier [`list`](Self::list) call, e.g.
    /// on a remote node reconciling a full-state sync) and return the
    /// `{joins, leaves}` needed to bring a client caught up on `prior` to the
    /// present. A key present in both with unequal metadata counts as a join
    /// (re-announcing the new metadata), matching `track`/`update`'s
    /// join-shaped wire event for metadata replacement.
    pub async fn diff(&self, topic: &str, prior: &BTreeMap<String, PresenceMeta>) -> PresenceDiff {
        let current = self.list(topic).await;
        let mut out = PresenceDiff::default();
        for (key, meta) in &current {
            match prior.get(key) {
                Some(prev_meta) if prev_meta == meta => {}
                _ => {
                    out.joins.insert(key.clone(), meta.clone());
                }
            }
        }
        for (key, meta) in prior {
            if !current.contains_key(key) {
                out.leaves.insert(key.clone(), meta.clone());
            }
        }
        out
    }
}

/// Wire-shape serialization for a [`PresenceDiff`]: `{joins:{key:
/// {metas:[meta]}}, leaves:{key:{metas:[meta]}}}`, matching the
/// `presence_diff` event payload. Each key's `metas` is a one-element array
/// since this registry tracks a single metadata value per key rather than
/// Phoenix's multi-metadata-per-key (multiple tabs from the same user).
pub fn diff_to_wire(diff: &PresenceDiff) -> Json {
    fn side(entries: &BTreeMap<String, PresenceMeta>) -> Json {
        let mut map = serde_json::Map::new();
        for (key, meta) in entries {
            map.insert(key.clone(), serde_json::json!({"metas": [meta.0.clone()]}));
        }
        Json::Object(map)
    }
    serde_json::json!({"joins": side(&diff.joins), "leaves": side(&diff.leaves)})
}

#[cfg(test)]
#[path = "presence_tests.rs"]
mod tests;
