// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed list diffing: given the previous and current keyed item lists for a
//! `list_provider` component, compute the minimal ordered op sequence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single list mutation, matching the wire shape in `DiffPayload.l`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "o", rename_all = "lowercase")]
pub enum ListOp {
    #[serde(rename = "i")]
    Insert { k: String, i: usize, c: String },
    #[serde(rename = "d")]
    Delete { k: String },
    #[serde(rename = "u")]
    Update { k: String, c: String },
    #[serde(rename = "m")]
    Move { k: String, i: usize },
}

/// The previous render's list state: key order plus a content hash per key,
/// enough to detect updates without retaining full rendered content.
#[derive(Debug, Clone, Default)]
pub struct PrevListState {
    pub order: Vec<String>,
    pub hashes: HashMap<String, u64>,
}

/// The current render's list items: key, rendered content, in desired order.
pub struct CurrentItem {
    pub key: String,
    pub content: String,
}

/// Compute the deterministic op sequence to turn `prev` into `current`:
/// deletes first, then inserts/updates in current-list order, then moves
/// (only for items whose order changed and that needed no other op).
pub fn diff_list(prev: &PrevListState, current: &[CurrentItem]) -> (Vec<ListOp>, PrevListState) {
    let current_keys: Vec<&str> = current.iter().map(|item| item.key.as_str()).collect();
    let current_index: HashMap<&str, usize> =
        current_keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    let mut ops = Vec::new();

    // 1. Deletes: keys present before, absent now.
    for key in &prev.order {
        if !current_index.contains_key(key.as_str()) {
            ops.push(ListOp::Delete { k: key.clone() });
        }
    }

    let mut content_hash = |content: &str| crate::hash::fnv64a(content.as_bytes());

    // 2. Inserts and updates, in current-list order.
    let mut moved_candidates: Vec<(String, usize)> = Vec::new();
    for (idx, item) in current.iter().enumerate() {
        match prev.hashes.get(&item.key) {
            None => {
                ops.push(ListOp::Insert { k: item.key.clone(), i: idx, c: item.content.clone() });
            }
            Some(&prev_hash) => {
                let hash = content_hash(&item.content);
                if hash != prev_hash {
                    ops.push(ListOp::Update { k: item.key.clone(), c: item.content.clone() });
                } else {
                    moved_candidates.push((item.key.clone(), idx));
                }
            }
        }
    }

    // 3. Moves: only for keys that needed no other op and whose position
    // relative to the previous order actually changed.
    let prev_order_filtered: Vec<&str> = prev
        .order
        .iter()
        .map(String::as_str)
        .filter(|k| current_index.contains_key(k))
        .collect();
    // Relative order among unchanged (non-inserted/updated) keys only.
    let unchanged_keys: Vec<&str> = moved_candidates.iter().map(|(k, _)| k.as_str()).collect();
    let prev_relative: Vec<&str> = prev_order_filtered
        .iter()
        .copied()
        .filter(|k| unchanged_keys.contains(k))
        .collect();
    let current_relative: Vec<&str> = current_keys
        .iter()
        .copied()
        .filter(|k| unchanged_keys.contains(k))
        .collect();

    if prev_relative != current_relative {
        for (key, idx) in &moved_candidates {
            ops.push(ListOp::Move { k: key.clone(), i: *idx });
        }
    }

    let next_state = PrevListState {
        order: current_keys.iter().map(|k| k.to_string()).collect(),
        hashes: current
            .iter()
            .map(|item| (item.key.clone(), content_hash(&item.content)))
            .collect(),
    };

    (ops, next_state)
}
