// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The diff engine: computes the minimal [`DiffPayload`] since a session's
//! last emit, either from a compiled template plus changed-field set (the
//! fast path) or by extracting `data-slot` subtrees from a freshly rendered
//! HTML buffer (the common, template-free path).

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::ast::{close_under_prefix, SlotId, TemplateAst};
use super::extract::extract_slots;
use super::list::{diff_list, CurrentItem, ListOp, PrevListState};
use crate::error::{Error, Result};

/// The minimal patch emitted to a client after a render tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffPayload {
    pub v: u64,
    #[serde(rename = "s", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub text_slots: BTreeMap<SlotId, String>,
    #[serde(rename = "h", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub html_slots: BTreeMap<SlotId, String>,
    #[serde(rename = "l", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub list_ops: BTreeMap<String, Vec<ListOp>>,
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    pub full: Option<String>,
}

impl DiffPayload {
    pub fn is_empty(&self) -> bool {
        self.text_slots.is_empty()
            && self.html_slots.is_empty()
            && self.list_ops.is_empty()
            && self.full.is_none()
    }
}

/// Per-session state the engine needs across render ticks: the last
/// observed template fingerprint, each slot's last-emitted content hash, and
/// the previous keyed-list state per list id.
#[derive(Debug, Default)]
pub struct DiffEngineState {
    fingerprint: Option<[u8; 32]>,
    slot_hashes: HashMap<SlotId, u64>,
    list_states: HashMap<String, PrevListState>,
    version: u64,
}

impl DiffEngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Set the version counter directly, e.g. to continue numbering after a
    /// recovery-token restore rather than starting a new session back at 0.
    /// Does not touch the fingerprint or slot-hash shadows: those stay
    /// empty, so the next render is computed as a full diff regardless of
    /// what the client last saw.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

/// How the current render tick's content is made available to the engine.
pub enum RenderInput<'a> {
    /// The component provides a template: diff by slot dependency.
    Template {
        ast: &'a TemplateAst,
        render_slot: &'a dyn Fn(&str) -> Result<String>,
    },
    /// The component renders a single HTML buffer: diff by slot extraction.
    ExtractHtml(&'a str),
}

/// Compute the diff for one render tick.
///
/// `changed_fields` is the tracker's already-cleared changed set for this
/// tick. `lists`, if the component provides a list, carries each list id's
/// current keyed items.
pub fn compute_diff(
    state: &mut DiffEngineState,
    changed_fields: &HashSet<String>,
    input: RenderInput<'_>,
    lists: &HashMap<String, Vec<CurrentItem>>,
) -> Result<Option<DiffPayload>> {
    let is_initial = state.slot_hashes.is_empty() && state.list_states.is_empty();

    if let RenderInput::Template { ast, .. } = &input {
        if state.fingerprint != Some(ast.fingerprint) {
            // Structural change: start from a fresh slot baseline.
            state.slot_hashes.clear();
            state.fingerprint = Some(ast.fingerprint);
        }
    }

    if changed_fields.is_empty() && !is_initial && lists.is_empty() {
        return Ok(None);
    }

    let mut payload = DiffPayload::default();
    let mut any_slots_found = true;

    match input {
        RenderInput::Template { ast, render_slot } => {
            render_template_diff(state, ast, changed_fields, render_slot, &mut payload)?;
        }
        RenderInput::ExtractHtml(html) => {
            any_slots_found = render_extract_diff(state, html, &mut payload);
        }
    }

    for (list_id, items) in lists {
        let prev = state.list_states.entry(list_id.clone()).or_default();
        let (ops, next) = diff_list(prev, items);
        if !ops.is_empty() {
            payload.list_ops.insert(list_id.clone(), ops);
        }
        *prev = next;
    }

    if !any_slots_found && payload.list_ops.is_empty() {
        if let RenderInput::ExtractHtml(html) = input {
            payload.full = Some(html.to_owned());
        }
    }

    state.version += 1;
    payload.v = state.version;

    if payload.is_empty() {
        Ok(None)
    } else {
        Ok(Some(payload))
    }
}

fn render_template_diff(
    state: &mut DiffEngineState,
    ast: &TemplateAst,
    changed_fields: &HashSet<String>,
    render_slot: &dyn Fn(&str) -> Result<String>,
    payload: &mut DiffPayload,
) -> Result<()> {
    let closed_changed = close_under_prefix(&changed_fields.iter().cloned().collect::<Vec<_>>());
    let slots = ast.slot_dependencies();

    let mut affected: Vec<SlotId> = slots
        .iter()
        .filter(|(_, deps)| deps.iter().any(|d| closed_changed.contains(d)))
        .map(|(id, _)| id.clone())
        .collect();

    if affected.is_empty() && state.slot_hashes.is_empty() {
        affected = slots.iter().map(|(id, _)| id.clone()).collect();
    }

    for slot_id in affected {
        let rendered = render_slot(&slot_id)
            .map_err(|e| Error::SlotRender { slot: slot_id.clone(), reason: e.to_string() })?;
        let hash = crate::hash::fnv64a(rendered.as_bytes());
        let changed = state.slot_hashes.get(&slot_id) != Some(&hash);
        state.slot_hashes.insert(slot_id.clone(), hash);
        if changed {
            if is_html(&rendered) {
                payload.html_slots.insert(slot_id, rendered);
            } else {
                payload.text_slots.insert(slot_id, rendered);
            }
        }
    }
    Ok(())
}

/// Returns whether any `data-slot` elements were found at all (independent
/// of whether their content actually changed this tick).
fn render_extract_diff(state: &mut DiffEngineState, html: &str, payload: &mut DiffPayload) -> bool {
    let slots = extract_slots(html);
    let found_any = !slots.is_empty();
    for slot in slots {
        let hash = crate::hash::fnv64a(slot.content.as_bytes());
        let changed = state.slot_hashes.get(&slot.id) != Some(&hash);
        state.slot_hashes.insert(slot.id.clone(), hash);
        if changed {
            if is_html(&slot.content) {
                payload.html_slots.insert(slot.id, slot.content);
            } else {
                payload.text_slots.insert(slot.id, slot.content);
            }
        }
    }
    found_any
}

/// Classify rendered content as HTML (contains tag delimiters) or plain
/// text, which drives the client's textContent-vs-innerHTML apply strategy.
fn is_html(content: &str) -> bool {
    content.contains('<') || content.contains('>')
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
