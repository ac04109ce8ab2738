// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The hybrid diff engine: template-driven and extraction-driven slot
//! diffing, keyed list diffing, and the per-session state that ties them
//! together across render ticks.

pub mod ast;
pub mod engine;
pub mod extract;
pub mod list;

pub use ast::{Node, SlotId, TemplateAst, TemplateCache};
pub use engine::{compute_diff, DiffEngineState, DiffPayload, RenderInput};
pub use extract::{extract_slots, ExtractedSlot};
pub use list::{diff_list, CurrentItem, ListOp, PrevListState};
