// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The component trait: the six operations a server-resident view instance
//! implements, plus the two capability extensions the runtime probes for at
//! registration time rather than per-render.

use std::collections::{BTreeMap, HashSet};

use lumen_core::diff::{CurrentItem, TemplateAst};
use lumen_core::{Result, Value};
use serde_json::Value as Json;

/// Why a component's session ended, passed to `terminate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// The client sent `phx_leave`.
    Normal,
    /// The server is draining for shutdown.
    Shutdown,
    /// An unrecoverable handler failure.
    Error,
    /// The session was idle past its TTL.
    Timeout,
}

/// The inbound params and session bag a component mounts with: URL params
/// captured by the upgrade endpoint, and cookie-derived session state.
#[derive(Debug, Clone, Default)]
pub struct MountContext {
    pub params: BTreeMap<String, String>,
    pub session_bag: BTreeMap<String, String>,
}

/// A server-resident, stateful view instance. Exclusively owned by one
/// session; its lifetime equals that session's.
#[async_trait::async_trait]
pub trait Component: Send + Sync {
    /// Stable name used in recovery tokens and logging.
    fn name(&self) -> &str;

    async fn mount(&mut self, ctx: &MountContext) -> Result<()>;

    /// Render the component's current state into a single HTML buffer.
    async fn render(&self) -> Result<String>;

    async fn handle_event(&mut self, event: &str, payload: Option<&Json>) -> Result<()>;

    /// Out-of-band message delivered via pub/sub addressed to this session.
    async fn handle_info(&mut self, message: &Json) -> Result<()>;

    /// Fields whose value changed since the last call, clearing the
    /// component's internal change set. The runtime feeds this directly
    /// into the diff engine's `changed_fields` input.
    async fn changed_fields(&self) -> HashSet<String>;

    /// Deep snapshot of the component's assigns, used by recovery-token
    /// serialization.
    async fn assigns_snapshot(&self) -> AssignsSnapshot;

    /// Replace assigns wholesale and mark every field changed, used when
    /// restoring from a recovery token before the next mount.
    async fn restore_assigns(&mut self, snapshot: AssignsSnapshot);

    async fn terminate(&mut self, reason: TerminateReason);

    /// Probed once per render tick by the session runtime. `None` (the
    /// default) routes the component through the extract-and-compare diff
    /// path; components that want the faster slot-dependency path override
    /// this to hand back their compiled template.
    fn as_template_provider(&self) -> Option<&dyn TemplateProvider> {
        None
    }

    /// Probed once per render tick alongside [`Self::as_template_provider`].
    /// `None` (the default) means the component has no keyed lists to diff.
    fn as_list_provider(&self) -> Option<&dyn ListProvider> {
        None
    }
}

/// Capability extension: a component that can hand the diff engine its
/// static template source, enabling the fast slot-dependency diff path
/// instead of HTML extraction.
pub trait TemplateProvider {
    fn template_source(&self) -> &str;
    fn compiled_template(&self) -> &TemplateAst;
}

/// Capability extension: a component that exposes one or more keyed lists
/// for granular list diffing.
pub trait ListProvider {
    /// Current items for `list_id`, in desired render order.
    fn list_items(&self, list_id: &str) -> Vec<CurrentItem>;
    /// Every list id this component provides.
    fn list_ids(&self) -> Vec<String>;
}

/// A snapshot of a component's assigns, used by recovery-token restoration.
pub type AssignsSnapshot = BTreeMap<String, Value>;
