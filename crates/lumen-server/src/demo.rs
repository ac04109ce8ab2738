// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A small stock component shipped with the binary so a fresh checkout has
//! something to mount at `/live/counter` without writing a component first.
//! Grounded in the assigns bag (`lumen_core::assigns::Assigns`) rather than
//! hand-rolled atomics, the way a real component is expected to track state.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value as Json;

use lumen_core::{Assigns, Result, Value};

use crate::component::{AssignsSnapshot, Component, MountContext, TerminateReason};

/// Mounts with `count: 0`; `increment`/`decrement` step it by one, `reset`
/// zeroes it. Renders a single `data-slot="s0"` span, the extraction diff
/// path's minimal case.
pub struct CounterComponent {
    assigns: Assigns,
}

impl CounterComponent {
    pub fn new() -> Self {
        Self { assigns: Assigns::new() }
    }

    async fn count(&self) -> i64 {
        match self.assigns.get("count").await {
            Some(Value::Int(n)) => n,
            _ => 0,
        }
    }
}

impl Default for CounterComponent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Component for CounterComponent {
    fn name(&self) -> &str {
        "counter"
    }

    async fn mount(&mut self, _ctx: &MountContext) -> Result<()> {
        self.assigns.set("count", 0i64).await;
        Ok(())
    }

    async fn render(&self) -> Result<String> {
        Ok(format!("<div><span data-slot=\"s0\">{}</span></div>", self.count().await))
    }

    async fn handle_event(&mut self, event: &str, _payload: Option<&Json>) -> Result<()> {
        match event {
            "increment" => {
                let next = self.count().await + 1;
                self.assigns.set("count", next).await;
            }
            "decrement" => {
                let next = self.count().await - 1;
                self.assigns.set("count", next).await;
            }
            "reset" => {
                self.assigns.set("count", 0i64).await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn handle_info(&mut self, _message: &Json) -> Result<()> {
        Ok(())
    }

    async fn changed_fields(&self) -> HashSet<String> {
        self.assigns.changed_and_clear().await
    }

    async fn assigns_snapshot(&self) -> AssignsSnapshot {
        self.assigns.data().await
    }

    async fn restore_assigns(&mut self, snapshot: AssignsSnapshot) {
        self.assigns.restore(snapshot).await;
    }

    async fn terminate(&mut self, _reason: TerminateReason) {}
}
