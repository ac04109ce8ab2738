// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component registry: maps the `{name}` path segment of an upgrade request
//! to a factory that builds a fresh component instance per session. A plain
//! `HashMap` keyed by name rather than a `Router`-style matcher, since
//! `{name}` is a single opaque segment, not a path pattern.

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::Component;

pub type ComponentFactory = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: HashMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Build a fresh component for `name`, or `None` if no factory is
    /// registered under it — the HTTP layer turns that into a 404.
    pub fn build(&self, name: &str) -> Option<Box<dyn Component>> {
        self.factories.get(name).map(|factory| factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::CounterComponent;

    #[test]
    fn build_returns_a_fresh_instance_per_call() {
        let mut registry = ComponentRegistry::new();
        registry.register("counter", || Box::new(CounterComponent::new()));
        assert!(registry.build("counter").is_some());
        assert!(registry.build("missing").is_none());
    }
}
