// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template AST: the compile-time structure a component's template source
//! is reduced to, used to drive the fast (slot-dependency) diff path.

use std::collections::{BTreeSet, HashMap};

use ring::digest::{digest, SHA256};

/// A slot identifier, assigned in document order: `s0`, `s1`, ...
pub type SlotId = String;

/// One node of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Literal bytes that never change.
    Static(String),
    /// A single dynamic value substitution.
    Dynamic { id: SlotId, expr: String, deps: Vec<String> },
    /// A keyed loop over a collection field.
    Loop { id: SlotId, collection: String, key_expr: String, body: Vec<Node> },
    /// A conditional with a then/else sub-tree.
    Conditional { id: SlotId, cond: String, then_branch: Vec<Node>, else_branch: Vec<Node> },
}

/// A compiled template: an ordered node sequence plus its structural
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAst {
    pub nodes: Vec<Node>,
    pub fingerprint: [u8; 32],
}

impl TemplateAst {
    /// Build an AST from an already-parsed node list, computing the
    /// fingerprint over static content and per-dynamic-node placeholder
    /// sentinels (never over dynamic *values*, so two renders of the same
    /// structure always fingerprint equal).
    pub fn new(nodes: Vec<Node>) -> Self {
        let fingerprint = fingerprint_nodes(&nodes);
        Self { nodes, fingerprint }
    }

    /// Enumerate every slot id appearing anywhere in the tree, in document
    /// order, with its closed-under-prefix dependency set.
    pub fn slot_dependencies(&self) -> Vec<(SlotId, BTreeSet<String>)> {
        let mut out = Vec::new();
        collect_slots(&self.nodes, &mut out);
        out
    }
}

fn collect_slots(nodes: &[Node], out: &mut Vec<(SlotId, BTreeSet<String>)>) {
    for node in nodes {
        match node {
            Node::Static(_) => {}
            Node::Dynamic { id, deps, .. } => {
                out.push((id.clone(), close_under_prefix(deps)));
            }
            Node::Loop { id, collection, body, .. } => {
                out.push((id.clone(), close_under_prefix(&[collection.clone()])));
                collect_slots(body, out);
            }
            Node::Conditional { id, cond, then_branch, else_branch, .. } => {
                out.push((id.clone(), close_under_prefix(&[cond.clone()])));
                collect_slots(then_branch, out);
                collect_slots(else_branch, out);
            }
        }
    }
}

/// Close a dependency set under prefix ancestry: a field `user.name` implies
/// a dependency on `user` too, so a change to the whole `user` map is caught
/// even when only the leaf field name was declared.
pub fn close_under_prefix(fields: &[String]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for field in fields {
        out.insert(field.clone());
        let mut remaining = field.as_str();
        while let Some((prefix, _)) = remaining.rsplit_once('.') {
            out.insert(prefix.to_owned());
            remaining = prefix;
        }
    }
    out
}

const DYNAMIC_PLACEHOLDER: &[u8] = b"\0dyn\0";

fn fingerprint_nodes(nodes: &[Node]) -> [u8; 32] {
    let mut buf = Vec::new();
    write_fingerprint_bytes(nodes, &mut buf);
    let hash = digest(&SHA256, &buf);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_ref());
    out
}

fn write_fingerprint_bytes(nodes: &[Node], buf: &mut Vec<u8>) {
    for node in nodes {
        match node {
            Node::Static(text) => buf.extend_from_slice(text.as_bytes()),
            Node::Dynamic { .. } => buf.extend_from_slice(DYNAMIC_PLACEHOLDER),
            Node::Loop { body, .. } => {
                buf.extend_from_slice(DYNAMIC_PLACEHOLDER);
                write_fingerprint_bytes(body, buf);
            }
            Node::Conditional { then_branch, else_branch, .. } => {
                buf.extend_from_slice(DYNAMIC_PLACEHOLDER);
                write_fingerprint_bytes(then_branch, buf);
                write_fingerprint_bytes(else_branch, buf);
            }
        }
    }
}

/// Compiles template source strings into [`TemplateAst`]s, caching by the
/// source text's content hash so repeated renders of the same component
/// don't re-parse on every tick.
#[derive(Default)]
pub struct TemplateCache {
    cache: HashMap<u64, TemplateAst>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile (or fetch the cached compilation of) `source`, using `parse`
    /// to actually produce nodes on a cache miss. The cache key is the
    /// source text's FNV hash, standing in for "source identity".
    pub fn compile(
        &mut self,
        source: &str,
        parse: impl FnOnce(&str) -> Vec<Node>,
    ) -> TemplateAst {
        let key = crate::hash::fnv64a(source.as_bytes());
        if let Some(ast) = self.cache.get(&key) {
            return ast.clone();
        }
        let ast = TemplateAst::new(parse(source));
        self.cache.insert(key, ast.clone());
        ast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_structure_same_fingerprint() {
        let a = TemplateAst::new(vec![
            Node::Static("<div>".to_owned()),
            Node::Dynamic { id: "s0".into(), expr: "count".into(), deps: vec!["count".into()] },
            Node::Static("</div>".to_owned()),
        ]);
        let b = TemplateAst::new(vec![
            Node::Static("<div>".to_owned()),
            Node::Dynamic { id: "s0".into(), expr: "count".into(), deps: vec!["count".into()] },
            Node::Static("</div>".to_owned()),
        ]);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn different_static_text_changes_fingerprint() {
        let a = TemplateAst::new(vec![Node::Static("<div>".to_owned())]);
        let b = TemplateAst::new(vec![Node::Static("<span>".to_owned())]);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn dependency_set_is_closed_under_prefix() {
        let deps = close_under_prefix(&["user.profile.name".to_owned()]);
        assert!(deps.contains("user.profile.name"));
        assert!(deps.contains("user.profile"));
        assert!(deps.contains("user"));
    }

    #[test]
    fn slot_ids_enumerate_in_document_order() {
        let ast = TemplateAst::new(vec![
            Node::Dynamic { id: "s0".into(), expr: "a".into(), deps: vec!["a".into()] },
            Node::Dynamic { id: "s1".into(), expr: "b".into(), deps: vec!["b".into()] },
        ]);
        let ids: Vec<_> = ast.slot_dependencies().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["s0".to_owned(), "s1".to_owned()]);
    }
}
