// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;

use super::*;
use crate::diff::ast::Node;

fn changed(fields: &[&str]) -> HashSet<String> {
    fields.iter().map(|s| s.to_string()).collect()
}

#[test]
fn spec_counter_increment_scenario() {
    // <div><span data-slot="s0">0</span></div>, count goes 0 -> 1.
    let mut state = DiffEngineState::new();
    let html_v1 = r#"<div><span data-slot="s0">0</span></div>"#;
    let payload = compute_diff(
        &mut state,
        &changed(&["count"]),
        RenderInput::ExtractHtml(html_v1),
        &HashMap::new(),
    )
    .expect("diff ok")
    .expect("initial render is non-empty");
    assert_eq!(payload.v, 1);
    assert_eq!(payload.text_slots.get("s0"), Some(&"0".to_owned()));

    let html_v2 = r#"<div><span data-slot="s0">1</span></div>"#;
    let payload = compute_diff(
        &mut state,
        &changed(&["count"]),
        RenderInput::ExtractHtml(html_v2),
        &HashMap::new(),
    )
    .expect("diff ok")
    .expect("changed slot is non-empty");
    assert_eq!(payload.v, 2);
    assert_eq!(payload.text_slots.get("s0"), Some(&"1".to_owned()));
    assert!(payload.full.is_none());
}

#[test]
fn no_changed_fields_and_populated_state_returns_none() {
    let mut state = DiffEngineState::new();
    let html = r#"<div><span data-slot="s0">0</span></div>"#;
    let _ = compute_diff(&mut state, &changed(&["count"]), RenderInput::ExtractHtml(html), &HashMap::new())
        .unwrap();

    let result =
        compute_diff(&mut state, &HashSet::new(), RenderInput::ExtractHtml(html), &HashMap::new())
            .unwrap();
    assert!(result.is_none());
}

#[test]
fn unchanged_slot_content_is_not_retransmitted() {
    let mut state = DiffEngineState::new();
    let html = r#"<div><span data-slot="s0">0</span><span data-slot="s1">x</span></div>"#;
    let _ = compute_diff(&mut state, &changed(&["a", "b"]), RenderInput::ExtractHtml(html), &HashMap::new())
        .unwrap();

    // Only s0's content changes; s1 stays "x".
    let html2 = r#"<div><span data-slot="s0">1</span><span data-slot="s1">x</span></div>"#;
    let payload = compute_diff(&mut state, &changed(&["a"]), RenderInput::ExtractHtml(html2), &HashMap::new())
        .unwrap()
        .expect("s0 changed");
    assert_eq!(payload.text_slots.len(), 1);
    assert!(payload.text_slots.contains_key("s0"));
    assert!(!payload.text_slots.contains_key("s1"));
}

#[test]
fn html_content_is_classified_as_html_slot() {
    let mut state = DiffEngineState::new();
    let html = r#"<div data-slot="s0"><b>bold</b></div>"#;
    let payload =
        compute_diff(&mut state, &changed(&["x"]), RenderInput::ExtractHtml(html), &HashMap::new())
            .unwrap()
            .unwrap();
    assert!(payload.html_slots.contains_key("s0"));
    assert!(!payload.text_slots.contains_key("s0"));
}

#[test]
fn no_slots_at_all_falls_back_to_full_render() {
    let mut state = DiffEngineState::new();
    let html = "<div>plain, no slots</div>";
    let payload =
        compute_diff(&mut state, &changed(&["x"]), RenderInput::ExtractHtml(html), &HashMap::new())
            .unwrap()
            .unwrap();
    assert_eq!(payload.full.as_deref(), Some(html));
    assert!(payload.text_slots.is_empty());
    assert!(payload.html_slots.is_empty());
}

#[test]
fn version_is_strictly_increasing_and_contiguous_across_emits() {
    let mut state = DiffEngineState::new();
    let mut versions = Vec::new();
    for i in 0..3 {
        let html = format!(r#"<span data-slot="s0">{i}</span>"#);
        let payload =
            compute_diff(&mut state, &changed(&["n"]), RenderInput::ExtractHtml(&html), &HashMap::new())
                .unwrap()
                .unwrap();
        versions.push(payload.v);
    }
    assert_eq!(versions, vec![1, 2, 3]);
}

#[test]
fn template_path_only_renders_affected_slots() {
    let mut state = DiffEngineState::new();
    let ast = TemplateAst::new(vec![
        Node::Dynamic { id: "s0".into(), expr: "count".into(), deps: vec!["count".into()] },
        Node::Dynamic { id: "s1".into(), expr: "name".into(), deps: vec!["name".into()] },
    ]);

    let mut rendered_slots: Vec<String> = Vec::new();
    let render_slot = |id: &str| -> Result<String> {
        Ok(match id {
            "s0" => "1".to_owned(),
            "s1" => "alice".to_owned(),
            other => other.to_owned(),
        })
    };

    // Initial render: both slots affected (slot map empty).
    let payload = compute_diff(
        &mut state,
        &changed(&["count"]),
        RenderInput::Template { ast: &ast, render_slot: &render_slot },
        &HashMap::new(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(payload.text_slots.len(), 2);
    rendered_slots.clear();

    // Second tick: only "count" changed, so only s0 should be touched, and
    // since s1's content is identical it wouldn't appear anyway, but we
    // assert s0 is present and reflects the new value.
    let payload = compute_diff(
        &mut state,
        &changed(&["count"]),
        RenderInput::Template { ast: &ast, render_slot: &render_slot },
        &HashMap::new(),
    )
    .unwrap();
    // Same render_slot always returns "1" for s0, so no hash change -> None.
    assert!(payload.is_none());
}

#[test]
fn structural_change_clears_slot_baseline() {
    let mut state = DiffEngineState::new();
    let ast_v1 = TemplateAst::new(vec![Node::Static("<div>".into())]);
    let render_slot = |_: &str| -> Result<String> { Ok(String::new()) };
    let _ = compute_diff(
        &mut state,
        &changed(&["x"]),
        RenderInput::Template { ast: &ast_v1, render_slot: &render_slot },
        &HashMap::new(),
    );

    let ast_v2 = TemplateAst::new(vec![
        Node::Dynamic { id: "s0".into(), expr: "x".into(), deps: vec!["x".into()] },
    ]);
    // Even with an empty changed set, the fingerprint change alone should
    // force a fresh initial-style render (affected = all slots).
    let payload = compute_diff(
        &mut state,
        &HashSet::new(),
        RenderInput::Template { ast: &ast_v2, render_slot: &render_slot },
        &HashMap::new(),
    )
    .unwrap();
    assert!(payload.is_some());
}

#[test]
fn list_diff_is_included_in_payload() {
    let mut state = DiffEngineState::new();
    let lists = HashMap::from([(
        "todos".to_owned(),
        vec![
            CurrentItem { key: "a".into(), content: "<li>a</li>".into() },
            CurrentItem { key: "b".into(), content: "<li>b</li>".into() },
        ],
    )]);
    let payload = compute_diff(&mut state, &changed(&["todos"]), RenderInput::ExtractHtml("<ul></ul>"), &lists)
        .unwrap()
        .unwrap();
    assert_eq!(payload.list_ops.get("todos").map(Vec::len), Some(2));
}
