// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn new_field_counts_as_changed() {
    let assigns = Assigns::new();
    assigns.set("count", 0i64).await;
    let changed = assigns.changed_and_clear().await;
    assert!(changed.contains("count"));
}

#[tokio::test]
async fn second_call_with_no_writes_is_empty() {
    let assigns = Assigns::new();
    assigns.set("count", 0i64).await;
    let _ = assigns.changed_and_clear().await;
    let changed = assigns.changed_and_clear().await;
    assert!(changed.is_empty());
}

#[tokio::test]
async fn unchanged_value_rewrite_is_not_reported() {
    let assigns = Assigns::new();
    assigns.set("count", 1i64).await;
    let _ = assigns.changed_and_clear().await;
    assigns.set("count", 1i64).await;
    let changed = assigns.changed_and_clear().await;
    assert!(changed.is_empty());
}

#[tokio::test]
async fn changed_value_is_reported_exactly_once() {
    let assigns = Assigns::new();
    assigns.set("count", 1i64).await;
    let _ = assigns.changed_and_clear().await;
    assigns.set("count", 2i64).await;
    assigns.set("count", 2i64).await;
    let changed = assigns.changed_and_clear().await;
    assert_eq!(changed.len(), 1);
    assert!(changed.contains("count"));
}

#[tokio::test]
async fn delete_marks_changed() {
    let assigns = Assigns::new();
    assigns.set("count", 1i64).await;
    let _ = assigns.changed_and_clear().await;
    assigns.delete("count").await;
    let changed = assigns.changed_and_clear().await;
    assert!(changed.contains("count"));
    assert_eq!(assigns.get("count").await, None);
}

#[tokio::test]
async fn mark_changed_forces_report_without_value_change() {
    let assigns = Assigns::new();
    assigns.set("items", Value::Seq(vec![Value::Int(1)])).await;
    let _ = assigns.changed_and_clear().await;
    // Caller mutated a nested container in place, bypassing `set`.
    assigns.mark_changed("items").await;
    let changed = assigns.changed_and_clear().await;
    assert!(changed.contains("items"));
}

#[tokio::test]
async fn version_increments_once_per_clear_regardless_of_changes() {
    let assigns = Assigns::new();
    assert_eq!(assigns.version().await, 0);
    let _ = assigns.changed_and_clear().await;
    assert_eq!(assigns.version().await, 1);
    let _ = assigns.changed_and_clear().await;
    assert_eq!(assigns.version().await, 2);
}

#[tokio::test]
async fn clone_deep_is_independent() {
    let assigns = Assigns::new();
    assigns.set("nested", Value::Map(BTreeMap::from([("a".to_owned(), Value::Int(1))]))).await;
    let clone = assigns.clone_deep().await;
    clone.set("other", 9i64).await;
    assert_eq!(assigns.get("other").await, None);
    assert_eq!(clone.get("nested").await, assigns.get("nested").await);
}

#[tokio::test]
async fn restore_replaces_bag_and_marks_all_changed() {
    let assigns = Assigns::new();
    assigns.set("a", 1i64).await;
    let _ = assigns.changed_and_clear().await;

    let mut fresh = BTreeMap::new();
    fresh.insert("b".to_owned(), Value::Int(2));
    assigns.restore(fresh).await;

    assert_eq!(assigns.get("a").await, None);
    assert_eq!(assigns.get("b").await, Some(Value::Int(2)));
    let changed = assigns.changed_and_clear().await;
    assert!(changed.contains("b"));
}

#[test]
fn map_hash_is_order_independent() {
    let mut a = BTreeMap::new();
    a.insert("x".to_owned(), Value::Int(1));
    a.insert("y".to_owned(), Value::Int(2));
    let mut b = BTreeMap::new();
    b.insert("y".to_owned(), Value::Int(2));
    b.insert("x".to_owned(), Value::Int(1));
    assert_eq!(Value::Map(a).content_hash(), Value::Map(b).content_hash());
}

#[test]
fn distinct_types_with_similar_bytes_do_not_collide() {
    assert_ne!(Value::Int(0).content_hash(), Value::Bool(false).content_hash());
    assert_ne!(Value::Str("0".to_owned()).content_hash(), Value::Int(0).content_hash());
    assert_ne!(Value::Null.content_hash(), Value::Bool(false).content_hash());
}

#[test]
fn seq_hash_is_order_dependent() {
    let a = Value::Seq(vec![Value::Int(1), Value::Int(2)]);
    let b = Value::Seq(vec![Value::Int(2), Value::Int(1)]);
    assert_ne!(a.content_hash(), b.content_hash());
}
