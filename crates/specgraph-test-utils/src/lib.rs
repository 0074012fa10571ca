//! Testing utilities for the SpecGraph workspace
//!
//! Shared fixtures for entities, sub-items and snapshots.

#![allow(missing_docs)]

use serde_json::{json, Value};
use specgraph_model::{Entity, EntityId, EntityKind, EntitySnapshot, Payload, SubItem, SubItemId, SubItemKind};

pub fn entity(kind: EntityKind, number: u32, slug: &str) -> Entity {
    Entity::new(kind, number, slug, slug).unwrap()
}

pub fn entity_id(s: &str) -> EntityId {
    s.parse().unwrap()
}

pub fn item_id(s: &str) -> SubItemId {
    s.parse().unwrap()
}

pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be a JSON object, got {other}"),
    }
}

pub fn task(number: u32) -> SubItem {
    SubItem::new(SubItemId::new(SubItemKind::Task, number))
}

pub fn task_depending_on(number: u32, deps: &[&str]) -> SubItem {
    task(number).with_field("depends_on", json!(deps))
}

pub fn criterion(number: u32) -> SubItem {
    SubItem::new(SubItemId::new(SubItemKind::Criterion, number))
}

pub fn test_case(number: u32, components: &[&str]) -> SubItem {
    SubItem::new(SubItemId::new(SubItemKind::TestCase, number)).with_field("components", json!(components))
}

pub fn plan_with(number: u32, slug: &str, items: impl IntoIterator<Item = SubItem>) -> Entity {
    items
        .into_iter()
        .fold(entity(EntityKind::Plan, number, slug), |plan, item| plan.with_item(item).unwrap())
}

pub fn requirement_with_criteria(number: u32, slug: &str, criteria: u32) -> Entity {
    (1..=criteria).fold(entity(EntityKind::Requirement, number, slug), |req, n| {
        req.with_item(criterion(n)).unwrap()
    })
}

pub fn component(number: u32, slug: &str, deps: &[&str]) -> Entity {
    entity(EntityKind::Component, number, slug).with_field("depends_on", json!(deps))
}

/// Components `cmp-001-n1 .. cmp-{k}-n{k}` where each depends on the next and the last on the first
pub fn component_ring(k: u32) -> Vec<Entity> {
    (1..=k)
        .map(|n| {
            let next = n % k + 1;
            let dep = format!("cmp-{next:03}-n{next}");
            component(n, &format!("n{n}"), &[dep.as_str()])
        })
        .collect()
}

/// Components forming a chain `n1 -> n2 -> ... -> nk`
pub fn component_chain(k: u32) -> Vec<Entity> {
    (1..=k)
        .map(|n| {
            if n == k {
                component(n, &format!("n{n}"), &[])
            } else {
                let dep = format!("cmp-{:03}-n{}", n + 1, n + 1);
                component(n, &format!("n{n}"), &[dep.as_str()])
            }
        })
        .collect()
}

/// Plan `pln-001-auth` with `task-002 -> task-001` and `task-003 -> task-001, task-002`
pub fn task_scenario() -> EntitySnapshot {
    EntitySnapshot::from_entities([plan_with(
        1,
        "auth",
        [
            task(1).with_field("title", "Schema"),
            task_depending_on(2, &["task-001"]),
            task_depending_on(3, &["task-001", "task-002"]),
        ],
    )])
}

/// Requirement with three criteria and a plan implementing `crit-002`
pub fn criterion_scenario() -> EntitySnapshot {
    let plan = entity(EntityKind::Plan, 1, "login-flow").with_field("criteria_id", "req-001-login/crit-002");
    EntitySnapshot::from_entities([requirement_with_criteria(1, "login", 3), plan])
}

pub fn snapshot(entities: impl IntoIterator<Item = Entity>) -> EntitySnapshot {
    EntitySnapshot::from_entities(entities)
}

pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}
