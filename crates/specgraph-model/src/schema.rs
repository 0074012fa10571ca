//! Reference field descriptors
//!
//! Every field that names another entity or sub-item is declared once in
//! [`REFERENCE_FIELDS`]. Graph building, validation and the supersession
//! rewrite all walk this table generically instead of inspecting payloads
//! field by field.
//!
//! ```text
//! owner        field                 target        scope    edge
//! plan         depends_on            plan          global   depends_on
//! plan         criteria_id           criterion     global   implements
//! task         depends_on            task          sibling  depends_on
//! flow         steps[].next_steps    flow step     local    next_step
//! ```

use crate::entity::Payload;
use crate::kind::{EntityKind, NodeKind, SubItemKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Node type that declares a reference field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Field on an entity payload
    Entity(EntityKind),
    /// Field on a sub-item payload
    SubItem(SubItemKind),
}

/// Node type a reference field points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "target", content = "kind")]
pub enum RefTarget {
    /// An entity of the given kind
    Entity(EntityKind),
    /// A sub-item of the given kind
    SubItem(SubItemKind),
    /// A step of the owning flow
    FlowStep,
}

impl RefTarget {
    /// Whether a node of `kind` satisfies this target
    #[must_use]
    pub fn accepts(self, kind: NodeKind) -> bool {
        match (self, kind) {
            (Self::Entity(want), NodeKind::Entity(have)) => want == have,
            (Self::SubItem(want), NodeKind::SubItem(have)) => want == have,
            (Self::FlowStep, NodeKind::FlowStep) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(kind) => write!(f, "{kind}"),
            Self::SubItem(kind) => write!(f, "{kind}"),
            Self::FlowStep => f.write_str("flow_step"),
        }
    }
}

/// How a reference value is resolved to a node key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefScope {
    /// Full entity ID, or `{entity-id}/{sub-item-id}` for sub-item targets
    Global,
    /// Bare sub-item ID inside the owner's parent entity
    Sibling,
    /// Bare step ID inside the owning flow
    Local,
}

/// Relationship expressed by a reference field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Source cannot start before target
    DependsOn,
    /// Source is blocked by target
    BlockedBy,
    /// Plan implements a requirement criterion
    Implements,
    /// Plan is scheduled into a milestone
    TargetsMilestone,
    /// Decision affects an entity
    Affects,
    /// Test case verifies a component
    Verifies,
    /// API contract uses a data model
    Uses,
    /// Flow step transitions to another step
    NextStep,
}

impl EdgeKind {
    /// Dependency edges must stay acyclic under engine mutations
    #[inline]
    #[must_use]
    pub const fn is_dependency(self) -> bool {
        matches!(self, Self::DependsOn | Self::BlockedBy)
    }

    /// Snake-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DependsOn => "depends_on",
            Self::BlockedBy => "blocked_by",
            Self::Implements => "implements",
            Self::TargetsMilestone => "targets_milestone",
            Self::Affects => "affects",
            Self::Verifies => "verifies",
            Self::Uses => "uses",
            Self::NextStep => "next_step",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one reference field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefField {
    /// Declaring node type
    pub owner: Owner,
    /// Payload field name
    pub field: &'static str,
    /// For array-of-object fields, the reference field inside each element
    pub nested: Option<&'static str>,
    /// Expected target type
    pub target: RefTarget,
    /// Resolution scope of the stored values
    pub scope: RefScope,
    /// Relationship kind
    pub edge: EdgeKind,
}

/// A single reference value found while walking a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefSite<'a> {
    /// `id` of the nested element holding the value, for nested fields
    pub element: Option<&'a str>,
    /// Raw reference value
    pub value: &'a str,
}

const fn global(owner: Owner, field: &'static str, target: RefTarget, edge: EdgeKind) -> RefField {
    RefField {
        owner,
        field,
        nested: None,
        target,
        scope: RefScope::Global,
        edge,
    }
}

const fn sibling(kind: SubItemKind, field: &'static str, target: SubItemKind, edge: EdgeKind) -> RefField {
    RefField {
        owner: Owner::SubItem(kind),
        field,
        nested: None,
        target: RefTarget::SubItem(target),
        scope: RefScope::Sibling,
        edge,
    }
}

/// Every reference field known to the engine
pub const REFERENCE_FIELDS: &[RefField] = &[
    global(
        Owner::Entity(EntityKind::Plan),
        "depends_on",
        RefTarget::Entity(EntityKind::Plan),
        EdgeKind::DependsOn,
    ),
    global(
        Owner::Entity(EntityKind::Plan),
        "criteria_id",
        RefTarget::SubItem(SubItemKind::Criterion),
        EdgeKind::Implements,
    ),
    global(
        Owner::Entity(EntityKind::Plan),
        "milestones",
        RefTarget::Entity(EntityKind::Milestone),
        EdgeKind::TargetsMilestone,
    ),
    global(
        Owner::Entity(EntityKind::Component),
        "depends_on",
        RefTarget::Entity(EntityKind::Component),
        EdgeKind::DependsOn,
    ),
    global(
        Owner::Entity(EntityKind::Milestone),
        "depends_on",
        RefTarget::Entity(EntityKind::Milestone),
        EdgeKind::DependsOn,
    ),
    global(
        Owner::Entity(EntityKind::Decision),
        "affects_requirements",
        RefTarget::Entity(EntityKind::Requirement),
        EdgeKind::Affects,
    ),
    global(
        Owner::Entity(EntityKind::Decision),
        "affects_components",
        RefTarget::Entity(EntityKind::Component),
        EdgeKind::Affects,
    ),
    global(
        Owner::Entity(EntityKind::Decision),
        "affects_plans",
        RefTarget::Entity(EntityKind::Plan),
        EdgeKind::Affects,
    ),
    sibling(SubItemKind::Task, "depends_on", SubItemKind::Task, EdgeKind::DependsOn),
    sibling(SubItemKind::Task, "blocked_by", SubItemKind::Task, EdgeKind::BlockedBy),
    global(
        Owner::SubItem(SubItemKind::TestCase),
        "components",
        RefTarget::Entity(EntityKind::Component),
        EdgeKind::Verifies,
    ),
    sibling(
        SubItemKind::ApiContract,
        "data_models",
        SubItemKind::DataModel,
        EdgeKind::Uses,
    ),
    RefField {
        owner: Owner::SubItem(SubItemKind::Flow),
        field: "steps",
        nested: Some("next_steps"),
        target: RefTarget::FlowStep,
        scope: RefScope::Local,
        edge: EdgeKind::NextStep,
    },
];

/// Array field of a flow whose elements become flow-step nodes
pub const FLOW_STEPS_FIELD: &str = "steps";

/// Reference fields declared by an owner
pub fn fields_for(owner: Owner) -> impl Iterator<Item = &'static RefField> {
    REFERENCE_FIELDS.iter().filter(move |f| f.owner == owner)
}

/// Reference fields that can point at a target type
pub fn fields_targeting(target: RefTarget) -> impl Iterator<Item = &'static RefField> {
    REFERENCE_FIELDS.iter().filter(move |f| f.target == target)
}

/// Look up a field declaration by owner and field name
#[must_use]
pub fn find_field(owner: Owner, field: &str) -> Option<&'static RefField> {
    fields_for(owner).find(|f| f.field == field)
}

impl RefField {
    /// Human-readable field path (`steps[].next_steps` for nested fields)
    #[must_use]
    pub fn path(&self) -> String {
        match self.nested {
            Some(nested) => format!("{}[].{}", self.field, nested),
            None => self.field.to_string(),
        }
    }

    /// Visit every reference value stored under this field
    pub fn visit<'a>(&self, payload: &'a Payload, mut f: impl FnMut(RefSite<'a>)) {
        let Some(value) = payload.get(self.field) else {
            return;
        };

        match self.nested {
            None => for_each_string(value, |v| f(RefSite { element: None, value: v })),
            Some(nested) => {
                let Value::Array(elements) = value else {
                    return;
                };
                for element in elements {
                    let Value::Object(obj) = element else {
                        continue;
                    };
                    let id = obj.get("id").and_then(Value::as_str);
                    if let Some(inner) = obj.get(nested) {
                        for_each_string(inner, |v| f(RefSite { element: id, value: v }));
                    }
                }
            }
        }
    }

    /// Collect the reference values stored under this field
    #[must_use]
    pub fn values(&self, payload: &Payload) -> Vec<String> {
        let mut out = Vec::new();
        self.visit(payload, |site| out.push(site.value.to_string()));
        out
    }

    /// Replace reference values in place; `f` returns the replacement or `None` to keep
    ///
    /// Returns the number of values replaced.
    pub fn rewrite(
        &self,
        payload: &mut Payload,
        mut f: impl FnMut(Option<&str>, &str) -> Option<String>,
    ) -> usize {
        let Some(value) = payload.get_mut(self.field) else {
            return 0;
        };

        match self.nested {
            None => rewrite_strings(value, |v| f(None, v)),
            Some(nested) => {
                let Value::Array(elements) = value else {
                    return 0;
                };
                let mut count = 0;
                for element in elements {
                    let Value::Object(obj) = element else {
                        continue;
                    };
                    let id = obj.get("id").and_then(Value::as_str).map(str::to_string);
                    if let Some(inner) = obj.get_mut(nested) {
                        count += rewrite_strings(inner, |v| f(id.as_deref(), v));
                    }
                }
                count
            }
        }
    }

    /// Append a value to a flat field, promoting a single string to a list
    ///
    /// Returns `false` if the value was already present or the field is nested.
    pub fn push(&self, payload: &mut Payload, reference: &str) -> bool {
        if self.nested.is_some() || self.values(payload).iter().any(|v| v == reference) {
            return false;
        }

        let entry = payload
            .entry(self.field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => items.push(Value::String(reference.to_string())),
            Value::String(existing) => {
                let first = std::mem::take(existing);
                *entry = Value::Array(vec![Value::String(first), Value::String(reference.to_string())]);
            }
            other => *other = Value::Array(vec![Value::String(reference.to_string())]),
        }
        true
    }
}

fn for_each_string<'a>(value: &'a Value, mut f: impl FnMut(&'a str)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => items.iter().filter_map(Value::as_str).for_each(f),
        _ => {}
    }
}

fn rewrite_strings(value: &mut Value, mut f: impl FnMut(&str) -> Option<String>) -> usize {
    let mut count = 0;
    let mut apply = |s: &mut String| {
        if let Some(replacement) = f(s) {
            *s = replacement;
            count += 1;
        }
    };

    match value {
        Value::String(s) => apply(s),
        Value::Array(items) => {
            for item in items {
                if let Value::String(s) = item {
                    apply(s);
                }
            }
        }
        _ => {}
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn task_depends_on() -> &'static RefField {
        find_field(Owner::SubItem(SubItemKind::Task), "depends_on").unwrap()
    }

    fn flow_steps() -> &'static RefField {
        find_field(Owner::SubItem(SubItemKind::Flow), "steps").unwrap()
    }

    #[test]
    fn visits_string_and_list_values() {
        let criteria = find_field(Owner::Entity(EntityKind::Plan), "criteria_id").unwrap();
        let p = payload(json!({"criteria_id": "req-001-a/crit-001", "depends_on": ["pln-002-b", 3]}));

        assert_eq!(criteria.values(&p), vec!["req-001-a/crit-001"]);
        let deps = find_field(Owner::Entity(EntityKind::Plan), "depends_on").unwrap();
        assert_eq!(deps.values(&p), vec!["pln-002-b"]);
    }

    #[test]
    fn visits_nested_flow_steps_with_element_id() {
        let p = payload(json!({
            "steps": [
                {"id": "step-001", "next_steps": ["step-002", "step-003"]},
                {"id": "step-002", "next_steps": "step-003"},
                {"id": "step-003"}
            ]
        }));

        let mut seen = Vec::new();
        flow_steps().visit(&p, |site| seen.push((site.element.unwrap().to_string(), site.value.to_string())));
        assert_eq!(
            seen,
            vec![
                ("step-001".to_string(), "step-002".to_string()),
                ("step-001".to_string(), "step-003".to_string()),
                ("step-002".to_string(), "step-003".to_string()),
            ]
        );
    }

    #[test]
    fn rewrite_replaces_matching_values_only() {
        let mut p = payload(json!({"depends_on": ["task-001", "task-002", "task-001"]}));
        let count = task_depends_on().rewrite(&mut p, |_, v| (v == "task-001").then(|| "task-004".to_string()));

        assert_eq!(count, 2);
        assert_eq!(p["depends_on"], json!(["task-004", "task-002", "task-004"]));
    }

    #[test]
    fn push_promotes_single_string_and_skips_duplicates() {
        let mut p = payload(json!({"depends_on": "task-001"}));
        assert!(task_depends_on().push(&mut p, "task-002"));
        assert!(!task_depends_on().push(&mut p, "task-001"));
        assert_eq!(p["depends_on"], json!(["task-001", "task-002"]));
    }

    #[test]
    fn every_owner_field_pair_is_unique() {
        for (i, a) in REFERENCE_FIELDS.iter().enumerate() {
            for b in &REFERENCE_FIELDS[i + 1..] {
                assert!(!(a.owner == b.owner && a.field == b.field), "duplicate {}", a.field);
            }
        }
    }
}
