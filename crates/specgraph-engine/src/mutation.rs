//! Validator-gated dependency edits

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::{GraphBuilder, RefContext};
use crate::references::{check_new_reference, ValidationOptions};
use serde::{Deserialize, Serialize};
use specgraph_model::schema::find_field;
use specgraph_model::{EntitySnapshot, NodeRef, Owner, RefField, RefSite};

/// Result of [`add_dependency`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyOutcome {
    /// Key of the node that gained the reference
    pub source: String,
    /// Dependency field
    pub field: String,
    /// Stored reference value
    pub target: String,
    /// `false` when the reference was already present
    pub added: bool,
    /// Full next snapshot
    #[serde(skip)]
    pub snapshot: EntitySnapshot,
}

/// Append `target` to the dependency field `field` of node `source`
///
/// `source` is an entity ID or a qualified sub-item key; `target` is written
/// the way the field stores values (a bare `task-002` for task fields).
///
/// # Errors
///
/// - `NotFound` if the source or target does not exist
/// - `InvalidReferenceFormat` if the source key or target value is malformed
/// - `InvalidUpdate` if `field` is not a dependency field of the source
/// - `SelfReference` if the target is the source (unless allowed by config)
/// - `AlreadySuperseded` if the source or target is retired
/// - `WouldCreateCycle` if the edge would close a dependency cycle
pub fn add_dependency(
    snapshot: &EntitySnapshot,
    source: &str,
    field: &str,
    target: &str,
    config: &EngineConfig,
) -> EngineResult<DependencyOutcome> {
    let node: NodeRef = source.parse().map_err(|_| EngineError::InvalidReferenceFormat {
        field: "source".to_string(),
        value: source.to_string(),
        expected: "{entity-id} or {entity-id}/{item-id}".to_string(),
    })?;
    let entity = snapshot
        .get(node.entity())
        .ok_or_else(|| EngineError::not_found("entity", node.entity()))?;

    let (owner, payload, ctx) = match &node {
        NodeRef::Entity(id) => (Owner::Entity(id.kind()), &entity.fields, RefContext::entity(id)),
        NodeRef::SubItem { parent, item } => {
            let found = entity
                .item(item)
                .ok_or_else(|| EngineError::not_found(item.kind().as_str(), source))?;
            if let Some(successor) = found.superseded_by {
                return Err(EngineError::AlreadySuperseded {
                    id: item.to_string(),
                    superseded_by: successor.to_string(),
                });
            }
            (Owner::SubItem(item.kind()), &found.fields, RefContext::item(parent, item))
        }
        NodeRef::FlowStep { .. } => {
            return Err(EngineError::InvalidUpdate(format!(
                "flow steps have no dependency fields: {source}"
            )))
        }
    };

    let declared: &'static RefField = find_field(owner, field)
        .filter(|f| f.edge.is_dependency())
        .ok_or_else(|| EngineError::InvalidUpdate(format!("{field} is not a dependency field of {source}")))?;

    if declared.values(payload).iter().any(|v| v == target) {
        tracing::debug!(source, field, target, "dependency already present");
        return Ok(DependencyOutcome {
            source: source.to_string(),
            field: field.to_string(),
            target: target.to_string(),
            added: false,
            snapshot: snapshot.clone(),
        });
    }

    let graph = GraphBuilder::new().build(snapshot);
    let options = ValidationOptions {
        check_cycles: true,
        ..ValidationOptions::from_config(config)
    };
    let site = RefSite {
        element: None,
        value: target,
    };
    check_new_reference(&graph, snapshot, ctx, declared, site, options)?;

    let mut next = snapshot.clone();
    let entity = next
        .get_mut(node.entity())
        .ok_or_else(|| EngineError::not_found("entity", node.entity()))?;
    let payload = match &node {
        NodeRef::SubItem { item, .. } => {
            &mut entity
                .item_mut(item)
                .ok_or_else(|| EngineError::not_found(item.kind().as_str(), source))?
                .fields
        }
        _ => &mut entity.fields,
    };
    let added = declared.push(payload, target);

    tracing::info!(source, field, target, "added dependency");
    Ok(DependencyOutcome {
        source: source.to_string(),
        field: field.to_string(),
        target: target.to_string(),
        added,
        snapshot: next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use specgraph_model::{Entity, EntityKind, SubItem, SubItemId, SubItemKind};

    fn snapshot() -> EntitySnapshot {
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_item(SubItem::new(SubItemId::new(SubItemKind::Task, 1)))
            .unwrap()
            .with_item(
                SubItem::new(SubItemId::new(SubItemKind::Task, 2)).with_field("depends_on", json!(["task-001"])),
            )
            .unwrap();
        let other = Entity::new(EntityKind::Plan, 2, "billing", "Billing").unwrap();
        EntitySnapshot::from_entities([plan, other])
    }

    fn add(source: &str, field: &str, target: &str) -> EngineResult<DependencyOutcome> {
        add_dependency(&snapshot(), source, field, target, &EngineConfig::default())
    }

    #[test]
    fn adds_entity_dependency() {
        let outcome = add("pln-002-billing", "depends_on", "pln-001-auth").unwrap();
        assert!(outcome.added);

        let id = "pln-002-billing".parse().unwrap();
        let entity = outcome.snapshot.get(&id).unwrap();
        assert_eq!(entity.fields["depends_on"], json!(["pln-001-auth"]));
    }

    #[test]
    fn duplicate_is_a_no_op() {
        let outcome = add("pln-001-auth/task-002", "depends_on", "task-001").unwrap();
        assert!(!outcome.added);
        assert_eq!(outcome.snapshot, snapshot());
    }

    #[test]
    fn rejects_cycle() {
        let err = add("pln-001-auth/task-001", "blocked_by", "task-002").unwrap_err();
        assert_eq!(err.kind(), "would_create_cycle");
    }

    #[test]
    fn rejects_self_reference() {
        let err = add("pln-001-auth/task-001", "depends_on", "task-001").unwrap_err();
        assert_eq!(
            err,
            EngineError::SelfReference {
                id: "pln-001-auth/task-001".to_string(),
                field: "depends_on".to_string()
            }
        );
    }

    #[test]
    fn rejects_bad_format_and_missing_target() {
        assert_eq!(
            add("pln-001-auth/task-001", "depends_on", "task-1").unwrap_err().kind(),
            "invalid_reference_format"
        );
        assert_eq!(
            add("pln-001-auth/task-001", "depends_on", "task-009").unwrap_err().kind(),
            "not_found"
        );
        assert_eq!(add("pln-009-nope", "depends_on", "pln-001-auth").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn rejects_non_dependency_field() {
        let err = add("pln-001-auth", "criteria_id", "req-001-x/crit-001").unwrap_err();
        assert_eq!(err.kind(), "invalid_update");
    }
}
