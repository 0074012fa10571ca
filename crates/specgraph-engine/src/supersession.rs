//! Supersession protocol
//!
//! Append-only versioning for sub-items. Superseding an item:
//!
//! 1. allocates the next ID for its kind within the parent
//! 2. creates the new version from the old payload with the update merged over it
//! 3. retires the old version (`superseded_by`, `superseded_at`)
//! 4. rewrites every reference to the old version across the snapshot
//!
//! References the new version gains are checked like any other new
//! reference before the outcome is returned.
//!
//! The next snapshot is computed in full before anything is returned; on
//! error the caller's snapshot is untouched. Active → Retired is terminal.

use crate::config::EngineConfig;
use crate::cycles::cycle_through;
use crate::error::{EngineError, EngineResult};
use crate::graph::{EdgeFilter, GraphBuilder, RefContext};
use crate::references::{check_new_reference, ValidationOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specgraph_model::schema::{fields_for, fields_targeting};
use specgraph_model::{EntityId, EntitySnapshot, Owner, Payload, RefTarget, SubItem, SubItemId, SubItemKind};

/// Update keys managed by the engine
pub const RESERVED_FIELDS: [&str; 4] = ["id", "supersedes", "superseded_by", "superseded_at"];

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Clock returning `at`
    #[inline]
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// One reference value replaced by a supersession
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrittenReference {
    /// Key of the node holding the reference
    pub holder: String,
    /// Field path
    pub field: String,
    /// Previous stored value
    pub from: String,
    /// New stored value
    pub to: String,
}

/// Result of a successful supersession
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupersessionOutcome {
    /// ID of the new version
    pub new_id: SubItemId,
    /// Qualified key of the new version
    pub new_key: String,
    /// Retirement time recorded on the old version
    pub superseded_at: DateTime<Utc>,
    /// Update keys whose value differs from the old version
    pub changed_fields: Vec<String>,
    /// The new version's payload equals the old one
    pub no_changes: bool,
    /// References moved from the old version to the new one
    pub rewritten: Vec<RewrittenReference>,
    /// Full next snapshot
    #[serde(skip)]
    pub snapshot: EntitySnapshot,
}

/// Applies supersessions to snapshots
#[derive(Debug, Clone)]
pub struct SupersessionEngine<C = SystemClock> {
    clock: C,
    allow_cycles: bool,
    allow_self_reference: bool,
    cycle_edges: EdgeFilter,
}

impl Default for SupersessionEngine<SystemClock> {
    fn default() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl SupersessionEngine<SystemClock> {
    /// Engine using the wall clock and default policies
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Clock> SupersessionEngine<C> {
    /// Engine using `clock` and default policies
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        let config = EngineConfig::default();
        Self {
            clock,
            allow_cycles: config.allow_supersession_cycles,
            allow_self_reference: config.allow_self_reference,
            cycle_edges: config.cycle_edges,
        }
    }

    /// With the cycle and self-reference policies of `config`
    #[must_use]
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.allow_cycles = config.allow_supersession_cycles;
        self.allow_self_reference = config.allow_self_reference;
        self.cycle_edges = config.cycle_edges;
        self
    }

    /// Supersede `old` in `parent` with a new version carrying `update`
    ///
    /// # Errors
    ///
    /// - `NotFound` if the parent or the item does not exist
    /// - `AlreadySuperseded` if the item already has a successor
    /// - `InvalidUpdate` if the update sets an engine-managed key
    /// - `InvalidReferenceFormat`, `NotFound`, `SelfReference` or
    ///   `AlreadySuperseded` for the first new reference of the new version
    ///   that fails validation
    /// - `WouldCreateCycle` if the new version closes a dependency cycle
    ///   the old version was not part of (unless allowed by config)
    pub fn supersede(
        &self,
        snapshot: &EntitySnapshot,
        parent: &EntityId,
        kind: SubItemKind,
        old: SubItemId,
        update: Payload,
    ) -> EngineResult<SupersessionOutcome> {
        let entity = snapshot
            .get(parent)
            .ok_or_else(|| EngineError::not_found("entity", parent))?;
        let old_item = entity
            .item(&old)
            .filter(|item| item.id.kind() == kind)
            .ok_or_else(|| EngineError::not_found(kind.as_str(), format!("{parent}/{old}")))?;

        if let Some(successor) = old_item.superseded_by {
            return Err(EngineError::AlreadySuperseded {
                id: old.to_string(),
                superseded_by: successor.to_string(),
            });
        }
        if let Some(key) = update.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
            return Err(EngineError::InvalidUpdate(format!(
                "'{key}' is managed by the supersession protocol"
            )));
        }

        let new_id = entity.next_item_id(kind);
        let predecessor = old_item.supersedes.and_then(|prev| entity.item(&prev));
        let superseded_at = self.retirement_time(predecessor);
        let (fields, changed_fields) = merge(&old_item.fields, update);

        let mut next = snapshot.clone();
        let Some(target) = next.get_mut(parent) else {
            return Err(EngineError::not_found("entity", parent));
        };
        if let Some(item) = target.item_mut(&old) {
            item.superseded_by = Some(new_id);
            item.superseded_at = Some(superseded_at);
        }
        target.collections.entry(kind).or_default().push(SubItem {
            id: new_id,
            fields,
            supersedes: Some(old),
            superseded_by: None,
            superseded_at: None,
        });

        let rewritten = rewrite_references(&mut next, parent, kind, old, new_id);
        let new_key = format!("{parent}/{new_id}");
        let old_key = format!("{parent}/{old}");

        self.check_gained_references(&next, parent, old_item, new_id)?;

        if !self.allow_cycles {
            self.guard_cycles(snapshot, &next, &old_key, &new_key)?;
        }

        tracing::info!(
            parent = %parent,
            old = %old,
            new = %new_id,
            rewritten = rewritten.len(),
            "superseded item"
        );

        Ok(SupersessionOutcome {
            new_id,
            new_key,
            superseded_at,
            no_changes: changed_fields.is_empty(),
            changed_fields,
            rewritten,
            snapshot: next,
        })
    }

    /// `now`, clamped so retirement times never decrease along a chain
    fn retirement_time(&self, predecessor: Option<&SubItem>) -> DateTime<Utc> {
        let now = self.clock.now();
        match predecessor.and_then(|p| p.superseded_at) {
            Some(previous) if previous > now => previous,
            _ => now,
        }
    }

    /// Validate references on the new version that the old version did not hold
    fn check_gained_references(
        &self,
        next: &EntitySnapshot,
        parent: &EntityId,
        old_item: &SubItem,
        new_id: SubItemId,
    ) -> EngineResult<()> {
        let new_item = next
            .sub_item(parent, &new_id)
            .ok_or_else(|| EngineError::not_found(new_id.kind().as_str(), format!("{parent}/{new_id}")))?;
        let graph = GraphBuilder::new().build(next);
        let ctx = RefContext::item(parent, &new_id);
        // Cycles are judged by the chain-aware guard
        let options = ValidationOptions {
            allow_self_reference: self.allow_self_reference,
            check_cycles: false,
            cycle_edges: self.cycle_edges,
        };

        for field in fields_for(Owner::SubItem(new_id.kind())) {
            let held = field.values(&old_item.fields);
            let mut outcome = Ok(());
            field.visit(&new_item.fields, |site| {
                if outcome.is_ok() && !held.iter().any(|v| v == site.value) {
                    outcome = check_new_reference(&graph, next, ctx, field, site, options);
                }
            });
            outcome?;
        }
        Ok(())
    }

    fn guard_cycles(
        &self,
        before: &EntitySnapshot,
        after: &EntitySnapshot,
        old_key: &str,
        new_key: &str,
    ) -> EngineResult<()> {
        let after_graph = GraphBuilder::new().build(after);
        let Some(path) = cycle_through(&after_graph, new_key, self.cycle_edges) else {
            return Ok(());
        };
        let before_graph = GraphBuilder::new().build(before);
        if cycle_through(&before_graph, old_key, self.cycle_edges).is_some() {
            return Ok(());
        }
        Err(EngineError::WouldCreateCycle {
            from: new_key.to_string(),
            to: path.get(1).cloned().unwrap_or_default(),
            path,
        })
    }
}

/// Merge `update` over `base`; returns the payload and the keys that changed
fn merge(base: &Payload, update: Payload) -> (Payload, Vec<String>) {
    let mut fields = base.clone();
    let mut changed = Vec::new();
    for (key, value) in update {
        if fields.get(&key) != Some(&value) {
            changed.push(key.clone());
        }
        fields.insert(key, value);
    }
    (fields, changed)
}

/// Point every reference to `old` at `new`, across entities and items
fn rewrite_references(
    snapshot: &mut EntitySnapshot,
    parent: &EntityId,
    kind: SubItemKind,
    old: SubItemId,
    new: SubItemId,
) -> Vec<RewrittenReference> {
    let old_key = format!("{parent}/{old}");
    let mut rewritten = Vec::new();

    for entity in snapshot.iter_mut() {
        let id = entity.id.clone();

        for field in fields_targeting(RefTarget::SubItem(kind)) {
            match field.owner {
                Owner::Entity(owner) if owner == entity.kind() => {
                    let ctx = RefContext::entity(&id);
                    field.rewrite(&mut entity.fields, |element, value| {
                        (ctx.resolve(field, value) == old_key).then(|| {
                            let to = ctx.encode(field, parent, &new);
                            rewritten.push(RewrittenReference {
                                holder: ctx.source_key(element),
                                field: field.path(),
                                from: value.to_string(),
                                to: to.clone(),
                            });
                            to
                        })
                    });
                }
                Owner::SubItem(owner) => {
                    for item in entity.collections.values_mut().flatten() {
                        if item.id.kind() != owner {
                            continue;
                        }
                        let item_id = item.id;
                        let ctx = RefContext::item(&id, &item_id);
                        field.rewrite(&mut item.fields, |element, value| {
                            (ctx.resolve(field, value) == old_key).then(|| {
                                let to = ctx.encode(field, parent, &new);
                                rewritten.push(RewrittenReference {
                                    holder: ctx.source_key(element),
                                    field: field.path(),
                                    from: value.to_string(),
                                    to: to.clone(),
                                });
                                to
                            })
                        });
                    }
                }
                Owner::Entity(_) => {}
            }
        }
    }
    rewritten
}

/// Follow `superseded_by` from `id` to the active version of its chain
///
/// # Errors
///
/// `NotFound` if the parent or the item does not exist.
pub fn resolve_head(snapshot: &EntitySnapshot, parent: &EntityId, id: SubItemId) -> EngineResult<SubItemId> {
    let entity = snapshot
        .get(parent)
        .ok_or_else(|| EngineError::not_found("entity", parent))?;
    let mut current = entity
        .item(&id)
        .ok_or_else(|| EngineError::not_found(id.kind().as_str(), format!("{parent}/{id}")))?;

    for _ in 0..entity.items(id.kind()).len() {
        match current.superseded_by.and_then(|next| entity.item(&next)) {
            Some(next) => current = next,
            None => break,
        }
    }
    Ok(current.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use specgraph_model::{Entity, EntityKind};

    fn at(secs: i64) -> FixedClock {
        FixedClock::new(Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn task(n: u32) -> SubItem {
        SubItem::new(SubItemId::new(SubItemKind::Task, n))
    }

    fn tid(n: u32) -> SubItemId {
        SubItemId::new(SubItemKind::Task, n)
    }

    fn snapshot() -> (EntitySnapshot, EntityId) {
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_item(task(1).with_field("title", "Schema"))
            .unwrap()
            .with_item(task(2).with_field("depends_on", json!(["task-001"])))
            .unwrap();
        let id = plan.id.clone();
        (EntitySnapshot::from_entities([plan]), id)
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn reserved_update_keys_are_rejected() {
        let (snap, plan) = snapshot();
        let err = SupersessionEngine::with_clock(at(0))
            .supersede(&snap, &plan, SubItemKind::Task, tid(1), payload(json!({"superseded_by": "task-009"})))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_update");
    }

    #[test]
    fn missing_parent_and_item_are_not_found() {
        let (snap, plan) = snapshot();
        let engine = SupersessionEngine::with_clock(at(0));
        let other = EntityId::new(EntityKind::Plan, 9, "nope").unwrap();

        let err = engine
            .supersede(&snap, &other, SubItemKind::Task, tid(1), Payload::new())
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let err = engine
            .supersede(&snap, &plan, SubItemKind::Task, tid(7), Payload::new())
            .unwrap_err();
        assert_eq!(err, EngineError::not_found("task", "pln-001-auth/task-007"));
    }

    #[test]
    fn changed_fields_are_reported() {
        let (snap, plan) = snapshot();
        let outcome = SupersessionEngine::with_clock(at(0))
            .supersede(
                &snap,
                &plan,
                SubItemKind::Task,
                tid(1),
                payload(json!({"title": "Schema", "owner": "ana"})),
            )
            .unwrap();

        assert_eq!(outcome.changed_fields, vec!["owner"]);
        assert!(!outcome.no_changes);
        let new_item = outcome.snapshot.sub_item(&plan, &outcome.new_id).unwrap();
        assert_eq!(new_item.fields["title"], json!("Schema"));
        assert_eq!(new_item.supersedes, Some(tid(1)));
    }

    #[test]
    fn retirement_time_never_decreases_along_chain() {
        let (snap, plan) = snapshot();
        let first = SupersessionEngine::with_clock(at(100))
            .supersede(&snap, &plan, SubItemKind::Task, tid(1), Payload::new())
            .unwrap();
        let second = SupersessionEngine::with_clock(at(50))
            .supersede(&first.snapshot, &plan, SubItemKind::Task, first.new_id, Payload::new())
            .unwrap();

        assert_eq!(second.superseded_at, Utc.timestamp_opt(100, 0).unwrap());
    }

    #[test]
    fn supersession_closing_a_cycle_is_rejected_unless_allowed() {
        let (snap, plan) = snapshot();
        let update = payload(json!({"depends_on": ["task-002"]}));

        let err = SupersessionEngine::with_clock(at(0))
            .supersede(&snap, &plan, SubItemKind::Task, tid(1), update.clone())
            .unwrap_err();
        match err {
            EngineError::WouldCreateCycle { from, path, .. } => {
                assert_eq!(from, "pln-001-auth/task-003");
                assert_eq!(path, vec!["pln-001-auth/task-003", "pln-001-auth/task-002", "pln-001-auth/task-003"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let config = EngineConfig::default().with_supersession_cycles(true);
        let outcome = SupersessionEngine::with_clock(at(0))
            .with_config(&config)
            .supersede(&snap, &plan, SubItemKind::Task, tid(1), update)
            .unwrap();
        assert_eq!(outcome.new_id, tid(3));
    }

    #[test]
    fn resolve_head_follows_chain() {
        let (snap, plan) = snapshot();
        let engine = SupersessionEngine::with_clock(at(0));
        let first = engine
            .supersede(&snap, &plan, SubItemKind::Task, tid(1), Payload::new())
            .unwrap();
        let second = engine
            .supersede(&first.snapshot, &plan, SubItemKind::Task, first.new_id, Payload::new())
            .unwrap();

        assert_eq!(resolve_head(&second.snapshot, &plan, tid(1)).unwrap(), tid(4));
        assert_eq!(resolve_head(&second.snapshot, &plan, tid(2)).unwrap(), tid(2));
        assert!(resolve_head(&second.snapshot, &plan, tid(9)).is_err());
    }
}
