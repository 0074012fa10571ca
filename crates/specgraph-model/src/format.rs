//! Reference string formats
//!
//! Each (target, scope) pair has one fixed pattern. Patterns are compiled once
//! and shared.

use crate::kind::{EntityKind, SubItemKind};
use crate::schema::{RefScope, RefTarget};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const SLUG: &str = r"[a-z0-9]+(?:-[a-z0-9]+)*";
// Three digits, or more without a leading zero; matches how IDs render
const NUMBER: &str = r"(?:\d{3}|[1-9]\d{3,})";

static FORMATS: Lazy<HashMap<(RefTarget, RefScope), Regex>> = Lazy::new(|| {
    let mut formats = HashMap::new();
    let mut add = |target: RefTarget, scope: RefScope| {
        let pattern = pattern(target, scope);
        let regex = Regex::new(&pattern).expect("reference patterns are static and valid");
        formats.insert((target, scope), regex);
    };

    for kind in EntityKind::ALL {
        add(RefTarget::Entity(kind), RefScope::Global);
    }
    for kind in SubItemKind::ALL {
        add(RefTarget::SubItem(kind), RefScope::Global);
        add(RefTarget::SubItem(kind), RefScope::Sibling);
    }
    add(RefTarget::FlowStep, RefScope::Local);
    formats
});

/// Expected pattern for a reference of `target` stored with `scope`
#[must_use]
pub fn pattern(target: RefTarget, scope: RefScope) -> String {
    match (target, scope) {
        (RefTarget::Entity(kind), _) => format!("^{}-{NUMBER}-{SLUG}$", kind.short()),
        (RefTarget::SubItem(kind), RefScope::Global) => format!(
            "^{}-{NUMBER}-{SLUG}/{}-{NUMBER}$",
            kind.parent_kind().short(),
            kind.prefix()
        ),
        (RefTarget::SubItem(kind), _) => format!("^{}-{NUMBER}$", kind.prefix()),
        (RefTarget::FlowStep, _) => format!("^step-{NUMBER}$"),
    }
}

/// Whether `value` matches the expected reference format
#[must_use]
pub fn matches(target: RefTarget, scope: RefScope, value: &str) -> bool {
    match FORMATS.get(&(target, scope)) {
        Some(regex) => regex.is_match(value),
        None => Regex::new(&pattern(target, scope)).is_ok_and(|r| r.is_match(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirement_format() {
        let target = RefTarget::Entity(EntityKind::Requirement);
        assert!(matches(target, RefScope::Global, "req-001-user-login"));
        assert!(!matches(target, RefScope::Global, "req-1-user-login"));
        assert!(!matches(target, RefScope::Global, "pln-001-user-login"));
        assert!(!matches(target, RefScope::Global, "req-001-User"));
    }

    #[test]
    fn criterion_formats_by_scope() {
        let target = RefTarget::SubItem(SubItemKind::Criterion);
        assert!(matches(target, RefScope::Sibling, "crit-002"));
        assert!(!matches(target, RefScope::Sibling, "crit-2"));
        assert!(matches(target, RefScope::Global, "req-003-login/crit-002"));
        assert!(!matches(target, RefScope::Global, "crit-002"));
    }

    #[test]
    fn numbers_follow_rendered_width() {
        let target = RefTarget::SubItem(SubItemKind::Task);
        assert!(matches(target, RefScope::Sibling, "task-001"));
        assert!(matches(target, RefScope::Sibling, "task-1000"));
        assert!(!matches(target, RefScope::Sibling, "task-0001"));
        assert!("task-0001".parse::<crate::SubItemId>().is_err());
    }

    #[test]
    fn flow_step_format() {
        assert!(matches(RefTarget::FlowStep, RefScope::Local, "step-010"));
        assert!(!matches(RefTarget::FlowStep, RefScope::Local, "next"));
    }
}
