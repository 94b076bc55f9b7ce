//! Traversal-local case preservation.
//!
//! Free-form maps such as `labels` or `annotations` carry user-chosen keys
//! that must reach the backend exactly as written. When a traversal reaches a
//! field with one of those names it opens a [`VisitScope`]; every key visited
//! below it passes through unmodified.
//!
//! A scope is a plain value handed down the recursion. Entering a field yields
//! the child's scope and the parent's scope is untouched, so a scope closes by
//! itself when the recursion returns and can never leak into a sibling
//! subtree. Scope ids are drawn from one process-wide counter so that
//! concurrent traversals never share an id, which keeps trace output
//! unambiguous.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Field names whose subtrees keep their keys verbatim by default.
pub const DEFAULT_CASE_PRESERVING: &[&str] = &["annotations", "labels"];

/// Identifier of an open case-preserving scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// The case-preservation state of one position in a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VisitScope {
    active: Option<(ScopeId, String)>,
}

impl VisitScope {
    /// Scope at the root of a traversal: nothing preserved.
    pub fn root() -> Self {
        Self::default()
    }

    /// Whether keys at this position pass through unmodified.
    pub fn is_preserving(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the open scope, if any.
    pub fn id(&self) -> Option<ScopeId> {
        self.active.as_ref().map(|(id, _)| *id)
    }

    /// Name of the field that opened the scope, if any.
    pub fn opened_by(&self) -> Option<&str> {
        self.active.as_ref().map(|(_, name)| name.as_str())
    }

    /// Scope for the child reached through `key`.
    ///
    /// Opens a new scope when `key` is case-preserving and none is active;
    /// otherwise the child inherits this scope.
    pub fn enter(&self, key: &str, policy: &CasePolicy) -> VisitScope {
        if self.active.is_none() && policy.preserves(key) {
            let id = ScopeId::next();
            tracing::trace!(field = key, scope = %id, "opening case-preserving scope");
            return VisitScope {
                active: Some((id, key.to_string())),
            };
        }
        self.clone()
    }
}

/// The set of field names that open a case-preserving scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasePolicy {
    names: HashSet<String>,
}

impl CasePolicy {
    /// A policy that preserves nothing.
    pub fn none() -> Self {
        Self {
            names: HashSet::new(),
        }
    }

    /// A policy preserving the given field names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a field name.
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    pub fn preserves(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

impl Default for CasePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CASE_PRESERVING.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_not_preserving() {
        let scope = VisitScope::root();
        assert!(!scope.is_preserving());
        assert!(scope.id().is_none());
    }

    #[test]
    fn test_enter_opens_scope_for_preserving_field() {
        let policy = CasePolicy::default();
        let scope = VisitScope::root().enter("labels", &policy);
        assert!(scope.is_preserving());
        assert_eq!(scope.opened_by(), Some("labels"));
    }

    #[test]
    fn test_enter_inherits_active_scope() {
        let policy = CasePolicy::default();
        let labels = VisitScope::root().enter("labels", &policy);
        let nested = labels.enter("annotations", &policy);
        assert_eq!(nested.id(), labels.id());
        assert_eq!(nested.opened_by(), Some("labels"));

        let plain = labels.enter("someKey", &policy);
        assert_eq!(plain, labels);
    }

    #[test]
    fn test_sibling_is_unaffected() {
        let policy = CasePolicy::default();
        let root = VisitScope::root();
        let _labels = root.enter("labels", &policy);
        let sibling = root.enter("spec", &policy);
        assert!(!sibling.is_preserving());
    }

    #[test]
    fn test_scope_ids_are_unique() {
        let policy = CasePolicy::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let policy = policy.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| VisitScope::root().enter("labels", &policy).id().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate scope id {id}");
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn test_custom_policy() {
        let policy = CasePolicy::none().with("tags");
        assert!(policy.preserves("tags"));
        assert!(!policy.preserves("labels"));
    }
}
