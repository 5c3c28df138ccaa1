//! Regex route entries and the concurrent registry frames are matched against.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::bytes::Regex;
use rulego_core::{EndpointError, Router};

/// Compiles a route expression. An empty expression matches every frame.
///
/// # Errors
///
/// Returns `EndpointError::InvalidPattern` if `expr` is not a valid regex.
pub fn compile_pattern(expr: &str) -> Result<Option<Regex>, EndpointError> {
    if expr.is_empty() {
        return Ok(None);
    }
    Regex::new(expr)
        .map(Some)
        .map_err(|source| EndpointError::InvalidPattern {
            expr: expr.to_string(),
            source,
        })
}

/// A router bound to its compiled pattern.
#[derive(Debug)]
pub struct RouteEntry {
    router: Router,
    pattern: Option<Regex>,
}

impl RouteEntry {
    #[must_use]
    pub fn new(router: Router, pattern: Option<Regex>) -> Self {
        Self { router, pattern }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.router.id()
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn matches(&self, frame: &[u8]) -> bool {
        self.pattern.as_ref().map_or(true, |re| re.is_match(frame))
    }
}

/// Route entries keyed by router id.
///
/// Reads take a snapshot of `Arc`s under the lock, so dispatch never holds
/// it while a pipeline runs.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: RwLock<HashMap<String, Arc<RouteEntry>>>,
}

impl RouteRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entry` under its router id.
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::DuplicateRouter` if the id is taken; the
    /// existing entry is left untouched.
    pub fn insert(&self, entry: RouteEntry) -> Result<String, EndpointError> {
        let id = entry.id().to_string();
        let mut routes = self.routes.write();
        if routes.contains_key(&id) {
            return Err(EndpointError::DuplicateRouter {
                id,
                expr: entry.router().from_expr().to_string(),
            });
        }
        routes.insert(id.clone(), Arc::new(entry));
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `EndpointError::RouterNotFound` if no entry has `id`.
    pub fn remove(&self, id: &str) -> Result<Arc<RouteEntry>, EndpointError> {
        self.routes
            .write()
            .remove(id)
            .ok_or_else(|| EndpointError::RouterNotFound { id: id.to_string() })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<RouteEntry>> {
        self.routes.read().get(id).cloned()
    }

    /// All entries at this instant, in unspecified order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<RouteEntry>> {
        self.routes.read().values().cloned().collect()
    }

    /// Entries whose pattern matches `frame`.
    #[must_use]
    pub fn matching(&self, frame: &[u8]) -> Vec<Arc<RouteEntry>> {
        self.routes
            .read()
            .values()
            .filter(|entry| entry.matches(frame))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.routes.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use proptest::prelude::*;
    use rulego_core::{Exchange, RouteProcessor};

    use super::*;

    struct Noop;

    #[async_trait]
    impl RouteProcessor for Noop {
        async fn process(&self, _exchange: &mut Exchange) {}
    }

    fn entry(id: &str, expr: &str) -> RouteEntry {
        let pattern = compile_pattern(expr).unwrap();
        RouteEntry::new(Router::new(expr, Arc::new(Noop)).with_id(id), pattern)
    }

    #[test]
    fn empty_pattern_compiles_to_match_all() {
        assert!(compile_pattern("").unwrap().is_none());
        assert!(entry("all", "").matches(b""));
        assert!(entry("all", "").matches(b"\xff\x00binary"));
    }

    #[test]
    fn invalid_pattern_reports_expr() {
        let err = compile_pattern("(unclosed").unwrap_err();
        assert!(matches!(err, EndpointError::InvalidPattern { ref expr, .. } if expr == "(unclosed"));
    }

    #[test]
    fn pattern_matches_frame_bytes() {
        let err_route = entry("a", "^ERR");
        assert!(err_route.matches(b"ERR disk full"));
        assert!(!err_route.matches(b"INFO ok"));
        assert!(!err_route.matches(b" ERR leading space"));
    }

    #[test]
    fn insert_and_remove() {
        let registry = RouteRegistry::new();
        assert!(registry.is_empty());

        assert_eq!(registry.insert(entry("a", "^ERR")).unwrap(), "a");
        assert_eq!(registry.insert(entry("b", "")).unwrap(), "b");
        assert_eq!(registry.len(), 2);

        let mut ids = registry.ids();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);

        let removed = registry.remove("a").unwrap();
        assert_eq!(removed.id(), "a");
        assert_eq!(registry.len(), 1);
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let registry = RouteRegistry::new();
        let err = registry.remove("ghost").unwrap_err();
        assert!(matches!(err, EndpointError::RouterNotFound { ref id } if id == "ghost"));
    }

    #[test]
    fn duplicate_id_keeps_original() {
        let registry = RouteRegistry::new();
        registry.insert(entry("a", "^ERR")).unwrap();

        let err = registry.insert(entry("a", "^WARN")).unwrap_err();
        assert_eq!(err.router_id(), Some("a"));

        let kept = registry.get("a").unwrap();
        assert_eq!(kept.router().from_expr(), "^ERR");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn matching_filters_by_pattern() {
        let registry = RouteRegistry::new();
        registry.insert(entry("catch-all", "")).unwrap();
        registry.insert(entry("x", "^X")).unwrap();

        let mut hits: Vec<_> = registry
            .matching(b"Xyz")
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        hits.sort();
        assert_eq!(hits, vec!["catch-all", "x"]);

        let hits: Vec<_> = registry
            .matching(b"abc")
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(hits, vec!["catch-all"]);
    }

    #[test]
    fn snapshot_survives_concurrent_removal() {
        let registry = RouteRegistry::new();
        registry.insert(entry("a", "")).unwrap();
        let snapshot = registry.snapshot();
        registry.remove("a").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), "a");
    }

    #[test]
    fn concurrent_mutation_and_matching() {
        let registry = Arc::new(RouteRegistry::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("{t}-{i}");
                        registry.insert(entry(&id, "")).unwrap();
                        let _ = registry.matching(b"frame");
                        registry.remove(&id).unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert!(registry.is_empty());
    }

    proptest! {
        #[test]
        fn catch_all_matches_any_frame(frame in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert!(entry("all", "").matches(&frame));
        }

        #[test]
        fn invalid_pattern_leaves_registry_unchanged(suffix in "[a-z]{0,8}") {
            let registry = RouteRegistry::new();
            registry.insert(entry("a", "^ok")).unwrap();
            let expr = format!("({suffix}");
            prop_assert!(compile_pattern(&expr).is_err());
            prop_assert_eq!(registry.len(), 1);
        }
    }
}
