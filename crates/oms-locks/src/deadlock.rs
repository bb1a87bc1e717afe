//! Wait-for graph and deadlock detection (§4.4, §9's "cyclic
//! references... use an arena of node ids with integer edges; never
//! hand out back-pointers"). The graph lives entirely in-process,
//! guarded by a single `parking_lot::Mutex` with no suspension points
//! inside the critical section, per §5's shared-resource policy.

use oms_types::LockId;
use parking_lot::Mutex;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use std::sync::Arc;

/// Tracks `waiter -> holder` edges for blocked `acquire` calls. Cycle
/// detection uses strongly-connected-components (equivalent to
/// Johnson's algorithm for *detecting* a cycle's existence and
/// membership, though not enumerating every simple cycle — the spec's
/// victim-selection rule only needs membership).
#[derive(Default)]
pub struct WaitForGraph {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    graph: DiGraph<String, ()>,
    index_of: HashMap<String, NodeIndex>,
}

impl Inner {
    fn node(&mut self, caller: &str) -> NodeIndex {
        *self
            .index_of
            .entry(caller.to_string())
            .or_insert_with(|| self.graph.add_node(caller.to_string()))
    }
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `waiter` is blocked waiting on a lock held by each
    /// of `holders`.
    pub fn add_wait(&self, waiter: &str, holders: &[String]) {
        let mut inner = self.inner.lock();
        let w = inner.node(waiter);
        for holder in holders {
            if holder == waiter {
                continue;
            }
            let h = inner.node(holder);
            inner.graph.update_edge(w, h, ());
        }
    }

    /// Remove every outgoing edge from `waiter` — called once the
    /// waiter's `acquire` either succeeds or times out (§5 "the waiter
    /// removes its wait-for edge").
    pub fn remove_waiter(&self, waiter: &str) {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.index_of.get(waiter) {
            let edges: Vec<_> = inner
                .graph
                .edges(idx)
                .map(|e| e.id())
                .collect();
            for e in edges {
                inner.graph.remove_edge(e);
            }
        }
    }

    /// `true` if `caller` currently participates in a wait-for cycle.
    pub fn in_cycle(&self, caller: &str) -> bool {
        let inner = self.inner.lock();
        let Some(&idx) = inner.index_of.get(caller) else {
            return false;
        };
        kosaraju_scc(&inner.graph)
            .into_iter()
            .any(|component| component.len() > 1 && component.contains(&idx))
    }

    /// All callers currently on some cycle, grouped by component.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let inner = self.inner.lock();
        kosaraju_scc(&inner.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                component
                    .into_iter()
                    .map(|idx| inner.graph[idx].clone())
                    .collect()
            })
            .collect()
    }
}

/// From a set of lock ids held by cycle participants, pick the
/// youngest-acquired as the victim (§4.4: "selects the youngest-acquired
/// lock as victim").
pub fn pick_victim<'a>(
    candidates: impl IntoIterator<Item = &'a (LockId, chrono::DateTime<chrono::Utc>)>,
) -> Option<LockId> {
    candidates
        .into_iter()
        .max_by_key(|(_, locked_at)| *locked_at)
        .map(|(id, _)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cycle_when_waits_form_a_chain() {
        let graph = WaitForGraph::new();
        graph.add_wait("a", &["b".to_string()]);
        graph.add_wait("b", &["c".to_string()]);
        assert!(!graph.in_cycle("a"));
        assert!(graph.cycles().is_empty());
    }

    #[test]
    fn mutual_wait_is_a_cycle() {
        let graph = WaitForGraph::new();
        graph.add_wait("a", &["b".to_string()]);
        graph.add_wait("b", &["a".to_string()]);
        assert!(graph.in_cycle("a"));
        assert!(graph.in_cycle("b"));
        assert_eq!(graph.cycles().len(), 1);
    }

    #[test]
    fn removing_a_waiter_breaks_the_cycle() {
        let graph = WaitForGraph::new();
        graph.add_wait("a", &["b".to_string()]);
        graph.add_wait("b", &["a".to_string()]);
        graph.remove_waiter("a");
        assert!(!graph.in_cycle("b"));
    }

    #[test]
    fn victim_is_the_youngest_lock() {
        let old = (LockId::new(), chrono::Utc::now() - chrono::Duration::hours(1));
        let young = (LockId::new(), chrono::Utc::now());
        let victim = pick_victim(&[old, young]);
        assert_eq!(victim, Some(young.0));
    }
}
