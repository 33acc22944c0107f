//! Version-aware directed dependency graph.

use crate::error::{GraphError, Result};
use ahash::{AHashMap, AHashSet};
use meridian_core::Version;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mutable graph state, guarded by the outer reader-writer lock.
#[derive(Debug, Default)]
pub(crate) struct GraphInner {
    /// Outgoing edges: node -> set of nodes it depends on.
    pub(crate) adj: AHashMap<String, AHashSet<String>>,
    /// Incoming edges: node -> set of nodes depending on it.
    pub(crate) rev: AHashMap<String, AHashSet<String>>,
    /// Version carried by each node.
    pub(crate) ver: AHashMap<String, Version>,
    /// Version each edge requires, keyed by (from, to).
    pub(crate) req: AHashMap<(String, String), Version>,
    /// Scheduling priority per node; absent means 0.
    pub(crate) prio: AHashMap<String, i32>,
    /// Named groups of nodes.
    pub(crate) groups: AHashMap<String, Vec<String>>,
    /// Node insertion order, for deterministic traversal.
    pub(crate) order: Vec<String>,
}

impl GraphInner {
    fn has_cycle_from(
        &self,
        node: &str,
        visited: &mut AHashSet<String>,
        rec_stack: &mut AHashSet<String>,
    ) -> bool {
        if visited.contains(node) {
            return false;
        }
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());

        if let Some(neighbors) = self.adj.get(node) {
            for neighbor in neighbors {
                if rec_stack.contains(neighbor) {
                    return true;
                }
                if self.has_cycle_from(neighbor, visited, rec_stack) {
                    return true;
                }
            }
        }

        // The recursion stack holds exactly the current DFS path.
        rec_stack.remove(node);
        false
    }

    pub(crate) fn has_cycle(&self) -> bool {
        let mut visited = AHashSet::new();
        let mut rec_stack = AHashSet::new();
        for node in &self.order {
            if self.has_cycle_from(node, &mut visited, &mut rec_stack) {
                return true;
            }
        }
        false
    }

    fn sort_visit(&self, node: &str, visited: &mut AHashSet<String>, out: &mut Vec<String>) {
        visited.insert(node.to_string());
        if let Some(neighbors) = self.adj.get(node) {
            for neighbor in neighbors {
                if !visited.contains(neighbor) {
                    self.sort_visit(neighbor, visited, out);
                }
            }
        }
        out.push(node.to_string());
    }

    pub(crate) fn topological_sort(&self) -> Option<Vec<String>> {
        if self.has_cycle() {
            return None;
        }

        let mut visited = AHashSet::new();
        let mut post_order = Vec::with_capacity(self.order.len());
        // Insertion order drives the tie-break so output is deterministic.
        for node in &self.order {
            if !visited.contains(node) {
                self.sort_visit(node, &mut visited, &mut post_order);
            }
        }
        post_order.reverse();
        Some(post_order)
    }

    fn collect_transitive(&self, node: &str, acc: &mut AHashSet<String>) {
        if let Some(neighbors) = self.adj.get(node) {
            for neighbor in neighbors {
                if acc.insert(neighbor.clone()) {
                    self.collect_transitive(neighbor, acc);
                }
            }
        }
    }

    pub(crate) fn all_dependencies(&self, node: &str) -> AHashSet<String> {
        let mut acc = AHashSet::new();
        self.collect_transitive(node, &mut acc);
        acc
    }
}

/// A directed dependency graph with version-aware edges.
///
/// Nodes are string identifiers carrying a [`Version`]; each edge records the
/// version its dependent requires. All operations are linearizable under a
/// single reader-writer lock: queries take the shared mode, mutations the
/// exclusive mode.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    pub(crate) inner: RwLock<GraphInner>,
    /// Resolver cache: directory path -> resolved order. Shared with the
    /// batched parallel resolver, which takes this lock only briefly.
    pub(crate) resolve_cache: Arc<Mutex<AHashMap<String, Vec<String>>>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        debug!("creating dependency graph");
        Self::default()
    }

    /// Add a node. Idempotent on the name; an existing node's version is
    /// replaced.
    pub fn add_node(&self, node: &str, version: Version) {
        let mut inner = self.inner.write();
        debug!(node, %version, "adding node");
        if !inner.adj.contains_key(node) {
            inner.adj.insert(node.to_string(), AHashSet::new());
            inner.rev.insert(node.to_string(), AHashSet::new());
            inner.order.push(node.to_string());
        }
        inner.ver.insert(node.to_string(), version);
    }

    /// Add a directed dependency: `from` depends on `to`, requiring
    /// `required_version` of it.
    ///
    /// Does not auto-insert `to`.
    ///
    /// # Errors
    /// [`GraphError::MissingNode`] if `to` is absent,
    /// [`GraphError::VersionMismatch`] if the target's version is below the
    /// requirement.
    pub fn add_dependency(&self, from: &str, to: &str, required_version: Version) -> Result<()> {
        let mut inner = self.inner.write();
        debug!(from, to, required = %required_version, "adding dependency");

        let found = inner
            .ver
            .get(to)
            .ok_or_else(|| GraphError::MissingNode {
                node: to.to_string(),
            })?
            .clone();
        if found < required_version {
            warn!(from, to, required = %required_version, %found, "version requirement not satisfied");
            return Err(GraphError::VersionMismatch {
                from: from.to_string(),
                to: to.to_string(),
                required: required_version,
                found,
            });
        }

        inner
            .adj
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        inner
            .rev
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
        inner
            .req
            .insert((from.to_string(), to.to_string()), required_version);
        Ok(())
    }

    /// Remove a node and every edge mentioning it.
    pub fn remove_node(&self, node: &str) {
        let mut inner = self.inner.write();
        debug!(node, "removing node");

        inner.adj.remove(node);
        inner.rev.remove(node);
        inner.ver.remove(node);
        inner.prio.remove(node);
        inner.order.retain(|n| n != node);
        for neighbors in inner.adj.values_mut() {
            neighbors.remove(node);
        }
        for sources in inner.rev.values_mut() {
            sources.remove(node);
        }
        inner.req.retain(|(from, to), _| from != node && to != node);
    }

    /// Remove a single dependency edge.
    pub fn remove_dependency(&self, from: &str, to: &str) {
        let mut inner = self.inner.write();
        debug!(from, to, "removing dependency");
        if let Some(neighbors) = inner.adj.get_mut(from) {
            neighbors.remove(to);
        }
        if let Some(sources) = inner.rev.get_mut(to) {
            sources.remove(from);
        }
        inner.req.remove(&(from.to_string(), to.to_string()));
    }

    /// Direct dependencies of a node. Missing node yields an empty list.
    #[must_use]
    pub fn get_dependencies(&self, node: &str) -> Vec<String> {
        let inner = self.inner.read();
        match inner.adj.get(node) {
            Some(deps) => {
                let mut out: Vec<String> = deps.iter().cloned().collect();
                out.sort_unstable();
                out
            }
            None => {
                warn!(node, "node not found when retrieving dependencies");
                Vec::new()
            }
        }
    }

    /// Direct dependents of a node. Missing node yields an empty list.
    #[must_use]
    pub fn get_dependents(&self, node: &str) -> Vec<String> {
        let inner = self.inner.read();
        match inner.rev.get(node) {
            Some(sources) => {
                let mut out: Vec<String> = sources.iter().cloned().collect();
                out.sort_unstable();
                out
            }
            None => {
                warn!(node, "node not found when retrieving dependents");
                Vec::new()
            }
        }
    }

    /// Version carried by a node.
    #[must_use]
    pub fn node_version(&self, node: &str) -> Option<Version> {
        self.inner.read().ver.get(node).cloned()
    }

    /// Whether the node exists.
    #[must_use]
    pub fn contains(&self, node: &str) -> bool {
        self.inner.read().adj.contains_key(node)
    }

    /// All node names, in insertion order.
    #[must_use]
    pub fn nodes(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Whether the graph contains a cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.inner.read().has_cycle()
    }

    /// Topological order, or `None` iff the graph is cyclic.
    ///
    /// Every edge points from an earlier element to a later one. The
    /// tie-break is node insertion order, so output is deterministic for a
    /// given construction sequence.
    #[must_use]
    pub fn topological_sort(&self) -> Option<Vec<String>> {
        self.inner.read().topological_sort()
    }

    /// Transitive closure of a node's outgoing edges, excluding the node.
    #[must_use]
    pub fn get_all_dependencies(&self, node: &str) -> AHashSet<String> {
        self.inner.read().all_dependencies(node)
    }

    /// Set a node's scheduling priority.
    pub fn set_priority(&self, node: &str, priority: i32) {
        debug!(node, priority, "setting priority");
        self.inner.write().prio.insert(node.to_string(), priority);
    }

    /// A node's scheduling priority; absent nodes default to 0.
    #[must_use]
    pub fn priority(&self, node: &str) -> i32 {
        self.inner.read().prio.get(node).copied().unwrap_or(0)
    }

    /// Find pairs of dependents whose requirements on a common target
    /// disagree.
    ///
    /// Returns `(u, v, required_u, required_v)` tuples; empty iff for every
    /// target all incoming edges require the same version.
    #[must_use]
    pub fn detect_version_conflicts(&self) -> Vec<(String, String, Version, Version)> {
        let inner = self.inner.read();
        let mut conflicts = Vec::new();

        for target in &inner.order {
            let Some(sources) = inner.rev.get(target) else {
                continue;
            };
            let mut dependents: Vec<&String> = sources.iter().collect();
            dependents.sort_unstable();
            for (i, u) in dependents.iter().enumerate() {
                for v in &dependents[i + 1..] {
                    let req_u = inner.req.get(&((*u).clone(), target.clone()));
                    let req_v = inner.req.get(&((*v).clone(), target.clone()));
                    if let (Some(req_u), Some(req_v)) = (req_u, req_v) {
                        if req_u != req_v {
                            conflicts.push((
                                (*u).clone(),
                                (*v).clone(),
                                req_u.clone(),
                                req_v.clone(),
                            ));
                        }
                    }
                }
            }
        }
        conflicts
    }

    /// Register a named group of nodes. Idempotent: re-adding replaces the
    /// member list.
    pub fn add_group(&self, group: &str, nodes: Vec<String>) {
        debug!(group, count = nodes.len(), "adding group");
        self.inner.write().groups.insert(group.to_string(), nodes);
    }

    /// Union of the transitive dependencies of every group member.
    #[must_use]
    pub fn get_group_dependencies(&self, group: &str) -> Vec<String> {
        let inner = self.inner.read();
        let Some(members) = inner.groups.get(group) else {
            warn!(group, "group not found");
            return Vec::new();
        };

        let mut all = AHashSet::new();
        for member in members {
            all.extend(inner.all_dependencies(member));
        }
        let mut out: Vec<String> = all.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Check that every transitive dependency of `node` exists and satisfies
    /// the version its edges require.
    #[must_use]
    pub fn validate_dependencies(&self, node: &str) -> bool {
        let inner = self.inner.read();
        if !inner.adj.contains_key(node) {
            warn!(node, "node not found in dependency graph");
            return false;
        }

        let deps = inner.all_dependencies(node);
        for dep in &deps {
            let Some(found) = inner.ver.get(dep) else {
                warn!(node, dep, "dependency missing from graph");
                return false;
            };
            for ((_, _), required) in inner.req.iter().filter(|((_, to), _)| to == dep) {
                if found < required {
                    warn!(node, dep, %required, %found, "dependency version invalid");
                    return false;
                }
            }
        }
        true
    }

    /// Drop all cached resolution results.
    pub fn clear_cache(&self) {
        debug!("clearing resolve cache");
        self.resolve_cache.lock().clear();
    }
}
