//! Role hierarchy as an explicit directed acyclic graph.
//!
//! One `RoleGraph` holds the edges of a single tenant. Reachability and cycle
//! detection are computed here, independent of whatever store persisted the
//! edges.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tenantgate_core::{DomainError, RoleId};

/// Adjacency map `parent -> children` for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGraph {
    children: HashMap<RoleId, BTreeSet<RoleId>>,
    edge_count: usize,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from persisted edges, rejecting any edge that would close a cycle.
    pub fn from_edges<I>(edges: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (RoleId, RoleId)>,
    {
        let mut graph = Self::new();
        for (parent, child) in edges {
            graph.link(parent, child)?;
        }
        Ok(graph)
    }

    /// Insert `parent -> child` after checking it keeps the graph acyclic.
    pub fn link(&mut self, parent: RoleId, child: RoleId) -> Result<(), DomainError> {
        if parent == child {
            return Err(DomainError::hierarchy("a role cannot be linked to itself"));
        }
        if self.contains_edge(parent, child) {
            return Err(DomainError::hierarchy("edge already exists"));
        }
        // The new edge closes a cycle iff parent is already reachable from child.
        if self.reaches(child, parent) {
            return Err(DomainError::hierarchy(format!(
                "linking {parent} -> {child} would make {parent} its own descendant"
            )));
        }
        self.children.entry(parent).or_default().insert(child);
        self.edge_count += 1;
        Ok(())
    }

    pub fn contains_edge(&self, parent: RoleId, child: RoleId) -> bool {
        self.children
            .get(&parent)
            .is_some_and(|kids| kids.contains(&child))
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Whether `to` is reachable from `from` by following one or more edges.
    pub fn reaches(&self, from: RoleId, to: RoleId) -> bool {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            let Some(kids) = self.children.get(&node) else {
                continue;
            };
            for &kid in kids {
                if kid == to {
                    return true;
                }
                if seen.insert(kid) {
                    queue.push_back(kid);
                }
            }
        }
        false
    }

    /// Transitive closure of `role` over child edges (never includes `role`).
    pub fn descendants_of(&self, role: RoleId) -> BTreeSet<RoleId> {
        let mut out = BTreeSet::new();
        let mut stack = vec![role];
        while let Some(node) = stack.pop() {
            if let Some(kids) = self.children.get(&node) {
                for &kid in kids {
                    if out.insert(kid) {
                        stack.push(kid);
                    }
                }
            }
        }
        out
    }
}
