//! Dependency graph construction and traversal.
//!
//! Edges are typed: [`EdgeKind::Ref`] edges are structural dependencies
//! resolved from `ref()`/`source()` calls; [`EdgeKind::Test`] edges are the
//! blocking edges a build run inserts so a model's tests gate its
//! dependents. Only Ref edges participate in cycle detection: a test that
//! validates a relationship between two models must never make the project
//! unbuildable.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::resource::ResourceKind;
use crate::unique_id::UniqueId;

/// Dependency edge class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Structural dependency (ref/source); cycle-checked
    Ref,
    /// Test-blocking edge (test gates the tested node's dependents); never
    /// cycle-checked, never inserted when it would close a cycle
    Test,
}

/// A directed acyclic graph over resource ids.
///
/// Edges run from dependency to dependent, so a topological walk yields
/// dependencies first. Built once per run from the manifest and never
/// mutated afterwards.
#[derive(Debug)]
pub struct Graph {
    graph: DiGraph<UniqueId, EdgeKind>,
    node_map: HashMap<UniqueId, NodeIndex>,
}

impl Graph {
    /// Resolve every symbolic reference in the manifest and build the graph.
    ///
    /// Fills each resource's `depends_on` with the resolved ids. Refs
    /// always resolve against the full manifest, regardless of any later
    /// selection. Unresolvable references and structural cycles are hard
    /// errors.
    pub fn build(manifest: &mut Manifest) -> CoreResult<Self> {
        let mut resolved: HashMap<UniqueId, Vec<UniqueId>> = HashMap::new();

        for resource in manifest.resources.values() {
            if !resource.enabled {
                continue;
            }
            let mut deps: Vec<UniqueId> = Vec::new();

            for ref_name in &resource.refs {
                match manifest.resolve_ref(ref_name) {
                    Some(target) if target.enabled => deps.push(target.unique_id.clone()),
                    // A disabled target is as unusable as a missing one.
                    Some(_) | None => {
                        return Err(CoreError::UnresolvedRef {
                            resource: resource.unique_id.to_string(),
                            reference: ref_name.to_string(),
                        })
                    }
                }
            }
            for (source_name, table) in &resource.sources {
                match manifest.resolve_source(source_name, table) {
                    Some(target) => deps.push(target.unique_id.clone()),
                    None => {
                        return Err(CoreError::UnresolvedSource {
                            resource: resource.unique_id.to_string(),
                            source_name: source_name.clone(),
                            table: table.clone(),
                        })
                    }
                }
            }

            deps.sort();
            deps.dedup();
            resolved.insert(resource.unique_id.clone(), deps);
        }

        let mut this = Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        };
        for id in resolved.keys() {
            this.add_node(id);
        }
        for (id, deps) in &resolved {
            for dep in deps {
                this.add_edge(dep, id, EdgeKind::Ref);
            }
        }

        this.check_cycles()?;

        for (id, deps) in resolved {
            if let Some(resource) = manifest.resources.get_mut(&id) {
                resource.depends_on = deps;
            }
        }

        Ok(this)
    }

    /// Insert test-blocking edges for a build run.
    ///
    /// For every enabled blocking test, each dependent of the tested node
    /// must wait for the test. An edge that would close a cycle (the
    /// dependent is already upstream of the test, as with mutually
    /// referencing relationship tests) is not inserted.
    pub fn add_test_blocking_edges(&mut self, manifest: &Manifest) {
        let tests: Vec<_> = manifest
            .resources_of_kind(ResourceKind::Test)
            .filter(|t| t.enabled && t.is_blocking_test())
            .map(|t| t.unique_id.clone())
            .collect();

        for test_id in tests {
            let Some(test) = manifest.get(&test_id) else {
                continue;
            };
            for tested in &test.depends_on {
                for dependent in self.dependents_filtered(tested, EdgeKind::Ref) {
                    if dependent == test_id {
                        continue;
                    }
                    // Only models and their peers wait on tests; other tests
                    // of the same node do not gate each other.
                    if manifest.get(&dependent).map(|r| r.kind) == Some(ResourceKind::Test) {
                        continue;
                    }
                    if self.is_reachable(&dependent, &test_id) {
                        log::debug!(
                            "not inserting blocking edge {} -> {}: would close a cycle",
                            test_id,
                            dependent
                        );
                        continue;
                    }
                    self.add_edge(&test_id, &dependent, EdgeKind::Test);
                }
            }
        }
    }

    /// Direct dependencies of a node (all edge kinds).
    pub fn dependencies(&self, id: &UniqueId) -> Vec<UniqueId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct dependents of a node (all edge kinds).
    pub fn dependents(&self, id: &UniqueId) -> Vec<UniqueId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// All transitive dependencies of a node.
    pub fn ancestors(&self, id: &UniqueId) -> Vec<UniqueId> {
        self.collect_reachable(id, Direction::Incoming)
    }

    /// All transitive dependents of a node.
    pub fn descendants(&self, id: &UniqueId) -> Vec<UniqueId> {
        self.collect_reachable(id, Direction::Outgoing)
    }

    /// Whether `to` is reachable from `from` following any edge kind.
    pub fn is_reachable(&self, from: &UniqueId, to: &UniqueId) -> bool {
        let (Some(&start), Some(&goal)) = (self.node_map.get(from), self.node_map.get(to)) else {
            return false;
        };
        if start == goal {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let next = edge.target();
                if next == goal {
                    return true;
                }
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Deterministic topological order over every node.
    ///
    /// Kahn's algorithm with an ordered ready set: ties among
    /// simultaneously-ready nodes always break by id.
    pub fn topological_order(&self) -> Vec<UniqueId> {
        let mut indegree: HashMap<UniqueId, usize> = self
            .node_map
            .keys()
            .map(|id| (id.clone(), self.dependencies(id).len()))
            .collect();

        let mut ready: BTreeSet<UniqueId> = indegree
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let mut order = Vec::with_capacity(self.node_map.len());
        while let Some(id) = ready.pop_first() {
            for dependent in self.dependents(&id) {
                if let Some(n) = indegree.get_mut(&dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(dependent);
                    }
                }
            }
            order.push(id);
        }
        order
    }

    /// Whether the graph contains a node.
    pub fn contains(&self, id: &UniqueId) -> bool {
        self.node_map.contains_key(id)
    }

    /// All node ids, unordered.
    pub fn nodes(&self) -> impl Iterator<Item = &UniqueId> {
        self.node_map.keys()
    }

    fn add_node(&mut self, id: &UniqueId) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(id) {
            idx
        } else {
            let idx = self.graph.add_node(id.clone());
            self.node_map.insert(id.clone(), idx);
            idx
        }
    }

    fn add_edge(&mut self, from: &UniqueId, to: &UniqueId, kind: EdgeKind) {
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        self.graph.add_edge(from_idx, to_idx, kind);
    }

    fn neighbors(&self, id: &UniqueId, direction: Direction) -> Vec<UniqueId> {
        let Some(&idx) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<UniqueId> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| {
                let n = match direction {
                    Direction::Incoming => e.source(),
                    Direction::Outgoing => e.target(),
                };
                self.graph[n].clone()
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn dependents_filtered(&self, id: &UniqueId, kind: EdgeKind) -> Vec<UniqueId> {
        let Some(&idx) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<UniqueId> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| *e.weight() == kind)
            .map(|e| self.graph[e.target()].clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn collect_reachable(&self, id: &UniqueId, direction: Direction) -> Vec<UniqueId> {
        let Some(&start) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        let mut out = Vec::new();
        while let Some(idx) = queue.pop_front() {
            for edge in self.graph.edges_directed(idx, direction) {
                let next = match direction {
                    Direction::Incoming => edge.source(),
                    Direction::Outgoing => edge.target(),
                };
                if visited.insert(next) {
                    out.push(self.graph[next].clone());
                    queue.push_back(next);
                }
            }
        }
        out.sort();
        out
    }

    /// DFS over Ref edges tracking the active path; reports the full cycle.
    fn check_cycles(&self) -> CoreResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        let mut marks: HashMap<NodeIndex, Mark> = self
            .node_map
            .values()
            .map(|&idx| (idx, Mark::Unvisited))
            .collect();

        // Deterministic start order so the same manifest reports the same cycle.
        let mut starts: Vec<NodeIndex> = self.node_map.values().copied().collect();
        starts.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for start in starts {
            if marks[&start] != Mark::Unvisited {
                continue;
            }
            // Iterative DFS: (node, next child cursor) frames, path = active chain.
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
            let mut path: Vec<NodeIndex> = Vec::new();

            marks.insert(start, Mark::Active);
            path.push(start);
            stack.push((start, self.ref_children_sorted(start), 0));

            while let Some((node, children, cursor)) = stack.pop() {
                if cursor < children.len() {
                    let child = children[cursor];
                    stack.push((node, children, cursor + 1));
                    match marks[&child] {
                        Mark::Active => {
                            let pos = path.iter().position(|&n| n == child).unwrap_or(0);
                            let cycle: Vec<String> = path[pos..]
                                .iter()
                                .chain(std::iter::once(&child))
                                .map(|&n| self.graph[n].to_string())
                                .collect();
                            return Err(CoreError::CircularDependency {
                                cycle: cycle.join(" -> "),
                            });
                        }
                        Mark::Unvisited => {
                            marks.insert(child, Mark::Active);
                            path.push(child);
                            stack.push((child, self.ref_children_sorted(child), 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks.insert(node, Mark::Done);
                    path.pop();
                }
            }
        }
        Ok(())
    }

    fn ref_children_sorted(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| *e.weight() == EdgeKind::Ref)
            .map(|e| e.target())
            .collect();
        children.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        children
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
