//! Arena-indexed role graph with domain partitions
//!
//! Each domain owns one [`DomainGraph`]: nodes live in an `IndexMap` whose
//! position is the node id, and every node keeps ordered adjacency sets of
//! node ids in both directions. Cycle-checked insertion copies the two
//! touched adjacency rows first and restores them if the new link closes a
//! cycle.

use indexmap::{IndexMap, IndexSet};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

use super::{MatchingFn, RoleManager, DEFAULT_MAX_HIERARCHY_LEVEL};
use crate::error::RbacError;

/// Partition key for links added without a domain
const DEFAULT_DOMAIN: &str = "\u{0}default";

#[derive(Debug, Clone, Default, PartialEq)]
struct Node {
    /// Roles this node inherits
    roles: IndexSet<usize>,
    /// Nodes inheriting this role
    users: IndexSet<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct DomainGraph {
    nodes: IndexMap<String, Node>,
}

/// Adjacency rows copied before a tentative insertion
struct Checkpoint {
    len: usize,
    rows: Vec<(usize, Node)>,
}

impl DomainGraph {
    fn intern(&mut self, name: &str) -> usize {
        if let Some(idx) = self.nodes.get_index_of(name) {
            return idx;
        }
        self.nodes.insert_full(name.to_string(), Node::default()).0
    }

    fn name(&self, idx: usize) -> &str {
        self.nodes.get_index(idx).map(|(k, _)| k.as_str()).unwrap_or("")
    }

    fn node(&self, idx: usize) -> Option<&Node> {
        self.nodes.get_index(idx).map(|(_, n)| n)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node> {
        self.nodes.get_index_mut(idx).map(|(_, n)| n)
    }

    /// Ids of every node `name` matches, exactly or through `mf`
    fn matching(&self, name: &str, mf: Option<MatchingFn>) -> Vec<usize> {
        match mf {
            None => self.nodes.get_index_of(name).into_iter().collect(),
            Some(f) => self
                .nodes
                .keys()
                .enumerate()
                .filter(|(_, stored)| stored.as_str() == name || f(name, stored.as_str()))
                .map(|(idx, _)| idx)
                .collect(),
        }
    }

    fn checkpoint(&self, name1: &str, name2: &str) -> Checkpoint {
        let rows = [name1, name2]
            .iter()
            .filter_map(|name| {
                self.nodes
                    .get_full(*name)
                    .map(|(idx, _, node)| (idx, node.clone()))
            })
            .collect();
        Checkpoint {
            len: self.nodes.len(),
            rows,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.nodes.truncate(checkpoint.len);
        for (idx, row) in checkpoint.rows {
            if let Some(node) = self.node_mut(idx) {
                *node = row;
            }
        }
    }

    fn link(&mut self, from: usize, to: usize) {
        if let Some(node) = self.node_mut(from) {
            node.roles.insert(to);
        }
        if let Some(node) = self.node_mut(to) {
            node.users.insert(from);
        }
    }

    fn unlink(&mut self, from: usize, to: usize) {
        if let Some(node) = self.node_mut(from) {
            node.roles.shift_remove(&to);
        }
        if let Some(node) = self.node_mut(to) {
            node.users.shift_remove(&from);
        }
    }

    /// Shortest path `from -> ... -> to` over exact links
    fn path(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        let mut parent: IndexMap<usize, usize> = IndexMap::new();
        let mut queue = VecDeque::from([from]);
        parent.insert(from, from);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current];
                let mut cursor = current;
                while cursor != from {
                    cursor = *parent.get(&cursor)?;
                    path.push(cursor);
                }
                path.reverse();
                return Some(path);
            }
            for &next in self.node(current)?.roles.iter() {
                if !parent.contains_key(&next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

/// Default [`RoleManager`] implementation.
///
/// `has_link` walks links breadth-first, following at most
/// `max_hierarchy_level` of them. When a matching function is set, every
/// name comparison goes through it, so one request name may start from
/// several stored nodes (for example `/book/1` matching `/book/:id`).
#[derive(Debug, Clone)]
pub struct DefaultRoleManager {
    domains: IndexMap<String, DomainGraph>,
    max_hierarchy_level: usize,
    matching_fn: Option<MatchingFn>,
    domain_matching_fn: Option<MatchingFn>,
    cycle_detection: bool,
}

impl DefaultRoleManager {
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            domains: IndexMap::new(),
            max_hierarchy_level,
            matching_fn: None,
            domain_matching_fn: None,
            cycle_detection: false,
        }
    }

    /// Builder-style variant of [`RoleManager::enable_cycle_detection`]
    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.cycle_detection = enabled;
        self
    }

    fn names_match(&self, name: &str, stored: &str) -> bool {
        name == stored || self.matching_fn.map_or(false, |f| f(name, stored))
    }

    /// Graphs visible to a query in `domain`
    fn graphs(&self, domain: Option<&str>) -> Vec<&DomainGraph> {
        match (domain, self.domain_matching_fn) {
            (Some(d), Some(f)) => self
                .domains
                .iter()
                .filter(|(key, _)| key.as_str() != DEFAULT_DOMAIN && (key.as_str() == d || f(d, key.as_str())))
                .map(|(_, graph)| graph)
                .collect(),
            _ => self
                .domains
                .get(domain.unwrap_or(DEFAULT_DOMAIN))
                .into_iter()
                .collect(),
        }
    }

    fn neighbours(&self, name: &str, domain: Option<&str>, roles: bool) -> Vec<String> {
        let mut out: IndexSet<String> = IndexSet::new();
        for graph in self.graphs(domain) {
            for idx in graph.matching(name, self.matching_fn) {
                let Some(node) = graph.node(idx) else { continue };
                let edges = if roles { &node.roles } else { &node.users };
                out.extend(edges.iter().map(|&n| graph.name(n).to_string()));
            }
        }
        out.into_iter().collect()
    }
}

impl Default for DefaultRoleManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HIERARCHY_LEVEL)
    }
}

impl RoleManager for DefaultRoleManager {
    fn clear(&mut self) {
        debug!(domains = self.domains.len(), "Clearing role graph");
        self.domains.clear();
    }

    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> Result<(), RbacError> {
        let key = domain.unwrap_or(DEFAULT_DOMAIN);

        if !self.cycle_detection {
            let graph = self.domains.entry(key.to_string()).or_default();
            let from = graph.intern(name1);
            let to = graph.intern(name2);
            graph.link(from, to);
            return Ok(());
        }

        if name1 == name2 {
            warn!(role = name1, "Rejected self-referencing role link");
            return Err(RbacError::CycleDetected {
                path: format!("{} -> {}", name1, name2),
            });
        }

        let created_domain = !self.domains.contains_key(key);
        let graph = self.domains.entry(key.to_string()).or_default();
        let checkpoint = graph.checkpoint(name1, name2);
        let from = graph.intern(name1);
        let to = graph.intern(name2);
        graph.link(from, to);

        let Some(cycle) = graph.path(to, from) else {
            return Ok(());
        };

        let path = std::iter::once(name1)
            .chain(cycle.iter().map(|&idx| graph.name(idx)))
            .collect::<Vec<_>>()
            .join(" -> ");
        graph.restore(checkpoint);
        if created_domain {
            self.domains.shift_remove(key);
        }

        warn!(path = %path, "Rejected role link closing a cycle");
        Err(RbacError::CycleDetected { path })
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        let Some(graph) = self.domains.get_mut(domain.unwrap_or(DEFAULT_DOMAIN)) else {
            return;
        };
        if let (Some(from), Some(to)) = (graph.nodes.get_index_of(name1), graph.nodes.get_index_of(name2)) {
            graph.unlink(from, to);
        }
    }

    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        if self.names_match(name1, name2) {
            return true;
        }

        let graphs = self.graphs(domain);
        let mut visited: HashSet<&str> = HashSet::new();
        let mut frontier: Vec<&str> = vec![name1];

        for _ in 0..self.max_hierarchy_level {
            let mut next = Vec::new();
            for name in &frontier {
                for graph in &graphs {
                    for idx in graph.matching(name, self.matching_fn) {
                        let Some(node) = graph.node(idx) else { continue };
                        for &role_idx in &node.roles {
                            let role = graph.name(role_idx);
                            if self.names_match(name2, role) {
                                return true;
                            }
                            if visited.insert(role) {
                                next.push(role);
                            }
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        false
    }

    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.neighbours(name, domain, true)
    }

    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.neighbours(name, domain, false)
    }

    fn get_domains(&self) -> Vec<String> {
        self.domains
            .keys()
            .filter(|key| key.as_str() != DEFAULT_DOMAIN)
            .cloned()
            .collect()
    }

    fn set_matching_fn(&mut self, f: Option<MatchingFn>) {
        self.matching_fn = f;
    }

    fn set_domain_matching_fn(&mut self, f: Option<MatchingFn>) {
        self.domain_matching_fn = f;
    }

    fn set_max_hierarchy_level(&mut self, level: usize) {
        self.max_hierarchy_level = level;
    }

    fn enable_cycle_detection(&mut self, enabled: bool) {
        self.cycle_detection = enabled;
    }
}
