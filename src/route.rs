//! Zone routing graph
//!
//! Nodes are zone roots, canonical hosts, and alias/proxy hop names,
//! stored in an arena and referenced by index. A multi-source Dijkstra
//! computes the cheapest path from the currently "present" zones to every
//! node; path reconstruction elides zone roots and alias hops so only
//! user-visible hop names remain.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::{error, fmt};

use crate::ssh_config::{BlockLine, Config};

/// Unreachable sentinel. Real distances stay well below this.
pub const INF: u32 = 0x3f3f3f3f;

pub type NodeId = usize;
pub type ZoneId = usize;

/// A host name was queried that no node carries.
#[derive(Debug)]
pub struct UnknownName(pub String);

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown host name: {}", self.0)
    }
}

impl error::Error for UnknownName {}

/// Directed arc. Alias arcs contribute cost but no hop name.
#[derive(Debug, Clone, Copy)]
struct Link {
    to: NodeId,
    cost: u32,
    alias: bool,
}

#[derive(Debug)]
struct Node {
    /// Display name; empty for zone roots, which never appear in paths.
    name: String,
    /// Owning zone, if any. Proxy hops have none.
    zone: Option<ZoneId>,
    adj: Vec<Link>,
    dist: u32,
    /// Predecessor node and whether the arc taken into this node is an
    /// alias arc.
    prev: Option<(NodeId, bool)>,
    vis: bool,
    traced: bool,
    /// Reconstructed path cache, filled on first use after routing.
    path: Option<Vec<String>>,
}

impl Node {
    fn new(name: &str, zone: Option<ZoneId>) -> Self {
        Self {
            name: name.to_string(),
            zone,
            adj: Vec::new(),
            dist: INF,
            prev: None,
            vis: false,
            traced: false,
            path: None,
        }
    }
}

/// A zone: its invisible root node plus the canonical hosts it owns.
#[derive(Debug)]
pub struct Zone {
    pub name: String,
    root: NodeId,
    hosts: Vec<NodeId>,
}

/// The routing graph over every declared zone.
#[derive(Debug, Default)]
pub struct ZoneGraph {
    nodes: Vec<Node>,
    zones: Vec<Zone>,
    by_name: HashMap<String, NodeId>,
    /// Alias shortcuts to canonical nodes; materialised lazily by `arc`.
    aliases: HashMap<String, NodeId>,
    queue: BinaryHeap<Reverse<(u32, NodeId)>>,
}

impl ZoneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, name: &str, zone: Option<ZoneId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::new(name, zone));
        if !name.is_empty() {
            let prior = self.by_name.insert(name.to_string(), id);
            debug_assert!(prior.is_none(), "node name registered twice: {name}");
        }
        id
    }

    fn link(&mut self, from: NodeId, to: NodeId, cost: u32, alias: bool) {
        self.nodes[from].adj.push(Link { to, cost, alias });
    }

    /// Create a zone from its host groups. The first name of each group
    /// becomes a canonical host node; the rest are recorded as alias
    /// shortcuts and only become nodes when an `arc` references them.
    pub fn add(&mut self, name: &str, host_groups: &[Vec<String>]) -> ZoneId {
        let root = self.add_node("", None);
        let zone_id = self.zones.len();
        let mut hosts = Vec::new();
        for group in host_groups {
            let Some(canonical) = group.first() else {
                continue;
            };
            let u = self.add_node(canonical, Some(zone_id));
            hosts.push(u);
            for alias in &group[1..] {
                // An alias is a shortcut into `canonical` from another
                // zone; it may be unreachable even from its own zone.
                self.aliases.insert(alias.clone(), u);
            }
        }

        // Zone roots are invisible on the paths.
        for &u in &hosts {
            self.link(root, u, 10, false);
            self.link(u, root, 0, true);
        }

        self.zones.push(Zone { name: name.to_string(), root, hosts });
        zone_id
    }

    /// Mark a zone as a Dijkstra source. Any number of zones may be.
    pub fn set_src(&mut self, zone: ZoneId) {
        let root = self.zones[zone].root;
        if self.nodes[root].dist != 0 {
            self.nodes[root].dist = 0;
            self.queue.push(Reverse((0, root)));
        }
    }

    /// Add an inter-zone arc. `via` may name an existing node, a declared
    /// alias (materialised here), or an arbitrary hop name, which then
    /// needs `to` to resolve the target zone.
    pub fn arc(&mut self, from: ZoneId, to: Option<ZoneId>, via: &str, cost: u32) -> Result<(), UnknownName> {
        let from_root = self.zones[from].root;
        if via.is_empty() {
            let to = to.ok_or_else(|| UnknownName(String::new()))?;
            let to_root = self.zones[to].root;
            self.link(from_root, to_root, cost, false);
            return Ok(());
        }

        let u = if let Some(&u) = self.by_name.get(via) {
            u
        } else if let Some(&canonical) = self.aliases.get(via) {
            let zone = self.nodes[canonical].zone;
            let u = self.add_node(via, zone);
            self.link(u, canonical, 0, true);
            u
        } else {
            // An arbitrary hostname: a proxy into the target zone.
            let to = to.ok_or_else(|| UnknownName(via.to_string()))?;
            let to_root = self.zones[to].root;
            let u = self.add_node(via, None);
            self.link(u, to_root, 0, false);
            u
        };
        self.link(from_root, u, cost, false);
        Ok(())
    }

    /// Run Dijkstra from the marked sources.
    pub fn route(&mut self) {
        while let Some(Reverse((_, u))) = self.queue.pop() {
            if self.nodes[u].vis {
                continue;
            }
            self.nodes[u].vis = true;
            for i in 0..self.nodes[u].adj.len() {
                let Link { to, cost, alias } = self.nodes[u].adj[i];
                let t = self.nodes[u].dist + cost;
                if self.nodes[to].dist > t {
                    self.nodes[to].dist = t;
                    self.nodes[to].prev = Some((u, alias));
                    self.queue.push(Reverse((t, to)));
                }
            }
        }
    }

    /// Shortest path to `u` as user-visible hop names, or `None` when
    /// unreachable. Zone roots and alias-arc steps contribute no name.
    fn find(&mut self, u: NodeId) -> Option<Vec<String>> {
        if self.nodes[u].dist >= INF {
            return None;
        }
        Some(self.find_cached(u))
    }

    fn find_cached(&mut self, u: NodeId) -> Vec<String> {
        // Walk back to the nearest cached ancestor (or a source), then
        // build and cache forward along the chain.
        let mut chain = Vec::new();
        let mut cur = u;
        let mut path = loop {
            if let Some(path) = &self.nodes[cur].path {
                break path.clone();
            }
            chain.push(cur);
            match self.nodes[cur].prev {
                Some((prev, _)) => cur = prev,
                None => break Vec::new(),
            }
        };
        for &id in chain.iter().rev() {
            let node = &self.nodes[id];
            let via_alias = matches!(node.prev, Some((_, true)));
            if !node.name.is_empty() && !via_alias {
                path.push(node.name.clone());
            }
            self.nodes[id].path = Some(path.clone());
        }
        path
    }

    /// Path for a named node, marking the whole chain as traced so a
    /// pretty-printer can highlight it. `None` when unreachable.
    pub fn trace(&mut self, name: &str) -> Result<Option<Vec<String>>, UnknownName> {
        let u = self.node(name)?;
        let Some(path) = self.find(u) else {
            return Ok(None);
        };

        self.nodes[u].traced = true;
        let mut cur = u;
        while let Some((prev, _)) = self.nodes[cur].prev {
            cur = prev;
            self.nodes[cur].traced = true;
        }
        Ok(Some(path))
    }

    /// Wrapper-mode resolution: `(final hop, comma-joined jumps)`.
    ///
    /// The final hop may be an alias of `name` when `name` is a canonical
    /// host; the caller connects to it as if connecting to the target.
    pub fn resolve(&mut self, name: &str) -> Result<Option<(String, String)>, UnknownName> {
        let u = self.node(name)?;
        Ok(self.find(u).filter(|way| !way.is_empty()).map(|way| {
            let last = way[way.len() - 1].clone();
            let jumps = way[..way.len() - 1].join(",");
            (last, jumps)
        }))
    }

    /// Generator-mode injection: attach every routed node to its final
    /// hop, and add a `ProxyJump` block when the path has a prior jump.
    pub fn inject(&mut self, conf: &mut Config) {
        for u in 0..self.nodes.len() {
            let target = self.nodes[u].name.clone();
            if target.is_empty() {
                continue;
            }
            let Some(way) = self.find(u) else {
                continue;
            };
            let Some(final_hop) = way.last() else {
                continue;
            };

            // The final hop does not need ProxyJump to itself; we connect
            // to it as if connecting to the target.
            conf.attach(&target, final_hop);

            if way.len() >= 2 {
                let last_jump = &way[way.len() - 2];
                let comment = format!("[{}]", way[..way.len() - 1].join(", "));
                conf.add_host(
                    &[target],
                    vec![BlockLine::Raw(format!("ProxyJump {last_jump}"))],
                    &comment,
                );
            }
        }
    }

    /// Does `zone` own `name` (normalised through the alias map)?
    pub fn contains(&self, zone: ZoneId, name: &str) -> bool {
        let u = match self.aliases.get(name) {
            Some(&canonical) => canonical,
            None => match self.by_name.get(name) {
                Some(&u) => u,
                None => return false,
            },
        };
        self.nodes[u].zone == Some(zone)
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Whether `name` sits on a traced chain; printers highlight these.
    pub fn traced(&self, name: &str) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|&u| self.nodes[u].traced)
    }

    fn node(&self, name: &str) -> Result<NodeId, UnknownName> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| UnknownName(name.to_string()))
    }

    /// Every user-visible name: node names plus aliases not yet
    /// materialised.
    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = self.by_name.keys().cloned().collect();
        out.extend(self.aliases.keys().filter(|k| !self.by_name.contains_key(*k)).cloned());
        out
    }

    /// Canonical and proxy host names, excluding alias names.
    pub fn host_names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| !n.name.is_empty() && !self.aliases.contains_key(&n.name))
            .map(|n| n.name.clone())
            .collect()
    }

    /// Per-zone routing summary for diagnostics: name, distance, path.
    pub fn zone_paths(&mut self) -> Vec<(String, u32, Option<Vec<String>>)> {
        let mut out = Vec::new();
        for z in 0..self.zones.len() {
            let root = self.zones[z].root;
            let dist = self.nodes[root].dist;
            let way = self.find(root);
            out.push((self.zones[z].name.clone(), dist, way));
        }
        out
    }

    /// Distance to a zone's root.
    pub fn zone_dist(&self, zone: ZoneId) -> u32 {
        self.nodes[self.zones[zone].root].dist
    }

    /// The canonical hosts a zone owns, in declaration order.
    pub fn zone_hosts(&self, zone: ZoneId) -> Vec<String> {
        self.zones[zone]
            .hosts
            .iter()
            .map(|&u| self.nodes[u].name.clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "test/route.rs"]
mod tests;
