//! Zone definition loader
//!
//! Parses the sectioned zone file, validates it, populates the routing
//! graph, and decides which zones the current process is inside. Also
//! owns the out-of-process hook surface and the cache-state key used by
//! the generator.

use ipnetwork::Ipv4Network;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::{env, error, fmt, fs, io};

use crate::diag;
use crate::probe::Locality;
use crate::route::{ZoneGraph, ZoneId};
use crate::ssh_config::Config;

/// Default arc cost when a spec carries none.
const DEFAULT_COST: u32 = 20;

/// Zone-file and graph-construction errors, surfaced with the offending
/// token.
#[derive(Debug)]
pub enum ZoneError {
    /// A key/value line outside any section, or one with no delimiter.
    Parse(String),
    /// The same host or alias name declared by two zones.
    DuplicateName { name: String, zone: String },
    /// An arc referenced a section that does not exist.
    UnknownZone(String),
    /// An arc cost failed to parse as an integer.
    BadCost(String),
    /// An arc spec with too many parts.
    BadArc(String),
    /// An arc `via` that resolves to nothing and has no target zone.
    MissingTarget(String),
    /// A subnet that is not a valid IPv4 CIDR.
    BadSubnet(String),
    /// A timezone that is not a number of hours.
    BadTimezone(String),
    /// A hook path escaping the current working directory.
    HookOutsideCwd(PathBuf),
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneError::Parse(line) => write!(f, "malformed zone file line: {line}"),
            ZoneError::DuplicateName { name, zone } => {
                write!(f, "duplicate name {name} in zone {zone}")
            }
            ZoneError::UnknownZone(token) => write!(f, "unknown zone in arc: {token}"),
            ZoneError::BadCost(token) => write!(f, "invalid arc cost: {token}"),
            ZoneError::BadArc(token) => write!(f, "invalid arc spec: {token}"),
            ZoneError::MissingTarget(via) => {
                write!(f, "unknown via {via} without target zone")
            }
            ZoneError::BadSubnet(token) => write!(f, "invalid subnet: {token}"),
            ZoneError::BadTimezone(token) => write!(f, "invalid timezone: {token}"),
            ZoneError::HookOutsideCwd(path) => {
                write!(f, "hook outside working directory: {}", path.display())
            }
        }
    }
}

impl error::Error for ZoneError {}

/// One zone as declared in the file, before graph population.
#[derive(Debug)]
struct ZoneDef {
    name: String,
    /// Host groups; each group is canonical name plus aliases.
    hosts: Vec<Vec<String>>,
    subnets: Vec<Ipv4Network>,
    timezone: Option<f64>,
    hook: Option<PathBuf>,
    arcs: Vec<String>,
    strict_host: bool,
    /// Graph id, filled during population.
    zone: ZoneId,
}

/// The loaded zone configuration: definitions plus the populated graph.
pub struct ZoneConfig {
    defs: Vec<ZoneDef>,
    graph: ZoneGraph,
    hooks: Vec<PathBuf>,
    zone_names: HashMap<String, ZoneId>,
}

impl ZoneConfig {
    /// Load and validate a zone file. When the host configuration is
    /// given, non-strict zones discover additional hosts from it by
    /// subnet membership.
    pub fn load(path: &Path, conf: Option<&Config>) -> crate::Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, conf)
    }

    pub fn parse(text: &str, conf: Option<&Config>) -> crate::Result<Self> {
        let sections = parse_ini(text)?;

        let mut defs = Vec::new();
        let mut vis = HashSet::new();
        for (name, pairs) in sections {
            let def = ZoneDef::from_pairs(name, &pairs, &mut vis)?;
            defs.push(def);
        }

        if let Some(conf) = conf {
            discover_hosts(&mut defs, conf, &mut vis);
        }

        let mut graph = ZoneGraph::new();
        let mut hooks = Vec::new();
        let mut zone_names = HashMap::new();
        for def in &mut defs {
            def.zone = graph.add(&def.name, &def.hosts);
            zone_names.insert(def.name.clone(), def.zone);
            if let Some(hook) = &def.hook {
                hooks.push(check_hook(hook)?);
            }
        }

        let mut cfg = Self {
            defs,
            graph,
            hooks,
            zone_names,
        };
        for i in 0..cfg.defs.len() {
            let from = cfg.defs[i].zone;
            for spec in cfg.defs[i].arcs.clone() {
                let (to, via, cost) = cfg.parse_arc(&spec)?;
                cfg.graph
                    .arc(from, to, &via, cost.unwrap_or(DEFAULT_COST))
                    .map_err(|err| ZoneError::MissingTarget(err.0))?;
            }
        }
        Ok(cfg)
    }

    /// Arc spec grammar, colon-split: `via:to:cost`, `via:cost`, `via:to`,
    /// or a single token that is either a zone (direct link) or a hop
    /// name. Direct link to a zone is preferred.
    fn parse_arc(&self, spec: &str) -> Result<(Option<ZoneId>, String, Option<u32>), ZoneError> {
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [via, to, cost] => {
                let to = *self
                    .zone_names
                    .get(*to)
                    .ok_or_else(|| ZoneError::UnknownZone(spec.to_string()))?;
                let cost = cost
                    .parse()
                    .map_err(|_| ZoneError::BadCost(spec.to_string()))?;
                Ok((Some(to), via.to_string(), Some(cost)))
            }
            [via, second] => {
                if let Ok(cost) = second.parse::<u32>() {
                    Ok(self.resolve_spec(via, Some(cost)))
                } else {
                    let to = *self
                        .zone_names
                        .get(*second)
                        .ok_or_else(|| ZoneError::UnknownZone(spec.to_string()))?;
                    Ok((Some(to), via.to_string(), None))
                }
            }
            [single] => Ok(self.resolve_spec(single, None)),
            _ => Err(ZoneError::BadArc(spec.to_string())),
        }
    }

    fn resolve_spec(&self, spec: &str, cost: Option<u32>) -> (Option<ZoneId>, String, Option<u32>) {
        match self.zone_names.get(spec) {
            Some(&to) => (Some(to), String::new(), cost),
            // The target zone is resolved from the via.
            None => (None, spec.to_string(), cost),
        }
    }

    /// Mark the zones whose predicates hold as sources and run routing.
    pub fn route(&mut self, loc: &Locality) -> &mut ZoneGraph {
        let sources: Vec<ZoneId> = self
            .defs
            .iter()
            .filter(|def| self.in_zone(def, loc))
            .map(|def| def.zone)
            .collect();
        for zone in sources {
            self.graph.set_src(zone);
        }
        diag::trace(">route");
        self.graph.route();
        diag::trace("route");
        &mut self.graph
    }

    /// A zone is a source iff its timezone matches (when given) AND any
    /// of its subnets is local (when given). No constraint always hits.
    fn in_zone(&self, def: &ZoneDef, loc: &Locality) -> bool {
        if let Some(tz) = def.timezone {
            if !loc.check_timezone(tz) {
                return false;
            }
        }
        if !def.subnets.is_empty() {
            return def.subnets.iter().any(|net| loc.check_subnet(net));
        }
        true
    }

    /// Stable key over everything that can change between runs without the
    /// input files changing: the local timezone and the interface view.
    pub fn state(&self, loc: &Locality) -> String {
        let mut parts = Vec::new();
        if self.defs.iter().any(|d| d.timezone.is_some()) {
            parts.push(format!("tz:{}", loc.utc_offset()));
        }
        if self.defs.iter().any(|d| !d.subnets.is_empty()) {
            parts.push(format!("if:{}", loc.probe()));
        }
        parts.join("|")
    }

    pub fn graph(&mut self) -> &mut ZoneGraph {
        &mut self.graph
    }

    /// Run every hook with the event name as its argument and the payload
    /// as JSON on stdin.
    pub fn run_hooks<P: Serialize>(&self, event: &str, payload: &P) -> io::Result<()> {
        if self.hooks.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_vec(payload)?;
        for hook in &self.hooks {
            let mut child = Command::new(hook)
                .arg(event)
                .stdin(Stdio::piped())
                .spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&body)?;
            }
            child.wait()?;
        }
        Ok(())
    }

    fn has_host(&self, name: &str) -> bool {
        self.graph.has_node(name) && !self.zone_names.contains_key(name)
    }

    /// Direct-mode resolution: `Some(destination)` bypasses routing. A
    /// `d.`-prefixed name whose suffix is managed unwraps to the suffix;
    /// an unmanaged name passes through as-is; a managed name routes
    /// normally (`None`).
    pub fn resolve_direct_mode(&self, host: &str) -> Option<String> {
        if self.has_host(host) {
            return None;
        }
        if let Some(real) = host.strip_prefix("d.") {
            if self.has_host(real) {
                return Some(real.to_string());
            }
        }
        // Direct for the unmanaged host.
        Some(host.to_string())
    }
}

impl ZoneDef {
    fn from_pairs(
        name: String,
        pairs: &[(String, String)],
        vis: &mut HashSet<String>,
    ) -> Result<Self, ZoneError> {
        let mut def = Self {
            name,
            hosts: Vec::new(),
            subnets: Vec::new(),
            timezone: None,
            hook: None,
            arcs: Vec::new(),
            strict_host: false,
            zone: 0,
        };
        for (key, value) in pairs {
            match key.as_str() {
                "host" => {
                    for spec in value.split_whitespace() {
                        let aliases: Vec<String> = spec.split(':').map(str::to_string).collect();
                        for alias in &aliases {
                            if !vis.insert(alias.clone()) {
                                return Err(ZoneError::DuplicateName {
                                    name: alias.clone(),
                                    zone: def.name.clone(),
                                });
                            }
                        }
                        def.hosts.push(aliases);
                    }
                }
                "subnet" => {
                    for cidr in value.split_whitespace() {
                        let net = cidr
                            .parse::<Ipv4Network>()
                            .map_err(|_| ZoneError::BadSubnet(cidr.to_string()))?;
                        def.subnets.push(net);
                    }
                }
                "timezone" => {
                    let tz = value
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| ZoneError::BadTimezone(value.clone()))?;
                    def.timezone = Some(tz);
                }
                "hook" => def.hook = Some(PathBuf::from(value.trim())),
                "arc" => def.arcs.extend(value.split_whitespace().map(str::to_string)),
                "strict-host" => def.strict_host = parse_bool(value),
                _ => {}
            }
        }
        Ok(def)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "yes" | "true" | "on")
}

/// Parse the sectioned key/value format: `[section]` headers, `key =
/// value` or `key: value` pairs (earliest delimiter wins), `#`/`;`
/// comments, and indented continuation lines.
fn parse_ini(text: &str) -> Result<Vec<(String, Vec<(String, String)>)>, ZoneError> {
    let mut sections: Vec<(String, Vec<(String, String)>)> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        // Indented lines continue the previous value.
        if line.starts_with(char::is_whitespace) {
            let pair = sections
                .last_mut()
                .and_then(|(_, pairs)| pairs.last_mut())
                .ok_or_else(|| ZoneError::Parse(line.to_string()))?;
            pair.1.push(' ');
            pair.1.push_str(trimmed);
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sections.push((name.trim().to_string(), Vec::new()));
            continue;
        }

        let eq = line.find('=');
        let colon = line.find(':');
        let delim = match (eq, colon) {
            (Some(e), Some(c)) => Some(e.min(c)),
            (Some(e), None) => Some(e),
            (None, Some(c)) => Some(c),
            (None, None) => None,
        };
        let Some(delim) = delim else {
            return Err(ZoneError::Parse(line.to_string()));
        };
        let key = line[..delim].trim().to_lowercase();
        let value = line[delim + 1..].trim().to_string();
        let (_, pairs) = sections
            .last_mut()
            .ok_or_else(|| ZoneError::Parse(line.to_string()))?;
        // Later duplicates override, continuation aside.
        if let Some(pair) = pairs.iter_mut().find(|(k, _)| *k == key) {
            pair.1 = value;
        } else {
            pairs.push((key, value));
        }
    }
    Ok(sections)
}

/// Hook files must sit inside the working directory.
fn check_hook(path: &Path) -> crate::Result<PathBuf> {
    let cwd = env::current_dir()?.canonicalize()?;
    let real = fs::canonicalize(path)?;
    if !real.starts_with(&cwd) {
        return Err(ZoneError::HookOutsideCwd(path.to_path_buf()).into());
    }
    Ok(real)
}

/// Find SSH hosts in the declared subnets: a host whose `Hostname` is an
/// IPv4 address inside a non-strict zone's subnet becomes one of its
/// canonical hosts, and the lexically following hosts sharing its name as
/// a prefix become aliases. Hosts already claimed anywhere are skipped.
fn discover_hosts(defs: &mut [ZoneDef], conf: &Config, vis: &mut HashSet<String>) {
    if !defs.iter().any(|d| !d.strict_host) {
        return;
    }

    let mut pairs = conf.hostnames();
    pairs.sort();

    // Sorted cursor over the config's hosts, shared by all discoveries;
    // claimed hosts are filtered at advance time.
    let mut all_hosts: Option<Vec<String>> = None;
    let mut cursor = 0usize;
    let mut curr: Option<String> = None;

    for (host, hostname) in pairs {
        if vis.contains(&host) {
            continue;
        }
        let Ok(ip) = hostname.parse::<Ipv4Addr>() else {
            continue;
        };

        'defs: for def in defs.iter_mut().filter(|d| !d.strict_host) {
            for net in def.subnets.clone() {
                if !net.contains(ip) {
                    continue;
                }
                let hosts = all_hosts.get_or_insert_with(|| {
                    let mut hosts = conf.hosts();
                    hosts.sort();
                    hosts
                });

                let mut aliases = vec![host.clone()];
                while curr.as_deref() != Some(host.as_str()) {
                    curr = advance(hosts, &mut cursor, vis);
                    if curr.is_none() {
                        break;
                    }
                }
                vis.insert(host.clone());
                loop {
                    curr = advance(hosts, &mut cursor, vis);
                    match &curr {
                        Some(next) if next.starts_with(host.as_str()) => {
                            vis.insert(next.clone());
                            aliases.push(next.clone());
                        }
                        _ => break,
                    }
                }
                def.hosts.push(aliases);
                break 'defs;
            }
        }
    }
}

fn advance(hosts: &[String], cursor: &mut usize, vis: &HashSet<String>) -> Option<String> {
    while *cursor < hosts.len() {
        let host = &hosts[*cursor];
        *cursor += 1;
        if !vis.contains(host) {
            return Some(host.clone());
        }
    }
    None
}

#[cfg(test)]
#[path = "test/zone.rs"]
mod tests;
