//! Local network probe
//!
//! Decides whether the current process sits inside a zone by looking at
//! the machine's IPv4 interfaces or its default gateways, plus the system
//! timezone. Enumeration shells out to the platform's stock tooling, so
//! construction is deferred until a zone actually declares a subnet and
//! the result is memoised for the process lifetime.

use chrono::Local;
use ipnetwork::Ipv4Network;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::{env, fmt, process::Command};

use crate::diag;

/// Non-loopback IPv4 interfaces, stored in address/prefix form.
#[derive(Debug, Clone)]
pub struct Interfaces {
    ints: Vec<Ipv4Network>,
}

impl Interfaces {
    /// Enumerate the local interfaces. Failures degrade to an empty set,
    /// leaving every subnet constraint unmet.
    pub fn probe() -> Self {
        let ints = match enumerate_interfaces() {
            Ok(ints) => ints,
            Err(err) => {
                diag!("interfaces: enumeration failed: {err}");
                Vec::new()
            }
        };
        Self::from_addrs(ints)
    }

    /// Build from known addresses; used by tests and fallbacks.
    pub fn from_addrs(ints: Vec<Ipv4Network>) -> Self {
        let ints = ints.into_iter().filter(|i| !i.ip().is_loopback()).collect();
        Self { ints }
    }

    /// The interface whose network equals `net`, if any. The flags broaden
    /// the comparison to subnet-of / superset-of.
    pub fn check_subnet(&self, net: &Ipv4Network, as_sub: bool, as_super: bool) -> Option<Ipv4Network> {
        let wanted = masked(net);
        for intf in &self.ints {
            if masked(intf) == wanted {
                return Some(*intf);
            }
        }
        if as_sub || as_super {
            for intf in &self.ints {
                let intf_net = masked(intf);
                if (as_sub && is_subnet_of(&wanted, &intf_net)) || (as_super && is_subnet_of(&intf_net, &wanted)) {
                    return Some(*intf);
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.ints.is_empty()
    }
}

impl fmt::Display for Interfaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.ints.iter().map(|i| i.to_string()).collect();
        names.sort();
        write!(f, "interfaces: {}", names.join(", "))
    }
}

/// Default-route gateway addresses.
#[derive(Debug, Clone)]
pub struct Gateways {
    gws: BTreeSet<Ipv4Addr>,
}

impl Gateways {
    pub fn probe() -> Self {
        let gws = match enumerate_gateways() {
            Ok(gws) => gws,
            Err(err) => {
                diag!("gateways: enumeration failed: {err}");
                Vec::new()
            }
        };
        Self::from_addrs(gws)
    }

    pub fn from_addrs(gws: Vec<Ipv4Addr>) -> Self {
        let gws = gws.into_iter().filter(|gw| !gw.is_loopback()).collect();
        Self { gws }
    }

    /// The gateway lying inside `net`, if any.
    pub fn check_subnet(&self, net: &Ipv4Network) -> Option<Ipv4Addr> {
        self.gws.iter().copied().find(|gw| net.contains(*gw))
    }

    pub fn is_empty(&self) -> bool {
        self.gws.is_empty()
    }
}

impl fmt::Display for Gateways {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.gws.iter().map(|gw| gw.to_string()).collect();
        write!(f, "gateways: {}", names.join(", "))
    }
}

/// The active probe back-end.
///
/// Gateways are cheaper to enumerate and more permissive, so they are
/// preferred unless `LUNA_STRICT_SUBNET` is set or none are found.
#[derive(Debug, Clone)]
pub enum Backend {
    Interfaces(Interfaces),
    Gateways(Gateways),
}

impl Backend {
    pub fn detect() -> Self {
        if env::var_os("LUNA_STRICT_SUBNET").is_none() {
            let gws = Gateways::probe();
            if !gws.is_empty() {
                return Backend::Gateways(gws);
            }
        }
        Backend::Interfaces(Interfaces::probe())
    }

    pub fn check_subnet(&self, net: &Ipv4Network) -> bool {
        match self {
            Backend::Interfaces(ints) => ints.check_subnet(net, false, false).is_some(),
            Backend::Gateways(gws) => gws.check_subnet(net).is_some(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Interfaces(ints) => fmt::Display::fmt(ints, f),
            Backend::Gateways(gws) => fmt::Display::fmt(gws, f),
        }
    }
}

// Process-wide memoised probe state. Observed once, immutable afterwards.
static PROBE: OnceCell<Backend> = OnceCell::new();
static UTC_OFFSET: OnceCell<f64> = OnceCell::new();

/// Where this process runs: probe back-end plus UTC offset, both resolved
/// lazily. The default construction shares the process-wide memoisation;
/// tests inject fixed values instead.
#[derive(Debug, Default)]
pub struct Locality {
    fixed: Option<(Backend, f64)>,
}

impl Locality {
    /// The shared process-wide view.
    pub fn shared() -> Self {
        Self { fixed: None }
    }

    /// A fixed view for deterministic tests.
    pub fn fixed(backend: Backend, utc_offset: f64) -> Self {
        Self {
            fixed: Some((backend, utc_offset)),
        }
    }

    pub fn probe(&self) -> &Backend {
        match &self.fixed {
            Some((backend, _)) => backend,
            None => PROBE.get_or_init(|| {
                diag::trace(">probe");
                let backend = Backend::detect();
                diag::trace("probe");
                backend
            }),
        }
    }

    /// Current offset from UTC in seconds.
    pub fn utc_offset(&self) -> f64 {
        match &self.fixed {
            Some((_, offset)) => *offset,
            None => *UTC_OFFSET.get_or_init(|| f64::from(Local::now().offset().local_minus_utc())),
        }
    }

    /// Does the local clock sit at `hours` east of UTC?
    pub fn check_timezone(&self, hours: f64) -> bool {
        self.utc_offset() == hours * 3600.0
    }

    pub fn check_subnet(&self, net: &Ipv4Network) -> bool {
        self.probe().check_subnet(net)
    }
}

fn masked(net: &Ipv4Network) -> (Ipv4Addr, u8) {
    (net.network(), net.prefix())
}

fn is_subnet_of(inner: &(Ipv4Addr, u8), outer: &(Ipv4Addr, u8)) -> bool {
    let (inner_net, inner_prefix) = *inner;
    let (outer_net, outer_prefix) = *outer;
    if inner_prefix < outer_prefix {
        return false;
    }
    match Ipv4Network::new(outer_net, outer_prefix) {
        Ok(outer) => outer.contains(inner_net),
        Err(_) => false,
    }
}

fn command_text(program: &str, args: &[&str]) -> std::io::Result<String> {
    let out = Command::new(program).args(args).output()?;
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

#[cfg(unix)]
fn enumerate_interfaces() -> std::io::Result<Vec<Ipv4Network>> {
    let out = command_text("ip", &["-4", "addr"])?;
    let reg = Regex::new(r"inet (\d+\.\d+\.\d+\.\d+/\d+)").expect("interface pattern is valid");
    Ok(reg
        .captures_iter(&out)
        .filter_map(|m| m[1].parse().ok())
        .collect())
}

#[cfg(windows)]
fn enumerate_interfaces() -> std::io::Result<Vec<Ipv4Network>> {
    let out = command_text("ipconfig", &[])?;
    let reg = Regex::new(r"IPv4[^\r\n]*: (\d+\.\d+\.\d+\.\d+)\s+[^\r\n]*: (\d+\.\d+\.\d+\.\d+)")
        .expect("interface pattern is valid");
    let mut ints = Vec::new();
    for m in reg.captures_iter(&out) {
        let (Ok(addr), Ok(mask)) = (m[1].parse::<Ipv4Addr>(), m[2].parse::<Ipv4Addr>()) else {
            continue;
        };
        let prefix = u32::from(mask).count_ones() as u8;
        if let Ok(net) = Ipv4Network::new(addr, prefix) {
            ints.push(net);
        }
    }
    Ok(ints)
}

#[cfg(unix)]
fn enumerate_gateways() -> std::io::Result<Vec<Ipv4Addr>> {
    let out = command_text("ip", &["-4", "route"])?;
    let reg = Regex::new(r"default via (\d+\.\d+\.\d+\.\d+)").expect("gateway pattern is valid");
    Ok(reg
        .captures_iter(&out)
        .filter_map(|m| m[1].parse().ok())
        .collect())
}

#[cfg(windows)]
fn enumerate_gateways() -> std::io::Result<Vec<Ipv4Addr>> {
    let out = command_text("ipconfig", &[])?;
    let reg = Regex::new(r"Gateway[ .]*: (\d+\.\d+\.\d+\.\d+)").expect("gateway pattern is valid");
    Ok(reg
        .captures_iter(&out)
        .filter_map(|m| m[1].parse().ok())
        .collect())
}

#[cfg(test)]
#[path = "test/probe.rs"]
mod tests;
