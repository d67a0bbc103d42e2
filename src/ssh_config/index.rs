//! The block index: ingestion, effective-directive queries, synthesis

use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, BufRead};

use super::{Block, BlockLine, Directive};

/// One line of a query result, with the directive it parses to and the
/// arena index of the block it came from.
#[derive(Debug, Clone)]
pub struct Line {
    pub text: String,
    pub dir: Directive,
    pub blk: usize,
}

/// The parsed host configuration.
///
/// Blocks live in an arena and are referenced by index from the exact-host
/// map and the wildcard list. Synthesised blocks print before the input
/// blocks so their directives win under ssh's first-match rule.
#[derive(Debug, Default)]
pub struct Config {
    /// Arena of every block, input and synthesised.
    blks: Vec<Block>,
    /// Input blocks in encounter order.
    order: Vec<usize>,
    /// Synthesised blocks in creation order.
    ext_order: Vec<usize>,
    /// Exact (non-wildcard, non-negated) pattern to blocks declaring it.
    host_map: HashMap<String, Vec<usize>>,
    /// Blocks with at least one wildcard pattern, each listed once.
    wildcards: Vec<usize>,
    /// Payload-content dedup for synthesised blocks.
    ext_cache: HashMap<Vec<String>, usize>,
}

impl Config {
    /// Read a host-configuration document.
    pub fn parse<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut cfg = Self::default();
        let mut blk = Block::new("", vec!["*".to_string()], false, "");

        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end();
            let dir = Directive::parse(line);
            if dir.opt() == "host" {
                blk = cfg.flush(blk, Block::new(line, dir.values, false, ""));
            } else if dir.opt() == "match" {
                blk = cfg.flush(blk, Block::new(line, Vec::new(), false, ""));
            } else if !line.trim_start().is_empty() {
                blk.push(BlockLine::Raw(line.to_string()));
            }
        }
        cfg.push_blk(blk, false);

        // The leading block collects directives seen before any header;
        // label it so they act as defaults for every host.
        let default = cfg.order[0];
        if !cfg.blks[default].is_empty() {
            cfg.blks[default].header = "Host *  # Default".to_string();
        }
        Ok(cfg)
    }

    fn flush(&mut self, blk: Block, next: Block) -> Block {
        self.push_blk(blk, false);
        next
    }

    fn push_blk(&mut self, blk: Block, ext: bool) -> usize {
        let idx = self.blks.len();
        let mut has_wildcards = false;
        for host in &blk.hosts {
            if host.starts_with('!') {
                continue;
            }
            if host.contains('*') {
                if !has_wildcards {
                    self.wildcards.push(idx);
                    has_wildcards = true;
                }
            } else {
                self.host_map.entry(host.clone()).or_default().push(idx);
            }
        }
        if ext {
            self.ext_order.push(idx);
        } else {
            self.order.push(idx);
        }
        self.blks.push(blk);
        idx
    }

    /// Effective directives for `host` in resolution order (synthesised
    /// blocks first), plus the set of option names seen.
    fn query_raw(&self, host: &str) -> (Vec<Line>, HashSet<String>) {
        // We assume there is never `Host foo !f*o`, so exact matches skip
        // the negation test.
        let mut blks: HashSet<usize> = self
            .host_map
            .get(host)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default();
        for &idx in &self.wildcards {
            if !blks.contains(&idx) && self.blks[idx].test(host) {
                blks.insert(idx);
            }
        }

        let mut sorted: Vec<usize> = blks.into_iter().collect();
        sorted.sort_by_key(|&idx| (!self.blks[idx].ext, self.blks[idx].no));

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for idx in sorted {
            for (text, dir, origin) in self.blks[idx].trimmed(idx) {
                let opt = dir.opt().to_string();
                // ssh takes the first occurrence of an option, except the
                // accumulative identity directives which all apply.
                if opt == "identityfile" || opt == "certificatefile" {
                    out.push(Line { text, dir, blk: origin });
                } else if seen.insert(opt) {
                    out.push(Line { text, dir, blk: origin });
                }
            }
        }
        (out, seen)
    }

    /// The directives ssh would apply to `host`, reordered so input blocks
    /// come first (input-faithful order for external consumers).
    pub fn query(&self, host: &str) -> Vec<Line> {
        let (mut lines, _) = self.query_raw(host);
        lines.sort_by_key(|line| (self.blks[line.blk].ext, self.blks[line.blk].no));
        lines
    }

    /// Synthesise `name` as an alias of `host`: copy over the directives
    /// effective for `host` that `name` does not already have, adding a
    /// `Hostname host` unless the source already pins one.
    pub fn attach(&mut self, name: &str, host: &str) {
        if name == host {
            return;
        }
        let old: HashSet<Directive> = self.query_raw(name).0.into_iter().map(|l| l.dir).collect();
        let (host_lines, seen) = self.query_raw(host);
        let mut lines: Vec<BlockLine> = host_lines
            .into_iter()
            .filter(|l| !old.contains(&l.dir))
            .map(|l| BlockLine::Inherited { text: l.text, origin: l.blk })
            .collect();
        if !seen.contains("hostname") {
            lines.push(BlockLine::Raw(format!("Hostname {host}")));
        }
        self.add_host(&[name.to_string()], lines, &format!("inherits from {host}"));
    }

    /// Add a synthesised block, deduplicating on payload content: a block
    /// with the same lines is extended with the new hosts instead.
    ///
    /// `hosts` should not contain wildcards, per the cache semantics.
    pub fn add_host(&mut self, hosts: &[String], lines: Vec<BlockLine>, comment: &str) -> usize {
        let key: Vec<String> = lines.iter().map(|l| l.text().to_string()).collect();
        if let Some(&idx) = self.ext_cache.get(&key) {
            let blk = &mut self.blks[idx];
            if !comment.is_empty() {
                if !blk.comment.is_empty() && blk.comment != comment {
                    blk.comment.push_str("; ");
                    blk.comment.push_str(comment);
                } else {
                    blk.comment = comment.to_string();
                }
            }

            let old_hosts: HashSet<&str> = blk.hosts.iter().map(|h| h.as_str()).collect();
            let fresh: Vec<String> = hosts
                .iter()
                .filter(|h| !old_hosts.contains(h.as_str()))
                .cloned()
                .collect();
            if !fresh.is_empty() {
                blk.header.push(' ');
                blk.header.push_str(&fresh.join(" "));
                blk.hosts.extend(fresh.iter().cloned());
                for host in fresh {
                    self.host_map.entry(host).or_default().push(idx);
                }
            }
            idx
        } else {
            let header = format!("Host {}", hosts.join(" "));
            let mut blk = Block::new(&header, hosts.to_vec(), true, comment);
            for line in lines {
                blk.push(line);
            }
            let idx = self.push_blk(blk, true);
            self.ext_cache.insert(key, idx);
            idx
        }
    }

    /// Replace `{{KEY}}` tokens in input-block lines via `repl`, annotating
    /// substituted lines with the keys used. Returns key to cleaned
    /// (comment-stripped) replacement.
    pub fn sub(&mut self, mut repl: impl FnMut(&str) -> String) -> BTreeMap<String, String> {
        let reg = Regex::new(r"\{\{(.+?)\}\}").expect("substitution pattern is valid");
        let mut res = BTreeMap::new();

        for &idx in &self.order {
            for line in &mut self.blks[idx].lines {
                let BlockLine::Raw(text) = line else {
                    continue;
                };
                let mut keys = Vec::new();
                let replaced = reg
                    .replace_all(text, |caps: &regex::Captures<'_>| {
                        let key = caps[1].trim().to_string();
                        let val = repl(&key);
                        let clean = val.split('#').next().unwrap_or("").trim().to_string();
                        res.insert(key.clone(), clean);
                        keys.push(key);
                        val
                    })
                    .into_owned();
                if !keys.is_empty() {
                    *text = format!("{} # {}", replaced, keys.join("; "));
                }
            }
        }
        res
    }

    /// Every exact host name known to the index.
    pub fn hosts(&self) -> Vec<String> {
        self.host_map.keys().cloned().collect()
    }

    /// `(host, hostname)` pairs from `Hostname` directives, at most one
    /// per host, first hit in block order wins.
    pub fn hostnames(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        'hosts: for (host, blks) in &self.host_map {
            for &idx in blks {
                for (_, dir, _) in self.blks[idx].trimmed(idx) {
                    if dir.opt() == "hostname" {
                        if let Some(hostname) = dir.values.first() {
                            out.push((host.clone(), hostname.clone()));
                            continue 'hosts;
                        }
                    }
                }
            }
        }
        out
    }

    /// The host patterns declared by the block at `idx`.
    pub fn hosts_of(&self, idx: usize) -> &[String] {
        &self.blks[idx].hosts
    }

    /// Serialise the document: synthesised blocks, the optional separator
    /// line, then the input blocks. The output parses back losslessly.
    pub fn render(&self, separator: Option<&str>) -> String {
        let mut out = String::new();
        for &idx in &self.ext_order {
            self.render_blk(idx, &mut out);
        }
        if let Some(sep) = separator {
            out.push_str(sep);
            out.push('\n');
        }
        for &idx in &self.order {
            self.render_blk(idx, &mut out);
        }
        out
    }

    fn render_blk(&self, idx: usize, out: &mut String) {
        let blk = &self.blks[idx];
        // An untouched leading block renders as nothing.
        if blk.header.is_empty() && blk.is_empty() {
            return;
        }
        let comment = blk.comment.split_whitespace().collect::<Vec<_>>().join(" ");
        if comment.is_empty() {
            out.push_str(&blk.header);
        } else {
            out.push_str(&blk.header);
            out.push_str("  # ");
            out.push_str(&comment);
        }
        out.push('\n');

        let mut last_ref = None;
        for line in &blk.lines {
            if blk.ext {
                out.push_str("  ");
            }
            match line {
                BlockLine::Raw(text) => {
                    last_ref = None;
                    out.push_str(text);
                }
                BlockLine::Inherited { text, origin } => {
                    out.push_str(text);
                    if last_ref != Some(*origin) {
                        last_ref = Some(*origin);
                        let header = self.blks[*origin].header.trim();
                        if !header.is_empty() {
                            out.push_str("  # ");
                            out.push_str(header);
                        }
                    }
                }
            }
            out.push('\n');
        }
        out.push('\n');
    }
}

#[cfg(test)]
#[path = "../test/ssh_config/index.rs"]
mod tests;
