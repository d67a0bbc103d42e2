//! Configuration blocks keyed by host patterns

use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::Directive;

// Global ordinal source; block order is stable within one run.
static NEXT_NO: AtomicUsize = AtomicUsize::new(0);

/// One payload line of a block.
///
/// Lines copied from another block keep an arena index back to their
/// origin, so serialisation can annotate where an inherited directive came
/// from.
#[derive(Debug, Clone)]
pub enum BlockLine {
    /// A line read from the input, kept verbatim.
    Raw(String),
    /// A normalised directive copied from the block at `origin`.
    Inherited { text: String, origin: usize },
}

impl BlockLine {
    pub fn text(&self) -> &str {
        match self {
            BlockLine::Raw(text) => text,
            BlockLine::Inherited { text, .. } => text,
        }
    }
}

/// A contiguous region of the host configuration: a header line plus the
/// directive lines under it.
#[derive(Debug, Clone)]
pub struct Block {
    /// Original header line (`Host ...`, `Match ...`), empty for the
    /// implicit leading block.
    pub header: String,
    /// Tokenised patterns from a `Host` header; empty for `Match` blocks.
    pub hosts: Vec<String>,
    /// Ordered payload lines.
    pub lines: Vec<BlockLine>,
    /// Whether this block was synthesised rather than read from input.
    pub ext: bool,
    /// Construction ordinal, globally increasing.
    pub no: usize,
    /// Optional comment appended to the header on serialisation.
    pub comment: String,
}

impl Block {
    pub fn new(header: &str, hosts: Vec<String>, ext: bool, comment: &str) -> Self {
        Self {
            header: header.to_string(),
            hosts,
            lines: Vec::new(),
            ext,
            no: NEXT_NO.fetch_add(1, Ordering::Relaxed),
            comment: comment.to_string(),
        }
    }

    pub fn push(&mut self, line: BlockLine) {
        self.lines.push(line);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Does this block apply to `host`? At least one positive pattern must
    /// match and no negated pattern may.
    pub fn test(&self, host: &str) -> bool {
        let mut hit = false;
        for pattern in &self.hosts {
            if let Some(negated) = pattern.strip_prefix('!') {
                if glob_match(negated, host) {
                    return false;
                }
            } else if glob_match(pattern, host) {
                hit = true;
            }
        }
        hit
    }

    /// The block's payload as parsed directives, skipping blank and
    /// comment-only lines. Inherited lines keep their origin; raw lines
    /// report `self_idx`, the block's own arena index.
    pub(crate) fn trimmed(&self, self_idx: usize) -> Vec<(String, Directive, usize)> {
        let mut out = Vec::new();
        for line in &self.lines {
            match line {
                BlockLine::Raw(text) => {
                    let dir = Directive::parse(text);
                    if !dir.is_empty() {
                        out.push((dir.to_string(), dir, self_idx));
                    }
                }
                BlockLine::Inherited { text, origin } => {
                    let dir = Directive::parse(text);
                    out.push((text.clone(), dir, *origin));
                }
            }
        }
        out
    }
}

/// Match `text` against an ssh-style glob pattern (`*` and `?` wildcards).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            _ => source.push_str(&regex::escape(&c.to_string())),
        }
    }
    source.push('$');
    match Regex::new(&source) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "../test/ssh_config/block.rs"]
mod tests;
