//! A single tokenised configuration directive

use std::fmt;
use std::hash::{Hash, Hasher};

use super::tokenize;

/// One option line, split into the option name and its argument values.
///
/// Equality and hashing are case-insensitive on the option name, so
/// `HostName` and `hostname` directives with the same values compare equal.
#[derive(Debug, Clone)]
pub struct Directive {
    /// Option name as written in the input.
    raw_opt: String,
    /// Lowercased option name used for comparisons.
    opt: String,
    /// Ordered argument values.
    pub values: Vec<String>,
}

impl Directive {
    /// Parse one line. Comments are stripped during tokenisation, and a
    /// `KEY=VALUE` first token is split into `KEY` plus the shell tokens
    /// of `VALUE`.
    pub fn parse(line: &str) -> Self {
        let mut parts = tokenize(line);
        let raw_opt;
        let values;
        if parts.is_empty() {
            raw_opt = String::new();
            values = Vec::new();
        } else {
            let first = parts.remove(0);
            if let Some(p) = first.find('=') {
                raw_opt = first[..p].to_string();
                let mut vals = shlex::split(&first[p + 1..]).unwrap_or_default();
                vals.extend(parts);
                values = vals;
            } else {
                raw_opt = first;
                values = parts;
            }
        }
        let opt = raw_opt.to_lowercase();
        Self { raw_opt, opt, values }
    }

    /// Lowercased option name.
    pub fn opt(&self) -> &str {
        &self.opt
    }

    /// True for blank or comment-only lines.
    pub fn is_empty(&self) -> bool {
        self.opt.is_empty()
    }
}

impl fmt::Display for Directive {
    // Normalised form: comments dropped, values re-quoted only when needed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            return f.write_str(&self.raw_opt);
        }
        let values = self.values.iter().map(|v| v.as_str());
        let joined = shlex::try_join(values).map_err(|_| fmt::Error)?;
        write!(f, "{} {}", self.raw_opt, joined)
    }
}

impl PartialEq for Directive {
    fn eq(&self, other: &Self) -> bool {
        self.opt == other.opt && self.values == other.values
    }
}

impl Eq for Directive {}

impl Hash for Directive {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.opt.hash(state);
        self.values.hash(state);
    }
}

#[cfg(test)]
#[path = "../test/ssh_config/directive.rs"]
mod tests;
