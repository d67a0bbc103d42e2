//! SSH host-configuration model
//!
//! Parses `ssh_config`-style documents into blocks of directives, answers
//! effective-directive queries the way `ssh` would resolve them, and
//! supports synthesising new blocks that inherit from existing hosts.
//!
//! This aims to cover most `Host` blocks. `Match` and `Include` headers are
//! treated as block boundaries only; evaluating them like `ssh -G` would be
//! costly and have side effects. For complex configurations the wrapper
//! mode avoids the problem entirely.

mod block;
mod directive;
mod index;

pub use block::{Block, BlockLine};
pub use directive::Directive;
pub use index::{Config, Line};

/// Tokenise one configuration line shell-style.
///
/// An unquoted `#` starts a comment running to end of line. Returns an
/// empty vector for blank or comment-only lines, and also for lines that
/// fail shell lexing (e.g. an unterminated quote), which the parser then
/// carries verbatim.
pub(crate) fn tokenize(line: &str) -> Vec<String> {
    let mut quote = None;
    let mut end = line.len();
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '#') => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    shlex::split(&line[..end]).unwrap_or_default()
}
