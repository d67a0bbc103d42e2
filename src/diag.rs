//! Diagnostic sink shared by both modes
//!
//! Routing decisions are narrated as `#`-prefixed lines. They go to stderr
//! immediately and are buffered so the generator can replay them into the
//! rewritten document as comments.

use once_cell::sync::Lazy;
use std::{
    env,
    io::{self, IsTerminal},
    sync::Mutex,
    time::Instant,
};

// Buffered diagnostic lines, replayed into non-TTY output.
static BUFFER: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

static TRACE_ENABLED: Lazy<bool> = Lazy::new(|| env::var_os("MOON_TRACE").is_some());
static TRACE_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Record one diagnostic line.
///
/// When stderr is a terminal every line is shown; otherwise only `must`
/// lines are, so piping the output stays quiet. All lines are buffered for
/// [`flush_into`] regardless.
pub fn emit(message: &str, must: bool) {
    let line = format!("# {message}");
    if must || io::stderr().is_terminal() {
        eprintln!("{line}");
    }
    BUFFER.lock().unwrap().push(line);
}

/// Replay the buffered lines into a generated document and clear them.
pub fn flush_into(out: &mut String) {
    let mut buffer = BUFFER.lock().unwrap();
    if buffer.is_empty() {
        return;
    }
    for line in buffer.drain(..) {
        out.push_str(&line);
        out.push('\n');
    }
    out.push('\n');
}

/// Emit a timing trace when `MOON_TRACE` is set.
///
/// The clock starts at the first trace call, so call this once early in
/// `main` to anchor it.
pub fn trace(label: &str) {
    if *TRACE_ENABLED {
        let elapsed = TRACE_START.elapsed().as_secs_f64() * 1000.0;
        eprintln!("[{elapsed:>9.3} ms] {label}");
    } else {
        Lazy::force(&TRACE_START);
    }
}

#[macro_export]
macro_rules! diag {
    ($($arg:tt)*) => {
        $crate::diag::emit(&format!($($arg)*), false)
    };
}

#[macro_export]
macro_rules! diag_must {
    ($($arg:tt)*) => {
        $crate::diag::emit(&format!($($arg)*), true)
    };
}

#[cfg(test)]
#[path = "test/diag.rs"]
mod tests;
