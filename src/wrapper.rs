//! Wrapper mode
//!
//! Intercepts an SSH invocation: the destination argument is located in
//! the argv, routed, and replaced, with the jump chain supplied through
//! `-J`. Rewrite failures fall back to the untouched argv so the
//! connection still goes through.

use std::process::{Command, ExitCode};

use crate::args::MainArgs;
use crate::diag_must;
use crate::generate::dbg_zones;
use crate::probe::Locality;
use crate::zone::ZoneConfig;

/// ssh short flags that take no value; any other `-X` consumes the next
/// argument.
const NO_VALUE_FLAGS: &str = "46AaCfGgKkMNnqsTtVvXxYy";

pub fn run(args: &MainArgs) -> crate::Result<ExitCode> {
    let rewritten = match rewrite(&args.rest, args) {
        Ok(argv) => argv,
        Err(err) => {
            // Best-effort pass-through with the original argv.
            eprintln!("luna: argv rewrite failed: {err}");
            args.rest.clone()
        }
    };

    let ssh = args
        .ssh_bin
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("ssh"));

    if args.print_only {
        let mut words: Vec<&str> = vec![ssh.to_str().unwrap_or("ssh")];
        words.extend(rewritten.iter().map(|s| s.as_str()));
        let line = shlex::try_join(words.iter().copied()).unwrap_or_else(|_| words.join(" "));
        println!("{line}");
        return Ok(ExitCode::SUCCESS);
    }

    let ssh = if ssh.components().count() > 1 {
        ssh
    } else {
        which::which(&ssh).unwrap_or(ssh)
    };
    exec(&ssh, &rewritten)
}

fn rewrite(argv: &[String], args: &MainArgs) -> crate::Result<Vec<String>> {
    let Some(pos) = find_positional(argv) else {
        return Ok(argv.to_vec());
    };
    let (user, host) = split_user(&argv[pos]);

    let mut zc = ZoneConfig::load(&args.zone, None)?;
    if let Some(real) = zc.resolve_direct_mode(host) {
        diag_must!("Direct for {real}");
        return Ok(rebuild(argv, pos, user, &real, None));
    }

    let loc = Locality::shared();
    let graph = zc.route(&loc);
    dbg_zones(graph, Some(host));

    match graph.resolve(host) {
        Ok(Some((last_hop, jumps))) => {
            let jumps = (!jumps.is_empty()).then_some(jumps);
            Ok(rebuild(argv, pos, user, &last_hop, jumps))
        }
        Ok(None) | Err(_) => {
            diag_must!("No route to host {host}");
            Ok(argv.to_vec())
        }
    }
}

/// Index of the destination argument, honouring the no-value flag set,
/// attached `-Xvalue` forms, and the `--` terminator.
fn find_positional(argv: &[String]) -> Option<usize> {
    let mut i = 0;
    while i < argv.len() {
        let arg = &argv[i];
        if arg == "--" {
            return (i + 1 < argv.len()).then_some(i + 1);
        }
        match arg.strip_prefix('-') {
            None | Some("") => return Some(i),
            Some(flags) => {
                if flags.chars().all(|c| NO_VALUE_FLAGS.contains(c)) {
                    i += 1;
                } else if flags.len() == 1 {
                    // The flag consumes the next argument.
                    i += 2;
                } else {
                    // Attached value, e.g. `-oStrictHostKeyChecking=no`.
                    i += 1;
                }
            }
        }
    }
    None
}

/// Split a `user@` prefix off the destination, on the last `@`.
fn split_user(dest: &str) -> (Option<&str>, &str) {
    match dest.rsplit_once('@') {
        Some((user, host)) => (Some(user), host),
        None => (None, dest),
    }
}

fn rebuild(
    argv: &[String],
    pos: usize,
    user: Option<&str>,
    host: &str,
    jumps: Option<String>,
) -> Vec<String> {
    let mut out = Vec::with_capacity(argv.len() + 2);
    if let Some(jumps) = jumps {
        out.push("-J".to_string());
        out.push(jumps);
    }
    for (i, arg) in argv.iter().enumerate() {
        if i == pos {
            out.push(match user {
                Some(user) => format!("{user}@{host}"),
                None => host.to_string(),
            });
        } else {
            out.push(arg.clone());
        }
    }
    out
}

#[cfg(unix)]
fn exec(ssh: &std::path::Path, argv: &[String]) -> crate::Result<ExitCode> {
    use std::os::unix::process::CommandExt;
    // exec only returns on failure.
    let err = Command::new(ssh).args(argv).exec();
    Err(err.into())
}

#[cfg(not(unix))]
fn exec(ssh: &std::path::Path, argv: &[String]) -> crate::Result<ExitCode> {
    let status = Command::new(ssh).args(argv).status()?;
    let code = status.code().unwrap_or(1);
    Ok(ExitCode::from(code.clamp(0, 255) as u8))
}

#[cfg(test)]
#[path = "test/wrapper.rs"]
mod tests;
