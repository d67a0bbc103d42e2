//! Generator mode
//!
//! Rewrites the host-configuration document with routing injected, gated
//! by the output lock and two freshness checks so repeated runs are
//! cheap. The document is rendered into a buffer first and only written
//! on success.

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use crate::args::MainArgs;
use crate::env::Environment;
use crate::lock;
use crate::probe::Locality;
use crate::route::ZoneGraph;
use crate::ssh_config::Config;
use crate::zone::ZoneConfig;
use crate::{diag, diag_must};

/// Outputs younger than this are considered in-flight and left alone.
const FRESH_WINDOW: Duration = Duration::from_secs(2);

/// What hooks get on stdin for the `generated` event.
#[derive(Serialize)]
struct GeneratedEvent<'a> {
    output: Option<String>,
    host: Option<&'a str>,
    state: &'a str,
}

pub fn run(args: &MainArgs) -> crate::Result<()> {
    let Some(out_path) = &args.output else {
        let mut buf = String::new();
        generate(&mut buf, args, io::stdout().is_terminal())?;
        io::stdout().write_all(buf.as_bytes())?;
        return Ok(());
    };

    let lock = lock::wait_lock(&sibling(out_path, "lock"))?;
    if lock.waited && args.force < 2 {
        // Someone else just wrote the file; don't clobber it.
        return preview(out_path, args);
    }

    if args.force == 0 && current(out_path, args)? {
        return preview(out_path, args);
    }

    let mut buf = String::new();
    let state = generate(&mut buf, args, false)?;
    fs::write(out_path, buf)?;
    fs::write(sibling(out_path, "state"), format!("{state}\n"))?;
    Ok(())
}

/// Is the existing output still current? Checked under the lock, so a
/// holder that just finished writing is seen.
fn current(out_path: &Path, args: &MainArgs) -> crate::Result<bool> {
    let Ok(meta) = fs::metadata(out_path) else {
        return Ok(false);
    };
    let modified = meta.modified()?;

    match modified.elapsed() {
        Ok(age) if age <= FRESH_WINDOW => {
            diag!(
                "{}: updated {:.3} ms ago, skipping",
                out_path.display(),
                age.as_secs_f64() * 1000.0
            );
            return Ok(true);
        }
        // A future mtime means it was written just now.
        Err(_) => return Ok(true),
        Ok(_) => {}
    }

    let inputs_newer = [&args.input, &args.zone].iter().any(|input| {
        fs::metadata(input)
            .and_then(|m| m.modified())
            .map(|m| m >= modified)
            .unwrap_or(true)
    });
    if inputs_newer {
        return Ok(false);
    }

    let last_state = fs::read_to_string(sibling(out_path, "state"))
        .map(|s| s.trim().to_string())
        .ok();
    let zc = ZoneConfig::load(&args.zone, None)?;
    let loc = Locality::shared();
    if last_state.as_deref() == Some(zc.state(&loc).as_str()) {
        diag!("{}: inputs and state unchanged, skipping", out_path.display());
        return Ok(true);
    }
    Ok(false)
}

/// Render the rewritten document into `out`. Returns the state key the
/// run was produced under.
fn generate(out: &mut String, args: &MainArgs, to_tty: bool) -> crate::Result<String> {
    if let Some(header) = &args.header {
        out.push_str(header);
        out.push('\n');
    }

    let file = File::open(&args.input)?;
    let mut conf = Config::parse(BufReader::new(file))?;
    let mut zc = ZoneConfig::load(&args.zone, Some(&conf))?;
    let loc = Locality::shared();
    let host = args.host();

    let mut ctx = Environment::from_os();
    if !ctx.is_empty() {
        let subbed = conf.sub(|key| {
            let value = ctx.get(key).unwrap_or_else(|| key.to_string());
            value.trim().to_string()
        });
        for (key, value) in &subbed {
            if !value.is_empty() {
                diag!("{key}\t| {value}");
            }
        }
    }

    let direct = host.and_then(|h| zc.resolve_direct_mode(h));
    if let (Some(host), Some(real)) = (host, &direct) {
        diag_must!("Direct for {real}");
        conf.attach(host, real);
    } else {
        let graph = zc.route(&loc);
        dbg_zones(graph, host);

        if let Some(host) = host {
            if let Ok(None) = graph.trace(host) {
                diag_must!("No route to host {host}");
            }
        }
        graph.inject(&mut conf);
    }

    if let Some(host) = host {
        dbg_query(&conf, host);
    }

    if !to_tty {
        crate::diag::flush_into(out);
    }

    out.push_str(&conf.render(args.header.as_deref()));

    if let Some(header) = &args.header {
        out.push_str(header);
        out.push('\n');
    }

    let state = zc.state(&loc);
    zc.run_hooks(
        "generated",
        &GeneratedEvent {
            output: args.output.as_ref().map(|p| p.display().to_string()),
            host,
            state: &state,
        },
    )?;
    Ok(state)
}

/// Replay the effective-directive query against the already-written
/// output, diagnostics only.
fn preview(out_path: &Path, args: &MainArgs) -> crate::Result<()> {
    let Some(host) = args.host() else {
        return Ok(());
    };
    let file = File::open(out_path)?;
    let conf = Config::parse(BufReader::new(file))?;
    dbg_query(&conf, host);
    Ok(())
}

/// Per-zone routing table: `[path] -> zone (dist)`, loud for the zone
/// containing the requested host.
pub(crate) fn dbg_zones(graph: &mut ZoneGraph, host: Option<&str>) {
    for (zone, (name, dist, way)) in graph.zone_paths().into_iter().enumerate() {
        let Some(way) = way else {
            continue;
        };
        let must = host.is_some_and(|h| graph.contains(zone, h));
        let line = format!("[{}] -> {name} ({dist})", way.join(", "));
        crate::diag::emit(&line, must);
    }
}

/// The effective directives for `host`, grouped by contributing block.
pub(crate) fn dbg_query(conf: &Config, host: &str) {
    let lines = conf.query(host);
    let mut i = 0;
    while i < lines.len() {
        let blk = lines[i].blk;
        let mut texts = Vec::new();
        while i < lines.len() && lines[i].blk == blk {
            texts.push(lines[i].text.clone());
            i += 1;
        }
        let hosts = conf.hosts_of(blk);
        let label = if hosts.is_empty() {
            "<auto>".to_string()
        } else {
            hosts.join(", ")
        };
        diag!("{label}: {}", texts.join(", "));
    }
}

/// `<path>.<ext>` next to the output file.
fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

#[cfg(test)]
#[path = "test/generate.rs"]
mod tests;
