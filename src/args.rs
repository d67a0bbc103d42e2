//! Command-line argument parsing
//!
//! Parses CLI arguments using the clap library and provides structured
//! access to user-provided options.

use clap::{Arg, ArgAction, Command};
use std::ffi::OsString;
use std::path::PathBuf;

/// Parsed command-line arguments
#[derive(Debug, Clone)]
pub struct MainArgs {
    /// Host-configuration input file
    pub input: PathBuf,
    /// Zone-definition file
    pub zone: PathBuf,
    /// Rewritten output file; `None` writes to stdout
    pub output: Option<PathBuf>,
    /// Decorative header/separator line
    pub header: Option<String>,
    /// Force level: 1 bypasses the cache gates, 2 also regenerates after
    /// waiting on a contended lock
    pub force: u8,
    /// Wrapper mode: the SSH binary to exec
    pub ssh_bin: Option<PathBuf>,
    /// Wrapper mode: print the rewritten command instead of executing
    pub print_only: bool,
    /// The host (generator mode) or the SSH argv (wrapper mode)
    pub rest: Vec<String>,
}

impl MainArgs {
    pub fn wrapper_mode(&self) -> bool {
        self.ssh_bin.is_some() || self.print_only
    }

    /// The requested host in generator mode.
    pub fn host(&self) -> Option<&str> {
        self.rest.first().map(|s| s.as_str())
    }
}

/// Parses command-line arguments using clap.
///
/// # Examples
/// ```text
/// luna -o ~/.ssh/config.out              # rewrite the config document
/// luna -o out -H '# ---- luna ----' web  # with separator, tracing 'web'
/// luna -x ssh web -p 2222                # wrapper mode: exec rewritten ssh
/// luna -p web                            # wrapper mode: just print it
/// luna -ff -o out                        # force regeneration
/// ```
pub fn main_args() -> MainArgs {
    let cmd = build_cli_command();
    parse_main_args_from(&cmd, std::env::args())
}

fn build_cli_command() -> Command {
    Command::new("luna")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Zone-routing pre-processor and launcher wrapper for SSH configs")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input-file")
                .help("Host-configuration input file")
                .default_value("config"),
        )
        .arg(
            Arg::new("zone")
                .short('z')
                .long("zone-file")
                .help("Zone-definition file")
                .default_value("zone.ini"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output-file")
                .help("Rewritten output file; omit or '-' for stdout")
                .num_args(1),
        )
        .arg(
            Arg::new("header")
                .short('H')
                .long("header")
                .help("Decorative header/separator line")
                .num_args(1),
        )
        .arg(
            Arg::new("force")
                .short('f')
                .long("force")
                .help("Force regeneration; repeat to also bypass the lock wait")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("ssh")
                .short('x')
                .long("ssh")
                .help("Wrapper mode: exec this SSH binary with the rewritten argv")
                .num_args(1),
        )
        .arg(
            Arg::new("print")
                .short('p')
                .long("print")
                .help("Wrapper mode: print the rewritten command instead of executing")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("rest")
                .help("Host (generator mode) or SSH arguments (wrapper mode)")
                .num_args(0..)
                .allow_hyphen_values(true)
                .trailing_var_arg(true),
        )
}

fn parse_main_args_from<I, T>(cmd: &Command, argv: I) -> MainArgs
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = cmd.clone().get_matches_from(argv);

    let rest: Vec<String> = matches
        .get_many::<String>("rest")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();

    MainArgs {
        input: expand_tilde(matches.get_one::<String>("input").expect("has default")),
        zone: expand_tilde(matches.get_one::<String>("zone").expect("has default")),
        output: matches
            .get_one::<String>("output")
            .filter(|path| path.as_str() != "-")
            .map(|path| expand_tilde(path)),
        header: matches.get_one::<String>("header").cloned(),
        force: matches.get_count("force"),
        ssh_bin: matches.get_one::<String>("ssh").map(|path| expand_tilde(path)),
        print_only: matches.get_flag("print"),
        rest,
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
#[path = "test/args.rs"]
mod tests;
