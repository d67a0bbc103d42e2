use luna::{args, diag, generate, wrapper};

use std::process::ExitCode;

fn main() -> ExitCode {
    let args = args::main_args();

    // Anchor the trace clock before any real work.
    diag::trace("start");

    let result = if args.wrapper_mode() {
        wrapper::run(&args)
    } else {
        generate::run(&args).map(|()| ExitCode::SUCCESS)
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("luna: {err}");
            ExitCode::FAILURE
        }
    }
}
