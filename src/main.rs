//! xpuprobe CLI - Device partitioning and queue bring-up probe
//!
//! Exits with 0 on success and 1 when the runtime reports an error.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use xpuprobe::cli;
use xpuprobe::config::CliArgs;

fn main() {
    let args = CliArgs::parse();

    // Initialize logging
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let mut stdout = std::io::stdout();
    let result = cli::run(&args, &mut stdout);
    let code = cli::exit_code(&args.command, &result, &mut stdout);
    if code != cli::EXIT_SUCCESS {
        std::process::exit(code);
    }
}
