//! kiln CLI: timestamp-driven build orchestration.

use clap::Parser;
use kiln::cli::Cli;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, Layer};

/// Log to stderr. `RUST_LOG` wins over `-v`; without either only warnings show.
fn init_tracing(verbose: bool) {
    let log_env_set = std::env::var("RUST_LOG").is_ok();
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let fmt = tracing_subscriber::fmt::layer()
        .with_ansi(std::io::stderr().is_terminal())
        .with_line_number(log_env_set)
        .with_writer(std::io::stderr);
    let fmt = if log_env_set {
        fmt.compact().boxed()
    } else {
        fmt.with_target(false).without_time().boxed()
    };

    let registry = tracing_subscriber::registry().with(fmt.with_filter(filter));
    if let Err(e) = tracing::subscriber::set_global_default(registry) {
        eprintln!("warning: cannot install logger: {}", e);
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Checked between targets; the running command sees the same SIGINT.
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!(error = %e, "cannot install Ctrl-C handler");
    }

    if let Err(e) = kiln::cli::dispatch(cli.command, &interrupt) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
