#![forbid(unsafe_code)]

//! qgrid driver binary entry point.

use std::io;

use qgrid_demo::{cli, run};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let opts = cli::Opts::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = run::run(&opts, &mut out) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
