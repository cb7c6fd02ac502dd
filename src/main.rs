use clap::Parser;
use tracing_subscriber::EnvFilter;
use trendpilot::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trendpilot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse())
}
