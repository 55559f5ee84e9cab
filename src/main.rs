mod api;
mod app;
mod application;
mod cli;
mod domain;
mod settings;
mod utils;

use std::process;

use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(&cli);

    debug!("Mod Organizer v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = cli::run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("mod_organizer={}", cli.log_level()).parse() {
        filter = filter.add_directive(directive);
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    }
}
