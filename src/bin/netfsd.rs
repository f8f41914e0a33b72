use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use netfs::cli::ServerOpts;
use netfs::logger::{Logger, NoopLogger, TextLogger};
use netfs::server::Server;

fn main() -> Result<()> {
    netfs::init_tracing("info");

    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Shutting down netfsd (Ctrl-C)...");
        // No cooperative shutdown; handlers die with the process
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = ServerOpts::parse();
    let config = opts.resolve()?;

    let logger: Arc<dyn Logger> = match &config.log_file {
        Some(path) => Arc::new(
            TextLogger::new(path)
                .with_context(|| format!("open log file {}", path.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };

    let server = Server::bind(&config, logger)?;

    println!("Starting NetFS daemon:");
    println!("  Root: {}", server.root().display());
    println!("  Bind: {}", server.local_addr()?);
    println!("  Slots: {}", config.max_connections);
    if config.bind.starts_with("0.0.0.0") {
        eprintln!("WARNING: Binding to 0.0.0.0 exposes the served directory to all network interfaces");
        eprintln!("   The protocol is UNENCRYPTED and UNAUTHENTICATED - only use on trusted networks");
    }

    server.run()
}
