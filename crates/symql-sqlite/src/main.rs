//! symql-sqlite - SQLite engine process.
//!
//! Speaks the symql wire protocol on stdin/stdout and logs to stderr.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use symql_sqlite::config::Args;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Stdout carries frames only.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "symql_sqlite=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        protocol_version = symql_proto::PROTOCOL_VERSION,
        sqlite_version = rusqlite::version(),
        path = %args.path.display(),
        "starting symql sqlite engine"
    );

    let served = symql_sqlite::server::run(&args.path)?;
    tracing::info!(requests = served, "engine stopped");
    Ok(())
}
