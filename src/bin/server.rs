//! cachewire Server Binary
//!
//! Starts the in-memory reference server.

use clap::Parser;
use cachewire::server::Server;
use cachewire::ServerConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// cachewire reference server
#[derive(Parser, Debug)]
#[command(name = "cachewire-server")]
#[command(about = "In-memory cache server for the cachewire client protocol")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:10800")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Largest accepted frame in MB
    #[arg(short = 'f', long, default_value = "16")]
    max_frame_mb: usize,

    /// Close sessions idle for this many milliseconds (0 = never)
    #[arg(short, long, default_value = "0")]
    read_timeout_ms: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cachewire=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("cachewire server v{}", cachewire::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let config = ServerConfig::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .max_frame_size(args.max_frame_mb * 1024 * 1024)
        .read_timeout_ms(args.read_timeout_ms)
        .build();

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", args.listen, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
