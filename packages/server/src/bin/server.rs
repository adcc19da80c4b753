//! darkcomm chat server.
//!
//! Receives messages from clients and broadcasts them to all other connected clients.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin darkcomm-server
//! SERVER_IP=0.0.0.0 PORT=3000 cargo run --bin darkcomm-server
//! cargo run --bin darkcomm-server -- --host 0.0.0.0 --port 3000 --max-line-bytes 65536
//! ```

use clap::Parser;

use darkcomm_server::{ChatServer, ServerConfig, shutdown_signal};
use darkcomm_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "darkcomm-server")]
#[command(about = "TCP chat server that rebroadcasts newline-delimited JSON messages", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "SERVER_IP", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        default_value_t = darkcomm_server::config::DEFAULT_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    port: u16,

    /// Drop a connection once a single line exceeds this many bytes
    #[arg(long, env = "MAX_LINE_BYTES")]
    max_line_bytes: Option<usize>,
}

fn display_server_info(config: &ServerConfig, connected: usize) {
    let rule = "=".repeat(60);
    println!("{}", rule);
    println!("darkcomm chat server");
    println!("{}", rule);
    println!("Server IP: {}", config.host);
    println!("Port: {}", config.port);
    println!("Status: Running");
    println!("Connected Clients: {}", connected);
    println!("{}", rule);
    println!();
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();
    let config =
        ServerConfig::new(args.host, args.port).with_max_line_bytes(args.max_line_bytes);

    let server = match ChatServer::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    display_server_info(&config, server.registry().count().await);
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    if let Err(e) = server.run(shutdown_signal()).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
