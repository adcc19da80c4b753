//! darkcomm chat client.
//!
//! Connects to a darkcomm server, announces the user and streams incoming
//! messages while reading input. Type `exit` or press Ctrl+C to leave.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin darkcomm-client
//! cargo run --bin darkcomm-client -- --username alice
//! SERVER_IP=10.0.0.5 PORT=3000 cargo run --bin darkcomm-client -- -u bob --stream-millis 0
//! ```

use std::time::Duration;

use clap::Parser;

use darkcomm_client::{ClientConfig, run_client};
use darkcomm_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "darkcomm-client")]
#[command(about = "Terminal client for the darkcomm TCP chat server", long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, env = "SERVER_IP", default_value = "127.0.0.1")]
    host: String,

    /// Server port to connect to
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        default_value_t = 12345,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    port: u16,

    /// Username to chat as (prompted for when omitted)
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Milliseconds over which each incoming message is typed out (0 prints at once)
    #[arg(long, default_value_t = 2000)]
    stream_millis: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let args = Args::parse();
    let config = ClientConfig {
        username: args.username,
        stream_duration: Duration::from_millis(args.stream_millis),
        ..ClientConfig::new(args.host, args.port)
    };

    if let Err(e) = run_client(config).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
