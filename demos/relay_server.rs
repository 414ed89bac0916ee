//! Browser-to-Icecast relay example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR] [SERVER] [--icy]
//!
//! Examples:
//!   cargo run --example relay_server                                 # ws on 0.0.0.0:8080, relays to 127.0.0.1:8000
//!   cargo run --example relay_server localhost:9000 radio.example:8010
//!   cargo run --example relay_server 0.0.0.0:8080 127.0.0.1:8005 --icy
//!
//! ## Producing
//!
//! Connect a WebSocket to `ws://localhost:8080/`, then send:
//!
//!   {"type":"start-stream","user":"source","password":"hackme","mime":"audio/mpeg"}
//!
//! followed by encoded audio as binary frames. Status messages come back as
//! JSON text frames (`stream-status`, `stream-bridge-ready`, `auth_error`, ...).
//!
//! ## Listening
//!
//! With ffplay:
//!   ffplay http://localhost:8000/stream

use std::net::SocketAddr;
use std::time::Duration;

use harbor_relay::{Dialect, IceMetadata, RelayConfig, RelayServer, ServerConfig};

/// Parse a bind address argument
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "localhost:9000" -> 127.0.0.1:9000
/// - "0.0.0.0:8080" -> 0.0.0.0:8080
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

/// Parse a broadcast server argument: "host", or "host:port"
fn parse_target(arg: &str) -> Result<(String, u16), String> {
    const DEFAULT_PORT: u16 = 8000;

    match arg.rsplit_once(':') {
        Some((host, port)) => port
            .parse::<u16>()
            .map(|port| (host.to_string(), port))
            .map_err(|_| format!("Invalid server port in '{}'", arg)),
        None if !arg.is_empty() => Ok((arg.to_string(), DEFAULT_PORT)),
        None => Err("Empty server address".to_string()),
    }
}

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR] [SERVER] [--icy]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    WebSocket address to bind to (default: 0.0.0.0:8080)");
    eprintln!("  SERVER       Broadcast server host[:port] (default: 127.0.0.1:8000)");
    eprintln!("  --icy        Use the ICY request dialect (Shoutcast, older Harbor inputs)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let icy = args.iter().any(|a| a == "--icy");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let bind_addr = match positional.first() {
        Some(arg) => parse_bind_addr(arg),
        None => Ok(SocketAddr::from(([0, 0, 0, 0], 8080))),
    };
    let target = match positional.get(1) {
        Some(arg) => parse_target(arg),
        None => Ok(("127.0.0.1".to_string(), 8000)),
    };

    let (bind_addr, (host, port)) = match (bind_addr, target) {
        (Ok(bind_addr), Ok(target)) => (bind_addr, target),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("harbor_relay=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let relay = RelayConfig::new(host, port)
        .dialect(if icy { Dialect::Icy } else { Dialect::Http })
        .station(IceMetadata {
            name: Some("Harbor Relay".to_string()),
            description: Some("Live from the browser".to_string()),
            ..Default::default()
        })
        .status_interval(Duration::from_secs(5));

    let config = ServerConfig::with_addr(bind_addr);

    println!("Starting relay on ws://{}", config.bind_addr);
    println!("Forwarding to {} ({:?} dialect)", relay.target(), relay.dialect);
    println!();

    let server = RelayServer::new(config, relay);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        println!("\nShutting down...");
    };

    if let Err(e) = server.run_until(shutdown).await {
        eprintln!("Server error: {}", e);
    }

    Ok(())
}
