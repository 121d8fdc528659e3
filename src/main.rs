//! RelaySQL endpoint server
//!
//! Serves `POST /api/query` over the cluster stack configured by
//! `DATABASE_URL`, `DATABASE_URL_2`, ... (see [`relaysql::config`]).

use log::info;

use relaysql::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let args: Vec<String> = std::env::args().collect();

    let mut config = ServerConfig::from_env()?;
    let mut cli_urls = Vec::new();

    // Simple argument parsing; flags override the environment
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    let port: u16 = args[i + 1].parse()?;
                    config.bind_addr.set_port(port);
                    i += 1;
                }
            }
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--database-url" | "-d" => {
                if i + 1 < args.len() {
                    cli_urls.push(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("RelaySQL - query endpoint over a failover stack of MySQL clusters");
                println!();
                println!("Usage: relaysql [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --port PORT           Port to listen on (default: 8080)");
                println!("  -b, --bind ADDR           Address to bind (default: 127.0.0.1:8080)");
                println!("  -d, --database-url URL    Cluster URL, repeat in preference order");
                println!("                            (default: DATABASE_URL, DATABASE_URL_2, ...)");
                println!("  -h, --help                Show this help");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    if !cli_urls.is_empty() {
        config.database_urls = cli_urls;
    }

    info!("Starting RelaySQL endpoint...");

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
