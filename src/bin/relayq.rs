//! relayq - run one query through the dispatcher
//!
//! Usage: relayq [--endpoint URL] [--data-dir DIR] [--seed FILE] QUERY [PARAM ...]
//!
//! Each PARAM is parsed as JSON, falling back to a plain string, so `42`,
//! `true` and `null` bind as typed values while `bob` binds as `"bob"`.

use std::path::PathBuf;

use log::info;
use serde_json::Value;

use relaysql::{ClientConfig, Dispatcher, Route};

fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_help() {
    println!("relayq - run one query, remote first with local fallback");
    println!();
    println!("Usage: relayq [OPTIONS] QUERY [PARAM ...]");
    println!();
    println!("Options:");
    println!("  -e, --endpoint URL    Remote query endpoint (default: RELAYSQL_ENDPOINT)");
    println!("  -d, --data-dir DIR    Local store directory (default: RELAYSQL_DATA_DIR)");
    println!("  -s, --seed FILE       Import {{\"table\": [rows]}} into the local store first");
    println!("  -h, --help            Show this help");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let args: Vec<String> = std::env::args().collect();

    let mut config = ClientConfig::from_env()?;
    let mut seed: Option<PathBuf> = None;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" | "-e" => {
                if i + 1 < args.len() {
                    config.endpoint = args[i + 1].clone();
                    i += 1;
                }
            }
            "--data-dir" | "-d" => {
                if i + 1 < args.len() {
                    config.data_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--seed" | "-s" => {
                if i + 1 < args.len() {
                    seed = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let Some((query, params)) = positional.split_first() else {
        print_help();
        return Ok(());
    };
    let params: Vec<Value> = params.iter().map(|raw| parse_param(raw)).collect();

    let dispatcher = Dispatcher::open(&config)?;

    if let Some(path) = seed {
        let document: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        let tables = dispatcher.interpreter().store().import(&document)?;
        info!("Seeded {} local tables from {:?}", tables, path);
    }

    let dispatched = dispatcher.execute_routed(query, &params).await;
    match &dispatched.route {
        Route::Remote { source } => {
            println!("-- remote ({})", source.as_deref().unwrap_or("unknown cluster"))
        }
        Route::Local { shape } => println!("-- local ({})", shape),
    }
    println!("{}", serde_json::to_string_pretty(&dispatched.rows)?);

    Ok(())
}
