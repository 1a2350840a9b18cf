//! CLI tool to mint and inspect access keys.
//!
//! Usage:
//!   cargo run --bin manage-keys -- generate [--valid-for <secs>]
//!   cargo run --bin manage-keys -- list [--limit <n>]
//!   cargo run --bin manage-keys -- show --token <token>

use std::env;
use std::time::Duration;

use keygate_lib::config::Config;
use keygate_lib::db::DbPool;
use keygate_lib::models::KeyListItem;
use keygate_lib::services::KeyStore;
use keygate_lib::services::key_store::DEFAULT_LIST_LIMIT;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = &args[1];
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        print_usage();
        return;
    }

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match DbPool::new(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error connecting to database: {}", e);
            std::process::exit(1);
        }
    };

    let store = KeyStore::new(pool, config.keys.grant_window, config.keys.max_validity);

    match command.as_str() {
        "generate" | "gen" => {
            let secs = parse_number_arg(&args, "--valid-for")
                .unwrap_or(config.keys.default_validity.as_secs());
            generate_key(&store, Duration::from_secs(secs)).await;
        }
        "list" | "ls" => {
            let limit = parse_number_arg(&args, "--limit").unwrap_or(DEFAULT_LIST_LIMIT);
            list_keys(&store, limit).await;
        }
        "show" => {
            let Some(token) = find_arg(&args, "--token") else {
                eprintln!("Error: --token is required");
                std::process::exit(1);
            };
            show_key(&store, token).await;
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn find_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .skip(2)
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 3))
        .map(String::as_str)
}

fn parse_number_arg(args: &[String], flag: &str) -> Option<u64> {
    let raw = find_arg(args, flag)?;
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            eprintln!("Error: {} expects a number, got '{}'", flag, raw);
            std::process::exit(1);
        }
    }
}

async fn generate_key(store: &KeyStore, validity: Duration) {
    match store.generate(validity).await {
        Ok(key) => {
            println!("{}", key.token);
            if let Some(expires_at) = key.expires_at {
                eprintln!("Valid until {}", expires_at.to_rfc3339());
            }
        }
        Err(e) => {
            eprintln!("Error generating key: {}", e);
            std::process::exit(1);
        }
    }
}

async fn list_keys(store: &KeyStore, limit: u64) {
    let keys = match store.list_recent(limit).await {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Error listing keys: {}", e);
            std::process::exit(1);
        }
    };

    if keys.is_empty() {
        println!("No keys found.");
        return;
    }

    println!();
    println!(
        "{:<24} {:<8} {:<26} {:<20} {:<6}",
        "TOKEN", "STATUS", "CREATED", "REDEEMED BY", "GRANT"
    );
    println!("{}", "-".repeat(88));

    for key in keys {
        let item = KeyListItem::from(key);
        let grant = if item.grant_active { "active" } else { "-" };

        println!(
            "{:<24} {:<8} {:<26} {:<20} {:<6}",
            item.token,
            item.status.as_str(),
            item.created_at,
            item.redeemed_by.as_deref().unwrap_or("-"),
            grant
        );
    }
    println!();
}

async fn show_key(store: &KeyStore, token: &str) {
    match store.get(token).await {
        Ok(Some(key)) => {
            let item = KeyListItem::from(key);
            match serde_json::to_string_pretty(&item) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error formatting key: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Ok(None) => {
            eprintln!("Key not found.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error reading key: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Keygate key management");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  manage-keys generate [--valid-for <secs>]   Mint a new key and print its token");
    eprintln!("  manage-keys list [--limit <n>]              List the most recent keys");
    eprintln!("  manage-keys show --token <token>            Show one key");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_ENV       development | production (required)");
    eprintln!("  DATABASE_URL   PostgreSQL connection string");
}
