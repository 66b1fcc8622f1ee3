use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use sqlward_core::WhitelistConfig;
use sqlward_guard::{QueryGuard, QueryPolicy};

#[derive(Parser, Debug)]
#[command(
    name = "sqlward",
    version,
    about = "Validate SQL queries against table and function whitelists"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a query against a whitelist file.
    Check {
        /// Path to the whitelist YAML file (tables, functions).
        #[arg(long)]
        policy: PathBuf,

        /// Emit the verdict as a JSON object instead of plain text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// The query text. Read from stdin when omitted.
        query: Option<String>,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Check {
            policy,
            json,
            query,
        } => check(policy, json, query),
    }
}

fn check(policy_path: PathBuf, json: bool, query: Option<String>) -> anyhow::Result<ExitCode> {
    let config = WhitelistConfig::from_file(&policy_path)
        .with_context(|| format!("loading whitelist from {}", policy_path.display()))?;
    let policy = QueryPolicy::from(&config);

    let query = match query {
        Some(query) => query,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading query from stdin")?;
            buffer
        }
    };

    match QueryGuard::new().validate(&query, &policy) {
        Ok(()) => {
            if json {
                println!("{}", json!({ "ok": true }));
            } else {
                println!("ok");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            if json {
                println!(
                    "{}",
                    json!({ "ok": false, "code": err.code(), "message": err.to_string() })
                );
            } else {
                eprintln!("{err}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
