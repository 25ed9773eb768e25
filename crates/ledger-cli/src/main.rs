use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "LEDGER_NODE", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append a record
    Add {
        /// Record as a JSON object, e.g. '{"studentName":"Ada"}'
        #[arg(long)]
        data: String,
    },
    /// List every block in chain order
    List,
    /// Fetch one block by hash
    Get { hash: String },
    /// Replace a record's payload and repair the chain behind it
    Amend {
        hash: String,
        #[arg(long)]
        data: String,
    },
    /// Delete a record and repair the chain behind it
    Delete { hash: String },
    /// Check every hash and link
    Verify,
    /// Node liveness
    Health,
}

fn parse_record(data: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(data).context("--data must be valid JSON")?;
    if !value.is_object() {
        bail!("--data must be a JSON object");
    }
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let (method, path, body) = match cli.cmd {
        Command::Add { data } => (Method::POST, "/api/records".to_string(), Some(parse_record(&data)?)),
        Command::List => (Method::GET, "/api/records".to_string(), None),
        Command::Get { hash } => (Method::GET, format!("/api/records/{hash}"), None),
        Command::Amend { hash, data } => (
            Method::PUT,
            format!("/api/records/{hash}"),
            Some(parse_record(&data)?),
        ),
        Command::Delete { hash } => (Method::DELETE, format!("/api/records/{hash}"), None),
        Command::Verify => (Method::GET, "/api/verify".to_string(), None),
        Command::Health => (Method::GET, "/api/health".to_string(), None),
    };

    let client = Client::new();
    let url = format!("{node}{path}");
    debug!(%method, %url, "sending request");
    let mut req = client.request(method, &url);
    if let Some(body) = &body {
        req = req.json(body);
    }
    let res = req.send().await?;
    let status = res.status();
    let text = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    Ok(())
}
