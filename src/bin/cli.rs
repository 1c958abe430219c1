//! CLI for hub operations

use clap::{Parser, Subcommand};
use hubkv::common::{encode_key, Error};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "hubkv")]
#[command(about = "hubkv coordination hub CLI")]
#[command(version)]
struct Cli {
    /// Hub URL
    #[arg(long, default_value = "http://localhost:7400")]
    hub: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a node
    RegisterNode {
        /// Node ID
        id: String,

        /// Node category
        #[arg(long, default_value = "default")]
        category: String,
    },

    /// List registered nodes
    Nodes {
        /// Filter by category
        #[arg(long)]
        category: Option<String>,
    },

    /// Write a key (value is a JSON literal, e.g. '"hi"' or '{"a":1}')
    Put {
        key: String,
        value: String,

        /// Origin node id
        #[arg(long)]
        origin: Option<String>,
    },

    /// Read a key
    Get { key: String },

    /// Delete a key
    Delete { key: String },

    /// Search keys and values
    Search { query: String },

    /// Trigger a reconciliation pass
    Sync,

    /// Show hub stats
    Stats,
}

fn print_json(value: &Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

async fn expect_ok(response: reqwest::Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(Error::Http(format!("hub returned {}: {}", status, body)).into());
    }
    Ok(body)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::RegisterNode { id, category } => {
            let response = client
                .post(format!("{}/nodes", cli.hub))
                .json(&serde_json::json!({ "id": id, "category": category }))
                .send()
                .await?;
            let node = expect_ok(response).await?;
            println!("Registered:");
            print_json(&node);
        }

        Commands::Nodes { category } => {
            let mut url = format!("{}/nodes", cli.hub);
            if let Some(category) = category {
                url = format!("{}?category={}", url, category);
            }
            let body = expect_ok(client.get(url).send().await?).await?;
            print_json(&body);
        }

        Commands::Put { key, value, origin } => {
            let value: Value = serde_json::from_str(&value)?;
            let response = client
                .put(format!("{}/kv/{}", cli.hub, encode_key(&key)))
                .json(&serde_json::json!({ "value": value, "origin_node_id": origin }))
                .send()
                .await?;
            let entry = expect_ok(response).await?;
            print_json(&entry);
        }

        Commands::Get { key } => {
            let response = client
                .get(format!("{}/kv/{}", cli.hub, encode_key(&key)))
                .send()
                .await?;
            let entry = expect_ok(response).await?;
            print_json(&entry);
        }

        Commands::Delete { key } => {
            let response = client
                .delete(format!("{}/kv/{}", cli.hub, encode_key(&key)))
                .send()
                .await?;
            let body = expect_ok(response).await?;
            print_json(&body);
        }

        Commands::Search { query } => {
            let response = client
                .get(format!("{}/search", cli.hub))
                .query(&[("q", query)])
                .send()
                .await?;
            let body = expect_ok(response).await?;
            print_json(&body);
        }

        Commands::Sync => {
            let outcome = expect_ok(client.post(format!("{}/sync", cli.hub)).send().await?).await?;
            println!("Sync outcome:");
            print_json(&outcome);
        }

        Commands::Stats => {
            let stats = expect_ok(client.get(format!("{}/stats", cli.hub)).send().await?).await?;
            print_json(&stats);
        }
    }

    Ok(())
}
