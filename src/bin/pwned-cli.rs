use std::io::{self, BufRead};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use sha1::{Digest, Sha1};

#[derive(Parser)]
#[command(name = "pwned-cli")]
#[command(about = "Client for the pwned-range-proxy lookup API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all breached suffixes for a 5-character hash prefix
    Range { prefix: String },
    /// Check a password; it is read from stdin and only its hash prefix is sent
    Check,
    /// Check service health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Range { prefix } => {
            let res = query_range(&client, &cli.url, &prefix).await?;
            print_response(res).await?;
        }
        Commands::Check => {
            let mut password = String::new();
            io::stdin().lock().read_line(&mut password)?;
            let password = password.trim_end_matches(['\r', '\n']);

            let hash = format!("{:X}", Sha1::digest(password.as_bytes()));
            let (prefix, suffix) = hash.split_at(5);

            let res = query_range(&client, &cli.url, prefix).await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }

            let body: Value = res.json().await?;
            let count = body["results"]
                .as_array()
                .into_iter()
                .flatten()
                .find(|r| r["suffix"].as_str() == Some(suffix))
                .and_then(|r| r["count"].as_u64())
                .unwrap_or(0);

            if count > 0 {
                println!("Found in {} breaches", count);
            } else {
                println!("Not found in any known breach");
            }
        }
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn query_range(
    client: &reqwest::Client,
    url: &str,
    prefix: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    client
        .post(format!("{}/api/v1/pwned-range", url))
        .json(&json!({ "prefix": prefix }))
        .send()
        .await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
