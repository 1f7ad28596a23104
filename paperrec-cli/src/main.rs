//! paperrec-cli: thin client for the paperrec HTTP API
//!
//! # Subcommands
//! - `recommend <user_id> [-k <n>] [--json]`: top-n papers for a user
//! - `status`                               : show server health

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8767";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "paperrec-cli", version, about = "Query a paperrec recommendation server")]
struct Cli {
    /// paperrec HTTP server URL (overrides PAPERREC_HTTP_URL env var)
    #[arg(long, env = "PAPERREC_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Recommend papers for a user
    Recommend {
        user_id: i64,

        /// Number of papers (server default when omitted)
        #[arg(short = 'k', long)]
        k: Option<usize>,

        /// Print the raw JSON array
        #[arg(long)]
        json: bool,
    },

    /// Show server status
    Status,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Recommendation {
    pub paper_id: i64,
    pub score: f32,
}

pub fn recommend_url(server: &str, user_id: i64, k: Option<usize>) -> String {
    match k {
        Some(k) => format!("{}/recommend/{}?k={}", server, user_id, k),
        None => format!("{}/recommend/{}", server, user_id),
    }
}

/// One line per paper: rank, id, score.
pub fn render_table(recs: &[Recommendation]) -> String {
    let mut out = String::new();
    for (rank, r) in recs.iter().enumerate() {
        out.push_str(&format!("{:>3}. paper {:<10} {:.4}\n", rank + 1, r.paper_id, r.score));
    }
    out
}

/// An empty list is either a cold start or an exhausted index; the server
/// does not say which.
pub fn empty_message(user_id: i64) -> String {
    format!("No recommendations for user {}", user_id)
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn do_recommend(server: &str, user_id: i64, k: Option<usize>, json_output: bool) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let url = recommend_url(server, user_id, k);
    let resp = match client.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("paperrec-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("paperrec-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    let recs: Vec<Recommendation> = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("paperrec-cli: failed to parse response: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&recs)?);
    } else if recs.is_empty() {
        eprintln!("{}", empty_message(user_id));
    } else {
        print!("{}", render_table(&recs));
    }

    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("paperrec server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
            println!("Papers:          {}", body["papers"]);
            println!("Vectors:         {}", body["vectors"]);
            println!("Dimensions:      {}", body["dimensions"]);
            println!("Build:           {}", body["build_id"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("paperrec-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("paperrec-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Recommend { user_id, k, json } => do_recommend(&server, user_id, k, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("paperrec-cli: {}", e);
        std::process::exit(1);
    }
}
