use std::sync::Arc;

use clap::Parser;
use paperrec_core::{artifacts, PaperRecConfig, PgInteractionSource};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use paperrec_server::http::{self, HttpState};
use paperrec_server::ServingState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "paperrec.toml")]
    config: String,

    /// Check the database and artifacts, then exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match PaperRecConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over `[service] log_level`.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    // Inconsistent artifacts abort start-up.
    let loaded = match artifacts::load_serving_state(&config.artifacts.paths()) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Failed to load artifacts: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match paperrec_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match paperrec_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }
        match paperrec_core::db::count_indexable_papers(&pool).await {
            Ok(n) => println!(
                "✅ Artifacts loaded: {} papers indexed, {} eligible in corpus",
                loaded.index.id_set().len(),
                n
            ),
            Err(e) => {
                println!("❌ Corpus query failed: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if !config.http.enabled {
        tracing::warn!("[http] enabled = false; nothing to serve");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = HttpState {
        build_id: loaded.index.build_id().to_string(),
        serving: ServingState::new(loaded, config.profile.clone(), config.recommend.clone()),
        interactions: Arc::new(PgInteractionSource::new(pool)),
    };

    http::start_http_server(state, &config.http, tx.subscribe()).await?;

    Ok(())
}
