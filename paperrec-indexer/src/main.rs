use anyhow::Context;
use clap::{Parser, Subcommand};
use paperrec_core::{backend_from_config, PaperRecConfig, PgPaperCorpus};
use tracing_subscriber::{fmt, EnvFilter};

use paperrec_indexer::{build_index, update_index, UpdateOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline index jobs for paperrec", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "paperrec.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-embed the whole corpus and replace the artifacts
    Build {
        /// Override `[embedding] batch_size`
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Append papers that are not in the index yet
    Update {
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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

    let pool = paperrec_core::db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    let corpus = PgPaperCorpus::new(pool);
    let backend = backend_from_config(&config).context("Failed to create embedding backend")?;
    let paths = config.artifacts.paths();

    match args.command {
        Command::Build { batch_size } => {
            let batch_size = batch_size.unwrap_or(config.embedding.batch_size);
            let report = build_index(&corpus, backend.as_ref(), batch_size, &paths).await?;
            println!(
                "Indexed {} papers ({} dimensions), build {}",
                report.papers, report.dimensions, report.build_id
            );
        }
        Command::Update { batch_size } => {
            let batch_size = batch_size.unwrap_or(config.embedding.batch_size);
            match update_index(&corpus, backend.as_ref(), batch_size, &paths).await? {
                UpdateOutcome::NoNewPapers { total } => {
                    println!("No new papers; index holds {total}");
                }
                UpdateOutcome::Added { added, total } => {
                    println!("Added {added} papers; index holds {total}");
                }
            }
        }
    }

    Ok(())
}
