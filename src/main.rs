use anyhow::Result;
use clap::{Parser, Subcommand};
use history_enricher::pipeline::{self, Credentials, PipelineConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Consolidate raw export files and enrich them with genres and geolocation
    Enrich(EnrichArgs),
    /// Inspect the lookup caches and, optionally, an enriched dataset
    CacheReport(ReportArgs),
}

#[derive(Parser, Debug)]
struct EnrichArgs {
    /// Directory containing the raw streaming history JSON exports
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Directory holding genre_cache.json and geo_cache.json
    #[arg(short, long)]
    cache_dir: PathBuf,

    /// Output CSV file
    #[arg(short, long)]
    output: PathBuf,

    /// Spotify application client id (genre enrichment degrades without it)
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    spotify_client_id: Option<String>,

    /// Spotify application client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET")]
    spotify_client_secret: Option<String>,

    /// ipinfo.io token (geolocation degrades without it)
    #[arg(long, env = "IPINFO_TOKEN")]
    ipinfo_token: Option<String>,

    /// Minimum delay between external calls, in milliseconds
    #[arg(long, default_value_t = history_enricher::lookup::DEFAULT_CALL_SPACING_MS)]
    call_spacing_ms: u64,

    /// Concurrent lookup workers; the rate limit is shared across them
    #[arg(long, default_value_t = history_enricher::enricher::DEFAULT_WORKERS)]
    workers: usize,
}

#[derive(Parser, Debug)]
struct ReportArgs {
    /// Directory holding genre_cache.json and geo_cache.json
    #[arg(short, long)]
    cache_dir: PathBuf,

    /// Enriched CSV to compute the most-played artists from
    #[arg(long)]
    dataset: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Enrich(args) => run_enrich(args).await,
        Commands::CacheReport(args) => {
            pipeline::cache_report(&args.cache_dir, args.dataset.as_deref())
        }
    }
}

async fn run_enrich(args: EnrichArgs) -> Result<()> {
    println!("Starting History Enricher");
    println!("Input: {:?}", args.input_dir);
    println!("Caches: {:?}", args.cache_dir);

    let config = PipelineConfig {
        input_dir: args.input_dir,
        cache_dir: args.cache_dir,
        output_file: args.output,
        credentials: Credentials {
            spotify_client_id: args.spotify_client_id,
            spotify_client_secret: args.spotify_client_secret,
            ipinfo_token: args.ipinfo_token,
        },
        call_spacing: Duration::from_millis(args.call_spacing_ms),
        workers: args.workers,
    };

    pipeline::run(config).await?;
    println!("Done!");
    Ok(())
}
