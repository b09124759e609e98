use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use parley::analysis::{AnalyzeRequest, NlpService};
use parley::config::Config;
use parley::models::AnalysisStrategy;
use parley::server::{self, AppState};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Conversational query resolution service")]
struct Args {
    #[arg(short, long, help = "Path to config.toml (defaults to ./config.toml)")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Verbose output")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve {
        #[arg(long, help = "Address to bind, overrides server.bind")]
        bind: Option<String>,
    },
    /// Analyze one utterance and print the result as JSON
    Analyze {
        text: String,
        #[arg(long)]
        session: Option<String>,
        #[arg(long = "prev-bot", help = "Previous bot turn, used for coreference")]
        prev_bot: Option<String>,
        #[arg(long, help = "Run the generic orchestrator with this strategy instead of the domain path")]
        strategy: Option<AnalysisStrategy>,
    },
    /// List configured domains
    Domains,
}

fn main() -> Result<()> {
    // Environment from the data directory first, then the working directory
    if let Ok(data_dir) = parley::utils::paths::get_data_dir() {
        let env_path = data_dir.join(".env");
        if env_path.exists() {
            dotenv::from_path(env_path).ok();
        }
    }
    dotenv::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    match args.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => serve(config, bind),
        Commands::Analyze {
            text,
            session,
            prev_bot,
            strategy,
        } => {
            let service = NlpService::new(&config)?;
            let request = AnalyzeRequest {
                text,
                session_id: session,
                prev_bot_response: prev_bot,
                last_user_message: None,
                strategy,
            };
            let output = match strategy {
                Some(_) => serde_json::to_string_pretty(&service.analyze_text(&request)?)?,
                None => serde_json::to_string_pretty(&service.analyze(&request))?,
            };
            println!("{}", output);
            Ok(())
        }
        Commands::Domains => {
            for domain in &config.domains {
                let marker = if domain.name == config.current_domain { "*" } else { " " };
                println!(
                    "{} {:<20} similarity {:.2}  intent {:.2}",
                    marker, domain.name, domain.similarity_threshold, domain.intent_confidence_threshold
                );
            }
            Ok(())
        }
    }
}

fn serve(config: Config, bind: Option<String>) -> Result<()> {
    info!("Starting parley...");

    let workers = config.server.workers.unwrap_or_else(num_cpus::get).max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?;

    let service = Arc::new(NlpService::new(&config)?);
    let state = AppState::new(service, Duration::from_secs(config.server.request_timeout_secs));
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    info!("Runtime workers: {}", workers);
    runtime.block_on(server::run(state, &bind))
}
