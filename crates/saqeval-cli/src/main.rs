//! saqeval CLI — grade short answers with a language model.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "saqeval",
    version,
    about = "LLM-graded short-answer quizzes with bounded retries"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single answer and print the outcome as JSON
    Evaluate {
        /// Question text
        #[arg(long)]
        question: String,

        /// Reference (ideal) answer
        #[arg(long)]
        reference: String,

        /// Student answer
        #[arg(long)]
        answer: String,

        /// Session identifier
        #[arg(long, default_value = "cli")]
        session: String,

        /// Question identifier
        #[arg(long, default_value = "q1")]
        question_id: String,

        /// Provider name from the config (defaults to `default_provider`)
        #[arg(long)]
        provider: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,
    },

    /// Run an interactive quiz over a question bank
    Quiz {
        /// Path to a question bank (.toml or .json)
        #[arg(long)]
        bank: PathBuf,

        /// Write a JSON session report here when the quiz ends
        #[arg(long)]
        report: Option<PathBuf>,

        /// Integrity events (JSONL) to attach to the report
        #[arg(long)]
        events: Option<PathBuf>,

        /// Provider name from the config
        #[arg(long)]
        provider: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,
    },

    /// Evaluate a file of submissions (JSONL, one request per line)
    Batch {
        /// Path to the submissions file
        #[arg(long)]
        submissions: PathBuf,

        /// Max sessions evaluated concurrently (defaults to config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Provider name from the config
        #[arg(long)]
        provider: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,
    },

    /// Summarize integrity events per session
    Risk {
        /// Path to events (JSONL)
        #[arg(long)]
        events: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Validate question bank files
    Validate {
        /// Path to a question bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,
    },

    /// Create starter config and example question bank
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("saqeval=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Evaluate {
            question,
            reference,
            answer,
            session,
            question_id,
            provider,
            model,
        } => {
            commands::evaluate::execute(
                commands::evaluate::Submission {
                    question,
                    reference,
                    answer,
                    session,
                    question_id,
                },
                provider,
                model,
                config,
            )
            .await
        }
        Commands::Quiz {
            bank,
            report,
            events,
            provider,
            model,
        } => commands::quiz::execute(bank, report, events, provider, model, config).await,
        Commands::Batch {
            submissions,
            parallelism,
            provider,
            model,
        } => commands::batch::execute(submissions, parallelism, provider, model, config).await,
        Commands::Risk { events, format } => commands::risk::execute(events, format),
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::ListModels { provider } => commands::list_models::execute(provider, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
