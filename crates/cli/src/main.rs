//! QueryLens CLI: the main entry point.
//!
//! Commands:
//! - `analyze`: Analyze a business question into a context profile
//! - `prompt` : Analyze a question and assemble a budgeted prompt
//! - `config` : Create, show and validate the configuration file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "querylens",
    about = "QueryLens: business question analysis and prompt assembly",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a question and print its business-context profile
    Analyze {
        /// The natural-language business question
        question: String,

        /// User id for personalization and caching
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Business catalog file (.json or .toml); the bundled sample otherwise
        #[arg(short, long, env = "QUERYLENS_CATALOG")]
        catalog: Option<PathBuf>,

        /// Print the profile as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze a question and assemble a prompt within a token budget
    Prompt {
        question: String,

        #[arg(short, long, default_value = "cli")]
        user: String,

        #[arg(short, long, env = "QUERYLENS_CATALOG")]
        catalog: Option<PathBuf>,

        /// Total token limit; the configured default otherwise
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Tokens reserved for the response
        #[arg(long)]
        reserved: Option<usize>,

        /// Rebuild once for this feedback (e.g. too_much_context, incorrect_sql)
        #[arg(long)]
        feedback: Option<String>,

        /// Print the build trace and per-category usage
        #[arg(long)]
        trace: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the config file and knowledge base
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Analyze {
            question,
            user,
            catalog,
            json,
        } => commands::analyze::run(&question, &user, catalog.as_deref(), json).await?,
        Commands::Prompt {
            question,
            user,
            catalog,
            max_tokens,
            reserved,
            feedback,
            trace,
        } => {
            let options = commands::prompt::PromptOptions {
                user,
                catalog,
                max_tokens,
                reserved,
                feedback,
                trace,
            };
            commands::prompt::run(&question, options).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init()?,
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
    }

    Ok(())
}
