//! quizgate CLI — the command-line front end of the assessment core.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod input;

#[derive(Parser)]
#[command(
    name = "quizgate",
    version,
    about = "Quiz scoring and final-exam gating for learning modules"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a set of answers against a quiz
    Score {
        /// Quiz JSON file
        #[arg(long)]
        quiz: PathBuf,

        /// Answers JSON file (list of {qid, selected} or an object keyed by qid)
        #[arg(long)]
        answers: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show the final-exam status of a module snapshot
    Gate {
        /// Module state JSON file
        #[arg(long)]
        module: PathBuf,

        /// Evaluation instant (RFC 3339), defaults to now
        #[arg(long)]
        now: Option<String>,

        /// Locale for labels, defaults to the configured locale
        #[arg(long)]
        locale: Option<String>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the structure signature of a module
    Signature {
        /// Required section ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,

        /// Micro-quiz ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        micro_quizzes: Vec<String>,
    },

    /// Grade answers and submit the attempt to a JSON-file store
    Submit {
        /// Quiz JSON file
        #[arg(long)]
        quiz: PathBuf,

        /// Answers JSON file
        #[arg(long)]
        answers: PathBuf,

        /// Storage file
        #[arg(long)]
        store: PathBuf,

        /// Override the configured number of retries
        #[arg(long)]
        max_retries: Option<u32>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List stored attempts of a quiz, oldest first
    Attempts {
        /// Quiz id
        #[arg(long)]
        quiz_id: String,

        /// Storage file
        #[arg(long)]
        store: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create a starter config and a sample quiz
    Init,
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quizgate=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Score {
            quiz,
            answers,
            format,
        } => commands::score::execute(quiz, answers, format),
        Commands::Gate {
            module,
            now,
            locale,
            format,
            config,
        } => commands::gate::execute(module, now, locale, format, config),
        Commands::Signature {
            sections,
            micro_quizzes,
        } => commands::signature::execute(sections, micro_quizzes),
        Commands::Submit {
            quiz,
            answers,
            store,
            max_retries,
            config,
        } => commands::submit::execute(quiz, answers, store, max_retries, config).await,
        Commands::Attempts {
            quiz_id,
            store,
            format,
        } => commands::attempts::execute(quiz_id, store, format),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
