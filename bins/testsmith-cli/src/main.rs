mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "testsmith-cli")]
#[command(about = "Testsmith CLI - Submit jobs and inspect their runs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a repository for a provisioned test run
    Submit {
        /// Clone URL or absolute local path
        repo_ref: String,

        /// Language hint selecting the runner profile
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Show one job and its recorded runs
    Status {
        /// Job id returned at submission
        job_id: i64,
    },

    /// List the most recently submitted jobs
    Recent,

    /// Flag a queued job for cancellation
    Cancel {
        /// Job id returned at submission
        job_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit { repo_ref, language } => {
            commands::submit(&repo_ref, language.as_deref()).await?;
        }
        Commands::Status { job_id } => {
            commands::status(job_id).await?;
        }
        Commands::Recent => {
            commands::recent().await?;
        }
        Commands::Cancel { job_id } => {
            commands::cancel(job_id).await?;
        }
    }

    Ok(())
}
