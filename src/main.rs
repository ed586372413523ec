//! `concept-visualizer` - command-line task tracker.
//!
//! Usage:
//!   concept-visualizer [--config <path>] watch <task-id>
//!   concept-visualizer [--config <path>] cancel <task-id>
//!   concept-visualizer [--config <path>] generate --logo <text> --theme <text> [--watch]
//!   concept-visualizer [--config <path>] refine --image-url <url> --prompt <text> [--watch]
//!
//! Without `--config` the configuration lives at
//! `~/.concept-visualizer/config.json`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use concept_visualizer::{
    AppState, PollOptions, TaskDocument, TaskEvent, TaskTracker, TrackedTask,
};
use concept_visualizer_api::{GenerationRequest, RefinementRequest};
use tracing::info;

/// Concept Visualizer task tracker.
#[derive(Parser, Debug)]
#[command(name = "concept-visualizer", version, about = "Track concept generation tasks")]
struct Cli {
    /// Path to config.json.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow a task until it completes or fails.
    Watch {
        task_id: String,
    },
    /// Request cancellation of a task.
    Cancel {
        task_id: String,
    },
    /// Start a concept generation job.
    Generate {
        #[arg(long)]
        logo: String,
        #[arg(long)]
        theme: String,
        #[arg(long)]
        palettes: Option<u32>,
        /// Follow the new task until it ends.
        #[arg(long)]
        watch: bool,
    },
    /// Start a refinement job for an existing concept image.
    Refine {
        #[arg(long = "image-url")]
        image_url: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        logo: Option<String>,
        #[arg(long)]
        theme: Option<String>,
        /// Aspects of the original to keep (repeatable).
        #[arg(long = "preserve")]
        preserve: Vec<String>,
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let state = AppState::new();
    state
        .initialize(cli.config.clone())
        .await
        .context("failed to initialize client state")?;
    let tracker = state.tracker().await?;

    match cli.command {
        Command::Watch { task_id } => follow(&tracker, task_id).await,
        Command::Cancel { task_id } => {
            let ack = tracker.cancel(&task_id).await?;
            print_document(&ack)?;
            Ok(())
        }
        Command::Generate {
            logo,
            theme,
            palettes,
            watch,
        } => {
            let request = GenerationRequest {
                logo_description: logo,
                theme_description: theme,
                num_palettes: palettes,
            };
            let document = tracker.start_generation(&request).await?;
            print_document(&document)?;
            if watch {
                follow(&tracker, document.id).await?;
            }
            Ok(())
        }
        Command::Refine {
            image_url,
            prompt,
            logo,
            theme,
            preserve,
            watch,
        } => {
            let request = RefinementRequest {
                original_image_url: image_url,
                refinement_prompt: prompt,
                logo_description: logo,
                theme_description: theme,
                preserve_aspects: preserve,
            };
            let document = tracker.start_refinement(&request).await?;
            print_document(&document)?;
            if watch {
                follow(&tracker, document.id).await?;
            }
            Ok(())
        }
    }
}

/// Track `task_id`, printing each status change, until it ends or Ctrl-C.
async fn follow(tracker: &TaskTracker, task_id: String) -> anyhow::Result<()> {
    let tracked: TrackedTask = tracker.track(Some(task_id.clone()), PollOptions::new());
    let mut updates = tracked.watch().subscribe();
    let mut last_status = None;

    loop {
        let status = updates.borrow_and_update().document.as_ref().map(|d| d.status);
        if status.is_some() && status != last_status {
            if let Some(status) = status {
                println!("{task_id}: {status}");
            }
            last_status = status;
        }

        let state = updates.borrow().clone();
        if let Some(outcome) = state.outcome {
            return report(outcome);
        }
        if !state.is_polling {
            anyhow::bail!("stopped tracking {task_id} before it finished");
        }

        tokio::select! {
            changed = updates.changed() => changed.context("tracking ended unexpectedly")?,
            _ = tokio::signal::ctrl_c() => {
                info!(task_id = %task_id, "interrupted");
                return Ok(());
            }
        }
    }
}

fn report(outcome: TaskEvent) -> anyhow::Result<()> {
    match outcome {
        TaskEvent::Completed(document) => {
            print_document(&document)?;
            Ok(())
        }
        TaskEvent::Failed { document, error } => {
            print_document(&document)?;
            Err(anyhow::anyhow!(error))
        }
    }
}

fn print_document(document: &TaskDocument) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(document)?);
    Ok(())
}
