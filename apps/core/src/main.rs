// Diriyah Brain console harness
// Trains the intent model and exercises routing and access checks end-to-end.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use diriyah_brain_core::access::User;
use diriyah_brain_core::brain::{default_training_set, StatisticalClassifier, TrainingOptions};
use diriyah_brain_core::telemetry::init_tracing;
use diriyah_brain_core::{BrainCore, CoreConfig};

#[derive(Debug, Parser)]
#[command(name = "diriyah-brain", version, about = "Intent routing and access control for Diriyah Brain")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Train the intent classifier on the built-in phrase table.
    Train {
        /// Where to write the model; defaults to DIRIYAH_INTENT_MODEL.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 500)]
        epochs: usize,
        #[arg(long, default_value_t = 1.0)]
        learning_rate: f64,
        #[arg(long, default_value_t = 0.001)]
        l2: f64,
    },
    /// Route one message as the given user and print the JSON reply.
    Route {
        #[arg(long)]
        role: String,
        #[arg(long, default_value = "console@diriyah.sa")]
        user: String,
        /// Also print the role-aware prompt for the message.
        #[arg(long)]
        prompt: bool,
        message: String,
    },
    /// Evaluate a permission check.
    Check {
        #[arg(long)]
        role: String,
        #[arg(long)]
        action: String,
        #[arg(long = "document-type")]
        document_type: Option<String>,
    },
    /// Print the role-aware prompt for a query.
    Prompt {
        #[arg(long)]
        role: String,
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CoreConfig::load().context("invalid configuration")?;
    init_tracing(&config)?;

    match cli.command {
        Command::Train {
            out,
            epochs,
            learning_rate,
            l2,
        } => {
            let path = out
                .or_else(|| config.intent_model.clone())
                .context("no output path: pass --out or set DIRIYAH_INTENT_MODEL")?;
            let options = TrainingOptions {
                epochs,
                learning_rate,
                l2,
            };
            let classifier = StatisticalClassifier::train(&default_training_set(), &options)?;
            classifier.save(&path)?;
            info!("Model written with {} labels", classifier.labels().len());
            println!("{}", path.display());
        }
        Command::Route {
            role,
            user,
            prompt,
            message,
        } => {
            let core = BrainCore::from_config(&config)?;
            let user = User::new(user, role);
            let reply = core.handle_chat(&user, &message).await;
            println!("{}", serde_json::to_string_pretty(&reply)?);
            if prompt {
                println!("{}", core.role_aware_prompt(&user, &message));
            }
        }
        Command::Check {
            role,
            action,
            document_type,
        } => {
            let core = BrainCore::from_config(&config)?;
            let decision = core
                .access()
                .decide(&role, &action, document_type.as_deref());
            println!("{}", serde_json::to_string(&decision)?);
        }
        Command::Prompt { role, query } => {
            let core = BrainCore::from_config(&config)?;
            let user = User::new("console@diriyah.sa", role);
            println!("{}", core.role_aware_prompt(&user, &query));
        }
    }

    Ok(())
}
