use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::process;

mod cli;

use fragments_config::PreviewConfig;
use fragments_preview::{generate_offline_fragment, select};

#[derive(Parser)]
#[command(name = "fragments")]
#[command(about = "Fragments CLI - preview generated code fragments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which backend a template is previewed with
    Select {
        /// Template identifier, e.g. nextjs-developer
        template: String,
    },
    /// Print a canned fragment for a prompt as JSON
    Offline {
        /// Prompt text; keywords pick the preset
        prompt: String,
        #[arg(long, help = "Pretty-print the JSON")]
        pretty: bool,
    },
    /// Preview a fragment with local backends
    Preview {
        /// Path to a fragment JSON file
        fragment: PathBuf,
        #[arg(long, help = "Execution result JSON for externally executed templates")]
        result: Option<PathBuf>,
        #[arg(long, help = "Stream install and dev server output")]
        logs: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    fragments_cli::init_tracing();

    let cli = Cli::parse();

    match handle_command(cli.command).await {
        Ok(_) => {}
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Select { template } => {
            println!("{}", select(Some(&template)));
            Ok(())
        }
        Commands::Offline { prompt, pretty } => {
            let fragment = generate_offline_fragment(&prompt);
            let json = if pretty {
                serde_json::to_string_pretty(&fragment)?
            } else {
                serde_json::to_string(&fragment)?
            };
            println!("{}", json);
            Ok(())
        }
        Commands::Preview {
            fragment,
            result,
            logs,
        } => {
            cli::preview::preview_command(&fragment, result.as_deref(), logs, PreviewConfig::from_env())
                .await
        }
    }
}
