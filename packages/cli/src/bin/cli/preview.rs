// ABOUTME: Preview command driving a dispatcher against local backends
// ABOUTME: Streams project status until ready or failed, then waits for Ctrl-C before stopping

use anyhow::{anyhow, Result};
use colored::*;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use fragments_cli::{load_fragment, load_result};
use fragments_config::PreviewConfig;
use fragments_preview::{
    LogType, MountedPreview, PreviewDispatcher, PreviewServices, ProjectRuntime, RuntimeEvent,
    RuntimeStatus, ScriptStatus,
};

pub async fn preview_command(
    fragment_path: &Path,
    result_path: Option<&Path>,
    show_logs: bool,
    config: PreviewConfig,
) -> Result<()> {
    let fragment = load_fragment(fragment_path)?;
    let result = result_path.map(load_result).transpose()?;

    let mut dispatcher = PreviewDispatcher::new(PreviewServices::local(config));
    let kind = dispatcher.update(fragment, result).await;
    println!("{} {}", "Backend:".bold(), kind);

    let outcome = match dispatcher.mounted() {
        MountedPreview::VirtualizedProject(runtime) => run_project(runtime.clone(), show_logs).await,
        MountedPreview::InterpretedScript(script) => {
            let state = script.run().await;
            match (state.status, state.output, state.error) {
                (ScriptStatus::Completed, Some(output), _) => {
                    print!("{}", output.stdout);
                    if !output.stderr.is_empty() {
                        eprint!("{}", output.stderr.yellow());
                    }
                    println!(
                        "{} exit code {} in {}ms",
                        "Finished:".green().bold(),
                        output.exit_code,
                        output.duration_ms
                    );
                    Ok(())
                }
                (_, _, Some(error)) => Err(anyhow!(error)),
                _ => Err(anyhow!("Script did not run")),
            }
        }
        MountedPreview::ExternalResult(external) => {
            match external.surface() {
                Some(surface) => println!("{} {}", "Result:".green().bold(), surface.target),
                None => println!("Nothing to render"),
            }
            Ok(())
        }
        MountedPreview::None => {
            println!("Nothing to render");
            Ok(())
        }
    };

    dispatcher.unmount().await;
    outcome
}

async fn run_project(runtime: ProjectRuntime, show_logs: bool) -> Result<()> {
    let mut events = runtime.subscribe();
    let pipeline = tokio::spawn({
        let runtime = runtime.clone();
        async move { runtime.run().await }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut outcome = Ok(());
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(RuntimeEvent::Status { session }) => match session.status {
                    RuntimeStatus::Installing => {
                        println!("{} {}", "→".cyan(), session.status_line());
                    }
                    RuntimeStatus::Running => {
                        println!("{} {}", "Ready:".green().bold(), session.server_url);
                        println!("Press Ctrl-C to stop");
                    }
                    RuntimeStatus::Error => {
                        outcome = Err(anyhow!(session.message));
                        break;
                    }
                    RuntimeStatus::Idle => {}
                },
                Ok(RuntimeEvent::Log { log }) if show_logs => match log.log_type {
                    LogType::Stdout => println!("  {}", log.message.dimmed()),
                    LogType::Stderr => println!("  {}", log.message.yellow()),
                    LogType::System => {}
                },
                Ok(RuntimeEvent::Log { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} runtime events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => {
                println!("Stopping...");
                break;
            }
        }
    }

    runtime.stop().await;
    if let Err(e) = pipeline.await {
        warn!("Project pipeline ended abnormally: {}", e);
    }
    outcome
}
