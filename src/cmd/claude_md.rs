//! CLAUDE.md commands: `taskdeck check` and `taskdeck generate`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use console::{Emoji, style};
use indicatif::{ProgressBar, ProgressStyle};

use taskdeck::config::TaskdeckConfig;
use taskdeck::generate::{self, CLAUDE_MD_FILE, ClaudeMdGenerator};
use taskdeck::ipc::{BackendEvent, EventSink};
use taskdeck::runner::RunnerExecutor;

static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");

/// Resolve to an absolute path; the runner runs from the backend root.
fn absolute_project(project: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(project)
        .with_context(|| format!("Project directory {} not found", project.display()))
}

pub fn cmd_check(project: &Path) -> Result<()> {
    let project = absolute_project(project)?;
    let status = generate::check_exists(&project.to_string_lossy())?;
    match status.path {
        Some(path) if status.exists => {
            println!("{}{} exists at {}", CHECK, CLAUDE_MD_FILE, path.display());
        }
        _ => {
            println!(
                "No {} in {}. Run {} to create one.",
                CLAUDE_MD_FILE,
                project.display(),
                style("taskdeck generate").cyan()
            );
        }
    }
    Ok(())
}

pub async fn cmd_generate(config: &TaskdeckConfig, project: &Path, model: Option<&str>) -> Result<()> {
    let project = absolute_project(project)?;
    let project_key = project.to_string_lossy().to_string();
    let generator = ClaudeMdGenerator::new(config.runner.clone(), RunnerExecutor::default());

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} [{bar:30.cyan/blue}] {pos:>3}% {prefix:.bold.dim} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░"),
    );
    bar.set_prefix("starting");
    bar.enable_steady_tick(Duration::from_millis(100));

    let (sink, mut events) = EventSink::channel();
    let model = model.map(str::to_string);
    let worker = tokio::spawn({
        let project_key = project_key.clone();
        async move { generator.generate(&project_key, model.as_deref(), &sink).await }
    });

    while let Some(event) = events.recv().await {
        match event {
            BackendEvent::ClaudeMdProgress { progress, .. } => {
                bar.set_position(u64::from(progress.percent));
                bar.set_prefix(progress.phase);
                bar.set_message(progress.message);
            }
            BackendEvent::ClaudeMdComplete { .. } | BackendEvent::ClaudeMdError { .. } => break,
            _ => {}
        }
    }

    let result = worker.await.context("Generation task panicked")?;
    bar.finish_and_clear();

    match result.output_path() {
        Some(path) => {
            println!("{}Generated {}", CHECK, style(path.display()).green());
            Ok(())
        }
        None => {
            let error = result.error().unwrap_or("unknown error");
            eprintln!("{}{}", CROSS, style(error).red());
            anyhow::bail!("CLAUDE.md generation failed for {}", project_key)
        }
    }
}
