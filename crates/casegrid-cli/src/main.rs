//! CLI binary for enumerating and validating casegrid projects.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use casegrid_engine::{EventEmitter, HelmValidator, RunEvent, RunOptions};
use casegrid_project::{Project, ResolvedProject, Severity};
use casegrid_types::{RunSummary, ValidateMode};

#[derive(Parser)]
#[command(
    name = "casegrid",
    version,
    about = "Combinatorial validation of chart value overlays"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate the cases a project generates
    List {
        /// Path to the project manifest
        project: PathBuf,

        /// Print cases as JSON objects, one per line
        #[arg(long)]
        json: bool,
    },

    /// Check a project manifest for structural problems
    Check {
        /// Path to the project manifest
        project: PathBuf,
    },

    /// Generate every case and validate each against the chart
    Test {
        /// Path to the project manifest
        project: PathBuf,

        /// Number of cases to validate in parallel. Zero means one per CPU core.
        #[arg(short, long, default_value = "1")]
        parallel: usize,

        /// Stop after `helm lint`; skip rendering and the dry-run apply
        #[arg(long, conflicts_with = "no_apply")]
        only_lint: bool,

        /// Render with `helm template` but skip the dry-run apply
        #[arg(long)]
        no_apply: bool,

        /// Do not prompt for report cleanup; exit non-zero on failure or skip
        #[arg(long)]
        batch: bool,

        /// Keep reports even when every case passes
        #[arg(long)]
        keep_reports: bool,

        /// Skip cases sharing a choice with an already-failed case.
        /// Best effort: concurrent cases may still run.
        #[arg(long)]
        prune_failed_choices: bool,

        /// Remove output files of successful cases as soon as they finish
        #[arg(long)]
        auto_remove_success: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::List { project, json } => cmd_list(&project, json).await,
        Commands::Check { project } => cmd_check(&project),
        Commands::Test {
            project,
            parallel,
            only_lint,
            no_apply,
            batch,
            keep_reports,
            prune_failed_choices,
            auto_remove_success,
        } => {
            let options = RunOptions {
                concurrency: parallel,
                mode: mode_from_flags(only_lint, no_apply),
                prune_failed_choices,
                auto_remove_success,
            };
            cmd_test(&project, options, batch, keep_reports).await
        }
    }
}

fn mode_from_flags(only_lint: bool, no_apply: bool) -> ValidateMode {
    if only_lint {
        ValidateMode::LintOnly
    } else if no_apply {
        ValidateMode::NoApply
    } else {
        ValidateMode::Full
    }
}

fn load_resolved(path: &Path) -> anyhow::Result<Arc<ResolvedProject>> {
    tracing::debug!(path = %path.display(), "Loading project");
    let project = Project::from_path(path)?;
    Ok(Arc::new(ResolvedProject::resolve(project)?))
}

async fn cmd_list(path: &Path, json: bool) -> anyhow::Result<()> {
    let resolved = load_resolved(path)?;
    let cases = casegrid_engine::generate_all(resolved.clone()).await;

    for case in &cases {
        if json {
            println!("{}", serde_json::to_string(case)?);
        } else {
            println!("{}", case);
        }
    }
    if cases.is_empty() {
        eprintln!("Project generates no cases; every combination is excluded by a rule");
    }

    resolved.remove_workspace()?;
    Ok(())
}

fn cmd_check(path: &Path) -> anyhow::Result<()> {
    let project = Project::from_path(path)?;
    let diagnostics = casegrid_project::validate(&project);

    if diagnostics.is_empty() {
        println!("Project is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
        };
        println!("[{}] {}: {}", severity, diag.rule, diag.message);
        if let Some(fix) = &diag.fix {
            println!("        fix: {}", fix);
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_test(
    path: &Path,
    options: RunOptions,
    batch: bool,
    keep_reports: bool,
) -> anyhow::Result<()> {
    let resolved = load_resolved(path)?;
    println!("Reports will be kept at {}", resolved.root().display());

    let events = EventEmitter::default();
    let progress = tokio::spawn(progress_loop(events.subscribe()));

    let cases = casegrid_engine::generate(resolved.clone());
    let validator = Arc::new(HelmValidator::new(resolved.clone()));
    let summary = casegrid_engine::run(cases, validator, options, events).await?;
    progress.await?;

    if summary.total() == 0 {
        println!("Project generates no cases; every combination is excluded by a rule");
    }

    render_summary(&resolved, &summary);

    if summary.all_passed() {
        println!("All cases passed!");
        if keep_reports {
            println!(
                "Reports are kept at {} , user is responsible for deleting this directory",
                resolved.root().display()
            );
        } else {
            resolved.remove_workspace()?;
        }
        return Ok(());
    }

    if batch {
        println!(
            "Reports are kept at {} , user is responsible for deleting this directory",
            resolved.root().display()
        );
        anyhow::bail!("Some cases failed or were skipped!");
    }

    if keep_reports {
        println!(
            "Reports are kept at {} , user is responsible for deleting this directory",
            resolved.root().display()
        );
        return Ok(());
    }

    println!(
        "Reports are at {}, press enter when ready to remove them \
         (use --keep-reports to keep them, --batch to skip this prompt)",
        resolved.root().display()
    );
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    resolved.remove_workspace()?;
    Ok(())
}

/// Print a progress line for every tenth finished case. Ends when the run
/// drops its emitter.
async fn progress_loop(mut rx: tokio::sync::broadcast::Receiver<RunEvent>) {
    loop {
        match rx.recv().await {
            Ok(RunEvent::CaseFinished { finished, .. }) => {
                if finished % 10 == 0 {
                    println!("{} cases completed", finished);
                }
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn render_summary(resolved: &ResolvedProject, summary: &RunSummary) {
    println!(
        "{} passed, {} failed, {} skipped",
        summary.passed,
        summary.failed.len(),
        summary.skipped.len()
    );
    if summary.all_passed() {
        return;
    }

    if !summary.failed_choices.is_empty() {
        println!("The following choice mappings had failed cases:");
        for (variable, choices) in &summary.failed_choices {
            println!("{}:", variable);
            for choice in choices {
                println!("- {}", choice);
            }
        }
    }
    if !summary.failed.is_empty() {
        println!("The following cases failed:");
        for case in &summary.failed {
            println!("{}", resolved.case_dir(case).display());
        }
    }
    if !summary.skipped.is_empty() {
        println!("The following cases were skipped:");
        for case in &summary.skipped {
            println!("{}", resolved.case_dir(case).display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flag_mapping() {
        assert_eq!(mode_from_flags(true, false), ValidateMode::LintOnly);
        assert_eq!(mode_from_flags(false, true), ValidateMode::NoApply);
        assert_eq!(mode_from_flags(false, false), ValidateMode::Full);
    }

    #[test]
    fn cli_rejects_conflicting_depth_flags() {
        use clap::Parser;
        let result = Cli::try_parse_from([
            "casegrid",
            "test",
            "project.yaml",
            "--only-lint",
            "--no-apply",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_test_flags() {
        use clap::Parser;
        let cli = Cli::try_parse_from([
            "casegrid",
            "test",
            "project.yaml",
            "--parallel",
            "0",
            "--batch",
            "--prune-failed-choices",
        ])
        .unwrap();
        match cli.command {
            Commands::Test {
                parallel,
                batch,
                prune_failed_choices,
                only_lint,
                ..
            } => {
                assert_eq!(parallel, 0);
                assert!(batch);
                assert!(prune_failed_choices);
                assert!(!only_lint);
            }
            _ => panic!("expected test subcommand"),
        }
    }
}
