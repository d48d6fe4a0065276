//! `autogoals` CLI.
//!
//! Schedules the goals of `goals.yaml` in dependency order and drives the
//! configured agent through planning, execution, and verification.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};

use autogoals::error::{
    ConfigurationError, DependencyError, ExternalToolError, StateCorruptionError,
};
use autogoals::exit_codes;
use autogoals::io::backend::{DockerBackend, backend_from_config};
use autogoals::io::control::{clear_pause, request_pause};
use autogoals::io::init::{AutogoalsPaths, InitOptions, init_project};
use autogoals::io::worker::AgentWorker;
use autogoals::logging;
use autogoals::looping::{LoopStop, run_loop};
use autogoals::manage::{Override, override_goal};
use autogoals::recover::{RecoverMode, recover_state};
use autogoals::scheduler::StepOutcome;
use autogoals::status::{build_status, render_status};
use autogoals::validate::{Project, load_project};
use autogoals::watch::{WatchOptions, watch_status};

#[derive(Parser)]
#[command(
    name = "autogoals",
    version,
    about = "Dependency-aware goal scheduler for coding agents"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Project directory containing `goals.yaml` and `.autogoals/`.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,
    /// Goal file path (defaults to `<project>/goals.yaml`).
    #[arg(long, global = true)]
    goals: Option<PathBuf>,
    /// Log progress at info level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.autogoals/` scaffolding and a sample `goals.yaml` if missing.
    Init {
        /// Overwrite an existing `.autogoals/config.toml`.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the goal file, dependency graph, and config; print the order.
    Validate,
    /// Run goals until all complete, none is eligible, or a pause is requested.
    Start,
    /// Show per-goal status and completion percentage.
    Status,
    /// Ask a running loop to stop after its current phase.
    Pause,
    /// Clear the pause flag and run the loop.
    Resume,
    /// Mark a goal completed without running it.
    Skip { goal_id: String },
    /// Put a goal back to pending and clear its retries and errors.
    Reset { goal_id: String },
    /// Repair a corrupt execution state.
    Recover {
        /// Restore the previous state from the backup file.
        #[arg(long, conflicts_with = "reinitialize", required_unless_present = "reinitialize")]
        from_backup: bool,
        /// Discard all progress and start over.
        #[arg(long)]
        reinitialize: bool,
    },
    /// Re-render status whenever the execution state changes.
    Watch {
        /// Poll interval in milliseconds.
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Manage the per-workspace docker container.
    Container {
        #[command(subcommand)]
        action: ContainerAction,
    },
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq, Debug)]
enum ContainerAction {
    /// Show whether the container exists and is running.
    Status,
    /// Stop the container, keeping it for reuse.
    Stop,
    /// Remove the container.
    Remove,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.global.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            if let Some(hint) = hint_for(&err) {
                eprintln!("hint: {hint}");
            }
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let mut paths = AutogoalsPaths::new(&cli.global.project);
    if let Some(goals) = cli.global.goals {
        paths = paths.with_goals_path(goals);
    }

    match cli.command {
        Command::Init { force } => cmd_init(&paths, force),
        Command::Validate => cmd_validate(&paths),
        Command::Start => cmd_start(&paths),
        Command::Status => {
            let project = load_project(&paths)?;
            print!("{}", render_status(&build_status(&project)?));
            Ok(exit_codes::OK)
        }
        Command::Pause => {
            if request_pause(&paths)? {
                println!("pause requested; the loop stops after the current phase");
            } else {
                println!("already paused");
            }
            Ok(exit_codes::OK)
        }
        Command::Resume => {
            clear_pause(&paths)?;
            cmd_start(&paths)
        }
        Command::Skip { goal_id } => cmd_override(&paths, &goal_id, Override::Skip),
        Command::Reset { goal_id } => cmd_override(&paths, &goal_id, Override::Reset),
        Command::Recover {
            from_backup,
            reinitialize,
        } => cmd_recover(&paths, from_backup, reinitialize),
        Command::Watch { interval_ms } => {
            let project = load_project(&paths)?;
            let options = WatchOptions {
                poll_interval: std::time::Duration::from_millis(interval_ms.max(50)),
                max_renders: None,
            };
            watch_status(&project, &options, |view| {
                println!("{view}");
            })?;
            Ok(exit_codes::OK)
        }
        Command::Container { action } => cmd_container(&paths, action),
    }
}

fn cmd_init(paths: &AutogoalsPaths, force: bool) -> Result<i32> {
    let outcome = init_project(paths, &InitOptions { force })?;
    println!("initialized {}", outcome.paths.dir.display());
    if outcome.wrote_goals {
        println!("wrote sample {}", outcome.paths.goals_path.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_validate(paths: &AutogoalsPaths) -> Result<i32> {
    let project = load_project(paths)?;
    println!(
        "{} is valid: {} goals",
        paths.goals_path.display(),
        project.order.len()
    );
    for (index, id) in project.order.iter().enumerate() {
        println!("{:>3}. {id}", index + 1);
    }
    Ok(exit_codes::OK)
}

fn cmd_start(paths: &AutogoalsPaths) -> Result<i32> {
    let project = load_project(paths)?;
    let worker = AgentWorker::new(backend_from_config(&project.config), &project.config);
    let outcome = run_loop(&project, &worker, print_step)?;
    for id in &outcome.recovered {
        println!("{id}: interrupted run detected; execution scheduled again");
    }

    match outcome.stop {
        LoopStop::Complete => {
            println!(
                "all {} goals completed ({} steps this run)",
                project.goals().len(),
                outcome.steps_executed
            );
            Ok(exit_codes::OK)
        }
        LoopStop::Paused => {
            println!(
                "paused after {} steps; run `autogoals resume` to continue",
                outcome.steps_executed
            );
            Ok(exit_codes::OK)
        }
        LoopStop::Blocked(report) => {
            for id in &report.failed {
                println!("failed: {id}");
            }
            for goal in &report.blocked {
                println!(
                    "blocked: {} (waiting on {})",
                    goal.id,
                    goal.waiting_on.join(", ")
                );
            }
            println!("run `autogoals status` for details, `autogoals reset <id>` to retry");
            Ok(exit_codes::FAILED)
        }
    }
}

fn print_step(step: &StepOutcome) {
    println!(
        "[{}] {}: {} -> {} ({})",
        step.goal_id, step.phase, step.transition.from, step.transition.to, step.transition.message
    );
}

fn cmd_override(paths: &AutogoalsPaths, goal_id: &str, action: Override) -> Result<i32> {
    let project = load_project(paths)?;
    let transition = override_goal(&project, goal_id, action)?;
    println!(
        "{goal_id}: {} -> {} ({})",
        transition.from, transition.to, transition.message
    );
    Ok(exit_codes::OK)
}

fn cmd_recover(paths: &AutogoalsPaths, from_backup: bool, reinitialize: bool) -> Result<i32> {
    let mode = match (from_backup, reinitialize) {
        (true, false) => RecoverMode::FromBackup,
        (false, true) => RecoverMode::Reinitialize,
        _ => bail!("pass exactly one of --from-backup or --reinitialize"),
    };
    let project = load_project(paths)?;
    recover_state(&project, mode)?;
    match mode {
        RecoverMode::FromBackup => println!("restored execution state from backup"),
        RecoverMode::Reinitialize => println!("execution state reinitialized; all goals pending"),
    }
    Ok(exit_codes::OK)
}

fn cmd_container(paths: &AutogoalsPaths, action: ContainerAction) -> Result<i32> {
    let project: Project = load_project(paths)?;
    let docker = DockerBackend::new(&project.config.backend, project.config.output_limit_bytes);
    let root = &project.paths.root;
    let state = match action {
        ContainerAction::Status => docker.state(root)?,
        ContainerAction::Stop => docker.stop(root)?,
        ContainerAction::Remove => docker.remove(root)?,
    };
    let name = autogoals::io::backend::container_name(root)?;
    match action {
        ContainerAction::Status => println!("{name}: {}", state.as_str()),
        ContainerAction::Stop => println!("{name}: stopped (was {})", state.as_str()),
        ContainerAction::Remove => println!("{name}: removed (was {})", state.as_str()),
    }
    Ok(exit_codes::OK)
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<StateCorruptionError>().is_some() {
        exit_codes::CORRUPT_STATE
    } else if err.downcast_ref::<ExternalToolError>().is_some() {
        exit_codes::EXTERNAL_TOOL
    } else {
        exit_codes::INVALID
    }
}

fn hint_for(err: &anyhow::Error) -> Option<String> {
    if let Some(corrupt) = err.downcast_ref::<StateCorruptionError>() {
        return Some(corrupt.hint().to_string());
    }
    if let Some(tool) = err.downcast_ref::<ExternalToolError>() {
        return Some(tool.guidance.clone());
    }
    if let Some(DependencyError::CircularDependency { .. }) = err.downcast_ref::<DependencyError>()
    {
        return Some("remove one dependency edge from the cycle in the goal file".to_string());
    }
    if err.downcast_ref::<ConfigurationError>().is_some() {
        return Some("run `autogoals validate` after fixing the file".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["autogoals", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["autogoals", "status", "--project", "/w", "-v"]);
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.global.project, PathBuf::from("/w"));
        assert!(cli.global.verbose);
        assert!(cli.global.goals.is_none());
    }

    #[test]
    fn parse_skip_and_reset_ids() {
        let cli = Cli::parse_from(["autogoals", "skip", "api"]);
        assert!(matches!(cli.command, Command::Skip { goal_id } if goal_id == "api"));
        let cli = Cli::parse_from(["autogoals", "reset", "api"]);
        assert!(matches!(cli.command, Command::Reset { goal_id } if goal_id == "api"));
    }

    #[test]
    fn recover_requires_exactly_one_mode() {
        assert!(Cli::try_parse_from(["autogoals", "recover"]).is_err());
        assert!(
            Cli::try_parse_from(["autogoals", "recover", "--from-backup", "--reinitialize"])
                .is_err()
        );
        let cli = Cli::parse_from(["autogoals", "recover", "--reinitialize"]);
        assert!(matches!(
            cli.command,
            Command::Recover {
                from_backup: false,
                reinitialize: true
            }
        ));
    }

    #[test]
    fn parse_container_action() {
        let cli = Cli::parse_from(["autogoals", "container", "remove"]);
        assert!(matches!(
            cli.command,
            Command::Container {
                action: ContainerAction::Remove
            }
        ));
    }

    #[test]
    fn typed_errors_map_to_exit_codes() {
        let corrupt: anyhow::Error = StateCorruptionError {
            path: PathBuf::from("s.json"),
            reason: "invalid JSON".to_string(),
            backup_available: true,
        }
        .into();
        assert_eq!(exit_code_for(&corrupt), exit_codes::CORRUPT_STATE);
        assert!(hint_for(&corrupt).expect("hint").contains("--from-backup"));

        let tool: anyhow::Error = ExternalToolError::new("docker", "not found", "install docker").into();
        assert_eq!(exit_code_for(&tool.context("run step")), exit_codes::EXTERNAL_TOOL);

        let cycle: anyhow::Error = DependencyError::CircularDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        }
        .into();
        assert_eq!(exit_code_for(&cycle), exit_codes::INVALID);
    }
}
