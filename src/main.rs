use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use parallx::config::Config;
use parallx::orchestration::{
    Aggregator, CommandRunner, DryRunner, Scheduler, SchedulerEvent, TaskRunner,
};
use parallx::parser::PlanParser;
use parallx::{plog, Error, PlanTree, Result};

/// Parallx - phased parallel task-tree orchestrator
#[derive(Parser, Debug)]
#[command(name = "parallx")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    PARALLX_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.parallx/parallx.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate a plan document and report every file claim conflict
    Check {
        /// Path to the plan document (TOML)
        plan: PathBuf,
    },

    /// Print the structure of a plan document without running it
    Show {
        /// Path to the plan document (TOML)
        plan: PathBuf,

        /// Print the parsed tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute a plan document phase by phase
    Run {
        /// Path to the plan document (TOML)
        plan: PathBuf,

        /// Resolve every task as an instant success without spawning workers
        #[arg(long)]
        dry_run: bool,

        /// Skip the post-run verification command
        #[arg(long)]
        no_verify: bool,

        /// Print the final execution report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    parallx::log::init_with_debug(cli.debug);

    let exit_code = match dispatch(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    };
    std::process::exit(exit_code);
}

async fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Check { plan } => run_check(&plan),
        Command::Show { plan, json } => run_show(&plan, json),
        Command::Run {
            plan,
            dry_run,
            no_verify,
            json,
        } => run_plan(&plan, dry_run, no_verify, json).await,
    }
}

fn run_check(path: &PathBuf) -> Result<i32> {
    let config = Config::load()?;
    let parser = PlanParser::new(config.max_depth);
    let (tree, conflicts) = parser.check_file(path)?;

    println!(
        "plan '{}': {} phase(s), {} task(s), depth {}",
        tree.name,
        tree.phase_count(),
        tree.total_task_count(),
        tree.max_depth()
    );

    if conflicts.is_empty() {
        println!("ok: no file claim conflicts");
        return Ok(0);
    }

    for conflict in &conflicts {
        println!("conflict: {}", conflict);
    }
    println!("{} conflict(s) found", conflicts.len());
    Ok(1)
}

fn run_show(path: &PathBuf, json: bool) -> Result<i32> {
    let config = Config::load()?;
    let parser = PlanParser::new(config.max_depth);
    let (tree, _) = parser.check_file(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print_tree(&tree, 0);
    }
    Ok(0)
}

fn print_tree(tree: &PlanTree, indent: usize) {
    let pad = "  ".repeat(indent);
    println!("{}{}", pad, tree.name);
    for phase in &tree.phases {
        println!("{}  phase {}:", pad, phase.index);
        for task in &phase.tasks {
            let blocking = if task.blocking { "" } else { " [non-blocking]" };
            println!(
                "{}    {} ({}){} - {}",
                pad, task.id, task.worker, blocking, task.scope
            );
            if let Some(sub) = tree.subplan(&task.id) {
                print_tree(sub, indent + 3);
            }
        }
    }
}

async fn run_plan(path: &PathBuf, dry_run: bool, no_verify: bool, json: bool) -> Result<i32> {
    let config = Config::load()?;
    let parser = PlanParser::new(config.max_depth);
    let tree = parser.parse_file(path)?;

    let runner: Arc<dyn TaskRunner> = if dry_run {
        Arc::new(DryRunner)
    } else {
        let runner = CommandRunner::new(&config);
        let missing = runner.missing_binaries();
        if !missing.is_empty() {
            return Err(Error::WorkerNotAvailable(missing.join(", ")));
        }
        Arc::new(runner)
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    plog!("run: plan file {}", path.display());
    let scheduler = Scheduler::new(runner).with_events(tx);
    let outcome = scheduler.run(&tree).await?;

    // Sender dropped with the scheduler; the printer drains and stops.
    let _ = printer.await;

    let aggregator = if no_verify || dry_run {
        Aggregator::without_verification()
    } else {
        Aggregator::new(config.verify_command.clone())
    };
    let report = aggregator.aggregate(&tree, outcome).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "run {}: {} - {} succeeded, {} failed, {} skipped",
            report.run_id,
            report.state,
            report.succeeded_count(),
            report.failed_count(),
            report.skipped_count()
        );
        for conflict in &report.conflicts {
            println!("conflict (post-run): {}", conflict);
        }
        println!("verification: {}", report.verification);
    }

    Ok(if report.is_success() { 0 } else { 1 })
}

fn print_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::PhaseStarted {
            tree,
            phase,
            task_count,
        } => println!("[{}] phase {} ({} task(s))", tree, phase, task_count),
        SchedulerEvent::TaskStarted { tree, task } => {
            println!("[{}]   {} started", tree, task)
        }
        SchedulerEvent::TaskCompleted { tree, task } => {
            println!("[{}]   {} done", tree, task)
        }
        SchedulerEvent::TaskFailed { tree, task, error } => {
            println!("[{}]   {} FAILED: {}", tree, task, error)
        }
        SchedulerEvent::TaskSkipped { tree, task, reason } => {
            println!("[{}]   {} skipped: {}", tree, task, reason)
        }
        SchedulerEvent::TreeCompleted { tree } => println!("[{}] completed", tree),
        SchedulerEvent::TreeFailed { tree } => println!("[{}] failed", tree),
    }
}
