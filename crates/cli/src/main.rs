mod commands;
mod output;

use crate::commands::Commands;
use cake_core::config::loader::{default_base_dir, expand_vars};
use cake_core::context::Context;
use cake_core::init::{generate_base_structure, InitOptions};
use cake_core::process::ProcessHandle;
use cake_core::state::{shell_quote, ServiceController, StateResult};
use cake_protocol::{Definition, InstanceSnapshot, ServiceState};
use clap::Parser;
use color_eyre::eyre::{bail, Result};
use colored::Colorize;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "CAKE_LOG";

/// cake - start, stop and inspect long-running services
#[derive(Parser, Debug)]
#[command(name = "cake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base directory (defaults to $CAKESTACK_DIR, then ~/.cakestack)
    #[arg(long, global = true, value_name = "DIR")]
    pub base: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let base = cli.base.clone().unwrap_or_else(default_base_dir);

    // Init needs no existing configuration.
    if let Commands::Init { force } = cli.command {
        let paths = generate_base_structure(InitOptions { base, force }).await?;
        println!(
            "{} {}",
            "initialized".green().bold(),
            paths.base.display()
        );
        println!("edit {} to define services", paths.definitions_file.display());
        return Ok(());
    }

    let ctx = Context::load(&base)?;

    let failures = match cli.command {
        Commands::Init { .. } => unreachable!("init is handled above"),
        Commands::Start { tags } => start(&ctx, &tags).await,
        Commands::Stop { tags } => stop(&ctx, &tags).await,
        Commands::Restart { tags } => restart(&ctx, &tags).await,
        Commands::Update { tags } => update(&ctx, &tags).await,
        Commands::Status { tags, json } => status(&ctx, &tags, json)?,
        Commands::List { json } => list(&ctx, json)?,
        Commands::Run { dir, command } => {
            let mut controller = ServiceController::adhoc(&ctx, adhoc_definition(&command, dir)?);
            let outcome = controller.start().await?;
            output::print_start("ad-hoc service", &outcome);
            0
        }
        Commands::StopInstance { id } => {
            let mut controller = ServiceController::for_instance(&ctx, &id)?;
            let outcome = controller.stop().await?;
            usize::from(!output::print_stop(&format!("instance {id}"), &outcome))
        }
    };

    if failures > 0 {
        bail!("{failures} service(s) failed");
    }
    Ok(())
}

/// Definition of an ad-hoc instance from `run` arguments.
///
/// A single argument is a shell command line; several are quoted word by
/// word. A relative `dir` is taken from the caller's current directory.
fn adhoc_definition(command: &[String], dir: Option<String>) -> Result<Definition> {
    let entry = match command {
        [line] => line.clone(),
        words => words
            .iter()
            .map(|word| shell_quote(word))
            .collect::<Vec<_>>()
            .join(" "),
    };
    let dir = dir
        .map(|dir| std::path::absolute(expand_vars(&dir)))
        .transpose()?
        .map(|dir| dir.display().to_string());
    Ok(Definition::adhoc(entry, dir))
}

/// Tags given on the command line, or every defined tag.
fn selected(ctx: &Context, tags: &[String]) -> Vec<String> {
    if tags.is_empty() {
        ctx.config.definitions().keys().cloned().collect()
    } else {
        tags.to_vec()
    }
}

fn report_error(tag: &str, err: &dyn std::fmt::Display) {
    eprintln!("{} {tag}: {err}", "error".red().bold());
}

async fn start(ctx: &Context, tags: &[String]) -> usize {
    let mut failures = 0;
    for tag in tags {
        let result: StateResult<_> = async {
            let mut controller = ServiceController::for_tag(ctx, tag)?;
            controller.start().await
        }
        .await;
        match result {
            Ok(outcome) => output::print_start(tag, &outcome),
            Err(e) => {
                report_error(tag, &e);
                failures += 1;
            }
        }
    }
    failures
}

async fn stop(ctx: &Context, tags: &[String]) -> usize {
    let mut failures = 0;
    for tag in tags {
        let result: StateResult<_> = async {
            let mut controller = ServiceController::for_tag(ctx, tag)?;
            controller.stop().await
        }
        .await;
        match result {
            Ok(outcome) => {
                if !output::print_stop(tag, &outcome) {
                    failures += 1;
                }
            }
            Err(e) => {
                report_error(tag, &e);
                failures += 1;
            }
        }
    }
    failures
}

async fn restart(ctx: &Context, tags: &[String]) -> usize {
    let mut failures = 0;
    for tag in tags {
        let result: StateResult<_> = async {
            let mut controller = ServiceController::for_tag(ctx, tag)?;
            controller.restart().await
        }
        .await;
        match result {
            Ok((stopped, started)) => {
                output::print_stop(tag, &stopped);
                output::print_start(tag, &started);
            }
            Err(e) => {
                report_error(tag, &e);
                failures += 1;
            }
        }
    }
    failures
}

async fn update(ctx: &Context, tags: &[String]) -> usize {
    let mut stale = Vec::new();
    for tag in selected(ctx, tags) {
        let controller = match ServiceController::for_tag(ctx, &tag) {
            Ok(controller) => controller,
            Err(e) => {
                report_error(&tag, &e);
                continue;
            }
        };
        if !controller.is_running() {
            continue;
        }
        match controller.is_up_to_date() {
            Ok(true) => {}
            Ok(false) => stale.push(tag),
            Err(e) => warn!("cannot check {tag}: {e}"),
        }
    }

    if stale.is_empty() {
        println!("all running services are up to date");
        return 0;
    }
    restart(ctx, &stale).await
}

fn status(ctx: &Context, tags: &[String], json: bool) -> Result<usize> {
    let mut reports = Vec::new();
    let mut failures = 0;
    for tag in selected(ctx, tags) {
        match ServiceController::for_tag(ctx, &tag) {
            Ok(mut controller) => reports.push(controller.status()),
            Err(e) => {
                report_error(&tag, &e);
                failures += 1;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else if reports.is_empty() {
        println!("no services defined in {}", ctx.config.paths().definitions_file.display());
    } else {
        output::print_status_table(&reports);
    }
    Ok(failures)
}

fn instance_state(ctx: &Context, snapshot: &InstanceSnapshot) -> ServiceState {
    let alive = snapshot
        .pid
        .is_some_and(|pid| ProcessHandle::new(pid, ctx.processes.clone()).is_alive());
    if alive {
        ServiceState::Running
    } else if snapshot.stopped.is_some() {
        ServiceState::Stopped
    } else {
        ServiceState::NotRunning
    }
}

fn list(ctx: &Context, json: bool) -> Result<usize> {
    let rows: Vec<(InstanceSnapshot, ServiceState)> = ctx
        .config
        .instances()?
        .into_values()
        .map(|snapshot| {
            let state = instance_state(ctx, &snapshot);
            (snapshot, state)
        })
        .collect();

    if json {
        let snapshots: Vec<&InstanceSnapshot> = rows.iter().map(|(s, _)| s).collect();
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    } else if rows.is_empty() {
        println!("no instances recorded");
    } else {
        output::print_instance_table(&rows);
    }
    Ok(0)
}
