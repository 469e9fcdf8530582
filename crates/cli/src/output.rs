//! Terminal rendering of controller results.

use cake_core::state::{StartOutcome, StopOutcome};
use cake_protocol::{InstanceSnapshot, ServiceState, StatusReport};
use chrono::{DateTime, Utc};
use colored::{Color, Colorize};

fn state_color(state: ServiceState) -> Color {
    match state {
        ServiceState::Running => Color::Green,
        ServiceState::Starting | ServiceState::Stopping => Color::Yellow,
        ServiceState::Stopped => Color::Blue,
        ServiceState::NotRunning | ServiceState::Unknown => Color::BrightBlack,
    }
}

fn state_label(state: ServiceState) -> &'static str {
    match state {
        ServiceState::Unknown => "unknown",
        ServiceState::NotRunning => "not running",
        ServiceState::Starting => "starting",
        ServiceState::Running => "running",
        ServiceState::Stopping => "stopping",
        ServiceState::Stopped => "stopped",
    }
}

fn timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn print_start(label: &str, outcome: &StartOutcome) {
    match outcome {
        StartOutcome::Started { id, pid } => {
            println!("{} {label} ({id}, pid {pid})", "started".green().bold())
        }
        StartOutcome::AlreadyRunning { id, pid } => {
            println!("{label} already running ({id}, pid {pid})")
        }
        StartOutcome::NoEntryPoint => {
            println!("{label}: {}", "no entry point, nothing to start".dimmed())
        }
    }
}

/// Returns whether the stop fully succeeded.
pub fn print_stop(label: &str, outcome: &StopOutcome) -> bool {
    match outcome {
        StopOutcome::Stopped { id, already_gone } => {
            print!("{} {label} ({id})", "stopped".blue().bold());
            if !already_gone.is_empty() {
                print!(" {}", format!("already exited: {already_gone:?}").dimmed());
            }
            println!();
            true
        }
        StopOutcome::TimedOut { id, still_running } => {
            eprintln!(
                "{} {label} ({id}) still running: {still_running:?}",
                "timeout".red().bold()
            );
            false
        }
        StopOutcome::ExitCommand {
            status,
            still_running,
        } => {
            let ok = *status == 0 && still_running.is_empty();
            if ok {
                println!("{} {label} (exit command)", "stopped".blue().bold());
            } else if *status != 0 {
                eprintln!("{} {label}: exit command returned {status}", "failed".red().bold());
            } else {
                eprintln!(
                    "{} {label}: exit command ran but processes remain: {still_running:?}",
                    "timeout".red().bold()
                );
            }
            ok
        }
        StopOutcome::NotRunning => {
            println!("{label} {}", "not running".dimmed());
            true
        }
    }
}

pub fn print_status_table(reports: &[StatusReport]) {
    let tag_width = reports
        .iter()
        .filter_map(|r| r.tag.as_deref())
        .map(str::len)
        .max()
        .unwrap_or(0)
        .max(3);

    println!(
        "{}",
        format!(
            "{:<tag_width$}  {:<8}  {:<11}  {:>7}  {:<19}  {:<5}  {}",
            "TAG", "INSTANCE", "STATE", "PID", "STARTED", "EXIT", "UP TO DATE"
        )
        .bold()
    );
    for report in reports {
        let up_to_date = match report.up_to_date {
            Some(true) => "yes".green(),
            Some(false) => "no, restart to apply".yellow(),
            None => "-".normal(),
        };
        println!(
            "{:<tag_width$}  {:<8}  {}  {:>7}  {:<19}  {:<5}  {}",
            report.tag.as_deref().unwrap_or("-"),
            or_dash(report.instance.as_ref()),
            format!("{:<11}", state_label(report.state)).color(state_color(report.state)),
            or_dash(report.pid),
            timestamp(report.started),
            or_dash(report.exit),
            up_to_date,
        );
    }
}

pub fn print_instance_table(rows: &[(InstanceSnapshot, ServiceState)]) {
    println!(
        "{}",
        format!(
            "{:<8}  {:<12}  {:<11}  {:>7}  {:<19}  {:<19}  {}",
            "INSTANCE", "TAG", "STATE", "PID", "STARTED", "STOPPED", "ENTRY"
        )
        .bold()
    );
    for (snapshot, state) in rows {
        let meta = snapshot.meta.as_ref();
        println!(
            "{:<8}  {:<12}  {}  {:>7}  {:<19}  {:<19}  {}",
            snapshot.id,
            meta.and_then(|m| m.tag.as_deref()).unwrap_or("-"),
            format!("{:<11}", state_label(*state)).color(state_color(*state)),
            or_dash(snapshot.pid),
            timestamp(meta.map(|m| m.started)),
            timestamp(snapshot.stopped),
            meta.map(|m| m.entry.as_str()).unwrap_or("-"),
        );
    }
}
