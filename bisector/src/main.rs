//! Command-line driver for cross-invocation bisection.
//!
//! Each `good`/`bad` invocation consumes exactly one probe verdict and
//! advances the persisted search by one transition, so the operator can
//! alternate freely between running the workload and reporting what it did,
//! even when the workload kills its process.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use bisector::core::types::{RunState, Verdict};
use bisector::exit_codes;
use bisector::io::config::load_config;
use bisector::io::store::StateStore;
use bisector::logging;
use bisector::search::{SearchOutcome, start_search};
use bisector::session::BisectSession;
use bisector::step::{NextProbe, StepOutcome, advance_search};

#[derive(Parser)]
#[command(
    name = "bisector",
    version,
    about = "Crash-resilient divergence bisection for multi-stage pipelines"
)]
struct Cli {
    /// Directory holding persisted search state.
    #[arg(long, default_value = ".bisector", value_name = "DIR")]
    state_dir: PathBuf,

    /// Backend enumeration file (TOML).
    #[arg(long, default_value = "bisector.toml", value_name = "FILE")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reset any previous search and select the first configured backend.
    Start,
    /// Report that the last probe behaved correctly, and advance the search.
    Good,
    /// Report that the last probe reproduced the issue, and advance the search.
    Bad,
    /// Delete all persisted search state.
    End,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Start => cmd_start(&cli.state_dir, &cli.config),
        Command::Good => cmd_verdict(&cli.state_dir, &cli.config, Verdict::Good),
        Command::Bad => cmd_verdict(&cli.state_dir, &cli.config, Verdict::Bad),
        Command::End => cmd_end(&cli.state_dir),
    }
}

fn cmd_start(state_dir: &Path, config_path: &Path) -> Result<()> {
    let session = open_session(state_dir, config_path)?;
    let backend = start_search(&session)?;
    println!("Started bisection with backend: {backend}");
    println!("Run the workload, then report `bisector good` or `bisector bad`.");
    Ok(())
}

fn cmd_verdict(state_dir: &Path, config_path: &Path, verdict: Verdict) -> Result<()> {
    let session = open_session(state_dir, config_path)?;
    match advance_search(&session, verdict)? {
        StepOutcome::Continue(next) => print_next_probe(&next),
        StepOutcome::Concluded(outcome) => print_outcome(&outcome),
    }
    Ok(())
}

fn cmd_end(state_dir: &Path) -> Result<()> {
    let store = StateStore::new(state_dir);
    if store.root().exists() {
        store.clear()?;
        println!("Bisection state deleted.");
    } else {
        println!("No bisection state found.");
    }
    Ok(())
}

fn open_session(state_dir: &Path, config_path: &Path) -> Result<BisectSession> {
    let config = load_config(config_path)?;
    BisectSession::new(StateStore::new(state_dir), config)
}

fn print_next_probe(next: &NextProbe) {
    let Some(subsystem) = &next.subsystem else {
        println!("Next: run the workload with backend {} and report good/bad.", next.backend);
        return;
    };
    match (next.run_state, next.range) {
        (Some(RunState::TestDisable), _) => {
            println!(
                "Next: {}/{subsystem} fully suppressed; run the workload and report good/bad.",
                next.backend
            );
        }
        (Some(RunState::FindMaxBounds), _) => {
            println!(
                "Next: measuring the call range of {}/{subsystem}; run the workload and report good/bad.",
                next.backend
            );
        }
        (Some(RunState::Bisect), Some(range)) => {
            println!(
                "Bisecting {}/{subsystem} (range [{}, {}], midpoint {}); run the workload and report good/bad.",
                next.backend,
                range.low,
                range.high,
                range.midpoint()
            );
        }
        _ => {
            println!(
                "Next: probe {}/{subsystem} and report good/bad.",
                next.backend
            );
        }
    }
}

fn print_outcome(outcome: &SearchOutcome) {
    match outcome {
        SearchOutcome::NotFound => {
            println!("All backends checked. The issue did not reproduce.");
        }
        SearchOutcome::Backend { backend } => {
            println!("The issue is in the {backend} backend, but no subsystem accounts for it.");
        }
        SearchOutcome::Call {
            backend,
            subsystem,
            culprit,
            diagnostic,
        } => {
            println!("Bisection complete: {backend}/{subsystem} call {culprit} is responsible.");
            if let Some(diagnostic) = diagnostic {
                println!("Debug info: {diagnostic}");
            }
            println!("Run `bisector end` to clean up.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_start() {
        let cli = Cli::parse_from(["bisector", "start"]);
        assert!(matches!(cli.command, Command::Start));
        assert_eq!(cli.state_dir, PathBuf::from(".bisector"));
        assert_eq!(cli.config, PathBuf::from("bisector.toml"));
    }

    #[test]
    fn parse_good_and_bad() {
        let cli = Cli::parse_from(["bisector", "good"]);
        assert!(matches!(cli.command, Command::Good));
        let cli = Cli::parse_from(["bisector", "bad"]);
        assert!(matches!(cli.command, Command::Bad));
    }

    #[test]
    fn parse_overridden_paths() {
        let cli = Cli::parse_from([
            "bisector",
            "--state-dir",
            "/tmp/search",
            "--config",
            "pipeline.toml",
            "end",
        ]);
        assert!(matches!(cli.command, Command::End));
        assert_eq!(cli.state_dir, PathBuf::from("/tmp/search"));
        assert_eq!(cli.config, PathBuf::from("pipeline.toml"));
    }
}
