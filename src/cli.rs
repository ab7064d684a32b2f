//! The `bmgfx` command-line driver (component H). Gated behind the `cli`
//! feature so library consumers never pull in `clap`.
//!
//! Grounded on `commands::Cli`/`Commands`, the derive-based
//! clap surface referenced from `graph/model.rs` as
//! `commands::{Cli, Commands, RunArgs}`: a top-level `Cli` struct with a
//! `Commands` subcommand enum, one variant per pipeline stage.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tabled::Table;

use crate::errors::ErrorReport;
use crate::fixer::fix_problems;
use crate::fixture::{self, Fixture};
use crate::graph::{Graph, NodeRow};

#[derive(Parser, Debug)]
#[command(name = "bmgfx", author, version, about = "BMG graph requirements fixer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the requirements-fixing pass over a fixture and print the
    /// resulting graph as a table.
    Fix {
        /// Path to a JSON fixture (see `fixture::Fixture`).
        fixture: PathBuf,
    },
    /// Run the requirements-fixing pass and exit non-zero if any
    /// requirement could not be met, printing the violation report.
    Check {
        fixture: PathBuf,
    },
    /// Print a fixture's graph as a table without running the fixer.
    Show {
        fixture: PathBuf,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("reading {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("parsing {0}: {1}")]
    Json(PathBuf, serde_json::Error),
    #[error("building graph from {0}: {1}")]
    Fixture(PathBuf, fixture::FixtureError),
    #[error("graph has unresolved requirements")]
    Violations(ErrorReport),
}

fn load(path: &PathBuf) -> Result<(Graph, Vec<crate::node::Handle>), CliError> {
    let text = fs::read_to_string(path).map_err(|e| CliError::Io(path.clone(), e))?;
    let fixture: Fixture = serde_json::from_str(&text).map_err(|e| CliError::Json(path.clone(), e))?;
    fixture::build(&fixture).map_err(|e| CliError::Fixture(path.clone(), e))
}

fn render(graph: &Graph) -> String {
    let rows: Vec<NodeRow> = graph.iter().map(|(h, node)| NodeRow::new(graph, h, node)).collect();
    Table::new(rows).to_string()
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Show { fixture } => {
            let (graph, _) = load(&fixture)?;
            println!("{}", render(&graph));
            Ok(())
        }
        Commands::Fix { fixture } => {
            let (mut graph, _) = load(&fixture)?;
            let report = fix_problems(&mut graph);
            println!("{}", render(&graph));
            if !report.is_ok() {
                log::warn!("{} node(s) still violate their requirements", report.violations.len());
                println!("{report}");
            }
            Ok(())
        }
        Commands::Check { fixture } => {
            let (mut graph, _) = load(&fixture)?;
            let report = fix_problems(&mut graph);
            if report.is_ok() {
                log::info!("graph is well-typed after fixing");
                Ok(())
            } else {
                Err(CliError::Violations(report))
            }
        }
    }
}
