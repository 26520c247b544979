//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Wrenflow - SQL orchestration with dependency-aware scheduling and
/// change-driven partial reparse
#[derive(Parser, Debug)]
#[command(name = "wren")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress per-resource output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Named target to use (e.g. dev, prod)
    #[arg(short, long, global = true)]
    pub target: Option<String>,

    /// Disable the reparse cache and parse every file fresh
    #[arg(long, global = true)]
    pub no_partial_parse: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Output formats for command results
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Machine-readable JSON
    Json,
}

/// Selection arguments shared by executing commands
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Resources to include (name, +name, name+, tag:..., path:...)
    #[arg(short, long, num_args = 1..)]
    pub select: Vec<String>,

    /// Resources to exclude
    #[arg(short = 'x', long, num_args = 1..)]
    pub exclude: Vec<String>,
}

/// Execution arguments shared by run/test/seed/snapshot/build
#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Worker pool size (default: wrenflow.yml threads, else CPU count)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Stop dispatching new resources after the first error or failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Override/add vars as JSON (e.g. '{"start_date": "2024-01-01"}')
    #[arg(long)]
    pub vars: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse the project and report reparse statistics
    Parse(ParseArgs),

    /// Compile selected resources to SQL without executing
    Compile(CompileArgs),

    /// Execute models against the warehouse
    Run(ExecArgs),

    /// Run schema and singular tests
    Test(ExecArgs),

    /// Load seed CSVs into the warehouse
    Seed(ExecArgs),

    /// Execute snapshots
    Snapshot(ExecArgs),

    /// Run seeds, models, snapshots, and tests together in graph order
    Build(ExecArgs),

    /// List selected resources
    Ls(LsArgs),

    /// Remove the target directory
    Clean(CleanArgs),
}

/// Arguments for the parse command
#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Override/add vars as JSON
    #[arg(long)]
    pub vars: Option<String>,
}

/// Arguments for the compile command
#[derive(Args, Debug)]
pub struct CompileArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Override/add vars as JSON
    #[arg(long)]
    pub vars: Option<String>,
}

/// Arguments for the ls command
#[derive(Args, Debug)]
pub struct LsArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
}

/// Arguments for the clean command
#[derive(Args, Debug)]
pub struct CleanArgs {}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
