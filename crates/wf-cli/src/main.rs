//! Wrenflow CLI - a dbt-like tool for SQL orchestration with partial reparse

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod loader;
mod parser;
mod runners;

use cli::Cli;
use commands::common::ExitCode;
use commands::{build, clean, compile, ls, parse, run, seed, snapshot, test};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let outcome: Result<()> = match &cli.command {
        cli::Commands::Parse(args) => parse::execute(args, &cli.global).await,
        cli::Commands::Compile(args) => compile::execute(args, &cli.global).await,
        cli::Commands::Run(args) => run::execute(args, &cli.global).await,
        cli::Commands::Test(args) => test::execute(args, &cli.global).await,
        cli::Commands::Seed(args) => seed::execute(args, &cli.global).await,
        cli::Commands::Snapshot(args) => snapshot::execute(args, &cli.global).await,
        cli::Commands::Build(args) => build::execute(args, &cli.global).await,
        cli::Commands::Ls(args) => ls::execute(args, &cli.global).await,
        cli::Commands::Clean(args) => clean::execute(args, &cli.global).await,
    };

    match outcome {
        Ok(()) => {}
        Err(err) => {
            let code = match err.downcast_ref::<ExitCode>() {
                Some(ExitCode(code)) => *code,
                None => {
                    eprintln!("Error: {:#}", err);
                    2
                }
            };
            std::process::exit(code);
        }
    }
}
