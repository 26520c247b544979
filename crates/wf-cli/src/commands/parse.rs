//! `wren parse` - parse the project and report reparse statistics

use anyhow::Result;
use serde::Serialize;

use crate::cli::{GlobalArgs, OutputFormat, ParseArgs};
use crate::commands::common::ExitCode;
use crate::loader::{load_project, LoaderOptions};

#[derive(Serialize)]
struct ParseReport {
    resources: usize,
    reparsed_files: usize,
    reused_resources: usize,
    parse_errors: Vec<String>,
}

pub async fn execute(args: &ParseArgs, global: &GlobalArgs) -> Result<()> {
    let opts = LoaderOptions::from_cli(global, args.vars.as_ref());
    let loaded = load_project(std::path::Path::new(&global.project_dir), &opts)?;

    let parse_errors: Vec<String> = loaded
        .manifest
        .resources
        .values()
        .filter_map(|r| r.parse_error.clone())
        .collect();

    let report = ParseReport {
        resources: loaded.manifest.resources.len(),
        reparsed_files: loaded.reparsed,
        reused_resources: loaded.reused,
        parse_errors,
    };

    match global.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "Parsed {} files, reused {} resources ({} total)",
                report.reparsed_files, report.reused_resources, report.resources
            );
            for error in &report.parse_errors {
                eprintln!("  {}", error);
            }
        }
    }

    if report.parse_errors.is_empty() {
        Ok(())
    } else {
        Err(ExitCode(1).into())
    }
}
