//! `wren compile` - render selected resources to SQL without executing

use anyhow::Result;

use wf_core::resource::ResourceKind;
use wf_core::selector::apply_selectors;

use crate::cli::{CompileArgs, GlobalArgs};
use crate::commands::common::ExitCode;
use crate::loader::{load_project, LoaderOptions};
use crate::runners::SqlCompiler;

pub async fn execute(args: &CompileArgs, global: &GlobalArgs) -> Result<()> {
    let opts = LoaderOptions::from_cli(global, args.vars.as_ref());
    let loaded = load_project(std::path::Path::new(&global.project_dir), &opts)?;

    let mut selection = apply_selectors(
        &loaded.manifest,
        &loaded.graph,
        &args.selection.select,
        &args.selection.exclude,
    )?;
    selection.retain(|id| {
        loaded
            .manifest
            .get(id)
            .map(|r| matches!(r.kind, ResourceKind::Model | ResourceKind::Test))
            .unwrap_or(false)
    });

    let compiler = SqlCompiler::new(&loaded, true);
    let mut failures = 0usize;
    let mut compiled = 0usize;

    for id in loaded.graph.topological_order() {
        if !selection.contains(&id) {
            continue;
        }
        let Some(resource) = loaded.manifest.get(&id) else {
            continue;
        };
        if let Some(error) = &resource.parse_error {
            eprintln!("  \u{2717} {} - {}", id, error);
            failures += 1;
            continue;
        }
        let outcome = match resource.kind {
            ResourceKind::Test => compiler.compile_test_sql(resource, &loaded.manifest),
            _ => compiler.compile_sql(resource),
        };
        match outcome {
            Ok(_) => {
                compiled += 1;
                if !global.quiet {
                    println!("  \u{2713} {}", id);
                }
            }
            Err(error) => {
                eprintln!("  \u{2717} {} - {}", id, error);
                failures += 1;
            }
        }
    }

    println!("\nCompiled {} resources, {} failures", compiled, failures);
    if failures == 0 {
        Ok(())
    } else {
        Err(ExitCode(1).into())
    }
}
