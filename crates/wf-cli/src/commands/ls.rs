//! `wren ls` - list selected resources

use anyhow::Result;

use wf_core::selector::apply_selectors;

use crate::cli::{GlobalArgs, LsArgs, OutputFormat};
use crate::loader::{load_project, LoaderOptions};

pub async fn execute(args: &LsArgs, global: &GlobalArgs) -> Result<()> {
    let opts = LoaderOptions::from_cli(global, None);
    let loaded = load_project(std::path::Path::new(&global.project_dir), &opts)?;

    let selection = apply_selectors(
        &loaded.manifest,
        &loaded.graph,
        &args.selection.select,
        &args.selection.exclude,
    )?;

    match global.output {
        OutputFormat::Json => {
            let ids: Vec<&str> = selection.iter().map(|id| id.as_str()).collect();
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        OutputFormat::Text => {
            for id in &selection {
                let Some(resource) = loaded.manifest.get(id) else {
                    continue;
                };
                println!("{:<10} {}", resource.kind.to_string(), id);
            }
        }
    }
    Ok(())
}
