//! `wren clean` - remove the target directory

use anyhow::{Context, Result};

use wf_core::project::Project;

use crate::cli::{CleanArgs, GlobalArgs};

pub async fn execute(_args: &CleanArgs, global: &GlobalArgs) -> Result<()> {
    let project = Project::load(std::path::Path::new(&global.project_dir))?;
    let target = project.target_path();
    if target.exists() {
        std::fs::remove_dir_all(&target)
            .with_context(|| format!("removing {}", target.display()))?;
        println!("Removed {}", target.display());
    } else {
        println!("Nothing to clean");
    }
    Ok(())
}
