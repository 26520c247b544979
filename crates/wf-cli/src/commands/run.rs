//! `wren run` - execute models against the warehouse

use anyhow::Result;

use wf_core::resource::ResourceKind;

use crate::cli::{ExecArgs, GlobalArgs};
use crate::commands::common::execute_selection;
use crate::loader::{load_project, LoaderOptions};

pub async fn execute(args: &ExecArgs, global: &GlobalArgs) -> Result<()> {
    let opts = LoaderOptions::from_cli(global, args.vars.as_ref());
    let loaded = load_project(std::path::Path::new(&global.project_dir), &opts)?;
    execute_selection(loaded, &[ResourceKind::Model], args, global, false).await
}
