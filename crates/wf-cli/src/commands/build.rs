//! `wren build` - seeds, models, snapshots, and tests in one graph-ordered
//! run, with blocking tests gating their models' dependents

use anyhow::Result;

use wf_core::resource::ResourceKind;

use crate::cli::{ExecArgs, GlobalArgs};
use crate::commands::common::execute_selection;
use crate::loader::{load_project, LoaderOptions};

pub async fn execute(args: &ExecArgs, global: &GlobalArgs) -> Result<()> {
    let opts = LoaderOptions::from_cli(global, args.vars.as_ref());
    let loaded = load_project(std::path::Path::new(&global.project_dir), &opts)?;
    execute_selection(
        loaded,
        &[
            ResourceKind::Seed,
            ResourceKind::Model,
            ResourceKind::Snapshot,
            ResourceKind::Test,
        ],
        args,
        global,
        true,
    )
    .await
}
