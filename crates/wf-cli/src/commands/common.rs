//! Shared command plumbing: selection execution, output, exit codes.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wf_core::config::Config;
use wf_core::manifest::Manifest;
use wf_core::resource::ResourceKind;
use wf_core::results::{NodeStatus, RunResult};
use wf_core::selector::apply_selectors;
use wf_core::unique_id::UniqueId;
use wf_db::{DuckDbWarehouse, Warehouse};
use wf_run::{EventSink, RunEvent, ScheduleOptions, Scheduler};

use crate::cli::{ExecArgs, GlobalArgs, OutputFormat};
use crate::loader::{LoadedProject, RUN_RESULTS_FILE};
use crate::runners::WrenRunner;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Intentionally empty: ExitCode is a control-flow mechanism, not a
        // user-facing error, and must not leak text into stderr.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Event sink that drives per-resource console output and a progress bar.
pub(crate) struct ProgressSink {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl ProgressSink {
    pub fn new(total: usize, global: &GlobalArgs) -> Self {
        let bar = (!global.quiet && global.output == OutputFormat::Text).then(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        });
        Self {
            bar,
            quiet: global.quiet || global.output != OutputFormat::Text,
        }
    }

    fn line(&self, text: String) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(pb) => pb.println(text),
            None => println!("{}", text),
        }
    }
}

impl EventSink for ProgressSink {
    fn emit(&self, event: &RunEvent) {
        match event {
            RunEvent::NodeStarted { .. } => {}
            RunEvent::NodeFinished {
                unique_id,
                status,
                execution_time,
            } => {
                let symbol = match status {
                    NodeStatus::Success | NodeStatus::Pass => "\u{2713}",
                    NodeStatus::Warn => "!",
                    NodeStatus::Error | NodeStatus::Fail => "\u{2717}",
                    NodeStatus::Skipped => "-",
                };
                self.line(format!(
                    "  {} {} ({}) [{:.0}ms]",
                    symbol,
                    unique_id,
                    status,
                    execution_time * 1000.0
                ));
                if let Some(pb) = &self.bar {
                    pb.inc(1);
                }
            }
            RunEvent::RunStarted { selected } => {
                self.line(format!("Running {} resources", selected));
            }
            RunEvent::RunFinished { .. } => {
                if let Some(pb) = &self.bar {
                    pb.finish_and_clear();
                }
            }
        }
    }
}

/// Open the configured warehouse.
pub(crate) fn open_warehouse(config: &Config) -> Result<Arc<dyn Warehouse>> {
    let db = DuckDbWarehouse::new(&config.database.path)
        .with_context(|| format!("opening warehouse at {}", config.database.path))?;
    Ok(Arc::new(db))
}

/// Cancellation flag flipped by Ctrl-C; running callbacks finish, nothing
/// new starts.
pub(crate) fn make_cancel_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted; letting running resources finish");
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}

/// Resolve --select/--exclude, then restrict to the given kinds.
///
/// When tests are among the kinds, tests attached to any selected resource
/// are pulled in as well, so `wren test --select orders` runs the tests on
/// `orders` without naming them.
pub(crate) fn resolve_selection(
    loaded: &LoadedProject,
    kinds: &[ResourceKind],
    args: &ExecArgs,
) -> Result<BTreeSet<UniqueId>> {
    let mut selection = apply_selectors(
        &loaded.manifest,
        &loaded.graph,
        &args.selection.select,
        &args.selection.exclude,
    )?;

    if kinds.contains(&ResourceKind::Test) {
        let attached: Vec<UniqueId> = loaded
            .manifest
            .resources_of_kind(ResourceKind::Test)
            .filter(|t| t.enabled)
            .filter(|t| t.depends_on.iter().any(|dep| selection.contains(dep)))
            .map(|t| t.unique_id.clone())
            .collect();
        selection.extend(attached);
    }

    selection.retain(|id| {
        loaded
            .manifest
            .get(id)
            .map(|r| kinds.contains(&r.kind))
            .unwrap_or(false)
    });
    Ok(selection)
}

/// Shared driver for run/test/seed/snapshot/build.
pub(crate) async fn execute_selection(
    mut loaded: LoadedProject,
    kinds: &[ResourceKind],
    args: &ExecArgs,
    global: &GlobalArgs,
    blocking_edges: bool,
) -> Result<()> {
    if blocking_edges {
        loaded.graph.add_test_blocking_edges(&loaded.manifest);
    }

    let selection = resolve_selection(&loaded, kinds, args)?;
    if selection.is_empty() {
        println!("Nothing to do");
        return Ok(());
    }

    let db = open_warehouse(&loaded.project.config)?;

    for hook in &loaded.project.config.on_run_start {
        db.execute(hook)
            .await
            .with_context(|| format!("on_run_start hook failed: {}", hook))?;
    }

    let opts = ScheduleOptions {
        threads: args.threads.unwrap_or(loaded.project.config.threads),
        fail_fast: args.fail_fast,
        cancel: Some(make_cancel_flag()),
    };
    let runner = Arc::new(WrenRunner::new(Arc::clone(&db), &loaded));
    let sink = Arc::new(ProgressSink::new(selection.len(), global));
    let scheduler = Scheduler::new(Arc::clone(&loaded.manifest), opts).with_sink(sink);

    let run = scheduler.execute(&loaded.graph, &selection, runner).await;

    for hook in &loaded.project.config.on_run_end {
        if let Err(e) = db.execute(hook).await {
            log::warn!("on_run_end hook failed: {}", e);
        }
    }

    if let Err(e) = run.save(&loaded.artifact_path(RUN_RESULTS_FILE)) {
        log::warn!("failed to write run results artifact: {}", e);
    }

    finish_run(&run, &loaded.manifest, global)
}

/// Print the run summary and convert the outcome into a process exit.
pub(crate) fn finish_run(
    run: &RunResult,
    manifest: &Manifest,
    global: &GlobalArgs,
) -> Result<()> {
    match global.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(run)?);
        }
        OutputFormat::Text => {
            let counts = run.status_counts();
            let count = |s: NodeStatus| counts.get(&s).copied().unwrap_or(0);
            println!(
                "\nDone in {:.2}s. success={} pass={} warn={} error={} fail={} skipped={} total={}",
                run.elapsed,
                count(NodeStatus::Success),
                count(NodeStatus::Pass),
                count(NodeStatus::Warn),
                count(NodeStatus::Error),
                count(NodeStatus::Fail),
                count(NodeStatus::Skipped),
                run.results.len(),
            );
            if !global.quiet {
                for (kind, n) in run.kind_counts(manifest) {
                    println!("  {}: {}", kind, n);
                }
            }
        }
    }

    if run.success() {
        Ok(())
    } else {
        Err(ExitCode(run.exit_code()).into())
    }
}
