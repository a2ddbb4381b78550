//! CLI definition and command handling

pub mod output;
pub mod reporter;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use console::style;
use kiln_core::config::{load_config, load_config_from_dir};
use kiln_core::{BuildConfig, Os};
use kiln_rules::register_build_file;
use kiln_tasks::{
    Engine, EngineError, EngineMetrics, EngineOptions, RunSummary, TargetId, DEFAULT_CACHE_FILE,
};
use tracing::{debug, info, warn};

use crate::exit_codes;
use reporter::ConsoleReporter;

/// Kiln - incremental build tool
#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Maximum number of concurrently running tasks
    #[arg(short, long, value_parser = parse_jobs, env = "KILN_JOBS")]
    pub jobs: Option<usize>,

    /// Print the execution plan, cache decisions and timing counters
    #[arg(short, long)]
    pub verbose: bool,

    /// Stop launching new tasks after the first failure
    #[arg(short, long)]
    pub quit_eagerly: bool,

    /// Working directory
    #[arg(short = 'C', long)]
    pub directory: Option<PathBuf>,

    /// Build file (searched for in the working directory and its parents otherwise)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Targets to build (defaults to the build file's `targets`)
    pub targets: Vec<String>,
}

fn parse_jobs(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("job limit must be at least 1".to_string()),
        Ok(jobs) => Ok(jobs),
        Err(e) => Err(e.to_string()),
    }
}

impl Cli {
    /// Run the build; returns the process exit code
    pub fn execute(&self) -> anyhow::Result<i32> {
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)
                .with_context(|| format!("cannot change directory to {}", dir.display()))?;
        }

        let (config, config_path) = match &self.file {
            Some(path) => (load_config(path)?, path.clone()),
            None => load_config_from_dir(&std::env::current_dir()?)?,
        };
        if self.verbose {
            output::info(&format!("using {}", config_path.display()));
        }
        if let Some(dir) = build_root(&config_path) {
            std::env::set_current_dir(dir)
                .with_context(|| format!("cannot change directory to {}", dir.display()))?;
        }

        let os = Os::detect().context("unsupported host platform")?;
        let options = self.engine_options(&config);
        debug!(?options, %os, "engine options resolved");

        let mut engine = Engine::new(options, Arc::new(ConsoleReporter::new(self.verbose)));
        register_build_file(&mut engine, &config, os)?;

        let targets = self.requested_targets(&config);
        if targets.is_empty() {
            output::warning("no targets requested and the build file names no default targets");
            return Ok(exit_codes::SUCCESS);
        }

        if self.verbose {
            let plan = engine.plan(&targets)?;
            println!("{}", output::header("Execution plan:"));
            println!("{}", plan.execution_plan());
        }

        let runtime = tokio::runtime::Runtime::new()?;
        let code = runtime.block_on(run_until_interrupted(&engine, &targets, ctrl_c()))?;
        if self.verbose {
            print_metrics(&engine.metrics());
        }
        Ok(code)
    }

    /// Command line flags win over the build file, which wins over defaults
    fn engine_options(&self, config: &BuildConfig) -> EngineOptions {
        let defaults = EngineOptions::default();
        EngineOptions {
            jobs: self.jobs.or(config.jobs).unwrap_or(defaults.jobs),
            quit_eagerly: self.quit_eagerly,
            cache_file: config
                .cache_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE)),
        }
    }

    fn requested_targets(&self, config: &BuildConfig) -> Vec<TargetId> {
        let names = if self.targets.is_empty() {
            &config.targets
        } else {
            &self.targets
        };
        names.iter().map(|name| TargetId::new(name.as_str())).collect()
    }
}

/// Resolves on Ctrl-C; never, if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Update `targets` unless `interrupt` resolves first.
///
/// On interrupt the in-flight update is dropped and the cache, including every
/// entry committed so far, is saved before reporting failure.
async fn run_until_interrupted(
    engine: &Engine,
    targets: &[TargetId],
    interrupt: impl Future<Output = ()>,
) -> Result<i32, EngineError> {
    tokio::select! {
        result = engine.update(targets) => Ok(print_summary(&result?, targets)),
        () = interrupt => {
            info!("interrupted, saving cache");
            if let Err(e) = engine.cache().save() {
                output::warning(&format!("could not save cache: {}", e));
            }
            output::error("FAILED: interrupted");
            Ok(exit_codes::FAILURE)
        }
    }
}

/// Directory the build file lives in, if it is not the current one
fn build_root(config_path: &Path) -> Option<&Path> {
    config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
}

fn print_summary(summary: &RunSummary, targets: &[TargetId]) -> i32 {
    let requested: Vec<&str> = targets.iter().map(|t| t.as_str()).collect();

    if summary.success() {
        output::success(&format!(
            "{} up to date {}",
            requested.join(", "),
            style(format!("{:.1}s", summary.duration.as_secs_f64())).dim()
        ));
        return exit_codes::SUCCESS;
    }

    let failed: Vec<_> = summary.failed().collect();
    let skipped: Vec<_> = summary.skipped().collect();

    println!();
    if !failed.is_empty() {
        println!(
            "  {} {}/{} tasks failed:",
            style("✗").red().bold(),
            failed.len(),
            summary.tasks.len()
        );
        for record in &failed {
            println!("    {} {}", style("✗").red(), record.label);
        }
    }

    if !skipped.is_empty() {
        let names: Vec<&str> = skipped.iter().map(|r| r.id.as_str()).collect();
        if summary.has_cycle() {
            output::error(&format!(
                "circular dependency: {} tasks never ran: {}",
                skipped.len(),
                names.join(", ")
            ));
        } else {
            output::warning(&format!(
                "stopped after the first failure; {} tasks never ran: {}",
                skipped.len(),
                names.join(", ")
            ));
        }
    }

    output::error(&format!("FAILED: {}", requested.join(", ")));
    exit_codes::FAILURE
}

fn print_metrics(metrics: &EngineMetrics) {
    println!();
    println!("{}", output::header("Metrics:"));
    println!(
        "{}",
        output::key_value(
            "cache",
            &format!(
                "{} entries ({} loaded, {} discarded), {} tracked files",
                metrics.cache.entries,
                metrics.load.valid,
                metrics.load.discarded,
                metrics.cache.tracked_files
            )
        )
    );
    println!(
        "{}",
        output::key_value(
            "commands",
            &format!(
                "{} spawned, {} cached, {:.2}s running",
                metrics.runner.spawned,
                metrics.runner.cache_hits,
                metrics.runner.run_time.as_secs_f64()
            )
        )
    );
    println!(
        "{}",
        output::key_value(
            "hashes",
            &format!(
                "{} files, {} memo hits, {:.2}s reading, {:.2}s hashing",
                metrics.hashes.entries,
                metrics.hashes.memo_hits,
                metrics.hashes.load_time.as_secs_f64(),
                metrics.hashes.hash_time.as_secs_f64()
            )
        )
    );
}
