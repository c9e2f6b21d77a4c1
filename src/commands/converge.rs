//! `apply` and `diff` - converge the daemon, or preview what that would do

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{AutoDecline, ConvergencePlan};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;

use crate::Context;
use crate::config::SlingConfig;
use crate::engine::{self, PromptConfirm, RunOptions};
use crate::gateway::ProcessGateway;
use crate::lxd::RunContext;
use crate::paths;
use crate::state::SlingState;
use crate::ui;

pub fn apply(ctx: &Context, target: Option<&str>, dry_run: bool, yes: bool) -> Result<()> {
    let (config, path) = load_config(ctx)?;
    let plan = select(&config, target)?;
    let run = connect(&config)?;

    if !ctx.quiet {
        ui::header("LXD Apply");
        describe(&config, &path, &run);
    }

    let opts = RunOptions {
        dry_run,
        yes,
        verbose: ctx.verbose > 0,
    };
    let summary = engine::converge(&plan, &run, &opts, &mut PromptConfirm)?;

    if dry_run && summary.changes > 0 {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
    }
    Ok(())
}

pub fn diff(ctx: &Context, target: Option<&str>) -> Result<()> {
    let (config, path) = load_config(ctx)?;
    let plan = select(&config, target)?;
    let run = connect(&config)?;

    if !ctx.quiet {
        ui::header("LXD Diff");
        describe(&config, &path, &run);
    }

    let opts = RunOptions {
        dry_run: true,
        yes: false,
        verbose: ctx.verbose > 0,
    };
    engine::converge(&plan, &run, &opts, &mut AutoDecline)?;
    Ok(())
}

/// Desired state from `--config` or the default location
pub fn load_config(ctx: &Context) -> Result<(SlingConfig, PathBuf)> {
    let path = match &ctx.config {
        Some(path) => path.clone(),
        None => paths::config_file()?,
    };
    let config = SlingConfig::load(&path)?;
    Ok((config, path))
}

/// Probe the daemon named by the config
pub fn connect(config: &SlingConfig) -> Result<RunContext> {
    let settings = config.settings()?;
    let state = SlingState::load(&settings.state_file)?;
    let gateway = ProcessGateway::new(settings.server_path.as_str());
    let server_path = settings.server_path.clone();

    RunContext::connect(Box::new(gateway), settings, state, StdRng::from_entropy())
        .with_context(|| format!("Could not query the LXD daemon at {}", server_path))
}

/// The plan, narrowed to `target` when one is given
fn select(config: &SlingConfig, target: Option<&str>) -> Result<ConvergencePlan<RunContext>> {
    let plan = config.build_plan()?.filter_by_target(target);
    if let Some(t) = target
        && plan.is_empty()
    {
        bail!("No configured entity matches '{}'", t);
    }
    Ok(plan)
}

fn describe(config: &SlingConfig, path: &std::path::Path, run: &RunContext) {
    ui::kv("Config", &path.display().to_string());
    ui::kv("Server", &config.server_path);
    ui::kv("Bridges", &run.generation().to_string());
}
