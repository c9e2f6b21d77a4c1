//! Console front-end for the convergence engine
//!
//! A run always previews first: every entity is validated and planned
//! without mutating anything, the pending changes are shown, and only then
//! (after confirmation, unless skipped) is the plan converged for real.
//! Generated addresses are memoized on the run context, so the preview and
//! the real run agree.

pub mod display;

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{ConfirmCallback, ConvergencePlan, ExecuteOptions, ExecuteSummary};

use crate::lxd::RunContext;
use display::{ConsoleProgress, Mode, print_summary};

/// Options for one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Show what would change, then stop
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Also report entities that are up to date
    pub verbose: bool,
}

/// Confirmation through an interactive terminal prompt
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> std::io::Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .map_err(std::io::Error::other)
    }
}

/// Preview, confirm and converge a plan
pub fn converge(
    plan: &ConvergencePlan<RunContext>,
    ctx: &RunContext,
    opts: &RunOptions,
    confirm: &mut dyn ConfirmCallback,
) -> Result<ExecuteSummary> {
    let preview = preview(plan, ctx, opts.verbose)?;

    if preview.changes == 0 || opts.dry_run {
        return Ok(preview);
    }

    if !opts.yes && !confirm.confirm("Apply these changes?")? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(preview);
    }

    println!();
    let mut progress = ConsoleProgress::new(Mode::Apply, opts.verbose);
    let summary = declarative::execute(
        plan,
        ctx,
        &ExecuteOptions {
            dry_run: false,
            verbose: opts.verbose,
        },
        &mut progress,
    )
    .context("Convergence stopped")?;

    print_summary(&summary);
    Ok(summary)
}

/// Validate and plan every entity, printing what would change
pub fn preview(
    plan: &ConvergencePlan<RunContext>,
    ctx: &RunContext,
    verbose: bool,
) -> Result<ExecuteSummary> {
    println!();
    let mut progress = ConsoleProgress::new(Mode::Preview, verbose);
    let summary = declarative::execute(
        plan,
        ctx,
        &ExecuteOptions {
            dry_run: true,
            verbose,
        },
        &mut progress,
    )
    .context("Planning failed")?;

    println!();
    if summary.changes == 0 {
        println!("  {} No changes needed", "✓".green());
    } else {
        println!(
            "  {} {} changes across {} entities",
            "ℹ".blue(),
            summary.changes.to_string().bold(),
            summary.skipped
        );
    }
    Ok(summary)
}
