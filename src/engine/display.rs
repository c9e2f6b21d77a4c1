//! Change display - what a run is about to do, and what it did

use colored::Colorize;
use declarative::{ApplyResult, Change, ExecuteSummary, ProgressCallback};

/// How a rendered line should be marked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Add,
    Remove,
    Modify,
    Context,
}

impl Tag {
    fn symbol(self) -> colored::ColoredString {
        match self {
            Tag::Add => "+".green(),
            Tag::Remove => "-".red(),
            Tag::Modify => "~".yellow(),
            Tag::Context => " ".normal(),
        }
    }
}

/// Plain lines describing one change
///
/// Secret values arrive already masked by `Assignment`'s display.
pub fn change_lines(change: &Change) -> Vec<(Tag, String)> {
    match change {
        Change::Create { initial } => {
            let mut lines = vec![(Tag::Add, "create".to_string())];
            lines.extend(initial.iter().map(|a| (Tag::Context, format!("  {}", a))));
            lines
        }
        Change::Set(a) => vec![(Tag::Modify, format!("set {}", a))],
        Change::Unset { key } => vec![(Tag::Remove, format!("unset {}", key))],
        Change::Delete => vec![(Tag::Remove, "delete".to_string())],
        Change::Replace {
            target,
            previous,
            content,
        } => {
            let mut lines = vec![(Tag::Modify, format!("rewrite {}", target))];
            let diff = similar::TextDiff::from_lines(previous, content);
            for line in diff.iter_all_changes() {
                let text = format!("  {}", line.value().trim_end_matches('\n'));
                match line.tag() {
                    similar::ChangeTag::Delete => lines.push((Tag::Remove, text)),
                    similar::ChangeTag::Insert => lines.push((Tag::Add, text)),
                    similar::ChangeTag::Equal => {}
                }
            }
            lines
        }
    }
}

/// Whether the console lists pending changes or reports applied ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Preview,
    Apply,
}

/// Progress printed to the terminal
///
/// An entity's heading is only printed once it has something to report, so
/// up-to-date entities stay silent unless `verbose` is set.
pub struct ConsoleProgress {
    mode: Mode,
    verbose: bool,
    pending: Option<String>,
    description: String,
}

impl ConsoleProgress {
    pub fn new(mode: Mode, verbose: bool) -> Self {
        Self {
            mode,
            verbose,
            pending: None,
            description: String::new(),
        }
    }

    fn heading(&mut self) {
        if let Some(desc) = self.pending.take() {
            println!("  {} {}", "→".cyan(), desc.bold());
        }
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_entity_start(&mut self, _id: &str, description: &str) {
        self.description = description.to_string();
        if self.mode == Mode::Preview {
            self.pending = Some(description.to_string());
        }
    }

    fn on_change(&mut self, _id: &str, change: &Change) {
        if self.mode != Mode::Preview {
            return;
        }
        self.heading();
        for (tag, line) in change_lines(change) {
            match tag {
                Tag::Context => println!("      {}", line.dimmed()),
                _ => println!("    {} {}", tag.symbol(), line),
            }
        }
    }

    fn on_entity_complete(&mut self, _id: &str, result: &ApplyResult) {
        match (self.mode, result) {
            (_, ApplyResult::Failed { error }) => {
                self.heading();
                println!("    {} {}", "✗".red(), error.red());
            }
            (Mode::Apply, ApplyResult::Created) => {
                println!("  {} {} created", "✓".green(), self.description);
            }
            (Mode::Apply, ApplyResult::Modified) => {
                println!("  {} {} updated", "✓".green(), self.description);
            }
            (Mode::Apply, ApplyResult::Removed) => {
                println!("  {} {} removed", "✓".green(), self.description);
            }
            (_, ApplyResult::NoChange) if self.verbose => {
                println!("  {} {} up to date", "○".dimmed(), self.description.dimmed());
            }
            _ => {}
        }
        self.pending = None;
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} LXD converged successfully!", "✓".green().bold());
    } else {
        println!("  {} Convergence stopped with errors", "⚠".yellow().bold());
    }

    for line in summary_lines(summary) {
        println!("    • {}", line);
    }
}

fn summary_lines(summary: &ExecuteSummary) -> Vec<String> {
    let counts = [
        (summary.created, "created"),
        (summary.modified, "modified"),
        (summary.removed, "removed"),
        (summary.skipped, "skipped"),
        (summary.failed, "failed"),
        (summary.no_change, "unchanged"),
    ];
    counts
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, what)| {
            let noun = if count == 1 { "entity" } else { "entities" };
            format!("{} {} {}", count, noun, what)
        })
        .collect()
}
