use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lxd-sling")]
#[command(version)]
#[command(about = "Converge an LXD daemon to a declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Desired state file (default: ~/.config/lxd-sling/config.toml)
    #[arg(short, long, global = true, env = "LXD_SLING_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make the daemon match the desired state
    Apply(ApplyArgs),

    /// Preview what apply would change
    Diff(DiffArgs),

    /// Show daemon capabilities and bridge generation
    Info(InfoArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only converge matching entities: `type` or `type.name` (e.g. networks.lxdbr0)
    pub target: Option<String>,

    /// Dry run - show what would change
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser)]
pub struct DiffArgs {
    /// Only show matching entities: `type` or `type.name`
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from(["lxd-sling", "-vv", "apply", "networks.lxdbr0", "--dry-run", "-y"]);
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.target.as_deref(), Some("networks.lxdbr0"));
        assert!(args.dry_run);
        assert!(args.yes);
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["lxd-sling", "diff", "--config", "/tmp/sling.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/sling.toml")));
        assert!(matches!(cli.command, Command::Diff(DiffArgs { target: None })));
    }
}
