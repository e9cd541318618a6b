use crate::commands;
use anyhow::Result;
use clap::{Parser, Subcommand};
use graft_core::GraftConfig;

#[derive(Parser, Debug)]
#[command(
    name = "graft",
    about = "concurrent node package installer",
    version,
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve, fetch and lock the dependencies of the current project
    #[command(alias = "i")]
    Install(commands::install::InstallArgs),
}

pub async fn execute(cli: Cli, config: GraftConfig) -> Result<()> {
    match cli.command {
        Command::Install(args) => commands::install::run(args, &config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_install_flags() {
        let cli = Cli::try_parse_from([
            "graft",
            "-v",
            "install",
            "--production",
            "--offline",
            "--depth",
            "2",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Command::Install(args) = cli.command;
        assert!(args.production);
        assert!(args.offline);
        assert!(!args.force);
        assert_eq!(args.depth, Some(2));
    }

    #[test]
    fn install_has_a_short_alias() {
        let cli = Cli::try_parse_from(["graft", "i", "-f"]).unwrap();
        let Command::Install(args) = cli.command;
        assert!(args.force);
    }
}
