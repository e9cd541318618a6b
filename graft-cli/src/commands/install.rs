use anyhow::Result;
use clap::Args;
use graft_core::{GraftConfig, Project, console, operations};
use std::env;

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Skip devDependencies
    #[arg(long)]
    pub production: bool,
    /// Install packages that do not support this platform and re-resolve linked ones
    #[arg(short = 'f', long = "force")]
    pub force: bool,
    /// Ignore versions pinned by the lockfile
    #[arg(short = 'u', long = "update")]
    pub update: bool,
    /// Only use the local store and cached metadata
    #[arg(long)]
    pub offline: bool,
    /// Fail on packages whose engines do not match
    #[arg(long = "engine-strict")]
    pub engine_strict: bool,
    /// Re-resolve already linked packages down to this depth
    #[arg(long)]
    pub depth: Option<usize>,
}

pub async fn run(args: InstallArgs, config: &GraftConfig) -> Result<()> {
    console::header("install", env!("CARGO_PKG_VERSION"));

    let mut config = config.clone();
    config.offline |= args.offline;
    config.engine_strict |= args.engine_strict;
    if let Some(depth) = args.depth {
        config.depth = depth;
    }

    let cwd = env::current_dir()?;
    let project = Project::discover(&cwd)?;

    let options = operations::InstallOptions {
        production: args.production,
        force: args.force,
        update: args.update,
    };
    let report = operations::install(&config, &project, options).await?;

    for pkg in &report.top_level {
        console::added(&pkg.name, &pkg.version, pkg.dev);
    }
    for pkg in &report.skipped {
        console::skipped(&pkg.name, &pkg.version);
    }

    console::summary(
        report.resolved,
        report.skipped.len(),
        console::elapsed_seconds(),
    );

    Ok(())
}
