use crate::console;
use crate::fetch::{Fetcher, RegistryFetcher};
use crate::install::{InstallOutcome, InstallationContext, InstalledPackage, Installer, InstallerOptions};
use crate::lockfile::{self, Lockfile, ResolvedDependencies};
use crate::spec::{DependencySpecExpander, ExpandContext, ManifestSpecExpander};
use crate::status::ConsoleStatusSink;
use crate::{GraftConfig, Project, Result};
use futures::future::try_join_all;
use reqwest::Client;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Leave devDependencies out.
    pub production: bool,
    /// Install incompatible packages and re-resolve everything.
    pub force: bool,
    /// Resolve from the registry even where the lockfile pins a version.
    pub update: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedPackage {
    pub id: String,
    pub name: String,
    pub version: String,
    pub dev: bool,
}

impl ReportedPackage {
    fn from_installed(pkg: &InstalledPackage) -> Self {
        ReportedPackage {
            id: pkg.id.clone(),
            name: pkg.name().to_string(),
            version: pkg.version().to_string(),
            dev: pkg.dev,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub top_level: Vec<ReportedPackage>,
    pub skipped: Vec<ReportedPackage>,
    /// Every resolved identity, skipped ones included.
    pub resolved: usize,
    pub lockfile_path: PathBuf,
}

pub async fn install(
    config: &GraftConfig,
    project: &Project,
    options: InstallOptions,
) -> Result<InstallReport> {
    let fetcher = Arc::new(RegistryFetcher::new(Client::new()));
    install_with_fetcher(config, project, options, fetcher).await
}

pub async fn install_with_fetcher(
    config: &GraftConfig,
    project: &Project,
    options: InstallOptions,
    fetcher: Arc<dyn Fetcher>,
) -> Result<InstallReport> {
    let started = Instant::now();
    let lockfile_path = project.lockfile_path();

    let lockfile = match lockfile::read(&lockfile_path)? {
        Some(existing) => existing,
        None => Lockfile::new(&config.default_registry),
    };

    let declared = declared_dependencies(project, options.production);
    let seeded = if options.update {
        None
    } else {
        Some(pinned_root_dependencies(&lockfile, &declared))
    };

    debug!(
        root = %project.root.display(),
        declared = declared.len(),
        pinned = seeded.as_ref().map_or(0, BTreeMap::len),
        production = options.production,
        force = options.force,
        update = options.update,
        "install start"
    );

    let manifest = &project.manifest;
    let dev_only: BTreeMap<String, String> = manifest
        .dev_dependencies
        .iter()
        .filter(|(name, _)| {
            !manifest.dependencies.contains_key(*name)
                && !manifest.optional_dependencies.contains_key(*name)
        })
        .map(|(name, range)| (name.clone(), range.clone()))
        .collect();

    let root_specs = ManifestSpecExpander.expand(
        &declared,
        ExpandContext {
            where_: &project.root,
            dev_dependencies: &dev_only,
            optional_dependencies: &manifest.optional_dependencies,
        },
    )?;

    let mut installer_options = InstallerOptions::new(
        config.default_registry.clone(),
        config.store_dir(),
        project.node_modules(),
    );
    installer_options.scoped_registries = Arc::new(config.scoped_registries.clone());
    installer_options.depth = config.depth;
    installer_options.force = options.force;
    installer_options.update = options.update;
    installer_options.offline = config.offline;
    installer_options.engine_strict = config.engine_strict;
    installer_options.node_version = config.node_version.clone();
    installer_options.resolved_dependencies = seeded;

    console::step("Resolving dependencies");

    let status = Arc::new(ConsoleStatusSink::default());
    let installer = Installer::new(fetcher).with_status(status.clone());
    let ctx = InstallationContext::new(lockfile);
    let top = installer
        .install_multiple(&ctx, root_specs, &installer_options)
        .await;
    console::clear_line();
    let top = top?;

    let InstallOutcome {
        mut lockfile,
        installs,
        installation_sequence,
        skipped,
        linked,
    } = ctx.finish();

    console::step("Fetching packages");

    let pending = installation_sequence
        .iter()
        .filter_map(|id| installs.get(id))
        .map(|pkg| pkg.fetching_files.wait());
    try_join_all(pending).await?;

    let top_level = top.iter().filter_map(|pkg| {
        declared
            .get(pkg.name())
            .map(|range| (pkg.name(), range.as_str(), pkg))
    });
    lockfile.record_installation(top_level, &installs, &linked);
    lockfile::write(&lockfile_path, &lockfile)?;

    let report = InstallReport {
        top_level: top.iter().map(ReportedPackage::from_installed).collect(),
        skipped: skipped
            .iter()
            .filter_map(|id| installs.get(id))
            .map(ReportedPackage::from_installed)
            .collect(),
        resolved: installs.len(),
        lockfile_path,
    };

    info!(
        resolved = report.resolved,
        linked = installation_sequence.len(),
        skipped = report.skipped.len(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "install finished"
    );

    Ok(report)
}

/// Root dependencies to resolve: optional, then regular, then dev (unless
/// production). A name declared in several groups keeps the regular range.
fn declared_dependencies(project: &Project, production: bool) -> BTreeMap<String, String> {
    let manifest = &project.manifest;
    let mut declared = BTreeMap::new();

    if !production {
        declared.extend(manifest.dev_dependencies.clone());
    }
    declared.extend(manifest.optional_dependencies.clone());
    declared.extend(manifest.dependencies.clone());

    declared
}

/// Lockfile root edges whose recorded specifier still matches the manifest.
fn pinned_root_dependencies(
    lockfile: &Lockfile,
    declared: &BTreeMap<String, String>,
) -> ResolvedDependencies {
    let Some(root) = lockfile.root_dependencies() else {
        return ResolvedDependencies::new();
    };

    root.iter()
        .filter(|(name, _)| {
            let recorded = lockfile.specifiers.get(*name);
            let wanted = declared.get(*name);
            recorded.is_some() && recorded == wanted
        })
        .map(|(name, reference)| (name.clone(), reference.clone()))
        .collect()
}
