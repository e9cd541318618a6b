use super::{InstallationContext, InstalledPackage};
use crate::fetch::{FetchRequest, FetchedPackage, Fetcher, shared_error};
use crate::installability::{InstallabilityChecker, InstallabilityOptions, PlatformChecker};
use crate::lockfile::ResolvedDependencies;
use crate::manifest::PackageManifest;
use crate::registry::normalize_registry;
use crate::resolution::{LockfileHint, pkg_short_id, resolve_identity};
use crate::spec::{DependencySpecExpander, ExpandContext, ManifestSpecExpander, PackageSpecifier};
use crate::status::{InstallStatus, StatusSink, TracingStatusSink};
use crate::Result;
use async_recursion::async_recursion;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Per-level options of the recursive installer. Children get a copy with
/// their own keypath, lockfile edges and inherited installability.
#[derive(Clone, Debug)]
pub struct InstallerOptions {
    pub registry: String,
    pub scoped_registries: Arc<BTreeMap<String, String>>,
    pub store_path: PathBuf,
    pub node_modules: PathBuf,
    /// Levels below this one are not re-resolved when already linked.
    pub depth: usize,
    /// Identities of the ancestors, root first.
    pub keypath: Vec<String>,
    pub force: bool,
    pub update: bool,
    pub offline: bool,
    pub engine_strict: bool,
    pub node_version: Option<String>,
    pub installable: bool,
    /// Lockfile edges of the parent, name to reference.
    pub resolved_dependencies: Option<ResolvedDependencies>,
}

impl InstallerOptions {
    pub fn new(
        registry: impl Into<String>,
        store_path: impl Into<PathBuf>,
        node_modules: impl Into<PathBuf>,
    ) -> Self {
        InstallerOptions {
            registry: registry.into(),
            scoped_registries: Arc::new(BTreeMap::new()),
            store_path: store_path.into(),
            node_modules: node_modules.into(),
            depth: 0,
            keypath: Vec::new(),
            force: false,
            update: false,
            offline: false,
            engine_strict: false,
            node_version: None,
            installable: true,
            resolved_dependencies: None,
        }
    }

    /// Scope override or the default registry, always ending in `/`.
    pub fn registry_for(&self, spec: &PackageSpecifier) -> String {
        let registry = spec
            .scope
            .as_deref()
            .and_then(|scope| self.scoped_registries.get(scope))
            .unwrap_or(&self.registry);

        normalize_registry(registry)
    }

    fn child(
        &self,
        parent_id: &str,
        resolved_dependencies: Option<ResolvedDependencies>,
        installable: bool,
    ) -> Self {
        let mut keypath = self.keypath.clone();
        keypath.push(parent_id.to_string());

        InstallerOptions {
            keypath,
            resolved_dependencies,
            installable,
            ..self.clone()
        }
    }
}

/// Resolves dependency trees concurrently against one [`InstallationContext`].
pub struct Installer {
    fetcher: Arc<dyn Fetcher>,
    checker: Arc<dyn InstallabilityChecker>,
    expander: Arc<dyn DependencySpecExpander>,
    status: Arc<dyn StatusSink>,
}

impl Installer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Installer {
            fetcher,
            checker: Arc::new(PlatformChecker::default()),
            expander: Arc::new(ManifestSpecExpander),
            status: Arc::new(TracingStatusSink),
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn InstallabilityChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn DependencySpecExpander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    /// Installs every specifier concurrently and returns the ones that were
    /// not short-circuited, in input order. The first error aborts the batch.
    #[async_recursion]
    pub async fn install_multiple(
        &self,
        ctx: &InstallationContext,
        specs: Vec<PackageSpecifier>,
        options: &InstallerOptions,
    ) -> Result<Vec<InstalledPackage>> {
        let resolved = options.resolved_dependencies.clone().unwrap_or_default();
        let resolved = &resolved;

        let tasks = specs.iter().map(|spec| async move {
            let hint = match resolved.get(&spec.name) {
                Some(reference) => {
                    let short_id = pkg_short_id(reference, &spec.name);
                    Some(resolve_identity(
                        reference,
                        ctx.lockfile.entry(&short_id),
                        &spec.name,
                        &ctx.lockfile.registry,
                        &options.registry,
                    )?)
                }
                None => None,
            };

            self.install(ctx, spec, hint, options).await
        });

        let installed = try_join_all(tasks).await?;
        Ok(installed.into_iter().flatten().collect())
    }

    async fn install(
        &self,
        ctx: &InstallationContext,
        spec: &PackageSpecifier,
        hint: Option<LockfileHint>,
        options: &InstallerOptions,
    ) -> Result<Option<InstalledPackage>> {
        let within_depth = options.force || options.keypath.len() <= options.depth;

        if !within_depth
            && let Some(hint) = &hint
            && is_linked(options, &hint.id).await
        {
            debug!(id = %hint.id, spec = %spec.raw, "already linked, skipping");
            ctx.mark_linked(&hint.short_id).await;
            return Ok(None);
        }

        let registry = options.registry_for(spec);
        let dependent_id = options.keypath.last().cloned();

        self.status.emit(&InstallStatus::Installing {
            raw_spec: spec.raw.clone(),
            name: spec.name.clone(),
            dependent_id,
        });

        let fetched = self
            .fetcher
            .fetch(FetchRequest {
                spec,
                pkg_id: hint.as_ref().map(|hint| hint.id.as_str()),
                lockfile_resolution: hint.as_ref().and_then(|hint| hint.resolution.as_ref()),
                locker: &ctx.fetch_locker,
                registry: &registry,
                store_path: &options.store_path,
                offline: options.offline,
                update: options.update,
            })
            .await?;

        let manifest = fetched.manifest.clone().await.map_err(shared_error)?;

        self.status.emit(&InstallStatus::DownloadedManifest {
            id: fetched.id.clone(),
            version: manifest.version_or_default().to_string(),
        });

        let installable = options.installable
            && (options.force
                || self.checker.check(
                    &fetched.id,
                    &manifest,
                    InstallabilityOptions {
                        optional: spec.optional,
                        engine_strict: options.engine_strict,
                        node_version: options.node_version.as_deref(),
                    },
                )?);

        if !installable {
            ctx.mark_skipped(&fetched.id).await;
        }

        let mut dependencies = Vec::new();
        if ctx.mark_visited(&fetched.id).await {
            let children = self
                .install_dependencies(
                    ctx,
                    &fetched,
                    &manifest,
                    hint.and_then(|hint| hint.dependencies),
                    installable,
                    options,
                )
                .await?;
            dependencies = children.into_iter().map(|child| child.id).collect();
        } else {
            debug!(id = %fetched.id, "already being resolved");
        }

        if installable {
            ctx.mark_ready(&fetched.id).await;
        }

        let installed = ctx
            .merge_installed(InstalledPackage {
                id: fetched.id.clone(),
                name: spec.name.clone(),
                resolution: fetched.resolution,
                manifest,
                dev: spec.dev,
                optional: spec.optional,
                dependencies,
                fetching_files: fetched.fetching_files,
                path: fetched.path,
                spec_raw: spec.raw.clone(),
            })
            .await;

        self.status.emit(&InstallStatus::DependenciesInstalled {
            id: installed.id.clone(),
        });

        Ok(Some(installed))
    }

    async fn install_dependencies(
        &self,
        ctx: &InstallationContext,
        fetched: &FetchedPackage,
        manifest: &PackageManifest,
        resolved_dependencies: Option<ResolvedDependencies>,
        installable: bool,
        options: &InstallerOptions,
    ) -> Result<Vec<InstalledPackage>> {
        let dependencies = manifest.installable_dependencies();
        if dependencies.is_empty() {
            return Ok(Vec::new());
        }

        let specs = self.expander.expand(
            &dependencies,
            ExpandContext {
                where_: &fetched.path,
                dev_dependencies: &manifest.dev_dependencies,
                optional_dependencies: &manifest.optional_dependencies,
            },
        )?;

        let child_options = options.child(&fetched.id, resolved_dependencies, installable);
        self.install_multiple(ctx, specs, &child_options).await
    }
}

/// Presence of `node_modules/.<id>` means a previous run linked `id`.
async fn is_linked(options: &InstallerOptions, id: &str) -> bool {
    let marker = options.node_modules.join(format!(".{id}"));
    tokio::fs::try_exists(&marker).await.unwrap_or(false)
}
