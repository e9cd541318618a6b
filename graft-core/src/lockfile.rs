use crate::install::InstalledPackage;
use crate::registry::normalize_registry;
use crate::resolution::{self, Resolution};
use crate::{GraftError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

pub const LOCKFILE_VERSION: u32 = 3;
pub const ROOT_KEY: &str = "/";

/// Dependency name to reference, where a reference is either a bare version
/// or a short identifier.
pub type ResolvedDependencies = BTreeMap<String, String>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lockfile {
    #[serde(default = "default_version")]
    pub lockfile_version: u32,
    pub registry: String,
    #[serde(default)]
    pub specifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub packages: BTreeMap<String, LockfileEntry>,
}

fn default_version() -> u32 {
    LOCKFILE_VERSION
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LockfileEntry {
    /// Legacy form: only the tarball shasum was recorded.
    Shorthand(String),
    Record(DependencyShrinkwrap),
}

impl LockfileEntry {
    pub fn record(&self) -> Option<&DependencyShrinkwrap> {
        match self {
            LockfileEntry::Record(record) => Some(record),
            LockfileEntry::Shorthand(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyShrinkwrap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<LockResolution>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: ResolvedDependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: ResolvedDependencies,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LockResolution {
    Shasum(String),
    Record(ResolutionRecord),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResolutionRecord {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tarball: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Lockfile {
    pub fn new(registry: &str) -> Self {
        Lockfile {
            lockfile_version: LOCKFILE_VERSION,
            registry: normalize_registry(registry),
            specifiers: BTreeMap::new(),
            packages: BTreeMap::new(),
        }
    }

    pub fn root_dependencies(&self) -> Option<&ResolvedDependencies> {
        self.packages
            .get(ROOT_KEY)
            .and_then(LockfileEntry::record)
            .map(|root| &root.dependencies)
    }

    pub fn entry(&self, short_id: &str) -> Option<&LockfileEntry> {
        self.packages.get(short_id)
    }

    /// Replaces the recorded graph with the one an install run produced.
    ///
    /// `top_level` are the packages the root manifest asked for, along with
    /// the range each was declared with. `linked` are short ids the run left
    /// alone because they were already linked; their previous entries, and
    /// the edges pointing at them, are kept along with everything they reach.
    pub fn record_installation<'a>(
        &mut self,
        top_level: impl IntoIterator<Item = (&'a str, &'a str, &'a InstalledPackage)>,
        installs: &BTreeMap<String, InstalledPackage>,
        linked: &BTreeSet<String>,
    ) {
        let previous = std::mem::take(&mut self.packages);
        let registry = self.registry.clone();
        let mut specifiers = BTreeMap::new();
        let mut root = DependencyShrinkwrap::default();

        for (name, range, pkg) in top_level {
            specifiers.insert(name.to_string(), range.to_string());
            root.dependencies
                .insert(name.to_string(), resolution::reference_of(&pkg.id, name, &registry));
        }

        let mut packages = BTreeMap::new();
        packages.insert(ROOT_KEY.to_string(), LockfileEntry::Record(root));

        for pkg in installs.values() {
            let short_id = resolution::short_id_of(&pkg.id, &registry);
            let mut entry = entry_for(pkg, &short_id, installs, &registry);
            if let Some(old) = previous.get(&short_id).and_then(LockfileEntry::record) {
                keep_linked_edges(&mut entry, old, linked);
            }
            packages.insert(short_id, LockfileEntry::Record(entry));
        }

        let mut pending: Vec<String> = linked.iter().cloned().collect();
        while let Some(short_id) = pending.pop() {
            if packages.contains_key(&short_id) {
                continue;
            }
            let Some(entry) = previous.get(&short_id) else {
                continue;
            };
            if let Some(record) = entry.record() {
                let edges = record.dependencies.iter().chain(&record.optional_dependencies);
                pending.extend(
                    edges.map(|(name, reference)| resolution::pkg_short_id(reference, name)),
                );
            }
            packages.insert(short_id, entry.clone());
        }

        self.specifiers = specifiers;
        self.packages = packages;
    }
}

/// Copies edges of the previous entry that point into a linked subtree the
/// run did not resolve.
fn keep_linked_edges(
    entry: &mut DependencyShrinkwrap,
    previous: &DependencyShrinkwrap,
    linked: &BTreeSet<String>,
) {
    let is_linked =
        |name: &str, reference: &str| linked.contains(&resolution::pkg_short_id(reference, name));

    for (name, reference) in &previous.dependencies {
        if is_linked(name, reference) && !entry.optional_dependencies.contains_key(name) {
            entry.dependencies.entry(name.clone()).or_insert_with(|| reference.clone());
        }
    }
    for (name, reference) in &previous.optional_dependencies {
        if is_linked(name, reference) && !entry.dependencies.contains_key(name) {
            entry
                .optional_dependencies
                .entry(name.clone())
                .or_insert_with(|| reference.clone());
        }
    }
}

fn entry_for(
    pkg: &InstalledPackage,
    short_id: &str,
    installs: &BTreeMap<String, InstalledPackage>,
    registry: &str,
) -> DependencyShrinkwrap {
    let derived_id = resolution::pkg_id(short_id, pkg.name(), registry);
    let mut dependencies = BTreeMap::new();
    let mut optional_dependencies = BTreeMap::new();

    for dep_id in pkg.dependencies.iter() {
        let Some(dep) = installs.get(dep_id) else {
            continue;
        };

        let reference = resolution::reference_of(dep_id, dep.name(), registry);
        if pkg.manifest.optional_dependencies.contains_key(dep.name())
            && !pkg.manifest.dependencies.contains_key(dep.name())
        {
            optional_dependencies.insert(dep.name().to_string(), reference);
        } else {
            dependencies.insert(dep.name().to_string(), reference);
        }
    }

    DependencyShrinkwrap {
        id: (derived_id != pkg.id).then(|| pkg.id.clone()),
        resolution: Some(lock_resolution(&pkg.resolution, short_id, registry)),
        dependencies,
        optional_dependencies,
        dev: pkg.dev,
        optional: pkg.optional,
    }
}

/// Registry tarballs whose URL can be rebuilt from the short id are stored
/// without it.
fn lock_resolution(resolution: &Resolution, short_id: &str, registry: &str) -> LockResolution {
    match resolution {
        Resolution::Tarball(tarball) => {
            let derivable = resolution::split_short_id(short_id)
                .map(|(name, version)| resolution::registry_tarball_url(name, version, registry))
                .is_some_and(|url| url == tarball.tarball);

            LockResolution::Record(ResolutionRecord {
                kind: None,
                tarball: (!derivable).then(|| tarball.tarball.clone()),
                shasum: tarball.shasum.clone(),
                integrity: tarball.integrity.clone(),
                extra: BTreeMap::new(),
            })
        }
        Resolution::Source { kind, fields } => LockResolution::Record(ResolutionRecord {
            kind: Some(kind.clone()),
            extra: fields.clone(),
            ..Default::default()
        }),
    }
}

pub fn read(path: &Path) -> Result<Option<Lockfile>> {
    if !path.is_file() {
        return Ok(None);
    }

    let data = fs::read_to_string(path).map_err(|source| GraftError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let lockfile = serde_yaml::from_str(&data).map_err(|source| GraftError::LockfileRead {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Some(lockfile))
}

pub fn write(path: &Path, lockfile: &Lockfile) -> Result<()> {
    let data = serde_yaml::to_string(lockfile).map_err(|source| GraftError::LockfileWrite {
        path: path.to_path_buf(),
        source,
    })?;

    fs::write(path, data).map_err(|source| GraftError::WriteFile {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}
