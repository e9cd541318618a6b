pub mod context;
pub mod installer;


pub use context::{InstallOutcome, InstallationContext};
pub use installer::{Installer, InstallerOptions};

use crate::fetch::FetchingFiles;
use crate::manifest::PackageManifest;
use crate::resolution::Resolution;
use std::path::PathBuf;
use std::sync::Arc;

/// One node of the resolved graph.
#[derive(Clone, Debug)]
pub struct InstalledPackage {
    pub id: String,
    pub name: String,
    pub resolution: Resolution,
    pub manifest: Arc<PackageManifest>,
    pub dev: bool,
    pub optional: bool,
    /// Identities of the dependencies this package resolved to.
    pub dependencies: Vec<String>,
    pub fetching_files: FetchingFiles,
    pub path: PathBuf,
    pub spec_raw: String,
}

impl InstalledPackage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        self.manifest.version_or_default()
    }
}
