use crate::manifest::PackageManifest;
use crate::{GraftError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const LOCKFILE_NAME: &str = "graft-lock.yaml";

#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: PackageManifest,
}

impl Project {
    pub fn discover(start: &Path) -> Result<Self> {
        let mut current = Some(start);

        while let Some(dir) = current {
            let candidate = dir.join("package.json");
            if candidate.is_file() {
                return Self::from_manifest_path(candidate);
            }
            current = dir.parent();
        }

        Err(GraftError::ManifestMissing {
            path: start.to_path_buf(),
        })
    }

    pub fn from_manifest_path(path: PathBuf) -> Result<Self> {
        let data = fs::read_to_string(&path).map_err(|source| GraftError::ReadFile {
            path: path.clone(),
            source,
        })?;

        let manifest: PackageManifest =
            serde_json::from_str(&data).map_err(|source| GraftError::ParseJson {
                path: path.clone(),
                source,
            })?;

        let root =
            path.parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| GraftError::ManifestInvalid {
                    path: path.clone(),
                    reason: "manifest has no parent directory".into(),
                })?;

        Ok(Project {
            root,
            manifest_path: path,
            manifest,
        })
    }

    pub fn node_modules(&self) -> PathBuf {
        self.root.join("node_modules")
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.root.join(LOCKFILE_NAME)
    }
}
