pub mod npm;

pub use npm::RegistryFetcher;

use crate::manifest::PackageManifest;
use crate::resolution::Resolution;
use crate::spec::PackageSpecifier;
use crate::{GraftError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::lock::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type SharedResult<T> = std::result::Result<T, Arc<GraftError>>;

/// A manifest that may still be on its way; cloneable so every requester of
/// the same identity awaits the same fetch.
pub type PendingManifest = Shared<BoxFuture<'static, SharedResult<Arc<PackageManifest>>>>;

pub fn shared_error(err: Arc<GraftError>) -> GraftError {
    GraftError::Shared(err.to_string())
}

pub fn pending_manifest<F>(future: F) -> PendingManifest
where
    F: Future<Output = Result<Arc<PackageManifest>>> + Send + 'static,
{
    future.map(|result| result.map_err(Arc::new)).boxed().shared()
}

pub fn ready_manifest(manifest: Arc<PackageManifest>) -> PendingManifest {
    pending_manifest(async move { Ok(manifest) })
}

/// Handle on files being written into the store. Only linking needs to wait
/// on it.
#[derive(Clone)]
pub struct FetchingFiles(Shared<BoxFuture<'static, SharedResult<()>>>);

impl FetchingFiles {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        FetchingFiles(future.map(|result| result.map_err(Arc::new)).boxed().shared())
    }

    pub fn ready() -> Self {
        FetchingFiles::new(async { Ok(()) })
    }

    pub async fn wait(&self) -> Result<()> {
        self.0.clone().await.map_err(shared_error)
    }

    pub fn is_done(&self) -> bool {
        self.0.peek().is_some()
    }
}

impl fmt::Debug for FetchingFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchingFiles")
            .field("done", &self.is_done())
            .finish()
    }
}

#[derive(Clone)]
pub struct InFlightFetch {
    pub manifest: PendingManifest,
    pub files: FetchingFiles,
}

/// Deduplicates fetches by identity: the first requester starts the work,
/// everyone else gets a clone of its handles.
#[derive(Default)]
pub struct FetchLocker {
    inflight: Mutex<HashMap<String, InFlightFetch>>,
}

impl FetchLocker {
    pub async fn get_or_start<F>(&self, id: &str, start: F) -> InFlightFetch
    where
        F: FnOnce() -> InFlightFetch,
    {
        let mut inflight = self.inflight.lock().await;
        inflight.entry(id.to_string()).or_insert_with(start).clone()
    }

    pub async fn started(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

pub struct FetchRequest<'a> {
    pub spec: &'a PackageSpecifier,
    /// Identity derived from the lockfile, if the parent had an entry.
    pub pkg_id: Option<&'a str>,
    pub lockfile_resolution: Option<&'a Resolution>,
    pub locker: &'a FetchLocker,
    pub registry: &'a str,
    pub store_path: &'a Path,
    pub offline: bool,
    pub update: bool,
}

pub struct FetchedPackage {
    pub id: String,
    pub resolution: Resolution,
    pub path: PathBuf,
    pub manifest: PendingManifest,
    pub fetching_files: FetchingFiles,
}

/// Resolves a specifier to a concrete package and starts materializing it.
///
/// Implementations return as soon as the identity is known; the manifest
/// and files arrive through the returned handles.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, request: FetchRequest<'a>) -> BoxFuture<'a, Result<FetchedPackage>>;
}
