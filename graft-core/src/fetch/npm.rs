use super::{
    FetchRequest, FetchedPackage, Fetcher, FetchingFiles, InFlightFetch, pending_manifest,
    ready_manifest,
};
use crate::manifest::PackageManifest;
use crate::registry::{self, RegistryPackage};
use crate::resolution::{Resolution, TarballResolution, encode_registry};
use crate::spec::SpecKind;
use crate::{GraftError, Result, store, version};
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::lock::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Fetches packages from npm-compatible registries and remote tarballs into
/// the content-addressable store.
pub struct RegistryFetcher {
    client: Client,
    metadata: Mutex<HashMap<String, Arc<RegistryPackage>>>,
}

impl RegistryFetcher {
    pub fn new(client: Client) -> Self {
        RegistryFetcher {
            client,
            metadata: Mutex::new(HashMap::new()),
        }
    }

    async fn package_metadata(
        &self,
        registry: &str,
        name: &str,
        offline: bool,
    ) -> Result<Arc<RegistryPackage>> {
        let key = format!("{registry}{name}");

        if let Some(cached) = self.metadata.lock().await.get(&key) {
            return Ok(cached.clone());
        }

        if offline {
            return Err(GraftError::Offline {
                name: name.to_string(),
            });
        }

        let fetched = Arc::new(registry::fetch_package(&self.client, registry, name).await?);
        let mut cache = self.metadata.lock().await;
        Ok(cache.entry(key).or_insert(fetched).clone())
    }

    fn start(
        &self,
        id: &str,
        resolution: &Resolution,
        pkg_dir: PathBuf,
        manifest: Option<Arc<PackageManifest>>,
        offline: bool,
    ) -> InFlightFetch {
        let files = match resolution {
            Resolution::Tarball(tarball) => {
                let handle = tokio::spawn(store::ensure_package(
                    self.client.clone(),
                    id.to_string(),
                    tarball.clone(),
                    pkg_dir.clone(),
                    offline,
                ));

                FetchingFiles::new(async move {
                    handle.await.map_err(|error| GraftError::StoreTask {
                        reason: error.to_string(),
                    })?
                })
            }
            Resolution::Source { kind, .. } => {
                let reason = format!("{kind} resolutions cannot be fetched");
                let raw = id.to_string();
                FetchingFiles::new(async move {
                    Err(GraftError::UnsupportedSpecifier { raw, reason })
                })
            }
        };

        let manifest = match manifest {
            Some(manifest) => ready_manifest(manifest),
            None => {
                let files = files.clone();
                pending_manifest(async move {
                    files.wait().await?;
                    store::read_manifest(&pkg_dir).await
                })
            }
        };

        InFlightFetch { manifest, files }
    }

    async fn fetch_package(&self, request: FetchRequest<'_>) -> Result<FetchedPackage> {
        let spec = request.spec;

        if !request.update
            && let (Some(id), Some(resolution)) = (request.pkg_id, request.lockfile_resolution)
        {
            debug!(id, spec = %spec.raw, "using lockfile resolution");
            return Ok(self
                .materialize(&request, id.to_string(), resolution.clone(), None)
                .await);
        }

        match spec.kind {
            SpecKind::Version | SpecKind::Range | SpecKind::Tag => {
                let package = self
                    .package_metadata(request.registry, &spec.name, request.offline)
                    .await?;
                let selected = version::select_version(&spec.name, &spec.fetch_spec, &package)?;
                let id = format!(
                    "{}/{}/{}",
                    encode_registry(request.registry),
                    spec.name,
                    selected.manifest.version_or_default()
                );
                let resolution = Resolution::Tarball(TarballResolution {
                    tarball: selected.dist.tarball.clone(),
                    shasum: selected.dist.shasum.clone(),
                    integrity: selected.dist.integrity.clone(),
                });
                let manifest = Arc::new(selected.manifest.clone());

                Ok(self
                    .materialize(&request, id, resolution, Some(manifest))
                    .await)
            }
            SpecKind::Remote => {
                let url = spec.fetch_spec.as_str();
                let id = url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .to_string();
                let resolution = Resolution::Tarball(TarballResolution {
                    tarball: url.to_string(),
                    shasum: None,
                    integrity: None,
                });

                Ok(self.materialize(&request, id, resolution, None).await)
            }
            SpecKind::Git | SpecKind::Directory => Err(GraftError::UnsupportedSpecifier {
                raw: spec.raw.clone(),
                reason: "only registry and tarball dependencies can be fetched".to_string(),
            }),
        }
    }

    async fn materialize(
        &self,
        request: &FetchRequest<'_>,
        id: String,
        resolution: Resolution,
        manifest: Option<Arc<PackageManifest>>,
    ) -> FetchedPackage {
        let path = store::package_dir(request.store_path, &id);
        let inflight = request
            .locker
            .get_or_start(&id, || {
                self.start(&id, &resolution, path.clone(), manifest, request.offline)
            })
            .await;

        FetchedPackage {
            id,
            resolution,
            path,
            manifest: inflight.manifest,
            fetching_files: inflight.files,
        }
    }
}

impl Fetcher for RegistryFetcher {
    fn fetch<'a>(&'a self, request: FetchRequest<'a>) -> BoxFuture<'a, Result<FetchedPackage>> {
        self.fetch_package(request).boxed()
    }
}
