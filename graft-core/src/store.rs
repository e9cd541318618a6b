use crate::manifest::PackageManifest;
use crate::resolution::TarballResolution;
use crate::{GraftError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use reqwest::Client;
use sha1::Sha1;
use sha2::{Digest, Sha512};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tar::Archive;
use tracing::debug;

pub const COMPLETE_MARKER: &str = ".graft_complete";

/// Where the files of `id` live inside the store.
pub fn package_dir(store_path: &Path, id: &str) -> PathBuf {
    let mut dir = store_path.to_path_buf();
    for segment in id.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..") {
        dir.push(segment.replace(':', "+"));
    }
    dir
}

pub fn is_complete(pkg_dir: &Path) -> bool {
    pkg_dir.join(COMPLETE_MARKER).is_file()
}

/// Tarballs usually wrap their contents in a `package/` directory.
pub fn package_root_dir(pkg_dir: &Path) -> PathBuf {
    let candidate = pkg_dir.join("package");
    if candidate.is_dir() {
        candidate
    } else {
        pkg_dir.to_path_buf()
    }
}

pub async fn ensure_package(
    client: Client,
    id: String,
    tarball: TarballResolution,
    pkg_dir: PathBuf,
    offline: bool,
) -> Result<()> {
    if is_complete(&pkg_dir) {
        debug!(id = %id, dir = %pkg_dir.display(), "store hit");
        return Ok(());
    }

    if offline {
        return Err(GraftError::Offline { name: id });
    }

    let started = Instant::now();
    let bytes = download_tarball(&client, &tarball.tarball).await?;
    verify(&id, &bytes, &tarball)?;

    debug!(
        id = %id,
        bytes = bytes.len(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "downloaded tarball"
    );

    let target = pkg_dir.clone();
    tokio::task::spawn_blocking(move || unpack_tarball(&target, bytes))
        .await
        .map_err(|error| GraftError::StoreTask {
            reason: error.to_string(),
        })??;

    let marker = pkg_dir.join(COMPLETE_MARKER);
    fs::write(&marker, b"").map_err(|source| GraftError::WriteFile {
        path: marker.clone(),
        source,
    })?;

    debug!(id = %id, dir = %pkg_dir.display(), "stored package");
    Ok(())
}

async fn download_tarball(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| GraftError::Http {
            url: url.to_string(),
            source,
        })?;

    let bytes = response
        .error_for_status()
        .map_err(|source| GraftError::Http {
            url: url.to_string(),
            source,
        })?
        .bytes()
        .await
        .map_err(|source| GraftError::Http {
            url: url.to_string(),
            source,
        })?;

    Ok(bytes.to_vec())
}

/// Checks `bytes` against the strongest checksum the resolution carries.
/// Subresource-integrity strings win over a bare sha1 shasum.
pub fn verify(id: &str, bytes: &[u8], tarball: &TarballResolution) -> Result<()> {
    if let Some(integrity) = tarball.integrity.as_deref() {
        let (algorithm, expected) = integrity.split_once('-').unwrap_or(("", integrity));
        let actual = match algorithm {
            "sha512" => STANDARD.encode(Sha512::digest(bytes)),
            "sha1" => STANDARD.encode(Sha1::digest(bytes)),
            _ => {
                return Err(GraftError::Integrity {
                    id: id.to_string(),
                    expected: integrity.to_string(),
                    actual: format!("unsupported algorithm {algorithm:?}"),
                });
            }
        };

        return if actual == expected {
            Ok(())
        } else {
            Err(GraftError::Integrity {
                id: id.to_string(),
                expected: integrity.to_string(),
                actual: format!("{algorithm}-{actual}"),
            })
        };
    }

    if let Some(shasum) = tarball.shasum.as_deref() {
        let actual = hex::encode(Sha1::digest(bytes));
        if !actual.eq_ignore_ascii_case(shasum) {
            return Err(GraftError::Integrity {
                id: id.to_string(),
                expected: shasum.to_string(),
                actual,
            });
        }
    }

    Ok(())
}

fn unpack_tarball(pkg_dir: &Path, data: Vec<u8>) -> Result<()> {
    fs::create_dir_all(pkg_dir).map_err(|source| GraftError::WriteFile {
        path: pkg_dir.to_path_buf(),
        source,
    })?;

    let decoder = GzDecoder::new(Cursor::new(data));
    let mut archive = Archive::new(decoder);

    archive.unpack(pkg_dir).map_err(|source| GraftError::Archive {
        path: pkg_dir.to_path_buf(),
        source,
    })?;

    Ok(())
}

pub async fn read_manifest(pkg_dir: &Path) -> Result<Arc<PackageManifest>> {
    let path = package_root_dir(pkg_dir).join("package.json");
    let data = tokio::fs::read(&path)
        .await
        .map_err(|source| GraftError::ReadFile {
            path: path.clone(),
            source,
        })?;

    let manifest =
        serde_json::from_slice(&data).map_err(|source| GraftError::ParseJson { path, source })?;

    Ok(Arc::new(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn resolution(shasum: Option<String>, integrity: Option<String>) -> TarballResolution {
        TarballResolution {
            tarball: "https://registry.npmjs.org/a/-/a-1.0.0.tgz".into(),
            shasum,
            integrity,
        }
    }

    #[test]
    fn verifies_shasum_and_integrity() {
        let bytes = b"package bytes";
        let shasum = hex::encode(Sha1::digest(bytes));
        let integrity = format!("sha512-{}", STANDARD.encode(Sha512::digest(bytes)));

        assert!(verify("a", bytes, &resolution(Some(shasum.clone()), None)).is_ok());
        assert!(verify("a", bytes, &resolution(None, Some(integrity))).is_ok());
        assert!(verify("a", b"tampered", &resolution(Some(shasum), None)).is_err());
        assert!(verify("a", bytes, &resolution(None, None)).is_ok());
    }

    #[test]
    fn identities_map_to_nested_store_directories() {
        let dir = package_dir(Path::new("/store"), "localhost+4873/@scope/pkg/1.0.0");
        assert_eq!(dir, Path::new("/store/localhost+4873/@scope/pkg/1.0.0"));

        let escaped = package_dir(Path::new("/store"), "../../etc/passwd");
        assert_eq!(escaped, Path::new("/store/etc/passwd"));
    }

    #[tokio::test]
    async fn unpacks_and_reads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("a");
        let data = tarball(&[(
            "package/package.json",
            r#"{ "name": "a", "version": "1.0.0", "dependencies": { "b": "^2.0.0" } }"#,
        )]);

        unpack_tarball(&pkg_dir, data).unwrap();
        let manifest = read_manifest(&pkg_dir).await.unwrap();

        assert_eq!(manifest.name.as_deref(), Some("a"));
        assert_eq!(manifest.dependencies["b"], "^2.0.0");
    }

    #[tokio::test]
    async fn complete_packages_are_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(COMPLETE_MARKER), b"").unwrap();

        let result = ensure_package(
            Client::new(),
            "registry.npmjs.org/a/1.0.0".into(),
            resolution(None, None),
            dir.path().to_path_buf(),
            true,
        )
        .await;

        assert!(result.is_ok());
    }
}
