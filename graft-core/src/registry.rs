use crate::manifest::PackageManifest;
use crate::{GraftError, Result};
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegistryPackage {
    pub versions: BTreeMap<String, RegistryVersion>,
    #[serde(default, rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegistryVersion {
    #[serde(flatten)]
    pub manifest: PackageManifest,
    pub dist: RegistryDist,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegistryDist {
    pub tarball: String,
    #[serde(default)]
    pub shasum: Option<String>,
    #[serde(default)]
    pub integrity: Option<String>,
}

pub fn normalize_registry(registry: &str) -> String {
    if registry.ends_with('/') {
        registry.to_string()
    } else {
        format!("{registry}/")
    }
}

pub fn encode_package_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}

pub async fn fetch_package(client: &Client, registry: &str, name: &str) -> Result<RegistryPackage> {
    let url = format!("{}{}", normalize_registry(registry), encode_package_name(name));
    let started = Instant::now();

    let response = client
        .get(&url)
        .header(
            ACCEPT,
            HeaderValue::from_static(
                "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8, */*",
            ),
        )
        .send()
        .await
        .map_err(|source| GraftError::Http {
            url: url.clone(),
            source,
        })?;

    let status = response.status();
    debug!(name, status = status.as_u16(), url = %url, "registry response");

    let body = response
        .error_for_status()
        .map_err(|source| GraftError::Http {
            url: url.clone(),
            source,
        })?
        .bytes()
        .await
        .map_err(|source| GraftError::Http {
            url: url.clone(),
            source,
        })?;

    let package: RegistryPackage =
        serde_json::from_slice(&body).map_err(|source| GraftError::RegistryDecode {
            name: name.to_string(),
            source,
        })?;

    debug!(
        name,
        versions = package.versions.len(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "registry metadata decoded"
    );

    Ok(package)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_names_escape_the_separator() {
        assert_eq!(encode_package_name("@types/node"), "@types%2Fnode");
        assert_eq!(encode_package_name("left-pad"), "left-pad");
    }

    #[test]
    fn registry_urls_gain_a_trailing_slash() {
        assert_eq!(
            normalize_registry("https://registry.npmjs.org"),
            "https://registry.npmjs.org/"
        );
        assert_eq!(
            normalize_registry("https://npm.example.com/private/"),
            "https://npm.example.com/private/"
        );
    }

    #[test]
    fn version_documents_decode_into_manifests() {
        let json = r#"{
            "versions": {
                "1.3.0": {
                    "name": "left-pad",
                    "version": "1.3.0",
                    "engines": { "node": ">=0.10" },
                    "dist": {
                        "tarball": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz",
                        "shasum": "5b8a3a7765dfe001261dde915589e782f8c94d1e"
                    }
                }
            },
            "dist-tags": { "latest": "1.3.0" }
        }"#;

        let package: RegistryPackage = serde_json::from_str(json).unwrap();
        let version = &package.versions["1.3.0"];

        assert_eq!(version.manifest.name.as_deref(), Some("left-pad"));
        assert_eq!(
            version.manifest.engines.get("node").map(String::as_str),
            Some(">=0.10")
        );
        assert_eq!(
            version.dist.shasum.as_deref(),
            Some("5b8a3a7765dfe001261dde915589e782f8c94d1e")
        );
        assert_eq!(package.dist_tags["latest"], "1.3.0");
    }
}
