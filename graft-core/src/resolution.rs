//! Deriving package identities and resolutions from lockfile hints.
//!
//! Everything here is pure: the installer calls [`resolve_identity`] before
//! handing a specifier to the fetcher, and the lockfile writer uses the
//! inverse helpers ([`short_id_of`], [`reference_of`]) to store identities
//! in their abbreviated form.

use crate::lockfile::{DependencyShrinkwrap, LockResolution, LockfileEntry, ResolvedDependencies};
use crate::registry::normalize_registry;
use crate::{GraftError, Result};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Tarball(TarballResolution),
    /// Anything that is not a plain tarball (git commits, local
    /// directories, ...). The fields are kept as found.
    Source {
        kind: String,
        fields: BTreeMap<String, serde_yaml::Value>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TarballResolution {
    pub tarball: String,
    pub shasum: Option<String>,
    pub integrity: Option<String>,
}

impl Resolution {
    pub fn tarball(&self) -> Option<&TarballResolution> {
        match self {
            Resolution::Tarball(tarball) => Some(tarball),
            Resolution::Source { .. } => None,
        }
    }
}

/// What a lockfile knows about one dependency edge before anything is
/// fetched.
#[derive(Clone, Debug, PartialEq)]
pub struct LockfileHint {
    pub id: String,
    pub short_id: String,
    pub resolution: Option<Resolution>,
    pub dependencies: Option<ResolvedDependencies>,
}

/// Encodes a registry URL the way identities embed it: the host (with any
/// non-default port) and `:` replaced by `+`.
pub fn encode_registry(registry: &str) -> String {
    let trimmed = registry.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .or_else(|| trimmed.strip_prefix("//"))
        .unwrap_or(trimmed);

    let host = without_scheme.split('/').next().unwrap_or("").to_ascii_lowercase();
    let host = host
        .strip_suffix(":443")
        .filter(|_| trimmed.starts_with("https://"))
        .or_else(|| {
            host.strip_suffix(":80")
                .filter(|_| trimmed.starts_with("http://"))
        })
        .unwrap_or(&host);

    host.replace(':', "+")
}

/// Short identifier of a dependency reference: bare versions become
/// `/<name>/<version>`, anything with a `/` already is one.
pub fn pkg_short_id(reference: &str, name: &str) -> String {
    if reference.contains('/') {
        reference.to_string()
    } else {
        format!("/{name}/{reference}")
    }
}

/// Full identity of a dependency reference within `registry`.
pub fn pkg_id(reference: &str, name: &str, registry: &str) -> String {
    if !reference.contains('/') {
        return format!("{}/{}/{}", encode_registry(registry), name, reference);
    }

    if reference.starts_with('/') {
        return format!("{}{}", encode_registry(registry), reference);
    }

    reference.to_string()
}

/// Inverse of [`pkg_id`] for a `/`-prefixed reference.
pub fn short_id_of(id: &str, registry: &str) -> String {
    let encoded = encode_registry(registry);

    match id.strip_prefix(&encoded) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => id.to_string(),
    }
}

/// The reference stored on a dependency edge: the bare version when the
/// short id is `/<name>/<version>`, otherwise the short id itself.
pub fn reference_of(id: &str, name: &str, registry: &str) -> String {
    let short_id = short_id_of(id, registry);
    let prefix = format!("/{name}/");

    match short_id.strip_prefix(&prefix) {
        Some(version) if !version.is_empty() && !version.contains('/') => version.to_string(),
        _ => short_id,
    }
}

/// Splits `/<name>/<version>` at its last `/`. Scoped names keep their
/// inner slash.
pub fn split_short_id(short_id: &str) -> Option<(&str, &str)> {
    let unprefixed = short_id.strip_prefix('/').unwrap_or(short_id);
    let divide_at = unprefixed.rfind('/')?;
    let (name, version) = (&unprefixed[..divide_at], &unprefixed[divide_at + 1..]);

    if name.is_empty() || version.is_empty() {
        None
    } else {
        Some((name, version))
    }
}

pub fn registry_tarball_url(name: &str, version: &str, registry: &str) -> String {
    let unscoped = match name.split_once('/') {
        Some((scope, rest)) if scope.starts_with('@') => rest,
        _ => name,
    };

    format!(
        "{}{}/-/{}-{}.tgz",
        normalize_registry(registry),
        name,
        unscoped,
        version
    )
}

fn synthesized_tarball(short_id: &str, registry: &str) -> Result<String> {
    let (name, version) =
        split_short_id(short_id).ok_or_else(|| GraftError::MalformedLockfileEntry {
            short_id: short_id.to_string(),
            reason: "cannot derive a tarball URL: expected /<name>/<version>".to_string(),
        })?;

    Ok(registry_tarball_url(name, version, registry))
}

/// Normalizes a stored entry into a canonical [`Resolution`], upgrading
/// legacy checksum-only forms and completing registry tarball URLs.
pub fn entry_to_resolution(
    short_id: &str,
    entry: &LockfileEntry,
    registry: &str,
) -> Result<Resolution> {
    let record = match entry {
        LockfileEntry::Shorthand(shasum) => {
            return shasum_resolution(short_id, shasum, registry);
        }
        LockfileEntry::Record(record) => record,
    };

    let resolution = record.resolution.as_ref().ok_or_else(|| {
        GraftError::MalformedLockfileEntry {
            short_id: short_id.to_string(),
            reason: "entry has no resolution".to_string(),
        }
    })?;

    let full = match resolution {
        LockResolution::Shasum(shasum) => return shasum_resolution(short_id, shasum, registry),
        LockResolution::Record(full) => full,
    };

    match (&full.kind, &full.tarball) {
        (None, Some(tarball)) => Ok(Resolution::Tarball(TarballResolution {
            tarball: tarball.clone(),
            shasum: full.shasum.clone(),
            integrity: full.integrity.clone(),
        })),
        (None, None) => Ok(Resolution::Tarball(TarballResolution {
            tarball: synthesized_tarball(short_id, registry)?,
            shasum: full.shasum.clone(),
            integrity: full.integrity.clone(),
        })),
        (Some(kind), _) => {
            let mut fields = full.extra.clone();
            if let Some(tarball) = &full.tarball {
                fields.insert("tarball".into(), tarball.clone().into());
            }
            if let Some(integrity) = &full.integrity {
                fields.insert("integrity".into(), integrity.clone().into());
            }

            if fields.is_empty() {
                return Err(GraftError::MalformedLockfileEntry {
                    short_id: short_id.to_string(),
                    reason: format!("{kind} resolution carries no fields"),
                });
            }

            Ok(Resolution::Source {
                kind: kind.clone(),
                fields,
            })
        }
    }
}

fn shasum_resolution(short_id: &str, shasum: &str, registry: &str) -> Result<Resolution> {
    Ok(Resolution::Tarball(TarballResolution {
        tarball: synthesized_tarball(short_id, registry)?,
        shasum: Some(shasum.to_string()),
        integrity: None,
    }))
}

/// Derives the candidate identity, resolution and child edges for a
/// dependency `spec_name` referenced as `reference` by its parent.
///
/// `lockfile_registry` is the registry identities in the lockfile were
/// recorded against; `registry` is the one tarball URLs are rebuilt for.
pub fn resolve_identity(
    reference: &str,
    entry: Option<&LockfileEntry>,
    spec_name: &str,
    lockfile_registry: &str,
    registry: &str,
) -> Result<LockfileHint> {
    let short_id = pkg_short_id(reference, spec_name);
    let record = entry.and_then(LockfileEntry::record);

    let id = record
        .and_then(|record| record.id.clone())
        .unwrap_or_else(|| pkg_id(reference, spec_name, lockfile_registry));

    let resolution = entry
        .map(|entry| entry_to_resolution(&short_id, entry, registry))
        .transpose()?;

    Ok(LockfileHint {
        id,
        short_id,
        resolution,
        dependencies: record.map(|record: &DependencyShrinkwrap| record.dependencies.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::ResolutionRecord;

    const NPM: &str = "https://registry.npmjs.org/";

    fn record(resolution: Option<LockResolution>) -> LockfileEntry {
        LockfileEntry::Record(DependencyShrinkwrap {
            resolution,
            ..Default::default()
        })
    }

    #[test]
    fn legacy_shorthand_builds_registry_tarball() {
        let entry = LockfileEntry::Shorthand("5b8a3a7765dfe001261dde915589e782f8c94d1e".into());

        let resolution = entry_to_resolution("/left-pad/1.3.0", &entry, NPM).unwrap();

        assert_eq!(
            resolution,
            Resolution::Tarball(TarballResolution {
                tarball: "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz".into(),
                shasum: Some("5b8a3a7765dfe001261dde915589e782f8c94d1e".into()),
                integrity: None,
            })
        );
    }

    #[test]
    fn string_resolution_is_treated_as_shasum() {
        let entry = record(Some(LockResolution::Shasum("abc".into())));

        let resolution = entry_to_resolution("/@types/node/20.1.0", &entry, NPM).unwrap();
        let tarball = resolution.tarball().unwrap();

        assert_eq!(
            tarball.tarball,
            "https://registry.npmjs.org/@types/node/-/node-20.1.0.tgz"
        );
        assert_eq!(tarball.shasum.as_deref(), Some("abc"));
    }

    #[test]
    fn untyped_record_without_tarball_is_completed() {
        let entry = record(Some(LockResolution::Record(ResolutionRecord {
            integrity: Some("sha512-xyz".into()),
            ..Default::default()
        })));

        let resolution = entry_to_resolution("/ms/2.1.3", &entry, "https://r.example.com").unwrap();
        let tarball = resolution.tarball().unwrap();

        assert_eq!(tarball.tarball, "https://r.example.com/ms/-/ms-2.1.3.tgz");
        assert_eq!(tarball.integrity.as_deref(), Some("sha512-xyz"));
    }

    #[test]
    fn typed_records_pass_through_as_sources() {
        let mut extra = BTreeMap::new();
        extra.insert("repo".to_string(), "https://github.com/a/b".into());
        extra.insert("commit".to_string(), "deadbeef".into());
        let entry = record(Some(LockResolution::Record(ResolutionRecord {
            kind: Some("git".into()),
            extra,
            ..Default::default()
        })));

        let resolution = entry_to_resolution("github.com/a/b/deadbeef", &entry, NPM).unwrap();

        match resolution {
            Resolution::Source { kind, fields } => {
                assert_eq!(kind, "git");
                assert_eq!(fields["commit"], serde_yaml::Value::from("deadbeef"));
            }
            other => panic!("unexpected resolution {other:?}"),
        }
    }

    #[test]
    fn missing_resolution_is_malformed() {
        let err = entry_to_resolution("/a/1.0.0", &record(None), NPM).unwrap_err();
        assert!(matches!(err, GraftError::MalformedLockfileEntry { .. }));

        let bad_id = LockfileEntry::Shorthand("abc".into());
        let err = entry_to_resolution("nonsense", &bad_id, NPM).unwrap_err();
        assert!(matches!(err, GraftError::MalformedLockfileEntry { .. }));
    }

    #[test]
    fn identities_round_trip_through_references() {
        let id = pkg_id("1.3.0", "left-pad", NPM);
        assert_eq!(id, "registry.npmjs.org/left-pad/1.3.0");
        assert_eq!(reference_of(&id, "left-pad", NPM), "1.3.0");
        assert_eq!(short_id_of(&id, NPM), "/left-pad/1.3.0");

        let foreign = "npm.example.com+8443/@s/x/1.0.0";
        assert_eq!(reference_of(foreign, "x", NPM), foreign);
        assert_eq!(pkg_id(foreign, "x", NPM), foreign);
        assert_eq!(pkg_short_id(foreign, "x"), foreign);
    }

    #[test]
    fn encodes_registry_hosts() {
        assert_eq!(encode_registry("https://registry.npmjs.org/"), "registry.npmjs.org");
        assert_eq!(encode_registry("http://localhost:4873"), "localhost+4873");
        assert_eq!(encode_registry("https://npm.example.com:443/x/"), "npm.example.com");
    }

    #[test]
    fn hint_prefers_explicit_entry_id() {
        let entry = LockfileEntry::Record(DependencyShrinkwrap {
            id: Some("custom/id".into()),
            resolution: Some(LockResolution::Shasum("abc".into())),
            dependencies: [("ms".to_string(), "2.1.3".to_string())].into(),
            ..Default::default()
        });

        let hint = resolve_identity("1.0.0", Some(&entry), "debug", NPM, NPM).unwrap();
        assert_eq!(hint.id, "custom/id");
        assert_eq!(hint.short_id, "/debug/1.0.0");
        assert_eq!(hint.dependencies.unwrap()["ms"], "2.1.3");

        let bare = resolve_identity("1.0.0", None, "debug", NPM, NPM).unwrap();
        assert_eq!(bare.id, "registry.npmjs.org/debug/1.0.0");
        assert!(bare.resolution.is_none());
        assert!(bare.dependencies.is_none());
    }
}
