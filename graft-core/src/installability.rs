use crate::manifest::PackageManifest;
use crate::platform;
use crate::version::{parse_exact, parse_range_set};
use crate::{GraftError, Result};
use tracing::warn;

#[derive(Clone, Copy, Debug, Default)]
pub struct InstallabilityOptions<'a> {
    pub optional: bool,
    pub engine_strict: bool,
    pub node_version: Option<&'a str>,
}

/// Decides whether a resolved package may be installed on this machine.
///
/// `Ok(false)` means "resolve but do not link"; an error aborts the run.
pub trait InstallabilityChecker: Send + Sync {
    fn check(
        &self,
        id: &str,
        manifest: &PackageManifest,
        options: InstallabilityOptions<'_>,
    ) -> Result<bool>;
}

#[derive(Clone, Debug)]
pub struct PlatformChecker {
    pub os: String,
    pub cpu: String,
    pub graft_version: String,
}

impl Default for PlatformChecker {
    fn default() -> Self {
        PlatformChecker {
            os: platform::current_os().to_string(),
            cpu: platform::current_cpu().to_string(),
            graft_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl PlatformChecker {
    fn incompatibility(
        &self,
        id: &str,
        manifest: &PackageManifest,
        node_version: Option<&str>,
    ) -> Option<String> {
        if !platform::matches_list(&manifest.os, &self.os)
            || !platform::matches_list(&manifest.cpu, &self.cpu)
        {
            return Some(format!(
                "unsupported platform: wanted os={:?} cpu={:?}, current os={} cpu={}",
                manifest.os, manifest.cpu, self.os, self.cpu
            ));
        }

        let engines = [("node", node_version), ("graft", Some(self.graft_version.as_str()))];

        for (engine, current) in engines {
            let (Some(wanted), Some(current)) = (manifest.engines.get(engine), current) else {
                continue;
            };
            let Some(current_version) = parse_exact(current) else {
                continue;
            };

            // An unparseable range satisfies nothing.
            let satisfied =
                parse_range_set(id, wanted).is_ok_and(|range| range.matches(&current_version));
            if !satisfied {
                return Some(format!(
                    "unsupported engine: wanted {engine} {wanted}, current {current}"
                ));
            }
        }

        None
    }
}

impl InstallabilityChecker for PlatformChecker {
    fn check(
        &self,
        id: &str,
        manifest: &PackageManifest,
        options: InstallabilityOptions<'_>,
    ) -> Result<bool> {
        let Some(reason) = self.incompatibility(id, manifest, options.node_version) else {
            return Ok(true);
        };

        if options.optional {
            warn!(id, %reason, "skipping failed optional dependency");
            return Ok(false);
        }

        if options.engine_strict {
            return Err(GraftError::Incompatible {
                id: id.to_string(),
                reason,
            });
        }

        warn!(id, %reason, "installing incompatible package");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> PlatformChecker {
        PlatformChecker {
            os: "linux".into(),
            cpu: "x64".into(),
            graft_version: "0.1.0".into(),
        }
    }

    fn darwin_only() -> PackageManifest {
        PackageManifest {
            name: Some("fsevents".into()),
            version: Some("2.3.3".into()),
            os: vec!["darwin".into()],
            ..Default::default()
        }
    }

    #[test]
    fn compatible_packages_pass() {
        let manifest = PackageManifest {
            engines: [("node".to_string(), ">=14".to_string())].into(),
            ..Default::default()
        };

        let ok = checker()
            .check(
                "a",
                &manifest,
                InstallabilityOptions {
                    node_version: Some("v18.17.0"),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(ok);
    }

    #[test]
    fn optional_incompatible_package_is_skipped() {
        let ok = checker()
            .check(
                "fsevents",
                &darwin_only(),
                InstallabilityOptions {
                    optional: true,
                    engine_strict: true,
                    node_version: None,
                },
            )
            .unwrap();

        assert!(!ok);
    }

    #[test]
    fn strict_mode_rejects_required_incompatible_package() {
        let err = checker()
            .check(
                "fsevents",
                &darwin_only(),
                InstallabilityOptions {
                    engine_strict: true,
                    ..Default::default()
                },
            )
            .unwrap_err();

        assert!(matches!(err, GraftError::Incompatible { .. }));
    }

    #[test]
    fn lenient_mode_installs_required_incompatible_package() {
        let manifest = PackageManifest {
            engines: [("node".to_string(), ">=20".to_string())].into(),
            ..Default::default()
        };

        let ok = checker()
            .check(
                "a",
                &manifest,
                InstallabilityOptions {
                    node_version: Some("16.0.0"),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(ok);
    }

    #[test]
    fn unparseable_engine_range_is_an_incompatibility() {
        let manifest = PackageManifest {
            engines: [("node".to_string(), "node >= 0.4".to_string())].into(),
            ..Default::default()
        };

        let reason = checker().incompatibility("a", &manifest, Some("v18.0.0"));
        assert!(reason.is_some_and(|reason| reason.contains("node >= 0.4")));

        let ok = checker()
            .check(
                "a",
                &manifest,
                InstallabilityOptions {
                    optional: true,
                    node_version: Some("v18.0.0"),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!ok);

        let err = checker()
            .check(
                "a",
                &manifest,
                InstallabilityOptions {
                    engine_strict: true,
                    node_version: Some("v18.0.0"),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, GraftError::Incompatible { .. }));
    }
}
