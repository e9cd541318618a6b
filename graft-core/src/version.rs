use crate::registry::{RegistryPackage, RegistryVersion};
use crate::{GraftError, Result};
use semver::{Version, VersionReq};

/// An npm-style range: alternatives joined by `||`, each alternative a
/// whitespace separated conjunction or a hyphen range.
#[derive(Debug, Clone)]
pub struct RangeSet {
    alternatives: Vec<VersionReq>,
}

impl RangeSet {
    pub fn parse(input: &str) -> std::result::Result<Self, semver::Error> {
        let trimmed = input.trim();
        let mut alternatives = Vec::new();

        if !is_wildcard(trimmed) {
            for part in trimmed.split("||").map(str::trim) {
                if is_wildcard(part) {
                    alternatives.clear();
                    break;
                }
                alternatives.push(VersionReq::parse(&comparator_list(part))?);
            }
        }

        if alternatives.is_empty() {
            alternatives.push(VersionReq::STAR);
        }

        Ok(RangeSet { alternatives })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

fn is_wildcard(part: &str) -> bool {
    matches!(part, "" | "*" | "x" | "X" | "latest")
}

fn comparator_list(part: &str) -> String {
    let tokens: Vec<&str> = part.split_whitespace().collect();

    if tokens.len() == 3 && tokens[1] == "-" {
        return format!(">={}, <={}", tokens[0], tokens[2]);
    }

    let mut out = String::new();
    let mut pending_operator = false;

    for token in tokens {
        if !out.is_empty() && !pending_operator {
            out.push_str(", ");
        }
        let bare = token.starts_with(|c: char| c.is_ascii_digit() || c == 'v');
        if !pending_operator && bare {
            // A partial version without wildcards pins its last given part.
            if parse_exact(token).is_some() {
                out.push('=');
            } else if !token.contains(['x', 'X', '*']) {
                out.push('~');
            }
        }
        out.push_str(token.trim_start_matches('v'));
        pending_operator = matches!(token, "=" | ">" | ">=" | "<" | "<=" | "~" | "^");
    }

    out
}

pub fn parse_range_set(name: &str, range: &str) -> Result<RangeSet> {
    RangeSet::parse(range).map_err(|err| GraftError::InvalidSpecifier {
        name: name.to_string(),
        raw: range.to_string(),
        reason: err.to_string(),
    })
}

pub fn parse_exact(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('=').unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

/// Picks the version a range or dist-tag points to: a dist-tag lookup first,
/// then the highest published version the range accepts.
pub fn select_version<'a>(
    name: &str,
    range: &str,
    package: &'a RegistryPackage,
) -> Result<&'a RegistryVersion> {
    let trimmed = range.trim();
    let tag = if trimmed.is_empty() { "latest" } else { trimmed };

    if let Some(tagged) = package.dist_tags.get(tag)
        && let Some(meta) = package.versions.get(tagged)
    {
        return Ok(meta);
    }

    if let Some(exact) = parse_exact(trimmed) {
        return package
            .versions
            .get(&exact.to_string())
            .ok_or_else(|| GraftError::ResolutionFailed {
                name: name.to_string(),
                range: range.to_string(),
                reason: "version is not published".to_string(),
            });
    }

    let ranges = parse_range_set(name, range)?;
    let mut selected: Option<(Version, &RegistryVersion)> = None;

    for (raw, meta) in package.versions.iter() {
        let Ok(version) = Version::parse(raw) else {
            continue;
        };

        if !ranges.matches(&version) {
            continue;
        }

        match &selected {
            Some((best, _)) if version <= *best => {}
            _ => selected = Some((version, meta)),
        }
    }

    selected
        .map(|(_, meta)| meta)
        .ok_or_else(|| GraftError::ResolutionFailed {
            name: name.to_string(),
            range: range.to_string(),
            reason: "no published version matches".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PackageManifest;
    use crate::registry::RegistryDist;
    use std::collections::BTreeMap;

    fn registry_package(versions: &[&str], tags: &[(&str, &str)]) -> RegistryPackage {
        let mut map = BTreeMap::new();
        for version in versions {
            map.insert(
                version.to_string(),
                RegistryVersion {
                    manifest: PackageManifest {
                        name: Some("pkg".to_string()),
                        version: Some(version.to_string()),
                        ..Default::default()
                    },
                    dist: RegistryDist {
                        tarball: format!("https://registry.npmjs.org/pkg/-/pkg-{version}.tgz"),
                        shasum: None,
                        integrity: None,
                    },
                },
            );
        }

        RegistryPackage {
            versions: map,
            dist_tags: tags
                .iter()
                .map(|(tag, version)| (tag.to_string(), version.to_string()))
                .collect(),
        }
    }

    #[test]
    fn spaced_and_hyphen_ranges_parse() {
        let spaced = RangeSet::parse(">= 4.21.0 < 5").unwrap();
        assert!(spaced.matches(&Version::parse("4.30.1").unwrap()));
        assert!(!spaced.matches(&Version::parse("5.0.0").unwrap()));

        let hyphen = RangeSet::parse("1.2.3 - 2.0.0").unwrap();
        assert!(hyphen.matches(&Version::parse("2.0.0").unwrap()));
        assert!(!hyphen.matches(&Version::parse("2.0.1").unwrap()));
    }

    #[test]
    fn bare_version_is_exact() {
        let set = RangeSet::parse("1.2.3").unwrap();
        assert!(set.matches(&Version::parse("1.2.3").unwrap()));
        assert!(!set.matches(&Version::parse("1.2.4").unwrap()));
    }

    #[test]
    fn bare_partial_version_pins_its_given_parts() {
        let minor = RangeSet::parse("1.2").unwrap();
        assert!(minor.matches(&Version::parse("1.2.5").unwrap()));
        assert!(!minor.matches(&Version::parse("1.3.0").unwrap()));
        assert!(!minor.matches(&Version::parse("1.9.0").unwrap()));

        let major = RangeSet::parse("1").unwrap();
        assert!(major.matches(&Version::parse("1.9.0").unwrap()));
        assert!(!major.matches(&Version::parse("2.0.0").unwrap()));

        let wildcard = RangeSet::parse("1.x").unwrap();
        assert!(wildcard.matches(&Version::parse("1.9.0").unwrap()));
    }

    #[test]
    fn partial_range_selects_within_its_minor() {
        let package = registry_package(&["1.2.0", "1.2.9", "1.9.0"], &[]);

        let selected = select_version("pkg", "1.2", &package).unwrap();

        assert_eq!(selected.manifest.version.as_deref(), Some("1.2.9"));
    }

    #[test]
    fn alternatives_match_either_side() {
        let set = RangeSet::parse("^1.0.0 || ^3.0.0").unwrap();
        assert!(set.matches(&Version::parse("1.4.0").unwrap()));
        assert!(set.matches(&Version::parse("3.1.0").unwrap()));
        assert!(!set.matches(&Version::parse("2.0.0").unwrap()));
    }

    #[test]
    fn selects_highest_matching_version() {
        let package = registry_package(&["1.0.0", "1.2.0", "1.10.0", "2.0.0"], &[]);

        let selected = select_version("pkg", "^1.0.0", &package).unwrap();

        assert_eq!(selected.manifest.version.as_deref(), Some("1.10.0"));
    }

    #[test]
    fn dist_tag_takes_precedence() {
        let package = registry_package(&["1.0.0", "2.0.0"], &[("latest", "1.0.0")]);

        assert_eq!(
            select_version("pkg", "latest", &package)
                .unwrap()
                .manifest
                .version
                .as_deref(),
            Some("1.0.0")
        );
        assert_eq!(
            select_version("pkg", "", &package)
                .unwrap()
                .manifest
                .version
                .as_deref(),
            Some("1.0.0")
        );
    }

    #[test]
    fn unmatched_range_fails() {
        let package = registry_package(&["1.0.0"], &[]);

        let err = select_version("pkg", "^9.0.0", &package).unwrap_err();

        assert!(matches!(err, GraftError::ResolutionFailed { .. }));
    }
}
