use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Declared metadata of a package, as found in its `package.json` or in a
/// registry version document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundled_dependencies: Option<BundledDependencies>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_dependencies: Option<BundledDependencies>,
    #[serde(default)]
    pub engines: BTreeMap<String, String>,
    #[serde(default)]
    pub os: Vec<String>,
    #[serde(default)]
    pub cpu: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum BundledDependencies {
    List(Vec<String>),
    All(bool),
}

impl BundledDependencies {
    pub fn to_set(&self, all_deps: &BTreeMap<String, String>) -> BTreeSet<String> {
        match self {
            BundledDependencies::List(list) => list.iter().cloned().collect(),
            BundledDependencies::All(true) => all_deps.keys().cloned().collect(),
            BundledDependencies::All(false) => BTreeSet::new(),
        }
    }
}

impl PackageManifest {
    pub fn version_or_default(&self) -> &str {
        self.version.as_deref().unwrap_or("0.0.0")
    }

    /// `bundleDependencies` wins over `bundledDependencies` when both exist.
    pub fn bundled(&self) -> BTreeSet<String> {
        self.bundle_dependencies
            .as_ref()
            .or(self.bundled_dependencies.as_ref())
            .map(|bundled| bundled.to_set(&self.dependencies))
            .unwrap_or_default()
    }

    /// The dependency set a package brings into the graph: optional
    /// dependencies overlaid by regular ones, minus anything it bundles.
    pub fn installable_dependencies(&self) -> BTreeMap<String, String> {
        let bundled = self.bundled();
        let mut merged = self.optional_dependencies.clone();

        for (name, range) in self.dependencies.iter() {
            merged.insert(name.clone(), range.clone());
        }

        merged.retain(|name, _| !bundled.contains(name));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(json: &str) -> PackageManifest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn bundled_names_are_excluded_even_when_declared_as_dependencies() {
        let pkg = manifest(
            r#"{
                "name": "host",
                "version": "1.0.0",
                "dependencies": { "a": "^1.0.0", "b": "^2.0.0" },
                "optionalDependencies": { "c": "^3.0.0" },
                "bundledDependencies": ["b"]
            }"#,
        );

        let deps = pkg.installable_dependencies();
        assert!(deps.contains_key("a"));
        assert!(deps.contains_key("c"));
        assert!(!deps.contains_key("b"));
    }

    #[test]
    fn bundle_all_drops_every_regular_dependency() {
        let pkg = manifest(
            r#"{
                "dependencies": { "a": "1", "b": "2" },
                "optionalDependencies": { "c": "3" },
                "bundleDependencies": true
            }"#,
        );

        let deps = pkg.installable_dependencies();
        assert_eq!(deps.keys().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn regular_range_wins_over_optional_range() {
        let pkg = manifest(
            r#"{
                "dependencies": { "a": "^2.0.0" },
                "optionalDependencies": { "a": "^1.0.0" }
            }"#,
        );

        let deps = pkg.installable_dependencies();
        assert_eq!(deps.get("a").map(String::as_str), Some("^2.0.0"));
    }
}
