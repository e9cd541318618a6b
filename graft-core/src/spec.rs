use crate::version::{parse_exact, parse_range_set};
use crate::{GraftError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecKind {
    Version,
    Range,
    Tag,
    /// A tarball reachable over HTTP(S).
    Remote,
    Git,
    Directory,
}

/// One declared dependency request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageSpecifier {
    pub name: String,
    /// `name@range` exactly as declared.
    pub raw: String,
    /// The part after the name: a version, range, tag, URL or path.
    pub fetch_spec: String,
    pub kind: SpecKind,
    pub scope: Option<String>,
    pub dev: bool,
    pub optional: bool,
}

impl PackageSpecifier {
    pub fn parse(name: &str, range: &str, where_: &Path) -> Result<Self> {
        if name.is_empty() {
            return Err(GraftError::InvalidSpecifier {
                name: name.to_string(),
                raw: range.to_string(),
                reason: "dependency name is empty".to_string(),
            });
        }

        let trimmed = range.trim();
        let (kind, fetch_spec) = classify(name, trimmed, where_)?;

        Ok(PackageSpecifier {
            name: name.to_string(),
            raw: format!("{name}@{trimmed}"),
            fetch_spec,
            kind,
            scope: scope_of(name).map(str::to_string),
            dev: false,
            optional: false,
        })
    }
}

pub fn scope_of(name: &str) -> Option<&str> {
    match name.split_once('/') {
        Some((scope, _)) if scope.starts_with('@') && scope.len() > 1 => Some(scope),
        _ => None,
    }
}

fn classify(name: &str, spec: &str, where_: &Path) -> Result<(SpecKind, String)> {
    if spec.starts_with("http://") || spec.starts_with("https://") {
        return Ok((SpecKind::Remote, spec.to_string()));
    }

    if is_git_spec(spec) {
        return Ok((SpecKind::Git, spec.to_string()));
    }

    if let Some(path) = spec
        .strip_prefix("file:")
        .or_else(|| spec.strip_prefix("link:"))
        .or_else(|| is_path_spec(spec).then_some(spec))
    {
        let resolved: PathBuf = where_.join(path);
        return Ok((SpecKind::Directory, resolved.to_string_lossy().into_owned()));
    }

    if spec.is_empty() || spec == "*" || spec == "latest" {
        return Ok((SpecKind::Tag, "latest".to_string()));
    }

    if let Some(version) = parse_exact(spec) {
        return Ok((SpecKind::Version, version.to_string()));
    }

    if parse_range_set(name, spec).is_ok() {
        return Ok((SpecKind::Range, spec.to_string()));
    }

    if spec
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c))
    {
        return Ok((SpecKind::Tag, spec.to_string()));
    }

    Err(GraftError::InvalidSpecifier {
        name: name.to_string(),
        raw: spec.to_string(),
        reason: "not a version, range, tag, URL, git reference or path".to_string(),
    })
}

fn is_git_spec(spec: &str) -> bool {
    let Some((prefix, rest)) = spec.split_once(':') else {
        return is_hosted_shorthand(spec);
    };

    !rest.is_empty()
        && matches!(
            prefix,
            "git"
                | "git+http"
                | "git+https"
                | "git+rsync"
                | "git+ftp"
                | "git+file"
                | "git+ssh"
                | "ssh"
                | "github"
                | "gitlab"
                | "bitbucket"
        )
}

/// `user/repo` or `user/repo#ref`.
fn is_hosted_shorthand(spec: &str) -> bool {
    let base = spec.split('#').next().unwrap_or(spec);
    match base.split_once('/') {
        Some((user, repo)) => {
            !user.is_empty()
                && !repo.is_empty()
                && !user.starts_with(['.', '@', '~'])
                && !repo.contains('/')
        }
        None => false,
    }
}

fn is_path_spec(spec: &str) -> bool {
    spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with('/')
        || spec.starts_with("~/")
        || spec == "."
        || spec == ".."
}

/// Dev/optional membership used to flag expanded specifiers, and the
/// directory relative paths are resolved against.
#[derive(Clone, Copy, Debug)]
pub struct ExpandContext<'a> {
    pub where_: &'a Path,
    pub dev_dependencies: &'a BTreeMap<String, String>,
    pub optional_dependencies: &'a BTreeMap<String, String>,
}

pub trait DependencySpecExpander: Send + Sync {
    fn expand(
        &self,
        dependencies: &BTreeMap<String, String>,
        context: ExpandContext<'_>,
    ) -> Result<Vec<PackageSpecifier>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ManifestSpecExpander;

impl DependencySpecExpander for ManifestSpecExpander {
    fn expand(
        &self,
        dependencies: &BTreeMap<String, String>,
        context: ExpandContext<'_>,
    ) -> Result<Vec<PackageSpecifier>> {
        dependencies
            .iter()
            .map(|(name, range)| {
                let mut spec = PackageSpecifier::parse(name, range, context.where_)?;
                spec.dev = context.dev_dependencies.contains_key(name);
                spec.optional = context.optional_dependencies.contains_key(name);
                Ok(spec)
            })
            .collect()
    }
}
