use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraftError {
    #[error("Failed to read file {path:?}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[error("Failed to write file {path:?}: {source}")]
    WriteFile { path: PathBuf, source: std::io::Error },

    #[error("Failed to parse JSON in {path:?}: {source}")]
    ParseJson { path: PathBuf, source: serde_json::Error },

    #[error("Project manifest package.json not found at {path:?}")]
    ManifestMissing { path: PathBuf },

    #[error("Invalid manifest in {path:?}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Failed to read lockfile {path:?}: {source}")]
    LockfileRead {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to write lockfile {path:?}: {source}")]
    LockfileWrite {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Malformed lockfile entry {short_id}: {reason}")]
    MalformedLockfileEntry { short_id: String, reason: String },

    #[error("Invalid dependency specifier {name}@{raw}: {reason}")]
    InvalidSpecifier {
        name: String,
        raw: String,
        reason: String,
    },

    #[error("Unsupported dependency specifier {raw}: {reason}")]
    UnsupportedSpecifier { raw: String, reason: String },

    #[error("HTTP error while fetching {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Failed to decode registry metadata for {name}: {source}")]
    RegistryDecode {
        name: String,
        source: serde_json::Error,
    },

    #[error("Failed to resolve {name}@{range}: {reason}")]
    ResolutionFailed {
        name: String,
        range: String,
        reason: String,
    },

    #[error("Integrity check failed for {id}: expected {expected}, got {actual}")]
    Integrity {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to extract tarball into {path:?}: {source}")]
    Archive { path: PathBuf, source: std::io::Error },

    #[error("No cached metadata for {name} while offline")]
    Offline { name: String },

    #[error("{id} is not compatible with this machine: {reason}")]
    Incompatible { id: String, reason: String },

    #[error("Background store task failed: {reason}")]
    StoreTask { reason: String },

    #[error("{0}")]
    Shared(String),
}
