use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

pub mod rc;
pub use self::rc::*;

#[derive(Debug, Clone)]
pub struct GraftConfig {
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    pub default_registry: String,
    pub scoped_registries: BTreeMap<String, String>,
    pub offline: bool,
    pub engine_strict: bool,
    /// How deep below the root already-linked packages are re-resolved.
    pub depth: usize,
    pub node_version: Option<String>,
    pub verbose: bool,
}

impl GraftConfig {
    pub fn from_env() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_env_in(&cwd)
    }

    pub fn from_env_in(cwd: &Path) -> Self {
        let dirs = ProjectDirs::from("io", "graft", "graft");

        let (cache_dir, data_dir) = if let Ok(home) = env::var("GRAFT_HOME") {
            let base = PathBuf::from(home);
            (base.join("cache"), base.join("data"))
        } else {
            match dirs {
                Some(dirs) => (
                    dirs.cache_dir().to_path_buf(),
                    dirs.data_local_dir().to_path_buf(),
                ),
                None => {
                    let fallback = PathBuf::from(".graft");
                    (fallback.join("cache"), fallback.join("data"))
                }
            }
        };

        let RegistryConfig {
            mut default_registry,
            scoped,
        } = read_registry_config(cwd);

        if let Ok(value) =
            env::var("NPM_CONFIG_REGISTRY").or_else(|_| env::var("npm_config_registry"))
        {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                default_registry = normalize_registry_url(trimmed);
            }
        }

        let mut depth = 0;
        if let Ok(value) = env::var("GRAFT_DEPTH")
            && let Ok(parsed) = value.trim().parse::<usize>()
        {
            depth = parsed;
        }

        let node_version = env::var("GRAFT_NODE_VERSION")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(detect_node_version);

        GraftConfig {
            cache_dir,
            data_dir,
            default_registry,
            scoped_registries: scoped,
            offline: env_flag("GRAFT_OFFLINE"),
            engine_strict: env_flag("GRAFT_ENGINE_STRICT"),
            depth,
            node_version,
            verbose: env_flag("GRAFT_VERBOSE"),
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    pub fn registry_for_scope(&self, scope: Option<&str>) -> &str {
        scope
            .and_then(|scope| self.scoped_registries.get(scope))
            .map(String::as_str)
            .unwrap_or(&self.default_registry)
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|value| is_truthy(&value))
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn detect_node_version() -> Option<String> {
    let output = Command::new("node").arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}
