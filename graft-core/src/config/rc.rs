use directories::BaseDirs;
use std::collections::BTreeMap;
use std::path::Path;
use std::{env, fs};

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

const RC_FILES: [&str; 2] = [".npmrc", ".graftrc"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub default_registry: String,
    pub scoped: BTreeMap<String, String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            default_registry: DEFAULT_REGISTRY.to_string(),
            scoped: BTreeMap::new(),
        }
    }
}

pub fn expand_env_vars(text: &str) -> String {
    let mut out = String::new();
    let mut i = 0;
    let bytes = text.as_bytes();

    while i < bytes.len() {
        if bytes[i] != b'$' {
            let ch = text[i..].chars().next().unwrap_or_default();
            out.push(ch);
            i += ch.len_utf8().max(1);
            continue;
        }

        if i + 1 < bytes.len()
            && bytes[i + 1] == b'{'
            && let Some(end) = text[i + 2..].find('}')
        {
            let var = &text[i + 2..i + 2 + end];
            out.push_str(&env::var(var).unwrap_or_default());
            i += 2 + end + 1;
            continue;
        }

        let mut j = i + 1;
        while j < bytes.len() && (bytes[j] == b'_' || bytes[j].is_ascii_alphanumeric()) {
            j += 1;
        }

        let var = &text[i + 1..j];
        if var.is_empty() {
            out.push('$');
            i += 1;
        } else {
            out.push_str(&env::var(var).unwrap_or_default());
            i = j;
        }
    }

    out
}

/// Lowercases the host, drops default ports and ends the URL with `/`.
pub fn normalize_registry_url(value: &str) -> String {
    let mut url = if value.starts_with("//") {
        format!("https:{value}")
    } else {
        value.trim().to_string()
    };

    while url.ends_with('/') {
        url.pop();
    }

    let (scheme, rest) = if let Some(r) = url.strip_prefix("https://") {
        ("https", r)
    } else if let Some(r) = url.strip_prefix("http://") {
        ("http", r)
    } else {
        return format!("{url}/");
    };

    let mut parts = rest.splitn(2, '/');
    let hostport = parts.next().unwrap_or("").to_ascii_lowercase();
    let suffix = parts.next().unwrap_or("");

    let mut host = hostport.clone();
    if let Some((host_part, port_part)) = hostport.split_once(':') {
        let default_https = scheme == "https" && port_part == "443";
        let default_http = scheme == "http" && port_part == "80";
        if default_https || default_http {
            host = host_part.to_string();
        }
    }

    if suffix.is_empty() {
        format!("{scheme}://{host}/")
    } else {
        format!("{scheme}://{host}/{suffix}/")
    }
}

/// Reads rc files from the home directory, then from every ancestor of
/// `cwd` down to `cwd` itself. Later files override earlier ones.
pub fn read_registry_config(cwd: &Path) -> RegistryConfig {
    let mut config = RegistryConfig::default();

    if let Some(base) = BaseDirs::new() {
        for rc_name in RC_FILES {
            apply_rc_file(&base.home_dir().join(rc_name), &mut config);
        }
    }

    let ancestors: Vec<&Path> = cwd.ancestors().collect();
    for dir in ancestors.into_iter().rev() {
        for rc_name in RC_FILES {
            apply_rc_file(&dir.join(rc_name), &mut config);
        }
    }

    config
}

pub fn apply_rc_file(path: &Path, config: &mut RegistryConfig) {
    if !path.is_file() {
        return;
    }

    if let Ok(data) = fs::read_to_string(path) {
        apply_rc_contents(&data, config);
    }
}

pub fn apply_rc_contents(data: &str, config: &mut RegistryConfig) {
    for line in data.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = expand_env_vars(value.trim());

        if value.is_empty() {
            continue;
        }

        if key == "registry" {
            config.default_registry = normalize_registry_url(&value);
        } else if let Some(scope) = key.strip_suffix(":registry") {
            let scope = scope.trim();
            if scope.starts_with('@') {
                config
                    .scoped
                    .insert(scope.to_string(), normalize_registry_url(&value));
            }
        }
    }
}
