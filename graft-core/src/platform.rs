use std::env;

/// `process.platform` spelling of the running OS.
pub fn current_os() -> &'static str {
    match env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// `process.arch` spelling of the running CPU.
pub fn current_cpu() -> &'static str {
    match env::consts::ARCH {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Evaluates an npm `os`/`cpu` list against `current`. Entries prefixed with
/// `!` deny; if any positive entry exists, `current` must be one of them.
pub fn matches_list(list: &[String], current: &str) -> bool {
    let mut has_positive = false;
    let mut allowed = false;

    for entry in list {
        if let Some(negated) = entry.strip_prefix('!') {
            if negated == current {
                return false;
            }
        } else {
            has_positive = true;
            allowed |= entry == current || entry == "any";
        }
    }

    !has_positive || allowed
}
