use crate::console;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Progress of a single dependency through the installer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallStatus {
    Installing {
        raw_spec: String,
        name: String,
        dependent_id: Option<String>,
    },
    DownloadedManifest {
        id: String,
        version: String,
    },
    DependenciesInstalled {
        id: String,
    },
}

/// Receives status events. Purely observational.
pub trait StatusSink: Send + Sync {
    fn emit(&self, status: &InstallStatus);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn emit(&self, status: &InstallStatus) {
        match status {
            InstallStatus::Installing {
                raw_spec,
                dependent_id,
                ..
            } => debug!(
                spec = %raw_spec,
                dependent = dependent_id.as_deref().unwrap_or("<root>"),
                "installing"
            ),
            InstallStatus::DownloadedManifest { id, version } => {
                debug!(id = %id, version = %version, "downloaded manifest")
            }
            InstallStatus::DependenciesInstalled { id } => {
                debug!(id = %id, "dependencies installed")
            }
        }
    }
}

/// Tracks how many requested packages finished resolving and redraws the
/// console progress line.
#[derive(Debug, Default)]
pub struct ConsoleStatusSink {
    requested: AtomicUsize,
    resolved: AtomicUsize,
}

impl ConsoleStatusSink {
    pub fn counts(&self) -> (usize, usize) {
        (
            self.resolved.load(Ordering::Relaxed),
            self.requested.load(Ordering::Relaxed),
        )
    }
}

impl StatusSink for ConsoleStatusSink {
    fn emit(&self, status: &InstallStatus) {
        TracingStatusSink.emit(status);

        match status {
            InstallStatus::Installing { .. } => {
                self.requested.fetch_add(1, Ordering::Relaxed);
            }
            InstallStatus::DependenciesInstalled { .. } => {
                self.resolved.fetch_add(1, Ordering::Relaxed);
            }
            InstallStatus::DownloadedManifest { .. } => return,
        }

        let (resolved, requested) = self.counts();
        console::progress("Resolving", resolved, requested);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_sink_counts_requests_and_completions() {
        let sink = ConsoleStatusSink::default();
        sink.emit(&InstallStatus::Installing {
            raw_spec: "a@1".into(),
            name: "a".into(),
            dependent_id: None,
        });
        sink.emit(&InstallStatus::DownloadedManifest {
            id: "r/a/1.0.0".into(),
            version: "1.0.0".into(),
        });
        sink.emit(&InstallStatus::DependenciesInstalled {
            id: "r/a/1.0.0".into(),
        });

        assert_eq!(sink.counts(), (1, 1));
    }
}
