use super::InstalledPackage;
use crate::fetch::FetchLocker;
use crate::lockfile::Lockfile;
use futures::lock::Mutex;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Shared state of one installation run.
///
/// Every resolution task of the run holds a reference to the same context.
/// The visited-set test-and-set in [`InstallationContext::mark_visited`]
/// decides which task owns the dependency expansion of an identity.
pub struct InstallationContext {
    pub lockfile: Lockfile,
    pub fetch_locker: FetchLocker,
    visited: Mutex<HashSet<String>>,
    readiness: Mutex<Readiness>,
    installs: Mutex<BTreeMap<String, InstalledPackage>>,
    linked: Mutex<BTreeSet<String>>,
}

/// Skipped set and installation sequence share a lock so an identity is
/// never in both.
#[derive(Default)]
struct Readiness {
    skipped: BTreeSet<String>,
    sequence: Vec<String>,
}

pub struct InstallOutcome {
    pub lockfile: Lockfile,
    pub installs: BTreeMap<String, InstalledPackage>,
    pub installation_sequence: Vec<String>,
    pub skipped: BTreeSet<String>,
    /// Lockfile short ids of subtrees left alone because they were already
    /// linked.
    pub linked: BTreeSet<String>,
}

impl InstallationContext {
    pub fn new(lockfile: Lockfile) -> Self {
        InstallationContext {
            lockfile,
            fetch_locker: FetchLocker::default(),
            visited: Mutex::new(HashSet::new()),
            readiness: Mutex::new(Readiness::default()),
            installs: Mutex::new(BTreeMap::new()),
            linked: Mutex::new(BTreeSet::new()),
        }
    }

    /// Returns `true` for exactly one caller per identity.
    pub async fn mark_visited(&self, id: &str) -> bool {
        self.visited.lock().await.insert(id.to_string())
    }

    pub async fn mark_linked(&self, short_id: &str) {
        self.linked.lock().await.insert(short_id.to_string());
    }

    /// Records a platform skip, unless another path already made the
    /// identity ready.
    pub async fn mark_skipped(&self, id: &str) {
        let mut readiness = self.readiness.lock().await;
        if !readiness.sequence.iter().any(|ready| ready == id) {
            readiness.skipped.insert(id.to_string());
        }
    }

    /// Appends to the installation sequence (once) and lifts any earlier
    /// skip.
    pub async fn mark_ready(&self, id: &str) {
        let mut readiness = self.readiness.lock().await;
        readiness.skipped.remove(id);
        if !readiness.sequence.iter().any(|ready| ready == id) {
            readiness.sequence.push(id.to_string());
        }
    }

    /// Folds a freshly built record into the installs map and returns the
    /// merged result. `dev` and `optional` only stay set if every path
    /// agrees; dependencies are attached by whichever path found them.
    pub async fn merge_installed(&self, pkg: InstalledPackage) -> InstalledPackage {
        let mut installs = self.installs.lock().await;

        match installs.entry(pkg.id.clone()) {
            Entry::Vacant(vacant) => vacant.insert(pkg).clone(),
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                existing.dev = existing.dev && pkg.dev;
                existing.optional = existing.optional && pkg.optional;
                if existing.dependencies.is_empty() {
                    existing.dependencies = pkg.dependencies;
                }
                existing.clone()
            }
        }
    }

    pub async fn installed(&self, id: &str) -> Option<InstalledPackage> {
        self.installs.lock().await.get(id).cloned()
    }

    pub async fn skipped(&self) -> BTreeSet<String> {
        self.readiness.lock().await.skipped.clone()
    }

    pub async fn installation_sequence(&self) -> Vec<String> {
        self.readiness.lock().await.sequence.clone()
    }

    pub fn finish(self) -> InstallOutcome {
        let readiness = self.readiness.into_inner();

        InstallOutcome {
            lockfile: self.lockfile,
            installs: self.installs.into_inner(),
            installation_sequence: readiness.sequence,
            skipped: readiness.skipped,
            linked: self.linked.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> InstallationContext {
        InstallationContext::new(Lockfile::new("https://registry.npmjs.org/"))
    }

    #[tokio::test]
    async fn ready_lifts_an_earlier_skip() {
        let ctx = context();

        ctx.mark_skipped("r/a/1.0.0").await;
        ctx.mark_ready("r/a/1.0.0").await;

        assert!(ctx.skipped().await.is_empty());
        assert_eq!(ctx.installation_sequence().await, ["r/a/1.0.0"]);
    }

    #[tokio::test]
    async fn skip_after_ready_is_ignored() {
        let ctx = context();

        ctx.mark_ready("r/a/1.0.0").await;
        ctx.mark_ready("r/a/1.0.0").await;
        ctx.mark_skipped("r/a/1.0.0").await;

        let outcome = ctx.finish();
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.installation_sequence, ["r/a/1.0.0"]);
    }

    #[tokio::test]
    async fn visited_gate_admits_one_caller() {
        let ctx = context();

        assert!(ctx.mark_visited("r/a/1.0.0").await);
        assert!(!ctx.mark_visited("r/a/1.0.0").await);
    }
}
