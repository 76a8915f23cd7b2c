//! Filesystem watcher for skill roots.
//!
//! Every existing root and every skill directory beneath it gets a
//! non-recursive watch. Events reset a debounce timer; when the timer fires
//! the watch set is rebuilt from a fresh scan (so new and removed skill
//! directories are picked up) and one [`SkillsChanged`] is broadcast.

use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::roots::SkillRoots;
use crate::scanner::list_skill_dirs;
use crate::types::SkillsChanged;

/// Default quiet period before a burst of events is reported.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Owned watcher lifecycle. Dropping it stops watching.
#[derive(Debug)]
pub struct SkillWatcher {
    debounce: Duration,
    changes: broadcast::Sender<SkillsChanged>,
    task: Option<JoinHandle<()>>,
}

impl SkillWatcher {
    pub fn new(debounce: Duration, changes: broadcast::Sender<SkillsChanged>) -> Self {
        Self {
            debounce,
            changes,
            task: None,
        }
    }

    /// (Re)start watching `roots`. Any previous watch set is torn down first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, roots: SkillRoots) -> Result<()> {
        self.stop();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (watcher, watched) = build_watch_set(&roots, event_tx.clone())?;
        tracing::info!(paths = watched, "skill watcher started");

        let debounce = self.debounce;
        let changes = self.changes.clone();
        self.task = Some(tokio::spawn(debounce_loop(
            roots, debounce, changes, event_tx, event_rx, watcher,
        )));
        Ok(())
    }

    /// Stop watching. Safe to call repeatedly or when never started.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::info!("skill watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SkillWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn debounce_loop(
    roots: SkillRoots,
    debounce: Duration,
    changes: broadcast::Sender<SkillsChanged>,
    event_tx: mpsc::UnboundedSender<()>,
    mut event_rx: mpsc::UnboundedReceiver<()>,
    mut watcher: RecommendedWatcher,
) {
    while event_rx.recv().await.is_some() {
        // Reset the timer on every further event until things go quiet.
        loop {
            match tokio::time::timeout(debounce, event_rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        // Tear down before rebuilding so the old watches are released.
        drop(watcher);
        watcher = match build_watch_set(&roots, event_tx.clone()) {
            Ok((watcher, watched)) => {
                tracing::debug!(paths = watched, "skill watch set rebuilt");
                watcher
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to rebuild skill watcher");
                return;
            }
        };

        // No subscribers is not an error.
        let _ = changes.send(SkillsChanged::Filesystem);
    }
}

/// Create an OS watcher over every root and skill directory. Individual
/// watch failures are logged and skipped. Returns the number of paths
/// watched.
fn build_watch_set(
    roots: &SkillRoots,
    event_tx: mpsc::UnboundedSender<()>,
) -> Result<(RecommendedWatcher, usize)> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if !matches!(event.kind, EventKind::Access(_)) {
                let _ = event_tx.send(());
            }
        }
        Err(e) => tracing::warn!(error = %e, "skill watcher error"),
    })?;

    let mut watched = 0usize;
    for root in roots.by_priority() {
        if !root.path.is_dir() {
            continue;
        }
        let mut paths = vec![root.path.clone()];
        paths.extend(
            list_skill_dirs(&root.path)
                .into_iter()
                .filter(|dir| *dir != root.path),
        );
        for path in paths {
            match watcher.watch(&path, RecursiveMode::NonRecursive) {
                Ok(()) => watched += 1,
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to watch skill path"
                ),
            }
        }
    }
    Ok((watcher, watched))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::manifest::MANIFEST_FILE;

    fn roots_for(primary: &Path) -> SkillRoots {
        SkillRoots {
            primary: primary.to_path_buf(),
            external: None,
            bundled: None,
        }
    }

    async fn next_change(rx: &mut broadcast::Receiver<SkillsChanged>) -> SkillsChanged {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no change notification within 5s")
            .unwrap()
    }

    #[tokio::test]
    async fn new_skill_triggers_one_notification() {
        let tmp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = broadcast::channel(16);
        let mut watcher = SkillWatcher::new(Duration::from_millis(100), tx);
        watcher.start(roots_for(tmp.path())).unwrap();
        assert!(watcher.is_running());

        let skill = tmp.path().join("fresh");
        std::fs::create_dir(&skill).unwrap();
        std::fs::write(skill.join(MANIFEST_FILE), "---\nname: fresh\n---\n").unwrap();
        std::fs::write(tmp.path().join("other.txt"), "burst").unwrap();

        assert_eq!(next_change(&mut rx).await, SkillsChanged::Filesystem);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err(), "burst should collapse into one notification");

        // The rebuilt watch set covers the new skill directory.
        std::fs::write(skill.join(MANIFEST_FILE), "---\nname: renamed\n---\n").unwrap();
        assert_eq!(next_change(&mut rx).await, SkillsChanged::Filesystem);

        watcher.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let (tx, _rx) = broadcast::channel(4);
        let mut watcher = SkillWatcher::new(DEFAULT_DEBOUNCE, tx);

        watcher.stop();
        watcher.start(roots_for(tmp.path())).unwrap();
        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn missing_roots_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let roots = SkillRoots {
            primary: tmp.path().join("absent"),
            external: Some(tmp.path().join("also-absent")),
            bundled: None,
        };
        let (tx, _rx) = broadcast::channel(4);
        let mut watcher = SkillWatcher::new(DEFAULT_DEBOUNCE, tx);
        watcher.start(roots).unwrap();
        assert!(watcher.is_running());
    }
}
