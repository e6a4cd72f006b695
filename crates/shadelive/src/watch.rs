//! Shader file watching.
//!
//! Parent directories are watched rather than the files themselves: editors
//! that save by writing a temp file and renaming it over the original would
//! otherwise drop the watch. Events are filtered against the dependency set
//! of the latest reload attempt, and the watched directories are re-armed
//! every time that set changes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use renderer::ReloadObserver;
use shaderschema::FileDependencySet;

/// Editors often emit several events per save; wait this long for the burst
/// to settle before asking for a reload.
const SETTLE: Duration = Duration::from_millis(50);

pub struct DependencyWatcher {
    watcher: Mutex<RecommendedWatcher>,
    dependencies: Arc<RwLock<FileDependencySet>>,
    watched: Mutex<BTreeSet<PathBuf>>,
}

impl DependencyWatcher {
    /// Starts watching `shader`. Changed dependency paths arrive on the
    /// returned receiver.
    pub fn new(shader: &Path) -> Result<(Arc<Self>, Receiver<PathBuf>)> {
        let (tx, rx) = unbounded::<PathBuf>();
        let mut initial = FileDependencySet::new();
        initial.insert(shader);
        let dependencies = Arc::new(RwLock::new(initial.clone()));

        let filter = dependencies.clone();
        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for path in relevant_paths(&event, &filter.read()) {
                        tracing::debug!(path = %path.display(), "dependency changed");
                        let _ = tx.send(path);
                    }
                }
                Err(err) => tracing::warn!(error = %err, "file watcher error"),
            },
            Config::default().with_poll_interval(Duration::from_millis(250)),
        )
        .context("failed to create file watcher")?;

        let this = Arc::new(Self {
            watcher: Mutex::new(watcher),
            dependencies,
            watched: Mutex::new(BTreeSet::new()),
        });
        this.rearm(&initial);
        Ok((this, rx))
    }

    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }

    fn rearm(&self, dependencies: &FileDependencySet) {
        *self.dependencies.write() = dependencies.clone();

        let wanted = parent_dirs(dependencies);
        let mut watcher = self.watcher.lock();
        let mut watched = self.watched.lock();

        for dir in watched.difference(&wanted) {
            if let Err(err) = watcher.unwatch(dir) {
                tracing::debug!(dir = %dir.display(), error = %err, "failed to unwatch directory");
            }
        }
        let mut armed = BTreeSet::new();
        for dir in &wanted {
            if watched.contains(dir) {
                armed.insert(dir.clone());
                continue;
            }
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    armed.insert(dir.clone());
                }
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "failed to watch directory");
                }
            }
        }
        tracing::debug!(
            files = dependencies.len(),
            dirs = armed.len(),
            "file watcher re-armed"
        );
        *watched = armed;
    }
}

impl ReloadObserver for DependencyWatcher {
    fn dependencies_changed(&self, dependencies: &FileDependencySet) {
        self.rearm(dependencies);
    }
}

/// Handle to the thread that turns change notifications into reload
/// requests. Dropping it stops the thread.
pub struct ReloadForwarder {
    stop: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl ReloadForwarder {
    pub fn spawn<F>(changes: Receiver<PathBuf>, request_reload: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (stop, stop_rx) = bounded::<()>(1);
        let join = thread::Builder::new()
            .name("shader-watch".into())
            .spawn(move || loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(changes) -> change => {
                        let Ok(path) = change else { break };
                        thread::sleep(SETTLE);
                        let coalesced = changes.try_iter().count();
                        tracing::info!(
                            path = %path.display(),
                            coalesced,
                            "shader source changed; reloading"
                        );
                        request_reload();
                    }
                }
            })
            .context("failed to spawn watch thread")?;
        Ok(Self {
            stop,
            join: Some(join),
        })
    }
}

impl Drop for ReloadForwarder {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn relevant_paths(event: &Event, dependencies: &FileDependencySet) -> Vec<PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|path| dependencies.contains(path))
        .cloned()
        .collect()
}

fn parent_dirs(dependencies: &FileDependencySet) -> BTreeSet<PathBuf> {
    dependencies
        .iter()
        .map(|path| {
            path.parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
        .collect()
}
