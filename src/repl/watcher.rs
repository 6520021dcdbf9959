//! Pattern file watching for hot reload

use crossbeam_channel::Sender;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Paths in `event` whose contents may have changed
///
/// Access, metadata-only and removal events are ignored: a removed pattern
/// file leaves the running pattern in place.
fn changed_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) | EventKind::Create(_) => event.paths,
        _ => Vec::new(),
    }
}

/// Sends the path of every watched pattern file whose contents changed
///
/// The callback runs on notify's own thread and only forwards paths; reading
/// and validating the file is left to the receiver. Watch errors are logged
/// there and never reach the channel.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn new(tx: Sender<PathBuf>) -> notify::Result<Self> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in changed_paths(event) {
                    debug!(path = %path.display(), "pattern file changed");
                    // Receiver gone means the REPL is shutting down
                    let _ = tx.send(path);
                }
            }
            Err(e) => warn!("pattern watch error: {}", e),
        })?;

        Ok(Self {
            watcher,
            watched: Vec::new(),
        })
    }

    /// Start forwarding changes to `path`; watching the same file twice is a no-op
    pub fn watch<P: AsRef<Path>>(&mut self, path: P) -> notify::Result<()> {
        let path = path.as_ref();
        if self.watched.iter().any(|p| p == path) {
            return Ok(());
        }
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched.push(path.to_path_buf());
        Ok(())
    }

    pub fn unwatch<P: AsRef<Path>>(&mut self, path: P) -> notify::Result<()> {
        let path = path.as_ref();
        self.watcher.unwatch(path)?;
        self.watched.retain(|p| p != path);
        Ok(())
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Stop watching every file, ignoring files that have since disappeared
    pub fn unwatch_all(&mut self) {
        for path in std::mem::take(&mut self.watched) {
            if let Err(e) = self.watcher.unwatch(&path) {
                debug!(path = %path.display(), "unwatch failed: {}", e);
            }
        }
    }
}
