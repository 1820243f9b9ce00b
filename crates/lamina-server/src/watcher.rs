//! File watching for live reload.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// Events emitted by the file watcher.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A generated page changed
    PageModified(PathBuf),

    /// The extracted stylesheet changed
    StyleModified(PathBuf),

    /// A bundle changed
    ScriptModified(PathBuf),

    /// File was created
    Created(PathBuf),

    /// File was deleted
    Deleted(PathBuf),

    /// Generic modification
    Modified(PathBuf),
}

/// File watcher for detecting changes in the output directory.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher for the given paths.
    ///
    /// Returns the watcher and a channel to receive events.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            // A path that does not exist yet (serve before the first build)
            // is covered by watching its nearest existing ancestor; the
            // recursive watch then sees the directory appear and fill.
            let mut target = path.as_path();
            while !target.exists() {
                match target.parent() {
                    Some(parent) => target = parent,
                    None => break,
                }
            }
            if target.exists() {
                watcher
                    .watch(target, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
            }
        }

        // Forward events onto the async channel. Bursts are debounced on
        // the trailing edge: wait for quiet, then forward the whole burst
        // deduplicated by path, so the last save of a burst is never lost.
        let async_tx_clone = async_tx.clone();
        std::thread::spawn(move || {
            let debounce_duration = Duration::from_millis(100);

            while let Ok(first) = sync_rx.recv() {
                let mut batch = vec![first];
                while let Ok(more) = sync_rx.recv_timeout(debounce_duration) {
                    batch.push(more);
                }

                let mut seen: Vec<PathBuf> = Vec::new();
                for event in batch {
                    for path in &event.paths {
                        if seen.iter().any(|p| p == path) {
                            continue;
                        }
                        if let Some(e) = classify_event(path, &event.kind) {
                            let _ = async_tx_clone.blocking_send(e);
                        }
                        seen.push(path.clone());
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Classify a notify event into a WatchEvent.
fn classify_event(path: &Path, kind: &notify::EventKind) -> Option<WatchEvent> {
    use notify::EventKind;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match kind {
        EventKind::Create(_) => Some(WatchEvent::Created(path.to_path_buf())),
        EventKind::Remove(_) => Some(WatchEvent::Deleted(path.to_path_buf())),
        EventKind::Modify(_) => {
            if ext == "html" {
                Some(WatchEvent::PageModified(path.to_path_buf()))
            } else if ext == "css" {
                Some(WatchEvent::StyleModified(path.to_path_buf()))
            } else if ext == "js" {
                Some(WatchEvent::ScriptModified(path.to_path_buf()))
            } else {
                Some(WatchEvent::Modified(path.to_path_buf()))
            }
        }
        _ => None,
    }
}
