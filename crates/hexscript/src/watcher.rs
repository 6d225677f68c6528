//! Script File Watcher
//!
//! Watches the scripts root and reports which script directory changed.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info};

/// A script directory whose modules changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptChange {
    pub script_dir: PathBuf,
}

pub struct ScriptWatcher {
    root: PathBuf,
    rx: mpsc::Receiver<ScriptChange>,
    /// The underlying watcher (kept alive)
    _watcher: RecommendedWatcher,
}

impl ScriptWatcher {
    pub fn new(root: impl AsRef<Path>, extension: &str) -> Result<Self, notify::Error> {
        let root = root
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| root.as_ref().to_path_buf());
        let (tx, rx) = mpsc::channel();

        let root_clone = root.clone();
        let extension = extension.to_string();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if let Some(change) = event_to_change(&root_clone, &extension, &event) {
                        let _ = tx.send(change);
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!("Watching scripts directory: {}", root.display());

        Ok(Self {
            root,
            rx,
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Block until something changes, then collect every change that
    /// arrives within `debounce`. Returns `None` once the watcher is gone.
    pub fn next_batch(&self, debounce: Duration) -> Option<Vec<ScriptChange>> {
        let first = self.rx.recv().ok()?;
        let mut changes = vec![first];
        while let Ok(change) = self.rx.recv_timeout(debounce) {
            changes.push(change);
        }
        changes.sort();
        changes.dedup();
        Some(changes)
    }
}

/// Map a notify event to the script directory it touches.
pub fn event_to_change(root: &Path, extension: &str, event: &Event) -> Option<ScriptChange> {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) => {}
        _ => {
            debug!("Ignoring event kind: {:?}", event.kind);
            return None;
        }
    }

    let path = event.paths.first()?;
    if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
        return None;
    }

    let relative = path.strip_prefix(root).ok()?;
    let script = relative.components().next()?;
    // Modules directly in the root belong to no script.
    if relative.components().count() < 2 {
        return None;
    }

    debug!("Script file changed: {}", relative.display());
    Some(ScriptChange {
        script_dir: root.join(script),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_module_change() {
        let change = event_to_change(
            Path::new("/scripts"),
            "js",
            &event(EventKind::Modify(ModifyKind::Any), "/scripts/hello/Main.js"),
        );
        assert_eq!(
            change,
            Some(ScriptChange {
                script_dir: PathBuf::from("/scripts/hello"),
            })
        );
    }

    #[test]
    fn test_nested_module() {
        let change = event_to_change(
            Path::new("/scripts"),
            "js",
            &event(EventKind::Create(CreateKind::File), "/scripts/hello/lib/util.js"),
        );
        assert_eq!(change.unwrap().script_dir, PathBuf::from("/scripts/hello"));
    }

    #[test]
    fn test_ignored_events() {
        let root = Path::new("/scripts");
        assert!(event_to_change(root, "js", &event(EventKind::Access(AccessKind::Any), "/scripts/a/Main.js")).is_none());
        assert!(event_to_change(root, "js", &event(EventKind::Modify(ModifyKind::Any), "/scripts/a/notes.txt")).is_none());
        assert!(event_to_change(root, "js", &event(EventKind::Modify(ModifyKind::Any), "/scripts/loose.js")).is_none());
        assert!(event_to_change(root, "js", &event(EventKind::Modify(ModifyKind::Any), "/elsewhere/a/Main.js")).is_none());
    }
}
