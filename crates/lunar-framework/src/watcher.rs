//! Polling watcher for the plugin directory.
//!
//! Built on [`notify::PollWatcher`]: the directory is sampled every
//! `interval`, and each change to a unit manifest posts a
//! [`RegistryCommand::Reload`]. The watcher only observes. The registry
//! owner performs the reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::manifest::ENTRYPOINT;

/// Requests the watcher sends to the registry owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCommand {
    /// Storage changed; `changed` lists the manifests (or unit directories)
    /// that were modified, added or removed.
    Reload { changed: Vec<PathBuf> },
}

/// Whether `path` is a unit manifest or a unit directory under `root`.
fn is_unit_path(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let Some(parts) = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
    else {
        return false;
    };
    match parts.as_slice() {
        [entry, ..] if entry.starts_with('_') || entry.starts_with('.') => false,
        [entry] => Path::new(entry).extension().is_none_or(|ext| ext == "toml"),
        [_, file] => *file == ENTRYPOINT,
        _ => false,
    }
}

/// Handle to a running watcher. The polling thread ends with it.
pub(crate) struct ManifestWatcher {
    root: PathBuf,
    _watcher: PollWatcher,
}

impl ManifestWatcher {
    /// Takes a baseline of `root` and starts polling every `interval`.
    pub(crate) fn spawn(
        root: PathBuf,
        interval: Duration,
        commands: UnboundedSender<RegistryCommand>,
    ) -> notify::Result<Self> {
        // Manifest rewrites often land within one mtime second.
        let config = Config::default()
            .with_poll_interval(interval)
            .with_compare_contents(true);

        let filter_root = root.clone();
        let mut watcher = PollWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    let changed: Vec<PathBuf> = event
                        .paths
                        .iter()
                        .filter(|path| is_unit_path(&filter_root, path))
                        .cloned()
                        .collect();
                    if changed.is_empty() {
                        return;
                    }
                    debug!(kind = ?event.kind, ?changed, "Plugin storage changed");
                    if commands.send(RegistryCommand::Reload { changed }).is_err() {
                        debug!("Registry command channel closed, change ignored");
                    }
                }
                Err(e) => warn!(error = %e, "Plugin watcher error"),
            },
            config,
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        info!(root = %root.display(), ?interval, "Plugin watcher started");
        Ok(Self {
            root,
            _watcher: watcher,
        })
    }

    pub(crate) fn stop(self) {
        info!(root = %self.root.display(), "Plugin watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
    use tokio::time::timeout;

    async fn next(rx: &mut UnboundedReceiver<RegistryCommand>) -> RegistryCommand {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher did not report the change")
            .unwrap()
    }

    #[test]
    fn only_unit_paths_count() {
        let root = Path::new("/srv/plugins");
        assert!(is_unit_path(root, &root.join("ping.toml")));
        assert!(is_unit_path(root, &root.join("d_ping.toml")));
        assert!(is_unit_path(root, &root.join("echo")));
        assert!(is_unit_path(root, &root.join("echo").join(ENTRYPOINT)));

        assert!(!is_unit_path(root, root));
        assert!(!is_unit_path(root, &root.join("notes.txt")));
        assert!(!is_unit_path(root, &root.join("_scratch.toml")));
        assert!(!is_unit_path(root, &root.join(".cache").join(ENTRYPOINT)));
        assert!(!is_unit_path(root, &root.join("echo").join("data.toml")));
        assert!(!is_unit_path(root, Path::new("/elsewhere/ping.toml")));
    }

    #[tokio::test]
    async fn posts_reload_when_a_unit_appears() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ping.toml"), "trigger = \"ping\"").unwrap();

        let (tx, mut rx) = unbounded_channel();
        let watcher =
            ManifestWatcher::spawn(dir.path().to_path_buf(), Duration::from_millis(20), tx)
                .unwrap();

        fs::write(dir.path().join("notes.txt"), "not a unit").unwrap();
        let added = dir.path().join("echo.toml");
        fs::write(&added, "trigger = \"echo\"").unwrap();

        assert_eq!(next(&mut rx).await, RegistryCommand::Reload { changed: vec![added] });
        watcher.stop();
    }

    #[tokio::test]
    async fn posts_reload_when_a_manifest_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let ping = dir.path().join("ping.toml");
        fs::write(&ping, "trigger = \"ping\"").unwrap();

        let (tx, mut rx) = unbounded_channel();
        let watcher =
            ManifestWatcher::spawn(dir.path().to_path_buf(), Duration::from_millis(20), tx)
                .unwrap();

        fs::write(&ping, "trigger = \"pong\"\npriority = 3").unwrap();

        assert_eq!(next(&mut rx).await, RegistryCommand::Reload { changed: vec![ping] });
        watcher.stop();
    }
}
