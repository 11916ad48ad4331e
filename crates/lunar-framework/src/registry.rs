//! Plugin discovery, loading and hot reload.
//!
//! [`PluginRegistry`] owns the plugin directory. Every mutation (reload,
//! enable, disable) rescans storage from scratch and publishes a new
//! [`RegistrySnapshot`]; readers hold on to whatever snapshot they fetched,
//! so a dispatch in flight never observes a half-applied change.
//!
//! ```rust,ignore
//! let mut catalog = HandlerCatalog::new();
//! catalog.register_default::<Ping>("ping");
//!
//! let registry = PluginRegistry::new("plugins", catalog);
//! let (snapshot, failures) = registry.discover_and_load().await?;
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::catalog::{HandlerCatalog, PluginLoadContext};
use crate::error::{RegistryError, RegistryResult};
use crate::handler::BoxedHandler;
use crate::manifest::{Candidate, RawManifest, Trigger, UnitKind, candidates, write_enabled_flag};
use crate::watcher::{ManifestWatcher, RegistryCommand};

/// Default polling interval of the watcher.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Snapshot types
// =============================================================================

/// A loaded plugin.
pub struct PluginDescriptor {
    pub name: Arc<str>,
    pub trigger: Trigger,
    pub priority: i64,
    pub help: String,
    pub kind: UnitKind,
    pub manifest_path: PathBuf,
    /// The manifest's `[config]` table, handed to every invocation.
    pub config: Arc<Value>,
    pub handler: BoxedHandler,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .field("manifest_path", &self.manifest_path)
            .finish_non_exhaustive()
    }
}

/// Why a unit could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub manifest_path: PathBuf,
    pub reason: String,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.manifest_path.display())
    }
}

/// The outcome of one scan of the plugin directory.
///
/// Immutable; a reload produces a new snapshot.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    plugins: Vec<Arc<PluginDescriptor>>,
    failures: BTreeMap<String, LoadFailure>,
    disabled: BTreeSet<String>,
}

impl RegistrySnapshot {
    /// Builds a snapshot from plugins that are already in dispatch order.
    pub fn from_plugins(plugins: impl IntoIterator<Item = PluginDescriptor>) -> Self {
        Self {
            plugins: plugins.into_iter().map(Arc::new).collect(),
            ..Self::default()
        }
    }

    /// Loaded plugins in dispatch order.
    pub fn plugins(&self) -> &[Arc<PluginDescriptor>] {
        &self.plugins
    }

    /// Enabled units that failed to load.
    pub fn failures(&self) -> &BTreeMap<String, LoadFailure> {
        &self.failures
    }

    /// Units disabled on disk.
    pub fn disabled(&self) -> &BTreeSet<String> {
        &self.disabled
    }

    pub fn find(&self, name: &str) -> Option<&Arc<PluginDescriptor>> {
        self.plugins.iter().find(|p| &*p.name == name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// A loaded plugin as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSummary {
    pub name: String,
    pub trigger: Trigger,
    pub priority: i64,
    pub help: String,
}

/// Three disjoint views of the plugin directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginReport {
    /// Loaded and enabled, in dispatch order.
    pub loaded: Vec<PluginSummary>,
    /// Enabled on disk but failed to load, with the diagnostic.
    pub failed: BTreeMap<String, String>,
    /// Disabled on disk.
    pub disabled: BTreeSet<String>,
}

impl From<&RegistrySnapshot> for PluginReport {
    fn from(snapshot: &RegistrySnapshot) -> Self {
        Self {
            loaded: snapshot
                .plugins
                .iter()
                .map(|p| PluginSummary {
                    name: p.name.to_string(),
                    trigger: p.trigger.clone(),
                    priority: p.priority,
                    help: p.help.clone(),
                })
                .collect(),
            failed: snapshot
                .failures
                .iter()
                .map(|(name, failure)| (name.clone(), failure.to_string()))
                .collect(),
            disabled: snapshot.disabled.clone(),
        }
    }
}

// =============================================================================
// Scanning
// =============================================================================

fn scan(root: &Path, catalog: &HandlerCatalog) -> RegistryResult<RegistrySnapshot> {
    fs::create_dir_all(root).map_err(|e| RegistryError::storage(root, e))?;
    let units = candidates(root).map_err(|e| RegistryError::storage(root, e))?;

    let mut snapshot = RegistrySnapshot::default();
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();

    for unit in units {
        if let Some(first) = claimed.get(&unit.name) {
            let reason = format!("duplicate unit name, already provided by {}", first.display());
            warn!(plugin = %unit.name, path = %unit.entry.display(), "{reason}");
            snapshot.failures.insert(
                format!("{} ({})", unit.name, unit.entry.display()),
                LoadFailure {
                    manifest_path: unit.manifest_path,
                    reason,
                },
            );
            continue;
        }
        claimed.insert(unit.name.clone(), unit.entry.clone());

        match load_unit(&unit, catalog) {
            Ok(Some(plugin)) => snapshot.plugins.push(Arc::new(plugin)),
            Ok(None) => {
                debug!(plugin = %unit.name, "Plugin disabled on disk");
                snapshot.disabled.insert(unit.name);
            }
            Err(reason) => {
                warn!(plugin = %unit.name, %reason, "Failed to load plugin");
                snapshot.failures.insert(
                    unit.name,
                    LoadFailure {
                        manifest_path: unit.manifest_path,
                        reason,
                    },
                );
            }
        }
    }

    snapshot.plugins.sort_by_key(|p| p.priority);
    Ok(snapshot)
}

/// `Ok(None)` means disabled.
fn load_unit(unit: &Candidate, catalog: &HandlerCatalog) -> Result<Option<PluginDescriptor>, String> {
    if unit.legacy_disabled {
        return Ok(None);
    }
    let raw = RawManifest::read(&unit.manifest_path)?;
    if !raw.enabled() {
        return Ok(None);
    }
    let manifest = raw.validate()?;

    let ctx = PluginLoadContext {
        name: unit.name.clone(),
        manifest_path: unit.manifest_path.clone(),
        config: manifest.config.clone(),
    };
    let handler = catalog.instantiate(manifest.handler_key(&unit.name), &ctx)?;

    Ok(Some(PluginDescriptor {
        name: Arc::from(unit.name.as_str()),
        trigger: manifest.trigger,
        priority: manifest.priority,
        help: manifest.help,
        kind: unit.kind,
        manifest_path: unit.manifest_path.clone(),
        config: Arc::new(manifest.config),
        handler,
    }))
}

fn find_unit(root: &Path, name: &str) -> RegistryResult<Candidate> {
    candidates(root)
        .map_err(|e| RegistryError::storage(root, e))?
        .into_iter()
        .find(|unit| unit.name == name)
        .ok_or_else(|| RegistryError::PluginNotFound(name.to_string()))
}

fn enable_on_disk(root: &Path, name: &str) -> RegistryResult<()> {
    let mut unit = find_unit(root, name)?;

    if unit.legacy_disabled {
        let target = unit.enabled_entry();
        if target.exists() {
            return Err(RegistryError::Conflict {
                name: name.to_string(),
                target,
            });
        }
        fs::rename(&unit.entry, &target).map_err(|e| RegistryError::storage(&unit.entry, e))?;
        unit.manifest_path = match unit.kind {
            UnitKind::File => target.clone(),
            UnitKind::Directory => target.join(crate::manifest::ENTRYPOINT),
        };
        info!(plugin = name, to = %target.display(), "Dropped legacy disabled prefix");
    }

    write_enabled_flag(&unit.manifest_path, true)
        .map_err(|reason| RegistryError::manifest(&unit.manifest_path, reason))?;
    Ok(())
}

fn disable_on_disk(root: &Path, name: &str) -> RegistryResult<()> {
    let unit = find_unit(root, name)?;
    if unit.legacy_disabled {
        return Ok(());
    }
    write_enabled_flag(&unit.manifest_path, false)
        .map_err(|reason| RegistryError::manifest(&unit.manifest_path, reason))?;
    Ok(())
}

// =============================================================================
// PluginRegistry
// =============================================================================

/// Owner of the plugin directory and the current [`RegistrySnapshot`].
pub struct PluginRegistry {
    root: PathBuf,
    catalog: HandlerCatalog,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    mutation: AsyncMutex<()>,
    watcher: Mutex<Option<ManifestWatcher>>,
    watch_interval: Duration,
}

impl PluginRegistry {
    pub fn new(root: impl Into<PathBuf>, catalog: HandlerCatalog) -> Self {
        Self {
            root: root.into(),
            catalog,
            snapshot: RwLock::new(Arc::default()),
            mutation: AsyncMutex::new(()),
            watcher: Mutex::new(None),
            watch_interval: DEFAULT_WATCH_INTERVAL,
        }
    }

    /// Sets the watcher polling interval.
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &HandlerCatalog {
        &self.catalog
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().clone()
    }

    /// Loaded, failed and disabled units of the current snapshot.
    pub fn report(&self) -> PluginReport {
        PluginReport::from(&*self.snapshot())
    }

    /// Initial scan. Creates the plugin directory when missing.
    pub async fn discover_and_load(
        &self,
    ) -> RegistryResult<(Arc<RegistrySnapshot>, BTreeMap<String, LoadFailure>)> {
        let snapshot = self.reload().await?;
        let failures = snapshot.failures.clone();
        Ok((snapshot, failures))
    }

    /// Rescans storage and publishes a new snapshot.
    pub async fn reload(&self) -> RegistryResult<Arc<RegistrySnapshot>> {
        let _guard = self.mutation.lock().await;
        self.rescan().await
    }

    /// Enables `name` on disk and reloads.
    ///
    /// Enabling an enabled unit still reloads.
    pub async fn enable(&self, name: &str) -> RegistryResult<Arc<RegistrySnapshot>> {
        let _guard = self.mutation.lock().await;
        let root = self.root.clone();
        let name_owned = name.to_string();
        run_blocking(move || enable_on_disk(&root, &name_owned)).await?;
        info!(plugin = name, "Plugin enabled");
        self.rescan().await
    }

    /// Disables `name` on disk and reloads.
    pub async fn disable(&self, name: &str) -> RegistryResult<Arc<RegistrySnapshot>> {
        let _guard = self.mutation.lock().await;
        let root = self.root.clone();
        let name_owned = name.to_string();
        run_blocking(move || disable_on_disk(&root, &name_owned)).await?;
        info!(plugin = name, "Plugin disabled");
        self.rescan().await
    }

    /// Starts the storage watcher. A running watcher is left in place.
    pub fn start_watching(&self, commands: UnboundedSender<RegistryCommand>) -> RegistryResult<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            debug!("Plugin watcher already running");
            return Ok(());
        }
        let watcher = ManifestWatcher::spawn(self.root.clone(), self.watch_interval, commands)
            .map_err(RegistryError::Watcher)?;
        *slot = Some(watcher);
        Ok(())
    }

    /// Stops the watcher. Changes after this call are not reported.
    pub fn stop_watching(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Caller holds the mutation lock.
    async fn rescan(&self) -> RegistryResult<Arc<RegistrySnapshot>> {
        let root = self.root.clone();
        let catalog = self.catalog.clone();
        let snapshot = Arc::new(run_blocking(move || scan(&root, &catalog)).await?);

        info!(
            loaded = snapshot.plugins.len(),
            failed = snapshot.failures.len(),
            disabled = snapshot.disabled.len(),
            "Plugins loaded"
        );
        *self.snapshot.write() = Arc::clone(&snapshot);
        Ok(snapshot)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("root", &self.root)
            .field("catalog", &self.catalog)
            .field("watch_interval", &self.watch_interval)
            .finish_non_exhaustive()
    }
}

async fn run_blocking<T, F>(f: F) -> RegistryResult<T>
where
    F: FnOnce() -> RegistryResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RegistryError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct Noop;
    impl Handler for Noop {}

    fn catalog() -> HandlerCatalog {
        let mut catalog = HandlerCatalog::new();
        catalog
            .register_default::<Noop>("ping")
            .register_default::<Noop>("echo")
            .register_default::<Noop>("logger")
            .register("broken", |_| Err("refusing to start".into()));
        catalog
    }

    fn write(dir: &Path, file: &str, body: &str) {
        fs::write(dir.join(file), body).unwrap();
    }

    fn names(snapshot: &RegistrySnapshot) -> Vec<&str> {
        snapshot.plugins().iter().map(|p| &*p.name).collect()
    }

    #[tokio::test]
    async fn loads_in_priority_order_with_ties_by_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "logger.toml", "trigger = \"Any\"\npriority = 100");
        write(dir.path(), "ping.toml", "trigger = \"ping\"\npriority = 10");
        write(dir.path(), "echo.toml", "trigger = \"echo\"\npriority = 100");

        let registry = PluginRegistry::new(dir.path(), catalog());
        let (snapshot, failures) = registry.discover_and_load().await.unwrap();

        assert!(failures.is_empty());
        assert_eq!(names(&snapshot), vec!["ping", "echo", "logger"]);
        assert!(snapshot.find("logger").unwrap().trigger.is_wildcard());
    }

    #[tokio::test]
    async fn failures_are_recorded_per_unit() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ping.toml", "trigger = \"ping\"");
        write(dir.path(), "broken.toml", "trigger = \"b\"");
        write(dir.path(), "garbled.toml", "trigger = [");
        write(dir.path(), "nameless.toml", "priority = 1");
        write(dir.path(), "orphan.toml", "trigger = \"o\"");
        fs::create_dir(dir.path().join("ping_dir")).unwrap();
        write(dir.path(), "ping_dir/plugin.toml", "trigger = \"p\"\nhandler = \"ping\"");

        let registry = PluginRegistry::new(dir.path(), catalog());
        let (snapshot, failures) = registry.discover_and_load().await.unwrap();

        assert_eq!(names(&snapshot), vec!["ping", "ping_dir"]);
        let failed: Vec<_> = failures.keys().map(String::as_str).collect();
        assert_eq!(failed, vec!["broken", "garbled", "nameless", "orphan"]);
        assert!(failures["broken"].reason.contains("refusing to start"));
        assert!(failures["nameless"].reason.contains("trigger"));
        assert!(failures["orphan"].reason.contains("orphan"));
    }

    #[tokio::test]
    async fn manifest_config_is_kept_on_the_descriptor() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "echo.toml",
            "trigger = \"echo\"\n[config]\nrepeat = 2",
        );
        let registry = PluginRegistry::new(dir.path(), catalog());
        let (snapshot, _) = registry.discover_and_load().await.unwrap();
        assert_eq!(*snapshot.find("echo").unwrap().config, serde_json::json!({"repeat": 2}));
    }

    #[tokio::test]
    async fn panicking_factory_fails_only_its_unit() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "good.toml", "trigger = \"good\"");
        write(dir.path(), "bad.toml", "trigger = \"bad\"");
        let mut catalog = HandlerCatalog::new();
        catalog
            .register_default::<Noop>("good")
            .register("bad", |_| panic!("factory exploded"));

        let registry = PluginRegistry::new(dir.path(), catalog);
        let (snapshot, failures) = assert_ok!(registry.discover_and_load().await);

        assert_eq!(names(&snapshot), vec!["good"]);
        assert!(failures["bad"].reason.contains("factory exploded"));
    }

    #[tokio::test]
    async fn duplicate_names_keep_the_first_unit() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("echo")).unwrap();
        write(dir.path(), "echo/plugin.toml", "trigger = \"echo\"");
        write(dir.path(), "echo.toml", "trigger = \"echo2\"");

        let registry = PluginRegistry::new(dir.path(), catalog());
        let (snapshot, failures) = registry.discover_and_load().await.unwrap();

        assert_eq!(names(&snapshot), vec!["echo"]);
        assert_eq!(snapshot.plugins()[0].kind, UnitKind::Directory);
        assert_eq!(failures.len(), 1);
        assert!(failures.values().all(|f| f.reason.contains("duplicate")));
    }

    #[tokio::test]
    async fn missing_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("plugins");
        let registry = PluginRegistry::new(&root, catalog());
        let (snapshot, _) = assert_ok!(registry.discover_and_load().await);
        assert!(snapshot.is_empty());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn disable_then_enable_restores_metadata() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "ping.toml",
            "trigger = \"ping\"\npriority = 7\nhelp = \"replies pong\"",
        );
        let registry = PluginRegistry::new(dir.path(), catalog());
        registry.discover_and_load().await.unwrap();

        let snapshot = registry.disable("ping").await.unwrap();
        assert!(snapshot.is_empty());
        assert!(snapshot.disabled().contains("ping"));

        let again = registry.disable("ping").await.unwrap();
        assert!(again.disabled().contains("ping"));

        let snapshot = registry.enable("ping").await.unwrap();
        let ping = snapshot.find("ping").unwrap();
        assert_eq!(ping.priority, 7);
        assert_eq!(ping.help, "replies pong");
        assert_eq!(ping.trigger, Trigger::Literal("ping".into()));
        assert!(snapshot.disabled().is_empty());
    }

    #[tokio::test]
    async fn enable_drops_legacy_prefix() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "d_echo.toml", "trigger = \"echo\"");
        let registry = PluginRegistry::new(dir.path(), catalog());

        let (snapshot, _) = registry.discover_and_load().await.unwrap();
        assert!(snapshot.disabled().contains("echo"));

        let snapshot = registry.enable("echo").await.unwrap();
        assert!(snapshot.find("echo").is_some());
        assert!(dir.path().join("echo.toml").is_file());
        assert!(!dir.path().join("d_echo.toml").exists());
    }

    #[tokio::test]
    async fn enable_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("d_echo")).unwrap();
        write(dir.path(), "d_echo/plugin.toml", "trigger = \"echo\"");
        fs::create_dir(dir.path().join("echo")).unwrap();
        let registry = PluginRegistry::new(dir.path(), catalog());

        let err = assert_err!(registry.enable("echo").await);
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn unknown_unit_is_not_found() {
        let dir = TempDir::new().unwrap();
        let registry = PluginRegistry::new(dir.path(), catalog());
        assert!(matches!(
            registry.disable("ghost").await,
            Err(RegistryError::PluginNotFound(name)) if name == "ghost"
        ));
        assert!(matches!(
            registry.enable("ghost").await,
            Err(RegistryError::PluginNotFound(_))
        ));
    }

    #[tokio::test]
    async fn report_splits_three_ways() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ping.toml", "trigger = \"ping\"\nhelp = \"pong\"");
        write(dir.path(), "echo.toml", "trigger = \"echo\"\nenabled = false");
        write(dir.path(), "broken.toml", "trigger = \"b\"");
        let registry = PluginRegistry::new(dir.path(), catalog());
        registry.discover_and_load().await.unwrap();

        let report = registry.report();
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.loaded[0].name, "ping");
        assert_eq!(report.loaded[0].help, "pong");
        assert!(report.failed.contains_key("broken"));
        assert_eq!(report.disabled, BTreeSet::from(["echo".to_string()]));
    }

    #[tokio::test]
    async fn reload_rebuilds_handlers_and_keeps_old_snapshots_intact() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ping.toml", "trigger = \"ping\"");

        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let mut catalog = HandlerCatalog::new();
        catalog.register("ping", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Noop) as BoxedHandler)
        });

        let registry = PluginRegistry::new(dir.path(), catalog);
        let (before, _) = registry.discover_and_load().await.unwrap();
        write(dir.path(), "ping.toml", "trigger = \"pong\"");
        let after = registry.reload().await.unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(before.plugins()[0].trigger, Trigger::Literal("ping".into()));
        assert_eq!(after.plugins()[0].trigger, Trigger::Literal("pong".into()));
        assert!(Arc::ptr_eq(&registry.snapshot(), &after));
    }

    #[tokio::test]
    async fn watcher_lifecycle() {
        let dir = TempDir::new().unwrap();
        let registry = PluginRegistry::new(dir.path(), catalog())
            .with_watch_interval(Duration::from_millis(20));
        let (tx, mut rx) = unbounded_channel();

        registry.start_watching(tx.clone()).unwrap();
        registry.start_watching(tx).unwrap();
        assert!(registry.is_watching());

        write(dir.path(), "ping.toml", "trigger = \"ping\"");
        let command = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(command, RegistryCommand::Reload { .. }));

        registry.stop_watching();
        assert!(!registry.is_watching());
    }
}
