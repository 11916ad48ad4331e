//! Main runtime orchestration.
//!
//! The runtime connects the session, loads plugins, then consumes inbound
//! frames and registry commands on a single task until shutdown.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lunar_runtime::LunarRuntime;
//!
//! let mut catalog = HandlerCatalog::new();
//! catalog.register_default::<Ping>("ping");
//!
//! // Loads lunar.toml from the current directory
//! let runtime = LunarRuntime::builder().catalog(catalog).build()?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use lunar_core::{BotApi, Event, EventClassifier, LifecycleEvent, lifecycle};
use lunar_framework::{
    Dispatcher, HandlerCatalog, PluginRegistry, RegistryCommand, RegistrySnapshot,
};
use lunar_transport::{ConnectionManager, Connector};

use crate::bot::Bot;
use crate::builtin::Builtins;
use crate::config::{ConfigLoader, LunarConfig};
use crate::error::RuntimeResult;
use crate::logging;

/// Upper bound on the `StopListening` dispatch during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The Lunar runtime: one session, one plugin registry, one consumer loop.
///
/// # Custom Configuration
///
/// ```rust,ignore
/// let runtime = LunarRuntime::builder()
///     .config_file("config/lunar.toml")
///     .profile("production")
///     .catalog(catalog)
///     .build()?;
///
/// // Or with a pre-loaded config and a connector of your own
/// let runtime = LunarRuntime::with_connector(config, catalog, connector);
/// ```
pub struct LunarRuntime {
    config: Arc<LunarConfig>,
    session: Arc<ConnectionManager>,
    registry: Arc<PluginRegistry>,
    classifier: EventClassifier,
    dispatcher: Dispatcher,
    builtins: Builtins,
    bot: Arc<Bot>,
    api: Arc<dyn BotApi>,
}

impl LunarRuntime {
    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime talking to `connection.url` over WebSocket.
    ///
    /// Initializes logging from the configuration first.
    pub fn from_config(config: LunarConfig, catalog: HandlerCatalog) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);
        let connector = default_connector(&config)?;
        Ok(Self::with_connector(config, catalog, connector))
    }

    /// Creates a runtime on top of an arbitrary connector.
    pub fn with_connector(
        config: LunarConfig,
        catalog: HandlerCatalog,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let config = Arc::new(config);
        let prefix = config.plugins.trigger_prefix.as_str();

        let session = Arc::new(ConnectionManager::new(
            connector,
            config.connection.session_config(),
        ));
        let registry = Arc::new(
            PluginRegistry::new(&config.plugins.dir, catalog)
                .with_watch_interval(config.plugins.watch_interval()),
        );
        let bot = Arc::new(Bot::new(
            Arc::clone(&session),
            Arc::clone(&registry),
            Arc::clone(&config),
        ));

        info!(
            endpoint = %config.connection.url,
            plugin_dir = %config.plugins.dir.display(),
            prefix,
            auto_reload = config.plugins.auto_reload,
            "Runtime created"
        );

        Self {
            classifier: EventClassifier::new(prefix),
            dispatcher: Dispatcher::new(prefix),
            builtins: Builtins::new(prefix),
            api: bot.clone(),
            config,
            session,
            registry,
            bot,
        }
    }

    pub fn config(&self) -> &LunarConfig {
        &self.config
    }

    pub fn bot(&self) -> &Arc<Bot> {
        &self.bot
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &Arc<ConnectionManager> {
        &self.session
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Lunar runtime starting. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` resolves or the session is closed.
    ///
    /// Fails only when the initial connection gives up or the plugin
    /// directory cannot be used.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.session.connect(false).await?;

        if let Err(e) = self.load_plugins().await {
            self.session.close().await;
            return Err(e);
        }

        let (commands_tx, mut commands) = mpsc::unbounded_channel();
        if self.config.plugins.auto_reload
            && let Err(e) = self.registry.start_watching(commands_tx.clone())
        {
            warn!(error = %e, "Plugin auto-reload disabled");
        }

        self.dispatch(Arc::new(lifecycle(LifecycleEvent::StartListening)))
            .await;
        info!("Listening for events");

        let inbound = self.session.receive();
        tokio::pin!(inbound);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                Some(command) = commands.recv() => {
                    let command = coalesce(command, &mut commands);
                    self.handle_command(command).await;
                }
                frame = inbound.next() => match frame {
                    // A shutdown request cuts off a dispatch still in progress.
                    Some(frame) => tokio::select! {
                        biased;

                        _ = &mut shutdown => {
                            warn!("Shutdown requested, abandoning the event in flight");
                            break;
                        }
                        _ = self.handle_frame(frame) => {}
                    },
                    None => {
                        info!("Inbound stream ended");
                        break;
                    }
                },
            }
        }

        drop(commands_tx);
        self.stop().await;
        Ok(())
    }

    async fn load_plugins(&self) -> RuntimeResult<()> {
        let (snapshot, failures) = self.registry.discover_and_load().await?;
        for (name, failure) in &failures {
            error!(plugin = %name, path = %failure.manifest_path.display(), reason = %failure.reason, "Plugin failed to load");
        }
        log_snapshot(&snapshot, "Plugins loaded");
        Ok(())
    }

    async fn stop(&self) {
        let stopping = self.dispatch(Arc::new(lifecycle(LifecycleEvent::StopListening)));
        if tokio::time::timeout(SHUTDOWN_GRACE, stopping).await.is_err() {
            warn!(grace = ?SHUTDOWN_GRACE, "Plugins did not finish stopping in time");
        }
        self.registry.stop_watching();
        self.session.close().await;

        let stats = self.bot.stats().snapshot();
        info!(
            received = stats.received,
            sent = stats.sent,
            uptime_secs = stats.uptime.as_secs(),
            "Runtime stopped"
        );
    }

    async fn handle_command(&self, command: RegistryCommand) {
        match command {
            RegistryCommand::Reload { changed } => {
                info!(changed = changed.len(), "Plugin files changed, reloading");
                for path in &changed {
                    debug!(path = %path.display(), "Changed");
                }
                match self.registry.reload().await {
                    Ok(snapshot) => log_snapshot(&snapshot, "Plugins reloaded"),
                    Err(e) => error!(error = %e, "Plugin reload failed"),
                }
            }
        }
    }

    async fn handle_frame(&self, frame: Value) {
        let event = Arc::new(self.classifier.classify(frame));
        match &*event {
            Event::Meta(_) => debug!("{event}"),
            Event::Message(_) => {
                self.bot.stats().record_received();
                info!("{event}");
            }
            _ => info!("{event}"),
        }

        if self.builtins.handle(&event, &self.bot).await {
            return;
        }
        self.dispatch(event).await;
    }

    async fn dispatch(&self, event: Arc<Event>) -> bool {
        let snapshot = self.registry.snapshot();
        self.dispatcher.dispatch(&event, &snapshot, &self.api).await
    }
}

impl std::fmt::Debug for LunarRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LunarRuntime")
            .field("endpoint", &self.config.connection.url)
            .field("registry", &self.registry)
            .field("bot", &self.bot)
            .finish_non_exhaustive()
    }
}

/// Folds every queued reload request into `first`.
fn coalesce(
    first: RegistryCommand,
    commands: &mut mpsc::UnboundedReceiver<RegistryCommand>,
) -> RegistryCommand {
    let RegistryCommand::Reload { mut changed } = first;
    while let Ok(RegistryCommand::Reload { changed: more }) = commands.try_recv() {
        changed.extend(more);
    }
    changed.sort();
    changed.dedup();
    RegistryCommand::Reload { changed }
}

fn log_snapshot(snapshot: &RegistrySnapshot, message: &str) {
    let names: Vec<&str> = snapshot.plugins().iter().map(|p| &*p.name).collect();
    info!(
        loaded = snapshot.len(),
        failed = snapshot.failures().len(),
        disabled = snapshot.disabled().len(),
        plugins = ?names,
        "{message}"
    );
}

#[cfg(feature = "ws-client")]
fn default_connector(config: &LunarConfig) -> RuntimeResult<Arc<dyn Connector>> {
    let connector = lunar_transport::WsConnector::new(config.connection.url.clone())
        .with_access_token(config.connection.access_token.clone());
    Ok(Arc::new(connector))
}

#[cfg(not(feature = "ws-client"))]
fn default_connector(_config: &LunarConfig) -> RuntimeResult<Arc<dyn Connector>> {
    Err(crate::error::RuntimeError::NoConnector)
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                ctrl_c().await;
                info!("Received Ctrl+C, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`LunarRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    catalog: HandlerCatalog,
    connector: Option<Arc<dyn Connector>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            catalog: HandlerCatalog::new(),
            connector: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: LunarConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Handler implementations plugin manifests can refer to.
    pub fn catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the WebSocket connector.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Loads the configuration, initializes logging and builds the runtime.
    pub fn build(self) -> RuntimeResult<LunarRuntime> {
        let config = self.config_loader.load()?;
        match self.connector {
            Some(connector) => {
                logging::init_from_config(&config.logging);
                Ok(LunarRuntime::with_connector(config, self.catalog, connector))
            }
            None => LunarRuntime::from_config(config, self.catalog),
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
