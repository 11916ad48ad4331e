//! Explicit registration of handler implementations.
//!
//! Manifests on disk refer to handlers by key. The catalog maps each key to
//! a factory that builds the handler from the manifest's `[config]` table.
//! Factories run on every load, so a reload picks up config changes.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::dispatcher::panic_message;
use crate::error::BoxError;
use crate::handler::{BoxedHandler, Handler};

/// Input handed to a handler factory.
#[derive(Debug, Clone)]
pub struct PluginLoadContext {
    /// Unit name.
    pub name: String,
    /// Path of the manifest being loaded.
    pub manifest_path: PathBuf,
    /// The manifest's `[config]` table (`Null` when absent).
    pub config: Value,
}

impl PluginLoadContext {
    /// Deserializes the config table into `T`.
    ///
    /// A missing table deserializes from an empty object so that types with
    /// all-default fields work without one.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T, BoxError> {
        config_as(&self.config)
    }
}

pub(crate) fn config_as<T: DeserializeOwned>(config: &Value) -> Result<T, BoxError> {
    let value = match config {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(Into::into)
}

type Factory = dyn Fn(&PluginLoadContext) -> Result<BoxedHandler, BoxError> + Send + Sync;

/// Handler factories by key.
#[derive(Default, Clone)]
pub struct HandlerCatalog {
    factories: HashMap<String, Arc<Factory>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `key`, replacing any previous one.
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&PluginLoadContext) -> Result<BoxedHandler, BoxError> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
        self
    }

    /// Registers a handler built with `Default` on every load.
    pub fn register_default<H>(&mut self, key: impl Into<String>) -> &mut Self
    where
        H: Handler + Default,
    {
        self.register(key, |_| Ok(Arc::new(H::default()) as BoxedHandler))
    }

    /// Registers a shared instance; every load gets the same handler.
    pub fn register_instance(&mut self, key: impl Into<String>, handler: BoxedHandler) -> &mut Self {
        self.register(key, move |_| Ok(handler.clone()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Builds the handler registered under `key`.
    ///
    /// A panicking factory is reported like a failing one.
    pub(crate) fn instantiate(
        &self,
        key: &str,
        ctx: &PluginLoadContext,
    ) -> Result<BoxedHandler, String> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| format!("no handler registered under '{key}'"))?;
        match catch_unwind(AssertUnwindSafe(|| factory(ctx))) {
            Ok(built) => built.map_err(|e| format!("handler factory failed: {e}")),
            Err(panic) => Err(format!("handler factory panicked: {}", panic_message(&*panic))),
        }
    }
}

impl fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerCatalog")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Default)]
    struct Noop;
    impl Handler for Noop {}

    #[derive(Debug, Deserialize, PartialEq)]
    struct Settings {
        #[serde(default = "default_greeting")]
        greeting: String,
    }

    fn default_greeting() -> String {
        "hi".into()
    }

    fn ctx(config: Value) -> PluginLoadContext {
        PluginLoadContext {
            name: "greeter".into(),
            manifest_path: PathBuf::from("plugins/greeter.toml"),
            config,
        }
    }

    #[test]
    fn unknown_key_is_reported() {
        let catalog = HandlerCatalog::new();
        let err = catalog.instantiate("missing", &ctx(Value::Null)).err().unwrap();
        assert!(err.contains("missing"));
    }

    #[test]
    fn factory_errors_are_reported() {
        let mut catalog = HandlerCatalog::new();
        catalog.register("strict", |ctx| {
            let _: Settings = ctx.config_as()?;
            Ok(Arc::new(Noop) as BoxedHandler)
        });
        assert!(catalog.instantiate("strict", &ctx(serde_json::json!({"greeting": 5}))).is_err());
        assert!(catalog.instantiate("strict", &ctx(Value::Null)).is_ok());
    }

    #[test]
    fn factory_panics_are_reported() {
        let mut catalog = HandlerCatalog::new();
        catalog.register("bad", |_| panic!("factory exploded"));
        let err = catalog.instantiate("bad", &ctx(Value::Null)).err().unwrap();
        assert!(err.contains("panicked"));
        assert!(err.contains("factory exploded"));
    }

    #[test]
    fn config_defaults_apply_without_table() {
        let settings: Settings = ctx(Value::Null).config_as().unwrap();
        assert_eq!(settings.greeting, "hi");
    }

    #[test]
    fn keys_are_sorted() {
        let mut catalog = HandlerCatalog::new();
        catalog.register_default::<Noop>("b").register_default::<Noop>("a");
        assert_eq!(catalog.keys(), vec!["a", "b"]);
        assert!(catalog.contains("a"));
    }
}
