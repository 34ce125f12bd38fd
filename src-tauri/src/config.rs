use std::marker::PhantomData;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::runtime::inventory::DEFAULT_BASE_URL;
use crate::runtime::model::DEFAULT_MODEL_ID;
use crate::runtime::supervisor::{RuntimeTuning, SupervisorSettings};

/// File name of the plugin store holding all app configuration
pub const STORE_FILE: &str = "config.json";

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

// ===== Runtime Configuration =====

/// Ollama runtime configuration (stored locally)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, specta::Type)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Where the runtime's HTTP API listens
    pub base_url: String,
    /// Model the app needs, matched by substring against installed names
    pub model_id: String,
    /// How long a spawned server may take to print its readiness marker
    pub start_timeout_secs: u32,
    /// Re-probes of an already running server before it is trusted
    pub verify_attempts: u32,
    pub verify_delay_ms: u32,
    /// Environment passed to the spawned server
    pub tuning: RuntimeTuning,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let settings = SupervisorSettings::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            start_timeout_secs: settings.start_timeout.as_secs() as u32,
            verify_attempts: settings.verify_attempts,
            verify_delay_ms: settings.verify_delay.as_millis() as u32,
            tuning: settings.tuning,
        }
    }
}

impl RuntimeConfig {
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            start_timeout: Duration::from_secs(u64::from(self.start_timeout_secs)),
            verify_attempts: self.verify_attempts,
            verify_delay: Duration::from_millis(u64::from(self.verify_delay_ms)),
            tuning: self.tuning.clone(),
        }
    }
}

impl ConfigKey<RuntimeConfig> {
    pub const RUNTIME: Self = Self::new("runtimeConfig");
}

// ===== Backend Configuration =====

/// Video backend configuration (stored locally)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, specta::Type)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Backend source directory, started from here in development mode
    pub directory: Option<String>,
    /// Python interpreter used to launch the backend
    pub python: String,
}

/// The backend checkout beside `src-tauri`; only used in development mode
const DEV_BACKEND_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../backend");

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            directory: Some(DEV_BACKEND_DIR.to_string()),
            python: if cfg!(target_os = "windows") {
                "python".to_string()
            } else {
                "python3".to_string()
            },
        }
    }
}

impl ConfigKey<BackendConfig> {
    pub const BACKEND: Self = Self::new("backendConfig");
}

// ===== Environment =====

/// Settings read from the process environment at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppEnv {
    /// Development mode auto-starts the backend and opens devtools
    pub dev_mode: bool,
}

impl AppEnv {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self::from_values(var("EODI_ENV").as_deref(), var("NODE_ENV").as_deref())
    }

    fn from_values(eodi_env: Option<&str>, node_env: Option<&str>) -> Self {
        let is_dev = |v: Option<&str>| v.is_some_and(|v| v.eq_ignore_ascii_case("development"));
        Self {
            dev_mode: is_dev(eodi_env) || is_dev(node_env),
        }
    }
}

// ===== Type-Safe Config Store =====

pub trait ConfigStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), String>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), String>;

    /// Stored value, or the default when missing or unreadable
    fn get_or_default<T: DeserializeOwned + Default>(&self, key: &ConfigKey<T>) -> T {
        self.get(key).unwrap_or_default()
    }
}

/// Type-safe configuration store that wraps the Tauri plugin store
#[derive(Clone)]
pub struct Config {
    store: std::sync::Arc<tauri_plugin_store::Store<tauri::Wry>>,
}

impl Config {
    pub fn new(store: std::sync::Arc<tauri_plugin_store::Store<tauri::Wry>>) -> Self {
        Self { store }
    }
}

impl ConfigStore for Config {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        self.store
            .get(key.key_name())
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), String> {
        let val = serde_json::to_value(value).map_err(|e| e.to_string())?;
        self.store.set(key.key_name(), val);
        self.store.save().map_err(|e| e.to_string())?;
        Ok(())
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), String> {
        self.store.delete(key.key_name());
        self.store.save().map_err(|e| e.to_string())?;
        Ok(())
    }
}
