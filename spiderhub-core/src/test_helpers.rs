//! Test doubles shared by the unit tests.
//!
//! `StubProvider` is an in-memory provider with canned responses that records
//! every call it receives. `ScriptedRuntime` "launches" providers from JSON
//! fixture files instead of spawning processes, so the loader, registry and
//! dispatcher can be exercised end to end without child processes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::ProvidersConfig;
use crate::provider::{
    Capability, LaunchSpec, Loader, Provider, ProviderError, ProviderRegistry, ProviderRuntime,
    SideTableStore,
};

fn all_exports() -> Vec<Capability> {
    let mut exports = Capability::REQUIRED.to_vec();
    exports.extend([Capability::GetName, Capability::Destroy]);
    exports
}

/// Fixture format understood by `ScriptedRuntime`
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "all_exports")]
    pub exports: Vec<Capability>,
    #[serde(default)]
    pub fail_init: bool,
    /// Capabilities that raise an error when called
    #[serde(default)]
    pub fail: Vec<Capability>,
    /// Canned responses keyed by wire name
    #[serde(default)]
    pub responses: HashMap<String, Value>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            name: None,
            exports: all_exports(),
            fail_init: false,
            fail: Vec::new(),
            responses: HashMap::new(),
        }
    }
}

/// Fixture JSON for a well-behaved provider named `name`
pub fn fixture(name: &str) -> Value {
    json!({ "name": name })
}

pub fn write_fixture(dir: &Path, file: &str, fixture: &Value) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(&path, fixture.to_string()).expect("write fixture");
    path
}

/// In-memory provider with canned responses
pub struct StubProvider {
    fixture: Fixture,
    calls: Mutex<Vec<(Capability, Value)>>,
    destroyed: AtomicUsize,
}

impl StubProvider {
    pub fn new(name: &str) -> Self {
        Self::from_fixture(Fixture {
            name: Some(name.to_string()),
            ..Fixture::default()
        })
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        Self {
            fixture,
            calls: Mutex::new(Vec::new()),
            destroyed: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_response(mut self, capability: Capability, response: Value) -> Self {
        self.fixture
            .responses
            .insert(capability.as_str().to_string(), response);
        self
    }

    #[must_use]
    pub fn failing(mut self, capability: Capability) -> Self {
        self.fixture.fail.push(capability);
        self
    }

    pub fn calls(&self) -> Vec<(Capability, Value)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, capability: Capability) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(c, _)| *c == capability)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn respond(&self, capability: Capability, args: Value, default: Value) -> Result<Value, ProviderError> {
        self.calls.lock().push((capability, args));
        if self.fixture.fail.contains(&capability) {
            return Err(ProviderError::Remote(format!("{capability} exploded")));
        }
        Ok(self
            .fixture
            .responses
            .get(capability.as_str())
            .cloned()
            .unwrap_or(default))
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn exports(&self) -> Vec<Capability> {
        self.fixture.exports.clone()
    }

    async fn init(&self, extend: &str) -> Result<(), ProviderError> {
        self.calls.lock().push((Capability::Init, json!([extend])));
        if self.fixture.fail_init {
            return Err(ProviderError::Remote("init exploded".to_string()));
        }
        Ok(())
    }

    async fn get_name(&self) -> Result<Option<String>, ProviderError> {
        Ok(self.fixture.name.clone())
    }

    async fn home_content(&self, filter: bool) -> Result<Value, ProviderError> {
        self.respond(Capability::HomeContent, json!([filter]), json!({"class": []}))
    }

    async fn home_video_content(&self) -> Result<Value, ProviderError> {
        self.respond(Capability::HomeVideoContent, json!([]), json!({"list": []}))
    }

    async fn category_content(
        &self,
        tid: &str,
        pg: &str,
        filter: bool,
        extend: &Value,
    ) -> Result<Value, ProviderError> {
        self.respond(
            Capability::CategoryContent,
            json!([tid, pg, filter, extend]),
            json!({"list": [], "page": pg}),
        )
    }

    async fn detail_content(&self, ids: &[String]) -> Result<Value, ProviderError> {
        let default = json!({"list": ids.iter().map(|id| json!({"vod_id": id})).collect::<Vec<_>>()});
        self.respond(Capability::DetailContent, json!([ids]), default)
    }

    async fn search_content(&self, key: &str, quick: bool, pg: &str) -> Result<Value, ProviderError> {
        self.respond(Capability::SearchContent, json!([key, quick, pg]), json!({"list": []}))
    }

    async fn player_content(
        &self,
        flag: &str,
        id: &str,
        vip_flags: &[String],
    ) -> Result<Value, ProviderError> {
        self.respond(
            Capability::PlayerContent,
            json!([flag, id, vip_flags]),
            json!({"parse": 0, "url": id}),
        )
    }

    async fn destroy(&self) -> Result<(), ProviderError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Runtime that builds `StubProvider`s from JSON fixture files
#[derive(Default)]
pub struct ScriptedRuntime {
    launched: Mutex<Vec<(LaunchSpec, Arc<StubProvider>)>>,
}

impl ScriptedRuntime {
    pub fn launched(&self) -> Vec<(LaunchSpec, Arc<StubProvider>)> {
        self.launched.lock().clone()
    }

    /// Most recent instance launched for `key`
    pub fn instance(&self, key: &str) -> Option<Arc<StubProvider>> {
        self.launched
            .lock()
            .iter()
            .rev()
            .find(|(spec, _)| spec.key == key)
            .map(|(_, provider)| provider.clone())
    }
}

#[async_trait]
impl ProviderRuntime for ScriptedRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Arc<dyn Provider>, ProviderError> {
        let content = tokio::fs::read_to_string(&spec.script)
            .await
            .map_err(ProviderError::Spawn)?;
        let fixture: Fixture = serde_json::from_str(&content)?;
        let provider = Arc::new(StubProvider::from_fixture(fixture));
        self.launched.lock().push((spec.clone(), provider.clone()));
        Ok(provider)
    }
}

fn test_providers_config(root: &Path) -> ProvidersConfig {
    ProvidersConfig {
        dir: root.join("spiders"),
        data_dir: root.join("data"),
        artifact_dir: Some(root.join("artifacts")),
        fetch_timeout_seconds: 5,
        call_timeout_seconds: 5,
        ..ProvidersConfig::default()
    }
}

/// Loader over a `ScriptedRuntime`; the returned dir holds its artifacts
pub fn scripted_loader() -> (Loader, TempDir) {
    let artifacts = tempfile::tempdir().expect("artifact dir");
    let config = ProvidersConfig {
        artifact_dir: Some(artifacts.path().to_path_buf()),
        fetch_timeout_seconds: 5,
        ..ProvidersConfig::default()
    };
    let loader = Loader::new(Arc::new(ScriptedRuntime::default()), &config).expect("loader");
    (loader, artifacts)
}

/// A registry wired to a `ScriptedRuntime` inside a scratch directory
pub struct TestRegistry {
    pub registry: Arc<ProviderRegistry>,
    pub runtime: Arc<ScriptedRuntime>,
    pub config: ProvidersConfig,
    pub store: SideTableStore,
    pub root: TempDir,
}

impl TestRegistry {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("scratch dir");
        let config = test_providers_config(root.path());
        std::fs::create_dir_all(&config.dir).expect("spiders dir");
        Self::with_config(root, config)
    }

    fn with_config(root: TempDir, config: ProvidersConfig) -> Self {
        let runtime = Arc::new(ScriptedRuntime::default());
        let loader = Loader::new(runtime.clone(), &config).expect("loader");
        let store = SideTableStore::new(&config.data_dir);
        let registry = Arc::new(ProviderRegistry::new(loader, store.clone()));
        Self {
            registry,
            runtime,
            config,
            store,
            root,
        }
    }

    /// A fresh registry over the same directories, as after a restart
    pub fn restarted(self) -> Self {
        let Self { root, config, .. } = self;
        Self::with_config(root, config)
    }

    pub fn artifact_count(&self) -> usize {
        std::fs::read_dir(self.config.artifact_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Write a fixture into the providers dir
    pub fn write_local(&self, file: &str, fixture: &Value) -> PathBuf {
        write_fixture(&self.config.dir, file, fixture)
    }
}
