// Protocol Dispatcher
//
// Turns protocol actions and composite identifiers into calls on the right
// provider. Fan-out calls (classify, search) isolate failures per provider:
// a failing provider is logged and reported, never fatal to the aggregate.

pub mod composite;
pub mod protocol;

pub use composite::{compose, CompositeId, SEPARATOR};
pub use protocol::{Action, ProtocolQuery};

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, PartialProviderFailure, Result};
use crate::normalize::normalize_video_detail;
use crate::provider::{ProviderEntry, ProviderError, ProviderRegistry, ProxyResponse};

/// Merged result of a fan-out call
#[derive(Debug, Clone, Serialize)]
pub struct FanOut<T> {
    pub items: Vec<T>,
    pub failures: Vec<PartialProviderFailure>,
}

impl<T> Default for FanOut<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> FanOut<T> {
    fn fail(&mut self, key: &str, operation: &str, error: &ProviderError) {
        tracing::warn!(provider = %key, "{} failed: {}", operation, error);
        self.failures.push(PartialProviderFailure {
            key: key.to_string(),
            message: error.to_string(),
        });
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Single-provider protocol entry point
    pub async fn dispatch(&self, key: &str, query: &ProtocolQuery) -> Result<Value> {
        let entry = self.registry.require(key)?;
        let provider = &entry.instance;
        let pg = query.page();

        let result = match query.action() {
            Action::Home => provider.home_content(true).await,
            Action::HomeV2 => provider.home_content(false).await,
            Action::Category => {
                let t = required(&query.t, "t")?;
                provider.category_content(t, pg, false, &query.filter()).await
            }
            Action::Detail => {
                let t = required(&query.t, "t")?;
                provider.detail_content(&[t.to_string()]).await
            }
            Action::Search => {
                let wd = required(&query.wd, "wd")?;
                provider.search_content(wd, false, pg).await
            }
            Action::Play => {
                let t = required(&query.t, "t")?;
                provider.player_content(query.flag(), t, &[]).await
            }
        };

        result.map_err(|e| Error::provider(key, e))
    }

    /// Classification items of every enabled provider, tagged with its key
    pub async fn classify(&self) -> FanOut<Value> {
        let entries: Vec<ProviderEntry> = self
            .registry
            .list()
            .into_iter()
            .filter(|entry| entry.enabled)
            .collect();

        let calls = entries.iter().map(|entry| entry.instance.home_video_content());
        let results = join_all(calls).await;

        let mut out = FanOut::default();
        for (entry, result) in entries.iter().zip(results) {
            match result {
                Ok(home) => {
                    let classes = take_list(home, "class");
                    out.items.extend(classes.into_iter().map(|mut class| {
                        if let Value::Object(map) = &mut class {
                            map.insert("key".to_string(), Value::String(entry.key.clone()));
                        }
                        class
                    }));
                }
                Err(e) => out.fail(&entry.key, "homeVideoContent", &e),
            }
        }
        out
    }

    /// Category listing; `t` is a composite id or a plain provider key
    pub async fn videos(&self, t: &str, pg: &str) -> Result<Value> {
        let id = CompositeId::parse_or_plain(t);
        let entry = self.registry.require(id.key)?;
        entry
            .instance
            .category_content(id.native, pg, false, &json!({}))
            .await
            .map_err(|e| Error::provider(id.key, e))
    }

    /// Detail lookup with every listed record normalized
    pub async fn detail(&self, id: &str) -> Result<Value> {
        let id = CompositeId::parse(id)?;
        let entry = self.registry.require(id.key)?;
        let mut result = entry
            .instance
            .detail_content(&[id.native.to_string()])
            .await
            .map_err(|e| Error::provider(id.key, e))?;

        if let Some(Value::Array(list)) = result.get_mut("list") {
            for item in list.iter_mut() {
                *item = normalize_video_detail(item);
            }
        }
        Ok(result)
    }

    pub async fn play(&self, flag: &str, id: &str) -> Result<Value> {
        let id = CompositeId::parse(id)?;
        let entry = self.registry.require(id.key)?;
        entry
            .instance
            .player_content(flag, id.native, &[])
            .await
            .map_err(|e| Error::provider(id.key, e))
    }

    /// Search every registered provider concurrently
    pub async fn search(&self, keyword: &str, pg: &str) -> FanOut<Value> {
        let entries = self.registry.list();
        let calls = entries
            .iter()
            .map(|entry| entry.instance.search_content(keyword, false, pg));
        let results = join_all(calls).await;

        let mut out = FanOut::default();
        for (entry, result) in entries.iter().zip(results) {
            match result {
                Ok(found) => {
                    for mut video in take_list(found, "list") {
                        if let Some(native) = video.get("vod_id").map(native_id) {
                            video["vod_id"] = Value::String(compose(&entry.key, &native));
                        }
                        out.items.push(video);
                    }
                }
                Err(e) => out.fail(&entry.key, "searchContent", &e),
            }
        }

        tracing::debug!(
            "Search '{}' returned {} items ({} providers failed)",
            keyword,
            out.items.len(),
            out.failures.len()
        );
        out
    }

    pub async fn proxy(&self, key: &str, url: &str) -> Result<ProxyResponse> {
        let entry = self.registry.require(key)?;
        entry
            .instance
            .local_proxy(&json!({ "url": url }))
            .await
            .map_err(|e| Error::provider(key, e))
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str> {
    value.as_deref().ok_or(Error::MissingParameter(name))
}

fn take_list(mut value: Value, field: &str) -> Vec<Value> {
    match value.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn native_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
