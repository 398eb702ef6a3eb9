//! Process-backed providers.
//!
//! Every provider file runs as its own child process and speaks
//! newline-delimited JSON over stdin/stdout:
//!
//! ```text
//! -> {"id":1,"method":"detailContent","params":[["123"]]}
//! <- {"id":1,"result":{"list":[...]}}
//! <- {"id":2,"error":"upstream returned 503"}
//! ```
//!
//! The first exchange is always `describe`, answered with
//! `{"exports": ["homeContent", ...]}`. Lines on stdout that are not JSON
//! responses are ignored, so providers may print diagnostics freely.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::{
    Capability, LaunchSpec, Provider, ProviderError, ProviderRuntime, ProxyResponse, Result,
};
use crate::config::ProvidersConfig;

/// Environment variable carrying the provider's module namespace
pub const MODULE_ENV: &str = "SPIDERHUB_MODULE";
/// Environment variable carrying the provider's registry key
pub const KEY_ENV: &str = "SPIDERHUB_PROVIDER_KEY";

const DESCRIBE_METHOD: &str = "describe";

#[derive(Serialize)]
struct RpcRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct DescribeResult {
    #[serde(default)]
    exports: Vec<String>,
}

/// Runtime launching each provider as a child process
pub struct ProcessRuntime {
    interpreter: Option<String>,
    call_timeout: Duration,
}

impl ProcessRuntime {
    pub fn new(interpreter: Option<String>, call_timeout: Duration) -> Self {
        Self {
            interpreter,
            call_timeout,
        }
    }

    pub fn from_config(config: &ProvidersConfig) -> Self {
        Self::new(config.interpreter.clone(), config.call_timeout())
    }

    fn command(&self, script: &Path) -> Command {
        match &self.interpreter {
            Some(program) => {
                let mut command = Command::new(program);
                command.arg(script);
                command
            }
            None => Command::new(script),
        }
    }
}

#[async_trait]
impl ProviderRuntime for ProcessRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Arc<dyn Provider>> {
        let mut child = self
            .command(&spec.script)
            .env(MODULE_ENV, &spec.namespace)
            .env(KEY_ENV, &spec.key)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProviderError::Spawn)?;

        let stdin = child.stdin.take().ok_or(ProviderError::Closed)?;
        let stdout = child.stdout.take().ok_or(ProviderError::Closed)?;

        if let Some(stderr) = child.stderr.take() {
            let key = spec.key.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(provider = %key, "{}", line);
                }
            });
        }

        let mut pipes = Pipes {
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        // A provider that never answers describe is killed on drop
        let described = tokio::time::timeout(
            self.call_timeout,
            pipes.exchange(0, DESCRIBE_METHOD, json!([])),
        )
        .await
        .map_err(|_| ProviderError::Timeout {
            method: DESCRIBE_METHOD.to_string(),
            timeout: self.call_timeout,
        })??;

        let described: DescribeResult = serde_json::from_value(described)?;
        let exports = described
            .exports
            .iter()
            .filter_map(|name| {
                let capability = Capability::from_wire(name);
                if capability.is_none() {
                    tracing::debug!(provider = %spec.key, "Ignoring unknown export '{}'", name);
                }
                capability
            })
            .collect();

        tracing::debug!(
            provider = %spec.key,
            namespace = %spec.namespace,
            "Launched provider process {}",
            spec.script.display()
        );

        Ok(Arc::new(ProcessProvider {
            key: spec.key.clone(),
            exports,
            pipes: Mutex::new(pipes),
            child: Mutex::new(Some(child)),
            next_id: AtomicU64::new(1),
            call_timeout: self.call_timeout,
        }))
    }
}

struct Pipes {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl Pipes {
    /// Send one request and wait for the response carrying the same id
    async fn exchange(&mut self, id: u64, method: &str, params: Value) -> Result<Value> {
        let mut line = serde_json::to_vec(&RpcRequest { id, method, params })?;
        line.push(b'\n');
        self.stdin.write_all(&line).await?;
        self.stdin.flush().await?;

        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(ProviderError::Closed);
            };

            let Ok(response) = serde_json::from_str::<RpcResponse>(&line) else {
                tracing::trace!("Ignoring non-protocol provider output: {}", line);
                continue;
            };

            match response.id {
                Some(response_id) if response_id == id => {}
                // Late answer to a call that already timed out
                _ => continue,
            }

            if let Some(error) = response.error {
                let message = match error {
                    Value::String(message) => message,
                    other => other.to_string(),
                };
                return Err(ProviderError::Remote(message));
            }

            return Ok(response.result.unwrap_or(Value::Null));
        }
    }
}

/// A provider living in a child process.
///
/// Calls are serialized: one request is in flight per provider at a time,
/// so provider code never has to be reentrant. Each call is bounded by the
/// runtime's call timeout.
pub struct ProcessProvider {
    key: String,
    exports: Vec<Capability>,
    pipes: Mutex<Pipes>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl ProcessProvider {
    async fn call(&self, capability: Capability, params: Value) -> Result<Value> {
        if !self.exports.contains(&capability) {
            return Err(ProviderError::Unsupported(capability));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut pipes = self.pipes.lock().await;

        tokio::time::timeout(
            self.call_timeout,
            pipes.exchange(id, capability.as_str(), params),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                provider = %self.key,
                "Call '{}' timed out after {:?}",
                capability,
                self.call_timeout
            );
            ProviderError::Timeout {
                method: capability.as_str().to_string(),
                timeout: self.call_timeout,
            }
        })?
    }
}

#[async_trait]
impl Provider for ProcessProvider {
    fn exports(&self) -> Vec<Capability> {
        self.exports.clone()
    }

    async fn init(&self, extend: &str) -> Result<()> {
        self.call(Capability::Init, json!([extend])).await?;
        Ok(())
    }

    async fn get_name(&self) -> Result<Option<String>> {
        if !self.exports.contains(&Capability::GetName) {
            return Ok(None);
        }
        let name = self.call(Capability::GetName, json!([])).await?;
        Ok(name.as_str().map(ToString::to_string))
    }

    async fn home_content(&self, filter: bool) -> Result<Value> {
        self.call(Capability::HomeContent, json!([filter])).await
    }

    async fn home_video_content(&self) -> Result<Value> {
        self.call(Capability::HomeVideoContent, json!([])).await
    }

    async fn category_content(
        &self,
        tid: &str,
        pg: &str,
        filter: bool,
        extend: &Value,
    ) -> Result<Value> {
        self.call(Capability::CategoryContent, json!([tid, pg, filter, extend]))
            .await
    }

    async fn detail_content(&self, ids: &[String]) -> Result<Value> {
        self.call(Capability::DetailContent, json!([ids])).await
    }

    async fn search_content(&self, key: &str, quick: bool, pg: &str) -> Result<Value> {
        self.call(Capability::SearchContent, json!([key, quick, pg]))
            .await
    }

    async fn player_content(&self, flag: &str, id: &str, vip_flags: &[String]) -> Result<Value> {
        self.call(Capability::PlayerContent, json!([flag, id, vip_flags]))
            .await
    }

    async fn local_proxy(&self, params: &Value) -> Result<ProxyResponse> {
        let raw = self.call(Capability::LocalProxy, json!([params])).await?;
        parse_proxy_response(raw)
    }

    async fn destroy(&self) -> Result<()> {
        let hook = if self.exports.contains(&Capability::Destroy) {
            self.call(Capability::Destroy, json!([])).await.map(|_| ())
        } else {
            Ok(())
        };

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(provider = %self.key, "Provider process already exited: {}", e);
            }
            let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        }

        hook
    }
}

/// Decode `[status, content_type, data]`; `data` is text or `{"base64": ...}`
fn parse_proxy_response(raw: Value) -> Result<ProxyResponse> {
    let Value::Array(parts) = raw else {
        return Err(ProviderError::Protocol(
            "localProxy must return [status, content_type, data]".to_string(),
        ));
    };
    let [status, content_type, data, ..] = parts.as_slice() else {
        return Err(ProviderError::Protocol(format!(
            "localProxy returned {} elements, expected 3",
            parts.len()
        )));
    };

    let status = status
        .as_u64()
        .and_then(|s| u16::try_from(s).ok())
        .ok_or_else(|| ProviderError::Protocol(format!("invalid proxy status: {status}")))?;
    let content_type = content_type.as_str().unwrap_or("application/octet-stream").to_string();

    let body = match data {
        Value::String(text) => bytes::Bytes::from(text.clone()),
        Value::Object(map) => {
            let encoded = map.get("base64").and_then(Value::as_str).ok_or_else(|| {
                ProviderError::Protocol("proxy data object must carry 'base64'".to_string())
            })?;
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| ProviderError::Protocol(format!("invalid base64 proxy data: {e}")))?
                .into()
        }
        Value::Null => bytes::Bytes::new(),
        other => bytes::Bytes::from(other.to_string()),
    };

    Ok(ProxyResponse {
        status,
        content_type,
        body,
    })
}
