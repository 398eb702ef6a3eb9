use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use spiderhub_api::{create_router, AppState};
use spiderhub_core::bootstrap::Services;
use spiderhub_core::provider::{
    Capability, LaunchSpec, Provider, ProviderError, ProviderRegistry, ProviderRuntime,
    ProxyResponse,
};
use spiderhub_core::Config;
use tempfile::TempDir;
use tower::ServiceExt;

/// Provider answering every capability from a canned JSON document
struct CannedProvider {
    doc: Value,
    calls: Mutex<Vec<(Capability, Value)>>,
}

impl CannedProvider {
    fn new(doc: Value) -> Self {
        Self {
            doc,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls_to(&self, capability: Capability) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == capability)
            .map(|(_, args)| args.clone())
            .collect()
    }

    fn answer(&self, capability: Capability, args: Value) -> Result<Value, ProviderError> {
        self.calls.lock().unwrap().push((capability, args));
        let fails = self.doc["fail"]
            .as_array()
            .is_some_and(|f| f.contains(&json!(capability.as_str())));
        if fails {
            return Err(ProviderError::Remote(format!("{capability} failed")));
        }
        Ok(self.doc["responses"]
            .get(capability.as_str())
            .cloned()
            .unwrap_or_else(|| json!({"list": []})))
    }
}

#[async_trait]
impl Provider for CannedProvider {
    fn exports(&self) -> Vec<Capability> {
        let mut exports = Capability::REQUIRED.to_vec();
        exports.push(Capability::LocalProxy);
        exports
    }

    async fn init(&self, _extend: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn get_name(&self) -> Result<Option<String>, ProviderError> {
        Ok(self.doc["name"].as_str().map(ToString::to_string))
    }

    async fn home_content(&self, filter: bool) -> Result<Value, ProviderError> {
        self.answer(Capability::HomeContent, json!([filter]))
    }

    async fn home_video_content(&self) -> Result<Value, ProviderError> {
        self.answer(Capability::HomeVideoContent, json!([]))
    }

    async fn category_content(
        &self,
        tid: &str,
        pg: &str,
        filter: bool,
        extend: &Value,
    ) -> Result<Value, ProviderError> {
        self.answer(Capability::CategoryContent, json!([tid, pg, filter, extend]))
    }

    async fn detail_content(&self, ids: &[String]) -> Result<Value, ProviderError> {
        self.answer(Capability::DetailContent, json!([ids]))
    }

    async fn search_content(&self, key: &str, quick: bool, pg: &str) -> Result<Value, ProviderError> {
        self.answer(Capability::SearchContent, json!([key, quick, pg]))
    }

    async fn player_content(
        &self,
        flag: &str,
        id: &str,
        vip_flags: &[String],
    ) -> Result<Value, ProviderError> {
        self.answer(Capability::PlayerContent, json!([flag, id, vip_flags]))
    }

    async fn local_proxy(&self, params: &Value) -> Result<ProxyResponse, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((Capability::LocalProxy, params.clone()));
        Ok(ProxyResponse {
            status: 200,
            content_type: "image/png".to_string(),
            body: bytes::Bytes::from_static(b"\x89PNG"),
        })
    }
}

/// Runtime reading a provider's canned document from its source file
struct FixtureRuntime;

#[async_trait]
impl ProviderRuntime for FixtureRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Arc<dyn Provider>, ProviderError> {
        let content = tokio::fs::read_to_string(&spec.script)
            .await
            .map_err(ProviderError::Spawn)?;
        Ok(Arc::new(CannedProvider::new(serde_json::from_str(&content)?)))
    }
}

struct Harness {
    router: Router,
    registry: Arc<ProviderRegistry>,
    spiders_dir: PathBuf,
    _root: TempDir,
}

impl Harness {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.providers.dir = root.path().join("spiders");
        config.providers.data_dir = root.path().join("data");
        config.providers.artifact_dir = Some(root.path().join("artifacts"));

        let services = Services::with_runtime(&config, Arc::new(FixtureRuntime)).unwrap();
        let registry = services.registry.clone();
        let state = AppState::new(services, config.providers.clone());

        Self {
            router: create_router(state, &config.server.base_path),
            registry,
            spiders_dir: config.providers.dir,
            _root: root,
        }
    }

    fn embed(&self, key: &str, doc: Value) -> Arc<CannedProvider> {
        let provider = Arc::new(CannedProvider::new(doc));
        self.registry
            .register_embedded(key, key, provider.clone())
            .unwrap();
        provider
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn json(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.json(Method::GET, uri, None).await
    }

    async fn upload(&self, uri: &str, filename: &str, content: &str) -> (StatusCode, Value) {
        let boundary = "spiderhub-test-boundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n--{boundary}--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

#[tokio::test]
async fn test_health_and_banner_at_root() {
    let h = Harness::new();
    let (status, body) = h.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy"}));

    let (status, body) = h.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_list_spiders_envelope() {
    let h = Harness::new();
    h.embed("siteA", json!({"name": "A"}));

    let (status, body) = h.get("/api/spiders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["msg"], "success");
    assert_eq!(
        body["data"],
        json!([{"key": "siteA", "name": "siteA", "enabled": true, "type": "embedded"}])
    );
}

#[tokio::test]
async fn test_search_survives_failing_provider() {
    let h = Harness::new();
    h.embed(
        "a",
        json!({"responses": {"searchContent": {"list": [{"vod_id": "1", "vod_name": "one"}]}}}),
    );
    h.embed("b", json!({"fail": ["searchContent"]}));
    h.embed(
        "c",
        json!({"responses": {"searchContent": {"list": [{"vod_id": "2", "vod_name": "two"}]}}}),
    );

    let (status, body) = h.get("/api/search?kw=cat").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["vod_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a_1", "c_2"]);
}

#[tokio::test]
async fn test_detail_routes_composite_id() {
    let h = Harness::new();
    let site = h.embed(
        "siteA",
        json!({"responses": {"detailContent": {"list": [{"vod_id": "123", "vod_name": "Film"}]}}}),
    );

    let (status, body) = h.get("/api/detail?id=siteA_123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(site.calls_to(Capability::DetailContent), vec![json!([["123"]])]);
    let item = &body["data"]["list"][0];
    assert_eq!(item["vod_name"], "Film");
    assert_eq!(item["vod_play_url"], "");
    assert_eq!(item["episodes"], json!([]));

    let (status, body) = h.get("/api/detail?id=123").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(body["data"].is_null());

    let (status, _) = h.get("/api/detail?id=ghost_1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h.get("/api/detail").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].as_str().unwrap().contains("id"));
}

#[tokio::test]
async fn test_protocol_endpoint_returns_raw_json() {
    let h = Harness::new();
    let site = h.embed(
        "siteA",
        json!({"responses": {"homeContent": {"class": [{"type_id": "1", "type_name": "Movies"}]}}}),
    );

    let (status, body) = h.get("/api/spider/siteA").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"class": [{"type_id": "1", "type_name": "Movies"}]}));
    assert_eq!(site.calls_to(Capability::HomeContent), vec![json!([true])]);

    let (status, _) = h
        .get("/api/spider/siteA?act=category&t=5&pg=2&extend=%7B%22year%22%3A%222024%22%7D")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        site.calls_to(Capability::CategoryContent),
        vec![json!(["5", "2", false, {"year": "2024"}])]
    );

    let (status, body) = h.get("/api/spider/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_proxy_returns_provider_bytes() {
    let h = Harness::new();
    let site = h.embed("siteA", json!({}));

    let request = Request::builder()
        .uri("/api/spider/siteA/proxy?url=http%3A%2F%2Fimg%2Fa.png")
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"\x89PNG");
    assert_eq!(
        site.calls_to(Capability::LocalProxy),
        vec![json!({"url": "http://img/a.png"})]
    );
}

#[tokio::test]
async fn test_upload_then_delete_local_provider() {
    let h = Harness::new();
    let doc = json!({"name": "Uploaded"}).to_string();

    let (status, body) = h.upload("/api/spiders/upload?key=mysite", "mysite.py", &doc).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"], json!({"key": "mysite", "filename": "mysite.py"}));
    let file = h.spiders_dir.join("mysite.py");
    assert!(file.exists());
    assert_eq!(h.registry.get("mysite").unwrap().name, "Uploaded");

    // Reload works for local providers
    let (status, _) = h.json(Method::POST, "/api/spiders/mysite/reload", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.json(Method::DELETE, "/api/spiders/mysite", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["key"], "mysite");
    assert!(!file.exists());
    assert!(h.registry.get("mysite").is_none());
}

#[tokio::test]
async fn test_upload_rejects_wrong_extension_and_bad_source() {
    let h = Harness::new();

    let (status, body) = h.upload("/api/spiders/upload?key=notes", "notes.txt", "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(!h.spiders_dir.join("notes.txt").exists());

    // Unparseable provider: the stored file is removed again
    let (status, _) = h.upload("/api/spiders/upload?key=broken", "broken.py", "not json").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!h.spiders_dir.join("broken.py").exists());
    assert!(h.registry.get("broken").is_none());

    let (status, _) = h.upload("/api/spiders/upload?key=..%2Fescape", "x.py", "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_never_replaces_existing_file() {
    let h = Harness::new();
    std::fs::create_dir_all(&h.spiders_dir).unwrap();
    let existing = h.spiders_dir.join("mysite.py");
    let on_disk = json!({"name": "On Disk"}).to_string();
    std::fs::write(&existing, &on_disk).unwrap();

    let doc = json!({"name": "Uploaded"}).to_string();
    let (status, body) = h.upload("/api/spiders/upload?key=mysite", "mysite.py", &doc).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), on_disk);
    assert!(h.registry.get("mysite").is_none());

    // A registered provider's file survives a second upload under its key
    let (status, _) = h.upload("/api/spiders/upload?key=other", "other.py", &doc).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.upload("/api/spiders/upload?key=other", "other.py", "not json").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(std::fs::read_to_string(h.spiders_dir.join("other.py")).unwrap(), doc);

    let (status, _) = h.json(Method::POST, "/api/spiders/other/reload", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rename_and_conflicts() {
    let h = Harness::new();
    h.embed("siteA", json!({}));
    h.embed("siteB", json!({}));

    let (status, body) = h
        .json(Method::PUT, "/api/spiders/siteA", Some(json!({"new_key": "siteB"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (status, body) = h
        .json(
            Method::PUT,
            "/api/spiders/siteA",
            Some(json!({"new_key": "siteC", "new_name": "Site C"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["key"], "siteC");
    assert!(h.registry.get("siteA").is_none());
    assert_eq!(h.registry.get("siteC").unwrap().name, "Site C");
}

#[tokio::test]
async fn test_reload_only_for_local_and_enable_toggle() {
    let h = Harness::new();
    h.embed("siteA", json!({}));

    let (status, _) = h.json(Method::POST, "/api/spiders/siteA/reload", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h.json(Method::POST, "/api/spiders/siteA/disable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"key": "siteA", "enabled": false}));
    assert!(!h.registry.get("siteA").unwrap().enabled);

    let (status, _) = h.json(Method::POST, "/api/spiders/ghost/enable", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_classify_tags_provider_key() {
    let h = Harness::new();
    h.embed(
        "siteA",
        json!({"responses": {"homeVideoContent": {"class": [{"type_id": "1"}]}}}),
    );

    let (status, body) = h.get("/api/classify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{"type_id": "1", "key": "siteA"}]));
}
