//! Cross-provider views
//!
//! Ids handed out here are composite (`{key}_{nativeId}`) so follow-up
//! requests route back to the provider that produced them.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use spiderhub_core::importer::ImportReport;
use spiderhub_core::Error;

use crate::http::{AppResult, AppState, Envelope};

#[derive(Debug, Deserialize)]
pub struct VideosQuery {
    pub t: Option<String>,
    pub pg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlayUrlQuery {
    pub flag: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub kw: Option<String>,
    pub pg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub config_url: String,
}

/// Missing query parameters are reported in the envelope, not as a bare 400
pub(crate) fn required(value: Option<String>, name: &'static str) -> Result<String, Error> {
    value.ok_or(Error::MissingParameter(name))
}

fn page(pg: Option<String>) -> String {
    pg.filter(|pg| !pg.is_empty()).unwrap_or_else(|| "1".to_string())
}

pub async fn classify(State(state): State<AppState>) -> Envelope<Vec<Value>> {
    Envelope::success(state.dispatcher.classify().await.items)
}

pub async fn videos(
    State(state): State<AppState>,
    Query(query): Query<VideosQuery>,
) -> AppResult<Envelope<Value>> {
    let t = required(query.t, "t")?;
    let result = state.dispatcher.videos(&t, &page(query.pg)).await?;
    Ok(Envelope::success(result))
}

pub async fn detail(
    State(state): State<AppState>,
    Query(query): Query<DetailQuery>,
) -> AppResult<Envelope<Value>> {
    let id = required(query.id, "id")?;
    Ok(Envelope::success(state.dispatcher.detail(&id).await?))
}

pub async fn play_url(
    State(state): State<AppState>,
    Query(query): Query<PlayUrlQuery>,
) -> AppResult<Envelope<Value>> {
    let flag = required(query.flag, "flag")?;
    let id = required(query.id, "id")?;
    Ok(Envelope::success(state.dispatcher.play(&flag, &id).await?))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Envelope<Vec<Value>>> {
    let kw = required(query.kw, "kw")?;
    let found = state.dispatcher.search(&kw, &page(query.pg)).await;
    Ok(Envelope::success(found.items))
}

pub async fn import_tvbox_config(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> AppResult<Envelope<ImportReport>> {
    let report = state
        .importer
        .import_into(&state.registry, &request.config_url)
        .await?;
    Ok(Envelope::success(report))
}
