//! TVBox protocol endpoints
//!
//! `/spider/{key}` answers with the provider's raw JSON, not the envelope,
//! so TVBox clients can point a site directly at it.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use spiderhub_core::dispatch::ProtocolQuery;

use crate::http::aggregate::required;
use crate::http::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

pub async fn spider_api(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ProtocolQuery>,
) -> AppResult<Json<Value>> {
    let result = state.dispatcher.dispatch(&key, &query).await?;
    Ok(Json(result))
}

/// Bytes served by the provider's local proxy (images, keys, playlists)
pub async fn spider_proxy(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ProxyQuery>,
) -> AppResult<Response> {
    let url = required(query.url, "url")?;
    let proxied = state.dispatcher.proxy(&key, &url).await?;

    let status = StatusCode::from_u16(proxied.status).map_err(|_| {
        AppError::internal_server_error(format!(
            "Provider '{key}' returned invalid proxy status {}",
            proxied.status
        ))
    })?;

    Ok((
        status,
        [(header::CONTENT_TYPE, proxied.content_type)],
        proxied.body,
    )
        .into_response())
}
