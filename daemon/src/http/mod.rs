//! A5 — the HTTP shim binding `CoreApi` to the external interface table.
//! Grounded on `daemon::rpc::mod::DaemonRpcServer::new`'s
//! `HttpServer::new(...).bind(..).run()` wiring, including the same
//! security posture: a warning is logged if the bind address is not
//! loopback.

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer};
use log::warn;
use serde::Deserialize;
use std::sync::Arc;

use coord_common::wire::LockMode;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::api::CoreApi;
use crate::error::CoordError;

struct AppState {
    api: Arc<CoreApi>,
    prometheus: Option<PrometheusHandle>,
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "node_id": state.api.node_id(),
        "leader": state.api.leader().await,
        "term": state.api.term().await,
    }))
}

pub async fn leader(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "leader": state.api.leader().await,
        "term": state.api.term().await,
    }))
}

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    leader: String,
    term: u64,
}

pub async fn heartbeat(state: web::Data<AppState>, body: web::Json<HeartbeatRequest>) -> HttpResponse {
    state.api.heartbeat(&body.leader, body.term).await;
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

#[derive(Deserialize)]
pub struct AppendRequest {
    #[serde(flatten)]
    command: coord_common::wire::Command,
}

pub async fn append(state: web::Data<AppState>, body: web::Json<AppendRequest>) -> Result<HttpResponse, CoordError> {
    let index = state.api.append(body.into_inner().command).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "ok", "index": index})))
}

#[derive(Deserialize)]
pub struct LogRangeQuery {
    start: u64,
    end: u64,
}

pub async fn get_log(state: web::Data<AppState>, query: web::Query<LogRangeQuery>) -> Result<HttpResponse, CoordError> {
    let entries = state.api.log_range(query.start, query.end).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"log": entries})))
}

#[derive(Deserialize)]
pub struct LockRequest {
    resource: String,
    owner: String,
    #[serde(default = "default_mode")]
    mode: LockMode,
}

fn default_mode() -> LockMode {
    LockMode::Exclusive
}

pub async fn acquire_lock(state: web::Data<AppState>, body: web::Json<LockRequest>) -> Result<HttpResponse, CoordError> {
    let success = state.api.acquire_lock(&body.resource, &body.owner, body.mode).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"success": success})))
}

#[derive(Deserialize)]
pub struct ReleaseRequest {
    resource: String,
    owner: String,
}

pub async fn release_lock(state: web::Data<AppState>, body: web::Json<ReleaseRequest>) -> Result<HttpResponse, CoordError> {
    let success = state.api.release_lock(&body.resource, &body.owner).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"success": success})))
}

pub async fn wait_for(state: web::Data<AppState>) -> HttpResponse {
    let edges = state.api.wait_for().await;
    HttpResponse::Ok().json(serde_json::json!({"edges": edges}))
}

#[derive(Deserialize)]
pub struct CacheKeyQuery {
    key: String,
}

pub async fn cache_get(state: web::Data<AppState>, query: web::Query<CacheKeyQuery>) -> Result<HttpResponse, CoordError> {
    let value = state.api.cache_get(&query.key).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"value": value})))
}

#[derive(Deserialize)]
pub struct CachePutRequest {
    key: String,
    value: String,
}

pub async fn cache_put(state: web::Data<AppState>, body: web::Json<CachePutRequest>) -> Result<HttpResponse, CoordError> {
    state.api.cache_put(&body.key, body.value.clone()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"success": true})))
}

#[derive(Deserialize)]
pub struct CacheInvalidateRequest {
    key: String,
}

pub async fn cache_invalidate(state: web::Data<AppState>, body: web::Json<CacheInvalidateRequest>) -> HttpResponse {
    state.api.cache_invalidate(&body.key).await;
    HttpResponse::Ok().json(serde_json::json!({"status": "invalidated"}))
}

pub async fn cache_fetch(state: web::Data<AppState>, query: web::Query<CacheKeyQuery>) -> HttpResponse {
    match state.api.cache_fetch(&query.key).await {
        Some((value, state_before)) => HttpResponse::Ok().json(serde_json::json!({"value": value, "state": state_before})),
        None => HttpResponse::Ok().json(serde_json::json!({"value": null})),
    }
}

pub async fn cache_state(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.api.cache_state().await)
}

pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    match &state.prometheus {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().finish(),
    }
}

pub fn start(
    bind_addr: &str,
    api: Arc<CoreApi>,
    prometheus: Option<PrometheusHandle>,
) -> std::io::Result<(ServerHandle, impl std::future::Future<Output = std::io::Result<()>>)> {
    if !bind_addr.starts_with("127.0.0.1") && !bind_addr.starts_with("localhost") {
        warn!("binding coordination HTTP shim to {bind_addr} — ensure this is not exposed beyond a trusted network");
    }

    let state = web::Data::new(AppState { api, prometheus });
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .route("/raft/leader", web::get().to(leader))
            .route("/raft/heartbeat", web::post().to(heartbeat))
            .route("/raft/append", web::post().to(append))
            .route("/raft/log", web::get().to(get_log))
            .route("/locks/acquire", web::post().to(acquire_lock))
            .route("/locks/release", web::post().to(release_lock))
            .route("/locks/wait_for", web::get().to(wait_for))
            .route("/cache/get", web::get().to(cache_get))
            .route("/cache/put", web::post().to(cache_put))
            .route("/cache/invalidate", web::post().to(cache_invalidate))
            .route("/cache/fetch", web::get().to(cache_fetch))
            .route("/cache/state", web::get().to(cache_state))
            .route("/metrics", web::get().to(metrics))
    })
    .disable_signals()
    .bind(bind_addr)?
    .run();

    let handle = server.handle();
    Ok((handle, server))
}
