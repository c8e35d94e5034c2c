//! HTTP API layer exposing the document lifecycle endpoints.

pub mod auth_middleware;
pub mod client_ip;
pub mod rate_limit;
pub mod upload;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use inkra_core::auth::{self, Hs256Verifier, TokenVerifier};
use inkra_core::model::{ListQuery, SignRequest};
use inkra_core::store::DocumentStore;
use inkra_core::{DocError, DocumentService};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use auth_middleware::{require_auth, AuthContext};
use client_ip::ClientIp;
use rate_limit::{rate_limit, RateLimiter};
use upload::FormData;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DocumentService>,
    pub store: Arc<DocumentStore>,
    pub tokens: Arc<Hs256Verifier>,
    pub trust_proxy_headers: bool,
}

/// Domain error rendered as the JSON error envelope.
#[derive(Debug)]
pub struct ApiError(pub DocError);

impl From<DocError> for ApiError {
    fn from(err: DocError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DocError::Validation(_) | DocError::InvalidState(_) => StatusCode::BAD_REQUEST,
            DocError::Auth(_) => StatusCode::UNAUTHORIZED,
            DocError::Forbidden(_) => StatusCode::FORBIDDEN,
            DocError::NotFound(_) => StatusCode::NOT_FOUND,
            DocError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        error_response(status, &self.0.public_message())
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

fn success<T: serde::Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

type ApiResult = Result<Json<Value>, ApiError>;

pub fn router(state: AppState, config: &ServerConfig) -> anyhow::Result<Router> {
    let verifier: Arc<dyn TokenVerifier> = state.tokens.clone();

    let public = Router::new()
        .route("/login", post(login))
        .route("/docs/view/{id}", get(view_doc))
        .route("/docs/sign/{id}", post(sign_doc))
        .method_not_allowed_fallback(method_not_allowed);

    let protected = Router::new()
        .route("/docs", get(list_docs).post(create_doc))
        .route(
            "/docs/{id}",
            get(get_doc).put(update_doc).delete(delete_doc),
        )
        .method_not_allowed_fallback(method_not_allowed)
        .route_layer(from_fn_with_state(verifier, require_auth));

    let api = public
        .merge(protected)
        .fallback(not_found)
        .with_state(state);

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", api)
        .nest_service("/docs", ServeDir::new(&config.docs_dir));

    let app = match &config.static_dir {
        Some(dir) => {
            let index = ServeFile::new(dir.join("index.html"));
            app.fallback_service(ServeDir::new(dir).fallback(index))
        }
        None => app.fallback(not_found),
    };

    let app = match config.rate_limit_per_minute {
        0 => app,
        limit => {
            let limiter = Arc::new(RateLimiter::per_minute(limit, config.trust_proxy_headers));
            app.layer(from_fn_with_state(limiter, rate_limit))
        }
    };

    Ok(app
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(config.cors_origin.as_deref())?)
        .layer(TraceLayer::new_for_http()))
}

fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };
    let origin = HeaderValue::from_str(origin).context("invalid CORS origin")?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::LINK])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300)))
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Page not found")
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body.map_err(|e| DocError::validation(e.body_text()))?;
    if req.email.is_empty() || req.password.is_empty() {
        return Err(DocError::validation("Email or password is empty").into());
    }
    let token = auth::login(&state.store, &state.tokens, &req.email, &req.password)?;
    Ok(success(json!({ "token": token })))
}

#[derive(Deserialize, Default)]
struct ListParams {
    page: Option<String>,
    limit: Option<String>,
    keyword: Option<String>,
    signed: Option<String>,
}

fn flag(value: Option<&str>) -> Option<bool> {
    match value {
        Some("true") | Some("1") => Some(true),
        Some("false") | Some("0") => Some(false),
        _ => None,
    }
}

impl From<ListParams> for ListQuery {
    fn from(p: ListParams) -> Self {
        ListQuery {
            page: p.page.and_then(|v| v.trim().parse().ok()),
            limit: p.limit.and_then(|v| v.trim().parse().ok()),
            signed: flag(p.signed.as_deref()),
            keyword: p.keyword,
        }
    }
}

async fn list_docs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult {
    let page = state.service.list(&params.into()).await?;
    Ok(success(page))
}

#[derive(Deserialize, Default)]
struct GetParams {
    #[serde(rename = "includeDeleted")]
    include_deleted: Option<String>,
}

async fn get_doc(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GetParams>,
) -> ApiResult {
    let doc = if flag(params.include_deleted.as_deref()) == Some(true) {
        state.service.get_including_deleted(&id).await?
    } else {
        state.service.get(&id).await?
    };
    Ok(success(doc))
}

async fn view_doc(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let doc = state.service.view(&id).await?;
    Ok(success(doc))
}

async fn read_form(multipart: Result<Multipart, MultipartRejection>) -> Result<FormData, DocError> {
    match multipart {
        Ok(multipart) => FormData::read(multipart).await,
        Err(_) => Err(DocError::validation("Error parsing multipart form")),
    }
}

async fn create_doc(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let mut form = read_form(multipart).await?;
    let doc = state.service.create(form.draft(), form.file.take()).await?;
    info!(doc_id = %doc.id, "Document uploaded by {}", auth.admin);
    Ok(success(doc))
}

async fn update_doc(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let mut form = read_form(multipart).await?;
    let doc = state
        .service
        .update(&id, form.draft(), form.file.take())
        .await?;
    info!(doc_id = %doc.id, "Document updated by {}", auth.admin);
    Ok(success(doc))
}

async fn delete_doc(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult {
    state.service.delete(&id).await?;
    info!(doc_id = %id, "Document deleted by {}", auth.admin);
    Ok(success(Value::Null))
}

/// Unauthenticated; callers are gated by the document's IP whitelist.
async fn sign_doc(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ClientIp(client_ip): ClientIp,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    // A broken form is reported only after the record checks have passed.
    let (mut form, form_err) = match read_form(multipart).await {
        Ok(form) => (form, None),
        Err(e) => (FormData::default(), Some(e)),
    };
    let req = SignRequest {
        client_ip: client_ip.unwrap_or_default(),
        metadata: form.text("metadata").to_string(),
        remarks: form.text("remarks").to_string(),
        upload: form.file.take(),
    };
    match state.service.sign(&id, req).await {
        Ok(doc) => Ok(success(doc)),
        Err(e @ DocError::Validation(_)) => Err(form_err.unwrap_or(e).into()),
        Err(e) => Err(e.into()),
    }
}
