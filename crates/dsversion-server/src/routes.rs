//! HTTP routes for the server.
//!
//! The download redirect lives at the catalog's own URL layout; everything
//! else is a JSON API under `/api`. The acting user is taken from the
//! [`ACTING_USER_HEADER`] header, and its absence means anonymous.

use crate::state::AppState;
use axum::{
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use dsversion_core::diff::CURRENT;
use dsversion_core::{
    ActionContext, CreateVersion, ErrorKind, OwnerRef, VersionError, VersionPatch,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn, Span};
use url::Url;

/// Request header naming the acting user.
pub const ACTING_USER_HEADER: &str = "x-acting-user";

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // ===================
        // Download redirect
        // ===================
        .route(
            "/dataset/{id}/resource/{resource_id}/version/{version}/download",
            get(version_download),
        )
        // ===================
        // Dataset endpoints
        // ===================
        .route(
            "/api/dataset/{id}/versions",
            get(dataset_versions).post(dataset_version_create),
        )
        .route("/api/dataset/{id}/versions/latest", get(dataset_latest))
        .route("/api/dataset/{id}/show", get(dataset_show))
        .route("/api/dataset/{id}/diff", get(dataset_diff))
        .route("/api/dataset/{id}/restore/{version}", post(dataset_restore))
        // ===================
        // Resource endpoints
        // ===================
        .route(
            "/api/resource/{id}/versions",
            get(resource_versions)
                .post(resource_version_create)
                .delete(resource_versions_clear),
        )
        .route("/api/resource/{id}/show", get(resource_show))
        // ===================
        // Version endpoints
        // ===================
        .route(
            "/api/version/{id}",
            get(version_show)
                .put(version_update)
                .patch(version_patch)
                .delete(version_delete),
        )
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, _span: &Span| {
                        debug!(
                            status = %response.status(),
                            latency = ?latency,
                            "response"
                        );
                    },
                ),
        )
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
    code: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);

impl ApiError {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    fn not_found(msg: impl Into<String>) -> ApiFailure {
        (StatusCode::NOT_FOUND, Json(Self::new(msg, "NOT_FOUND")))
    }

    fn bad_request(msg: impl Into<String>) -> ApiFailure {
        (StatusCode::BAD_REQUEST, Json(Self::new(msg, "BAD_REQUEST")))
    }

    fn forbidden(msg: impl Into<String>) -> ApiFailure {
        (StatusCode::FORBIDDEN, Json(Self::new(msg, "NOT_AUTHORIZED")))
    }

    fn internal(msg: impl Into<String>) -> ApiFailure {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(msg, "INTERNAL_ERROR")),
        )
    }

    fn from_version(err: VersionError) -> ApiFailure {
        match err.kind() {
            ErrorKind::NotFound => Self::not_found(err.to_string()),
            ErrorKind::Validation => Self::bad_request(err.to_string()),
            ErrorKind::NotAuthorized => Self::forbidden(err.to_string()),
            ErrorKind::Internal => {
                warn!(error = %err, "Request failed");
                Self::internal(err.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiFailure>;

/// Build the action context from the request headers.
fn acting(headers: &HeaderMap) -> ActionContext {
    headers
        .get(ACTING_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(ActionContext::anonymous, ActionContext::user)
}

// =============================================================================
// Global endpoints
// =============================================================================

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Download redirect
// =============================================================================

/// Redirect a versioned download to the live download endpoint pinned to
/// the version's activity. The incoming query string is carried over.
///
/// `{id}` may be the dataset's id or name but must own `{resource_id}`; the
/// redirect always names the dataset by id.
async fn version_download(
    State(state): State<AppState>,
    Path((id, resource_id, version)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let owner_ref = OwnerRef::resource(&resource_id);
    let owner = state
        .versioning
        .versions
        .resolve_owner(&owner_ref)
        .await
        .map_err(ApiError::from_version)?;
    let dataset_name = owner.package.get("name").and_then(|v| v.as_str());
    if owner.package_id != id && dataset_name != Some(id.as_str()) {
        debug!(dataset = %id, resource_id = %resource_id, "Resource belongs to another dataset");
        return Err(ApiError::not_found("Resource not found"));
    }

    let activity_id = state
        .versioning
        .versions
        .activity_id_for_version(&acting(&headers), &owner_ref, &version)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ApiError::not_found("Activity not found"),
            _ => ApiError::from_version(e),
        })?;

    let mut location = Url::parse(state.site_url())
        .map_err(|e| ApiError::internal(format!("Invalid site URL: {e}")))?;
    location
        .path_segments_mut()
        .map_err(|()| ApiError::internal("Site URL cannot carry a path"))?
        .pop_if_empty()
        .extend([
            "dataset",
            owner.package_id.as_str(),
            "resource",
            resource_id.as_str(),
            "download",
        ]);
    location
        .query_pairs_mut()
        .append_pair("activity_id", &activity_id);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        let pinned = location.query().unwrap_or_default().to_string();
        location.set_query(Some(&format!("{pinned}&{query}")));
    }

    debug!(version = %version, location = %location, "Redirecting versioned download");
    Ok((StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response())
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateVersionRequest {
    name: Option<String>,
    notes: Option<String>,
    activity_id: Option<String>,
    creator_user_id: Option<String>,
}

impl CreateVersionRequest {
    fn into_create(self, owner: OwnerRef) -> CreateVersion {
        CreateVersion {
            owner,
            name: self.name,
            notes: self.notes,
            activity_id: self.activity_id,
            creator_user_id: self.creator_user_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateVersionRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PatchVersionRequest {
    name: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShowQuery {
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiffQuery {
    version_1: Option<String>,
    version_2: Option<String>,
    format: Option<String>,
}

// =============================================================================
// Dataset endpoints
// =============================================================================

async fn dataset_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let versions = state
        .versioning
        .versions
        .list(&acting(&headers), &OwnerRef::dataset(id))
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(versions))
}

async fn dataset_version_create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateVersionRequest>,
) -> ApiResult<impl IntoResponse> {
    let version = state
        .versioning
        .versions
        .create(&acting(&headers), req.into_create(OwnerRef::dataset(id)))
        .await
        .map_err(ApiError::from_version)?;
    info!(version_id = %version.id, "Version created over HTTP");
    Ok((StatusCode::CREATED, Json(version)))
}

async fn dataset_latest(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let version = state
        .versioning
        .versions
        .latest(&acting(&headers), &OwnerRef::dataset(id))
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(version))
}

async fn dataset_show(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ShowQuery>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let package = state
        .versioning
        .snapshots
        .package_at(&acting(&headers), &id, query.version.as_deref())
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(package))
}

async fn dataset_diff(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DiffQuery>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let version_1 = query
        .version_1
        .ok_or_else(|| ApiError::bad_request("Missing value: version_1"))?;
    let version_2 = query.version_2.unwrap_or_else(|| CURRENT.to_string());
    let format = query.format.unwrap_or_else(|| "unified".to_string());

    let diff = state
        .versioning
        .diffs
        .diff(&acting(&headers), &id, &version_1, &version_2, &format)
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(diff))
}

async fn dataset_restore(
    State(state): State<AppState>,
    Path((id, version)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let package = state
        .versioning
        .restores
        .restore(&acting(&headers), &id, &version)
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(package))
}

// =============================================================================
// Resource endpoints
// =============================================================================

async fn resource_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let versions = state
        .versioning
        .versions
        .list(&acting(&headers), &OwnerRef::resource(id))
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(versions))
}

async fn resource_version_create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateVersionRequest>,
) -> ApiResult<impl IntoResponse> {
    let version = state
        .versioning
        .versions
        .create(&acting(&headers), req.into_create(OwnerRef::resource(id)))
        .await
        .map_err(ApiError::from_version)?;
    Ok((StatusCode::CREATED, Json(version)))
}

async fn resource_versions_clear(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .versioning
        .versions
        .clear(&acting(&headers), &id)
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(serde_json::json!({ "deleted": removed })))
}

async fn resource_show(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ShowQuery>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let resource = state
        .versioning
        .snapshots
        .resource_at(&acting(&headers), &id, query.version.as_deref())
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(resource))
}

// =============================================================================
// Version endpoints
// =============================================================================

async fn version_show(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let version = state
        .versioning
        .versions
        .show(&acting(&headers), &id, None)
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(version))
}

async fn version_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateVersionRequest>,
) -> ApiResult<impl IntoResponse> {
    let version = state
        .versioning
        .versions
        .update(&acting(&headers), &id, &req.name, req.notes)
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(version))
}

async fn version_patch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PatchVersionRequest>,
) -> ApiResult<impl IntoResponse> {
    let patch = VersionPatch {
        name: req.name,
        notes: req.notes,
    };
    let version = state
        .versioning
        .versions
        .patch(&acting(&headers), &id, patch)
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(version))
}

async fn version_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let version = state
        .versioning
        .versions
        .delete(&acting(&headers), &id)
        .await
        .map_err(ApiError::from_version)?;
    Ok(Json(version))
}
