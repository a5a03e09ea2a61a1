use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::response::ApiError;
use super::router::AppState;
use super::validation::{
    validate_chart_name, validate_chart_version, validate_filename, validate_namespace,
};

const YAML_CONTENT_TYPE: &str = "application/x-yaml";

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn get_health(State(state): State<Arc<AppState>>, req: Request) -> Response {
    state.controller.get_health(req).await
}

/// Merged index of every configured namespace.
pub async fn get_index_file(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let index = state.controller.get_index_file(&state.namespaces).await?;
    let body = serde_yaml::to_string(&index)
        .map_err(|e| ApiError::internal(format!("Failed to encode index: {e}")))?;
    Ok(([(header::CONTENT_TYPE, YAML_CONTENT_TYPE)], body))
}

pub async fn get_index_by_namespace(
    State(state): State<Arc<AppState>>,
    Path(repo): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    validate_namespace(&repo)?;
    Ok(state.controller.get_index_by_namespace(req).await)
}

pub async fn download_chart(
    State(state): State<Arc<AppState>>,
    Path((repo, filename)): Path<(String, String)>,
    req: Request,
) -> Result<Response, ApiError> {
    validate_namespace(&repo)?;
    validate_filename(&filename)?;
    Ok(state.controller.download_chart(&repo, &filename, req).await)
}

pub async fn list_charts(
    State(state): State<Arc<AppState>>,
    Path(repo): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_namespace(&repo)?;
    let charts = state.controller.list_charts(&repo).await?;
    Ok(Json(charts))
}

pub async fn upload_chart(
    State(state): State<Arc<AppState>>,
    Path(repo): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    validate_namespace(&repo)?;
    Ok(state.controller.upload_chart(req).await)
}

/// Upload into the default namespace.
pub async fn upload_chart_default(State(state): State<Arc<AppState>>, req: Request) -> Response {
    state.controller.upload_chart(req).await
}

pub async fn upload_provenance(
    State(state): State<Arc<AppState>>,
    Path(repo): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    validate_namespace(&repo)?;
    Ok(state.controller.upload_provenance(req).await)
}

pub async fn get_chart(
    State(state): State<Arc<AppState>>,
    Path((repo, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    validate_namespace(&repo)?;
    validate_chart_name(&name)?;
    let versions = state.controller.get_chart(&repo, &name).await?;
    Ok(Json(versions))
}

pub async fn delete_chart(
    State(state): State<Arc<AppState>>,
    Path((repo, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    validate_namespace(&repo)?;
    validate_chart_name(&name)?;
    state.controller.delete_chart(&repo, &name).await?;
    Ok(StatusCode::OK)
}

pub async fn get_chart_version_details(
    State(state): State<Arc<AppState>>,
    Path((repo, name, version)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    validate_namespace(&repo)?;
    validate_chart_name(&name)?;
    validate_chart_version(&version)?;
    let details = state
        .controller
        .get_chart_version_details(&repo, &name, &version)
        .await?;
    Ok(Json(details))
}

pub async fn delete_chart_version(
    State(state): State<Arc<AppState>>,
    Path((repo, name, version)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    validate_namespace(&repo)?;
    validate_chart_name(&name)?;
    validate_chart_version(&version)?;
    state
        .controller
        .delete_chart_version(&repo, &name, &version)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn search_chart(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state
        .controller
        .search_chart(params.q.trim(), &state.namespaces)
        .await?;
    Ok(Json(results))
}
