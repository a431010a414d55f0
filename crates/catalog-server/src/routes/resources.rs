//! Per-family CRUD routes backed by a [`ResourceManager`].
//!
//! ```text
//! POST   /create             201 {message, data}
//! GET    /get                200 list or page
//! GET    /get/{id}           200 record
//! PUT    /update/{id}        200 {message, data}
//! DELETE /delete/{id}        200 {message}
//! PATCH  /setactive/{id}     200 {message, data}
//! GET    /search             searchable families only
//! GET    /random-suggestions searchable families only
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRef, Path, Query, State, rejection::JsonRejection},
    routing::{delete, get, patch, post, put},
};
use catalog_api::{ApiError, ApiResponse, MessageBody};
use serde::Deserialize;
use serde_json::Value;

use super::form::{FileField, FormInput, SpoolDir};
use crate::resources::{ListParams, ResourceManager, SuggestionItem};

#[derive(Clone)]
pub struct ResourceState {
    pub manager: Arc<ResourceManager>,
    pub spool: SpoolDir,
}

impl FromRef<ResourceState> for SpoolDir {
    fn from_ref(state: &ResourceState) -> Self {
        state.spool.clone()
    }
}

impl FromRef<ResourceState> for FileField {
    fn from_ref(state: &ResourceState) -> Self {
        FileField(state.manager.schema().asset_field)
    }
}

pub fn resource_routes(manager: Arc<ResourceManager>, spool: SpoolDir) -> Router {
    let searchable = manager.schema().is_searchable();

    let mut router = Router::new()
        .route("/create", post(create))
        .route("/get", get(list))
        .route("/get/{id}", get(get_by_id))
        .route("/update/{id}", put(update))
        .route("/delete/{id}", delete(remove))
        .route("/setactive/{id}", patch(set_active));
    if searchable {
        router = router
            .route("/search", get(search))
            .route("/random-suggestions", get(random_suggestions));
    }

    router.with_state(ResourceState { manager, spool })
}

type MessageResponse = ApiResponse<MessageBody<Value>>;

async fn create(
    State(state): State<ResourceState>,
    input: FormInput,
) -> Result<MessageResponse, ApiError> {
    let saved = state
        .manager
        .create(&input.fields, input.upload.as_ref())
        .await?;
    Ok(ApiResponse::created(MessageBody::with_data(
        format!("{} created successfully", entity(&state)),
        saved,
    )))
}

async fn list(
    State(state): State<ResourceState>,
    Query(params): Query<ListParams>,
) -> Result<ApiResponse<Arc<Value>>, ApiError> {
    Ok(ApiResponse::ok(state.manager.list(&params).await?))
}

async fn get_by_id(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    Ok(ApiResponse::ok(state.manager.get_by_id(&id).await?))
}

async fn update(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
    input: FormInput,
) -> Result<MessageResponse, ApiError> {
    let saved = state
        .manager
        .update(&id, &input.fields, input.upload.as_ref())
        .await?;
    Ok(ApiResponse::ok(MessageBody::with_data(
        format!("{} updated successfully", entity(&state)),
        saved,
    )))
}

async fn remove(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<MessageBody<()>>, ApiError> {
    state.manager.delete(&id).await?;
    Ok(ApiResponse::ok(MessageBody::message(format!(
        "{} deleted successfully",
        entity(&state)
    ))))
}

#[derive(Debug, Deserialize)]
struct ActivationBody {
    #[serde(default)]
    active: Value,
}

async fn set_active(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
    body: Result<Json<ActivationBody>, JsonRejection>,
) -> Result<MessageResponse, ApiError> {
    // A missing or malformed body is reported as a non-boolean flag.
    let active = body.map(|Json(b)| b.active).unwrap_or(Value::Null);
    let saved = state.manager.set_active_status(&id, &active).await?;
    let verb = if active == Value::Bool(true) {
        "activated"
    } else {
        "deactivated"
    };
    Ok(ApiResponse::ok(MessageBody::with_data(
        format!("{} {verb} successfully", entity(&state)),
        saved,
    )))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
}

async fn search(
    State(state): State<ResourceState>,
    Query(params): Query<SearchParams>,
) -> Result<ApiResponse<Vec<SuggestionItem>>, ApiError> {
    let rows = state.manager.search_fuzzy(params.query.as_deref()).await?;
    Ok(ApiResponse::ok(rows))
}

#[derive(Debug, Deserialize)]
struct SuggestionParams {
    limit: Option<String>,
}

async fn random_suggestions(
    State(state): State<ResourceState>,
    Query(params): Query<SuggestionParams>,
) -> Result<ApiResponse<Vec<SuggestionItem>>, ApiError> {
    let rows = state
        .manager
        .random_suggestions(params.limit.as_deref())
        .await?;
    Ok(ApiResponse::ok(rows))
}

fn entity(state: &ResourceState) -> &'static str {
    state.manager.schema().entity
}
