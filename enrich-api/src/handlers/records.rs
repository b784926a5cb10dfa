use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use enrich_common::record::{EnrichedRecord, PersistedRow};
use enrich_common::store::{PageRequest, RecordId, RecordStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CreatedResponse {
    pub id: RecordId,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Query of `GET /data`. Kept as raw strings: bad paging values fall back to 1
/// instead of failing the request.
#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    gender: Option<String>,
    page: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
}

fn positive_or_one(param: Option<&str>) -> i64 {
    param
        .and_then(|p| p.trim().parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(1)
}

pub async fn list_records(
    State(store): State<Arc<dyn RecordStore>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PersistedRow>>, ApiError> {
    let page = PageRequest::new(
        positive_or_one(params.page.as_deref()),
        positive_or_one(params.page_size.as_deref()),
    );
    let gender = params.gender.as_deref().filter(|g| !g.is_empty());

    let rows = store
        .select_page(gender, page)
        .await
        .map_err(store_error)?;

    Ok(Json(rows))
}

pub async fn create_record(
    State(store): State<Arc<dyn RecordStore>>,
    payload: Result<Json<EnrichedRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let Json(record) = payload.map_err(invalid_body)?;
    debug!("received record: {:?}", record);

    let id = store.insert(&record).await.map_err(store_error)?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn delete_record(
    State(store): State<Arc<dyn RecordStore>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;

    store.delete_by_id(id).await.map_err(store_error)?;

    Ok(message("record deleted"))
}

pub async fn update_record(
    State(store): State<Arc<dyn RecordStore>>,
    Path(id): Path<String>,
    payload: Result<Json<EnrichedRecord>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;
    let Json(record) = payload.map_err(invalid_body)?;

    store.update_by_id(id, &record).await.map_err(store_error)?;

    Ok(message("record updated"))
}

pub async fn partial_update_record(
    State(store): State<Arc<dyn RecordStore>>,
    Path(id): Path<String>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;
    let Json(fields) = payload.map_err(invalid_body)?;

    store
        .partial_update_by_id(id, &fields)
        .await
        .map_err(store_error)?;

    Ok(message("record updated"))
}

fn message(message: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: message.to_owned(),
    })
}

fn parse_id(raw: &str) -> Result<RecordId, ApiError> {
    match raw.parse::<RecordId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(bad_request(&format!("invalid record id: {}", raw))),
    }
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    bad_request(&format!("invalid request body: {}", rejection.body_text()))
}

fn bad_request(msg: &str) -> ApiError {
    warn!(msg);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: msg.to_owned(),
        }),
    )
}

fn store_error(err: StoreError) -> ApiError {
    if err.is_client_error() {
        return bad_request(&err.to_string());
    }

    metrics::counter!("records_api_store_errors_total").increment(1);
    error!("internal error: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
