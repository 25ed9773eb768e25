//! HTTP routes over a shared [`Ledger`].

use crate::constants::MAX_RECORD_BYTES;
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ledger_core::{
    Block, CancelToken, ChainReport, Ledger, LedgerError, LedgerStore, StoreError,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

pub struct AppState<S: LedgerStore> {
    pub ledger: Arc<Ledger<S>>,
}

impl<S: LedgerStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    blocks: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Written {
    message: &'static str,
    block_hash: String,
}

#[derive(Debug)]
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::BlockNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::GenesisProtected => StatusCode::BAD_REQUEST,
            LedgerError::LedgerUninitialized | LedgerError::MiningCancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            LedgerError::Persistence(err)
                if matches!(
                    err.downcast_ref::<StoreError>(),
                    Some(StoreError::DuplicateHash(_))
                ) =>
            {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(err = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn is_record(data: &Value) -> bool {
    data.as_object().is_some_and(|fields| !fields.is_empty())
}

pub fn router<S: LedgerStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/api/health", get(health::<S>))
        .route("/api/records", get(list_records::<S>).post(create_record::<S>))
        .route(
            "/api/records/{hash}",
            get(get_record::<S>)
                .put(amend_record::<S>)
                .delete(delete_record::<S>),
        )
        .route("/api/verify", get(verify::<S>))
        .layer(DefaultBodyLimit::max(MAX_RECORD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health<S: LedgerStore>(State(state): State<AppState<S>>) -> ApiResult<Json<Health>> {
    Ok(Json(Health {
        status: "ok",
        blocks: state.ledger.len()?,
    }))
}

async fn create_record<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(data): Json<Value>,
) -> ApiResult<Response> {
    if !is_record(&data) {
        return Ok(bad_request("Missing required fields"));
    }
    let block = state.ledger.append(data).await?;
    Ok(Json(Written {
        message: "Record added successfully",
        block_hash: block.hash,
    })
    .into_response())
}

async fn list_records<S: LedgerStore>(State(state): State<AppState<S>>) -> ApiResult<Json<Vec<Block>>> {
    Ok(Json(state.ledger.get_all()?))
}

async fn get_record<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(hash): Path<String>,
) -> ApiResult<Response> {
    Ok(match state.ledger.get_by_hash(&hash)? {
        Some(block) => Json(block).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Record not found" })),
        )
            .into_response(),
    })
}

async fn amend_record<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(hash): Path<String>,
    Json(data): Json<Value>,
) -> ApiResult<Response> {
    if !is_record(&data) {
        return Ok(bad_request("Missing required fields"));
    }
    let block = state
        .ledger
        .amend(&hash, data, &CancelToken::new())
        .await?;
    Ok(Json(Written {
        message: "Record updated successfully",
        block_hash: block.hash,
    })
    .into_response())
}

async fn delete_record<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(hash): Path<String>,
) -> ApiResult<Response> {
    match state.ledger.remove(&hash, &CancelToken::new()).await {
        Ok(removal) => Ok(Json(json!({
            "message": "Record deleted successfully",
            "rewritten": removal.rewritten.len(),
        }))
        .into_response()),
        Err(err) if err.is_rejection() => {
            Ok(bad_request("Cannot delete genesis block or record not found"))
        }
        Err(err) => Err(err.into()),
    }
}

async fn verify<S: LedgerStore>(State(state): State<AppState<S>>) -> ApiResult<Json<ChainReport>> {
    Ok(Json(state.ledger.verify()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use ledger_core::{LedgerConfig, MemoryStore};
    use tower::ServiceExt;

    async fn app() -> (Arc<Ledger<MemoryStore>>, Router) {
        let ledger = Arc::new(Ledger::new(
            Arc::new(MemoryStore::new()),
            LedgerConfig::default().with_difficulty(1).with_genesis_difficulty(1),
        ));
        ledger.initialize().await.unwrap();
        let router = router(AppState {
            ledger: Arc::clone(&ledger),
        });
        (ledger, router)
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_block_count() {
        let (_ledger, router) = app().await;
        let (status, body) = send(&router, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok", "blocks": 1 }));
    }

    #[tokio::test]
    async fn create_get_and_list() {
        let (_ledger, router) = app().await;
        let record = json!({ "studentName": "Ada", "studentId": "1", "courseDetails": "CS", "grades": "A" });
        let (status, body) = send(&router, "POST", "/api/records", Some(record.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let hash = body["blockHash"].as_str().unwrap().to_string();

        let (status, block) = send(&router, "GET", &format!("/api/records/{hash}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(block["data"], record);
        assert!(block["previousHash"].is_string());

        let (_, all) = send(&router, "GET", "/api/records", None).await;
        assert_eq!(all.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_empty_record() {
        let (ledger, router) = app().await;
        let (status, _) = send(&router, "POST", "/api/records", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&router, "POST", "/api/records", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let (_ledger, router) = app().await;
        let (status, body) = send(&router, "GET", "/api/records/deadbeef", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Record not found");
    }

    #[tokio::test]
    async fn delete_genesis_and_unknown_are_bad_requests() {
        let (ledger, router) = app().await;
        let genesis = ledger.get_all().unwrap().remove(0);
        for hash in [genesis.hash.as_str(), "deadbeef"] {
            let (status, body) = send(&router, "DELETE", &format!("/api/records/{hash}"), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Cannot delete genesis block or record not found");
        }
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_and_amend_keep_chain_valid() {
        let (ledger, router) = app().await;
        let a = ledger.append(json!({ "id": "A" })).await.unwrap();
        let b = ledger.append(json!({ "id": "B" })).await.unwrap();
        ledger.append(json!({ "id": "C" })).await.unwrap();

        let (status, body) = send(&router, "DELETE", &format!("/api/records/{}", a.hash), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rewritten"], 2);

        let b_now = ledger.get_all().unwrap()[1].clone();
        assert_eq!(b_now.data, b.data);
        let (status, body) = send(
            &router,
            "PUT",
            &format!("/api/records/{}", b_now.hash),
            Some(json!({ "id": "B2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["blockHash"].is_string());

        let (status, report) = send(&router, "GET", "/api/verify", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report, json!({ "isValid": true, "blockCount": 3 }));
    }

    #[tokio::test]
    async fn verify_reports_tampering() {
        let (ledger, router) = app().await;
        ledger.append(json!({ "id": "A" })).await.unwrap();
        ledger.store().tamper(1, |b| b.data = json!({ "id": "Z" }));
        let (_, report) = send(&router, "GET", "/api/verify", None).await;
        assert_eq!(report["isValid"], false);
        assert_eq!(report["fault"]["kind"], "hashMismatch");
        assert_eq!(report["fault"]["index"], 1);
    }

    #[tokio::test]
    async fn uninitialized_ledger_is_unavailable() {
        let ledger = Arc::new(Ledger::new(
            Arc::new(MemoryStore::new()),
            LedgerConfig::default(),
        ));
        let router = router(AppState { ledger });
        let (status, _) = send(&router, "POST", "/api/records", Some(json!({ "id": "A" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
