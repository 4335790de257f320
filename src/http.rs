//! JSON-over-HTTP surface
//!
//! Authentication happens upstream; the proxy in front of this server
//! forwards the resolved bidder id and admin flag as headers.
use crate::allocation::{Award, Settlement};
use crate::auction::{Bid, BidId, Lot, LotId, NewLot};
use crate::engine::Engine;
use crate::error::Error;
use crate::ledger::BidRequest;
use crate::persistence::Persistence;
use crate::visibility::{LotView, Summary, Viewer};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::error;

pub const BIDDER_ID_HEADER: &str = "x-bidder-id";
pub const ADMIN_HEADER: &str = "x-bidder-admin";

#[async_trait]
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .headers
            .get(BIDDER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|identity| !identity.is_empty())
            .map(str::to_owned);
        let is_admin = identity.is_some()
            && parts
                .headers
                .get(ADMIN_HEADER)
                .and_then(|value| value.to_str().ok())
                .map_or(false, |value| matches!(value.trim(), "1" | "true"));

        Ok(Viewer { identity, is_admin })
    }
}

#[derive(Debug)]
pub enum ApiError {
    Engine(Error),
    Unauthenticated,
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Engine(Error::Rejected(rejection)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                rejection.kind(),
                rejection.to_string(),
            ),
            ApiError::Engine(e @ Error::LotNotFound(_)) => (StatusCode::NOT_FOUND, "LotNotFound", e.to_string()),
            ApiError::Engine(e @ Error::BidNotFound(_)) => (StatusCode::NOT_FOUND, "BidNotFound", e.to_string()),
            ApiError::Engine(e @ Error::LotExists(_)) => (StatusCode::CONFLICT, "LotExists", e.to_string()),
            ApiError::Engine(e @ Error::LotStillOpen(_)) => (StatusCode::CONFLICT, "LotStillOpen", e.to_string()),
            ApiError::Engine(e @ Error::InvalidLot(_)) => (StatusCode::BAD_REQUEST, "InvalidLot", e.to_string()),
            ApiError::Engine(e @ Error::Forbidden) => (StatusCode::FORBIDDEN, "Forbidden", e.to_string()),
            ApiError::Engine(Error::Storage(e)) => {
                error!(error = ?e, "storage failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "StorageError",
                    "operation failed, retry".to_owned(),
                )
            }
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Unauthenticated",
                "bidder identity required".to_owned(),
            ),
            ApiError::Internal(e) => {
                error!(error = %e, "request handler failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal",
                    "operation failed, retry".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

/// Run a blocking engine call off the async workers
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

type SharedEngine<P> = Arc<Engine<P>>;

pub fn router<P>(engine: SharedEngine<P>) -> Router
where
    P: Persistence + 'static,
{
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/lots", get(summary::<P>).post(create_lot::<P>))
        .route("/lots/:lot_id", get(view_lot::<P>).delete(delete_lot::<P>))
        .route("/lots/:lot_id/bids", post(place_bid::<P>))
        .route("/lots/:lot_id/winners", get(resolve_lot::<P>))
        .route("/lots/:lot_id/settlement", get(settlement::<P>))
        .route("/lots/:lot_id/sync", post(sync_lot::<P>))
        .route("/bids/mine", get(my_bids::<P>))
        .route("/bids/:bid_id", delete(remove_bid::<P>))
        .route("/sync", post(sync_all::<P>))
        .with_state(engine)
}

async fn summary<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    viewer: Viewer,
) -> Result<Json<Summary>, ApiError> {
    Ok(Json(blocking(move || engine.summary(&viewer)).await?))
}

async fn create_lot<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    viewer: Viewer,
    Json(new_lot): Json<NewLot>,
) -> Result<(StatusCode, Json<Lot>), ApiError> {
    if !viewer.is_admin {
        return Err(Error::Forbidden.into());
    }
    let lot = blocking(move || engine.create_lot(new_lot)).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

async fn view_lot<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    viewer: Viewer,
    Path(lot_id): Path<LotId>,
) -> Result<Json<LotView>, ApiError> {
    Ok(Json(blocking(move || engine.view_lot(&viewer, &lot_id)).await?))
}

async fn delete_lot<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    viewer: Viewer,
    Path(lot_id): Path<LotId>,
) -> Result<StatusCode, ApiError> {
    blocking(move || engine.delete_lot(&viewer, &lot_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn place_bid<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    viewer: Viewer,
    Path(lot_id): Path<LotId>,
    Json(request): Json<BidRequest>,
) -> Result<(StatusCode, Json<Bid>), ApiError> {
    let identity = viewer.identity.ok_or(ApiError::Unauthenticated)?;
    let bid = blocking(move || engine.place(&lot_id, &identity, &request)).await?;
    Ok((StatusCode::CREATED, Json(bid)))
}

async fn resolve_lot<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    Path(lot_id): Path<LotId>,
) -> Result<Json<Vec<Award>>, ApiError> {
    Ok(Json(blocking(move || engine.resolve(&lot_id)).await?))
}

async fn settlement<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    Path(lot_id): Path<LotId>,
) -> Result<Json<Settlement>, ApiError> {
    Ok(Json(blocking(move || engine.settlement(&lot_id)).await?))
}

async fn sync_lot<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    viewer: Viewer,
    Path(lot_id): Path<LotId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let changed = blocking(move || engine.sync(&viewer, &lot_id)).await?;
    Ok(Json(json!({ "changed": changed })))
}

async fn my_bids<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    viewer: Viewer,
) -> Result<Json<Vec<Bid>>, ApiError> {
    Ok(Json(blocking(move || engine.bids_of(&viewer)).await?))
}

async fn remove_bid<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    viewer: Viewer,
    Path(bid_id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    blocking(move || engine.remove(&viewer, BidId(bid_id))).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_all<P: Persistence + 'static>(
    State(engine): State<SharedEngine<P>>,
    viewer: Viewer,
) -> Result<Json<serde_json::Value>, ApiError> {
    let corrected = blocking(move || engine.sync_all(&viewer)).await?;
    Ok(Json(json!({ "corrected": corrected })))
}
