//! # REST API
//!
//! Builds the axum router for the settlement server. All endpoints share
//! application state through axum's `State` extractor. Store calls are
//! synchronous sled operations, so handlers push them onto the blocking
//! pool.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                          |
//! |--------|-----------------------------|--------------------------------------|
//! | GET    | `/health`                   | Liveness check                       |
//! | POST   | `/items`                    | Add a catalog item                   |
//! | POST   | `/orders`                   | Create an order (and coin if Offline)|
//! | POST   | `/orders/:orderId/assign`   | Record the carrying agent            |
//! | GET    | `/users/:userId/orders`     | Payer's orders, with coin tokens     |
//! | GET    | `/agent/orders`             | Pending offline feed (secrets incl.) |
//! | POST   | `/agent/orders`             | Reconcile a redemption batch         |

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use offcoin_protocol::clock::Clock;
use offcoin_protocol::order::{self, NewOrder, Order, OrderError};
use offcoin_protocol::settlement::{self, ReconcileError};
use offcoin_protocol::storage::{DbError, OrderDb};
use offcoin_protocol::token::{mint_token, MintError};
use offcoin_protocol::wire::{
    AssignRequest, CreateItemRequest, CreateOrderRequest, CreateOrderResponse, PendingOrder,
    ReconcileRequest, ReconcileResponse, UserOrderView,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone. Everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The server's reported version string.
    pub version: String,
    /// Authoritative order store.
    pub db: Arc<OrderDb>,
    /// Time source for order timestamps and token issued-at.
    pub clock: Arc<dyn Clock>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/items", post(create_item_handler))
        .route("/orders", post(create_order_handler))
        .route("/orders/:order_id/assign", post(assign_handler))
        .route("/users/:user_id/orders", get(user_orders_handler))
        .route(
            "/agent/orders",
            get(agent_feed_handler).post(reconcile_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler failure, mapped onto an HTTP status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            ApiError::NotFound(e) => (StatusCode::NOT_FOUND, e),
            ApiError::Conflict(e) => (StatusCode::CONFLICT, e),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e)
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(_) => ApiError::NotFound(err.to_string()),
            OrderError::DuplicateOrder(_)
            | OrderError::DuplicateCoin(_)
            | OrderError::AlreadyDelivered(_) => {
                ApiError::Conflict(err.to_string())
            }
            OrderError::Secret(_) | OrderError::Storage(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Storage { .. } => ApiError::Internal(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        ApiError::Internal(format!("Database error: {}", err))
    }
}

impl From<MintError> for ApiError {
    fn from(err: MintError) -> Self {
        ApiError::Internal(format!("token minting failed: {}", err))
    }
}

/// Run a store operation on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {}", e)))?
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the server is alive.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "version": state.version })),
    )
}

/// `POST /items`: add or replace a catalog item.
async fn create_item_handler(
    State(state): State<AppState>,
    body: Result<Json<CreateItemRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    let item = request.into_item()?;

    let db = Arc::clone(&state.db);
    let item = blocking(move || {
        db.put_item(&item)?;
        Ok(item)
    })
    .await?;

    tracing::info!(item_id = %item.item_id, price = item.price, "item stored");
    Ok((StatusCode::CREATED, Json(item)))
}

/// `POST /orders`: create an order. Offline orders get a secret and coin.
async fn create_order_handler(
    State(state): State<AppState>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    let new_order = NewOrder::try_from(request)?;

    let db = Arc::clone(&state.db);
    let clock = Arc::clone(&state.clock);
    let created = blocking(move || {
        Ok(order::create_order(
            &db,
            &new_order,
            &mut OsRng,
            clock.as_ref(),
        )?)
    })
    .await?;

    let mode = created.order.payment_mode.to_string();
    state
        .metrics
        .orders_created_total
        .with_label_values(&[mode.as_str()])
        .inc();

    let response = CreateOrderResponse {
        order_id: created.order.order_id.clone(),
        coin_id: created.coin.map(|c| c.coin_id),
        value: created.order.value,
        delivery_date: created.order.delivery_date,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /orders/:orderId/assign`: record which agent carries the order.
async fn assign_handler(
    Path(order_id): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<AssignRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;

    let db = Arc::clone(&state.db);
    let order = blocking(move || {
        Ok(order::assign_agent(
            &db,
            &order_id,
            &request.assigned_agent_id,
        )?)
    })
    .await?;

    Ok((StatusCode::OK, Json(UserOrderView::new(&order, None))))
}

/// `GET /users/:userId/orders`: the payer's orders. Offline orders that
/// are Pending and assigned carry a freshly minted coin token.
async fn user_orders_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let db = Arc::clone(&state.db);
    let clock = Arc::clone(&state.clock);
    let (views, minted) = blocking(move || {
        let mut minted = 0u64;
        let mut views = Vec::new();
        for order in db.orders_for_user(&user_id)? {
            let token = coin_token_for(&db, &order, clock.as_ref())?;
            if token.is_some() {
                minted += 1;
            }
            views.push(UserOrderView::new(&order, token));
        }
        Ok((views, minted))
    })
    .await?;

    state.metrics.tokens_minted_total.inc_by(minted);
    Ok((StatusCode::OK, Json(views)))
}

fn coin_token_for(
    db: &OrderDb,
    order: &Order,
    clock: &dyn Clock,
) -> Result<Option<offcoin_protocol::token::CoinToken>, ApiError> {
    let secret = match (&order.secret, &order.assigned_agent_id) {
        (Some(secret), Some(_)) if order.is_offline() && order.is_pending() => secret,
        _ => return Ok(None),
    };
    match db.coin_for_order(&order.order_id)? {
        Some(coin) => Ok(Some(mint_token(order, &coin, secret, clock)?)),
        None => {
            tracing::warn!(order_id = %order.order_id, "offline order without a coin");
            Ok(None)
        }
    }
}

/// Query string for the agent feed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    pub agent_id: Option<String>,
}

/// `GET /agent/orders`: every Pending Offline order, secrets included.
async fn agent_feed_handler(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let db = Arc::clone(&state.db);
    let feed: Vec<PendingOrder> = blocking(move || {
        let orders = db.pending_offline_orders(query.agent_id.as_deref())?;
        Ok(orders.iter().filter_map(PendingOrder::from_order).collect())
    })
    .await?;

    state.metrics.pending_offline_orders.set(feed.len() as i64);
    tracing::debug!(orders = feed.len(), "served agent feed");
    Ok((StatusCode::OK, Json(feed)))
}

/// `POST /agent/orders`: reconcile a batch of redemption records.
async fn reconcile_handler(
    State(state): State<AppState>,
    body: Result<Json<ReconcileRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            state.metrics.batches_rejected_total.inc();
            return Err(rejection.into());
        }
    };
    if let Err(e) = request.validate() {
        state.metrics.batches_rejected_total.inc();
        return Err(e.into());
    }

    let started = Instant::now();
    let db = Arc::clone(&state.db);
    let summary = blocking(move || Ok(settlement::reconcile(&db, &request.data)?)).await?;
    state
        .metrics
        .reconcile_latency_seconds
        .observe(started.elapsed().as_secs_f64());
    state.metrics.record_summary(&summary);

    Ok((StatusCode::OK, Json(ReconcileResponse::from(summary))))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
