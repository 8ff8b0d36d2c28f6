//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the hosted vault. All endpoints
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                        | Auth   | Description                      |
//! |--------|---------------------------------------------|--------|----------------------------------|
//! | GET    | `/health`                                   | –      | Liveness probe                   |
//! | GET    | `/status`                                   | –      | Vault and node summary           |
//! | GET    | `/owners`                                   | –      | Owner list and threshold         |
//! | GET    | `/owners/:address`                          | –      | Is this address an owner?        |
//! | GET    | `/balance`                                  | –      | Current balance                  |
//! | GET    | `/transactions`                             | –      | Every transaction record         |
//! | GET    | `/transactions/:index`                      | –      | One transaction record           |
//! | GET    | `/transactions/:index/confirmations/:owner` | –      | Has `owner` confirmed `index`?   |
//! | GET    | `/events?since=n`                           | –      | Audit events from `seq` n        |
//! | GET    | `/payouts`                                  | –      | Completed outgoing transfers     |
//! | GET    | `/ws`                                       | –      | Live audit events                |
//! | POST   | `/deposit`                                  | signed | Add funds                        |
//! | POST   | `/transactions`                             | signed | Propose a transaction            |
//! | POST   | `/transactions/:index/confirm`              | signed | Confirm                          |
//! | POST   | `/transactions/:index/revoke`               | signed | Withdraw a confirmation          |
//! | POST   | `/transactions/:index/execute`              | signed | Execute                          |
//!
//! ## Authentication
//!
//! Mutating calls carry three headers: the caller's address, a unix
//! timestamp, and an Ed25519 signature over
//! `"{METHOD} {path}\n{timestamp}\n{body}"`. The verified address becomes
//! the caller the vault sees. Whether that caller is *allowed* to do
//! anything is still the vault's decision; a valid signature from a
//! non-owner gets a 403, not a 401.
//!
//! Each signed request is accepted once. Sending the same bytes again
//! inside the expiry window is a 401, even if the first attempt was
//! refused by the vault.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use quorum_contracts::{Operation, Payout, TransactionRecord, VaultError, VaultEvent};
use quorum_protocol::config::{
    CALLER_HEADER, MAX_REQUEST_BODY_BYTES, PROTOCOL_VERSION, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use quorum_protocol::crypto::{request_message, verify_request, ReplayGuard, RequestSignature};
use quorum_protocol::Address;

use crate::host::VaultHost;
use crate::metrics::SharedMetrics;
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The hosted vault. One lock serializes every operation, which is
    /// what makes each call atomic from a client's point of view.
    pub host: Arc<Mutex<VaultHost>>,
    /// Broadcast channel for live audit events.
    pub event_tx: broadcast::Sender<VaultEvent>,
    /// Signed requests already accepted inside the expiry window.
    pub replay: Arc<Mutex<ReplayGuard>>,
    /// Reference to Prometheus metrics for in-handler recording.
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
        .route("/status", get(status_handler))
        .route("/owners", get(owners_handler))
        .route("/owners/:address", get(owner_handler))
        .route("/balance", get(balance_handler))
        .route(
            "/transactions",
            get(transactions_handler).post(propose_handler),
        )
        .route("/transactions/:index", get(transaction_handler))
        .route(
            "/transactions/:index/confirmations/:owner",
            get(confirmation_handler),
        )
        .route("/transactions/:index/confirm", post(confirm_handler))
        .route("/transactions/:index/revoke", post(revoke_handler))
        .route("/transactions/:index/execute", post(execute_handler))
        .route("/deposit", post(deposit_handler))
        .route("/events", get(events_handler))
        .route("/payouts", get(payouts_handler))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing, malformed, stale, replayed, or forged signature headers.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request itself could not be understood.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The vault refused the operation.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// The vault accepted the operation but the store did not.
    #[error("failed to persist vault state: {0}")]
    Persistence(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Vault(e) => match e {
                VaultError::InvalidConfig { .. } => StatusCode::BAD_REQUEST,
                VaultError::Unauthorized { .. } => StatusCode::FORBIDDEN,
                VaultError::NotFound { .. } => StatusCode::NOT_FOUND,
                VaultError::AlreadyExecuted { .. }
                | VaultError::AlreadyConfirmed { .. }
                | VaultError::NotConfirmed { .. }
                | VaultError::InsufficientConfirmations { .. } => StatusCode::CONFLICT,
                VaultError::InsufficientBalance { .. } | VaultError::BalanceOverflow { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                VaultError::TransferFailed { .. } => StatusCode::BAD_GATEWAY,
                VaultError::CorruptSnapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Auth(_) => "authentication_failed",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Persistence(_) => "persistence_failed",
            ApiError::Vault(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub amount: u64,
}

/// Body of `POST /transactions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProposeRequest {
    pub destination: Address,
    pub amount: u64,
    /// `0x`-prefixed hex. Omit for an empty payload.
    #[serde(default, with = "quorum_protocol::encoding::hex_bytes")]
    pub payload: Vec<u8>,
}

/// Query string of `GET /events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Request-signing and snapshot protocol version.
    pub protocol_version: String,
    pub owner_count: usize,
    pub threshold: usize,
    pub balance: u64,
    pub transaction_count: u64,
    /// Transactions proposed but not yet executed.
    pub pending_count: u64,
    pub event_count: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /owners`.
#[derive(Debug, Serialize, Deserialize)]
pub struct OwnersResponse {
    pub owners: Vec<Address>,
    pub threshold: usize,
}

/// Response payload for `GET /owners/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct OwnerResponse {
    pub address: Address,
    pub is_owner: bool,
}

/// Response payload for `GET /balance` and `POST /deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: u64,
}

/// Response payload for `POST /transactions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProposeResponse {
    pub index: u64,
}

/// Response payload for confirm and revoke.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmationsResponse {
    pub index: u64,
    pub confirmations: usize,
    pub threshold: usize,
}

/// Response payload for `GET /transactions/:index/confirmations/:owner`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmationStatusResponse {
    pub index: u64,
    pub owner: Address,
    pub confirmed: bool,
}

/// Response payload for `POST /transactions/:index/execute`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub index: u64,
    pub amount: u64,
    pub destination: Address,
    /// Vault balance after the payout.
    pub balance: u64,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable snake_case error kind.
    pub error: String,
    /// Human-readable detail.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .ok_or_else(|| ApiError::Auth(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| ApiError::Auth(format!("{name} header is not ascii")))
}

/// Verifies the signature headers and returns the authenticated caller.
///
/// A verified request is remembered before the vault sees it, so a replay
/// is refused whatever the vault made of the original.
fn authenticate(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Address, ApiError> {
    let caller: Address = header(headers, CALLER_HEADER)?
        .parse()
        .map_err(|e| ApiError::Auth(format!("bad {CALLER_HEADER}: {e}")))?;
    let timestamp: i64 = header(headers, TIMESTAMP_HEADER)?
        .parse()
        .map_err(|e| ApiError::Auth(format!("bad {TIMESTAMP_HEADER}: {e}")))?;
    let signature = RequestSignature::from_hex(header(headers, SIGNATURE_HEADER)?)
        .map_err(|e| ApiError::Auth(format!("bad {SIGNATURE_HEADER}: {e}")))?;

    let now = chrono::Utc::now().timestamp();
    verify_request(
        &caller,
        &signature,
        method.as_str(),
        uri.path(),
        timestamp,
        body,
        now,
    )
    .map_err(|e| {
        tracing::debug!(caller = %caller, path = uri.path(), error = %e, "request signature rejected");
        ApiError::Auth(e.to_string())
    })?;

    let message = request_message(method.as_str(), uri.path(), timestamp, body);
    state
        .replay
        .lock()
        .record(&caller, timestamp, &message, now)
        .map_err(|e| {
            tracing::warn!(caller = %caller, path = uri.path(), "replayed request refused");
            ApiError::Auth(e.to_string())
        })?;

    Ok(caller)
}

/// Parses a `:index` path segment.
fn parse_index(raw: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid transaction index {raw:?}: {e}")))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ---------------------------------------------------------------------------
// Applying Operations
// ---------------------------------------------------------------------------

/// Runs one vault operation under the host lock, persists the result,
/// and only then records metrics and broadcasts the new events.
///
/// If the store refuses the commit, the vault and ledger go back to where
/// they were before the operation and nothing is broadcast. What clients
/// see always matches what is on disk.
fn apply<T>(
    state: &AppState,
    operation: Operation,
    op: impl FnOnce(&mut VaultHost) -> Result<T, VaultError>,
) -> Result<T, ApiError> {
    let mut host = state.host.lock();
    let seen = host.vault.events().len() as u64;
    let checkpoint = host.checkpoint();

    let out = op(&mut *host).map_err(|e| {
        state.metrics.record_rejected(&e);
        e
    })?;

    if let Err(e) = host.commit() {
        host.rollback(checkpoint);
        state.metrics.persistence_failures_total.inc();
        tracing::error!(operation = %operation, error = %e, "failed to persist vault state, operation rolled back");
        return Err(ApiError::from(e));
    }

    state.metrics.record_accepted(operation, &host.vault);
    for event in host.vault.events_since(seen) {
        // No subscribers is not an error.
        let _ = state.event_tx.send(event.clone());
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Read Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: vault and node summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let host = state.host.lock();
    let vault = &host.vault;
    let pending = vault.transactions().iter().filter(|t| !t.executed).count();

    Json(StatusResponse {
        version: state.version.clone(),
        protocol_version: PROTOCOL_VERSION.to_string(),
        owner_count: vault.owners().len(),
        threshold: vault.threshold(),
        balance: vault.balance(),
        transaction_count: vault.transaction_count(),
        pending_count: pending as u64,
        event_count: vault.events().len() as u64,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /owners`
async fn owners_handler(State(state): State<AppState>) -> impl IntoResponse {
    let host = state.host.lock();
    Json(OwnersResponse {
        owners: host.vault.owners().to_vec(),
        threshold: host.vault.threshold(),
    })
}

/// `GET /owners/:address`
async fn owner_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<OwnerResponse>, ApiError> {
    let address: Address = address
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address: {e}")))?;
    let is_owner = state.host.lock().vault.is_owner(&address);
    Ok(Json(OwnerResponse { address, is_owner }))
}

/// `GET /balance`
async fn balance_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(BalanceResponse {
        balance: state.host.lock().vault.balance(),
    })
}

/// `GET /transactions`
async fn transactions_handler(State(state): State<AppState>) -> Json<Vec<TransactionRecord>> {
    Json(state.host.lock().vault.transactions().to_vec())
}

/// `GET /transactions/:index`
async fn transaction_handler(
    Path(index): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionRecord>, ApiError> {
    let index = parse_index(&index)?;
    let record = state.host.lock().vault.transaction(index)?;
    Ok(Json(record))
}

/// `GET /transactions/:index/confirmations/:owner`
async fn confirmation_handler(
    Path((index, owner)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<ConfirmationStatusResponse>, ApiError> {
    let index = parse_index(&index)?;
    let owner: Address = owner
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address: {e}")))?;
    let confirmed = state.host.lock().vault.is_confirmed(index, &owner)?;
    Ok(Json(ConfirmationStatusResponse {
        index,
        owner,
        confirmed,
    }))
}

/// `GET /events?since=n`: audit events with `seq >= n`.
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Json<Vec<VaultEvent>> {
    Json(state.host.lock().vault.events_since(query.since).to_vec())
}

/// `GET /payouts`
async fn payouts_handler(State(state): State<AppState>) -> Json<Vec<Payout>> {
    Json(state.host.lock().ledger.payouts().to_vec())
}

// ---------------------------------------------------------------------------
// Mutating Handlers
// ---------------------------------------------------------------------------

/// `POST /deposit`: anyone may fund the vault.
async fn deposit_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BalanceResponse>, ApiError> {
    let sender = authenticate(&state, &method, &uri, &headers, &body)?;
    let req: DepositRequest = parse_body(&body)?;

    let balance = apply(&state, Operation::Deposit, |host| {
        host.vault.deposit(&sender, req.amount)
    })?;
    Ok(Json(BalanceResponse { balance }))
}

/// `POST /transactions`: propose. Answers 201 with the new index.
async fn propose_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ProposeResponse>), ApiError> {
    let caller = authenticate(&state, &method, &uri, &headers, &body)?;
    let req: ProposeRequest = parse_body(&body)?;

    let index = apply(&state, Operation::Propose, |host| {
        host.vault
            .propose(&caller, req.destination, req.amount, req.payload)
    })?;
    Ok((StatusCode::CREATED, Json(ProposeResponse { index })))
}

/// `POST /transactions/:index/confirm`
async fn confirm_handler(
    Path(index): Path<String>,
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ConfirmationsResponse>, ApiError> {
    let index = parse_index(&index)?;
    let caller = authenticate(&state, &method, &uri, &headers, &body)?;

    let (confirmations, threshold) = apply(&state, Operation::Confirm, |host| {
        let n = host.vault.confirm(&caller, index)?;
        Ok((n, host.vault.threshold()))
    })?;
    Ok(Json(ConfirmationsResponse {
        index,
        confirmations,
        threshold,
    }))
}

/// `POST /transactions/:index/revoke`
async fn revoke_handler(
    Path(index): Path<String>,
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ConfirmationsResponse>, ApiError> {
    let index = parse_index(&index)?;
    let caller = authenticate(&state, &method, &uri, &headers, &body)?;

    let (confirmations, threshold) = apply(&state, Operation::Revoke, |host| {
        let n = host.vault.revoke(&caller, index)?;
        Ok((n, host.vault.threshold()))
    })?;
    Ok(Json(ConfirmationsResponse {
        index,
        confirmations,
        threshold,
    }))
}

/// `POST /transactions/:index/execute`
async fn execute_handler(
    Path(index): Path<String>,
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let index = parse_index(&index)?;
    let caller = authenticate(&state, &method, &uri, &headers, &body)?;

    let resp = apply(&state, Operation::Execute, |host| {
        host.execute(&caller, index)?;
        let record = host.vault.transaction(index)?;
        Ok(ExecuteResponse {
            index,
            amount: record.amount,
            destination: record.destination,
            balance: host.vault.balance(),
        })
    })?;
    Ok(Json(resp))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws`: WebSocket upgrade for live audit events.
///
/// Clients receive each accepted [`VaultEvent`] as a JSON text message.
/// The connection is push-only; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Missed events can be re-fetched from /events.
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}
