//! # HTTP Transaction API
//!
//! Builds the axum router that exposes the escrow ledger. The escrow has
//! no wire protocol of its own — this API is the transaction-submission
//! interface of the host environment. Every POST body carries the
//! `caller` account on whose behalf the operation runs; role checks
//! happen inside the contracts crate.
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                          |
//! |--------|-----------------------|--------------------------------------|
//! | GET    | `/health`             | Liveness probe                       |
//! | GET    | `/status`             | Node + party summary                 |
//! | GET    | `/listings/:id`       | Listing record by asset id           |
//! | GET    | `/assets/:id`         | Asset registry record                |
//! | GET    | `/accounts/:account`  | Value ledger balance                 |
//! | POST   | `/registry/mint`      | Mint an asset (harness setup)        |
//! | POST   | `/registry/approve`   | Approve a transfer operator          |
//! | POST   | `/ledger/credit`      | Issue funds to an account (harness)  |
//! | POST   | `/escrow/list`        | List an asset for sale               |
//! | POST   | `/escrow/deposit`     | Buyer earnest deposit                |
//! | POST   | `/escrow/inspect`     | Inspector attestation                |
//! | POST   | `/escrow/approve`     | Party approval                       |
//! | POST   | `/escrow/fund`        | Lender loan funding                  |
//! | POST   | `/escrow/finalize`    | Finalize the sale                    |
//! | POST   | `/escrow/cancel`      | Cancel the sale                      |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use deedflow_contracts::escrow::{EscrowError, EscrowLedger, Listing};
use deedflow_contracts::ledger::CashLedger;
use deedflow_contracts::registry::{AssetId, AssetRegistry, DeedRegistry};
use deedflow_contracts::AccountId;

use crate::metrics::SharedMetrics;

/// The concrete escrow ledger the node hosts.
pub type NodeEscrow = EscrowLedger<DeedRegistry, CashLedger>;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// The single mutex around the escrow ledger linearizes every
/// state-changing operation; the registry and ledger handles are the
/// same ones the escrow locks internally.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The escrow ledger, behind the one mutating-operations lock.
    pub escrow: Arc<Mutex<NodeEscrow>>,
    /// Asset registry handle, shared with the escrow.
    pub registry: Arc<Mutex<DeedRegistry>>,
    /// Value ledger handle, shared with the escrow.
    pub ledger: Arc<Mutex<CashLedger>>,
    /// Prometheus metric handles for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Wires up a fresh escrow world for the given fixed parties.
    pub fn new(
        seller: AccountId,
        inspector: AccountId,
        lender: AccountId,
        escrow_account: AccountId,
        metrics: SharedMetrics,
    ) -> Self {
        let registry = Arc::new(Mutex::new(DeedRegistry::new()));
        let ledger = Arc::new(Mutex::new(CashLedger::new()));
        let escrow = Arc::new(Mutex::new(EscrowLedger::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            escrow_account,
            seller,
            inspector,
            lender,
        )));

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            escrow,
            registry,
            ledger,
            metrics,
        }
    }
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
        .route("/listings/:id", get(listing_handler))
        .route("/assets/:id", get(asset_handler))
        .route("/accounts/:account", get(account_handler))
        .route("/registry/mint", post(mint_handler))
        .route("/registry/approve", post(approve_operator_handler))
        .route("/ledger/credit", post(credit_handler))
        .route("/escrow/list", post(list_handler))
        .route("/escrow/deposit", post(deposit_handler))
        .route("/escrow/inspect", post(inspect_handler))
        .route("/escrow/approve", post(approve_sale_handler))
        .route("/escrow/fund", post(fund_handler))
        .route("/escrow/finalize", post(finalize_handler))
        .route("/escrow/cancel", post(cancel_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// The fixed seller account.
    pub seller: AccountId,
    /// The fixed inspector account.
    pub inspector: AccountId,
    /// The fixed lender account.
    pub lender: AccountId,
    /// The escrow custody account.
    pub escrow_account: AccountId,
    /// Number of currently active listings.
    pub active_listings: usize,
    /// Number of assets minted in the registry.
    pub assets_minted: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /listings/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingResponse {
    /// Unique listing record id.
    pub listing_id: String,
    /// The asset under escrow.
    pub asset_id: AssetId,
    /// The designated buyer.
    pub buyer: AccountId,
    /// Full sale price.
    pub purchase_price: u64,
    /// Required earnest deposit.
    pub escrow_amount: u64,
    /// Whether the listing is still active.
    pub is_listed: bool,
    /// Inspection attestation: "Unset", "Passed", or "Failed".
    pub inspection: String,
    /// Accounts that have approved the sale.
    pub approvals: Vec<AccountId>,
    /// Earnest funds held for this listing.
    pub buyer_deposit: u64,
    /// Loan funds held for this listing.
    pub lender_contribution: u64,
}

impl From<&Listing> for ListingResponse {
    fn from(l: &Listing) -> Self {
        let mut approvals: Vec<AccountId> = l
            .approvals
            .iter()
            .filter(|(_, v)| **v)
            .map(|(k, _)| k.clone())
            .collect();
        approvals.sort();
        Self {
            listing_id: l.listing_id.clone(),
            asset_id: l.asset_id,
            buyer: l.buyer.clone(),
            purchase_price: l.purchase_price,
            escrow_amount: l.escrow_amount,
            is_listed: l.is_listed,
            inspection: l.inspection.to_string(),
            approvals,
            buyer_deposit: l.buyer_deposit,
            lender_contribution: l.lender_contribution,
        }
    }
}

/// Response payload for `GET /assets/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssetResponse {
    /// The asset id.
    pub asset_id: AssetId,
    /// Current owner.
    pub owner: AccountId,
    /// Metadata URI recorded at mint time.
    pub uri: String,
}

/// Response payload for `GET /accounts/:account`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    /// The account id.
    pub account: AccountId,
    /// Current value ledger balance. Never-credited accounts read zero.
    pub balance: u64,
}

/// Request body for `POST /registry/mint`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MintRequest {
    /// Account to own the freshly minted asset.
    pub owner: AccountId,
    /// Metadata URI for the asset.
    pub uri: String,
}

/// Response body for `POST /registry/mint`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MintResponse {
    /// The id assigned to the new asset.
    pub asset_id: AssetId,
}

/// Request body for `POST /registry/approve`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveOperatorRequest {
    /// The asset to approve a transfer operator for.
    pub asset_id: AssetId,
    /// The asset's current owner (authorizes the approval).
    pub owner: AccountId,
    /// The operator being approved to pull the asset.
    pub operator: AccountId,
}

/// Request body for `POST /ledger/credit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreditRequest {
    /// Account to receive the issued funds.
    pub account: AccountId,
    /// Amount in smallest units.
    pub amount: u64,
}

/// Response body for `POST /ledger/credit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreditResponse {
    /// The account's balance after the credit.
    pub balance: u64,
}

/// Request body for `POST /escrow/list`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListRequest {
    /// Account submitting the transaction (must be the seller).
    pub caller: AccountId,
    /// Asset to list.
    pub asset_id: AssetId,
    /// Designated buyer for this listing.
    pub buyer: AccountId,
    /// Full sale price.
    pub purchase_price: u64,
    /// Required earnest deposit.
    pub escrow_amount: u64,
}

/// Request body for `POST /escrow/deposit` and `POST /escrow/fund`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FundsRequest {
    /// Account submitting the transaction.
    pub caller: AccountId,
    /// The listed asset.
    pub asset_id: AssetId,
    /// Amount in smallest units.
    pub amount: u64,
}

/// Request body for `POST /escrow/inspect`.
#[derive(Debug, Serialize, Deserialize)]
pub struct InspectRequest {
    /// Account submitting the transaction (must be the inspector).
    pub caller: AccountId,
    /// The listed asset.
    pub asset_id: AssetId,
    /// The attestation result.
    pub passed: bool,
}

/// Request body for `POST /escrow/approve` and `POST /escrow/cancel`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PartyRequest {
    /// Account submitting the transaction.
    pub caller: AccountId,
    /// The listed asset.
    pub asset_id: AssetId,
}

/// Request body for `POST /escrow/finalize`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalizeRequest {
    /// The listed asset.
    pub asset_id: AssetId,
}

/// Body returned by every successful transaction endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub status: String,
}

/// Generic error body returned by endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn ok() -> Json<OkResponse> {
    Json(OkResponse {
        status: "ok".into(),
    })
}

fn error_body(msg: impl Into<String>) -> Json<ErrorResponse> {
    Json(ErrorResponse { error: msg.into() })
}

/// Maps an escrow error to the HTTP status it should surface as.
fn escrow_status(err: &EscrowError) -> StatusCode {
    match err {
        EscrowError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        EscrowError::NotListed(_) => StatusCode::NOT_FOUND,
        EscrowError::AlreadyListed(_) | EscrowError::NotReady { .. } => StatusCode::CONFLICT,
        EscrowError::InvalidTerms { .. } | EscrowError::AmountOverflow => StatusCode::BAD_REQUEST,
        EscrowError::InsufficientFunds(_) | EscrowError::InsufficientEscrowFunds { .. } => {
            StatusCode::PAYMENT_REQUIRED
        }
        EscrowError::CustodyTransferFailed(_) | EscrowError::AssetTransferFailed(_) => {
            StatusCode::CONFLICT
        }
    }
}

/// Records the outcome of an escrow operation and converts it into a
/// uniform HTTP response, keeping the active-listings gauge current.
fn commit(state: &AppState, result: Result<(), EscrowError>) -> axum::response::Response {
    match result {
        Ok(()) => {
            state.metrics.operations_total.inc();
            state
                .metrics
                .active_listings
                .set(state.escrow.lock().active_listing_count() as i64);
            (StatusCode::OK, ok()).into_response()
        }
        Err(e) => {
            state.metrics.operations_rejected_total.inc();
            (escrow_status(&e), error_body(e.to_string())).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns the node and party summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let escrow = state.escrow.lock();
    let resp = StatusResponse {
        version: state.version.clone(),
        seller: escrow.seller().clone(),
        inspector: escrow.inspector().clone(),
        lender: escrow.lender().clone(),
        escrow_account: escrow.escrow_account().clone(),
        active_listings: escrow.active_listing_count(),
        assets_minted: state.registry.lock().asset_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `GET /listings/:id` — returns the listing record for an asset.
///
/// 404 for assets that have never been listed; terminal (not-listed)
/// records are still returned so history stays inspectable.
async fn listing_handler(
    Path(asset_id): Path<AssetId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let escrow = state.escrow.lock();
    match escrow.listing(asset_id) {
        Some(listing) => {
            (StatusCode::OK, Json(ListingResponse::from(listing))).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            error_body(format!("no listing for asset {asset_id}")),
        )
            .into_response(),
    }
}

/// `GET /assets/:id` — returns the registry record for an asset.
async fn asset_handler(
    Path(asset_id): Path<AssetId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let registry = state.registry.lock();
    match registry.record(asset_id) {
        Some(record) => (
            StatusCode::OK,
            Json(AssetResponse {
                asset_id: record.asset_id,
                owner: record.owner.clone(),
                uri: record.uri.clone(),
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            error_body(format!("unknown asset {asset_id}")),
        )
            .into_response(),
    }
}

/// `GET /accounts/:account` — returns the value ledger balance.
///
/// Never-credited accounts read as zero rather than 404, matching the
/// ledger's defined-empty semantics.
async fn account_handler(
    Path(account): Path<AccountId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    use deedflow_contracts::ledger::ValueLedger;
    let balance = state.ledger.lock().balance_of(&account);
    Json(AccountResponse { account, balance })
}

/// `POST /registry/mint` — mints a new asset (harness setup).
async fn mint_handler(
    State(state): State<AppState>,
    Json(req): Json<MintRequest>,
) -> impl IntoResponse {
    let asset_id = state.registry.lock().mint(req.owner, req.uri);
    (StatusCode::OK, Json(MintResponse { asset_id }))
}

/// `POST /registry/approve` — records a transfer operator approval.
async fn approve_operator_handler(
    State(state): State<AppState>,
    Json(req): Json<ApproveOperatorRequest>,
) -> impl IntoResponse {
    let result = state
        .registry
        .lock()
        .approve_transfer(req.asset_id, &req.owner, &req.operator);
    match result {
        Ok(()) => (StatusCode::OK, ok()).into_response(),
        Err(e) => (StatusCode::CONFLICT, error_body(e.to_string())).into_response(),
    }
}

/// `POST /ledger/credit` — issues funds to an account (harness setup).
async fn credit_handler(
    State(state): State<AppState>,
    Json(req): Json<CreditRequest>,
) -> impl IntoResponse {
    match state.ledger.lock().credit(&req.account, req.amount) {
        Ok(balance) => (StatusCode::OK, Json(CreditResponse { balance })).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, error_body(e.to_string())).into_response(),
    }
}

/// `POST /escrow/list` — lists an asset for sale.
async fn list_handler(
    State(state): State<AppState>,
    Json(req): Json<ListRequest>,
) -> impl IntoResponse {
    let result = state.escrow.lock().list(
        &req.caller,
        req.asset_id,
        req.buyer,
        req.purchase_price,
        req.escrow_amount,
    );
    commit(&state, result)
}

/// `POST /escrow/deposit` — buyer earnest deposit.
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<FundsRequest>,
) -> impl IntoResponse {
    let result = state
        .escrow
        .lock()
        .deposit_earnest(&req.caller, req.asset_id, req.amount);
    commit(&state, result)
}

/// `POST /escrow/inspect` — inspector attestation.
async fn inspect_handler(
    State(state): State<AppState>,
    Json(req): Json<InspectRequest>,
) -> impl IntoResponse {
    let result = state
        .escrow
        .lock()
        .update_inspection(&req.caller, req.asset_id, req.passed);
    commit(&state, result)
}

/// `POST /escrow/approve` — records a party's approval.
async fn approve_sale_handler(
    State(state): State<AppState>,
    Json(req): Json<PartyRequest>,
) -> impl IntoResponse {
    let result = state.escrow.lock().approve_sale(&req.caller, req.asset_id);
    commit(&state, result)
}

/// `POST /escrow/fund` — lender loan funding.
async fn fund_handler(
    State(state): State<AppState>,
    Json(req): Json<FundsRequest>,
) -> impl IntoResponse {
    let result = state
        .escrow
        .lock()
        .fund_loan(&req.caller, req.asset_id, req.amount);
    commit(&state, result)
}

/// `POST /escrow/finalize` — finalizes the sale once every gate holds.
async fn finalize_handler(
    State(state): State<AppState>,
    Json(req): Json<FinalizeRequest>,
) -> impl IntoResponse {
    let result = state.escrow.lock().finalize_sale(req.asset_id);
    if result.is_ok() {
        state.metrics.sales_finalized_total.inc();
    }
    commit(&state, result)
}

/// `POST /escrow/cancel` — cancels the sale and disposes of held funds.
async fn cancel_handler(
    State(state): State<AppState>,
    Json(req): Json<PartyRequest>,
) -> impl IntoResponse {
    let result = state.escrow.lock().cancel_sale(&req.caller, req.asset_id);
    if result.is_ok() {
        state.metrics.sales_cancelled_total.inc();
    }
    commit(&state, result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
