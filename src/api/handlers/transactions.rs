//! Transaction history and user-initiated refund handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{RefundRequest, TransactionListResponse, TransactionQuery};
use crate::app_state::AppState;
use crate::domain::{BridgeEvent, ContractId, Transaction};
use crate::error::{ErrorResponse, GatewayError};

/// `GET /api/transactions` — A user's swaps, newest first.
///
/// # Errors
///
/// Returns [`GatewayError`] when `userAddress` is missing or the ledger fails.
#[utoipa::path(
    get,
    path = "/api/transactions",
    tag = "Transactions",
    summary = "List a user's transactions",
    description = "Returns the swaps recorded for `userAddress`, ordered by date descending. `limit` defaults to 10 and is capped at 100.",
    params(TransactionQuery),
    responses(
        (status = 200, description = "Transaction list", body = TransactionListResponse),
        (status = 400, description = "Missing user address", body = ErrorResponse),
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let user_address = query.user_address.trim();
    if user_address.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "userAddress is required".to_string(),
        ));
    }

    let transactions = state
        .ledger
        .transactions_for_user(user_address, query.clamped_limit())
        .await?;

    Ok((StatusCode::OK, Json(TransactionListResponse { transactions })))
}

/// `POST /api/transactions/refund` — Record a user's on-chain refund.
///
/// # Errors
///
/// Returns [`GatewayError`] if the contract id is malformed, the contract is
/// not refunded on-chain, the transaction is missing, or it is not `FAILED`.
#[utoipa::path(
    post,
    path = "/api/transactions/refund",
    tag = "Transactions",
    summary = "Mark a failed swap refunded",
    description = "Verifies on-chain that the contract was refunded after its timelock, then moves the transaction from FAILED to REFUNDED.",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Transaction refunded", body = Transaction),
        (status = 400, description = "Invalid contract id or contract not refunded", body = ErrorResponse),
        (status = 404, description = "No transaction for the contract", body = ErrorResponse),
        (status = 409, description = "Transaction is not FAILED", body = ErrorResponse),
    )
)]
pub async fn refund_transaction(
    State(state): State<AppState>,
    Json(req): Json<RefundRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let contract_id: ContractId = req
        .contract_id
        .parse()
        .map_err(|e| GatewayError::InvalidRequest(format!("contractId: {e}")))?;

    let contract = state.chain.get_contract(&contract_id).await?;
    if !contract.refunded {
        return Err(GatewayError::RefundNotConfirmed(contract_id.to_string()));
    }

    if !state
        .ledger
        .mark_refunded(&contract_id, req.tx_hash.trim())
        .await?
    {
        return match state.ledger.find_transaction(&contract_id).await? {
            Some(_) => Err(GatewayError::InvalidTransition(contract_id.to_string())),
            None => Err(GatewayError::TransactionNotFound(contract_id.to_string())),
        };
    }

    tracing::info!(%contract_id, tx_hash = %req.tx_hash, "transaction refunded");
    let _ = state.event_bus.publish(BridgeEvent::TransactionRefunded {
        contract_id,
        tx_hash: req.tx_hash.trim().to_string(),
        timestamp: Utc::now(),
    });

    let transaction = state
        .ledger
        .find_transaction(&contract_id)
        .await?
        .ok_or_else(|| GatewayError::TransactionNotFound(contract_id.to_string()))?;
    Ok((StatusCode::OK, Json(transaction)))
}

/// Transaction routes, nested under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/transactions", get(list_transactions))
        .route("/transactions/refund", post(refund_transaction))
}
