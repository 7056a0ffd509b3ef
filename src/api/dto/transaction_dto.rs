//! DTOs for the transaction history and refund endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::Transaction;

/// Default page size of `GET /api/transactions`.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page size of `GET /api/transactions`.
pub const MAX_LIMIT: u32 = 100;

/// Query parameters of `GET /api/transactions`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    /// EVM address whose swaps are listed.
    #[serde(default)]
    pub user_address: String,
    /// Maximum number of rows (1–100). Defaults to 10.
    pub limit: Option<u32>,
}

impl TransactionQuery {
    /// Page size clamped to `1..=MAX_LIMIT`.
    #[must_use]
    pub fn clamped_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Transactions of one user, newest first.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionListResponse {
    /// The rows.
    pub transactions: Vec<Transaction>,
}

/// Body of `POST /api/transactions/refund`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// Contract the user refunded.
    pub contract_id: String,
    /// Hash of the user's refund transaction.
    #[serde(default)]
    pub tx_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<u32>) -> TransactionQuery {
        TransactionQuery {
            user_address: "0xabc".to_string(),
            limit,
        }
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(query(None).clamped_limit(), DEFAULT_LIMIT);
        assert_eq!(query(Some(0)).clamped_limit(), 1);
        assert_eq!(query(Some(5_000)).clamped_limit(), MAX_LIMIT);
        assert_eq!(query(Some(42)).clamped_limit(), 42);
    }
}
