//! OpenAPI document for the HTTP routes.

use utoipa::OpenApi;

use crate::api::dto::{RefundRequest, TransactionListResponse};
use crate::api::handlers::{system, transactions};
use crate::domain::{Transaction, TransactionStatus, TransactionType};
use crate::error::{ErrorBody, ErrorResponse};
use crate::service::ServerStatus;

/// Generated OpenAPI specification.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Lightning EVM Bridge",
        description = "Swap history and refund bookkeeping. Swaps themselves run over the `/ws` WebSocket."
    ),
    paths(
        system::health_handler,
        transactions::list_transactions,
        transactions::refund_transaction,
    ),
    components(schemas(
        system::HealthResponse,
        ServerStatus,
        Transaction,
        TransactionStatus,
        TransactionType,
        TransactionListResponse,
        RefundRequest,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Transactions", description = "Swap records"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_all_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/transactions"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/transactions/refund"));
    }
}
