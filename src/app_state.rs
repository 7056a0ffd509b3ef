//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::chain::HtlcChain;
use crate::domain::EventBus;
use crate::persistence::Ledger;
use crate::service::SwapService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Swap coordinator shared by every WebSocket session.
    pub swap_service: Arc<SwapService>,
    /// Durable swap records, read by the HTTP routes.
    pub ledger: Arc<dyn Ledger>,
    /// On-chain HTLC reads for refund verification.
    pub chain: Arc<dyn HtlcChain>,
    /// Event bus for session notifications.
    pub event_bus: EventBus,
}
