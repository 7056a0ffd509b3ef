//! WebSocket session loop.
//!
//! Each inbound request is dispatched to a spawned coordinator task so a
//! long-running flow never blocks the session. Coordinator replies come back
//! through a [`Replies`] queue and are written in the order they were sent.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument as _;
use uuid::Uuid;

use super::messages::{ConnectionMessage, Decoded, ServerMessage, SwapRequest, decode};
use super::subscription::SubscriptionManager;
use crate::domain::{BridgeEvent, ContractId};
use crate::service::{Replies, SwapReply, SwapService};

const GREETING: &str = "Connected to server";
const INVALID_REQUEST: &str = "Invalid request";

/// Runs the read/write loop for a single WebSocket session.
///
/// - Sends the connection message first.
/// - Dispatches client requests to coordinator tasks.
/// - Writes coordinator replies and forwards events for followed contracts.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<BridgeEvent>,
    service: Arc<SwapService>,
) {
    let session_id = Uuid::new_v4();
    let span = tracing::info_span!("session", %session_id);

    async move {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (replies, mut reply_rx) = Replies::channel();
        let mut subs = SubscriptionManager::new();

        let hello = ServerMessage::Connection(ConnectionMessage {
            server_status: service.status(),
            server_config: service.provider().clone(),
            session_id,
            message: GREETING.to_string(),
            signer_active: service.signer_active().await,
        });
        if !write(&mut ws_tx, &hello).await {
            return;
        }
        tracing::info!("session opened");

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            dispatch(&service, &text, &replies, &mut subs);
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::debug!(error = %e, "ws read failed");
                            break;
                        }
                        _ => {}
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(reply) = reply else { break };
                    if !write(&mut ws_tx, &ServerMessage::Reply(reply)).await {
                        break;
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Ok(event) => {
                            if let Some(reply) = forwarded_reply(&event, &mut subs)
                                && !write(&mut ws_tx, &ServerMessage::Reply(reply)).await
                            {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(lagged = n, "session lagged behind event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        tracing::info!(subscriptions = subs.count(), "session closed");
    }
    .instrument(span)
    .await;
}

/// Writes `message` to the socket. Returns `false` once the socket is gone;
/// a message that fails to serialize is skipped.
async fn write(ws_tx: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    let Some(json) = message.to_json() else {
        return true;
    };
    ws_tx.send(Message::text(json)).await.is_ok()
}

/// Routes one inbound text frame.
///
/// Returns the spawned coordinator task, or `None` when the frame was
/// answered or dropped inline.
pub fn dispatch(
    service: &Arc<SwapService>,
    text: &str,
    replies: &Replies,
    subs: &mut SubscriptionManager,
) -> Option<JoinHandle<()>> {
    let request = match decode(text) {
        Decoded::Request(request) => request,
        Decoded::Unknown(kind) => {
            tracing::warn!(?kind, "dropping message with unknown kind");
            return None;
        }
        Decoded::Malformed { kind, reason } => {
            tracing::warn!(%kind, %reason, "malformed request");
            replies.send(SwapReply::error(INVALID_REQUEST));
            return None;
        }
    };

    let service = Arc::clone(service);
    let replies = replies.clone();
    let task = match request {
        SwapRequest::InvoiceSend(request) => {
            if let Ok(id) = request.contract_id.parse::<ContractId>() {
                subs.subscribe(id);
            }
            tokio::spawn(
                async move { service.process_invoice_send(&request, &replies).await }
                    .in_current_span(),
            )
        }
        SwapRequest::InitiationReceive(request) => tokio::spawn(
            async move { service.process_initiation_receive(&request, &replies).await }
                .in_current_span(),
        ),
        SwapRequest::TxHash(notice) => {
            tokio::spawn(async move { service.handle_tx_hash(&notice).await }.in_current_span())
        }
        SwapRequest::RelayRequest(request) => tokio::spawn(
            async move { service.process_relay_request(&request, &replies).await }
                .in_current_span(),
        ),
        SwapRequest::RelayResponse {} => {
            tracing::debug!("ignoring relay_response from client");
            return None;
        }
    };
    Some(task)
}

/// Reply forwarded to a session for a bus event it follows.
///
/// Both events end the contract's story, so the session stops following it.
fn forwarded_reply(event: &BridgeEvent, subs: &mut SubscriptionManager) -> Option<SwapReply> {
    let contract_id = event.contract_id();
    if !subs.matches(&contract_id) {
        return None;
    }
    subs.unsubscribe(&contract_id);
    match event {
        BridgeEvent::CachedPaymentSettled { .. } => {
            Some(SwapReply::success("Invoice withdrawn successfully."))
        }
        BridgeEvent::TransactionRefunded { .. } => {
            Some(SwapReply::success("Transaction refunded."))
        }
    }
}
