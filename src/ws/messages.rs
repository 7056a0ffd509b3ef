//! WebSocket wire types: inbound swap requests and outbound messages.
//!
//! Every inbound message is a JSON object discriminated by `kind`. Kinds
//! the bridge does not know are reported as [`Decoded::Unknown`] so the
//! session can drop them without replying.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::service::{
    InitiationReceive, InvoiceSend, RelayRequest, ServerStatus, SwapReply, TxHashNotice,
};

/// Request kinds the gateway understands.
pub const KNOWN_KINDS: [&str; 5] = [
    "invoice_send",
    "initiation_recieve",
    "tx_hash",
    "relay_request",
    "relay_response",
];

/// Client → server request, one variant per protocol kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SwapRequest {
    /// Pay an invoice against an on-chain contract.
    InvoiceSend(InvoiceSend),
    /// Start a Lightning → EVM swap.
    #[serde(rename = "initiation_recieve")]
    InitiationReceive(InitiationReceive),
    /// Report a client transaction hash.
    TxHash(TxHashNotice),
    /// Withdraw a contract on the client's behalf.
    RelayRequest(RelayRequest),
    /// Server-originated kind echoed back by a client; ignored.
    RelayResponse {},
}

/// Result of decoding one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A well-formed request.
    Request(SwapRequest),
    /// A known kind whose payload has the wrong shape.
    Malformed {
        /// The request kind.
        kind: String,
        /// Decoder error.
        reason: String,
    },
    /// Not JSON, no `kind`, or a kind the gateway does not handle.
    Unknown(Option<String>),
}

/// Decodes an inbound text frame.
#[must_use]
pub fn decode(text: &str) -> Decoded {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return Decoded::Unknown(None);
    };
    let Some(kind) = value.get("kind").and_then(serde_json::Value::as_str) else {
        return Decoded::Unknown(None);
    };
    if !KNOWN_KINDS.contains(&kind) {
        return Decoded::Unknown(Some(kind.to_string()));
    }
    let kind = kind.to_string();
    match serde_json::from_value::<SwapRequest>(value) {
        Ok(request) => Decoded::Request(request),
        Err(e) => Decoded::Malformed {
            kind,
            reason: e.to_string(),
        },
    }
}

/// First message of every session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMessage {
    /// Operating mode.
    pub server_status: ServerStatus,
    /// Limits and fees.
    pub server_config: ProviderConfig,
    /// Id of this session.
    pub session_id: Uuid,
    /// Greeting.
    pub message: String,
    /// Whether the signer holds enough gas funds to operate.
    pub signer_active: bool,
}

/// Server → client message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Sent once when the session opens.
    Connection(ConnectionMessage),
    /// Coordinator reply or forwarded event.
    Reply(SwapReply),
}

impl ServerMessage {
    /// Serializes the message to a JSON text frame.
    ///
    /// Returns `None` (and logs) if the message cannot be serialized.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self)
            .map_err(|e| tracing::error!(error = %e, "failed to serialize server message"))
            .ok()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn invoice_send_decodes() {
        let decoded = decode(
            r#"{"kind":"invoice_send","contractId":"0x01","lnInvoice":"lnbc1","txHash":"0xaa"}"#,
        );
        let Decoded::Request(SwapRequest::InvoiceSend(request)) = decoded else {
            panic!("expected invoice_send, got {decoded:?}");
        };
        assert_eq!(request.contract_id, "0x01");
        assert_eq!(request.ln_invoice, "lnbc1");
        assert_eq!(request.tx_hash, "0xaa");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let decoded = decode(r#"{"kind":"invoice_send"}"#);
        assert_eq!(
            decoded,
            Decoded::Request(SwapRequest::InvoiceSend(InvoiceSend::default()))
        );
    }

    #[test]
    fn initiation_keeps_wire_spelling() {
        let decoded = decode(
            r#"{"kind":"initiation_recieve","amount":50000,"recipient":"0xabc","hashlock":"dead"}"#,
        );
        let Decoded::Request(SwapRequest::InitiationReceive(request)) = decoded else {
            panic!("expected initiation_recieve, got {decoded:?}");
        };
        assert_eq!(request.amount, 50_000);
    }

    #[test]
    fn relay_response_is_recognized() {
        let decoded = decode(
            r#"{"kind":"relay_response","status":"success","txHash":"0x1","contractId":"0x2"}"#,
        );
        assert_eq!(decoded, Decoded::Request(SwapRequest::RelayResponse {}));
    }

    #[test]
    fn unknown_kind_and_garbage_are_unknown() {
        assert_eq!(
            decode(r#"{"kind":"hodl_res","lnInvoice":"x"}"#),
            Decoded::Unknown(Some("hodl_res".to_string()))
        );
        assert_eq!(decode("not json"), Decoded::Unknown(None));
        assert_eq!(decode(r#"{"status":"x"}"#), Decoded::Unknown(None));
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        let decoded = decode(r#"{"kind":"initiation_recieve","amount":"lots"}"#);
        assert!(matches!(decoded, Decoded::Malformed { ref kind, .. } if kind == "initiation_recieve"));
    }

    #[test]
    fn connection_message_wire_format() {
        let message = ServerMessage::Connection(ConnectionMessage {
            server_status: ServerStatus::Mock,
            server_config: ProviderConfig::default(),
            session_id: Uuid::nil(),
            message: "Connected to server".to_string(),
            signer_active: false,
        });
        let Some(Ok(json)) = message
            .to_json()
            .map(|text| serde_json::from_str::<serde_json::Value>(&text))
        else {
            panic!("connection message should serialize");
        };
        assert_eq!(json["serverStatus"], "MOCK");
        assert_eq!(json["signerActive"], false);
        assert_eq!(json["message"], "Connected to server");
        assert!(json["serverConfig"].get("recieveBaseFee").is_some());
        assert!(json.get("sessionId").is_some());
    }
}
