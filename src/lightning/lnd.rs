//! LND REST client.
//!
//! Talks to `lnd`'s grpc-gateway over HTTPS, authenticating with a hex
//! macaroon. Invoice subscriptions poll `GET /v1/invoice/{hash}` and emit
//! only state changes.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::StreamExt as _;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::{CreatedInvoice, InvoiceSubscription, InvoiceUpdate, LightningError, LightningNode, Payment};
use crate::config::LndConfig;
use crate::domain::{ChannelBalance, Hashlock, Preimage};

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAYMENT_TIMEOUT: Duration = Duration::from_secs(300);

/// [`LightningNode`] backed by an `lnd` REST endpoint.
#[derive(Clone)]
pub struct LndRestNode {
    http: Client,
    base_url: String,
    macaroon: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for LndRestNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LndRestNode")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct AddInvoiceRequest<'a> {
    value: String,
    memo: &'a str,
    expiry: String,
}

#[derive(Debug, Deserialize)]
struct AddInvoiceResponse {
    r_hash: String,
    payment_request: String,
}

#[derive(Debug, Serialize)]
struct AddHoldInvoiceRequest {
    hash: String,
    value: String,
    expiry: String,
}

#[derive(Debug, Deserialize)]
struct AddHoldInvoiceResponse {
    payment_request: String,
}

#[derive(Debug, Deserialize)]
struct InvoiceLookup {
    #[serde(default)]
    state: String,
}

#[derive(Debug, Serialize)]
struct FeeLimit {
    fixed: String,
}

#[derive(Debug, Serialize)]
struct SendPaymentRequest<'a> {
    payment_request: &'a str,
    fee_limit: FeeLimit,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentRoute {
    #[serde(default, deserialize_with = "de_u64")]
    total_fees: u64,
}

#[derive(Debug, Deserialize)]
struct SendPaymentResponse {
    #[serde(default)]
    payment_error: String,
    #[serde(default)]
    payment_preimage: String,
    #[serde(default)]
    payment_route: Option<PaymentRoute>,
}

#[derive(Debug, Deserialize)]
struct ChannelRow {
    #[serde(default, deserialize_with = "de_u64")]
    local_balance: u64,
    #[serde(default, deserialize_with = "de_u64")]
    remote_balance: u64,
    #[serde(default, deserialize_with = "de_u64")]
    unsettled_balance: u64,
}

#[derive(Debug, Deserialize)]
struct ListChannelsResponse {
    #[serde(default)]
    channels: Vec<ChannelRow>,
}

/// grpc-gateway encodes 64-bit integers as JSON strings.
fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn decode_bytes32(field: &str, value: &str) -> Result<[u8; 32], LightningError> {
    let bytes = BASE64
        .decode(value)
        .map_err(|e| LightningError::Transport(format!("{field}: {e}")))?;
    let len = bytes.len();
    <[u8; 32]>::try_from(bytes)
        .map_err(|_| LightningError::Transport(format!("{field}: expected 32 bytes, got {len}")))
}

fn invoice_update(state: &str) -> InvoiceUpdate {
    InvoiceUpdate {
        is_confirmed: state == "SETTLED",
        is_held: state == "ACCEPTED",
        is_canceled: state == "CANCELED",
    }
}

impl LndRestNode {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LightningError::Config`] if the TLS certificate cannot be
    /// read or the HTTP client cannot be built.
    pub fn new(config: &LndConfig, poll_interval: Duration) -> Result<Self, LightningError> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(path) = &config.tls_cert_path {
            let pem = std::fs::read(path)
                .map_err(|e| LightningError::Config(format!("read {}: {e}", path.display())))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| LightningError::Config(format!("tls certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| LightningError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            macaroon: config.macaroon_hex.trim().to_string(),
            poll_interval,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, LightningError> {
        let response = request
            .header(MACAROON_HEADER, &self.macaroon)
            .send()
            .await
            .map_err(|e| LightningError::Transport(e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| LightningError::Transport(e.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(LightningError::Rpc {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LightningError> {
        let url = format!("{}{path}", self.base_url);
        self.send(self.http.get(&url)).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, LightningError> {
        let url = format!("{}{path}", self.base_url);
        self.send(self.http.post(&url).json(body)).await
    }

    async fn lookup_invoice(&self, id: &Hashlock) -> Result<InvoiceUpdate, LightningError> {
        let lookup: InvoiceLookup = self
            .get(&format!("/v1/invoice/{}", id.to_plain_hex()))
            .await?;
        Ok(invoice_update(&lookup.state))
    }
}

struct PollState {
    node: LndRestNode,
    id: Hashlock,
    last: Option<InvoiceUpdate>,
    polled: bool,
    finished: bool,
}

#[async_trait]
impl LightningNode for LndRestNode {
    async fn create_invoice(
        &self,
        amount: u64,
        memo: &str,
        expiry_secs: u64,
    ) -> Result<CreatedInvoice, LightningError> {
        let body = AddInvoiceRequest {
            value: amount.to_string(),
            memo,
            expiry: expiry_secs.to_string(),
        };
        let created: AddInvoiceResponse = self.post("/v1/invoices", &body).await?;
        Ok(CreatedInvoice {
            id: Hashlock::from_bytes(decode_bytes32("r_hash", &created.r_hash)?),
            request: created.payment_request,
        })
    }

    async fn create_hold_invoice(
        &self,
        hashlock: &Hashlock,
        amount: u64,
        expiry_secs: u64,
    ) -> Result<CreatedInvoice, LightningError> {
        let body = AddHoldInvoiceRequest {
            hash: BASE64.encode(hashlock.as_bytes()),
            value: amount.to_string(),
            expiry: expiry_secs.to_string(),
        };
        let created: AddHoldInvoiceResponse = self.post("/v2/invoices/hodl", &body).await?;
        Ok(CreatedInvoice {
            id: *hashlock,
            request: created.payment_request,
        })
    }

    async fn subscribe_to_invoice(
        &self,
        id: &Hashlock,
    ) -> Result<InvoiceSubscription, LightningError> {
        let state = PollState {
            node: self.clone(),
            id: *id,
            last: None,
            polled: false,
            finished: false,
        };

        let updates = futures_util::stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }
            loop {
                if state.polled {
                    tokio::time::sleep(state.node.poll_interval).await;
                }
                state.polled = true;
                match state.node.lookup_invoice(&state.id).await {
                    Ok(update) if state.last == Some(update) => {}
                    Ok(update) => {
                        state.last = Some(update);
                        state.finished = update.is_confirmed || update.is_canceled;
                        return Some((Ok(update), state));
                    }
                    Err(e) => return Some((Err(e), state)),
                }
            }
        });
        Ok(updates.boxed())
    }

    async fn settle_hold_invoice(&self, secret: &Preimage) -> Result<(), LightningError> {
        let body = serde_json::json!({ "preimage": BASE64.encode(secret.as_bytes()) });
        let _: serde_json::Value = self.post("/v2/invoices/settle", &body).await?;
        Ok(())
    }

    async fn cancel_hold_invoice(&self, id: &Hashlock) -> Result<(), LightningError> {
        let body = serde_json::json!({ "payment_hash": BASE64.encode(id.as_bytes()) });
        let _: serde_json::Value = self.post("/v2/invoices/cancel", &body).await?;
        Ok(())
    }

    async fn pay(&self, request: &str, max_fee: u64) -> Result<Payment, LightningError> {
        let body = SendPaymentRequest {
            payment_request: request,
            fee_limit: FeeLimit {
                fixed: max_fee.to_string(),
            },
        };
        let url = format!("{}/v1/channels/transactions", self.base_url);
        let sent: SendPaymentResponse = self
            .send(self.http.post(&url).timeout(PAYMENT_TIMEOUT).json(&body))
            .await?;

        if !sent.payment_error.is_empty() {
            return Err(LightningError::PaymentFailed(sent.payment_error));
        }
        let secret = Preimage::from_bytes(decode_bytes32("payment_preimage", &sent.payment_preimage)?);
        if secret.is_zero() {
            return Err(LightningError::PaymentFailed("no preimage returned".to_string()));
        }

        Ok(Payment {
            secret,
            fee: sent.payment_route.unwrap_or_default().total_fees,
        })
    }

    async fn channels(&self) -> Result<Vec<ChannelBalance>, LightningError> {
        let listed: ListChannelsResponse = self.get("/v1/channels").await?;
        Ok(listed
            .channels
            .into_iter()
            .map(|c| ChannelBalance {
                local_balance: c.local_balance,
                remote_balance: c.remote_balance,
                unsettled_balance: c.unsettled_balance,
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn int64_fields_accept_strings_and_numbers() {
        let Ok(listed) = serde_json::from_str::<ListChannelsResponse>(
            r#"{"channels":[{"local_balance":"1500","remote_balance":200},{"local_balance":"5"}]}"#,
        ) else {
            panic!("channel listing should parse");
        };
        let rows: Vec<(u64, u64, u64)> = listed
            .channels
            .iter()
            .map(|c| (c.local_balance, c.remote_balance, c.unsettled_balance))
            .collect();
        assert_eq!(rows, vec![(1_500, 200, 0), (5, 0, 0)]);
    }

    #[test]
    fn empty_channel_listing_parses() {
        let Ok(listed) = serde_json::from_str::<ListChannelsResponse>("{}") else {
            panic!("empty listing should parse");
        };
        assert!(listed.channels.is_empty());
    }

    #[test]
    fn invoice_states_map_to_updates() {
        assert!(invoice_update("SETTLED").is_confirmed);
        assert!(invoice_update("ACCEPTED").is_held);
        assert!(invoice_update("CANCELED").is_canceled);
        assert_eq!(invoice_update("OPEN"), InvoiceUpdate::default());
    }

    #[test]
    fn r_hash_must_be_32_bytes() {
        let encoded = BASE64.encode([7u8; 32]);
        assert!(matches!(decode_bytes32("r_hash", &encoded), Ok(b) if b == [7u8; 32]));
        let short = BASE64.encode([7u8; 16]);
        assert!(matches!(
            decode_bytes32("r_hash", &short),
            Err(LightningError::Transport(_))
        ));
    }

    #[test]
    fn missing_certificate_is_a_config_error() {
        let config = LndConfig {
            rest_url: "https://localhost:8080/".to_string(),
            macaroon_hex: "00".to_string(),
            tls_cert_path: Some("/nonexistent/tls.cert".into()),
        };
        assert!(matches!(
            LndRestNode::new(&config, Duration::from_millis(10)),
            Err(LightningError::Config(_))
        ));
    }
}
