//! Nuvei (SafeCharge) REST client
//!
//! JSON POSTs to `<server host><operation>.do`. Every request is stamped with
//! the merchant credentials, a UTC timestamp and a SHA-256 checksum over an
//! operation-specific list of fields followed by the merchant secret key.

use crate::config::MerchantConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::payments::traits::GatewayClient;
use crate::payments::types::{
    DeletePaymentOptionRequest, DeletePaymentOptionResponse, InitPaymentRequest,
    InitPaymentResponse, OpenOrderRequest, OpenOrderResponse, PaymentRequest, PaymentResponse,
    PaymentStatusRequest, PaymentStatusResponse, PayoutRequest, PayoutStatusRequest,
    PayoutStatusResponse, RefundRequest, SessionTokenRequest, SessionTokenResponse,
    TransactionResponse, VoidRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, error};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Field order the gateway hashes for each family of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChecksumLayout {
    Basic,
    Amount,
    Reversal,
    Unsigned,
}

impl ChecksumLayout {
    fn fields(self) -> &'static [&'static str] {
        match self {
            ChecksumLayout::Basic => &["merchantId", "merchantSiteId", "clientRequestId", "timeStamp"],
            ChecksumLayout::Amount => &[
                "merchantId",
                "merchantSiteId",
                "clientRequestId",
                "amount",
                "currency",
                "timeStamp",
            ],
            ChecksumLayout::Reversal => &[
                "merchantId",
                "merchantSiteId",
                "clientRequestId",
                "clientUniqueId",
                "amount",
                "currency",
                "relatedTransactionId",
                "authCode",
                "comment",
                "urlDetails",
                "timeStamp",
            ],
            ChecksumLayout::Unsigned => &[],
        }
    }
}

/// Hex SHA-256 over the layout's field values (absent fields hash as empty)
/// followed by the secret key.
fn checksum(body: &Map<String, Value>, layout: ChecksumLayout, merchant_key: &str) -> Option<String> {
    if layout == ChecksumLayout::Unsigned {
        return None;
    }

    let mut hasher = Sha256::new();
    for field in layout.fields() {
        match body.get(*field) {
            Some(Value::String(s)) => hasher.update(s.as_bytes()),
            Some(Value::Number(n)) => hasher.update(n.to_string().as_bytes()),
            _ => {}
        }
    }
    hasher.update(merchant_key.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

pub struct NuveiClient {
    merchant_id: String,
    merchant_site_id: String,
    merchant_key: String,
    base_url: String,
    timeout_secs: u64,
    client: Client,
}

impl NuveiClient {
    pub fn new(merchant: &MerchantConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(merchant.timeout_secs))
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to create HTTP client: {}", e)))?;

        let mut base_url = merchant.server_host.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            merchant_id: merchant.merchant_id.clone(),
            merchant_site_id: merchant.merchant_site_id.clone(),
            merchant_key: merchant.merchant_key.clone(),
            base_url,
            timeout_secs: merchant.timeout_secs,
            client,
        })
    }

    fn stamp<T: Serialize>(&self, request: &T, layout: ChecksumLayout) -> GatewayResult<Map<String, Value>> {
        let mut body = match serde_json::to_value(request)? {
            Value::Object(map) => map,
            other => {
                return Err(GatewayError::serialization(format!(
                    "request must serialize to an object, got {}",
                    other
                )))
            }
        };

        body.insert("merchantId".to_string(), Value::String(self.merchant_id.clone()));
        body.insert(
            "merchantSiteId".to_string(),
            Value::String(self.merchant_site_id.clone()),
        );
        body.insert(
            "timeStamp".to_string(),
            Value::String(Utc::now().format(TIMESTAMP_FORMAT).to_string()),
        );
        if let Some(checksum) = checksum(&body, layout, &self.merchant_key) {
            body.insert("checksum".to_string(), Value::String(checksum));
        }
        Ok(body)
    }

    async fn post<T, R>(&self, operation: &str, request: &T, layout: ChecksumLayout) -> GatewayResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}{}.do", self.base_url, operation);
        let body = self.stamp(request, layout)?;

        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(operation, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_error(operation, e))?;

        if !status.is_success() {
            error!("Nuvei {} returned HTTP {}", operation, status);
            return Err(GatewayError::http(status.as_u16(), text));
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse Nuvei {} response: {}", operation, e);
            GatewayError::decode(format!("invalid {} response: {}", operation, e))
        })
    }

    fn map_error(&self, operation: &str, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            error!("Nuvei {} timed out after {}s", operation, self.timeout_secs);
            GatewayError::timeout(self.timeout_secs)
        } else {
            error!("Nuvei {} request failed: {}", operation, err);
            GatewayError::from(err)
        }
    }
}

#[async_trait]
impl GatewayClient for NuveiClient {
    async fn get_session_token(
        &self,
        request: SessionTokenRequest,
    ) -> GatewayResult<SessionTokenResponse> {
        self.post("getSessionToken", &request, ChecksumLayout::Basic)
            .await
    }

    async fn open_order(&self, request: OpenOrderRequest) -> GatewayResult<OpenOrderResponse> {
        self.post("openOrder", &request, ChecksumLayout::Amount).await
    }

    async fn init_payment(
        &self,
        request: InitPaymentRequest,
    ) -> GatewayResult<InitPaymentResponse> {
        self.post("initPayment", &request, ChecksumLayout::Amount).await
    }

    async fn payment(&self, request: PaymentRequest) -> GatewayResult<PaymentResponse> {
        self.post("payment", &request, ChecksumLayout::Amount).await
    }

    async fn payment_status(
        &self,
        request: PaymentStatusRequest,
    ) -> GatewayResult<PaymentStatusResponse> {
        self.post("getPaymentStatus", &request, ChecksumLayout::Unsigned)
            .await
    }

    async fn refund_transaction(
        &self,
        request: RefundRequest,
    ) -> GatewayResult<TransactionResponse> {
        self.post("refundTransaction", &request, ChecksumLayout::Reversal)
            .await
    }

    async fn void_transaction(&self, request: VoidRequest) -> GatewayResult<TransactionResponse> {
        self.post("voidTransaction", &request, ChecksumLayout::Reversal)
            .await
    }

    async fn payout(&self, request: PayoutRequest) -> GatewayResult<TransactionResponse> {
        self.post("payout", &request, ChecksumLayout::Amount).await
    }

    async fn payout_status(
        &self,
        request: PayoutStatusRequest,
    ) -> GatewayResult<PayoutStatusResponse> {
        self.post("getPayoutStatus", &request, ChecksumLayout::Basic)
            .await
    }

    async fn delete_payment_option(
        &self,
        request: DeletePaymentOptionRequest,
    ) -> GatewayResult<DeletePaymentOptionResponse> {
        self.post("deleteUPO", &request, ChecksumLayout::Basic).await
    }
}
