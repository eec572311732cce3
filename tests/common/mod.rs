#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use nuvei_payments::config::{CallbackUrls, FlowPolicy, GatewayConfig, MerchantConfig};
use nuvei_payments::error::{GatewayError, GatewayResult};
use nuvei_payments::payments::method::BillingIdentity;
use nuvei_payments::payments::traits::GatewayClient;
use nuvei_payments::payments::types::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const MERCHANT_KEY: &str = "a1b2c3d4e5f6merchantkey";
pub const USER_TOKEN_ID: &str = "user-0042";
pub const SESSION_ID: &str = "5d8f7a7c0f1e4f7aa1f0c0f5d2b8e9a1";

pub const SESSION_TOKEN: &str = "getSessionToken";
pub const OPEN_ORDER: &str = "openOrder";
pub const INIT_PAYMENT: &str = "initPayment";
pub const PAYMENT: &str = "payment";
pub const PAYMENT_STATUS: &str = "getPaymentStatus";
pub const REFUND: &str = "refundTransaction";
pub const VOID: &str = "voidTransaction";
pub const PAYOUT: &str = "payout";
pub const PAYOUT_STATUS: &str = "getPayoutStatus";
pub const DELETE_UPO: &str = "deleteUPO";

pub fn gateway_config() -> Arc<GatewayConfig> {
    gateway_config_with(FlowPolicy::default())
}

/// Staging merchant with the given flow policy.
pub fn gateway_config_with(policy: FlowPolicy) -> Arc<GatewayConfig> {
    Arc::new(GatewayConfig {
        merchant: MerchantConfig {
            merchant_id: "2439523627382822".to_string(),
            merchant_site_id: "204388".to_string(),
            merchant_key: MERCHANT_KEY.to_string(),
            server_host: "https://ppp-test.nuvei.com/ppp/api/v1/".to_string(),
            timeout_secs: 5,
        },
        urls: CallbackUrls {
            public_base_url: Some("https://pay.example.com".to_string()),
            ..CallbackUrls::default()
        },
        policy,
    })
}

pub fn billing() -> BillingIdentity {
    BillingIdentity {
        first_name: "Ana".to_string(),
        last_name: "Quispe".to_string(),
        country: "PE".to_string(),
        email: "ana.quispe@example.com".to_string(),
        phone: None,
        date_of_birth: None,
    }
}

/// Base64 CRes as an ACS would post it back.
pub fn encoded_cres(server_trans_id: &str, trans_status: &str) -> String {
    let cres = json!({
        "threeDSServerTransID": server_trans_id,
        "acsTransID": "d7c1ee99-9478-44a6-b1f2-391e29c6b340",
        "messageType": "CRes",
        "messageVersion": "2.1.0",
        "transStatus": trans_status,
    });
    STANDARD.encode(cres.to_string())
}

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Fail(String),
}

/// Gateway double with per-operation scripted replies.
///
/// Replies are consumed in order; the last one for an operation keeps
/// answering. Every request is recorded as JSON, and replies echo the
/// request's `clientRequestId` the way the gateway does.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    calls: Mutex<Vec<(&'static str, Value)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, op: &'static str, body: Value) -> Self {
        self.push(op, Reply::Json(body));
        self
    }

    pub fn fail(self, op: &'static str, message: &str) -> Self {
        self.push(op, Reply::Fail(message.to_string()));
        self
    }

    fn push(&self, op: &'static str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self, op: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| *name == op)
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls(op).len()
    }

    fn answer<Req, Resp>(&self, op: &'static str, request: &Req) -> GatewayResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let request = serde_json::to_value(request)?;
        self.calls.lock().unwrap().push((op, request.clone()));

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.entry(op).or_default();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        match reply {
            None => Err(GatewayError::transport(format!("no scripted reply for {}", op))),
            Some(Reply::Fail(message)) => Err(GatewayError::transport(message)),
            Some(Reply::Json(mut body)) => {
                if let (Some(id), Some(fields)) = (request.get("clientRequestId"), body.as_object_mut()) {
                    fields
                        .entry("clientRequestId")
                        .or_insert_with(|| id.clone());
                }
                Ok(serde_json::from_value(body)?)
            }
        }
    }
}

#[async_trait]
impl GatewayClient for ScriptedGateway {
    async fn get_session_token(
        &self,
        request: SessionTokenRequest,
    ) -> GatewayResult<SessionTokenResponse> {
        self.answer(SESSION_TOKEN, &request)
    }

    async fn open_order(&self, request: OpenOrderRequest) -> GatewayResult<OpenOrderResponse> {
        self.answer(OPEN_ORDER, &request)
    }

    async fn init_payment(
        &self,
        request: InitPaymentRequest,
    ) -> GatewayResult<InitPaymentResponse> {
        self.answer(INIT_PAYMENT, &request)
    }

    async fn payment(&self, request: PaymentRequest) -> GatewayResult<PaymentResponse> {
        self.answer(PAYMENT, &request)
    }

    async fn payment_status(
        &self,
        request: PaymentStatusRequest,
    ) -> GatewayResult<PaymentStatusResponse> {
        self.answer(PAYMENT_STATUS, &request)
    }

    async fn refund_transaction(
        &self,
        request: RefundRequest,
    ) -> GatewayResult<TransactionResponse> {
        self.answer(REFUND, &request)
    }

    async fn void_transaction(&self, request: VoidRequest) -> GatewayResult<TransactionResponse> {
        self.answer(VOID, &request)
    }

    async fn payout(&self, request: PayoutRequest) -> GatewayResult<TransactionResponse> {
        self.answer(PAYOUT, &request)
    }

    async fn payout_status(
        &self,
        request: PayoutStatusRequest,
    ) -> GatewayResult<PayoutStatusResponse> {
        self.answer(PAYOUT_STATUS, &request)
    }

    async fn delete_payment_option(
        &self,
        request: DeletePaymentOptionRequest,
    ) -> GatewayResult<DeletePaymentOptionResponse> {
        self.answer(DELETE_UPO, &request)
    }
}

pub fn session_token_ok() -> Value {
    json!({ "status": "SUCCESS", "errCode": 0, "sessionToken": "9610a8f6-44cf-4c4f-976a-005da69a2a3b" })
}

pub fn open_order_ok(order_id: &str) -> Value {
    json!({ "status": "SUCCESS", "errCode": 0, "orderId": order_id })
}

pub fn init_payment_ok(transaction_id: &str, three_d: Value) -> Value {
    json!({
        "status": "SUCCESS",
        "errCode": 0,
        "transactionId": transaction_id,
        "transactionType": "InitAuth3D",
        "transactionStatus": "APPROVED",
        "paymentOption": { "card": { "threeD": three_d } },
    })
}

pub fn sale_approved(transaction_id: &str) -> Value {
    json!({
        "status": "SUCCESS",
        "errCode": 0,
        "transactionId": transaction_id,
        "transactionType": "Sale",
        "transactionStatus": "APPROVED",
        "gwErrorCode": 0,
        "gwExtendedErrorCode": 0,
        "fraudDetails": { "finalDecision": "Accept" },
    })
}

pub fn status_approved(transaction_id: &str, currency: &str, amount: &str) -> Value {
    json!({
        "status": "SUCCESS",
        "errCode": 0,
        "transactionId": transaction_id,
        "transactionType": "Sale",
        "transactionStatus": "APPROVED",
        "currency": currency,
        "amount": amount,
    })
}
