//! Gateway request and response models
//!
//! Wire shapes for the remote operations a session drives. Merchant id, site
//! id, timestamp and checksum are stamped by the client, not carried here.

use crate::payments::status::EnvelopeStatus;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Accepts a JSON number, a numeric string or null.
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

/// Accepts a JSON string or number as an optional string.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Shared request parts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetails {
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAddress {
    pub first_name: String,
    pub last_name: String,
    pub country: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub first_name: String,
    pub last_name: String,
    pub country: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

/// Callback URLs attached to a charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_holder_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc_temp_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_year: Option<String>,
    #[serde(rename = "CVV", skip_serializing_if = "Option::is_none")]
    pub cvv: Option<String>,
    #[serde(rename = "threeD", skip_serializing_if = "Option::is_none")]
    pub three_d: Option<ThreeDPayload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserDetails {
    pub accept_header: String,
    pub ip: String,
    pub java_enabled: String,
    pub java_script_enabled: String,
    pub language: String,
    pub color_depth: String,
    pub screen_height: String,
    pub screen_width: String,
    pub time_zone: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct V2AdditionalParams {
    pub challenge_window_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_preference: Option<String>,
    #[serde(rename = "exceptionPayment3DAuth", skip_serializing_if = "Option::is_none")]
    pub exception_payment_3d_auth: Option<bool>,
}

/// 3DS browser and device fields sent with the first charge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeDPayload {
    pub version: String,
    pub method_completion_ind: String,
    pub platform_type: String,
    #[serde(rename = "merchantURL", skip_serializing_if = "Option::is_none")]
    pub merchant_url: Option<String>,
    #[serde(rename = "notificationURL", skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
    pub browser_details: BrowserDetails,
    pub v2_additional_params: V2AdditionalParams,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOptionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_payment_option_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<CardPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_payment_method: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submethod: Option<SubMethod>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubMethod {
    pub submethod: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPaymentOptionRef {
    pub user_payment_option_id: String,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenRequest {
    pub client_request_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrderRequest {
    pub session_token: String,
    pub currency: String,
    pub amount: String,
    pub user_token_id: String,
    pub client_unique_id: String,
    pub client_request_id: String,
    pub is_partial_approval: String,
    pub billing_address: BillingAddress,
    pub url_details: UrlDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPaymentRequest {
    pub session_token: String,
    pub currency: String,
    pub amount: String,
    pub payment_option: PaymentOptionPayload,
    pub user_token_id: String,
    pub client_unique_id: String,
    pub client_request_id: String,
    pub device_details: DeviceDetails,
    pub billing_address: BillingAddress,
    pub url_details: UrlDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub session_token: String,
    pub currency: String,
    pub amount: String,
    pub payment_option: PaymentOptionPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_only_type: Option<String>,
    pub is_partial_approval: String,
    pub user_token_id: String,
    pub client_unique_id: String,
    pub client_request_id: String,
    pub product_id: String,
    pub device_details: DeviceDetails,
    pub billing_address: BillingAddress,
    pub user_details: UserDetails,
    pub url_details: UrlDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusRequest {
    pub session_token: String,
    pub client_request_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub session_token: String,
    pub currency: String,
    pub amount: String,
    pub related_transaction_id: String,
    pub client_unique_id: String,
    pub client_request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_option: Option<UserPaymentOptionRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidRequest {
    pub session_token: String,
    pub currency: String,
    pub amount: String,
    pub related_transaction_id: String,
    pub client_unique_id: String,
    pub client_request_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub session_token: String,
    pub user_token_id: String,
    pub client_unique_id: String,
    pub client_request_id: String,
    pub amount: String,
    pub currency: String,
    pub user_payment_option: UserPaymentOptionRef,
    pub device_details: DeviceDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutStatusRequest {
    pub client_request_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePaymentOptionRequest {
    pub client_request_id: String,
    pub user_token_id: String,
    pub user_payment_option_id: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Fields every gateway response carries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub status: EnvelopeStatus,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub err_code: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub internal_request_id: Option<String>,
    #[serde(default)]
    pub client_request_id: Option<String>,
}

/// Per-transaction outcome carried by charge-like responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    #[serde(default)]
    pub transaction_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub gw_error_code: i64,
    #[serde(default)]
    pub gw_error_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub gw_extended_error_code: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_method_error_code: Option<String>,
    #[serde(default)]
    pub payment_method_error_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeDEcho {
    #[serde(default)]
    pub v2supported: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub method_payload: Option<String>,
    #[serde(default)]
    pub method_url: Option<String>,
    #[serde(default)]
    pub server_trans_id: Option<String>,
    #[serde(default)]
    pub ds_trans_id: Option<String>,
    #[serde(default)]
    pub acs_url: Option<String>,
    #[serde(default)]
    pub acs_challenge_mandated: Option<String>,
    #[serde(default)]
    pub c_req: Option<String>,
    #[serde(default, rename = "threeDFlow", deserialize_with = "lenient_string")]
    pub three_d_flow: Option<String>,
    #[serde(default, rename = "threeDReason")]
    pub three_d_reason: Option<String>,
    #[serde(default, rename = "threeDReasonId", deserialize_with = "lenient_string")]
    pub three_d_reason_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub is_liability_on_issuer: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub eci: Option<String>,
    #[serde(default)]
    pub cavv: Option<String>,
    #[serde(default)]
    pub white_list_status: Option<String>,
    #[serde(default)]
    pub authentication_type: Option<String>,
    #[serde(default)]
    pub flow: Option<String>,
    #[serde(default)]
    pub acquirer_decision: Option<String>,
    #[serde(default)]
    pub decision_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEcho {
    #[serde(default)]
    pub cc_card_number: Option<String>,
    #[serde(default)]
    pub bin: Option<String>,
    #[serde(default)]
    pub last4_digits: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cc_exp_month: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cc_exp_year: Option<String>,
    #[serde(default)]
    pub card_brand: Option<String>,
    #[serde(default)]
    pub cvv2_reply: Option<String>,
    #[serde(default)]
    pub avs_code: Option<String>,
    #[serde(default, rename = "threeD")]
    pub three_d: Option<ThreeDEcho>,
}

/// Payment option as echoed back by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOptionEcho {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_payment_option_id: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub card: Option<CardEcho>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudDetails {
    #[serde(default)]
    pub final_decision: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialApproval {
    #[serde(default)]
    pub requested_amount: Option<String>,
    #[serde(default)]
    pub requested_currency: Option<String>,
    #[serde(default)]
    pub processed_amount: Option<String>,
    #[serde(default)]
    pub processed_currency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenResponse {
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrderResponse {
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPaymentResponse {
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
    #[serde(flatten)]
    pub outcome: TransactionOutcome,
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub payment_option: Option<PaymentOptionEcho>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
    #[serde(flatten)]
    pub outcome: TransactionOutcome,
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub payment_option: Option<PaymentOptionEcho>,
    #[serde(default)]
    pub fraud_details: Option<FraudDetails>,
    #[serde(default)]
    pub partial_approval: Option<PartialApproval>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
    #[serde(flatten)]
    pub outcome: TransactionOutcome,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub payment_option: Option<PaymentOptionEcho>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Response to refund, void and payout calls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
    #[serde(flatten)]
    pub outcome: TransactionOutcome,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutStatusResponse {
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
    #[serde(flatten)]
    pub outcome: TransactionOutcome,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePaymentOptionResponse {
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
}
