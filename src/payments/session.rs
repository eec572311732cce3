//! Payment session base
//!
//! State shared by deposits and withdrawals: the status lattice bookkeeping,
//! the three response parsers every gateway reply runs through, idempotency
//! keys, and the remote operations both directions use (session token, void,
//! delete saved option).
//!
//! A session is single-owner. Flow functions take `&mut self`, so two calls
//! against the same session can never be in flight at once.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::payments::amount::PaymentAmount;
use crate::payments::merge::{non_blank, MergePolicy};
use crate::payments::method::PaymentMethodDescriptor;
use crate::payments::status::{
    EnvelopeStatus, ErrorType, FraudDecision, PayType, Status, TransactionStatus,
    TransactionType,
};
use crate::payments::traits::GatewayClient;
use crate::payments::types::{
    BillingAddress, DeletePaymentOptionRequest, DeviceDetails, ResponseEnvelope,
    SessionTokenRequest, TransactionOutcome, UrlDetails, UserDetails, VoidRequest,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SESSION_ID_MIN_LEN: usize = 15;
pub const SESSION_ID_MAX_LEN: usize = 40;

const SESSION_EXPIRED_CODE: i64 = 1069;
const FILTER_ERROR_CODE: i64 = -1100;
const CUSTOM_FRAUD_FILTER_CODE: i64 = 1116;
/// Envelope codes that are business conditions rather than system faults.
const NON_SYSTEM_ERROR_CODES: [i64; 4] = [SESSION_EXPIRED_CODE, 1140, 9100, 9155];

/// Gateway error 1069, the session token timed out.
fn is_expired_session(envelope: &ResponseEnvelope) -> bool {
    envelope.status == EnvelopeStatus::Error
        && envelope.err_code == SESSION_EXPIRED_CODE
        && non_blank(envelope.reason.as_deref())
            .is_some_and(|reason| reason.to_ascii_lowercase().contains("session expired"))
}

/// 32 hex characters of SHA-256 over a random UUID.
pub fn generate_session_id() -> String {
    let digest = hex::encode(Sha256::digest(Uuid::new_v4().as_bytes()));
    digest[..32].to_string()
}

/// Caller-supplied id, or a generated one when absent.
pub fn resolve_session_id(session_id: Option<&str>) -> GatewayResult<String> {
    match non_blank(session_id) {
        None => Ok(generate_session_id()),
        Some(id) if (SESSION_ID_MIN_LEN..=SESSION_ID_MAX_LEN).contains(&id.len()) => {
            Ok(id.to_string())
        }
        Some(id) => Err(GatewayError::invalid_session(format!(
            "session id must be {}-{} characters, got {}",
            SESSION_ID_MIN_LEN,
            SESSION_ID_MAX_LEN,
            id.len()
        ))),
    }
}

/// Serializable view of a session for callers and the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub pay_type: PayType,
    pub status: Status,
    pub full_status: String,
    pub reason: Option<String>,
    pub requested: PaymentAmount,
    pub responded: Option<PaymentAmount>,
    pub order_id: Option<String>,
    pub pay_transaction_id: Option<String>,
    pub redirect_url: Option<String>,
    pub three_d_description: Option<String>,
}

pub struct Session {
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) client: Arc<dyn GatewayClient>,
    pay_type: PayType,
    pub(crate) method: PaymentMethodDescriptor,
    device: DeviceDetails,
    url_details: UrlDetails,
    session_id: String,
    pub(crate) session_token: Option<String>,
    requested: PaymentAmount,
    pub(crate) responded: Option<PaymentAmount>,
    status: Status,
    err_reason: Option<String>,
    reason_trail: Vec<String>,
    err_code: i64,
    pub(crate) err_type: ErrorType,
    hint: Option<String>,
    request_id: Option<String>,
    pub(crate) client_request_id: Option<String>,
    pub(crate) gw_err_code: Option<i64>,
    pub(crate) gw_ext_err_code: Option<i64>,
    pub(crate) gw_err_reason: Option<String>,
    pay_method_err_code: Option<String>,
    pay_method_err_reason: Option<String>,
    tx_status: Option<TransactionStatus>,
    pub(crate) tx_type: Option<TransactionType>,
    pub(crate) final_decision: Option<FraudDecision>,
    pub(crate) last_tx_id: Option<String>,
    pub(crate) related_tx_id: Option<String>,
    pub(crate) pay_tx_id: Option<String>,
    pub(crate) void_tx_id: Option<String>,
}

impl Session {
    pub(crate) fn new(
        pay_type: PayType,
        config: Arc<GatewayConfig>,
        client: Arc<dyn GatewayClient>,
        method: PaymentMethodDescriptor,
        requested: PaymentAmount,
        session_id: Option<&str>,
    ) -> GatewayResult<Self> {
        let session_id = resolve_session_id(session_id)?;
        let url_details = UrlDetails {
            success_url: config.urls.success_url.clone(),
            failure_url: config.urls.failure_url.clone(),
            pending_url: config.urls.pending_url.clone(),
            notification_url: config.urls.notification_url(&session_id),
        };
        let device = DeviceDetails {
            ip_address: config.policy.device_ip.clone(),
        };

        debug!(
            "Session created: id={} type={:?} amount={}",
            session_id, pay_type, requested
        );

        Ok(Self {
            config,
            client,
            pay_type,
            method,
            device,
            url_details,
            session_id,
            session_token: None,
            requested,
            responded: None,
            status: Status::NotInit,
            err_reason: None,
            reason_trail: Vec::new(),
            err_code: 0,
            err_type: ErrorType::NoError,
            hint: None,
            request_id: None,
            client_request_id: None,
            gw_err_code: None,
            gw_ext_err_code: None,
            gw_err_reason: None,
            pay_method_err_code: None,
            pay_method_err_reason: None,
            tx_status: None,
            tx_type: None,
            final_decision: None,
            last_tx_id: None,
            related_tx_id: None,
            pay_tx_id: None,
            void_tx_id: None,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn pay_type(&self) -> PayType {
        self.pay_type
    }

    pub fn method(&self) -> &PaymentMethodDescriptor {
        &self.method
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn url_details(&self) -> &UrlDetails {
        &self.url_details
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn requested(&self) -> &PaymentAmount {
        &self.requested
    }

    pub fn responded(&self) -> Option<&PaymentAmount> {
        self.responded.as_ref()
    }

    /// The responded amount once known, the requested one before.
    pub fn responded_or_requested(&self) -> &PaymentAmount {
        self.responded.as_ref().unwrap_or(&self.requested)
    }

    /// Earliest recorded failure reason.
    pub fn err_reason(&self) -> Option<&str> {
        self.err_reason.as_deref()
    }

    /// Every reason recorded over the session's life, oldest first.
    pub fn reason_trail(&self) -> &[String] {
        &self.reason_trail
    }

    pub fn err_code(&self) -> i64 {
        self.err_code
    }

    pub fn err_type(&self) -> &ErrorType {
        &self.err_type
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn client_request_id(&self) -> Option<&str> {
        self.client_request_id.as_deref()
    }

    pub fn gw_err_code(&self) -> Option<i64> {
        self.gw_err_code
    }

    pub fn gw_ext_err_code(&self) -> Option<i64> {
        self.gw_ext_err_code
    }

    pub fn gw_err_reason(&self) -> Option<&str> {
        self.gw_err_reason.as_deref()
    }

    pub fn pay_method_err_code(&self) -> Option<&str> {
        self.pay_method_err_code.as_deref()
    }

    pub fn pay_method_err_reason(&self) -> Option<&str> {
        self.pay_method_err_reason.as_deref()
    }

    pub fn tx_status(&self) -> Option<TransactionStatus> {
        self.tx_status
    }

    pub fn tx_type(&self) -> Option<&TransactionType> {
        self.tx_type.as_ref()
    }

    pub fn final_decision(&self) -> Option<&FraudDecision> {
        self.final_decision.as_ref()
    }

    pub fn last_tx_id(&self) -> Option<&str> {
        self.last_tx_id.as_deref()
    }

    pub fn related_tx_id(&self) -> Option<&str> {
        self.related_tx_id.as_deref()
    }

    pub fn pay_tx_id(&self) -> Option<&str> {
        self.pay_tx_id.as_deref()
    }

    pub fn void_tx_id(&self) -> Option<&str> {
        self.void_tx_id.as_deref()
    }

    /// Idempotency key for the next remote call: the session id, suffixed
    /// with the related transaction id once there is one.
    pub fn idempotency_key(&self) -> String {
        match non_blank(self.related_tx_id.as_deref()) {
            Some(related) => format!("{}_{}", self.session_id, related),
            None => self.session_id.clone(),
        }
    }

    pub(crate) fn device(&self) -> DeviceDetails {
        self.device.clone()
    }

    pub(crate) fn billing_address(&self) -> BillingAddress {
        let billing = self.method.billing();
        BillingAddress {
            first_name: billing.first_name.clone(),
            last_name: billing.last_name.clone(),
            country: billing.country.clone(),
            email: billing.email.clone(),
            phone: billing.phone.clone(),
        }
    }

    pub(crate) fn user_details(&self) -> UserDetails {
        let billing = self.method.billing();
        UserDetails {
            first_name: billing.first_name.clone(),
            last_name: billing.last_name.clone(),
            country: billing.country.clone(),
            email: billing.email.clone(),
            phone: billing.phone.clone(),
            date_of_birth: billing.date_of_birth.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Status predicates
    // -----------------------------------------------------------------------

    pub fn is_approved(&self) -> bool {
        self.status == Status::Approved
    }

    /// Approved for the full requested amount.
    pub fn is_fully_approved(&self) -> bool {
        self.is_approved() && self.responded.as_ref() == Some(&self.requested)
    }

    pub fn is_declined(&self) -> bool {
        self.status == Status::Declined
    }

    pub fn is_voided(&self) -> bool {
        self.status == Status::Voided
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_successful()
    }

    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }

    /// `Error` or `Exception`.
    pub fn is_error(&self) -> bool {
        matches!(self.status, Status::Error | Status::Exception)
    }

    pub fn is_exception(&self) -> bool {
        self.status == Status::Exception
    }

    pub(crate) fn is_base_redirected(&self) -> bool {
        self.status == Status::Redirect
    }

    /// Approval of a sale, as opposed to a zero-value or auth-only approval.
    pub fn is_sale_approved(&self) -> bool {
        self.is_approved() && self.tx_type == Some(TransactionType::Sale)
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    pub(crate) fn reason_contains(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.reason_trail
            .iter()
            .any(|reason| reason.to_ascii_lowercase().contains(&needle))
    }

    pub fn is_session_expired(&self) -> bool {
        self.status == Status::Error && self.reason_contains("Session expired")
    }

    pub fn is_gw_declined(&self) -> bool {
        self.is_declined()
            && self.gw_err_code.is_some_and(|code| code == -1 || code > 0)
            && self.gw_ext_err_code.map_or(true, |ext| ext == 0)
    }

    pub fn is_filter_error(&self) -> bool {
        self.status == Status::Error
            && self.gw_err_code == Some(FILTER_ERROR_CODE)
            && self.gw_ext_err_code.is_some_and(|ext| ext > 0)
    }

    pub fn is_system_error(&self) -> bool {
        if self.status != Status::Error {
            return false;
        }

        let envelope_fault = self.err_code > 0 && !NON_SYSTEM_ERROR_CODES.contains(&self.err_code);
        let type_fault = matches!(self.err_type, ErrorType::Other(_));
        let gateway_fault = match (self.gw_err_code, self.gw_ext_err_code) {
            (Some(-1), Some(-1)) => true,
            (Some(code), ext) if code < -1 => ext.map_or(true, |ext| ext <= 0),
            _ => false,
        };

        self.reason_contains("System Error") || envelope_fault || type_fault || gateway_fault
    }

    pub fn is_pay_method_failed(&self) -> bool {
        self.is_failed()
            && (self.pay_method_err_reason.is_some()
                || self
                    .pay_method_err_code
                    .as_deref()
                    .is_some_and(|code| code.parse::<i64>().map_or(true, |c| c != 0)))
    }

    pub fn is_custom_fraud_filter(&self) -> bool {
        self.is_filter_error()
            && self.gw_ext_err_code == Some(CUSTOM_FRAUD_FILTER_CODE)
            && self.final_decision == Some(FraudDecision::Reject)
    }

    /// One-line status, e.g. `Declined: Insufficient funds (GwErrCode=-1)` or
    /// `Approved: currency=PEN, amount=107.02`.
    pub fn full_status(&self) -> String {
        let mut text = self.status.to_string();

        if self.is_failed() {
            if let Some(reason) = &self.err_reason {
                text.push_str(": ");
                text.push_str(reason);
            }

            let mut codes = Vec::new();
            if self.err_code != 0 {
                codes.push(format!("ErrCode={}", self.err_code));
            }
            if let Some(code) = self.gw_err_code {
                codes.push(format!("GwErrCode={}", code));
            }
            if let Some(code) = self.gw_ext_err_code {
                codes.push(format!("GwExtErrCode={}", code));
            }
            if let Some(code) = &self.pay_method_err_code {
                codes.push(format!("PayMethodErrCode={}", code));
            }
            if !codes.is_empty() {
                text.push_str(&format!(" ({})", codes.join(", ")));
            }
        } else if self.is_approved() {
            let paid = self.responded_or_requested();
            text.push_str(&format!(
                ": currency={}, amount={}",
                paid.currency(),
                paid.formatted_amount()
            ));
        }

        text
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            pay_type: self.pay_type,
            status: self.status,
            full_status: self.full_status(),
            reason: self.err_reason.clone(),
            requested: self.requested.clone(),
            responded: self.responded.clone(),
            order_id: None,
            pay_transaction_id: self.pay_tx_id.clone(),
            redirect_url: None,
            three_d_description: None,
        }
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    /// Records a failure. A generic `Error` never masks an earlier decline,
    /// void or error; a more specific status always lands.
    pub fn set_error(&mut self, reason: impl Into<String>, status: Status) -> Status {
        if !self.status.is_failed() || status != Status::Error {
            self.status = status;
        }
        self.note_reason(reason.into());
        self.status
    }

    /// Declined and Voided are final and are never turned into an approval.
    pub(crate) fn set_approved(&mut self) -> Status {
        if !matches!(self.status, Status::Declined | Status::Voided) {
            self.status = Status::Approved;
        }
        self.status
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub(crate) fn set_tx_status(&mut self, tx_status: TransactionStatus) {
        self.tx_status = Some(tx_status);
    }

    fn advance(&mut self, next: Status) {
        self.status = self.status.advance(next);
    }

    /// Appends to the trail; only the first reason becomes `err_reason`.
    pub(crate) fn note_reason(&mut self, reason: String) {
        let reason = reason.trim();
        if reason.is_empty() {
            return;
        }
        if self.reason_trail.last().map(String::as_str) != Some(reason) {
            self.reason_trail.push(reason.to_string());
        }
        MergePolicy::KeepIfAbsent.apply(&mut self.err_reason, Some(reason));
    }

    /// Clears the recorded failure so a later outcome can stand on its own.
    pub(crate) fn clear_errors(&mut self) {
        self.err_type = ErrorType::NoError;
        self.err_reason = None;
        self.gw_err_reason = None;
        self.gw_err_code = None;
        self.gw_ext_err_code = None;
        self.final_decision = None;
    }

    pub(crate) fn fail_transport(&mut self, operation: &str, error: &GatewayError) -> Status {
        warn!(
            "{} failed for session {}: {}",
            operation, self.session_id, error
        );
        self.set_error(format!("{} Exception: {}", operation, error), Status::Exception)
    }

    // -----------------------------------------------------------------------
    // Response parsers
    // -----------------------------------------------------------------------

    /// Envelope parser. With `ignore_session_expired`, an expired-session
    /// error (code 1069) leaves the status untouched.
    pub(crate) fn parse_envelope(
        &mut self,
        envelope: &ResponseEnvelope,
        ignore_session_expired: bool,
    ) -> Status {
        MergePolicy::Overwrite.apply(&mut self.hint, envelope.hint.as_deref());
        MergePolicy::Overwrite.apply(&mut self.request_id, envelope.internal_request_id.as_deref());
        MergePolicy::Overwrite.apply(
            &mut self.client_request_id,
            envelope.client_request_id.as_deref(),
        );

        let err_type = ErrorType::from_vendor(envelope.error_type.as_deref());
        let mut reason = None;
        if envelope.err_code != 0 {
            reason = Some(format!("Response Error Code: {}", envelope.err_code));
        }
        if err_type.is_error() {
            reason = Some(format!("Response Error Type: {}", err_type));
        }
        if let Some(text) = non_blank(envelope.reason.as_deref()) {
            reason = Some(text.to_string());
        }

        match envelope.status {
            EnvelopeStatus::Success => self.advance(Status::Success),
            EnvelopeStatus::Approved => self.advance(Status::Approved),
            EnvelopeStatus::Redirect => self.advance(Status::Redirect),
            EnvelopeStatus::Declined => self.advance(Status::Declined),
            EnvelopeStatus::Error | EnvelopeStatus::Unknown => {
                let reason =
                    reason.unwrap_or_else(|| format!("Response Status: {}", envelope.status));
                if ignore_session_expired && is_expired_session(envelope) {
                    debug!(
                        "Ignoring expired gateway session for {}: {}",
                        self.session_id, reason
                    );
                } else {
                    self.err_code = envelope.err_code;
                    self.err_type = err_type;
                    self.set_error(reason, Status::Error);
                }
                return self.status;
            }
        }

        if let Some(reason) = reason {
            self.note_reason(reason);
        }
        self.status
    }

    /// Payment-method parser. Records the method's error without changing
    /// the status.
    pub(crate) fn parse_pay_method_error(&mut self, outcome: &TransactionOutcome) -> Status {
        let mut note = None;

        if let Some(code) = non_blank(outcome.payment_method_error_code.as_deref()) {
            if code != "0" {
                let text = format!("Pay Method Error Code: {}", code);
                self.pay_method_err_code = Some(code.to_string());
                self.pay_method_err_reason = Some(text.clone());
                note = Some(text);
            }
        }

        if let Some(reason) = non_blank(outcome.payment_method_error_reason.as_deref()) {
            self.pay_method_err_reason = Some(reason.to_string());
            note = Some(format!("Pay Method Reason: {}", reason));
        }

        if let Some(note) = note {
            self.note_reason(note);
        }
        self.status
    }

    /// Transaction-status parser. Anything but APPROVED, DECLINED or
    /// REDIRECT is an error.
    pub(crate) fn parse_transaction_status(&mut self, outcome: &TransactionOutcome) -> Status {
        let mut note = None;

        if outcome.gw_extended_error_code != 0 {
            let text = format!("Gw Extended Error Code: {}", outcome.gw_extended_error_code);
            self.gw_ext_err_code = Some(outcome.gw_extended_error_code);
            self.gw_err_reason = Some(text.clone());
            note = Some(text);
        }

        if outcome.gw_error_code != 0 {
            let text = format!("Gw Error Code: {}", outcome.gw_error_code);
            self.gw_err_code = Some(outcome.gw_error_code);
            self.gw_err_reason = Some(text.clone());
            note = Some(text);
        }

        if let Some(reason) = non_blank(outcome.gw_error_reason.as_deref()) {
            self.gw_err_reason = Some(reason.to_string());
            note = Some(format!("Gw Reason: {}", reason));
        }

        let tx_status = TransactionStatus::from_vendor(outcome.transaction_status.as_deref());
        self.tx_status = Some(tx_status);

        match tx_status {
            TransactionStatus::Declined => {
                self.set_error(note.unwrap_or_default(), Status::Declined);
            }
            TransactionStatus::Approved | TransactionStatus::Redirect => {
                if let Some(note) = note {
                    self.note_reason(note);
                }
            }
            TransactionStatus::Error => {
                self.set_error(note.unwrap_or_else(|| "Gw Error".to_string()), Status::Error);
            }
        }
        self.status
    }

    /// All three parsers, in order. An ignored expired-session reply carries
    /// no transaction, so it stops after the envelope.
    pub(crate) fn parse_response(
        &mut self,
        envelope: &ResponseEnvelope,
        outcome: &TransactionOutcome,
        ignore_session_expired: bool,
    ) -> Status {
        self.parse_envelope(envelope, ignore_session_expired);
        if ignore_session_expired && is_expired_session(envelope) {
            return self.status;
        }
        self.parse_pay_method_error(outcome);
        self.parse_transaction_status(outcome)
    }

    // -----------------------------------------------------------------------
    // Remote operations
    // -----------------------------------------------------------------------

    pub(crate) async fn request_session_token(&mut self) -> Status {
        let request = SessionTokenRequest {
            client_request_id: self.idempotency_key(),
        };

        info!("Requesting session token: session={}", self.session_id);

        match self.client.get_session_token(request).await {
            Ok(response) => {
                self.parse_envelope(&response.envelope, false);
                self.session_token = non_blank(response.session_token.as_deref()).map(str::to_string);
                if self.session_token.is_none() && !self.is_failed() {
                    self.set_error("Missing SessionToken", Status::Error);
                }
            }
            Err(e) => {
                self.fail_transport("SessionTokenReq", &e);
            }
        }

        self.status
    }

    /// Voids the related transaction for the responded (or requested) amount.
    pub(crate) async fn request_void(&mut self) -> Status {
        let Some(related) = self.related_tx_id.clone() else {
            return self.set_error("Missing RelTransactionID", Status::Error);
        };
        let Some(session_token) = self.session_token.clone() else {
            return self.set_error("Missing SessionToken", Status::Error);
        };

        let amount = self.responded_or_requested().clone();
        let request = VoidRequest {
            session_token,
            currency: amount.currency().to_string(),
            amount: amount.formatted_amount(),
            related_transaction_id: related.clone(),
            client_unique_id: self.session_id.clone(),
            client_request_id: self.idempotency_key(),
        };

        info!(
            "Voiding transaction: session={} related={} amount={}",
            self.session_id, related, amount
        );

        match self.client.void_transaction(request).await {
            Ok(response) => {
                MergePolicy::Overwrite.apply(&mut self.void_tx_id, response.transaction_id.as_deref());
                MergePolicy::Overwrite.apply(&mut self.last_tx_id, response.transaction_id.as_deref());
                self.parse_response(&response.envelope, &response.outcome, false);
                if self.is_successful() {
                    self.set_error(format!("Voided {}", amount), Status::Voided);
                    info!("Transaction voided: session={} amount={}", self.session_id, amount);
                }
            }
            Err(e) => {
                self.fail_transport("VoidPayReq", &e);
            }
        }

        self.status
    }

    /// Deletes the user's saved payment option at the gateway. Does not touch
    /// the session status; returns whether the gateway accepted the delete.
    pub async fn delete_saved_option(&self) -> GatewayResult<bool> {
        let option_id = self
            .method
            .saved_option_id()
            .ok_or_else(|| GatewayError::invalid_payment_method("no saved payment option"))?;

        let request = DeletePaymentOptionRequest {
            client_request_id: self.idempotency_key(),
            user_token_id: self.method.user_token_id().to_string(),
            user_payment_option_id: option_id.to_string(),
        };

        info!(
            "Deleting saved payment option: session={} option={}",
            self.session_id, option_id
        );

        let response = self.client.delete_payment_option(request).await?;
        let deleted = response.envelope.status == EnvelopeStatus::Success;
        if !deleted {
            warn!(
                "Saved payment option {} not deleted: {}",
                option_id,
                response.envelope.reason.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(deleted)
    }
}
