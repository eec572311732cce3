//! Deposit state machine
//!
//! A deposit moves through prepare, start, confirm and check. A 3DS or APM
//! redirect suspends it between start and confirm; the browser callback (CRes)
//! or the gateway notification (DMN) resumes it.
//!
//! Every flow function returns the status the deposit landed in. Gateway
//! failures are recorded on the session, never returned as `Err`.

use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::payments::amount::PaymentAmount;
use crate::payments::challenge::ChallengeResult;
use crate::payments::merge::{non_blank, MergePolicy};
use crate::payments::method::{PayBy, PaymentMethodDescriptor};
use crate::payments::notification::{NotificationExpectations, NotificationOutcome, PaymentNotification};
use crate::payments::session::{Session, SessionSummary};
use crate::payments::status::{
    FraudDecision, PayType, Status, TransactionStatus, TransactionType,
};
use crate::payments::three_d::{ThreeDState, DEFAULT_THREE_D_VERSION};
use crate::payments::traits::GatewayClient;
use crate::payments::types::{
    BrowserDetails, CardPayload, InitPaymentRequest, OpenOrderRequest, PartialApproval,
    PaymentOptionEcho, PaymentOptionPayload, PaymentRequest, PaymentStatusRequest, RefundRequest,
    SubMethod, ThreeDPayload, UrlDetails, UserPaymentOptionRef, V2AdditionalParams,
};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ZERO_AMOUNT: &str = "0";

/// Sandbox 3DS errors that the staging bypass turns into approvals.
const IGNORABLE_THREE_D_ERRORS: [&str; 2] = [
    "Error In 3DSecure Processing",
    "Card number is not supported with 3DS",
];

/// Why a deposit is waiting on the browser or the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RedirectCause {
    /// Sent to the issuer's ACS; no challenge result yet.
    NativeChallenge,
    /// A challenge result has been received.
    ChallengeResultReceived,
    /// Sent to the APM provider; no notification yet.
    AwaitingNotification,
    /// A payment notification has been received.
    NotificationReceived,
}

/// Options fixed when a deposit is created.
#[derive(Debug, Clone, Default)]
pub struct DepositOptions {
    pub session_id: Option<String>,
    /// Token already obtained by the web SDK for a temp-token card.
    pub session_token: Option<String>,
    /// Authorize and store the card without charging it.
    pub zero_auth: bool,
}

/// Identifiers a caller hands back to resume a deposit after a redirect.
/// Each flow reads only the ones it needs.
#[derive(Debug, Clone, Default)]
pub struct ResumeIds {
    pub init_tx_id: Option<String>,
    pub last_tx_id: Option<String>,
    pub redirect_tx_id: Option<String>,
    pub three_d_server_trans_id: Option<String>,
    pub order_id: Option<String>,
    pub client_request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositSummary {
    #[serde(flatten)]
    pub session: SessionSummary,
    pub zero_auth: bool,
    pub redirect_cause: Option<RedirectCause>,
    pub cvv2_reply: Option<String>,
    pub avs_code: Option<String>,
    pub three_d: ThreeDState,
}

pub struct DepositSession {
    session: Session,
    zero_auth: bool,
    order_id: Option<String>,
    init_tx_id: Option<String>,
    redirect_tx_id: Option<String>,
    redirect_url: Option<String>,
    cvv2_reply: Option<String>,
    avs_code: Option<String>,
    three_d: ThreeDState,
    three_d_description: Option<String>,
    challenge_result: Option<ChallengeResult>,
    notification: Option<PaymentNotification>,
}

impl DepositSession {
    pub fn new(
        config: Arc<GatewayConfig>,
        client: Arc<dyn GatewayClient>,
        method: PaymentMethodDescriptor,
        requested: PaymentAmount,
        options: DepositOptions,
    ) -> GatewayResult<Self> {
        let mut session = Session::new(
            PayType::Deposit,
            config,
            client,
            method,
            requested,
            options.session_id.as_deref(),
        )?;
        session.session_token = non_blank(options.session_token.as_deref()).map(str::to_string);

        Ok(Self {
            session,
            zero_auth: options.zero_auth,
            order_id: None,
            init_tx_id: None,
            redirect_tx_id: None,
            redirect_url: None,
            cvv2_reply: None,
            avs_code: None,
            three_d: ThreeDState::default(),
            three_d_description: None,
            challenge_result: None,
            notification: None,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        self.session.session_id()
    }

    pub fn status(&self) -> Status {
        self.session.status()
    }

    pub fn is_zero_auth(&self) -> bool {
        self.zero_auth
    }

    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn init_tx_id(&self) -> Option<&str> {
        self.init_tx_id.as_deref()
    }

    pub fn redirect_tx_id(&self) -> Option<&str> {
        self.redirect_tx_id.as_deref()
    }

    /// Where the customer's browser must go next, when redirected.
    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref()
    }

    pub fn cvv2_reply(&self) -> Option<&str> {
        self.cvv2_reply.as_deref()
    }

    pub fn avs_code(&self) -> Option<&str> {
        self.avs_code.as_deref()
    }

    pub fn three_d(&self) -> &ThreeDState {
        &self.three_d
    }

    pub fn three_d_description(&self) -> Option<&str> {
        self.three_d_description.as_deref()
    }

    pub fn challenge_result(&self) -> Option<&ChallengeResult> {
        self.challenge_result.as_ref()
    }

    pub fn notification(&self) -> Option<&PaymentNotification> {
        self.notification.as_ref()
    }

    pub fn summary(&self) -> DepositSummary {
        let mut session = self.session.summary();
        session.order_id = self.order_id.clone();
        session.redirect_url = self.redirect_url.clone();
        session.three_d_description = self.three_d_description.clone();

        DepositSummary {
            session,
            zero_auth: self.zero_auth,
            redirect_cause: self.redirect_cause(),
            cvv2_reply: self.cvv2_reply.clone(),
            avs_code: self.avs_code.clone(),
            three_d: self.three_d.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Readiness
    // -----------------------------------------------------------------------

    /// Temp-token cards need the session token the web SDK used.
    pub fn is_ready_for_temp_token(&self) -> bool {
        self.session.session_token.is_some() && self.session.method.is_ready_for_temp_token()
    }

    pub fn is_ready_for_apm(&self) -> bool {
        self.session.method.is_ready_for_apm()
    }

    pub fn is_ready_for_pay_in(&self) -> bool {
        let method = &self.session.method;
        self.is_ready_for_temp_token()
            || method.is_ready_for_saved_option(false)
            || method.is_ready_for_card()
            || method.is_ready_for_apm()
    }

    // -----------------------------------------------------------------------
    // Redirect predicates
    // -----------------------------------------------------------------------

    /// Waiting on the browser or the gateway, or resumed from either.
    pub fn is_redirected(&self) -> bool {
        if self.has_challenge_result(false) || self.has_notification(false) {
            return true;
        }

        let redirected = self.session.is_base_redirected();
        if self.is_ready_for_apm() {
            return redirected;
        }
        self.three_d.v2_supported && redirected
    }

    pub fn redirect_cause(&self) -> Option<RedirectCause> {
        if !self.is_redirected() {
            return None;
        }
        Some(if self.has_notification(false) {
            RedirectCause::NotificationReceived
        } else if self.has_challenge_result(false) {
            RedirectCause::ChallengeResultReceived
        } else if self.is_ready_for_apm() {
            RedirectCause::AwaitingNotification
        } else {
            RedirectCause::NativeChallenge
        })
    }

    /// A CRes has been stored; with `valid`, it also matches this deposit's
    /// 3DS server transaction.
    pub fn has_challenge_result(&self, valid: bool) -> bool {
        let Some(result) = &self.challenge_result else {
            return false;
        };
        self.three_d.v2_supported
            && (!valid || result.is_valid(self.three_d.server_trans_id.as_deref(), false))
    }

    /// A DMN has been stored; with `valid`, it also authenticates and
    /// correlates with this deposit.
    pub fn has_notification(&self, valid: bool) -> bool {
        let Some(notification) = &self.notification else {
            return false;
        };
        self.is_ready_for_apm() && (!valid || notification.is_valid(&self.notification_expectations()))
    }

    pub fn is_challenged(&self) -> bool {
        self.three_d.is_challenged(self.has_challenge_result(true))
    }

    /// Failed with a 3DS reason on record.
    pub fn is_three_d_failed(&self) -> bool {
        self.session.is_failed() && self.three_d.has_failure_reason()
    }

    /// Approved as an Auth or a Sale. An Auth3D approval still needs the
    /// final charge.
    pub fn is_charge_approved(&self) -> bool {
        self.session.is_approved()
            && self
                .session
                .tx_type
                .as_ref()
                .is_some_and(TransactionType::is_charge)
    }

    fn challenge_result_approved(&self) -> bool {
        self.challenge_result.as_ref().is_some_and(|result| {
            result.is_approved(
                self.three_d.server_trans_id.as_deref(),
                false,
                self.session.config.policy.accept_attempted_authentication,
            )
        })
    }

    fn notification_expectations(&self) -> NotificationExpectations<'_> {
        let method = &self.session.method;
        NotificationExpectations {
            method_name: method.apm_name(),
            session_id: Some(self.session.session_id()),
            order_id: self.order_id.as_deref(),
            client_request_id: self.session.client_request_id.as_deref(),
            user_token_id: Some(method.user_token_id()),
            payment_option_id: method
                .saved_option_id()
                .filter(|_| method.is_ready_for_saved_option(true)),
        }
    }

    // -----------------------------------------------------------------------
    // Redirect bookkeeping
    // -----------------------------------------------------------------------

    /// Restores the ids a redirected deposit was suspended with and marks
    /// it redirected unless it already reached an outcome.
    fn set_redirected(
        &mut self,
        order_id: Option<&str>,
        client_request_id: Option<&str>,
        redirect_tx_id: Option<&str>,
    ) -> Status {
        if self.session.is_failed() || !self.is_ready_for_pay_in() {
            return self.session.status();
        }

        let keep = MergePolicy::KeepIfAbsent;
        keep.apply(&mut self.order_id, order_id);
        keep.apply(&mut self.session.client_request_id, client_request_id);
        keep.apply(&mut self.redirect_tx_id, redirect_tx_id);
        keep.apply(&mut self.session.related_tx_id, redirect_tx_id);
        keep.apply(&mut self.session.last_tx_id, redirect_tx_id);

        if !self.session.is_approved() && !self.session.is_failed() {
            self.session.set_tx_status(TransactionStatus::Redirect);
            self.session.set_status(Status::Redirect);
        }
        self.session.status()
    }

    fn set_redirected_for_challenge(&mut self, ids: &ResumeIds) -> Status {
        if self.session.is_failed() || !self.is_ready_for_pay_in() {
            return self.session.status();
        }

        self.three_d
            .resume_challenge(ids.three_d_server_trans_id.as_deref());
        self.set_redirected(
            ids.order_id.as_deref(),
            ids.client_request_id.as_deref(),
            ids.redirect_tx_id.as_deref(),
        );

        if self.redirect_tx_id.is_none() {
            self.session.set_error("Missing RedirectTxID", Status::Error);
        } else if self.three_d.server_trans_id.is_none() {
            self.session
                .set_error("Missing ThreeD.ServerTransId", Status::Error);
        }
        self.session.status()
    }

    fn set_redirected_for_apm(&mut self, ids: &ResumeIds) -> Status {
        if self.session.is_failed() || !self.is_ready_for_apm() {
            return self.session.status();
        }

        self.set_redirected(
            ids.order_id.as_deref(),
            ids.client_request_id.as_deref(),
            None,
        );

        if self.order_id.is_none() {
            self.session.set_error("Missing OrderID", Status::Error);
        } else if self.session.client_request_id.is_none() {
            self.session.set_error("Missing ClientReqID", Status::Error);
        }
        self.session.status()
    }

    /// Applies a challenge result, the given one or the one already stored.
    fn apply_challenge_result(&mut self, result: Option<ChallengeResult>) -> Status {
        if !self.is_redirected() {
            return self.session.status();
        }
        let Some(result) = result.or_else(|| self.challenge_result.take()) else {
            return self.session.status();
        };

        MergePolicy::Overwrite.apply(&mut self.three_d.version, result.message_version.as_deref());
        let expected = self.three_d.server_trans_id.clone();
        let validation = result.validate(expected.as_deref(), false);
        let cancelled = result.is_cancelled(expected.as_deref(), false);
        self.challenge_result = Some(result);

        if let Err(reason) = validation {
            warn!(
                "Rejected challenge result for deposit {}: {}",
                self.session.session_id(),
                reason
            );
            self.session.set_error("3DSv2 ChallengeResult Error", Status::Error);
            self.session.note_reason(reason);
        } else if self.challenge_result_approved() {
            info!("Challenge approved for deposit {}", self.session.session_id());
            self.session.set_approved();
        } else if cancelled {
            self.session
                .set_error("Deposit cancelled by 3DSv2 ChallengeResult", Status::Declined);
        } else {
            self.session
                .set_error("Deposit declined by 3DSv2 ChallengeResult", Status::Declined);
        }
        self.session.status()
    }

    /// Applies a payment notification, the given one or the one already stored.
    fn apply_notification(&mut self, notification: Option<PaymentNotification>) -> Status {
        if !self.is_redirected() {
            return self.session.status();
        }
        let Some(notification) = notification.or_else(|| self.notification.take()) else {
            return self.session.status();
        };

        let outcome = notification.classify(&self.notification_expectations());
        if !matches!(outcome, NotificationOutcome::Invalid(_)) {
            MergePolicy::KeepIfAbsent
                .apply(&mut self.session.pay_tx_id, notification.transaction_id());
        }
        self.notification = Some(notification);

        debug!(
            "Notification for deposit {}: {:?}",
            self.session.session_id(),
            outcome
        );

        match outcome {
            NotificationOutcome::Invalid(reason) => {
                warn!(
                    "Rejected notification for deposit {}: {}",
                    self.session.session_id(),
                    reason
                );
                self.session
                    .set_error(format!("APM DMN Error: {}", reason), Status::Error);
            }
            NotificationOutcome::Approved { amount, .. } => {
                self.session.set_approved();
                if let Some(amount) = amount {
                    self.session.responded = Some(amount);
                }
            }
            NotificationOutcome::Declined {
                cancelled_by_user: true,
                comment,
            } => {
                self.session
                    .set_error(format!("Deposit cancelled by user: {}", comment), Status::Declined);
            }
            NotificationOutcome::Declined { comment, .. } => {
                self.session
                    .set_error(format!("Deposit declined by APM DMN: {}", comment), Status::Declined);
            }
            NotificationOutcome::Pending(comment) => {
                info!(
                    "Deposit {} still pending at the APM: {}",
                    self.session.session_id(),
                    comment
                );
            }
            NotificationOutcome::Error(comment) => {
                self.session
                    .set_error(format!("Deposit failed by APM DMN: {}", comment), Status::Error);
            }
        }
        self.session.status()
    }

    // -----------------------------------------------------------------------
    // Response helpers
    // -----------------------------------------------------------------------

    /// Folds the payment option echo into the method descriptor and the 3DS
    /// state, and picks up the browser redirect when there is one.
    fn absorb_payment_option(&mut self, echo: &PaymentOptionEcho) {
        let mut masked_card_number = None;
        let mut expiration = None;
        let mut bin = None;

        if let Some(card) = &echo.card {
            self.session.method.set_card_brand(card.card_brand.as_deref());
            MergePolicy::Overwrite.apply(&mut self.cvv2_reply, card.cvv2_reply.as_deref());
            MergePolicy::Overwrite.apply(&mut self.avs_code, card.avs_code.as_deref());
            masked_card_number =
                non_blank(card.cc_card_number.as_deref()).or(non_blank(card.last4_digits.as_deref()));
            bin = non_blank(card.bin.as_deref());
            if let (Some(year), Some(month)) = (
                non_blank(card.cc_exp_year.as_deref()),
                non_blank(card.cc_exp_month.as_deref()),
            ) {
                expiration = Some((year, month));
            }

            if let Some(three_d) = &card.three_d {
                self.three_d.absorb(three_d);
                if self.session.is_failed() {
                    if let Some(reason) = self.three_d.reason_text() {
                        self.session.note_reason(reason);
                    }
                }

                let native_redirect = self.session.tx_type == Some(TransactionType::Auth3D)
                    && self.session.tx_status() == Some(TransactionStatus::Redirect);
                if native_redirect {
                    let prefix = self.session.config.urls.acs_prefix_url.clone();
                    if let Some(url) = self.three_d.build_redirect_url(prefix.as_deref()) {
                        self.redirect_url = Some(url);
                        if !self.session.is_failed() {
                            self.session.set_status(Status::Redirect);
                        }
                    }
                }
            }
        }

        let expired = expiration.is_some_and(|(year, month)| is_card_expired(year, month, Utc::now()));
        if expired {
            debug!(
                "Echoed card expiry is in the past for deposit {}",
                self.session.session_id()
            );
            self.session.method.clear_expiration();
            expiration = None;
        }

        if let Some(option_id) = non_blank(echo.user_payment_option_id.as_deref()) {
            self.session.method.extend_saved_option(
                option_id,
                masked_card_number,
                expiration.map(|(year, _)| year),
                expiration.map(|(_, month)| month),
                bin,
            );
        }

        if self.session.tx_status() == Some(TransactionStatus::Redirect) {
            if let Some(url) = non_blank(echo.redirect_url.as_deref()) {
                self.redirect_url = Some(url.to_string());
                if !self.session.is_failed() {
                    self.session.set_status(Status::Redirect);
                }
            }
        }
    }

    fn describe_three_d(&mut self) {
        let description = self
            .three_d
            .describe(self.session.is_approved(), self.challenge_result_approved());
        MergePolicy::Overwrite.apply(&mut self.three_d_description, description.as_deref());
    }

    fn record_transaction(&mut self, transaction_id: Option<&str>, transaction_type: Option<&str>) {
        MergePolicy::Overwrite.apply(&mut self.session.last_tx_id, transaction_id);
        if let Some(tx_type) = transaction_type.and_then(TransactionType::from_vendor) {
            self.session.tx_type = Some(tx_type);
        }
    }

    fn payment_option_payload(&self, for_charge: bool) -> PaymentOptionPayload {
        let method = &self.session.method;
        let card = method.card();
        let submethod = || {
            method.apm_submethod().map(|submethod| SubMethod {
                submethod: submethod.to_string(),
            })
        };

        match method.pay_in_method() {
            Some(PayBy::SavedOption) => PaymentOptionPayload {
                user_payment_option_id: method.saved_option_id().map(str::to_string),
                card: Some(CardPayload {
                    cvv: method.saved_option_cvv().map(str::to_string),
                    expiration_year: card.expiration_year.clone(),
                    expiration_month: card.expiration_month.clone(),
                    ..CardPayload::default()
                }),
                submethod: if for_charge { submethod() } else { None },
                ..PaymentOptionPayload::default()
            },
            Some(PayBy::Card) => PaymentOptionPayload {
                card: Some(CardPayload {
                    card_holder_name: card.holder_name.clone(),
                    card_number: card.card_number.clone(),
                    expiration_year: card.expiration_year.clone(),
                    expiration_month: card.expiration_month.clone(),
                    cvv: card.cvv.clone(),
                    ..CardPayload::default()
                }),
                ..PaymentOptionPayload::default()
            },
            Some(PayBy::Apm) if for_charge => match method.saved_option_id() {
                Some(option_id) => PaymentOptionPayload {
                    user_payment_option_id: Some(option_id.to_string()),
                    submethod: submethod(),
                    ..PaymentOptionPayload::default()
                },
                None => PaymentOptionPayload {
                    alternative_payment_method: method.apm().map(|apm| apm.fields().clone()),
                    submethod: submethod(),
                    ..PaymentOptionPayload::default()
                },
            },
            _ => PaymentOptionPayload {
                card: Some(CardPayload {
                    card_holder_name: card.holder_name.clone(),
                    cc_temp_token: card.temp_token.clone(),
                    cvv: card.cvv.clone(),
                    ..CardPayload::default()
                }),
                ..PaymentOptionPayload::default()
            },
        }
    }

    fn three_d_payload(&self) -> ThreeDPayload {
        let config = &self.session.config;
        let session_id = self.session.session_id();
        ThreeDPayload {
            version: self
                .three_d
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_THREE_D_VERSION.to_string()),
            method_completion_ind: "U".to_string(),
            platform_type: "02".to_string(),
            merchant_url: config.urls.merchant_url.clone(),
            notification_url: config.urls.challenge_url(session_id),
            browser_details: BrowserDetails {
                accept_header: "text/html,application/xhtml+xml".to_string(),
                ip: self.session.device().ip_address,
                java_enabled: "TRUE".to_string(),
                java_script_enabled: "TRUE".to_string(),
                language: "EN".to_string(),
                color_depth: "48".to_string(),
                screen_height: "400".to_string(),
                screen_width: "600".to_string(),
                time_zone: "0".to_string(),
                user_agent: "Mozilla/5.0 (Windows NT 6.1; Win64; x64; rv:47)".to_string(),
            },
            v2_additional_params: V2AdditionalParams {
                challenge_window_size: "05".to_string(),
                challenge_preference: self
                    .session
                    .method
                    .challenge_preference()
                    .as_vendor()
                    .map(str::to_string),
                exception_payment_3d_auth: self.zero_auth.then_some(true),
            },
        }
    }

    /// Callback URLs without the notification URL, which only APM charges carry.
    fn browser_url_details(&self) -> UrlDetails {
        UrlDetails {
            notification_url: None,
            ..self.session.url_details().clone()
        }
    }

    fn apply_partial_approval(&mut self, partial: Option<&PartialApproval>) {
        let Some(partial) = partial else {
            return;
        };
        if let (Some(currency), Some(amount)) = (
            non_blank(partial.processed_currency.as_deref()),
            non_blank(partial.processed_amount.as_deref()),
        ) {
            match PaymentAmount::parse(currency, amount) {
                Ok(processed) => self.session.responded = Some(processed),
                Err(e) => warn!(
                    "Unreadable partial approval for deposit {}: {}",
                    self.session.session_id(),
                    e
                ),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Gateway requests
    // -----------------------------------------------------------------------

    async fn request_open_order(&mut self) -> Status {
        let Some(session_token) = self.session.session_token.clone() else {
            return self.session.set_error("Missing SessionToken", Status::Error);
        };

        let requested = self.session.requested().clone();
        let request = OpenOrderRequest {
            session_token,
            currency: requested.currency().to_string(),
            amount: requested.formatted_amount(),
            user_token_id: self.session.method.user_token_id().to_string(),
            client_unique_id: self.session.session_id().to_string(),
            client_request_id: self.session.idempotency_key(),
            is_partial_approval: "0".to_string(),
            billing_address: self.session.billing_address(),
            url_details: self.session.url_details().clone(),
        };

        info!(
            "Opening order: session={} amount={}",
            self.session.session_id(),
            requested
        );

        match self.session.client.open_order(request).await {
            Ok(response) => {
                MergePolicy::Overwrite.apply(&mut self.order_id, response.order_id.as_deref());
                self.session.parse_envelope(&response.envelope, false);
            }
            Err(e) => {
                self.session.fail_transport("OrderPayInReq", &e);
            }
        }
        self.session.status()
    }

    async fn request_init_payment(&mut self) -> Status {
        if !self.is_ready_for_pay_in() {
            return self
                .session
                .set_error("Deposit not ready for InitPayIn", Status::Error);
        }
        let Some(session_token) = self.session.session_token.clone() else {
            return self.session.set_error("Missing SessionToken", Status::Error);
        };

        let requested = self.session.requested().clone();
        let request = InitPaymentRequest {
            session_token,
            currency: requested.currency().to_string(),
            amount: if self.zero_auth {
                ZERO_AMOUNT.to_string()
            } else {
                requested.formatted_amount()
            },
            payment_option: self.payment_option_payload(false),
            user_token_id: self.session.method.user_token_id().to_string(),
            client_unique_id: self.session.session_id().to_string(),
            client_request_id: self.session.idempotency_key(),
            device_details: self.session.device(),
            billing_address: self.session.billing_address(),
            url_details: self.browser_url_details(),
            transaction_type: self.zero_auth.then(|| "Auth".to_string()),
        };

        info!(
            "Initializing payment: session={} amount={} zero_auth={}",
            self.session.session_id(),
            requested,
            self.zero_auth
        );

        match self.session.client.init_payment(request).await {
            Ok(response) => {
                MergePolicy::Overwrite.apply(&mut self.order_id, response.order_id.as_deref());
                self.record_transaction(
                    response.transaction_id.as_deref(),
                    response.transaction_type.as_deref(),
                );
                MergePolicy::Overwrite
                    .apply(&mut self.init_tx_id, response.transaction_id.as_deref());
                self.session.parse_envelope(&response.envelope, false);
                self.session.parse_transaction_status(&response.outcome);
                if let Some(option) = &response.payment_option {
                    self.absorb_payment_option(option);
                }
                if self.session.is_successful() {
                    self.session.related_tx_id = self.session.last_tx_id.clone();
                }
            }
            Err(e) => {
                self.session.fail_transport("InitPayInReq", &e);
            }
        }
        self.session.status()
    }

    /// The charge. With `three_d`, card charges carry the 3DS browser fields.
    async fn request_payment(&mut self, three_d: bool) -> Status {
        if !self.is_ready_for_pay_in() {
            return self
                .session
                .set_error("Deposit not ready for PayIn", Status::Error);
        }
        let Some(session_token) = self.session.session_token.clone() else {
            return self.session.set_error("Missing SessionToken", Status::Error);
        };
        if self.session.related_tx_id.is_none()
            && !self.is_ready_for_temp_token()
            && !self.is_ready_for_apm()
        {
            return self.session.set_error(
                "Missing RelTxID or Session not ready for PayInByTempToken",
                Status::Error,
            );
        }

        let is_apm = self.session.method.pay_in_method() == Some(PayBy::Apm);
        let mut payment_option = self.payment_option_payload(true);
        if three_d {
            let payload = self.three_d_payload();
            if let Some(card) = payment_option.card.as_mut() {
                card.three_d = Some(payload);
            }
        }

        let zero_auth = self.zero_auth && !self.has_challenge_result(true);
        let requested = self.session.requested().clone();
        let mut url_details = self.browser_url_details();
        if is_apm {
            url_details.notification_url = self.session.url_details().notification_url.clone();
        }

        let request = PaymentRequest {
            session_token,
            currency: requested.currency().to_string(),
            amount: if zero_auth {
                ZERO_AMOUNT.to_string()
            } else {
                requested.formatted_amount()
            },
            payment_option,
            related_transaction_id: self.session.related_tx_id.clone(),
            transaction_type: zero_auth.then(|| "Auth".to_string()),
            authentication_only_type: zero_auth.then(|| "ADDCARD".to_string()),
            is_partial_approval: "0".to_string(),
            user_token_id: self.session.method.user_token_id().to_string(),
            client_unique_id: self.session.session_id().to_string(),
            client_request_id: self.session.idempotency_key(),
            product_id: self.session.session_id().to_string(),
            device_details: self.session.device(),
            billing_address: self.session.billing_address(),
            user_details: self.session.user_details(),
            url_details,
        };

        info!(
            "Charging deposit: session={} amount={} three_d={} zero_auth={}",
            self.session.session_id(),
            requested,
            three_d,
            zero_auth
        );

        match self.session.client.payment(request).await {
            Ok(response) => {
                MergePolicy::Overwrite.apply(&mut self.order_id, response.order_id.as_deref());
                self.record_transaction(
                    response.transaction_id.as_deref(),
                    response.transaction_type.as_deref(),
                );
                self.session
                    .parse_response(&response.envelope, &response.outcome, false);
                if let Some(option) = &response.payment_option {
                    self.absorb_payment_option(option);
                }
                if let Some(decision) = response
                    .fraud_details
                    .as_ref()
                    .and_then(|details| details.final_decision.as_deref())
                    .and_then(FraudDecision::from_vendor)
                {
                    self.session.final_decision = Some(decision);
                }

                let accepted = self.session.tx_type.as_ref().is_some_and(TransactionType::is_charge)
                    && self.session.tx_status() == Some(TransactionStatus::Approved)
                    && self.session.final_decision == Some(FraudDecision::Accept);
                if accepted {
                    self.session.pay_tx_id = response.transaction_id.clone();
                    self.session.set_approved();
                    self.apply_partial_approval(response.partial_approval.as_ref());
                    self.describe_three_d();
                }

                if self.session.is_successful() {
                    MergePolicy::Overwrite.apply(
                        &mut self.session.related_tx_id,
                        response.transaction_id.as_deref(),
                    );
                    self.apply_partial_approval(response.partial_approval.as_ref());
                } else if self.session.is_declined() {
                    MergePolicy::Overwrite
                        .apply(&mut self.session.pay_tx_id, response.transaction_id.as_deref());
                }

                if self.is_redirected() {
                    MergePolicy::KeepIfAbsent
                        .apply(&mut self.redirect_tx_id, response.transaction_id.as_deref());
                }
            }
            Err(e) => {
                self.session.fail_transport("PayInReq", &e);
            }
        }
        self.session.status()
    }

    async fn request_payment_status(&mut self) -> Status {
        if !self.is_ready_for_pay_in() {
            return self
                .session
                .set_error("Deposit not ready for PayInStatus", Status::Error);
        }
        let Some(session_token) = self.session.session_token.clone() else {
            return self.session.set_error("Missing SessionToken", Status::Error);
        };

        let request = PaymentStatusRequest {
            session_token,
            client_request_id: self.session.idempotency_key(),
        };

        info!("Checking payment status: session={}", self.session.session_id());

        match self.session.client.payment_status(request).await {
            Ok(response) => {
                self.record_transaction(
                    response.transaction_id.as_deref(),
                    response.transaction_type.as_deref(),
                );
                let ignore_expired = self.has_notification(false) || self.has_challenge_result(false);
                self.session
                    .parse_response(&response.envelope, &response.outcome, ignore_expired);
                if let Some(option) = &response.payment_option {
                    self.absorb_payment_option(option);
                }

                let approved = self.session.tx_type.as_ref().is_some_and(TransactionType::is_charge)
                    && self.session.tx_status() == Some(TransactionStatus::Approved);
                if approved {
                    self.session.set_approved();
                    if let (Some(currency), Some(amount)) = (
                        non_blank(response.currency.as_deref()),
                        non_blank(response.amount.as_deref()),
                    ) {
                        match PaymentAmount::parse(currency, amount) {
                            Ok(paid) => self.session.responded = Some(paid),
                            Err(e) => warn!(
                                "Unreadable paid amount for deposit {}: {}",
                                self.session.session_id(),
                                e
                            ),
                        }
                    }
                    MergePolicy::KeepIfAbsent
                        .apply(&mut self.session.pay_tx_id, response.transaction_id.as_deref());
                    self.describe_three_d();
                }
            }
            Err(e) => {
                if self.session.is_approved() {
                    warn!(
                        "Status check failed for approved deposit {}: {}",
                        self.session.session_id(),
                        e
                    );
                } else {
                    self.session.fail_transport("PayInStatusReq", &e);
                }
            }
        }
        self.session.status()
    }

    async fn request_refund(&mut self) -> Status {
        let Some(session_token) = self.session.session_token.clone() else {
            return self.session.set_error("Missing SessionToken", Status::Error);
        };

        let amount = self.session.responded_or_requested().clone();
        let related = self.session.related_tx_id.clone();
        let option_ref = self
            .session
            .method
            .saved_option_id()
            .map(|id| UserPaymentOptionRef {
                user_payment_option_id: id.to_string(),
            });
        let request = RefundRequest {
            session_token,
            currency: amount.currency().to_string(),
            amount: amount.formatted_amount(),
            related_transaction_id: related.clone().unwrap_or_default(),
            client_unique_id: self.session.session_id().to_string(),
            client_request_id: self.session.idempotency_key(),
            user_token_id: related
                .is_none()
                .then(|| self.session.method.user_token_id().to_string()),
            payment_option: if related.is_none() { option_ref } else { None },
        };

        info!(
            "Refunding deposit: session={} related={} amount={}",
            self.session.session_id(),
            related.as_deref().unwrap_or("-"),
            amount
        );

        match self.session.client.refund_transaction(request).await {
            Ok(response) => {
                MergePolicy::Overwrite
                    .apply(&mut self.session.void_tx_id, response.transaction_id.as_deref());
                MergePolicy::Overwrite
                    .apply(&mut self.session.last_tx_id, response.transaction_id.as_deref());
                self.session
                    .parse_response(&response.envelope, &response.outcome, false);
                if self.session.is_successful() {
                    self.session
                        .set_error(format!("Refunded {}", amount), Status::Voided);
                    info!(
                        "Deposit refunded: session={} amount={}",
                        self.session.session_id(),
                        amount
                    );
                }
            }
            Err(e) => {
                self.session.fail_transport("RefundPayInReq", &e);
            }
        }
        self.session.status()
    }

    // -----------------------------------------------------------------------
    // Flows
    // -----------------------------------------------------------------------

    /// Gets a session token and, unless zero-auth, opens the order.
    pub async fn prepare(&mut self) -> Status {
        self.session.request_session_token().await;
        if !self.session.is_successful() {
            return self.session.set_error("SessionTokenReq failed", Status::Error);
        }

        if !self.zero_auth {
            self.request_open_order().await;
            if !self.session.is_successful() {
                return self.session.set_error("OrderPayInReq failed", Status::Error);
            }
        }
        self.session.status()
    }

    /// Starts a card deposit: init, then the 3DS charge. Frictionless
    /// approvals are confirmed straight away; challenges leave the deposit
    /// redirected.
    pub async fn start(&mut self, resume: &ResumeIds) -> Status {
        if let Some(init_tx_id) = non_blank(resume.init_tx_id.as_deref()) {
            self.init_tx_id = Some(init_tx_id.to_string());
            self.session.related_tx_id = Some(init_tx_id.to_string());
            self.session.last_tx_id = Some(init_tx_id.to_string());
        }
        MergePolicy::Overwrite.apply(&mut self.session.last_tx_id, resume.last_tx_id.as_deref());
        MergePolicy::Overwrite.apply(
            &mut self.three_d.server_trans_id,
            resume.three_d_server_trans_id.as_deref(),
        );

        info!(
            "Starting deposit: session={} amount={}",
            self.session.session_id(),
            self.session.requested()
        );

        self.run_start().await;

        if !self.session.is_error() {
            if !self.zero_auth && !self.is_redirected() {
                self.confirm(None, &ResumeIds::default()).await;
            }
        } else if self.session.is_exception() {
            self.check(&ResumeIds::default()).await;
            if !self.is_charge_approved() {
                self.session.set_error("PayInStatusReq failed", Status::Error);
            }
        }
        self.session.status()
    }

    async fn run_start(&mut self) {
        if !self.is_ready_for_pay_in() || self.is_ready_for_apm() {
            self.session
                .set_error("Deposit not ready for PayIn", Status::Error);
            return;
        }

        if !self.is_ready_for_temp_token() {
            self.session.request_session_token().await;
            if !self.session.is_successful() {
                self.session.set_error("SessionTokenReq failed", Status::Error);
                return;
            }
        }

        self.request_init_payment().await;
        if !self.session.is_successful() {
            self.session.set_error("InitPayInReq failed", Status::Error);
            return;
        }

        let staging = self.session.config.merchant.is_staging();
        let three_d = !self.zero_auth && (self.three_d.v2_supported || staging);
        self.request_payment(three_d).await;

        let bypass = three_d
            && staging
            && self.session.config.policy.allow_staging_3ds_bypass
            && self.is_ignorable_three_d_error();
        if bypass {
            warn!(
                "Treating sandbox 3DS error as approved for deposit {}",
                self.session.session_id()
            );
            self.session.related_tx_id = self.session.last_tx_id.clone();
            self.session.set_status(Status::Approved);
            self.session.clear_errors();
            self.three_d.clear_reason();
        }

        if !self.session.is_successful() {
            let reason = if self.zero_auth {
                "PayInReq Zero Auth failed"
            } else {
                "PayInReq ThreeD failed"
            };
            self.session.set_error(reason, Status::Error);
        } else if self.is_redirected() {
            self.check_pre_approval();
        }
    }

    fn is_ignorable_three_d_error(&self) -> bool {
        self.session.status() == Status::Error
            && self.session.tx_type == Some(TransactionType::Auth3D)
            && IGNORABLE_THREE_D_ERRORS
                .iter()
                .any(|needle| self.session.reason_contains(needle))
    }

    fn check_pre_approval(&mut self) {
        let partial = self
            .session
            .responded()
            .filter(|responded| *responded != self.session.requested())
            .cloned();
        if let Some(responded) = partial {
            self.session
                .set_error(format!("Pre-approved only {}", responded), Status::Error);
        }
    }

    /// Starts an APM deposit. The customer is redirected to the provider.
    pub async fn start_by_apm(&mut self) -> Status {
        if !self.is_ready_for_apm() {
            return self
                .session
                .set_error("Deposit not ready for PayIn by APM", Status::Error);
        }

        info!(
            "Starting APM deposit: session={} method={} amount={}",
            self.session.session_id(),
            self.session.method.apm_name().unwrap_or("-"),
            self.session.requested()
        );

        self.session.request_session_token().await;
        if !self.session.is_successful() {
            return self.session.set_error("SessionTokenReq failed", Status::Error);
        }

        self.request_payment(false).await;
        if !self.session.is_successful() {
            return self
                .session
                .set_error("PayInReq by APM failed", Status::Error);
        }
        if self.is_redirected() {
            self.check_pre_approval();
        }
        self.session.status()
    }

    /// Finishes a card deposit, optionally with the challenge result the
    /// browser posted back. Charges if needed, reconciles with a status
    /// check, and reverses a partial approval when policy says so.
    pub async fn confirm(&mut self, challenge_result: Option<ChallengeResult>, ids: &ResumeIds) -> Status {
        if self.run_confirm(challenge_result, ids).await {
            return self.session.status();
        }

        if self.session.is_exception() {
            self.check(&ResumeIds::default()).await;
            if !self.is_charge_approved() {
                self.session.set_error("PayInStatusReq failed", Status::Error);
            }
        }
        self.session.status()
    }

    /// Returns true when a partial approval was reversed, which ends the flow.
    async fn run_confirm(&mut self, challenge_result: Option<ChallengeResult>, ids: &ResumeIds) -> bool {
        if !self.is_ready_for_pay_in() {
            self.session
                .set_error("Deposit not ready for PayIn", Status::Error);
            return false;
        }

        if challenge_result.is_some() {
            self.set_redirected_for_challenge(ids);
        }
        if self.is_redirected() {
            self.apply_challenge_result(challenge_result);
        }

        let has_challenge_result = self.has_challenge_result(false);
        if !self.session.is_failed() && (!self.is_charge_approved() || has_challenge_result) {
            self.session.request_session_token().await;
            if !self.session.is_successful() {
                self.session.set_error("SessionTokenReq failed", Status::Error);
                return false;
            }

            self.request_payment(false).await;
            if !self.is_charge_approved() {
                self.session.set_error("PayInReq failed", Status::Error);
                return false;
            }
        }

        if !self.session.is_failed() || self.has_challenge_result(false) {
            self.check(&ResumeIds::default()).await;
            if !self.is_charge_approved() {
                self.session.set_error("PayInStatusReq failed", Status::Error);
                return false;
            }
        }

        let partial = !self.zero_auth
            && self.session.config.policy.reverse_partial_approval
            && self.session.is_approved()
            && !self.session.is_fully_approved();
        if partial {
            warn!(
                "Reversing partial approval for deposit {}: {} of {}",
                self.session.session_id(),
                self.session.responded_or_requested(),
                self.session.requested()
            );
            if self.session.tx_type == Some(TransactionType::Sale) {
                self.refund(None).await;
            } else {
                self.void(None).await;
            }
            return true;
        }
        false
    }

    /// Finishes an APM deposit with the gateway's payment notification.
    pub async fn confirm_by_apm(&mut self, notification: Option<PaymentNotification>, ids: &ResumeIds) -> Status {
        if !self.is_ready_for_apm() {
            return self
                .session
                .set_error("Deposit not ready for PayIn by APM", Status::Error);
        }

        self.set_redirected_for_apm(ids);
        if self.is_redirected() {
            self.apply_notification(notification);
        }

        if !self.session.is_failed() || self.has_notification(false) {
            self.check(&ResumeIds::default()).await;
            if !self.session.is_sale_approved() {
                self.session.set_error("PayInStatusReq failed", Status::Error);
            }
        }

        if self.session.is_exception() {
            self.check(&ResumeIds::default()).await;
            if !self.session.is_sale_approved() {
                self.session.set_error("PayInStatusReq failed", Status::Error);
            }
        }
        self.session.status()
    }

    /// Asks the gateway where the deposit stands.
    pub async fn check(&mut self, ids: &ResumeIds) -> Status {
        if !self.is_ready_for_pay_in() {
            return self
                .session
                .set_error("Deposit not ready for PayIn", Status::Error);
        }

        self.set_redirected(
            ids.order_id.as_deref(),
            ids.client_request_id.as_deref(),
            ids.redirect_tx_id.as_deref(),
        );

        if self.session.is_exception() || !self.session.is_failed() {
            self.request_payment_status().await;
            if !self.session.is_approved() {
                self.session.set_error("PayInStatusReq failed", Status::Error);
            }
        }
        self.session.status()
    }

    fn prepare_reversal(&mut self, related_tx_id: Option<&str>) {
        MergePolicy::Overwrite.apply(&mut self.session.related_tx_id, related_tx_id);
        if self.session.related_tx_id.is_some() {
            self.session.pay_tx_id = self.session.related_tx_id.clone();
        }
        if self.session.responded.is_none() {
            self.session.responded = Some(self.session.requested().clone());
        }
    }

    /// Voids the deposit's charge, or `related_tx_id` when given.
    pub async fn void(&mut self, related_tx_id: Option<&str>) -> Status {
        self.prepare_reversal(related_tx_id);

        if !self.is_ready_for_pay_in() {
            return self
                .session
                .set_error("Deposit not ready for PayIn", Status::Error);
        }
        if self.session.related_tx_id.is_none() {
            return self
                .session
                .set_error("Missing RelTransactionID", Status::Error);
        }

        self.session.request_session_token().await;
        if !self.session.is_successful() {
            return self.session.set_error("SessionTokenReq failed", Status::Error);
        }

        self.session.request_void().await;
        if !self.session.is_voided() {
            self.session.set_error("VoidPayInReq failed", Status::Error);
        }
        self.session.status()
    }

    /// Refunds a settled sale, by related transaction or by saved option.
    pub async fn refund(&mut self, related_tx_id: Option<&str>) -> Status {
        self.prepare_reversal(related_tx_id);

        if !self.is_ready_for_pay_in() {
            return self
                .session
                .set_error("Deposit not ready for PayIn", Status::Error);
        }
        if self.session.related_tx_id.is_none() && !self.session.method.is_ready_for_saved_option(true) {
            return self
                .session
                .set_error("Deposit not ready for Refund", Status::Error);
        }
        if self.session.tx_type != Some(TransactionType::Sale) {
            return self
                .session
                .set_error("Deposit not Sale type", Status::Error);
        }

        self.session.request_session_token().await;
        if !self.session.is_successful() {
            return self.session.set_error("SessionTokenReq failed", Status::Error);
        }

        self.request_refund().await;
        if !self.session.is_voided() {
            self.session.set_error("RefundPayInReq failed", Status::Error);
        }
        self.session.status()
    }
}

/// Card expiry as echoed (`yy`/`yyyy` and `MM`) compared against `now`.
/// Unreadable values count as expired.
fn is_card_expired(year: &str, month: &str, now: DateTime<Utc>) -> bool {
    let (Ok(year), Ok(month)) = (year.trim().parse::<i32>(), month.trim().parse::<u32>()) else {
        return true;
    };
    if !(1..=12).contains(&month) {
        return true;
    }

    let year = year % 100;
    let current_year = now.year() % 100;
    year < current_year || (year == current_year && month < now.month())
}
