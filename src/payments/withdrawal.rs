//! Withdrawal (payout) to a saved payment option
//!
//! A payout is a single request followed by a status check. Payouts are
//! looked up by the client request id they were sent with, so that id is
//! recorded before the request goes out.

use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::payments::amount::PaymentAmount;
use crate::payments::merge::{non_blank, MergePolicy};
use crate::payments::method::PaymentMethodDescriptor;
use crate::payments::session::{Session, SessionSummary};
use crate::payments::status::{PayType, Status, TransactionStatus};
use crate::payments::traits::GatewayClient;
use crate::payments::types::{PayoutRequest, PayoutStatusRequest, UserPaymentOptionRef};
use std::sync::Arc;
use tracing::{info, warn};

const CFT_UNSUPPORTED: &str = "country does not support the cft program";
const FILTER_ERROR_CODE: i64 = -1100;

pub struct WithdrawalSession {
    session: Session,
}

impl WithdrawalSession {
    pub fn new(
        config: Arc<GatewayConfig>,
        client: Arc<dyn GatewayClient>,
        method: PaymentMethodDescriptor,
        requested: PaymentAmount,
        session_id: Option<&str>,
    ) -> GatewayResult<Self> {
        let session = Session::new(
            PayType::Withdrawal,
            config,
            client,
            method,
            requested,
            session_id,
        )?;
        Ok(Self { session })
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

    pub fn summary(&self) -> SessionSummary {
        self.session.summary()
    }

    /// Payouts go to a saved option only; no CVV is needed.
    pub fn is_ready_for_payout(&self) -> bool {
        self.session.method.is_ready_for_saved_option(true)
    }

    /// Destination countries outside the card-funds-transfer program are a
    /// decline, not a system error.
    fn is_cft_unsupported(&self) -> bool {
        let mentions = |reason: Option<&str>| {
            reason.is_some_and(|r| r.to_ascii_lowercase().contains(CFT_UNSUPPORTED))
        };
        (self.session.gw_err_code == Some(FILTER_ERROR_CODE)
            && mentions(self.session.gw_err_reason.as_deref()))
            || mentions(self.session.pay_method_err_reason())
    }

    async fn request_payout(&mut self) -> Status {
        if !self.is_ready_for_payout() {
            return self
                .session
                .set_error("Withdrawal not ready for PayOut", Status::Error);
        }
        let Some(session_token) = self.session.session_token.clone() else {
            return self.session.set_error("Missing SessionToken", Status::Error);
        };
        let Some(option_id) = self.session.method.saved_option_id().map(str::to_string) else {
            return self
                .session
                .set_error("Withdrawal not ready for PayOut", Status::Error);
        };

        let client_request_id = self.session.idempotency_key();
        self.session.client_request_id = Some(client_request_id.clone());
        let requested = self.session.requested().clone();
        let request = PayoutRequest {
            session_token,
            user_token_id: self.session.method.user_token_id().to_string(),
            client_unique_id: self.session.session_id().to_string(),
            client_request_id,
            amount: requested.formatted_amount(),
            currency: requested.currency().to_string(),
            user_payment_option: UserPaymentOptionRef {
                user_payment_option_id: option_id.clone(),
            },
            device_details: self.session.device(),
        };

        info!(
            "Requesting payout: session={} option={} amount={}",
            self.session.session_id(),
            option_id,
            requested
        );

        match self.session.client.payout(request).await {
            Ok(response) => {
                MergePolicy::Overwrite.apply(&mut self.session.pay_tx_id, response.transaction_id.as_deref());
                MergePolicy::Overwrite.apply(&mut self.session.last_tx_id, response.transaction_id.as_deref());
                self.session
                    .parse_response(&response.envelope, &response.outcome, false);

                if self.session.is_successful() {
                    self.session.responded = Some(requested);
                    self.session.set_approved();
                } else if self.session.is_error() && self.is_cft_unsupported() {
                    self.session.set_error("PayOutReq failed", Status::Declined);
                }
            }
            Err(e) => {
                self.session.fail_transport("PayOutReq", &e);
            }
        }
        self.session.status()
    }

    async fn request_payout_status(&mut self) -> Status {
        let Some(client_request_id) = self.session.client_request_id.clone() else {
            return self.session.set_error("Missing ClientReqID", Status::Error);
        };

        info!(
            "Checking payout status: session={} client_request_id={}",
            self.session.session_id(),
            client_request_id
        );

        match self
            .session
            .client
            .payout_status(PayoutStatusRequest { client_request_id })
            .await
        {
            Ok(response) => {
                MergePolicy::Overwrite.apply(&mut self.session.last_tx_id, response.transaction_id.as_deref());
                MergePolicy::KeepIfAbsent
                    .apply(&mut self.session.pay_tx_id, response.transaction_id.as_deref());
                self.session
                    .parse_response(&response.envelope, &response.outcome, false);

                if self.session.tx_status() == Some(TransactionStatus::Approved) {
                    self.session.set_approved();
                    if let (Some(currency), Some(amount)) = (
                        non_blank(response.currency.as_deref()),
                        non_blank(response.amount.as_deref()),
                    ) {
                        match PaymentAmount::parse(currency, amount) {
                            Ok(paid) => self.session.responded = Some(paid),
                            Err(e) => warn!(
                                "Unreadable payout amount for withdrawal {}: {}",
                                self.session.session_id(),
                                e
                            ),
                        }
                    }
                }
            }
            Err(e) => {
                if !self.session.is_approved() {
                    self.session.fail_transport("PayOutStatusReq", &e);
                }
            }
        }
        self.session.status()
    }

    /// Pays out the requested amount and confirms it with a status check.
    pub async fn withdraw(&mut self) -> Status {
        if !self.is_ready_for_payout() {
            return self
                .session
                .set_error("Withdrawal not ready for PayOut", Status::Error);
        }

        info!(
            "Starting withdrawal: session={} amount={}",
            self.session.session_id(),
            self.session.requested()
        );

        self.session.request_session_token().await;
        if !self.session.is_successful() {
            return self.session.set_error("SessionTokenReq failed", Status::Error);
        }

        self.request_payout().await;
        if !self.session.is_approved() {
            self.session.set_error("PayOutReq failed", Status::Error);
        }

        // A lost payout response is reconciled once by its client request id.
        if !self.session.is_failed() || self.session.is_exception() {
            self.check(None).await;
        }
        self.session.status()
    }

    /// Looks the payout up, by `client_request_id` when given.
    pub async fn check(&mut self, client_request_id: Option<&str>) -> Status {
        if !self.is_ready_for_payout() {
            return self
                .session
                .set_error("Withdrawal not ready for PayOut", Status::Error);
        }

        MergePolicy::Overwrite.apply(&mut self.session.client_request_id, client_request_id);
        if self.session.client_request_id.is_none() {
            return self.session.set_error("Missing ClientReqID", Status::Error);
        }

        if !self.session.is_failed() || self.session.is_exception() {
            self.request_payout_status().await;
            if !self.session.is_approved() {
                self.session
                    .set_error("PayOutStatusReq failed", Status::Error);
            }
        }
        self.session.status()
    }
}
