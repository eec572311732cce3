//! Gateway client trait definition
//!
//! Defines the remote operations a payment session drives. Each method is a
//! single attempt: a transport failure is returned as an error and the
//! session decides how to reconcile it.

use crate::error::GatewayResult;
use crate::payments::types::{
    DeletePaymentOptionRequest, DeletePaymentOptionResponse, InitPaymentRequest,
    InitPaymentResponse, OpenOrderRequest, OpenOrderResponse, PaymentRequest, PaymentResponse,
    PaymentStatusRequest, PaymentStatusResponse, PayoutRequest, PayoutStatusRequest,
    PayoutStatusResponse, RefundRequest, SessionTokenRequest, SessionTokenResponse,
    TransactionResponse, VoidRequest,
};
use async_trait::async_trait;

/// Trait for card/APM gateway clients
///
/// Implementations own transport, merchant authentication and request
/// signing. Sessions only ever see the typed requests and responses.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Obtain a short-lived session token
    ///
    /// Every other deposit or payout call must carry a token obtained here.
    async fn get_session_token(
        &self,
        request: SessionTokenRequest,
    ) -> GatewayResult<SessionTokenResponse>;

    /// Open an order for the requested amount
    async fn open_order(&self, request: OpenOrderRequest) -> GatewayResult<OpenOrderResponse>;

    /// Initialise a card payment
    ///
    /// Returns the 3DS capabilities of the card and the transaction id the
    /// charge must relate to.
    async fn init_payment(&self, request: InitPaymentRequest)
        -> GatewayResult<InitPaymentResponse>;

    /// Execute a charge
    ///
    /// # Returns
    /// * `PaymentResponse` - Transaction status, payment-option echo (including
    ///   3DS challenge parameters), fraud decision and partial approval data
    async fn payment(&self, request: PaymentRequest) -> GatewayResult<PaymentResponse>;

    /// Fetch the authoritative status of the session's last payment
    async fn payment_status(
        &self,
        request: PaymentStatusRequest,
    ) -> GatewayResult<PaymentStatusResponse>;

    /// Refund a settled sale
    async fn refund_transaction(&self, request: RefundRequest)
        -> GatewayResult<TransactionResponse>;

    /// Void an authorisation or unsettled charge
    async fn void_transaction(&self, request: VoidRequest) -> GatewayResult<TransactionResponse>;

    /// Pay out to a saved payment option
    async fn payout(&self, request: PayoutRequest) -> GatewayResult<TransactionResponse>;

    /// Fetch the status of a payout by its client request id
    async fn payout_status(
        &self,
        request: PayoutStatusRequest,
    ) -> GatewayResult<PayoutStatusResponse>;

    /// Delete a saved payment option of a user
    async fn delete_payment_option(
        &self,
        request: DeletePaymentOptionRequest,
    ) -> GatewayResult<DeletePaymentOptionResponse>;
}
