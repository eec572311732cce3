//! Callbacks that resume a redirected deposit: the challenge result the
//! customer's browser posts back from the ACS, and the payment notification
//! the gateway sends after an APM redirect.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use tracing::{info, warn};

use crate::api::{ApiError, AppState};
use crate::payments::challenge::ChallengeResult;
use crate::payments::deposit::{DepositSession, DepositSummary, ResumeIds};
use crate::payments::notification::PaymentNotification;
use crate::payments::status::Status;

/// Sends the browser to the merchant's landing page for the outcome, or
/// answers with the deposit itself when no landing page is configured.
fn landing(state: &AppState, deposit: &DepositSession) -> Response {
    let urls = &state.gateway.urls;
    let target = match deposit.status() {
        Status::Approved => urls.success_url.as_deref(),
        Status::Redirect | Status::Success | Status::NotInit => urls.pending_url.as_deref(),
        _ => urls.failure_url.as_deref(),
    };
    match target {
        Some(url) => Redirect::to(url).into_response(),
        None => Json(deposit.summary()).into_response(),
    }
}

pub async fn challenge_result(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: String,
) -> Result<Response, ApiError> {
    let result = ChallengeResult::from_form_body(&body)?;
    let deposit = state
        .deposit(&session_id)
        .await
        .ok_or_else(|| ApiError::not_found(&session_id))?;
    let mut deposit = deposit.lock().await;

    if deposit.challenge_result().is_some() {
        warn!("Repeated challenge result for deposit {}", session_id);
        return Ok(landing(&state, &deposit));
    }

    let status = deposit.confirm(Some(result), &ResumeIds::default()).await;
    info!("Deposit {} confirmed after challenge: {}", session_id, status);

    Ok(landing(&state, &deposit))
}

pub async fn payment_notification(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: String,
) -> Result<Json<DepositSummary>, ApiError> {
    let notification =
        PaymentNotification::from_form_body(&body, &state.gateway.merchant.merchant_key)?;
    let deposit = state
        .deposit(&session_id)
        .await
        .ok_or_else(|| ApiError::not_found(&session_id))?;
    let mut deposit = deposit.lock().await;

    if deposit.notification().is_some() {
        warn!("Repeated payment notification for deposit {}", session_id);
        return Ok(Json(deposit.summary()));
    }

    let status = deposit
        .confirm_by_apm(Some(notification), &ResumeIds::default())
        .await;
    info!("Deposit {} confirmed by notification: {}", session_id, status);

    Ok(Json(deposit.summary()))
}
