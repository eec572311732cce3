use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::{ApiError, AppState};
use crate::payments::amount::PaymentAmount;
use crate::payments::deposit::{DepositOptions, DepositSession, DepositSummary, ResumeIds};
use crate::payments::method::{
    AlternativeMethod, BillingIdentity, ChallengePreference, PaymentMethodDescriptor,
};
use crate::payments::session::SessionSummary;
use crate::payments::withdrawal::WithdrawalSession;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MethodInput {
    Card {
        holder_name: String,
        card_number: String,
        expiration_year: String,
        expiration_month: String,
        cvv: String,
    },
    TempToken {
        holder_name: String,
        temp_token: String,
        cvv: Option<String>,
    },
    SavedOption {
        option_id: String,
        cvv: Option<String>,
        masked_card_number: Option<String>,
        holder_name: Option<String>,
    },
    Apm {
        fields: BTreeMap<String, String>,
        submethod: Option<String>,
        option_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct CreateDepositRequest {
    pub session_id: Option<String>,
    pub session_token: Option<String>,
    pub user_token_id: String,
    pub billing: BillingIdentity,
    pub currency: String,
    pub amount: Decimal,
    #[serde(default)]
    pub zero_auth: bool,
    #[serde(default)]
    pub challenge_preference: u8,
    pub method: MethodInput,
}

#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub session_id: Option<String>,
    pub user_token_id: String,
    pub billing: BillingIdentity,
    pub currency: String,
    pub amount: Decimal,
    pub option_id: String,
}

fn build_method(
    user_token_id: &str,
    billing: BillingIdentity,
    preference: u8,
    input: MethodInput,
) -> Result<(PaymentMethodDescriptor, bool), ApiError> {
    let mut method = PaymentMethodDescriptor::new(user_token_id, billing)?
        .with_challenge_preference(ChallengePreference::from_code(preference));

    let (ready, by_apm) = match input {
        MethodInput::Card {
            holder_name,
            card_number,
            expiration_year,
            expiration_month,
            cvv,
        } => (
            method.set_for_card(
                &holder_name,
                &card_number,
                &expiration_year,
                &expiration_month,
                &cvv,
            ),
            false,
        ),
        MethodInput::TempToken {
            holder_name,
            temp_token,
            cvv,
        } => (
            method.set_for_temp_token(&holder_name, &temp_token, cvv.as_deref()),
            false,
        ),
        MethodInput::SavedOption {
            option_id,
            cvv,
            masked_card_number,
            holder_name,
        } => (
            method.set_for_saved_option(
                &option_id,
                cvv.as_deref(),
                masked_card_number.as_deref(),
                holder_name.as_deref(),
                false,
            ),
            false,
        ),
        MethodInput::Apm {
            fields,
            submethod,
            option_id,
        } => (
            method.set_for_apm(
                AlternativeMethod::new(fields),
                submethod.as_deref(),
                option_id.as_deref(),
            ),
            true,
        ),
    };

    if !ready {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "payment method is incomplete or invalid",
        ));
    }
    Ok((method, by_apm))
}

pub async fn create_deposit(
    State(state): State<AppState>,
    Json(payload): Json<CreateDepositRequest>,
) -> Result<Json<DepositSummary>, ApiError> {
    let (method, by_apm) = build_method(
        &payload.user_token_id,
        payload.billing,
        payload.challenge_preference,
        payload.method,
    )?;
    let requested = PaymentAmount::new(&payload.currency, payload.amount)?;

    let mut deposit = DepositSession::new(
        state.gateway.clone(),
        state.client.clone(),
        method,
        requested,
        DepositOptions {
            session_id: payload.session_id,
            session_token: payload.session_token,
            zero_auth: payload.zero_auth,
        },
    )?;

    info!(
        "Deposit requested: session={} amount={}",
        deposit.session_id(),
        deposit.session().requested()
    );

    let status = if by_apm {
        deposit.prepare().await;
        if deposit.session().is_failed() {
            deposit.status()
        } else {
            deposit.start_by_apm().await
        }
    } else {
        if !deposit.is_ready_for_temp_token() {
            deposit.prepare().await;
        }
        if deposit.session().is_failed() {
            deposit.status()
        } else {
            deposit.start(&ResumeIds::default()).await
        }
    };

    if deposit.session().is_failed() {
        warn!(
            "Deposit {} ended {}: {}",
            deposit.session_id(),
            status,
            deposit.session().full_status()
        );
    }

    let response = deposit.summary();
    if deposit.is_redirected() {
        let session_id = deposit.session_id().to_string();
        state
            .deposits
            .write()
            .await
            .insert(session_id, Arc::new(Mutex::new(deposit)));
    }

    Ok(Json(response))
}

pub async fn get_deposit(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DepositSummary>, ApiError> {
    let deposit = state
        .deposit(&session_id)
        .await
        .ok_or_else(|| ApiError::not_found(&session_id))?;
    let deposit = deposit.lock().await;
    Ok(Json(deposit.summary()))
}

pub async fn create_withdrawal(
    State(state): State<AppState>,
    Json(payload): Json<CreateWithdrawalRequest>,
) -> Result<Json<SessionSummary>, ApiError> {
    let mut method = PaymentMethodDescriptor::new(&payload.user_token_id, payload.billing)?;
    if !method.set_for_saved_option(&payload.option_id, None, None, None, true) {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "withdrawal needs a saved payment option",
        ));
    }
    let requested = PaymentAmount::new(&payload.currency, payload.amount)?;

    let mut withdrawal = WithdrawalSession::new(
        state.gateway.clone(),
        state.client.clone(),
        method,
        requested,
        payload.session_id.as_deref(),
    )?;

    let status = withdrawal.withdraw().await;
    info!(
        "Withdrawal {} finished: {}",
        withdrawal.session_id(),
        status
    );

    Ok(Json(withdrawal.summary()))
}
