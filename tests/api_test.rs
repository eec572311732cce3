mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use nuvei_payments::api::{self, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(gateway: ScriptedGateway) -> Router {
    api::router(AppState::new(gateway_config(), "test", Arc::new(gateway)))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_form(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn card_deposit(cvv: &str) -> Value {
    json!({
        "session_id": SESSION_ID,
        "user_token_id": USER_TOKEN_ID,
        "billing": {
            "first_name": "Ana",
            "last_name": "Quispe",
            "country": "MX",
            "email": "ana.quispe@example.com"
        },
        "currency": "MXN",
        "amount": "100.10",
        "method": {
            "type": "card",
            "holder_name": "ANA QUISPE",
            "card_number": "4000020951595032",
            "expiration_year": "2030",
            "expiration_month": "12",
            "cvv": cvv
        }
    })
}

fn challenge_gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .reply(SESSION_TOKEN, session_token_ok())
        .reply(OPEN_ORDER, open_order_ok("548112900"))
        .reply(
            INIT_PAYMENT,
            init_payment_ok("1110000000004149001", json!({ "v2supported": "true" })),
        )
        .reply(
            PAYMENT,
            json!({
                "status": "SUCCESS",
                "errCode": 0,
                "transactionId": "1110000000004149002",
                "transactionType": "Auth3D",
                "transactionStatus": "REDIRECT",
                "paymentOption": {
                    "card": {
                        "threeD": {
                            "serverTransId": "0f9d7a3c-2b8e-4c1a-9d55-7e6f4a3b2c10",
                            "acsUrl": "https://acs.example.com/challenge",
                            "cReq": "eyJtZXNzYWdlVHlwZSI6IkNSZXEifQ",
                            "threeDFlow": "1"
                        }
                    }
                }
            }),
        )
        .reply(PAYMENT, sale_approved("1110000000004149003"))
        .reply(
            PAYMENT_STATUS,
            status_approved("1110000000004149003", "MXN", "100.10"),
        )
}

#[tokio::test]
async fn test_health_reports_environment() {
    let response = app(ScriptedGateway::new())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");
    assert_eq!(body["staging"], true);
    assert_eq!(body["pending_deposits"], 0);
}

#[tokio::test]
async fn test_challenged_deposit_resumes_from_callback() {
    let app = app(challenge_gateway());

    let response = app
        .clone()
        .oneshot(post_json("/deposits", card_deposit("217")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Redirect");
    assert_eq!(body["redirect_cause"], "NativeChallenge");
    assert_eq!(
        body["redirect_url"],
        "https://acs.example.com/challenge?creq=eyJtZXNzYWdlVHlwZSI6IkNSZXEifQ"
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/deposits/{}", SESSION_ID))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "Redirect");

    let cres = encoded_cres("0f9d7a3c-2b8e-4c1a-9d55-7e6f4a3b2c10", "Y");
    let response = app
        .clone()
        .oneshot(post_form(
            &format!("/callbacks/challenge/{}", SESSION_ID),
            format!("cres={}", cres),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Approved");
    assert_eq!(body["redirect_cause"], "ChallengeResultReceived");
    assert_eq!(body["pay_transaction_id"], "1110000000004149003");
}

#[tokio::test]
async fn test_invalid_cvv_is_rejected() {
    let response = app(ScriptedGateway::new())
        .oneshot(post_json("/deposits", card_deposit("12")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_callback_for_unknown_deposit() {
    let cres = encoded_cres("0f9d7a3c-2b8e-4c1a-9d55-7e6f4a3b2c10", "Y");
    let response = app(ScriptedGateway::new())
        .oneshot(post_form(
            "/callbacks/challenge/7c1e5b9a4d2f4e8b9a6c3d1e0f2a4b6c",
            format!("cres={}", cres),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_callback_without_cres_is_a_bad_request() {
    let response = app(ScriptedGateway::new())
        .oneshot(post_form(
            &format!("/callbacks/challenge/{}", SESSION_ID),
            "threeDSSessionData=abc".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_withdrawal_endpoint_returns_the_outcome() {
    let gateway = ScriptedGateway::new()
        .reply(SESSION_TOKEN, session_token_ok())
        .reply(
            PAYOUT,
            json!({
                "status": "SUCCESS",
                "errCode": 0,
                "transactionId": "1110000000004149101",
                "transactionStatus": "APPROVED"
            }),
        )
        .reply(
            PAYOUT_STATUS,
            json!({
                "status": "SUCCESS",
                "errCode": 0,
                "transactionId": "1110000000004149101",
                "transactionStatus": "APPROVED",
                "amount": "40.00",
                "currency": "USD"
            }),
        );

    let response = app(gateway)
        .oneshot(post_json(
            "/withdrawals",
            json!({
                "user_token_id": USER_TOKEN_ID,
                "billing": {
                    "first_name": "Ana",
                    "last_name": "Quispe",
                    "country": "US",
                    "email": "ana.quispe@example.com"
                },
                "currency": "USD",
                "amount": "40.00",
                "option_id": "2125433111"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Approved");
    assert_eq!(body["pay_type"], "Withdrawal");
}
