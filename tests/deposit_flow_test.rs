mod common;

use common::*;
use nuvei_payments::config::FlowPolicy;
use nuvei_payments::payments::challenge::ChallengeResult;
use nuvei_payments::payments::deposit::RedirectCause;
use nuvei_payments::payments::method::{AlternativeMethod, PaymentMethodDescriptor};
use nuvei_payments::payments::notification::PaymentNotification;
use nuvei_payments::payments::{DepositOptions, DepositSession, PaymentAmount, ResumeIds, Status};
use rust_decimal_macros::dec;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const SAVED_OPTION_ID: &str = "2125433111";

fn saved_option_method() -> PaymentMethodDescriptor {
    let mut method = PaymentMethodDescriptor::new(USER_TOKEN_ID, billing()).unwrap();
    assert!(method.set_for_saved_option(SAVED_OPTION_ID, Some("217"), None, None, false));
    method
}

fn card_method() -> PaymentMethodDescriptor {
    let mut method = PaymentMethodDescriptor::new(USER_TOKEN_ID, billing()).unwrap();
    assert!(method.set_for_card("ANA QUISPE", "4000020951595032", "2030", "12", "217"));
    method
}

fn apm_method() -> PaymentMethodDescriptor {
    let mut method = PaymentMethodDescriptor::new(USER_TOKEN_ID, billing()).unwrap();
    let apm = AlternativeMethod::new([
        ("paymentMethod", "apmgw_expresscheckout"),
        ("email", "ana.quispe@example.com"),
    ]);
    assert!(method.set_for_apm(apm, None, None));
    method
}

fn deposit(
    gateway: &Arc<ScriptedGateway>,
    method: PaymentMethodDescriptor,
    amount: PaymentAmount,
) -> DepositSession {
    deposit_with(gateway, method, amount, FlowPolicy::default(), false)
}

fn deposit_with(
    gateway: &Arc<ScriptedGateway>,
    method: PaymentMethodDescriptor,
    amount: PaymentAmount,
    policy: FlowPolicy,
    zero_auth: bool,
) -> DepositSession {
    DepositSession::new(
        gateway_config_with(policy),
        gateway.clone(),
        method,
        amount,
        DepositOptions {
            session_id: Some(SESSION_ID.to_string()),
            zero_auth,
            ..DepositOptions::default()
        },
    )
    .unwrap()
}

fn partially_approved(transaction_id: &str, transaction_type: &str) -> serde_json::Value {
    let mut charge = sale_approved(transaction_id);
    charge["transactionType"] = json!(transaction_type);
    charge["partialApproval"] = json!({
        "requestedAmount": "107.02",
        "requestedCurrency": "PEN",
        "processedAmount": "50.00",
        "processedCurrency": "PEN"
    });
    charge
}

fn sandbox_three_d_error(transaction_id: &str) -> serde_json::Value {
    json!({
        "status": "SUCCESS",
        "errCode": 0,
        "transactionId": transaction_id,
        "transactionType": "Auth3D",
        "transactionStatus": "ERROR",
        "gwErrorCode": -1100,
        "gwErrorReason": "Error In 3DSecure Processing",
        "gwExtendedErrorCode": 0
    })
}

fn challenge_charge() -> serde_json::Value {
    json!({
        "status": "SUCCESS",
        "errCode": 0,
        "transactionId": "1110000000004146935",
        "transactionType": "Auth3D",
        "transactionStatus": "REDIRECT",
        "paymentOption": {
            "card": {
                "threeD": {
                    "version": "2.1.0",
                    "serverTransId": "a3e2d7f0-9c4b-4a55-8f13-2f0c1c9f6c11",
                    "acsUrl": "https://acs.example.com/challenge",
                    "cReq": "eyJtZXNzYWdlVHlwZSI6IkNSZXEifQ",
                    "threeDFlow": "1"
                }
            }
        }
    })
}

fn signed_notification(fields: Vec<(&str, String)>) -> PaymentNotification {
    let get = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let plain = format!(
        "{}{}{}{}{}{}{}",
        MERCHANT_KEY,
        get("totalAmount"),
        get("currency"),
        get("responseTimeStamp"),
        get("PPP_TransactionID"),
        get("Status"),
        get("productId"),
    );
    let checksum = hex::encode(Sha256::digest(plain.as_bytes()));

    let mut fields = fields;
    fields.push(("advanceResponseChecksum", checksum));
    PaymentNotification::from_fields(fields, MERCHANT_KEY)
}

fn apm_notification(status: &str) -> Vec<(&'static str, String)> {
    vec![
        ("type", "DEPOSIT".to_string()),
        ("ppp_status", "OK".to_string()),
        ("Status", status.to_string()),
        ("payment_method", "apmgw_expresscheckout".to_string()),
        ("clientUniqueId", SESSION_ID.to_string()),
        ("clientRequestId", SESSION_ID.to_string()),
        ("PPP_TransactionID", "548112833".to_string()),
        ("TransactionID", "1110000000004147002".to_string()),
        ("user_token_id", USER_TOKEN_ID.to_string()),
        ("productId", SESSION_ID.to_string()),
        ("totalAmount", "25.00".to_string()),
        ("currency", "USD".to_string()),
        ("responseTimeStamp", "2026-10-19.14:03:11".to_string()),
    ]
}

fn apm_gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .reply(SESSION_TOKEN, session_token_ok())
        .reply(OPEN_ORDER, open_order_ok("548112833"))
        .reply(
            PAYMENT,
            json!({
                "status": "SUCCESS",
                "errCode": 0,
                "orderId": "548112833",
                "transactionId": "1110000000004147001",
                "transactionStatus": "REDIRECT",
                "paymentOption": { "redirectUrl": "https://apm.example.com/checkout?token=EC-77" }
            }),
        )
}

#[tokio::test]
async fn test_saved_option_deposit_is_approved() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112801"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146901", json!({ "v2supported": "false" })),
            )
            .reply(PAYMENT, sale_approved("1110000000004146902"))
            .reply(
                PAYMENT_STATUS,
                status_approved("1110000000004146902", "PEN", "107.02"),
            ),
    );
    let mut deposit = deposit(
        &gateway,
        saved_option_method(),
        PaymentAmount::new("PEN", dec!(107.02)).unwrap(),
    );

    assert_eq!(deposit.prepare().await, Status::Success);
    assert_eq!(deposit.start(&ResumeIds::default()).await, Status::Approved);

    let session = deposit.session();
    assert!(session.is_fully_approved());
    assert_eq!(session.pay_tx_id(), Some("1110000000004146902"));
    assert_eq!(session.full_status(), "Approved: currency=PEN, amount=107.02");
    assert_eq!(deposit.order_id(), Some("548112801"));

    let charge = &gateway.calls(PAYMENT)[0];
    assert_eq!(charge["amount"], "107.02");
    assert_eq!(charge["currency"], "PEN");
    assert_eq!(charge["relatedTransactionId"], "1110000000004146901");
    assert_eq!(
        charge["paymentOption"]["userPaymentOptionId"],
        SAVED_OPTION_ID
    );
    assert_eq!(gateway.count(PAYMENT_STATUS), 1);
    assert_eq!(gateway.count(REFUND), 0);
}

#[tokio::test]
async fn test_challenged_card_deposit_is_approved_after_cres() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112802"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok(
                    "1110000000004146934",
                    json!({
                        "v2supported": "true",
                        "serverTransId": "a3e2d7f0-9c4b-4a55-8f13-2f0c1c9f6c11"
                    }),
                ),
            )
            .reply(PAYMENT, challenge_charge())
            .reply(PAYMENT, sale_approved("1110000000004146936"))
            .reply(
                PAYMENT_STATUS,
                status_approved("1110000000004146936", "MXN", "100.10"),
            ),
    );
    let mut deposit = deposit(
        &gateway,
        card_method(),
        PaymentAmount::new("MXN", dec!(100.10)).unwrap(),
    );

    deposit.prepare().await;
    assert_eq!(deposit.start(&ResumeIds::default()).await, Status::Redirect);
    assert!(deposit.is_challenged());
    assert_eq!(
        deposit.redirect_url(),
        Some("https://acs.example.com/challenge?creq=eyJtZXNzYWdlVHlwZSI6IkNSZXEifQ")
    );
    assert_eq!(deposit.redirect_tx_id(), Some("1110000000004146935"));
    assert_eq!(gateway.count(PAYMENT_STATUS), 0);

    let three_d = &gateway.calls(PAYMENT)[0]["paymentOption"]["card"]["threeD"];
    assert_eq!(
        three_d["notificationURL"],
        format!("https://pay.example.com/callbacks/challenge/{}", SESSION_ID)
    );

    let cres = ChallengeResult::decode(&encoded_cres(
        "a3e2d7f0-9c4b-4a55-8f13-2f0c1c9f6c11",
        "Y",
    ))
    .unwrap();
    let status = deposit.confirm(Some(cres), &ResumeIds::default()).await;

    assert_eq!(status, Status::Approved);
    assert!(deposit.session().is_fully_approved());
    assert_eq!(deposit.session().pay_tx_id(), Some("1110000000004146936"));
    assert_eq!(gateway.count(PAYMENT), 2);
    assert_eq!(
        gateway.calls(PAYMENT)[1]["relatedTransactionId"],
        "1110000000004146935"
    );
}

#[tokio::test]
async fn test_cres_for_another_transaction_is_rejected() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112803"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146934", json!({ "v2supported": "true" })),
            )
            .reply(PAYMENT, challenge_charge()),
    );
    let mut deposit = deposit(
        &gateway,
        card_method(),
        PaymentAmount::new("MXN", dec!(100.10)).unwrap(),
    );

    deposit.prepare().await;
    assert_eq!(deposit.start(&ResumeIds::default()).await, Status::Redirect);

    let cres = ChallengeResult::decode(&encoded_cres("someone-elses-transaction", "Y")).unwrap();
    let status = deposit.confirm(Some(cres), &ResumeIds::default()).await;

    assert_eq!(status, Status::Error);
    assert_eq!(
        deposit.session().err_reason(),
        Some("3DSv2 ChallengeResult Error")
    );
    assert_eq!(gateway.count(PAYMENT), 1);
}

#[tokio::test]
async fn test_cancelled_challenge_declines_the_deposit() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112804"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146934", json!({ "v2supported": "true" })),
            )
            .reply(PAYMENT, challenge_charge()),
    );
    let mut deposit = deposit(
        &gateway,
        card_method(),
        PaymentAmount::new("MXN", dec!(100.10)).unwrap(),
    );

    deposit.prepare().await;
    deposit.start(&ResumeIds::default()).await;

    let cres = ChallengeResult::decode(&encoded_cres(
        "a3e2d7f0-9c4b-4a55-8f13-2f0c1c9f6c11",
        "N",
    ))
    .unwrap();
    let status = deposit.confirm(Some(cres), &ResumeIds::default()).await;

    assert_eq!(status, Status::Declined);
    assert_eq!(gateway.count(PAYMENT), 1);
}

#[tokio::test]
async fn test_partial_approval_is_refunded() {
    let mut charge = sale_approved("1110000000004146950");
    charge["partialApproval"] = json!({
        "requestedAmount": "107.02",
        "requestedCurrency": "PEN",
        "processedAmount": "50.00",
        "processedCurrency": "PEN"
    });
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112805"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146949", json!({ "v2supported": "false" })),
            )
            .reply(PAYMENT, charge)
            .reply(
                PAYMENT_STATUS,
                status_approved("1110000000004146950", "PEN", "50.00"),
            )
            .reply(
                REFUND,
                json!({
                    "status": "SUCCESS",
                    "errCode": 0,
                    "transactionId": "1110000000004146951",
                    "transactionStatus": "APPROVED"
                }),
            ),
    );
    let mut deposit = deposit(
        &gateway,
        saved_option_method(),
        PaymentAmount::new("PEN", dec!(107.02)).unwrap(),
    );

    deposit.prepare().await;
    let status = deposit.start(&ResumeIds::default()).await;

    assert_eq!(status, Status::Voided);
    assert_eq!(deposit.session().void_tx_id(), Some("1110000000004146951"));

    let refund = &gateway.calls(REFUND)[0];
    assert_eq!(refund["amount"], "50.00");
    assert_eq!(refund["currency"], "PEN");
    assert_eq!(refund["relatedTransactionId"], "1110000000004146950");
}

#[tokio::test]
async fn test_lost_charge_response_is_reconciled_by_status() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112806"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146960", json!({ "v2supported": "false" })),
            )
            .fail(PAYMENT, "connection reset by peer")
            .reply(
                PAYMENT_STATUS,
                status_approved("1110000000004146961", "PEN", "107.02"),
            ),
    );
    let mut deposit = deposit(
        &gateway,
        saved_option_method(),
        PaymentAmount::new("PEN", dec!(107.02)).unwrap(),
    );

    deposit.prepare().await;
    let status = deposit.start(&ResumeIds::default()).await;

    assert_eq!(status, Status::Approved);
    assert_eq!(deposit.session().pay_tx_id(), Some("1110000000004146961"));
    assert!(deposit
        .session()
        .reason_trail()
        .iter()
        .any(|reason| reason.starts_with("PayInReq Exception")));
    assert_eq!(
        gateway.calls(PAYMENT_STATUS)[0]["clientRequestId"],
        format!("{}_1110000000004146960", SESSION_ID)
    );
}

#[tokio::test]
async fn test_declined_charge_is_not_rechecked() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112807"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146970", json!({ "v2supported": "false" })),
            )
            .reply(
                PAYMENT,
                json!({
                    "status": "SUCCESS",
                    "errCode": 0,
                    "transactionId": "1110000000004146971",
                    "transactionType": "Sale",
                    "transactionStatus": "DECLINED",
                    "gwErrorCode": -1,
                    "gwErrorReason": "Decline",
                    "gwExtendedErrorCode": 0
                }),
            ),
    );
    let mut deposit = deposit(
        &gateway,
        saved_option_method(),
        PaymentAmount::new("PEN", dec!(107.02)).unwrap(),
    );

    deposit.prepare().await;
    let status = deposit.start(&ResumeIds::default()).await;

    assert_eq!(status, Status::Declined);
    assert!(deposit.session().is_gw_declined());
    assert_eq!(deposit.session().pay_tx_id(), Some("1110000000004146971"));
    assert_eq!(gateway.count(PAYMENT_STATUS), 0);
}

#[tokio::test]
async fn test_apm_deposit_is_approved_by_notification() {
    let gateway = Arc::new(apm_gateway().reply(
        PAYMENT_STATUS,
        status_approved("1110000000004147002", "USD", "25.00"),
    ));
    let mut deposit = deposit(
        &gateway,
        apm_method(),
        PaymentAmount::new("USD", dec!(25.00)).unwrap(),
    );

    deposit.prepare().await;
    assert_eq!(deposit.start_by_apm().await, Status::Redirect);
    assert_eq!(
        deposit.redirect_url(),
        Some("https://apm.example.com/checkout?token=EC-77")
    );
    assert_eq!(
        gateway.calls(PAYMENT)[0]["urlDetails"]["notificationUrl"],
        format!("https://pay.example.com/callbacks/notification/{}", SESSION_ID)
    );

    let dmn = signed_notification(apm_notification("APPROVED"));
    let status = deposit
        .confirm_by_apm(Some(dmn), &ResumeIds::default())
        .await;

    assert_eq!(status, Status::Approved);
    assert_eq!(
        deposit.redirect_cause(),
        Some(RedirectCause::NotificationReceived)
    );
    assert_eq!(deposit.session().pay_tx_id(), Some("1110000000004147002"));
    assert_eq!(gateway.count(PAYMENT_STATUS), 1);
}

#[tokio::test]
async fn test_tampered_notification_fails_the_deposit() {
    let gateway = Arc::new(apm_gateway());
    let mut deposit = deposit(
        &gateway,
        apm_method(),
        PaymentAmount::new("USD", dec!(25.00)).unwrap(),
    );

    deposit.prepare().await;
    assert_eq!(deposit.start_by_apm().await, Status::Redirect);

    let mut fields = apm_notification("APPROVED");
    let dmn = {
        let signed = signed_notification(fields.clone());
        let checksum = signed.get("advanceResponseChecksum").unwrap().to_string();
        fields.retain(|(key, _)| *key != "totalAmount");
        fields.push(("totalAmount", "2500.00".to_string()));
        fields.push(("advanceResponseChecksum", checksum));
        PaymentNotification::from_fields(fields, MERCHANT_KEY)
    };
    let status = deposit
        .confirm_by_apm(Some(dmn), &ResumeIds::default())
        .await;

    assert_eq!(status, Status::Error);
    assert!(deposit
        .session()
        .err_reason()
        .unwrap()
        .starts_with("APM DMN Error"));
    assert_eq!(deposit.session().pay_tx_id(), None);
    assert_eq!(gateway.count(PAYMENT_STATUS), 0);
}

#[tokio::test]
async fn test_sandbox_three_d_error_is_bypassed_when_allowed() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112810"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146980", json!({ "v2supported": "false" })),
            )
            .reply(PAYMENT, sandbox_three_d_error("1110000000004146981"))
            .reply(PAYMENT, sale_approved("1110000000004146982"))
            .reply(
                PAYMENT_STATUS,
                status_approved("1110000000004146982", "PEN", "107.02"),
            ),
    );
    let policy = FlowPolicy {
        allow_staging_3ds_bypass: true,
        ..FlowPolicy::default()
    };
    let mut deposit = deposit_with(
        &gateway,
        saved_option_method(),
        PaymentAmount::new("PEN", dec!(107.02)).unwrap(),
        policy,
        false,
    );

    deposit.prepare().await;
    let status = deposit.start(&ResumeIds::default()).await;

    assert_eq!(status, Status::Approved);
    assert!(deposit.session().is_fully_approved());
    assert_eq!(deposit.redirect_url(), None);
    assert_eq!(deposit.session().pay_tx_id(), Some("1110000000004146982"));

    let charges = gateway.calls(PAYMENT);
    assert_eq!(charges.len(), 2);
    assert!(charges[0]["paymentOption"]["card"].get("threeD").is_some());
    assert_eq!(charges[1]["relatedTransactionId"], "1110000000004146981");
}

#[tokio::test]
async fn test_sandbox_three_d_error_fails_by_default() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112811"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146983", json!({ "v2supported": "false" })),
            )
            .reply(PAYMENT, sandbox_three_d_error("1110000000004146984")),
    );
    let mut deposit = deposit(
        &gateway,
        saved_option_method(),
        PaymentAmount::new("PEN", dec!(107.02)).unwrap(),
    );

    deposit.prepare().await;
    let status = deposit.start(&ResumeIds::default()).await;

    assert_eq!(status, Status::Error);
    assert_eq!(
        deposit.session().err_reason(),
        Some("Gw Reason: Error In 3DSecure Processing")
    );
    assert!(deposit
        .session()
        .reason_trail()
        .iter()
        .any(|reason| reason == "PayInReq ThreeD failed"));
    assert_eq!(gateway.count(PAYMENT), 1);
    assert_eq!(gateway.count(PAYMENT_STATUS), 0);
}

#[tokio::test]
async fn test_partial_auth_is_voided() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112812"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146952", json!({ "v2supported": "false" })),
            )
            .reply(PAYMENT, partially_approved("1110000000004146953", "Auth"))
            .reply(
                PAYMENT_STATUS,
                json!({
                    "status": "SUCCESS",
                    "errCode": 0,
                    "transactionId": "1110000000004146953",
                    "transactionType": "Auth",
                    "transactionStatus": "APPROVED",
                    "currency": "PEN",
                    "amount": "50.00"
                }),
            )
            .reply(
                VOID,
                json!({
                    "status": "SUCCESS",
                    "errCode": 0,
                    "transactionId": "1110000000004146954",
                    "transactionStatus": "APPROVED"
                }),
            ),
    );
    let mut deposit = deposit(
        &gateway,
        saved_option_method(),
        PaymentAmount::new("PEN", dec!(107.02)).unwrap(),
    );

    deposit.prepare().await;
    let status = deposit.start(&ResumeIds::default()).await;

    assert_eq!(status, Status::Voided);
    assert_eq!(deposit.session().void_tx_id(), Some("1110000000004146954"));
    assert_eq!(gateway.count(PAYMENT), 1);
    assert_eq!(gateway.count(REFUND), 0);

    let void = &gateway.calls(VOID)[0];
    assert_eq!(void["amount"], "50.00");
    assert_eq!(void["currency"], "PEN");
    assert_eq!(void["relatedTransactionId"], "1110000000004146953");
}

#[tokio::test]
async fn test_partial_approval_stands_when_reversal_is_off() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112813"))
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146955", json!({ "v2supported": "false" })),
            )
            .reply(PAYMENT, partially_approved("1110000000004146956", "Sale"))
            .reply(
                PAYMENT_STATUS,
                status_approved("1110000000004146956", "PEN", "50.00"),
            ),
    );
    let policy = FlowPolicy {
        reverse_partial_approval: false,
        ..FlowPolicy::default()
    };
    let mut deposit = deposit_with(
        &gateway,
        saved_option_method(),
        PaymentAmount::new("PEN", dec!(107.02)).unwrap(),
        policy,
        false,
    );

    deposit.prepare().await;
    let status = deposit.start(&ResumeIds::default()).await;

    assert_eq!(status, Status::Approved);
    assert!(!deposit.session().is_fully_approved());
    assert_eq!(
        deposit.session().full_status(),
        "Approved: currency=PEN, amount=50.00"
    );
    assert_eq!(deposit.session().pay_tx_id(), Some("1110000000004146956"));
    assert_eq!(gateway.count(REFUND), 0);
    assert_eq!(gateway.count(VOID), 0);
}

#[tokio::test]
async fn test_zero_auth_deposit_stores_the_card() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(
                INIT_PAYMENT,
                init_payment_ok("1110000000004146990", json!({ "v2supported": "true" })),
            )
            .reply(
                PAYMENT,
                json!({
                    "status": "SUCCESS",
                    "errCode": 0,
                    "transactionId": "1110000000004146991",
                    "transactionType": "Auth",
                    "transactionStatus": "APPROVED",
                    "fraudDetails": { "finalDecision": "Accept" },
                    "paymentOption": {
                        "userPaymentOptionId": "2125433999",
                        "card": { "ccCardNumber": "4****5032", "bin": "400002", "cardBrand": "VISA" }
                    }
                }),
            ),
    );
    let mut deposit = deposit_with(
        &gateway,
        card_method(),
        PaymentAmount::new("PEN", dec!(107.02)).unwrap(),
        FlowPolicy::default(),
        true,
    );

    assert_eq!(deposit.prepare().await, Status::Success);
    let status = deposit.start(&ResumeIds::default()).await;

    assert_eq!(status, Status::Approved);
    assert!(deposit.is_zero_auth());
    assert!(deposit.is_charge_approved());
    assert!(!deposit.session().is_sale_approved());
    assert_eq!(deposit.redirect_url(), None);
    assert_eq!(deposit.session().pay_tx_id(), Some("1110000000004146991"));
    assert_eq!(
        deposit.session().method().saved_option_id(),
        Some("2125433999")
    );
    assert_eq!(
        deposit.session().method().masked_card_number(),
        Some("4****5032")
    );

    assert_eq!(gateway.count(OPEN_ORDER), 0);
    let init = &gateway.calls(INIT_PAYMENT)[0];
    assert_eq!(init["amount"], "0");
    assert_eq!(init["transactionType"], "Auth");

    let charges = gateway.calls(PAYMENT);
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0]["amount"], "0");
    assert_eq!(charges[0]["transactionType"], "Auth");
    assert_eq!(charges[0]["authenticationOnlyType"], "ADDCARD");
    assert!(charges[0]["paymentOption"]["card"].get("threeD").is_none());

    assert_eq!(gateway.count(PAYMENT_STATUS), 0);
    assert_eq!(gateway.count(REFUND), 0);
    assert_eq!(gateway.count(VOID), 0);
}

#[tokio::test]
async fn test_expired_status_session_keeps_notification_outcome() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(SESSION_TOKEN, session_token_ok())
            .reply(OPEN_ORDER, open_order_ok("548112833"))
            .reply(
                PAYMENT,
                json!({
                    "status": "SUCCESS",
                    "errCode": 0,
                    "orderId": "548112833",
                    "transactionId": "1110000000004147001",
                    "transactionType": "Sale",
                    "transactionStatus": "REDIRECT",
                    "paymentOption": { "redirectUrl": "https://apm.example.com/checkout?token=EC-77" }
                }),
            )
            .reply(
                PAYMENT_STATUS,
                json!({ "status": "ERROR", "errCode": 1069, "reason": "Session expired" }),
            ),
    );
    let mut deposit = deposit(
        &gateway,
        apm_method(),
        PaymentAmount::new("USD", dec!(25.00)).unwrap(),
    );

    deposit.prepare().await;
    assert_eq!(deposit.start_by_apm().await, Status::Redirect);

    let dmn = signed_notification(apm_notification("APPROVED"));
    let status = deposit
        .confirm_by_apm(Some(dmn), &ResumeIds::default())
        .await;

    assert_eq!(status, Status::Approved);
    assert_eq!(deposit.session().err_reason(), None);
    assert_eq!(deposit.session().pay_tx_id(), Some("1110000000004147002"));
    assert_eq!(
        deposit.session().full_status(),
        "Approved: currency=USD, amount=25.00"
    );
    assert_eq!(gateway.count(PAYMENT_STATUS), 1);
}
