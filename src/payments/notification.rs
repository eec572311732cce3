//! Asynchronous payment notifications (DMN)
//!
//! The gateway posts a form-encoded notification once an APM deposit is
//! settled. It is authenticated by `advanceResponseChecksum`, a SHA-256 over
//! the merchant key and a handful of fields, and must be correlated with the
//! session it claims to belong to before any of its statuses are trusted.

use crate::error::{GatewayError, GatewayResult};
use crate::payments::amount::PaymentAmount;
use crate::payments::merge::non_blank;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

const CHECKSUM_KEY: &str = "advanceResponseChecksum";

/// Session values a notification must agree with. Blank expectations are
/// not checked.
#[derive(Debug, Clone, Default)]
pub struct NotificationExpectations<'a> {
    pub method_name: Option<&'a str>,
    pub session_id: Option<&'a str>,
    pub order_id: Option<&'a str>,
    pub client_request_id: Option<&'a str>,
    pub user_token_id: Option<&'a str>,
    pub payment_option_id: Option<&'a str>,
}

/// What a notification says about the deposit, with the diagnostic trail
/// gathered while deciding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NotificationOutcome {
    Invalid(String),
    Error(String),
    Declined {
        cancelled_by_user: bool,
        comment: String,
    },
    Pending(String),
    Approved {
        amount: Option<PaymentAmount>,
        comment: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentNotification {
    fields: BTreeMap<String, String>,
    #[serde(skip)]
    expected_checksum: String,
}

impl PaymentNotification {
    /// Parses a form-encoded notification body and precomputes the checksum
    /// it should carry under `merchant_key`.
    pub fn from_form_body(body: &str, merchant_key: &str) -> GatewayResult<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body)
            .map_err(|e| GatewayError::decode(format!("notification is not form-encoded: {}", e)))?;
        if pairs.is_empty() {
            return Err(GatewayError::decode("notification body is empty"));
        }

        Ok(Self::from_fields(pairs, merchant_key))
    }

    pub fn from_fields<I, K, V>(fields: I, merchant_key: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| (k.into().trim().to_string(), v.into().trim().to_string()))
            .collect();

        let mut notification = Self {
            fields,
            expected_checksum: String::new(),
        };
        notification.expected_checksum = notification.compute_checksum(merchant_key);
        notification
    }

    fn compute_checksum(&self, merchant_key: &str) -> String {
        let plain: String = [
            merchant_key,
            self.raw("totalAmount"),
            self.raw("currency"),
            self.raw("responseTimeStamp"),
            self.raw("PPP_TransactionID"),
            self.raw("Status"),
            self.raw("productId"),
        ]
        .concat()
        .replace('+', " ");

        hex::encode(Sha256::digest(plain.as_bytes()))
    }

    fn raw(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or_default()
    }

    /// Trimmed, non-blank value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        non_blank(self.fields.get(key).map(String::as_str))
    }

    pub fn status(&self) -> Option<&str> {
        self.get("Status")
    }

    pub fn message(&self) -> Option<&str> {
        self.get("message")
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.get("TransactionID")
    }

    pub fn currency(&self) -> Option<&str> {
        self.get("currency")
    }

    pub fn total_amount(&self) -> Option<&str> {
        self.get("totalAmount")
    }

    pub fn product_id(&self) -> Option<&str> {
        self.get("productId")
    }

    pub fn signature_matches(&self) -> bool {
        match self.get(CHECKSUM_KEY) {
            Some(received) => {
                received.len() == self.expected_checksum.len()
                    && bool::from(
                        received
                            .as_bytes()
                            .ct_eq(self.expected_checksum.as_bytes()),
                    )
            }
            None => false,
        }
    }

    /// Authenticity, type and correlation checks. The error names every
    /// failed check.
    pub fn validate(&self, expected: &NotificationExpectations<'_>) -> Result<(), String> {
        let mut trail = Trail::default();

        let mut ok = match self.get(CHECKSUM_KEY) {
            None => {
                trail.push(format!("missing {}", CHECKSUM_KEY));
                false
            }
            Some(_) if !self.signature_matches() => {
                trail.push(format!("wrong {}", CHECKSUM_KEY));
                false
            }
            Some(_) => true,
        };

        ok &= trail.expect(self, "type", "DEPOSIT", true);

        let correlation = [
            ("payment_method", expected.method_name),
            ("clientUniqueId", expected.session_id),
            ("PPP_TransactionID", expected.order_id),
            ("clientRequestId", expected.client_request_id),
            ("user_token_id", expected.user_token_id),
            ("userPaymentOptionId", expected.payment_option_id),
        ];
        for (key, value) in correlation {
            if let Some(value) = non_blank(value) {
                ok &= trail.expect(self, key, value, false);
            }
        }

        if ok {
            Ok(())
        } else {
            Err(format!("DMN Not valid: {}", trail.join()))
        }
    }

    pub fn is_valid(&self, expected: &NotificationExpectations<'_>) -> bool {
        self.validate(expected).is_ok()
    }

    /// Classifies the notification. Checks run in a fixed order and the
    /// first that matches wins: invalid, error, declined, pending, approved.
    /// Anything left over is reported as an error.
    pub fn classify(&self, expected: &NotificationExpectations<'_>) -> NotificationOutcome {
        if let Err(reason) = self.validate(expected) {
            return NotificationOutcome::Invalid(reason);
        }

        if let Some(comment) = self.error_comment() {
            return NotificationOutcome::Error(comment);
        }

        if let Some(comment) = self.declined_comment() {
            return NotificationOutcome::Declined {
                cancelled_by_user: self.is_cancelled_by_user(),
                comment,
            };
        }

        let mut trail = Trail::default();
        let ppp_ok = self.get("ppp_status").is_some_and(|v| v.eq_ignore_ascii_case("OK"));
        let status_is = |wanted: &[&str]| {
            self.status()
                .is_some_and(|s| wanted.iter().any(|w| s.eq_ignore_ascii_case(w)))
        };
        trail.note(self, "ppp_status");
        trail.note(self, "Status");

        if ppp_ok && status_is(&["PENDING", "UPDATE"]) {
            trail.note(self, "message");
            return NotificationOutcome::Pending(trail.join());
        }

        if ppp_ok && status_is(&["APPROVED"]) {
            let amount = match (self.currency(), self.total_amount()) {
                (Some(currency), Some(total)) => PaymentAmount::parse(currency, total).ok(),
                _ => None,
            };
            trail.note(self, "currency");
            trail.note(self, "totalAmount");
            return NotificationOutcome::Approved {
                amount,
                comment: trail.join(),
            };
        }

        trail.note(self, "message");
        NotificationOutcome::Error(trail.join())
    }

    fn error_comment(&self) -> Option<String> {
        if self
            .status()
            .is_some_and(|s| s.eq_ignore_ascii_case("DECLINED"))
        {
            return None;
        }

        let mut trail = Trail::default();
        let ppp_fail = trail.expect(self, "ppp_status", "FAIL", true);
        let status_error = trail.expect(self, "Status", "ERROR", true);
        let err_code = !trail.is_zero_or_absent(self, "ErrCode");
        let reason_code = !trail.is_zero_or_absent(self, "ReasonCode");
        let reason = trail.note(self, "Reason");

        if !((ppp_fail && status_error) || err_code || reason_code || reason) {
            return None;
        }

        for key in [
            "errApmCode",
            "errApmDescription",
            "errScCode",
            "errScDescription",
            "ExErrCode",
            "message",
        ] {
            trail.note(self, key);
        }
        Some(trail.join())
    }

    fn declined_comment(&self) -> Option<String> {
        let mut trail = Trail::default();
        if !(trail.expect(self, "ppp_status", "FAIL", true)
            && trail.expect(self, "Status", "DECLINED", true))
        {
            return None;
        }

        for key in [
            "errApmCode",
            "errApmDescription",
            "errScCode",
            "errScDescription",
            "message",
        ] {
            trail.note(self, key);
        }
        Some(trail.join())
    }

    /// A decline the APM attributes to the user walking away, or one that
    /// carries no APM or extended error code at all.
    fn is_cancelled_by_user(&self) -> bool {
        let eq = |key: &str, value: &str| self.get(key).is_some_and(|v| v.eq_ignore_ascii_case(value));
        let eq_or_absent = |key: &str, value: &str| self.get(key).map_or(true, |v| v.eq_ignore_ascii_case(value));
        let zero_or_absent = |key: &str| self.get(key).map_or(true, |v| v == "0");

        (eq("errApmDescription", "User Cancelation")
            && eq_or_absent("errScDescription", "Default")
            && eq_or_absent("errScCode", "9999"))
            || (zero_or_absent("errApmCode") && zero_or_absent("ExErrCode"))
    }
}

/// Comma-joined diagnostic fragments.
#[derive(Debug, Default)]
struct Trail(Vec<String>);

impl Trail {
    fn push(&mut self, fragment: String) {
        self.0.push(fragment);
    }

    fn join(&self) -> String {
        self.0.join(", ")
    }

    fn expect(
        &mut self,
        n: &PaymentNotification,
        key: &str,
        expected: &str,
        ignore_case: bool,
    ) -> bool {
        match n.get(key) {
            None => {
                self.push(format!("missing {}", key));
                false
            }
            Some(value) => {
                let matches = if ignore_case {
                    value.eq_ignore_ascii_case(expected)
                } else {
                    value == expected
                };
                if !matches {
                    self.push(format!("wrong {}={}", key, value));
                }
                matches
            }
        }
    }

    fn is_zero_or_absent(&mut self, n: &PaymentNotification, key: &str) -> bool {
        match n.get(key) {
            None | Some("0") => true,
            Some(value) => {
                self.push(format!("{}={}", key, value));
                false
            }
        }
    }

    /// Records `key=value` when present; reports whether it was.
    fn note(&mut self, n: &PaymentNotification, key: &str) -> bool {
        match n.get(key) {
            Some(value) => {
                self.push(format!("{}={}", key, value));
                true
            }
            None => false,
        }
    }
}
