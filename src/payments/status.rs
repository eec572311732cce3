//! Session status lattice and vendor status decoding
//!
//! Every vendor status string is decoded into one of these enums exactly once,
//! when a gateway response is absorbed by a session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a payment session.
///
/// `Success` and `Redirect` are non-terminal. `Approved`, `Declined` and
/// `Voided` are terminal business outcomes. `Error` and `Exception` are
/// terminal failures that still permit one reconciling status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    NotInit,
    Success,
    Redirect,
    Approved,
    Declined,
    Voided,
    Error,
    Exception,
}

impl Status {
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            Status::Error | Status::Exception | Status::Declined | Status::Voided
        )
    }

    pub fn is_successful(self) -> bool {
        matches!(self, Status::Success | Status::Approved | Status::Redirect)
    }

    /// Status a session lands in when a response reports `next`.
    ///
    /// Declined and Voided are final; an approval is never downgraded by a
    /// later non-terminal envelope.
    pub fn advance(self, next: Status) -> Status {
        match (self, next) {
            (Status::Declined | Status::Voided, _) => self,
            (Status::Approved, Status::Success | Status::Redirect | Status::NotInit) => self,
            _ => next,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::NotInit => "NotInit",
            Status::Success => "Success",
            Status::Redirect => "Redirect",
            Status::Approved => "Approved",
            Status::Declined => "Declined",
            Status::Voided => "Voided",
            Status::Error => "Error",
            Status::Exception => "Exception",
        };
        f.write_str(label)
    }
}

/// Response envelope status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvelopeStatus {
    Success,
    Approved,
    Redirect,
    Declined,
    #[default]
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EnvelopeStatus::Success => "SUCCESS",
            EnvelopeStatus::Approved => "APPROVED",
            EnvelopeStatus::Redirect => "REDIRECT",
            EnvelopeStatus::Declined => "DECLINED",
            EnvelopeStatus::Error => "ERROR",
            EnvelopeStatus::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Per-transaction status. Anything unrecognised decodes to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Approved,
    Declined,
    Redirect,
    Error,
}

impl TransactionStatus {
    pub fn from_vendor(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_uppercase()).as_deref() {
            Some("APPROVED") => TransactionStatus::Approved,
            Some("DECLINED") => TransactionStatus::Declined,
            Some("REDIRECT") => TransactionStatus::Redirect,
            _ => TransactionStatus::Error,
        }
    }
}

/// Kind of charge the gateway booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Auth,
    Auth3D,
    Sale,
    Other(String),
}

impl TransactionType {
    pub fn from_vendor(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(match value.to_ascii_lowercase().as_str() {
            "auth" => TransactionType::Auth,
            "auth3d" => TransactionType::Auth3D,
            "sale" => TransactionType::Sale,
            _ => TransactionType::Other(value.to_string()),
        })
    }

    /// Auth or Sale, the two types that move (or reserve) funds.
    pub fn is_charge(&self) -> bool {
        matches!(self, TransactionType::Auth | TransactionType::Sale)
    }
}

/// Fraud engine verdict attached to a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FraudDecision {
    Accept,
    Reject,
    Review,
    Other(String),
}

impl FraudDecision {
    pub fn from_vendor(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let lower = value.to_ascii_lowercase();
        Some(if lower == "accept" {
            FraudDecision::Accept
        } else if lower.contains("reject") {
            FraudDecision::Reject
        } else if lower == "review" {
            FraudDecision::Review
        } else {
            FraudDecision::Other(value.to_string())
        })
    }
}

/// Envelope `errorType`, decoded once.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorType {
    #[default]
    NoError,
    SessionExpired,
    Other(String),
}

impl ErrorType {
    pub fn from_vendor(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return ErrorType::NoError;
        };
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "0" | "noerror" => ErrorType::NoError,
            "sessionexpired" => ErrorType::SessionExpired,
            _ => ErrorType::Other(value.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, ErrorType::NoError)
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::NoError => f.write_str("NoError"),
            ErrorType::SessionExpired => f.write_str("SessionExpired"),
            ErrorType::Other(value) => f.write_str(value),
        }
    }
}

/// Direction of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayType {
    Deposit,
    Withdrawal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_outcomes_are_sticky() {
        assert_eq!(Status::Declined.advance(Status::Success), Status::Declined);
        assert_eq!(Status::Voided.advance(Status::Approved), Status::Voided);
        assert_eq!(Status::Approved.advance(Status::Success), Status::Approved);
        assert_eq!(Status::Approved.advance(Status::Redirect), Status::Approved);
    }

    #[test]
    fn test_failures_can_be_reconciled() {
        assert_eq!(Status::Exception.advance(Status::Success), Status::Success);
        assert_eq!(Status::Error.advance(Status::Approved), Status::Approved);
        assert_eq!(Status::Redirect.advance(Status::Success), Status::Success);
    }

    #[test]
    fn test_vendor_decoding() {
        assert_eq!(
            TransactionStatus::from_vendor(Some(" approved ")),
            TransactionStatus::Approved
        );
        assert_eq!(
            TransactionStatus::from_vendor(Some("PENDING")),
            TransactionStatus::Error
        );
        assert_eq!(TransactionStatus::from_vendor(None), TransactionStatus::Error);
        assert_eq!(TransactionType::from_vendor("Auth3D"), Some(TransactionType::Auth3D));
        assert_eq!(TransactionType::from_vendor(""), None);
        assert_eq!(
            FraudDecision::from_vendor("Reject - custom rule"),
            Some(FraudDecision::Reject)
        );
    }

    #[test]
    fn test_error_type_decoding() {
        assert_eq!(ErrorType::from_vendor(None), ErrorType::NoError);
        assert_eq!(ErrorType::from_vendor(Some("0")), ErrorType::NoError);
        assert_eq!(
            ErrorType::from_vendor(Some("SESSION_EXPIRED")),
            ErrorType::SessionExpired
        );
        assert!(ErrorType::from_vendor(Some("INVALID_CHECKSUM")).is_error());
    }

    #[test]
    fn test_envelope_status_deserializes_unknown_values() {
        let status: EnvelopeStatus = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(status, EnvelopeStatus::Unknown);
        let status: EnvelopeStatus = serde_json::from_str("\"SUCCESS\"").unwrap();
        assert_eq!(status, EnvelopeStatus::Success);
    }
}
