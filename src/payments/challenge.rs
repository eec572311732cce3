//! 3DS challenge result (CRes) decoding and validation
//!
//! The ACS redirects the cardholder's browser back with a `cres` form field:
//! base64 JSON, sometimes URL-encoded and sometimes missing its padding.

use crate::error::{GatewayError, GatewayResult};
use crate::payments::merge::non_blank;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

const CRES_MESSAGE_TYPE: &str = "CRes";

/// Recovery variants tried in order; the first one that yields JSON wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeStrategy {
    Raw,
    UrlDecoded,
    Padded(usize),
}

const DECODE_STRATEGIES: [DecodeStrategy; 4] = [
    DecodeStrategy::Raw,
    DecodeStrategy::UrlDecoded,
    DecodeStrategy::Padded(1),
    DecodeStrategy::Padded(2),
];

impl DecodeStrategy {
    fn candidate(self, encoded: &str) -> Option<String> {
        match self {
            DecodeStrategy::Raw => Some(encoded.to_string()),
            DecodeStrategy::UrlDecoded => urlencoding::decode(encoded).ok().map(|s| s.into_owned()),
            DecodeStrategy::Padded(n) => urlencoding::decode(encoded)
                .ok()
                .map(|s| format!("{}{}", s, "=".repeat(n))),
        }
    }
}

/// Transaction status carried by a challenge result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChallengeStatus {
    /// `Y`
    Authenticated,
    /// `A`
    Attempted,
    /// `N`
    NotAuthenticated,
    /// `U`
    Unavailable,
    /// `R`
    Rejected,
    Other(String),
    Missing,
}

impl ChallengeStatus {
    fn from_vendor(value: Option<&str>) -> Self {
        match non_blank(value).map(str::to_ascii_uppercase).as_deref() {
            None => ChallengeStatus::Missing,
            Some("Y") => ChallengeStatus::Authenticated,
            Some("A") => ChallengeStatus::Attempted,
            Some("N") => ChallengeStatus::NotAuthenticated,
            Some("U") => ChallengeStatus::Unavailable,
            Some("R") => ChallengeStatus::Rejected,
            Some(other) => ChallengeStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChallengeError {
    pub message_type: Option<String>,
    pub component: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CresPayload {
    #[serde(default, rename = "threeDSServerTransID")]
    three_ds_server_trans_id: Option<String>,
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    message_version: Option<String>,
    #[serde(default)]
    trans_status: Option<String>,
    #[serde(default, rename = "acsTransID")]
    acs_trans_id: Option<String>,
    #[serde(default, rename = "dsTransID")]
    ds_trans_id: Option<String>,
    #[serde(default)]
    challenge_completion_ind: Option<String>,
    #[serde(default)]
    error_message_type: Option<String>,
    #[serde(default)]
    error_component: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_detail: Option<String>,
}

/// Decoded browser-redirected 3DS outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeResult {
    pub server_trans_id: Option<String>,
    pub message_type: Option<String>,
    pub message_version: Option<String>,
    pub status: ChallengeStatus,
    pub challenge_completed: bool,
    pub acs_trans_id: Option<String>,
    pub ds_trans_id: Option<String>,
    pub error: Option<ChallengeError>,
}

impl ChallengeResult {
    /// Extracts and decodes the `cres` field of a callback form body.
    ///
    /// The value is taken verbatim (not form-decoded) so that `+` in the
    /// base64 alphabet survives; URL-decoding is one of the recovery variants.
    pub fn from_form_body(body: &str) -> GatewayResult<Self> {
        let encoded = body
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("cres"))
            .map(|(_, value)| value.trim())
            .ok_or_else(|| GatewayError::decode("callback body has no cres field"))?;

        Self::decode(encoded)
    }

    /// Decodes a base64 `cres` value, trying each recovery variant in turn.
    pub fn decode(encoded: &str) -> GatewayResult<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(GatewayError::decode("cres is empty"));
        }

        for strategy in DECODE_STRATEGIES {
            let Some(candidate) = strategy.candidate(encoded) else {
                continue;
            };
            for engine in [&STANDARD, &URL_SAFE] {
                let Ok(bytes) = engine.decode(candidate.as_bytes()) else {
                    continue;
                };
                match serde_json::from_slice::<CresPayload>(&bytes) {
                    Ok(payload) => {
                        debug!("cres decoded with strategy {:?}", strategy);
                        return Ok(Self::from_payload(payload));
                    }
                    Err(e) => debug!("cres strategy {:?} produced invalid JSON: {}", strategy, e),
                }
            }
        }

        Err(GatewayError::decode(
            "cres is not base64 JSON under any recovery variant",
        ))
    }

    fn from_payload(payload: CresPayload) -> Self {
        let error = [
            &payload.error_message_type,
            &payload.error_component,
            &payload.error_code,
            &payload.error_description,
            &payload.error_detail,
        ]
        .iter()
        .any(|field| non_blank(field.as_deref()).is_some())
        .then(|| ChallengeError {
            message_type: payload.error_message_type.clone(),
            component: payload.error_component.clone(),
            code: payload.error_code.clone(),
            description: payload.error_description.clone(),
            detail: payload.error_detail.clone(),
        });

        Self {
            challenge_completed: non_blank(payload.challenge_completion_ind.as_deref())
                .is_some_and(|v| v.eq_ignore_ascii_case("Y")),
            status: ChallengeStatus::from_vendor(payload.trans_status.as_deref()),
            server_trans_id: payload.three_ds_server_trans_id,
            message_type: payload.message_type,
            message_version: payload.message_version,
            acs_trans_id: payload.acs_trans_id,
            ds_trans_id: payload.ds_trans_id,
            error,
        }
    }

    /// Checks the message type and, when an expected server transaction id is
    /// known and not waived, that it matches. Returns the rejection reason.
    pub fn validate(
        &self,
        expected_server_trans_id: Option<&str>,
        ignore_trans_id: bool,
    ) -> Result<(), String> {
        let is_cres = non_blank(self.message_type.as_deref())
            .is_some_and(|t| t.eq_ignore_ascii_case(CRES_MESSAGE_TYPE));
        if !is_cres {
            return Err(format!(
                "CRes wrong messageType={}",
                self.message_type.as_deref().unwrap_or_default()
            ));
        }

        if let Some(expected) = non_blank(expected_server_trans_id) {
            if !ignore_trans_id && self.server_trans_id.as_deref() != Some(expected) {
                return Err(format!(
                    "CRes wrong threeDSServerTransID={}",
                    self.server_trans_id.as_deref().unwrap_or_default()
                ));
            }
        }

        Ok(())
    }

    pub fn is_valid(&self, expected_server_trans_id: Option<&str>, ignore_trans_id: bool) -> bool {
        self.validate(expected_server_trans_id, ignore_trans_id).is_ok()
    }

    /// `Y`, or `A` when attempted authentication is accepted.
    pub fn is_approved(
        &self,
        expected_server_trans_id: Option<&str>,
        ignore_trans_id: bool,
        accept_attempted: bool,
    ) -> bool {
        self.is_valid(expected_server_trans_id, ignore_trans_id)
            && match self.status {
                ChallengeStatus::Authenticated => true,
                ChallengeStatus::Attempted => accept_attempted,
                _ => false,
            }
    }

    /// `N` with the challenge marked completed: the cardholder cancelled.
    pub fn is_cancelled(&self, expected_server_trans_id: Option<&str>, ignore_trans_id: bool) -> bool {
        self.is_valid(expected_server_trans_id, ignore_trans_id)
            && self.status == ChallengeStatus::NotAuthenticated
            && self.challenge_completed
    }
}
