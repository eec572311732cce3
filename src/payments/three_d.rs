//! 3-D Secure state of a deposit
//!
//! The gateway echoes 3DS parameters on every card response. They are decoded
//! here once, so flow logic works with flags instead of vendor sentinels
//! (`"1"`, `"Y"`, `"true"`).

use crate::payments::merge::{non_blank, MergePolicy};
use crate::payments::types::ThreeDEcho;
use serde::Serialize;

pub const DEFAULT_THREE_D_VERSION: &str = "2.1.0";

/// Authentication result reported by the directory server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AuthenticationResult {
    /// `Y`
    Authenticated,
    /// `A`
    Attempted,
    /// `C`
    ChallengeRequired,
    /// `D`
    DecoupledChallenge,
    Other(String),
}

impl AuthenticationResult {
    fn from_vendor(value: Option<&str>) -> Option<Self> {
        let value = non_blank(value)?;
        Some(match value.to_ascii_uppercase().as_str() {
            "Y" => AuthenticationResult::Authenticated,
            "A" => AuthenticationResult::Attempted,
            "C" => AuthenticationResult::ChallengeRequired,
            "D" => AuthenticationResult::DecoupledChallenge,
            _ => AuthenticationResult::Other(value.to_string()),
        })
    }

    fn requires_challenge(&self) -> bool {
        matches!(
            self,
            AuthenticationResult::ChallengeRequired | AuthenticationResult::DecoupledChallenge
        )
    }
}

fn flag(value: Option<&str>, truthy: &[&str]) -> Option<bool> {
    non_blank(value).map(|v| truthy.iter().any(|t| v.eq_ignore_ascii_case(t)))
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreeDState {
    pub version: Option<String>,
    pub v2_supported: bool,
    pub method_url: Option<String>,
    pub method_payload: Option<String>,
    pub server_trans_id: Option<String>,
    pub ds_trans_id: Option<String>,
    pub acs_url: Option<String>,
    #[serde(skip)]
    pub c_req: Option<String>,
    pub challenge_mandated: bool,
    /// `threeDFlow == 1`: the issuer runs the challenge in a browser redirect.
    pub redirect_flow: bool,
    pub reason: Option<String>,
    pub reason_id: i64,
    pub liability_on_issuer: bool,
    pub result: Option<AuthenticationResult>,
    pub eci: Option<u8>,
    #[serde(skip)]
    pub cavv: Option<String>,
    pub white_list_status: Option<String>,
    pub authentication_type: Option<String>,
    pub flow: Option<String>,
    pub acquirer_challenge_requested: bool,
    pub decision_reason: Option<String>,
}

impl Default for ThreeDState {
    fn default() -> Self {
        Self {
            version: Some(DEFAULT_THREE_D_VERSION.to_string()),
            v2_supported: true,
            method_url: None,
            method_payload: None,
            server_trans_id: None,
            ds_trans_id: None,
            acs_url: None,
            c_req: None,
            challenge_mandated: false,
            redirect_flow: false,
            reason: None,
            reason_id: 0,
            liability_on_issuer: false,
            result: None,
            eci: None,
            cavv: None,
            white_list_status: None,
            authentication_type: None,
            flow: None,
            acquirer_challenge_requested: false,
            decision_reason: None,
        }
    }
}

impl ThreeDState {
    /// Folds a response echo into the state. Absent fields leave the current
    /// values untouched.
    pub fn absorb(&mut self, echo: &ThreeDEcho) {
        let overwrite = MergePolicy::Overwrite;
        let inferred_v2 = Self::implies_v2(echo);
        if inferred_v2 {
            self.v2_supported = true;
        } else if let Some(v2) = flag(echo.v2supported.as_deref(), &["true", "1", "y"]) {
            self.v2_supported = v2;
        }
        let server_policy = if inferred_v2 {
            MergePolicy::Overwrite
        } else {
            MergePolicy::KeepIfAbsent
        };
        server_policy.apply(&mut self.server_trans_id, echo.server_trans_id.as_deref());

        overwrite.apply(&mut self.version, echo.version.as_deref());
        overwrite.apply(&mut self.method_url, echo.method_url.as_deref());
        overwrite.apply(&mut self.method_payload, echo.method_payload.as_deref());
        overwrite.apply(&mut self.ds_trans_id, echo.ds_trans_id.as_deref());
        overwrite.apply(&mut self.acs_url, echo.acs_url.as_deref());
        overwrite.apply(&mut self.c_req, echo.c_req.as_deref());
        if let Some(mandated) = flag(echo.acs_challenge_mandated.as_deref(), &["y"]) {
            self.challenge_mandated = mandated;
        }
        if let Some(redirect) = flag(echo.three_d_flow.as_deref(), &["1"]) {
            self.redirect_flow = redirect;
        }
        overwrite.apply(&mut self.reason, echo.three_d_reason.as_deref());
        if let Some(id) = non_blank(echo.three_d_reason_id.as_deref()).and_then(|v| v.parse().ok()) {
            self.reason_id = id;
        }
        if let Some(liability) = flag(echo.is_liability_on_issuer.as_deref(), &["1", "true"]) {
            self.liability_on_issuer = liability;
        }
        if let Some(result) = AuthenticationResult::from_vendor(echo.result.as_deref()) {
            self.result = Some(result);
        }
        if let Some(eci) = non_blank(echo.eci.as_deref()).and_then(|v| v.parse().ok()) {
            self.eci = Some(eci);
        }
        overwrite.apply(&mut self.cavv, echo.cavv.as_deref());
        overwrite.apply(&mut self.white_list_status, echo.white_list_status.as_deref());
        overwrite.apply(&mut self.authentication_type, echo.authentication_type.as_deref());
        overwrite.apply(&mut self.flow, echo.flow.as_deref());
        if let Some(requested) = flag(echo.acquirer_decision.as_deref(), &["ChallengeRequest"]) {
            self.acquirer_challenge_requested = requested;
        }
        overwrite.apply(&mut self.decision_reason, echo.decision_reason.as_deref());
    }

    /// Any first- or final-call 3DS parameter means the card went through v2.
    fn implies_v2(echo: &ThreeDEcho) -> bool {
        let starts = |value: &Option<String>, prefixes: &[&str]| {
            non_blank(value.as_deref()).is_some_and(|v| {
                let v = v.to_ascii_lowercase();
                prefixes.iter().any(|p| v.starts_with(&p.to_ascii_lowercase()))
            })
        };

        (non_blank(echo.acs_url.as_deref()).is_some() && non_blank(echo.c_req.as_deref()).is_some())
            || starts(&echo.v2supported, &["true"])
            || non_blank(echo.eci.as_deref())
                .and_then(|v| v.parse::<u32>().ok())
                .is_some_and(|eci| eci > 0)
            || starts(&echo.acs_challenge_mandated, &["Y"])
            || starts(&echo.three_d_flow, &["1"])
            || starts(&echo.is_liability_on_issuer, &["1"])
            || starts(&echo.flow, &["challenge", "frictionless"])
            || starts(&echo.acquirer_decision, &["ChallengeRequest"])
            || starts(&echo.result, &["Y", "C", "D"])
    }

    /// Marks the state as a v2 challenge whose result arrived out of band,
    /// as happens when a deposit is resumed from a browser callback.
    pub fn resume_challenge(&mut self, server_trans_id: Option<&str>) {
        MergePolicy::KeepIfAbsent.apply(&mut self.server_trans_id, server_trans_id);
        self.v2_supported = true;
        self.redirect_flow = true;
    }

    pub fn is_challenged(&self, has_valid_cres: bool) -> bool {
        if has_valid_cres {
            return true;
        }
        if !self.v2_supported {
            return false;
        }

        (self.acs_url.is_some() && self.c_req.is_some())
            || self.redirect_flow
            || self.challenge_mandated
            || self
                .flow
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case("challenge"))
            || self.acquirer_challenge_requested
            || self
                .result
                .as_ref()
                .is_some_and(AuthenticationResult::requires_challenge)
    }

    /// Builds the browser redirect for a pure-redirect challenge:
    /// `<prefix>?acsUrl=<acs>&creq=<creq>`, or `<acs>?creq=<creq>` without a
    /// prefix. Returns `None` when the flow is not a redirect or a part is missing.
    pub fn build_redirect_url(&self, acs_prefix: Option<&str>) -> Option<String> {
        if !self.redirect_flow {
            return None;
        }
        let acs_url = self.acs_url.as_deref()?;
        let c_req = self.c_req.as_deref()?;

        let mut url = match non_blank(acs_prefix) {
            Some(prefix) => format!("{}?acsUrl={}", prefix, acs_url),
            None => acs_url.to_string(),
        };
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str("creq=");
        url.push_str(c_req);
        Some(url)
    }

    /// Reason text worth appending to a session's error reason.
    pub fn reason_text(&self) -> Option<String> {
        match (self.reason.as_deref(), self.reason_id) {
            (Some(reason), 0) => Some(format!("3DS Reason: {}", reason)),
            (Some(reason), id) => Some(format!("3DS Reason: {} ({})", reason, id)),
            (None, 0) => None,
            (None, id) => Some(format!("3DS Reason Id: {}", id)),
        }
    }

    pub fn has_failure_reason(&self) -> bool {
        self.reason.is_some() || self.reason_id != 0
    }

    pub fn clear_reason(&mut self) {
        self.reason = None;
        self.reason_id = 0;
    }

    /// Informational flow and authentication descriptor, for example
    /// `CHALLENGE-SUCCESSFUL-LiabilityOnIssuer`.
    pub fn describe(&self, approved: bool, challenge_result_approved: bool) -> Option<String> {
        let flow = match non_blank(self.flow.as_deref()) {
            Some(flow) => Some(flow.to_ascii_uppercase()),
            None if challenge_result_approved => Some("CHALLENGE".to_string()),
            None if self.redirect_flow && approved => Some("CHALLENGE".to_string()),
            None if self.redirect_flow => Some("REDIRECT".to_string()),
            None => None,
        };

        let Some(eci) = self.eci else {
            return flow;
        };

        let mut authentication = match eci {
            2 | 5 => Some("SUCCESSFUL"),
            1 | 6 => Some("ATTEMPTED"),
            0 | 7 => Some("NOT_PERMITTED"),
            _ => None,
        };
        match self.result {
            Some(AuthenticationResult::Authenticated) => authentication = Some("SUCCESSFUL"),
            Some(AuthenticationResult::Attempted) => authentication = Some("ATTEMPTED"),
            _ => {}
        }

        let mut parts: Vec<String> = flow.into_iter().collect();
        parts.extend(authentication.map(str::to_string));
        if self.liability_on_issuer {
            parts.push("LiabilityOnIssuer".to_string());
        }
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("-"))
    }
}
