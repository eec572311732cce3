//! Per-user payment method descriptor
//!
//! Holds the funding source a session pays with or pays out to, plus the
//! billing identity the gateway needs. Setters validate before accepting and
//! never replace a present value with a blank one.

use crate::error::{GatewayError, GatewayResult};
use crate::payments::merge::{non_blank, MergePolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Key of the alternative-method bag that names the method.
pub const APM_NAME_KEY: &str = "paymentMethod";

/// CVV is three or four digits.
pub fn is_cvv_valid(cvv: Option<&str>) -> bool {
    static CVV: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = CVV.get_or_init(|| Regex::new(r"^\d{3,4}$").ok());
    match (pattern, cvv) {
        (Some(pattern), Some(cvv)) => pattern.is_match(cvv.trim()),
        _ => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingIdentity {
    pub first_name: String,
    pub last_name: String,
    pub country: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
}

/// Raw card data or a web-SDK temporary token.
#[derive(Debug, Clone, Default)]
pub struct CardData {
    pub holder_name: Option<String>,
    pub card_number: Option<String>,
    pub temp_token: Option<String>,
    pub expiration_year: Option<String>,
    pub expiration_month: Option<String>,
    pub cvv: Option<String>,
}

/// Normalised alternative-payment-method key/value bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeMethod {
    fields: BTreeMap<String, String>,
}

impl AlternativeMethod {
    /// Trims keys and values and drops blank entries.
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let fields = fields
            .into_iter()
            .filter_map(|(k, v)| {
                let key = k.as_ref().trim();
                let value = v.as_ref().trim();
                (!key.is_empty() && !value.is_empty()).then(|| (key.to_string(), value.to_string()))
            })
            .collect();
        Self { fields }
    }

    pub fn name(&self) -> Option<&str> {
        self.get(APM_NAME_KEY)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn is_init(&self) -> bool {
        self.name().is_some()
    }
}

/// 3DS challenge preference sent with the charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChallengePreference {
    #[default]
    NoPreference,
    ChallengeRequested,
    ExemptionRequested,
}

impl ChallengePreference {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ChallengePreference::ChallengeRequested,
            2 => ChallengePreference::ExemptionRequested,
            _ => ChallengePreference::NoPreference,
        }
    }

    pub fn as_vendor(self) -> Option<&'static str> {
        match self {
            ChallengePreference::ChallengeRequested => Some("01"),
            ChallengePreference::ExemptionRequested => Some("02"),
            ChallengePreference::NoPreference => None,
        }
    }
}

/// Which funding source a charge is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayBy {
    SavedOption,
    Card,
    Apm,
    TempToken,
}

#[derive(Debug, Clone)]
pub struct PaymentMethodDescriptor {
    user_token_id: String,
    billing: BillingIdentity,
    card: CardData,
    saved_option_id: Option<String>,
    saved_option_cvv: Option<String>,
    apm: Option<AlternativeMethod>,
    apm_submethod: Option<String>,
    masked_card_number: Option<String>,
    bin: Option<String>,
    card_brand: Option<String>,
    challenge_preference: ChallengePreference,
}

impl PaymentMethodDescriptor {
    pub fn new(user_token_id: &str, billing: BillingIdentity) -> GatewayResult<Self> {
        let user_token_id = user_token_id.trim();
        if !(5..=30).contains(&user_token_id.len()) {
            return Err(GatewayError::invalid_payment_method(format!(
                "user token id must be 5-30 characters, got {}",
                user_token_id.len()
            )));
        }

        let required = [
            ("first name", &billing.first_name),
            ("last name", &billing.last_name),
            ("country", &billing.country),
            ("email", &billing.email),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(GatewayError::invalid_payment_method(format!(
                "billing {} is required",
                field
            )));
        }

        Ok(Self {
            user_token_id: user_token_id.to_string(),
            billing,
            card: CardData::default(),
            saved_option_id: None,
            saved_option_cvv: None,
            apm: None,
            apm_submethod: None,
            masked_card_number: None,
            bin: None,
            card_brand: None,
            challenge_preference: ChallengePreference::NoPreference,
        })
    }

    pub fn with_challenge_preference(mut self, preference: ChallengePreference) -> Self {
        self.challenge_preference = preference;
        self
    }

    /// Card captured by the web SDK and exchanged for a temporary token.
    pub fn set_for_temp_token(&mut self, holder_name: &str, temp_token: &str, cvv: Option<&str>) -> bool {
        let cvv = cvv.filter(|c| is_cvv_valid(Some(*c)));
        self.card = CardData {
            holder_name: non_blank(Some(holder_name)).map(str::to_string),
            temp_token: non_blank(Some(temp_token)).map(str::to_string),
            cvv: cvv.map(|c| c.trim().to_string()),
            ..CardData::default()
        };
        self.is_ready_for_temp_token()
    }

    /// Raw card data. Rejected outright when the CVV is not valid.
    pub fn set_for_card(
        &mut self,
        holder_name: &str,
        card_number: &str,
        expiration_year: &str,
        expiration_month: &str,
        cvv: &str,
    ) -> bool {
        if !is_cvv_valid(Some(cvv)) {
            return false;
        }

        self.card = CardData {
            holder_name: non_blank(Some(holder_name)).map(str::to_string),
            card_number: non_blank(Some(card_number)).map(str::to_string),
            temp_token: None,
            expiration_year: non_blank(Some(expiration_year)).map(str::to_string),
            expiration_month: non_blank(Some(expiration_month)).map(str::to_string),
            cvv: Some(cvv.trim().to_string()),
        };
        self.is_ready_for_card()
    }

    /// Saved payment option from an earlier successful deposit. Deposits need
    /// a valid CVV; withdrawals do not.
    pub fn set_for_saved_option(
        &mut self,
        option_id: &str,
        cvv: Option<&str>,
        masked_card_number: Option<&str>,
        holder_name: Option<&str>,
        withdrawal: bool,
    ) -> bool {
        if non_blank(Some(option_id)).is_none() {
            return false;
        }
        if !withdrawal && !is_cvv_valid(cvv) {
            return false;
        }

        let cvv = cvv.filter(|c| is_cvv_valid(Some(*c)));
        MergePolicy::Overwrite.apply(&mut self.saved_option_id, Some(option_id));
        MergePolicy::Overwrite.apply(&mut self.saved_option_cvv, cvv);
        MergePolicy::Overwrite.apply(&mut self.card.cvv, cvv);
        MergePolicy::Overwrite.apply(&mut self.card.holder_name, holder_name);
        MergePolicy::Overwrite.apply(&mut self.masked_card_number, masked_card_number);

        self.is_ready_for_saved_option(withdrawal)
    }

    /// Extends the descriptor with what the gateway echoed about a stored card.
    pub fn extend_saved_option(
        &mut self,
        option_id: &str,
        masked_card_number: Option<&str>,
        expiration_year: Option<&str>,
        expiration_month: Option<&str>,
        bin: Option<&str>,
    ) -> bool {
        if non_blank(Some(option_id)).is_none() {
            return false;
        }

        MergePolicy::Overwrite.apply(&mut self.saved_option_id, Some(option_id));
        // Echoes carry either the masked number or just its last four digits.
        MergePolicy::KeepLonger.apply(&mut self.masked_card_number, masked_card_number);
        MergePolicy::Overwrite.apply(&mut self.bin, bin);
        let card_cvv = self.card.cvv.clone();
        MergePolicy::KeepIfAbsent.apply(&mut self.saved_option_cvv, card_cvv.as_deref());
        MergePolicy::Overwrite.apply(&mut self.card.expiration_year, expiration_year);
        MergePolicy::Overwrite.apply(&mut self.card.expiration_month, expiration_month);

        self.is_ready_for_saved_option(false)
    }

    /// Alternative payment method, optionally tied to a saved option id.
    pub fn set_for_apm(
        &mut self,
        apm: AlternativeMethod,
        submethod: Option<&str>,
        option_id: Option<&str>,
    ) -> bool {
        if apm.is_init() {
            self.apm = Some(apm);
        }
        MergePolicy::Overwrite.apply(&mut self.apm_submethod, submethod);
        MergePolicy::Overwrite.apply(&mut self.saved_option_id, option_id);
        self.is_ready_for_apm()
    }

    pub fn set_card_brand(&mut self, brand: Option<&str>) {
        MergePolicy::KeepIfAbsent.apply(&mut self.card_brand, brand);
    }

    pub(crate) fn clear_expiration(&mut self) {
        self.card.expiration_year = None;
        self.card.expiration_month = None;
    }

    pub fn is_ready_for_temp_token(&self) -> bool {
        self.card.holder_name.is_some() && self.card.temp_token.is_some() && self.card.cvv.is_some()
    }

    pub fn is_ready_for_card(&self) -> bool {
        self.card.holder_name.is_some()
            && self.card.card_number.is_some()
            && self.card.expiration_year.is_some()
            && self.card.expiration_month.is_some()
            && is_cvv_valid(self.card.cvv.as_deref())
    }

    pub fn is_ready_for_saved_option(&self, withdrawal: bool) -> bool {
        self.saved_option_id.is_some()
            && (withdrawal || is_cvv_valid(self.saved_option_cvv.as_deref()))
    }

    pub fn is_ready_for_apm(&self) -> bool {
        self.apm.as_ref().is_some_and(AlternativeMethod::is_init)
    }

    /// Funding source a deposit charge is built from, in order of preference.
    pub fn pay_in_method(&self) -> Option<PayBy> {
        if self.is_ready_for_saved_option(false) {
            Some(PayBy::SavedOption)
        } else if self.is_ready_for_card() {
            Some(PayBy::Card)
        } else if self.is_ready_for_apm() {
            Some(PayBy::Apm)
        } else if self.is_ready_for_temp_token() {
            Some(PayBy::TempToken)
        } else {
            None
        }
    }

    pub fn user_token_id(&self) -> &str {
        &self.user_token_id
    }

    pub fn billing(&self) -> &BillingIdentity {
        &self.billing
    }

    pub fn card(&self) -> &CardData {
        &self.card
    }

    pub fn saved_option_id(&self) -> Option<&str> {
        self.saved_option_id.as_deref()
    }

    pub fn saved_option_cvv(&self) -> Option<&str> {
        self.saved_option_cvv.as_deref()
    }

    pub fn apm(&self) -> Option<&AlternativeMethod> {
        self.apm.as_ref().filter(|apm| apm.is_init())
    }

    pub fn apm_name(&self) -> Option<&str> {
        self.apm().and_then(AlternativeMethod::name)
    }

    pub fn apm_submethod(&self) -> Option<&str> {
        self.apm_submethod.as_deref()
    }

    pub fn masked_card_number(&self) -> Option<&str> {
        self.masked_card_number.as_deref()
    }

    pub fn bin(&self) -> Option<&str> {
        self.bin.as_deref()
    }

    pub fn card_brand(&self) -> Option<&str> {
        self.card_brand.as_deref()
    }

    pub fn challenge_preference(&self) -> ChallengePreference {
        self.challenge_preference
    }
}
