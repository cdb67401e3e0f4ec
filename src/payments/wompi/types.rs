//! Wompi request and response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Every Wompi response wraps its payload in `data`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Merchant {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub public_key: Option<String>,
    pub presigned_acceptance: PresignedAcceptance,
    pub presigned_personal_data_auth: PresignedAcceptance,
}

/// Acceptance token plus the document the customer is consenting to.
#[derive(Clone, Debug, Deserialize)]
pub struct PresignedAcceptance {
    pub acceptance_token: String,
    pub permalink: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub cvc: String,
    pub exp_month: String,
    pub exp_year: String,
    pub card_holder: String,
}

impl CardDetails {
    /// Same card with the number's grouping whitespace stripped and the other
    /// fields trimmed, as the tokenization endpoint expects.
    pub fn normalized(&self) -> Self {
        Self {
            number: self.number.chars().filter(|c| !c.is_whitespace()).collect(),
            cvc: self.cvc.trim().to_string(),
            exp_month: self.exp_month.trim().to_string(),
            exp_year: self.exp_year.trim().to_string(),
            card_holder: self.card_holder.trim().to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CardToken {
    pub id: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last_four: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialInstitution {
    pub financial_institution_code: String,
    pub financial_institution_name: String,
}

/// PSE person type; Wompi expects the numeric code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PseUserType { Natural, Juridical }

impl Serialize for PseUserType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(match self { Self::Natural => 0, Self::Juridical => 1 })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card { token: String, installments: u8 },
    BancolombiaTransfer { user_type: String, payment_description: String },
    Pse {
        user_type: PseUserType,
        user_legal_id_type: String,
        user_legal_id: String,
        financial_institution_code: String,
        payment_description: String,
    },
    Nequi { phone_number: String },
}

impl PaymentMethod {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Card { .. } => "CARD",
            Self::BancolombiaTransfer { .. } => "BANCOLOMBIA_TRANSFER",
            Self::Pse { .. } => "PSE",
            Self::Nequi { .. } => "NEQUI",
        }
    }

    pub fn is_async_redirect(&self) -> bool { matches!(self, Self::BancolombiaTransfer { .. }) }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomerData {
    pub phone_number: String,
    pub full_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransactionRequest {
    pub acceptance_token: String,
    pub accept_personal_auth: String,
    pub amount_in_cents: i64,
    pub currency: String,
    pub signature: String,
    pub customer_email: String,
    pub reference: String,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_data: Option<CustomerData>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Approved,
    Declined,
    Voided,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentMethodExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_payment_url: Option<String>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Payment method as echoed back on a transaction.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionPaymentMethod {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub extra: Option<PaymentMethodExtra>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub status: TransactionStatus,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub amount_in_cents: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub payment_method_type: Option<String>,
    #[serde(default)]
    pub payment_method: TransactionPaymentMethod,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn async_payment_url(&self) -> Option<&str> {
        self.payment_method.extra.as_ref()?.async_payment_url.as_deref().filter(|url| !url.is_empty())
    }
}
