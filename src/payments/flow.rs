//! Payment transaction flow.
//!
//! A validated [`PaymentForm`] becomes a Wompi [`TransactionRequest`] which is
//! submitted exactly once. Bank transfers then need an asynchronous redirect
//! URL that the processor only attaches some time after creation:
//!
//! ```text
//! Submitted ──► Polling ──► Resolved(url)
//!                 │  ▲
//!                 └──┘ up to max_attempts - 1 re-fetches
//!                 │
//!                 └──────► Exhausted (NoAsyncPaymentUrl)
//! ```
//!
//! Other rails return the processor response as-is.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::Money;
use crate::payments::retry::{poll_until, Polled, RetryPolicy, Sleeper, TokioSleeper};
use crate::payments::wompi::integrity_signature;
use crate::payments::wompi::types::{CardDetails, CustomerData, PaymentMethod, PseUserType, Transaction, TransactionRequest};
use crate::payments::PaymentGateway;
use crate::{Result, StorefrontError};

const MAX_DESCRIPTION_LEN: usize = 64;

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentForm {
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 3, max = 120))]
    pub full_name: String,
    #[validate(length(min = 7, max = 15))]
    pub phone_number: String,
    #[serde(default)]
    pub accept_terms: bool,
    #[serde(default)]
    pub accept_personal_data: bool,
    pub method: PaymentMethodForm,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethodForm {
    Card { card: CardDetails, installments: u8 },
    BancolombiaTransfer,
    Pse {
        user_type: PseUserType,
        user_legal_id_type: String,
        user_legal_id: String,
        financial_institution_code: String,
    },
    Nequi { phone_number: String },
}

impl PaymentForm {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if !self.accept_terms || !self.accept_personal_data { return Err(StorefrontError::ConsentRequired); }
        match &self.method {
            PaymentMethodForm::Card { card, installments } => {
                let digits = card.normalized().number;
                if !(13..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(StorefrontError::InvalidForm("card number".into()));
                }
                if !(1..=36).contains(installments) { return Err(StorefrontError::InvalidForm("installments".into())); }
            }
            PaymentMethodForm::Nequi { phone_number } => {
                if phone_number.len() != 10 || !phone_number.chars().all(|c| c.is_ascii_digit()) {
                    return Err(StorefrontError::InvalidForm("nequi phone number".into()));
                }
            }
            PaymentMethodForm::Pse { user_legal_id_type, user_legal_id, financial_institution_code, .. } => {
                if user_legal_id_type.trim().is_empty() || user_legal_id.trim().is_empty() || financial_institution_code.trim().is_empty() {
                    return Err(StorefrontError::InvalidForm("pse details".into()));
                }
            }
            PaymentMethodForm::BancolombiaTransfer => {}
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PaymentOutcome {
    pub reference: String,
    pub transaction: Transaction,
    pub redirect_url: Option<String>,
    /// Transaction inspections, the creation response included.
    pub attempts: u32,
}

pub struct CheckoutFlow<G, S = TokioSleeper> {
    gateway: G,
    sleeper: S,
    integrity_secret: String,
    redirect_url: Option<String>,
    policy: RetryPolicy,
}

impl<G: PaymentGateway> CheckoutFlow<G> {
    pub fn new(gateway: G, integrity_secret: impl Into<String>) -> Self {
        Self::with_sleeper(gateway, TokioSleeper, integrity_secret)
    }
}

impl<G: PaymentGateway, S: Sleeper> CheckoutFlow<G, S> {
    pub fn with_sleeper(gateway: G, sleeper: S, integrity_secret: impl Into<String>) -> Self {
        Self { gateway, sleeper, integrity_secret: integrity_secret.into(), redirect_url: None, policy: RetryPolicy::default() }
    }

    pub fn redirect_url(mut self, url: Option<String>) -> Self { self.redirect_url = url; self }
    pub fn policy(mut self, policy: RetryPolicy) -> Self { self.policy = policy; self }
    pub fn gateway(&self) -> &G { &self.gateway }

    /// Submits the payment and, for bank transfers, waits for the redirect URL.
    #[instrument(skip_all, fields(amount = %amount))]
    pub async fn pay(&self, form: &PaymentForm, amount: &Money, description: &str) -> Result<PaymentOutcome> {
        form.check()?;
        let amount_in_cents = amount.to_minor_units().map_err(|_| StorefrontError::InvalidAmount)?;
        if amount_in_cents <= 0 { return Err(StorefrontError::InvalidAmount); }

        let merchant = self.gateway.merchant().await?;
        let description: String = description.chars().take(MAX_DESCRIPTION_LEN).collect();
        let payment_method = match &form.method {
            PaymentMethodForm::Card { card, installments } => {
                let token = self.gateway.tokenize_card(&card.normalized()).await?;
                PaymentMethod::Card { token: token.id, installments: *installments }
            }
            PaymentMethodForm::BancolombiaTransfer => {
                PaymentMethod::BancolombiaTransfer { user_type: "PERSON".into(), payment_description: description }
            }
            PaymentMethodForm::Pse { user_type, user_legal_id_type, user_legal_id, financial_institution_code } => PaymentMethod::Pse {
                user_type: *user_type,
                user_legal_id_type: user_legal_id_type.clone(),
                user_legal_id: user_legal_id.clone(),
                financial_institution_code: financial_institution_code.clone(),
                payment_description: description,
            },
            PaymentMethodForm::Nequi { phone_number } => PaymentMethod::Nequi { phone_number: phone_number.clone() },
        };

        let reference = Uuid::new_v4().to_string();
        let request = TransactionRequest {
            acceptance_token: merchant.presigned_acceptance.acceptance_token,
            accept_personal_auth: merchant.presigned_personal_data_auth.acceptance_token,
            amount_in_cents,
            currency: amount.currency().to_string(),
            signature: integrity_signature(&reference, amount_in_cents, amount.currency(), &self.integrity_secret),
            customer_email: form.customer_email.clone(),
            reference: reference.clone(),
            payment_method,
            redirect_url: self.redirect_url.clone(),
            customer_data: Some(CustomerData { phone_number: form.phone_number.clone(), full_name: form.full_name.clone() }),
        };

        let transaction = self.gateway.create_transaction(&request).await?;
        info!(transaction_id = %transaction.id, status = ?transaction.status, method = request.payment_method.kind(), "Transaction submitted");

        if request.payment_method.is_async_redirect() {
            return self.resolve_async_url(reference, transaction).await;
        }
        let redirect_url = transaction.async_payment_url().map(str::to_owned);
        Ok(PaymentOutcome { reference, transaction, redirect_url, attempts: 1 })
    }

    async fn resolve_async_url(&self, reference: String, transaction: Transaction) -> Result<PaymentOutcome> {
        let gateway = &self.gateway;
        let transaction_id = transaction.id.clone();
        let id = transaction_id.as_str();
        let polled = poll_until(
            &self.policy,
            &self.sleeper,
            transaction,
            move || gateway.get_transaction(id),
            |tx| tx.async_payment_url().is_some(),
        )
        .await?;

        match polled {
            Polled::Resolved { item, attempts } => {
                let redirect_url = item.async_payment_url().map(str::to_owned);
                info!(transaction_id = %item.id, attempts, "Async payment URL resolved");
                Ok(PaymentOutcome { reference, transaction: item, redirect_url, attempts })
            }
            Polled::Exhausted { item, attempts } => {
                warn!(transaction_id = %item.id, attempts, "Transaction has no async payment URL");
                Err(StorefrontError::NoAsyncPaymentUrl { transaction_id: item.id, attempts })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::retry::tests::RecordingSleeper;
    use crate::payments::wompi::types::{
        CardToken, FinancialInstitution, Merchant, PaymentMethodExtra, PresignedAcceptance, TransactionPaymentMethod, TransactionStatus,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::time::Duration;

    /// Scripted processor: the async URL shows up on the `url_on_fetch`-th
    /// re-fetch (0 means already on the creation response).
    struct MockGateway {
        url_on_fetch: Option<usize>,
        fail_fetches: bool,
        fetches: Mutex<usize>,
        submitted: Mutex<Vec<TransactionRequest>>,
        tokenized: Mutex<Vec<String>>,
    }

    impl MockGateway {
        fn new(url_on_fetch: Option<usize>) -> Self {
            Self { url_on_fetch, fail_fetches: false, fetches: Mutex::new(0), submitted: Mutex::new(vec![]), tokenized: Mutex::new(vec![]) }
        }

        fn transaction(&self, with_url: bool) -> Transaction {
            let extra = with_url.then(|| PaymentMethodExtra { async_payment_url: Some("https://bank.example/redirect".into()), ..Default::default() });
            Transaction {
                id: "tx-42".into(), status: TransactionStatus::Pending,
                payment_method: TransactionPaymentMethod { kind: "BANCOLOMBIA_TRANSFER".into(), extra },
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn merchant(&self) -> Result<Merchant> {
            let acceptance = |token: &str| PresignedAcceptance { acceptance_token: token.into(), permalink: "https://terms".into(), kind: "END_USER_POLICY".into() };
            Ok(Merchant { id: 1, name: "Tienda".into(), public_key: None, presigned_acceptance: acceptance("acc"), presigned_personal_data_auth: acceptance("pda") })
        }
        async fn tokenize_card(&self, card: &CardDetails) -> Result<CardToken> {
            self.tokenized.lock().push(card.number.clone());
            Ok(CardToken { id: "tok_test_1".into(), brand: Some("VISA".into()), last_four: Some("4242".into()), expires_at: None })
        }
        async fn create_transaction(&self, request: &TransactionRequest) -> Result<Transaction> {
            self.submitted.lock().push(request.clone());
            Ok(self.transaction(self.url_on_fetch == Some(0)))
        }
        async fn get_transaction(&self, _id: &str) -> Result<Transaction> {
            if self.fail_fetches { return Err(StorefrontError::Provider { status: 503, body: "unavailable".into() }); }
            let fetch = {
                let mut fetches = self.fetches.lock();
                *fetches += 1;
                *fetches
            };
            Ok(self.transaction(self.url_on_fetch.is_some_and(|n| fetch >= n)))
        }
        async fn financial_institutions(&self) -> Result<Vec<FinancialInstitution>> { Ok(vec![]) }
    }

    fn form(method: PaymentMethodForm) -> PaymentForm {
        PaymentForm {
            customer_email: "ana@example.com".into(), full_name: "Ana Gómez".into(), phone_number: "3001234567".into(),
            accept_terms: true, accept_personal_data: true, method,
        }
    }

    fn flow(gateway: MockGateway) -> CheckoutFlow<MockGateway, RecordingSleeper> {
        CheckoutFlow::with_sleeper(gateway, RecordingSleeper::default(), "test_integrity")
    }

    fn amount() -> Money { Money::cop(Decimal::new(159_900, 0)) }

    #[tokio::test]
    async fn test_transfer_resolves_on_fifth_inspection() {
        let flow = flow(MockGateway::new(Some(4)));
        let outcome = flow.pay(&form(PaymentMethodForm::BancolombiaTransfer), &amount(), "Pedido").await.unwrap();
        assert_eq!(outcome.redirect_url.as_deref(), Some("https://bank.example/redirect"));
        assert_eq!(outcome.attempts, 5);
        assert_eq!(*flow.gateway().fetches.lock(), 4);
        assert_eq!(*flow.sleeper.slept.lock(), vec![Duration::from_secs(1); 4]);
    }

    #[tokio::test]
    async fn test_transfer_exhausts_after_five_inspections() {
        let flow = flow(MockGateway::new(None));
        let err = flow.pay(&form(PaymentMethodForm::BancolombiaTransfer), &amount(), "Pedido").await.unwrap_err();
        assert_eq!(err.to_string(), "Transaction has no async payment URL");
        assert!(matches!(err, StorefrontError::NoAsyncPaymentUrl { attempts: 5, .. }));
        assert_eq!(*flow.gateway().fetches.lock(), 4);
        assert_eq!(flow.gateway().submitted.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_with_url_on_creation_does_not_poll() {
        let flow = flow(MockGateway::new(Some(0)));
        let outcome = flow.pay(&form(PaymentMethodForm::BancolombiaTransfer), &amount(), "Pedido").await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(*flow.gateway().fetches.lock(), 0);
        assert!(flow.sleeper.slept.lock().is_empty());
    }

    #[tokio::test]
    async fn test_poll_errors_propagate() {
        let mut gateway = MockGateway::new(None);
        gateway.fail_fetches = true;
        let flow = flow(gateway);
        let err = flow.pay(&form(PaymentMethodForm::BancolombiaTransfer), &amount(), "Pedido").await.unwrap_err();
        assert!(matches!(err, StorefrontError::Provider { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_card_is_tokenized_and_signed() {
        let card = CardDetails {
            number: " 4242 4242\t4242 4242 ".into(), cvc: "123".into(), exp_month: "08".into(), exp_year: "28".into(), card_holder: "Ana Gomez".into(),
        };
        let flow = flow(MockGateway::new(None)).redirect_url(Some("https://tienda.example/gracias".into()));
        let outcome = flow.pay(&form(PaymentMethodForm::Card { card, installments: 3 }), &amount(), "Pedido").await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.redirect_url, None);
        assert_eq!(*flow.gateway().tokenized.lock(), vec!["4242424242424242".to_string()]);
        assert_eq!(*flow.gateway().fetches.lock(), 0);

        let submitted = flow.gateway().submitted.lock();
        let request = &submitted[0];
        assert_eq!(request.payment_method, PaymentMethod::Card { token: "tok_test_1".into(), installments: 3 });
        assert_eq!(request.amount_in_cents, 15_990_000);
        assert_eq!(request.acceptance_token, "acc");
        assert_eq!(request.accept_personal_auth, "pda");
        assert_eq!(request.reference, outcome.reference);
        assert_eq!(request.signature, integrity_signature(&request.reference, 15_990_000, "COP", "test_integrity"));
        assert_eq!(request.redirect_url.as_deref(), Some("https://tienda.example/gracias"));
    }

    #[tokio::test]
    async fn test_pse_description_is_truncated() {
        let method = PaymentMethodForm::Pse {
            user_type: PseUserType::Natural, user_legal_id_type: "CC".into(), user_legal_id: "1099888777".into(), financial_institution_code: "1".into(),
        };
        let flow = flow(MockGateway::new(None));
        flow.pay(&form(method), &amount(), &"x".repeat(100)).await.unwrap();
        match &flow.gateway().submitted.lock()[0].payment_method {
            PaymentMethod::Pse { payment_description, .. } => assert_eq!(payment_description.len(), 64),
            other => panic!("unexpected method {other:?}"),
        }
        assert_eq!(*flow.gateway().fetches.lock(), 0);
    }

    #[tokio::test]
    async fn test_rejected_forms_never_reach_the_gateway() {
        let flow = flow(MockGateway::new(None));
        let mut no_consent = form(PaymentMethodForm::Nequi { phone_number: "3001234567".into() });
        no_consent.accept_personal_data = false;
        assert!(matches!(flow.pay(&no_consent, &amount(), "Pedido").await, Err(StorefrontError::ConsentRequired)));

        let mut bad_email = form(PaymentMethodForm::Nequi { phone_number: "3001234567".into() });
        bad_email.customer_email = "not-an-email".into();
        assert!(matches!(flow.pay(&bad_email, &amount(), "Pedido").await, Err(StorefrontError::Validation(_))));

        let bad_phone = form(PaymentMethodForm::Nequi { phone_number: "300".into() });
        assert!(matches!(flow.pay(&bad_phone, &amount(), "Pedido").await, Err(StorefrontError::InvalidForm(_))));

        let nequi = form(PaymentMethodForm::Nequi { phone_number: "3001234567".into() });
        assert!(matches!(flow.pay(&nequi, &Money::cop(Decimal::ZERO), "Pedido").await, Err(StorefrontError::InvalidAmount)));
        assert!(flow.gateway().submitted.lock().is_empty());
    }

    #[test]
    fn test_form_deserializes_tagged_methods() {
        let form: PaymentForm = serde_json::from_value(serde_json::json!({
            "customer_email": "ana@example.com", "full_name": "Ana", "phone_number": "3001234567",
            "accept_terms": true, "accept_personal_data": true,
            "method": { "type": "PSE", "user_type": "juridical", "user_legal_id_type": "NIT", "user_legal_id": "900", "financial_institution_code": "1" }
        })).unwrap();
        assert!(matches!(form.method, PaymentMethodForm::Pse { user_type: PseUserType::Juridical, .. }));
        assert!(form.check().is_ok());
    }
}
