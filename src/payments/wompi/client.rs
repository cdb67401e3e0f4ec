//! HTTP client for the Wompi REST API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::config::WompiConfig;
use crate::payments::PaymentGateway;
use crate::{Result, StorefrontError};
use super::types::{CardDetails, CardToken, Envelope, FinancialInstitution, Merchant, Transaction, TransactionRequest};

#[derive(Clone, Debug)]
pub struct WompiClient {
    http: Client,
    base_url: String,
    public_key: String,
}

impl WompiClient {
    pub fn new(config: &WompiConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string(), public_key: config.public_key.clone() })
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder { request.bearer_auth(&self.public_key) }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "Wompi request failed");
            return Err(StorefrontError::Provider { status: status.as_u16(), body });
        }
        Ok(response.json::<Envelope<T>>().await?.data)
    }
}

#[async_trait]
impl PaymentGateway for WompiClient {
    #[instrument(skip(self))]
    async fn merchant(&self) -> Result<Merchant> {
        let response = self.http.get(self.url(&format!("/merchants/{}", self.public_key))).send().await?;
        Self::read(response).await
    }

    #[instrument(skip_all)]
    async fn tokenize_card(&self, card: &CardDetails) -> Result<CardToken> {
        let response = self.authorized(self.http.post(self.url("/tokens/cards"))).json(card).send().await?;
        let token: CardToken = Self::read(response).await?;
        debug!(brand = ?token.brand, last_four = ?token.last_four, "Card tokenized");
        Ok(token)
    }

    #[instrument(skip_all, fields(reference = %request.reference, method = request.payment_method.kind()))]
    async fn create_transaction(&self, request: &TransactionRequest) -> Result<Transaction> {
        let response = self.authorized(self.http.post(self.url("/transactions"))).json(request).send().await?;
        Self::read(response).await
    }

    #[instrument(skip(self))]
    async fn get_transaction(&self, id: &str) -> Result<Transaction> {
        let response = self.http.get(self.url(&format!("/transactions/{id}"))).send().await?;
        Self::read(response).await
    }

    #[instrument(skip(self))]
    async fn financial_institutions(&self) -> Result<Vec<FinancialInstitution>> {
        let response = self.authorized(self.http.get(self.url("/pse/financial_institutions"))).send().await?;
        Self::read(response).await
    }
}
