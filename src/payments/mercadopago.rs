//! MercadoPago Checkout Pro preferences.
//!
//! Unlike Wompi there is nothing to poll: the preference comes back with an
//! `init_point` the shopper is redirected to.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::MercadoPagoConfig;
use crate::domain::aggregates::Cart;
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    pub currency_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub external_reference: String,
    pub back_urls: BackUrls,
    pub auto_return: String,
}

impl PreferenceRequest {
    pub fn from_cart(cart: &Cart, reference: &str, back_url: &str) -> Result<Self> {
        if cart.is_empty() { return Err(StorefrontError::EmptyCart); }
        let items = cart.items().iter().map(|item| PreferenceItem {
            id: item.product.variant_id.to_string(),
            title: item.product.name.clone(),
            quantity: item.quantity,
            unit_price: item.product.price,
            currency_id: cart.currency().to_string(),
            picture_url: item.product.image.clone(),
        }).collect();
        let back = back_url.trim_end_matches('/');
        Ok(Self {
            items,
            external_reference: reference.to_string(),
            back_urls: BackUrls { success: format!("{back}/success"), failure: format!("{back}/failure"), pending: format!("{back}/pending") },
            auto_return: "approved".to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub id: String,
    pub init_point: String,
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MercadoPagoClient {
    http: Client,
    config: MercadoPagoConfig,
}

impl MercadoPagoClient {
    pub fn new(config: MercadoPagoConfig) -> Result<Self> {
        Ok(Self { http: Client::builder().build()?, config })
    }

    #[instrument(skip(self, cart), fields(items = cart.items().len()))]
    pub async fn create_preference(&self, cart: &Cart, reference: &str) -> Result<Preference> {
        let body = PreferenceRequest::from_cart(cart, reference, &self.config.back_url)?;
        let response = self.http
            .post(format!("{}/checkout/preferences", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.access_token)
            .header("X-Idempotency-Key", reference)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorefrontError::Provider { status: status.as_u16(), body });
        }
        let preference: Preference = response.json().await?;
        info!(preference_id = %preference.id, "MercadoPago preference created");
        Ok(preference)
    }
}
