//! Storefront checkout
//!
//! Cart and payment core of a multi-tenant storefront.
//!
//! ## Features
//! - Stock-aware cart with session-scoped persistence
//! - Wompi transactions (card, Nequi, PSE, Bancolombia transfer)
//! - Bounded polling for asynchronous payment URLs
//! - MercadoPago Checkout Pro preferences

use thiserror::Error;

pub mod config;
pub mod domain;
pub mod payments;
pub mod storage;
pub mod store;

pub use config::AppConfig;
pub use domain::aggregates::{Cart, CartError, CartItem, CartProduct};
pub use domain::events::CartEvent;
pub use domain::value_objects::Money;
pub use payments::flow::{CheckoutFlow, PaymentForm, PaymentMethodForm, PaymentOutcome};
pub use payments::retry::{poll_until, Polled, RetryPolicy, Sleeper, TokioSleeper};
pub use payments::PaymentGateway;
pub use storage::{MemorySessionStorage, SessionStorage};
pub use store::{CartStore, CART_STORE_KEY};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Invalid payment form: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid payment form: {0}")]
    InvalidForm(String),

    #[error("Terms and personal data authorization must be accepted")]
    ConsentRequired,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Payment provider responded with {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Transaction has no async payment URL")]
    NoAsyncPaymentUrl { transaction_id: String, attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
