//! Storefront checkout service

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::{extract::{Path, State}, http::StatusCode, routing::{delete, get, post}, Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use storefront_checkout::payments::mercadopago::{MercadoPagoClient, Preference};
use storefront_checkout::payments::wompi::types::FinancialInstitution;
use storefront_checkout::payments::wompi::WompiClient;
use storefront_checkout::{
    AppConfig, Cart, CartError, CartProduct, CartStore, CheckoutFlow, MemorySessionStorage, PaymentForm, PaymentGateway, PaymentOutcome,
    StorefrontError,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, String)>;

/// Sessions only hold storage while their cart has items.
#[derive(Clone)]
pub struct AppState {
    currency: String,
    session_quota: usize,
    sessions: Arc<Mutex<HashMap<String, MemorySessionStorage>>>,
    wompi: Arc<CheckoutFlow<WompiClient>>,
    mercadopago: Option<Arc<MercadoPagoClient>>,
}

impl AppState {
    fn read_cart(&self, session: &str) -> Cart {
        match self.sessions.lock().get(session) {
            Some(storage) => CartStore::new(storage.clone(), &self.currency).cart().clone(),
            None => Cart::new(&self.currency),
        }
    }

    /// Runs `f` against the session's cart while holding the session map lock.
    fn with_cart<T>(&self, session: &str, f: impl FnOnce(&mut CartStore<MemorySessionStorage>) -> T) -> T {
        let mut sessions = self.sessions.lock();
        let storage = sessions.get(session).cloned().unwrap_or_else(|| MemorySessionStorage::with_quota(self.session_quota));
        let mut store = CartStore::new(storage, &self.currency);
        let out = f(&mut store);
        for event in store.take_events() { tracing::debug!(session, ?event, "Cart event"); }
        let empty = store.cart().is_empty();
        let storage = store.dispose();
        if empty {
            sessions.remove(session);
        } else {
            sessions.insert(session.to_string(), storage);
        }
        out
    }

    /// Drops the session's cart only if it is still the one that was charged.
    fn clear_if_unchanged(&self, session: &str, charged: &Cart) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(storage) = sessions.get(session).cloned() else { return false };
        let current = CartStore::new(storage, &self.currency);
        if current.cart().updated_at() != charged.updated_at() || current.items() != charged.items() {
            tracing::warn!(session, "Cart changed while the payment was in flight, keeping it");
            return false;
        }
        sessions.remove(session);
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env()?;

    let wompi = CheckoutFlow::new(WompiClient::new(&config.wompi)?, config.wompi.integrity_secret.clone())
        .redirect_url(config.wompi.redirect_url.clone())
        .policy(config.payment_poll);
    let mercadopago = config.mercadopago.clone().map(MercadoPagoClient::new).transpose()?.map(Arc::new);
    let state = AppState {
        currency: config.currency.clone(), session_quota: config.session_quota, sessions: Arc::default(), wompi: Arc::new(wompi), mercadopago,
    };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-checkout"})) }))
        .route("/api/v1/cart/:session", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/items", post(add_item))
        .route("/api/v1/cart/:session/items/:variant", delete(remove_item))
        .route("/api/v1/cart/:session/items/:variant/reduce", post(reduce_item))
        .route("/api/v1/payments/pse/institutions", get(pse_institutions))
        .route("/api/v1/checkout/:session/wompi", post(wompi_checkout))
        .route("/api/v1/checkout/:session/mercadopago", post(mercadopago_checkout))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    tracing::info!("Storefront checkout listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

fn failure(e: StorefrontError) -> (StatusCode, String) {
    let status = match &e {
        StorefrontError::Cart(CartError::InsufficientStock { .. }) => StatusCode::CONFLICT,
        StorefrontError::Cart(CartError::InvalidQuantity | CartError::InvalidPrice | CartError::TotalOverflow) => StatusCode::UNPROCESSABLE_ENTITY,
        StorefrontError::EmptyCart | StorefrontError::InvalidAmount | StorefrontError::Validation(_)
        | StorefrontError::InvalidForm(_) | StorefrontError::ConsentRequired => StatusCode::BAD_REQUEST,
        StorefrontError::Http(_) | StorefrontError::Provider { .. } | StorefrontError::NoAsyncPaymentUrl { .. } => StatusCode::BAD_GATEWAY,
        StorefrontError::Storage(_) | StorefrontError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_client_error() {
        tracing::warn!(error = %e, "Request rejected");
        return (status, e.to_string());
    }
    tracing::error!(error = %e, "Request failed");
    (status, "The payment could not be processed, please try again".to_string())
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Cart> {
    Ok(Json(s.read_cart(&session)))
}

#[derive(Debug, Deserialize)] pub struct AddItemRequest { pub product: CartProduct, pub quantity: Option<u32> }

async fn add_item(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddItemRequest>) -> ApiResult<Cart> {
    s.with_cart(&session, |store| -> Result<Cart, CartError> {
        store.add(r.product, r.quantity.unwrap_or(1))?;
        Ok(store.cart().clone())
    }).map(Json).map_err(|e| failure(e.into()))
}

async fn reduce_item(State(s): State<AppState>, Path((session, variant)): Path<(String, u64)>) -> ApiResult<Cart> {
    Ok(Json(s.with_cart(&session, |store| { store.reduce(variant); store.cart().clone() })))
}

async fn remove_item(State(s): State<AppState>, Path((session, variant)): Path<(String, u64)>) -> ApiResult<Cart> {
    Ok(Json(s.with_cart(&session, |store| { store.remove(variant); store.cart().clone() })))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> StatusCode {
    s.with_cart(&session, |store| store.clear());
    StatusCode::NO_CONTENT
}

async fn pse_institutions(State(s): State<AppState>) -> ApiResult<Vec<FinancialInstitution>> {
    s.wompi.gateway().financial_institutions().await.map(Json).map_err(failure)
}

async fn wompi_checkout(State(s): State<AppState>, Path(session): Path<String>, Json(form): Json<PaymentForm>) -> ApiResult<PaymentOutcome> {
    let cart = s.read_cart(&session);
    if cart.is_empty() { return Err(failure(StorefrontError::EmptyCart)); }
    let description = format!("Compra de {} productos", cart.count());
    let outcome = s.wompi.pay(&form, &cart.total(), &description).await.map_err(failure)?;
    let cleared = s.clear_if_unchanged(&session, &cart);
    tracing::info!(session, reference = %outcome.reference, cleared, "Checkout submitted");
    Ok(Json(outcome))
}

async fn mercadopago_checkout(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Preference> {
    let Some(client) = s.mercadopago.clone() else { return Err((StatusCode::NOT_FOUND, "MercadoPago is not configured".to_string())) };
    let cart = s.read_cart(&session);
    let reference = Uuid::new_v4().to_string();
    client.create_preference(&cart, &reference).await.map(Json).map_err(failure)
}
