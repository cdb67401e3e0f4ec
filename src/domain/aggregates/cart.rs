//! Cart Aggregate

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::events::CartEvent;
use crate::domain::value_objects::Money;

/// Denormalized snapshot of a purchasable variant, frozen when it is added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: Decimal,
    pub variant_id: u64,
    pub stock: u32,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: CartProduct,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> Option<Decimal> { self.product.price.checked_mul(Decimal::from(self.quantity)) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<CartItem>,
    count: u32,
    total_price: Decimal,
    currency: String,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<CartEvent>,
}

impl Cart {
    pub fn new(currency: &str) -> Self {
        Self {
            items: vec![], count: 0, total_price: Decimal::ZERO, currency: currency.to_uppercase(),
            updated_at: Utc::now(), events: vec![],
        }
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn count(&self) -> u32 { self.count }
    pub fn total_price(&self) -> Decimal { self.total_price }
    pub fn total(&self) -> Money { Money::new(self.total_price, &self.currency) }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn get_item(&self, variant_id: u64) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product.variant_id == variant_id)
    }

    /// Adds `quantity` units of the variant, merging into its existing line.
    ///
    /// The cart is left untouched when the quantity is zero, when the line
    /// would end up above the advertised stock of `product`, or when the new
    /// totals are not representable.
    pub fn add(&mut self, product: CartProduct, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return Err(CartError::InvalidQuantity); }
        if product.price.is_sign_negative() { return Err(CartError::InvalidPrice); }
        let variant_id = product.variant_id;
        let current = self.get_item(variant_id).map_or(0, |i| i.quantity);
        let requested = current.checked_add(quantity).ok_or(CartError::InvalidQuantity)?;
        if requested > product.stock {
            return Err(CartError::InsufficientStock { variant_id, requested, available: product.stock });
        }

        let line = CartItem { product, quantity: requested };
        let others = self.items.iter().filter(|i| i.product.variant_id != variant_id);
        let (count, total_price) = checked_totals(others.chain(std::iter::once(&line))).ok_or(CartError::TotalOverflow)?;

        match self.items.iter_mut().find(|i| i.product.variant_id == variant_id) {
            Some(existing) => *existing = line,
            None => self.items.push(line),
        }
        self.count = count;
        self.total_price = total_price;
        self.updated_at = Utc::now();
        self.raise_event(CartEvent::ItemAdded { variant_id, quantity, line_quantity: requested });
        Ok(())
    }

    /// Takes one unit off the line; the line goes away when it reaches zero.
    pub fn reduce(&mut self, variant_id: u64) {
        let Some(pos) = self.items.iter().position(|i| i.product.variant_id == variant_id) else { return };
        let remaining = self.items[pos].quantity.saturating_sub(1);
        if remaining == 0 { self.items.remove(pos); } else { self.items[pos].quantity = remaining; }
        self.recalculate();
        self.raise_event(CartEvent::ItemReduced { variant_id, remaining });
    }

    pub fn remove(&mut self, variant_id: u64) {
        let before = self.items.len();
        self.items.retain(|i| i.product.variant_id != variant_id);
        if self.items.len() == before { return; }
        self.recalculate();
        self.raise_event(CartEvent::ItemRemoved { variant_id });
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.recalculate();
        self.raise_event(CartEvent::Cleared);
    }

    // Lines only shrink here, so totals fit whenever they fit before. A
    // rehydrated blob can break that; such totals saturate instead.
    fn recalculate(&mut self) {
        (self.count, self.total_price) = checked_totals(&self.items).unwrap_or_else(|| {
            let count = self.items.iter().fold(0u32, |acc, i| acc.saturating_add(i.quantity));
            (count, Decimal::MAX)
        });
        self.updated_at = Utc::now();
    }

    pub fn take_events(&mut self) -> Vec<CartEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: CartEvent) { self.events.push(e); }
}

fn checked_totals<'a>(items: impl IntoIterator<Item = &'a CartItem>) -> Option<(u32, Decimal)> {
    items.into_iter().try_fold((0u32, Decimal::ZERO), |(count, total), item| {
        Some((count.checked_add(item.quantity)?, total.checked_add(item.line_total()?)?))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("Price must not be negative")]
    InvalidPrice,

    #[error("Cart total out of range")]
    TotalOverflow,

    #[error("Insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock { variant_id: u64, requested: u32, available: u32 },
}
