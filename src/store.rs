//! Cart store: a [`Cart`] persisted to session storage after every mutation.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::aggregates::{Cart, CartError, CartItem, CartProduct};
use crate::domain::events::CartEvent;
use crate::domain::value_objects::Money;
use crate::storage::SessionStorage;

/// Storage key holding the serialized cart.
pub const CART_STORE_KEY: &str = "storefront-cart";

pub struct CartStore<S: SessionStorage> {
    storage: S,
    cart: Cart,
}

impl<S: SessionStorage> CartStore<S> {
    /// Rehydrates whatever cart the storage holds, without revalidating stock.
    pub fn new(storage: S, currency: &str) -> Self {
        let cart = match storage.get_item(CART_STORE_KEY) {
            Ok(Some(blob)) => serde_json::from_str::<Cart>(&blob).unwrap_or_else(|e| {
                warn!(error = %e, "Discarding unreadable persisted cart");
                Cart::new(currency)
            }),
            Ok(None) => Cart::new(currency),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted cart");
                Cart::new(currency)
            }
        };
        Self { storage, cart }
    }

    pub fn add(&mut self, product: CartProduct, quantity: u32) -> Result<(), CartError> {
        self.cart.add(product, quantity)?;
        self.persist();
        Ok(())
    }

    pub fn reduce(&mut self, variant_id: u64) { self.cart.reduce(variant_id); self.persist(); }
    pub fn remove(&mut self, variant_id: u64) { self.cart.remove(variant_id); self.persist(); }
    pub fn clear(&mut self) { self.cart.clear(); self.persist(); }

    pub fn get_item(&self, variant_id: u64) -> Option<&CartItem> { self.cart.get_item(variant_id) }
    pub fn items(&self) -> &[CartItem] { self.cart.items() }
    pub fn count(&self) -> u32 { self.cart.count() }
    pub fn total_price(&self) -> Decimal { self.cart.total_price() }
    pub fn total(&self) -> Money { self.cart.total() }
    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn take_events(&mut self) -> Vec<CartEvent> { self.cart.take_events() }

    /// Flushes the cart one last time and hands the storage back.
    pub fn dispose(self) -> S {
        self.persist();
        self.storage
    }

    fn persist(&self) {
        let blob = match serde_json::to_string(&self.cart) {
            Ok(blob) => blob,
            Err(e) => { warn!(error = %e, "Failed to serialize cart"); return; }
        };
        match self.storage.set_item(CART_STORE_KEY, blob) {
            Ok(()) => debug!(count = self.cart.count(), "Cart persisted"),
            Err(e) => warn!(error = %e, "Failed to persist cart"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySessionStorage;
    use std::collections::BTreeMap;

    fn product(variant_id: u64, stock: u32) -> CartProduct {
        CartProduct {
            id: "P1".into(), name: "Tenis".into(), slug: "tenis".into(), image: Some("tenis.png".into()),
            price: Decimal::new(89_900, 0), variant_id, stock,
            options: BTreeMap::from([("talla".to_string(), "42".to_string())]),
        }
    }

    #[test]
    fn test_state_survives_dispose_and_rehydrate() {
        let mut store = CartStore::new(MemorySessionStorage::new(), "COP");
        store.add(product(1, 3), 2).unwrap();
        store.add(product(2, 1), 1).unwrap();
        let storage = store.dispose();

        let store = CartStore::new(storage, "COP");
        assert_eq!(store.count(), 3);
        assert_eq!(store.total_price(), Decimal::new(269_700, 0));
        assert_eq!(store.get_item(1).unwrap().product.options["talla"], "42");
    }

    #[test]
    fn test_rehydrate_keeps_stale_stock() {
        let storage = MemorySessionStorage::new();
        let mut store = CartStore::new(storage.clone(), "COP");
        store.add(product(1, 3), 3).unwrap();

        // stock dropped on the backend; the persisted line is kept as-is
        let mut store = CartStore::new(storage, "COP");
        assert_eq!(store.get_item(1).unwrap().quantity, 3);
        assert!(store.add(product(1, 1), 1).is_err());
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let storage = MemorySessionStorage::new();
        let mut store = CartStore::new(storage.clone(), "COP");
        store.add(product(1, 5), 2).unwrap();
        store.reduce(1);
        let persisted: Cart = serde_json::from_str(&storage.get_item(CART_STORE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(persisted.count(), 1);
        store.clear();
        let persisted: Cart = serde_json::from_str(&storage.get_item(CART_STORE_KEY).unwrap().unwrap()).unwrap();
        assert!(persisted.is_empty());
        assert_eq!(persisted.total_price(), Decimal::ZERO);
    }

    #[test]
    fn test_failed_persist_keeps_in_memory_cart() {
        let storage = MemorySessionStorage::with_quota(64);
        let mut store = CartStore::new(storage.clone(), "COP");
        assert!(store.add(product(1, 5), 2).is_ok());
        assert_eq!(store.count(), 2);
        assert_eq!(storage.get_item(CART_STORE_KEY).unwrap(), None);
    }

    #[test]
    fn test_corrupt_blob_starts_empty() {
        let storage = MemorySessionStorage::new();
        storage.set_item(CART_STORE_KEY, "{not json".into()).unwrap();
        let store = CartStore::new(storage, "COP");
        assert_eq!(store.count(), 0);
        assert!(store.items().is_empty());
    }
}
