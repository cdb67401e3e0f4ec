//! Aggregates module
pub mod cart;

pub use cart::{Cart, CartError, CartItem, CartProduct};
