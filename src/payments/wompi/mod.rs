//! Wompi payment processor.

pub mod client;
pub mod signature;
pub mod types;

pub use client::WompiClient;
pub use signature::integrity_signature;
