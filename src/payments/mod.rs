//! Payment provider integrations.

pub mod flow;
pub mod mercadopago;
pub mod retry;
pub mod wompi;

use async_trait::async_trait;

use crate::Result;
use self::wompi::types::{CardDetails, CardToken, FinancialInstitution, Merchant, Transaction, TransactionRequest};

/// The payment processor operations the checkout flow depends on.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn merchant(&self) -> Result<Merchant>;
    async fn tokenize_card(&self, card: &CardDetails) -> Result<CardToken>;
    async fn create_transaction(&self, request: &TransactionRequest) -> Result<Transaction>;
    async fn get_transaction(&self, id: &str) -> Result<Transaction>;
    async fn financial_institutions(&self) -> Result<Vec<FinancialInstitution>>;
}
