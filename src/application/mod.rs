//! Application layer: the reconciliation workflow.
//!
//! Every component here is stateless apart from its handles on the ledger
//! store, so any number of engines (in one process or many) can share a
//! store and coordinate only through its atomic primitives.

pub mod allocator;
pub mod engine;
pub mod fees;
pub mod processor;
pub mod queue;
pub mod recovery;
pub mod resolver;
pub mod scanner;
pub mod sms;
pub mod suspense;
pub mod wallet;

use crate::domain::loan::Customer;
use rust_decimal::Decimal;

/// A claimed transaction whose tenant and customer are known.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentContext {
    pub transaction_id: String,
    pub tenant_id: String,
    pub customer: Customer,
    pub amount: Decimal,
}
