//! `chessbill-billing`: the invoice recreation engine.
//!
//! The payment provider does not support editing line items on an issued
//! invoice. The only sanctioned way to reflect a changed roster is the
//! cancel-and-recreate protocol implemented by [`InvoiceOrchestrator`]:
//! sanitize, price, build a fresh order and invoice, publish it, and only
//! then cancel the invoice it replaces.
//!
//! Superseded strategies from earlier iterations of this system (in-place
//! line-item edits, withdraw-in-place against a live order) raced against the
//! provider's consistency model and are not implemented here.

pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod provider;

pub use error::BillingError;
pub use memory::{FailPoint, InMemoryProvider, ProviderCall};
pub use orchestrator::{
    BillingConfig, BillingContact, InvoiceOrchestrator, InvoiceRequest, InvoiceResult,
    UnrecoverablePolicy,
};
pub use provider::{
    AcceptedPaymentMethods, Customer, CustomerId, CustomerProfile, DeliveryMethod, DraftInvoice,
    IdempotencyKey, Invoice, InvoiceId, InvoiceStatus, InvoicingProvider, NewInvoice, Order,
    OrderId, OrderLineItem, ProviderError,
};
