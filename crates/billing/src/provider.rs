//! External invoicing provider interface.
//!
//! The payment provider is consumed as an opaque remote API over customers,
//! orders, and invoices. All monetary amounts cross this boundary as integer
//! minor currency units; conversion from the domain's decimal major units
//! happens in the orchestrator, nowhere else.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! impl_provider_id {
    ($t:ident) => {
        /// Opaque provider-assigned identifier.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

impl_provider_id!(CustomerId);
impl_provider_id!(OrderId);
impl_provider_id!(InvoiceId);

/// Idempotency key for provider mutations.
///
/// One key per logical operation: stable across retries of that operation,
/// distinct across different operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

/// Billing-contact details pushed to the provider's customer object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub company_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Free-form note (e.g. team code).
    pub note: Option<String>,
}

/// A provider-side customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: String,
}

/// One order line. Quantity is always 1 in this system: one line per priced
/// roster entry, with the fee breakdown in the note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price_minor: i64,
    pub note: Option<String>,
}

/// A provider-side order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub total_minor: i64,
}

/// Provider-defined invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Published,
    Unpaid,
    Paid,
    Canceled,
    /// Forward-compatibility for statuses this system does not model.
    #[serde(other)]
    Unknown,
}

/// How the provider delivers the invoice to the recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
    Email,
    ShareManually,
}

/// Payment methods enabled on a created invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedPaymentMethods {
    pub card: bool,
    pub gift_card: bool,
    pub bank_account: bool,
}

impl Default for AcceptedPaymentMethods {
    fn default() -> Self {
        Self {
            card: true,
            gift_card: true,
            bank_account: true,
        }
    }
}

/// Payload for creating a draft invoice against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub order_id: OrderId,
    pub primary_recipient: CustomerId,
    pub cc_recipients: Vec<String>,
    /// Due date for the single balance payment request on the invoice.
    pub due_date: NaiveDate,
    pub delivery_method: DeliveryMethod,
    pub accepted_payment_methods: AcceptedPaymentMethods,
    /// Custom user-facing invoice number; provider-assigned when absent.
    pub invoice_number: Option<String>,
    pub title: String,
    pub description: String,
}

/// A created-but-unpublished invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftInvoice {
    pub id: InvoiceId,
    pub version: u64,
    pub invoice_number: Option<String>,
}

/// A provider invoice as fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: Option<String>,
    pub status: InvoiceStatus,
    /// Version token required by mutations; stale tokens are rejected.
    pub version: u64,
    /// Public view URL; may lag publication by a short propagation delay.
    pub public_url: Option<String>,
    pub total_minor: i64,
}

/// Structured provider failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider rejected the call with a structured error payload.
    #[error("[{category}/{code}]: {detail}")]
    Api {
        category: String,
        code: String,
        detail: String,
    },

    /// The referenced resource does not exist at the provider.
    #[error("not found: {0}")]
    NotFound(String),

    /// The call never reached the provider (or the response was lost).
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn api(
        category: impl Into<String>,
        code: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Api {
            category: category.into(),
            code: code.into(),
            detail: detail.into(),
        }
    }
}

/// The external invoicing collaborator.
///
/// Implementations must be safe to share across tasks. Every mutation takes
/// an idempotency key supplied by the caller.
#[async_trait]
pub trait InvoicingProvider: Send + Sync {
    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Customer>, ProviderError>;

    async fn create_customer(
        &self,
        key: IdempotencyKey,
        profile: CustomerProfile,
    ) -> Result<Customer, ProviderError>;

    async fn update_customer(
        &self,
        id: &CustomerId,
        profile: CustomerProfile,
    ) -> Result<(), ProviderError>;

    async fn create_order(
        &self,
        key: IdempotencyKey,
        location_id: &str,
        customer_id: &CustomerId,
        line_items: Vec<OrderLineItem>,
    ) -> Result<Order, ProviderError>;

    async fn create_invoice(
        &self,
        key: IdempotencyKey,
        invoice: NewInvoice,
    ) -> Result<DraftInvoice, ProviderError>;

    async fn publish_invoice(
        &self,
        key: IdempotencyKey,
        id: &InvoiceId,
        version: u64,
    ) -> Result<Invoice, ProviderError>;

    async fn cancel_invoice(&self, id: &InvoiceId, version: u64) -> Result<(), ProviderError>;

    async fn get_invoice(&self, id: &InvoiceId) -> Result<Invoice, ProviderError>;
}
