//! In-memory invoicing provider.
//!
//! Intended for tests/dev. Records every call in order so tests can assert
//! protocol properties (e.g. cancel-after-publish), and supports injecting
//! failures at named points to exercise error paths.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::provider::{
    Customer, CustomerId, CustomerProfile, DraftInvoice, IdempotencyKey, Invoice, InvoiceId,
    InvoiceStatus, InvoicingProvider, NewInvoice, Order, OrderId, OrderLineItem, ProviderError,
};
use async_trait::async_trait;

/// One recorded provider call, in invocation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    FindCustomerByEmail { email: String },
    CreateCustomer { email: String },
    UpdateCustomer { id: CustomerId },
    CreateOrder { customer_id: CustomerId, lines: usize },
    CreateInvoice { order_id: OrderId },
    PublishInvoice { id: InvoiceId },
    CancelInvoice { id: InvoiceId },
    GetInvoice { id: InvoiceId },
}

/// Named failure-injection points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    FindCustomer,
    CreateCustomer,
    UpdateCustomer,
    CreateOrder,
    CreateInvoice,
    PublishInvoice,
    CancelInvoice,
    GetInvoice,
}

#[derive(Debug, Clone)]
struct StoredInvoice {
    invoice: Invoice,
    payload: Option<NewInvoice>,
    /// `get_invoice` calls observed since publication; drives simulated URL
    /// propagation delay.
    gets_since_publish: u32,
}

#[derive(Debug, Default)]
struct Inner {
    customers: Vec<(CustomerId, CustomerProfile)>,
    orders: HashMap<OrderId, (CustomerId, Vec<OrderLineItem>)>,
    invoices: HashMap<InvoiceId, StoredInvoice>,
    calls: Vec<ProviderCall>,
    seq: u64,
    failures: HashMap<FailPoint, ProviderError>,
    poisoned_emails: HashMap<String, ProviderError>,
}

/// In-memory provider. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    inner: RwLock<Inner>,
    /// How many `get_invoice` calls after publication before the public URL
    /// becomes visible (0 = immediately).
    url_delay_polls: u32,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate provider-side URL propagation delay.
    pub fn with_url_delay(polls: u32) -> Self {
        Self {
            inner: RwLock::default(),
            url_delay_polls: polls,
        }
    }

    /// Make every call to `point` fail with `err` until cleared.
    pub fn fail_at(&self, point: FailPoint, err: ProviderError) {
        self.write().failures.insert(point, err);
    }

    pub fn clear_failure(&self, point: FailPoint) {
        self.write().failures.remove(&point);
    }

    /// Make any call involving this customer email fail with `err`.
    pub fn poison_email(&self, email: impl Into<String>, err: ProviderError) {
        self.write().poisoned_emails.insert(email.into(), err);
    }

    /// Seed an already-published invoice, as if created by an earlier run.
    pub fn seed_published_invoice(
        &self,
        invoice_number: Option<&str>,
        total_minor: i64,
    ) -> InvoiceId {
        let mut inner = self.write();
        inner.seq += 1;
        let id = InvoiceId::new(format!("INV-{}", inner.seq));
        let number = invoice_number
            .map(str::to_string)
            .or_else(|| Some(format!("A-{}", inner.seq)));
        inner.invoices.insert(
            id.clone(),
            StoredInvoice {
                invoice: Invoice {
                    id: id.clone(),
                    invoice_number: number,
                    status: InvoiceStatus::Unpaid,
                    version: 2,
                    public_url: Some(format!("https://pay.example.test/i/{id}")),
                    total_minor,
                },
                payload: None,
                gets_since_publish: 0,
            },
        );
        id
    }

    /// Recorded calls, in invocation order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.read().calls.clone()
    }

    /// Payload the orchestrator supplied when creating this invoice.
    pub fn invoice_payload(&self, id: &InvoiceId) -> Option<NewInvoice> {
        self.read().invoices.get(id).and_then(|s| s.payload.clone())
    }

    pub fn invoice(&self, id: &InvoiceId) -> Option<Invoice> {
        self.read().invoices.get(id).map(|s| s.invoice.clone())
    }

    pub fn order_lines(&self, id: &OrderId) -> Option<Vec<OrderLineItem>> {
        self.read().orders.get(id).map(|(_, lines)| lines.clone())
    }

    pub fn customer_profile(&self, email: &str) -> Option<CustomerProfile> {
        self.read()
            .customers
            .iter()
            .find(|(_, p)| p.email == email)
            .map(|(_, p)| p.clone())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("provider state lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("provider state lock poisoned")
    }

    fn lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, ProviderError> {
        self.inner
            .write()
            .map_err(|_| ProviderError::Transport("lock poisoned".to_string()))
    }
}

impl Inner {
    fn check(&self, point: FailPoint) -> Result<(), ProviderError> {
        match self.failures.get(&point) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn check_email(&self, email: &str) -> Result<(), ProviderError> {
        match self.poisoned_emails.get(email) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.seq += 1;
        format!("{prefix}-{}", self.seq)
    }
}

#[async_trait]
impl InvoicingProvider for InMemoryProvider {
    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Customer>, ProviderError> {
        let mut inner = self.lock()?;
        inner.calls.push(ProviderCall::FindCustomerByEmail {
            email: email.to_string(),
        });
        inner.check(FailPoint::FindCustomer)?;
        inner.check_email(email)?;
        Ok(inner
            .customers
            .iter()
            .find(|(_, p)| p.email == email)
            .map(|(id, p)| Customer {
                id: id.clone(),
                email: p.email.clone(),
            }))
    }

    async fn create_customer(
        &self,
        _key: IdempotencyKey,
        profile: CustomerProfile,
    ) -> Result<Customer, ProviderError> {
        let mut inner = self.lock()?;
        inner.calls.push(ProviderCall::CreateCustomer {
            email: profile.email.clone(),
        });
        inner.check(FailPoint::CreateCustomer)?;
        inner.check_email(&profile.email)?;
        let id = CustomerId::new(inner.next_id("CUST"));
        let customer = Customer {
            id: id.clone(),
            email: profile.email.clone(),
        };
        inner.customers.push((id, profile));
        Ok(customer)
    }

    async fn update_customer(
        &self,
        id: &CustomerId,
        profile: CustomerProfile,
    ) -> Result<(), ProviderError> {
        let mut inner = self.lock()?;
        inner
            .calls
            .push(ProviderCall::UpdateCustomer { id: id.clone() });
        inner.check(FailPoint::UpdateCustomer)?;
        inner.check_email(&profile.email)?;
        match inner.customers.iter_mut().find(|(cid, _)| cid == id) {
            Some((_, existing)) => {
                *existing = profile;
                Ok(())
            }
            None => Err(ProviderError::NotFound(format!("customer {id}"))),
        }
    }

    async fn create_order(
        &self,
        _key: IdempotencyKey,
        _location_id: &str,
        customer_id: &CustomerId,
        line_items: Vec<OrderLineItem>,
    ) -> Result<Order, ProviderError> {
        let mut inner = self.lock()?;
        inner.calls.push(ProviderCall::CreateOrder {
            customer_id: customer_id.clone(),
            lines: line_items.len(),
        });
        inner.check(FailPoint::CreateOrder)?;
        if !inner.customers.iter().any(|(id, _)| id == customer_id) {
            return Err(ProviderError::NotFound(format!("customer {customer_id}")));
        }
        if line_items.is_empty() {
            return Err(ProviderError::api(
                "INVALID_REQUEST_ERROR",
                "BAD_REQUEST",
                "order requires at least one line item",
            ));
        }
        let total_minor = line_items
            .iter()
            .map(|l| i64::from(l.quantity) * l.unit_price_minor)
            .sum();
        let id = OrderId::new(inner.next_id("ORD"));
        inner
            .orders
            .insert(id.clone(), (customer_id.clone(), line_items));
        Ok(Order { id, total_minor })
    }

    async fn create_invoice(
        &self,
        _key: IdempotencyKey,
        invoice: NewInvoice,
    ) -> Result<DraftInvoice, ProviderError> {
        let mut inner = self.lock()?;
        inner.calls.push(ProviderCall::CreateInvoice {
            order_id: invoice.order_id.clone(),
        });
        inner.check(FailPoint::CreateInvoice)?;
        let total_minor = match inner.orders.get(&invoice.order_id) {
            Some((_, lines)) => lines
                .iter()
                .map(|l| i64::from(l.quantity) * l.unit_price_minor)
                .sum(),
            None => {
                return Err(ProviderError::NotFound(format!(
                    "order {}",
                    invoice.order_id
                )));
            }
        };
        let id = InvoiceId::new(inner.next_id("INV"));
        let number = invoice
            .invoice_number
            .clone()
            .or_else(|| Some(format!("A-{}", inner.seq)));
        inner.invoices.insert(
            id.clone(),
            StoredInvoice {
                invoice: Invoice {
                    id: id.clone(),
                    invoice_number: number.clone(),
                    status: InvoiceStatus::Draft,
                    version: 1,
                    public_url: None,
                    total_minor,
                },
                payload: Some(invoice),
                gets_since_publish: 0,
            },
        );
        Ok(DraftInvoice {
            id,
            version: 1,
            invoice_number: number,
        })
    }

    async fn publish_invoice(
        &self,
        _key: IdempotencyKey,
        id: &InvoiceId,
        version: u64,
    ) -> Result<Invoice, ProviderError> {
        let mut inner = self.lock()?;
        inner
            .calls
            .push(ProviderCall::PublishInvoice { id: id.clone() });
        inner.check(FailPoint::PublishInvoice)?;
        let stored = inner
            .invoices
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(format!("invoice {id}")))?;
        if stored.invoice.version != version {
            return Err(ProviderError::api(
                "INVALID_REQUEST_ERROR",
                "VERSION_MISMATCH",
                format!(
                    "invoice {id} is at version {}, not {version}",
                    stored.invoice.version
                ),
            ));
        }
        if stored.invoice.status != InvoiceStatus::Draft {
            return Err(ProviderError::api(
                "INVALID_REQUEST_ERROR",
                "INVALID_STATE",
                format!("invoice {id} is not a draft"),
            ));
        }
        stored.invoice.status = InvoiceStatus::Unpaid;
        stored.invoice.version += 1;
        stored.gets_since_publish = 0;
        Ok(stored.invoice.clone())
    }

    async fn cancel_invoice(&self, id: &InvoiceId, version: u64) -> Result<(), ProviderError> {
        let mut inner = self.lock()?;
        inner
            .calls
            .push(ProviderCall::CancelInvoice { id: id.clone() });
        inner.check(FailPoint::CancelInvoice)?;
        let stored = inner
            .invoices
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(format!("invoice {id}")))?;
        if stored.invoice.version != version {
            return Err(ProviderError::api(
                "INVALID_REQUEST_ERROR",
                "VERSION_MISMATCH",
                format!(
                    "invoice {id} is at version {}, not {version}",
                    stored.invoice.version
                ),
            ));
        }
        if matches!(
            stored.invoice.status,
            InvoiceStatus::Canceled | InvoiceStatus::Paid
        ) {
            return Err(ProviderError::api(
                "INVALID_REQUEST_ERROR",
                "INVALID_STATE",
                format!("invoice {id} is {:?} and cannot be canceled", stored.invoice.status),
            ));
        }
        stored.invoice.status = InvoiceStatus::Canceled;
        stored.invoice.version += 1;
        Ok(())
    }

    async fn get_invoice(&self, id: &InvoiceId) -> Result<Invoice, ProviderError> {
        let mut inner = self.lock()?;
        inner.calls.push(ProviderCall::GetInvoice { id: id.clone() });
        inner.check(FailPoint::GetInvoice)?;
        let url_delay = self.url_delay_polls;
        let stored = inner
            .invoices
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(format!("invoice {id}")))?;
        if stored.invoice.status != InvoiceStatus::Draft && stored.invoice.public_url.is_none() {
            stored.gets_since_publish += 1;
            if stored.gets_since_publish > url_delay {
                stored.invoice.public_url = Some(format!("https://pay.example.test/i/{id}"));
            }
        }
        Ok(stored.invoice.clone())
    }
}
