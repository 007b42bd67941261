//! Request-store seam.
//!
//! The store is treated as eventually-available key-value access; nothing
//! here assumes multi-record transactional guarantees. Sequencing safety for
//! invoice recreation lives in the billing orchestrator, not in the store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use chessbill_core::{DomainError, DomainResult, RecordId, RequestId};

use crate::request::{ChangeRequest, InvoiceRecord, RequestStatus};

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn request(&self, id: &RequestId) -> DomainResult<ChangeRequest>;

    /// Transition a request out of `Pending`. Decided requests are terminal;
    /// a second decision is a conflict.
    async fn set_status(&self, id: &RequestId, status: RequestStatus) -> DomainResult<()>;

    async fn invoice_record(&self, record_id: &RecordId) -> DomainResult<InvoiceRecord>;

    /// Look up an invoice record by its user-facing invoice number.
    async fn invoice_record_by_number(&self, number: &str) -> DomainResult<InvoiceRecord>;

    /// Insert or replace the invoice record for its `record_id`.
    async fn put_invoice_record(&self, record: InvoiceRecord) -> DomainResult<()>;
}

/// In-memory request store. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    requests: HashMap<RequestId, ChangeRequest>,
    records: HashMap<RecordId, InvoiceRecord>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_request(&self, request: ChangeRequest) {
        self.write().requests.insert(request.id, request);
    }

    pub fn seed_invoice_record(&self, record: InvoiceRecord) {
        self.write().records.insert(record.record_id, record);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("request store lock poisoned")
    }

    fn lock_read(&self) -> DomainResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| DomainError::invariant("request store lock poisoned"))
    }

    fn lock_write(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| DomainError::invariant("request store lock poisoned"))
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn request(&self, id: &RequestId) -> DomainResult<ChangeRequest> {
        self.lock_read()?
            .requests
            .get(id)
            .cloned()
            .ok_or_else(DomainError::not_found)
    }

    async fn set_status(&self, id: &RequestId, status: RequestStatus) -> DomainResult<()> {
        let mut inner = self.lock_write()?;
        let request = inner
            .requests
            .get_mut(id)
            .ok_or_else(DomainError::not_found)?;
        if request.status.is_terminal() {
            return Err(DomainError::conflict(format!(
                "request {id} was already decided as {:?}",
                request.status
            )));
        }
        request.status = status;
        Ok(())
    }

    async fn invoice_record(&self, record_id: &RecordId) -> DomainResult<InvoiceRecord> {
        self.lock_read()?
            .records
            .get(record_id)
            .cloned()
            .ok_or_else(DomainError::not_found)
    }

    async fn invoice_record_by_number(&self, number: &str) -> DomainResult<InvoiceRecord> {
        self.lock_read()?
            .records
            .values()
            .find(|r| r.request.invoice_number.as_deref() == Some(number))
            .cloned()
            .ok_or_else(DomainError::not_found)
    }

    async fn put_invoice_record(&self, record: InvoiceRecord) -> DomainResult<()> {
        self.lock_write()?.records.insert(record.record_id, record);
        Ok(())
    }
}
