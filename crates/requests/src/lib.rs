//! `chessbill-requests`: change requests against issued invoices and the
//! batch decision processor.
//!
//! A change request records something an organizer wants altered on a live
//! roster (withdrawal, substitution, section change, or a plain info update).
//! Approvals that alter the roster flow through the billing orchestrator's
//! cancel-and-recreate protocol; the processor isolates failures per request
//! so one bad item never sinks the batch.

pub mod processor;
pub mod request;
pub mod store;

pub use processor::{BatchDecisionProcessor, BatchOutcome, ChangeRequestBatch, Decision};
pub use request::{ChangeRequest, InvoiceRecord, RequestKind, RequestStatus};
pub use store::{InMemoryRequestStore, RequestStore};
