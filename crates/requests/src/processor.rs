//! Batch decision processor.
//!
//! Decisions are processed concurrently, one task per request, and each
//! failure is caught and recorded rather than aborting the batch. Requests
//! that target the same invoice are serialized inside the billing
//! orchestrator's per-invoice lock, not here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chessbill_billing::{InvoiceOrchestrator, InvoicingProvider};
use chessbill_core::{DomainError, DomainResult, RequestId, UserId};
use chessbill_roster::RosterEntry;

use crate::request::{ChangeRequest, InvoiceRecord, RequestKind, RequestStatus};
use crate::store::RequestStore;

/// The decision applied to every request in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Deny,
}

/// A set of pending requests plus the single decision applied to all of
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequestBatch {
    pub request_ids: Vec<RequestId>,
    pub decision: Decision,
    /// Waive the late fee on entries affected by approved roster changes.
    pub waive_fees: bool,
    /// Acting operator, recorded for audit.
    pub decided_by: UserId,
}

/// Structured batch result. Partial failure is expected here and is not an
/// error: `processed_count + failed_count` always equals the number of
/// request ids submitted, and `errors` carries one contextual message per
/// failed request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub processed_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

/// Applies decisions to change requests, recreating invoices for approvals
/// that alter the billed roster.
pub struct BatchDecisionProcessor<P, S> {
    orchestrator: Arc<InvoiceOrchestrator<P>>,
    store: Arc<S>,
}

impl<P, S> Clone for BatchDecisionProcessor<P, S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            store: Arc::clone(&self.store),
        }
    }
}

impl<P, S> BatchDecisionProcessor<P, S>
where
    P: InvoicingProvider + 'static,
    S: RequestStore + 'static,
{
    pub fn new(orchestrator: Arc<InvoiceOrchestrator<P>>, store: Arc<S>) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    /// Apply the batch's decision to every request id, concurrently.
    pub async fn process(&self, batch: ChangeRequestBatch) -> BatchOutcome {
        let submitted = batch.request_ids.len();
        let mut handles = Vec::with_capacity(submitted);
        for request_id in batch.request_ids.clone() {
            let this = self.clone();
            let batch = batch.clone();
            handles.push(tokio::spawn(async move {
                this.decide(request_id, &batch).await
            }));
        }

        let mut errors = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(message)) => errors.push(message),
                Err(join_err) => errors.push(format!("request task panicked: {join_err}")),
            }
        }

        let failed_count = errors.len();
        let outcome = BatchOutcome {
            processed_count: submitted - failed_count,
            failed_count,
            errors,
        };
        info!(
            submitted,
            processed = outcome.processed_count,
            failed = outcome.failed_count,
            decided_by = %batch.decided_by,
            "batch processed"
        );
        outcome
    }

    async fn decide(&self, request_id: RequestId, batch: &ChangeRequestBatch) -> Result<(), String> {
        let request = self
            .store
            .request(&request_id)
            .await
            .map_err(|err| format!("request {request_id}: {err}"))?;
        let context = format!("request {request_id} ({})", request.player_name);

        match batch.decision {
            Decision::Deny => {
                self.store
                    .set_status(&request_id, RequestStatus::Denied)
                    .await
                    .map_err(|err| format!("{context}: {err}"))?;
            }
            Decision::Approve => {
                // Recreation runs before the status flip so a failed rebill
                // leaves the request Pending and retryable. The inverse gap
                // (invoice replaced, status write fails) is reported as a
                // failure and a retry re-runs the cancel-and-recreate
                // protocol against the already-updated record, which is
                // safe but issues a second replacement invoice.
                if request.kind.alters_roster() {
                    self.approve_with_recreation(&request, batch.waive_fees)
                        .await
                        .map_err(|err| format!("{context}: {err}"))?;
                }
                self.store
                    .set_status(&request_id, RequestStatus::Approved)
                    .await
                    .map_err(|err| format!("{context}: {err}"))?;
            }
        }
        info!(
            request = %request_id,
            kind = request.kind.label(),
            decision = ?batch.decision,
            decided_by = %batch.decided_by,
            "request decided"
        );
        Ok(())
    }

    /// Rebuild the request's invoice with the roster change applied, then
    /// point the stored record at the replacement invoice.
    async fn approve_with_recreation(
        &self,
        request: &ChangeRequest,
        waive_fees: bool,
    ) -> Result<(), String> {
        let record = self
            .store
            .invoice_record(&request.record_id)
            .await
            .map_err(|err| format!("invoice record {}: {err}", request.record_id))?;

        let mut invoice_request = record.request.clone();
        apply_to_roster(request, &mut invoice_request.roster, waive_fees)
            .map_err(|err| err.to_string())?;
        invoice_request.revision_note = Some(format!(
            "{} for {}.",
            request.kind.label(),
            request.player_name
        ));

        let result = self
            .orchestrator
            .recreate(invoice_request.clone(), Some(record.invoice_id.clone()))
            .await
            .map_err(|err| err.to_string())?;
        for warning in &result.warnings {
            warn!(request = %request.id, warning = %warning, "invoice recreation warning");
        }

        self.store
            .put_invoice_record(InvoiceRecord {
                record_id: record.record_id,
                invoice_id: result.invoice.id,
                request: invoice_request,
            })
            .await
            .map_err(|err| err.to_string())
    }
}

/// Apply one roster-altering request to the roster that will be re-billed.
///
/// With `waive_fees`, the affected entry gets its late fee waived on the
/// rebuilt invoice.
fn apply_to_roster(
    request: &ChangeRequest,
    roster: &mut Vec<RosterEntry>,
    waive_fees: bool,
) -> DomainResult<()> {
    let target = request.player_name.trim();
    let position = roster.iter().position(|entry| {
        entry
            .display_name()
            .is_some_and(|name| name.eq_ignore_ascii_case(target))
    });

    match &request.kind {
        RequestKind::Withdrawal => {
            let index = position.ok_or_else(|| missing_player(target))?;
            roster.remove(index);
        }
        RequestKind::Substitution { replacement } => {
            let index = position.ok_or_else(|| missing_player(target))?;
            let mut entry = replacement.clone();
            // The replacement owes the flat substitution fee instead of a
            // late fee; the orchestrator bills it as its own invoice line.
            entry.is_substitution = Some(true);
            if waive_fees {
                entry.waive_late_fee = Some(true);
            }
            roster[index] = entry;
        }
        RequestKind::SectionChange { new_section } => {
            let index = position.ok_or_else(|| missing_player(target))?;
            roster[index].section = Some(new_section.clone());
            if waive_fees {
                roster[index].waive_late_fee = Some(true);
            }
        }
        RequestKind::InfoUpdate => {}
    }
    Ok(())
}

fn missing_player(name: &str) -> DomainError {
    DomainError::validation(format!("player \"{name}\" is not on the roster"))
}
