//! Change-request and invoice-record models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chessbill_billing::{InvoiceId, InvoiceRequest};
use chessbill_core::{RecordId, RequestId};
use chessbill_roster::RosterEntry;

/// Lifecycle of a change request. `Pending` is the only non-terminal state;
/// once decided, a request never returns to `Pending` through this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// What the organizer asked to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    /// Remove the player from the roster.
    Withdrawal,
    /// Replace the player with another entry.
    Substitution { replacement: RosterEntry },
    /// Move the player to a different tournament section.
    SectionChange { new_section: String },
    /// Contact or detail correction with no billing impact.
    InfoUpdate,
}

impl RequestKind {
    /// Whether approving this request changes the billed roster, and with it
    /// the invoice.
    pub fn alters_roster(&self) -> bool {
        !matches!(self, RequestKind::InfoUpdate)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Withdrawal => "Withdrawal",
            RequestKind::Substitution { .. } => "Substitution",
            RequestKind::SectionChange { .. } => "Section change",
            RequestKind::InfoUpdate => "Info update",
        }
    }
}

/// One change request against an invoiced roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: RequestId,
    /// The logical invoice record this request targets.
    pub record_id: RecordId,
    /// Display name of the affected player, as it appears on the roster.
    pub player_name: String,
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub submitted_at: DateTime<Utc>,
}

/// The stored association between a logical invoice record and its current
/// provider invoice. `record_id` is stable; `invoice_id` changes on every
/// recreation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub record_id: RecordId,
    pub invoice_id: InvoiceId,
    /// Everything needed to rebuild the invoice: roster, contact, event.
    pub request: InvoiceRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Denied.is_terminal());
    }

    #[test]
    fn info_updates_leave_the_roster_alone() {
        assert!(RequestKind::Withdrawal.alters_roster());
        assert!(
            RequestKind::SectionChange {
                new_section: "K-5".to_string()
            }
            .alters_roster()
        );
        assert!(!RequestKind::InfoUpdate.alters_roster());
    }
}
