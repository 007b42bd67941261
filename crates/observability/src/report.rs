//! Log emission for roster-recovery diagnostics.
//!
//! The sanitizer returns its diagnostics structurally; turning them into log
//! output happens here so the recovery pipeline itself carries no logging
//! policy.

use tracing::{info, warn};

use chessbill_roster::{RecoveryAction, RecoveryReport};

/// Emit one recovery report to the active tracing subscriber.
pub fn log_recovery_report(report: &RecoveryReport) {
    info!(
        total = report.summary.total,
        valid = report.summary.valid,
        recovered = report.summary.recovered,
        unrecoverable = report.summary.unrecoverable,
        needs_review = report.summary.needs_review,
        excluded = report.excluded,
        "roster recovery summary"
    );

    for action in &report.log {
        match action {
            RecoveryAction::NameSynthesized { index, synthesized } => {
                info!(index = *index, name = %synthesized, "display name recovered");
            }
            RecoveryAction::RecoveryFailed {
                index,
                name_like_fields,
            } => {
                let guesses: Vec<String> = name_like_fields
                    .iter()
                    .map(|f| format!("{}={}", f.field, f.value))
                    .collect();
                warn!(index = *index, guesses = ?guesses, "display name unrecoverable");
            }
            RecoveryAction::EntryExcluded { index, reason } => {
                warn!(index = *index, reason = %reason, "entry excluded from billing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chessbill_roster::{RosterEntry, recover};

    #[test]
    fn reports_emit_without_panicking() {
        crate::telemetry::init();
        let roster = vec![
            RosterEntry {
                player_name: Some("Ana Lopez".to_string()),
                ..RosterEntry::default()
            },
            RosterEntry::default(),
        ];
        let (_, report) = recover(&roster);
        log_recovery_report(&report);
    }
}
