//! Record sanitizer / recovery pipeline.
//!
//! Detects roster entries whose display name was destroyed upstream (missing,
//! blank, or the literal concatenation-failure sentinel) and repairs them
//! deterministically from the redundant structured name fields. Field
//! normalization for the rest of the entry happens here too, exactly once.
//!
//! This stage never drops an entry: the exclusion/abort decision for
//! unrecoverable entries belongs to the billing orchestrator.

use serde::{Deserialize, Serialize};

use crate::entry::{NEW_MEMBER_SENTINEL, RosterEntry};
use chessbill_core::Money;

/// The literal produced upstream when both halves of a name concatenation
/// were undefined. Matched trimmed, whitespace-collapsed, case-insensitively.
const CORRUPT_NAME_SENTINEL: &str = "undefined undefined";

/// Outcome of running recovery over one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryOutcome {
    /// Display name was usable as received.
    Valid,
    /// Display name was corrupted and repaired from redundant fields.
    Recovered,
    /// Display name was corrupted and could not be repaired.
    Unrecoverable,
}

/// How a corrupted entry was repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMethod {
    /// Synthesized from the structured first/last name fields.
    StructuredNameFields,
}

/// A roster entry annotated with its recovery outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveredRosterEntry {
    pub entry: RosterEntry,
    /// Position of this entry in the caller's roster.
    pub original_index: usize,
    pub outcome: RecoveryOutcome,
    pub method: Option<RecoveryMethod>,
    pub needs_manual_review: bool,
}

/// Aggregate counts over one recovery run.
///
/// `valid`, `recovered`, and `unrecoverable` are disjoint and sum to `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub total: usize,
    pub valid: usize,
    pub recovered: usize,
    pub unrecoverable: usize,
    pub needs_review: usize,
}

/// A string field captured for operator diagnosis of an unrecoverable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameLikeField {
    pub field: String,
    pub value: String,
}

/// One action taken (or failed) during recovery, in roster order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryAction {
    NameSynthesized {
        index: usize,
        synthesized: String,
    },
    RecoveryFailed {
        index: usize,
        /// Best-effort capture of fields that look name-shaped, for manual
        /// repair. May be empty.
        name_like_fields: Vec<NameLikeField>,
    },
    /// Recorded by the orchestrator when the exclude-and-proceed policy
    /// drops an unrecoverable entry from billing.
    EntryExcluded {
        index: usize,
        reason: String,
    },
}

/// Audit record of one recovery run. Read-only after creation, except that
/// the orchestrator may append exclusion decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub summary: RecoverySummary,
    pub log: Vec<RecoveryAction>,
    pub entries: Vec<RecoveredRosterEntry>,
    /// Entries excluded from billing under the exclude-and-proceed policy.
    pub excluded: usize,
}

impl RecoveryReport {
    pub fn unrecoverable_count(&self) -> usize {
        self.summary.unrecoverable
    }

    pub fn has_unrecoverable(&self) -> bool {
        self.summary.unrecoverable > 0
    }

    /// Record that the orchestrator excluded an unrecoverable entry.
    pub fn record_exclusion(&mut self, index: usize, reason: impl Into<String>) {
        self.excluded += 1;
        self.log.push(RecoveryAction::EntryExcluded {
            index,
            reason: reason.into(),
        });
    }
}

/// Run the recovery pipeline over a roster.
///
/// Returns the normalized roster (same length, same order; nothing is
/// dropped here) and the audit report. Running the pipeline on its own
/// output re-flags nothing that was valid or recovered.
pub fn recover(roster: &[RosterEntry]) -> (Vec<RosterEntry>, RecoveryReport) {
    let mut report = RecoveryReport::default();
    report.summary.total = roster.len();

    let mut cleaned = Vec::with_capacity(roster.len());

    for (index, original) in roster.iter().enumerate() {
        let mut entry = normalize(original);
        let mut outcome = RecoveryOutcome::Valid;
        let mut method = None;
        let mut needs_manual_review = false;

        if is_corrupted_name(entry.player_name.as_deref()) {
            match synthesize_name(&entry) {
                Some(synthesized) => {
                    report.log.push(RecoveryAction::NameSynthesized {
                        index,
                        synthesized: synthesized.clone(),
                    });
                    entry.player_name = Some(synthesized);
                    outcome = RecoveryOutcome::Recovered;
                    method = Some(RecoveryMethod::StructuredNameFields);
                    report.summary.recovered += 1;
                }
                None => {
                    report.log.push(RecoveryAction::RecoveryFailed {
                        index,
                        name_like_fields: capture_name_like_fields(&entry),
                    });
                    outcome = RecoveryOutcome::Unrecoverable;
                    needs_manual_review = true;
                    report.summary.unrecoverable += 1;
                    report.summary.needs_review += 1;
                }
            }
        } else {
            report.summary.valid += 1;
        }

        report.entries.push(RecoveredRosterEntry {
            entry: entry.clone(),
            original_index: index,
            outcome,
            method,
            needs_manual_review,
        });
        cleaned.push(entry);
    }

    (cleaned, report)
}

/// Whether a display name is absent, blank, or the corruption sentinel.
fn is_corrupted_name(name: Option<&str>) -> bool {
    match name {
        None => true,
        Some(raw) => {
            let collapsed = collapse_whitespace(raw);
            collapsed.is_empty() || collapsed.eq_ignore_ascii_case(CORRUPT_NAME_SENTINEL)
        }
    }
}

/// Deterministic repair from the structured first/last name fields.
fn synthesize_name(entry: &RosterEntry) -> Option<String> {
    let first = nonblank(entry.first_name.as_deref())?;
    let last = nonblank(entry.last_name.as_deref())?;
    Some(collapse_whitespace(&format!("{first} {last}")))
}

/// Normalize the non-name fields defensively, exactly once.
///
/// Missing membership id becomes the new-member sentinel, a missing base fee
/// becomes zero, absent flags become explicit `false`. The late-fee override
/// stays absent when absent; absent is "derive", not zero.
fn normalize(original: &RosterEntry) -> RosterEntry {
    RosterEntry {
        player_name: original
            .player_name
            .as_deref()
            .map(collapse_whitespace)
            .filter(|s| !s.is_empty()),
        first_name: nonblank(original.first_name.as_deref()).map(str::to_string),
        last_name: nonblank(original.last_name.as_deref()).map(str::to_string),
        full_name: nonblank(original.full_name.as_deref()).map(str::to_string),
        membership_id: Some(
            nonblank(original.membership_id.as_deref())
                .unwrap_or(NEW_MEMBER_SENTINEL)
                .to_string(),
        ),
        base_registration_fee: Some(original.base_registration_fee.unwrap_or(Money::ZERO)),
        late_fee_override: original.late_fee_override,
        waive_late_fee: Some(original.waive_late_fee.unwrap_or(false)),
        membership_action: Some(original.membership_action.unwrap_or(false)),
        special_program: Some(original.special_program.unwrap_or(false)),
        is_substitution: Some(original.is_substitution.unwrap_or(false)),
        section: nonblank(original.section.as_deref()).map(str::to_string),
        registration_date: original.registration_date,
    }
}

/// Best-effort capture of fields that might hold the player's real name.
///
/// A field qualifies when its name mentions "name" or its value reads like a
/// name (alphabetic words). This is diagnostic output only and must never
/// fail.
fn capture_name_like_fields(entry: &RosterEntry) -> Vec<NameLikeField> {
    let candidates: [(&str, Option<&str>); 5] = [
        ("first_name", entry.first_name.as_deref()),
        ("last_name", entry.last_name.as_deref()),
        ("full_name", entry.full_name.as_deref()),
        ("membership_id", entry.membership_id.as_deref()),
        ("section", entry.section.as_deref()),
    ];

    candidates
        .into_iter()
        .filter_map(|(field, value)| {
            let value = nonblank(value)?;
            if field.contains("name") || looks_name_like(value) {
                Some(NameLikeField {
                    field: field.to_string(),
                    value: value.to_string(),
                })
            } else {
                None
            }
        })
        .collect()
}

fn looks_name_like(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphabetic() || c.is_whitespace() || c == '\'' || c == '-')
}

fn nonblank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
