//! Roster entry: one player's registration line, prior to billing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use chessbill_core::Money;

/// Sentinel membership id meaning "new member, no id assigned yet".
pub const NEW_MEMBER_SENTINEL: &str = "NEW";

/// One player's registration data for an event.
///
/// Every field that upstream callers may omit is explicitly optional; the
/// recovery pipeline (`recovery::recover`) normalizes these exactly once, so
/// downstream pricing never has to guess. A corrected entry is a new value;
/// entries are never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Primary display name used on the invoice. Required for billing;
    /// may arrive missing or as a concatenation-failure sentinel.
    pub player_name: Option<String>,
    /// Redundant identity fields, used only for name recovery and diagnostics.
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    /// External governing-body membership id; `NEW` when not yet assigned.
    pub membership_id: Option<String>,
    /// Base registration fee, already resolved to the event tier by the caller.
    pub base_registration_fee: Option<Money>,
    /// Explicit late-fee override; absent means "derive from the schedule".
    pub late_fee_override: Option<Money>,
    /// Organizer flag waiving the late fee entirely.
    pub waive_late_fee: Option<bool>,
    /// Whether a membership action (new/renew) is requested alongside.
    pub membership_action: Option<bool>,
    /// Special-program eligibility (e.g. gifted/talented); changes the
    /// late-fee tier.
    pub special_program: Option<bool>,
    /// Set when this player replaced another after registration closed.
    /// Substituted players owe no late fee; the roster owes the schedule's
    /// flat substitution fee once per substituted player.
    pub is_substitution: Option<bool>,
    /// Tournament section assignment.
    pub section: Option<String>,
    /// When the player registered; drives deadline-based late fees.
    pub registration_date: Option<NaiveDate>,
}

impl RosterEntry {
    /// Display name, if present and non-blank.
    pub fn display_name(&self) -> Option<&str> {
        self.player_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Absent flags read as `false`. This is the single place that rule
    /// lives; do not re-interpret optional flags elsewhere.
    pub fn waives_late_fee(&self) -> bool {
        self.waive_late_fee.unwrap_or(false)
    }

    pub fn requests_membership_action(&self) -> bool {
        self.membership_action.unwrap_or(false)
    }

    pub fn is_special_program(&self) -> bool {
        self.special_program.unwrap_or(false)
    }

    pub fn is_substituted(&self) -> bool {
        self.is_substitution.unwrap_or(false)
    }

    /// Membership id for display, falling back to the new-member sentinel.
    pub fn membership_id_or_new(&self) -> &str {
        self.membership_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NEW_MEMBER_SENTINEL)
    }
}
