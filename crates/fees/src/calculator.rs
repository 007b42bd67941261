//! Fee calculator: turns a roster entry and a fee schedule into a priced
//! line item.
//!
//! Precedence for the late fee, highest first: waiver, explicit override,
//! deadline-derived tier. The tier amounts are configuration, not business
//! law; events override them per schedule.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use chessbill_core::{DomainError, DomainResult, Money};
use chessbill_roster::RosterEntry;

/// Per-event fee schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fee for a new or renewing governing-body membership.
    pub uscf_action_fee: Money,
    /// Flat late fee for standard players.
    pub standard_late_fee: Money,
    /// Flat late fee for special-program (e.g. gifted/talented) players.
    pub special_late_fee: Money,
    /// Event date; drives the early-registration deadline when present.
    pub event_date: Option<NaiveDate>,
    /// Days before the event date that early registration closes.
    pub early_deadline_days: u64,
    /// Membership-action count at which the bulk discount kicks in.
    pub bulk_threshold: usize,
    /// Per-membership discount applied at or above the threshold.
    pub bulk_discount: Money,
    /// Flat fee owed once per player substituted after registration.
    pub substitution_fee: Money,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            uscf_action_fee: Money::from_major(24),
            standard_late_fee: Money::from_major(5),
            special_late_fee: Money::from_major(10),
            event_date: None,
            early_deadline_days: 14,
            bulk_threshold: 24,
            bulk_discount: Money::from_major(4),
            substitution_fee: Money::from_major(2),
        }
    }
}

impl FeeSchedule {
    /// Early-registration deadline, when the event date is known.
    pub fn early_deadline(&self) -> Option<NaiveDate> {
        self.event_date?
            .checked_sub_days(Days::new(self.early_deadline_days))
    }

    /// Schedule with the bulk membership discount folded into the action fee.
    ///
    /// The orchestrator applies this before pricing when the roster's
    /// membership-action count reaches the threshold. Never goes below zero.
    pub fn with_bulk_discount(&self) -> FeeSchedule {
        let discounted = self
            .uscf_action_fee
            .checked_sub(self.bulk_discount)
            .unwrap_or(Money::ZERO)
            .max(Money::ZERO);
        FeeSchedule {
            uscf_action_fee: discounted,
            ..self.clone()
        }
    }
}

/// A roster entry with its computed fee breakdown.
///
/// Invariant: `total = base_fee + late_fee + action_fee`, each component
/// non-negative. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedLineItem {
    pub entry: RosterEntry,
    pub base_fee: Money,
    pub late_fee: Money,
    pub action_fee: Money,
    pub total: Money,
}

/// Price one sanitized roster entry.
///
/// Pure and deterministic. Fails on entries the sanitizer would never emit
/// (missing display name, missing base fee, negative amounts) rather than
/// silently billing a placeholder.
pub fn price(entry: &RosterEntry, schedule: &FeeSchedule) -> DomainResult<PricedLineItem> {
    let name = entry
        .display_name()
        .ok_or_else(|| DomainError::validation("entry has no billable display name"))?;

    let base_fee = entry
        .base_registration_fee
        .ok_or_else(|| DomainError::validation(format!("missing base fee for {name}")))?;
    if base_fee.is_negative() {
        return Err(DomainError::validation(format!(
            "negative base fee for {name}"
        )));
    }

    let late_fee = late_fee(entry, schedule)?;

    let action_fee = if entry.requests_membership_action() {
        schedule.uscf_action_fee
    } else {
        Money::ZERO
    };
    if action_fee.is_negative() {
        return Err(DomainError::validation(
            "membership-action fee cannot be negative",
        ));
    }

    let total = base_fee
        .checked_add(late_fee)
        .and_then(|t| t.checked_add(action_fee))
        .ok_or_else(|| DomainError::invariant("line item total overflow"))?;

    Ok(PricedLineItem {
        entry: entry.clone(),
        base_fee,
        late_fee,
        action_fee,
        total,
    })
}

/// Late fee for one entry. Waiver and substitution beat the override, which
/// beats the derived tier.
fn late_fee(entry: &RosterEntry, schedule: &FeeSchedule) -> DomainResult<Money> {
    if entry.waives_late_fee() {
        return Ok(Money::ZERO);
    }

    // A substituted player pays the substitution fee (billed as its own
    // invoice line, aggregated per roster) instead of any late fee.
    if entry.is_substituted() {
        return Ok(Money::ZERO);
    }

    if let Some(override_amount) = entry.late_fee_override {
        if override_amount.is_negative() {
            return Err(DomainError::validation("late-fee override cannot be negative"));
        }
        return Ok(override_amount);
    }

    // Deadline check: registrations on or before the early deadline owe
    // nothing. With no usable dates, the flat tier applies.
    if let (Some(deadline), Some(registered)) =
        (schedule.early_deadline(), entry.registration_date)
    {
        if registered <= deadline {
            return Ok(Money::ZERO);
        }
    }

    Ok(if entry.is_special_program() {
        schedule.special_late_fee
    } else {
        schedule.standard_late_fee
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn billable_entry(base: i64) -> RosterEntry {
        RosterEntry {
            player_name: Some("Ana Lopez".to_string()),
            base_registration_fee: Some(Money::from_major(base)),
            waive_late_fee: Some(false),
            membership_action: Some(false),
            special_program: Some(false),
            ..RosterEntry::default()
        }
    }

    #[test]
    fn special_program_player_gets_higher_late_tier() {
        let mut entry = billable_entry(25);
        entry.special_program = Some(true);

        let item = price(&entry, &FeeSchedule::default()).unwrap();
        assert_eq!(item.late_fee, Money::from_major(10));
        assert_eq!(item.total, Money::from_major(35));
        assert_eq!(item.action_fee, Money::ZERO);
    }

    #[test]
    fn membership_action_adds_schedule_fee() {
        let mut entry = billable_entry(25);
        entry.membership_action = Some(true);

        let item = price(&entry, &FeeSchedule::default()).unwrap();
        // 25 base + 5 standard late + 24 membership.
        assert_eq!(item.base_fee, Money::from_major(25));
        assert_eq!(item.late_fee, Money::from_major(5));
        assert_eq!(item.action_fee, Money::from_major(24));
        assert_eq!(item.total, Money::from_major(54));
    }

    #[test]
    fn waiver_beats_override_and_tier() {
        let mut entry = billable_entry(25);
        entry.waive_late_fee = Some(true);
        entry.late_fee_override = Some(Money::from_major(50));
        entry.special_program = Some(true);

        let item = price(&entry, &FeeSchedule::default()).unwrap();
        assert_eq!(item.late_fee, Money::ZERO);
    }

    #[test]
    fn substituted_player_owes_no_late_fee_even_with_override() {
        let mut entry = billable_entry(25);
        entry.is_substitution = Some(true);
        entry.late_fee_override = Some(Money::from_major(50));

        let item = price(&entry, &FeeSchedule::default()).unwrap();
        assert_eq!(item.late_fee, Money::ZERO);
        assert_eq!(item.total, Money::from_major(25));
    }

    #[test]
    fn override_beats_tier() {
        let mut entry = billable_entry(25);
        entry.late_fee_override = Some(Money::from_minor_units(250));

        let item = price(&entry, &FeeSchedule::default()).unwrap();
        assert_eq!(item.late_fee, Money::from_minor_units(250));
    }

    #[test]
    fn early_registration_owes_no_late_fee() {
        let schedule = FeeSchedule {
            event_date: NaiveDate::from_ymd_opt(2026, 10, 17),
            ..FeeSchedule::default()
        };
        let mut entry = billable_entry(25);
        entry.registration_date = NaiveDate::from_ymd_opt(2026, 10, 1);

        let item = price(&entry, &schedule).unwrap();
        assert_eq!(item.late_fee, Money::ZERO);

        entry.registration_date = NaiveDate::from_ymd_opt(2026, 10, 10);
        let item = price(&entry, &schedule).unwrap();
        assert_eq!(item.late_fee, Money::from_major(5));
    }

    #[test]
    fn unnamed_entry_is_rejected() {
        let entry = RosterEntry {
            base_registration_fee: Some(Money::from_major(25)),
            ..RosterEntry::default()
        };
        let err = price(&entry, &FeeSchedule::default()).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("display name") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn bulk_discount_reduces_action_fee_without_going_negative() {
        let schedule = FeeSchedule::default().with_bulk_discount();
        assert_eq!(schedule.uscf_action_fee, Money::from_major(20));

        let schedule = FeeSchedule {
            uscf_action_fee: Money::from_major(2),
            bulk_discount: Money::from_major(4),
            ..FeeSchedule::default()
        }
        .with_bulk_discount();
        assert_eq!(schedule.uscf_action_fee, Money::ZERO);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: pricing is deterministic and the total is exactly the
        /// sum of its components.
        #[test]
        fn total_is_sum_of_components(
            base in 0i64..10_000,
            override_minor in proptest::option::of(0i64..50_000),
            waive in any::<bool>(),
            action in any::<bool>(),
            special in any::<bool>(),
        ) {
            let entry = RosterEntry {
                player_name: Some("Test Player".to_string()),
                base_registration_fee: Some(Money::from_major(base)),
                late_fee_override: override_minor.map(Money::from_minor_units),
                waive_late_fee: Some(waive),
                membership_action: Some(action),
                special_program: Some(special),
                ..RosterEntry::default()
            };
            let schedule = FeeSchedule::default();

            let first = price(&entry, &schedule).unwrap();
            let second = price(&entry, &schedule).unwrap();
            prop_assert_eq!(&first, &second);

            let sum = first
                .base_fee
                .checked_add(first.late_fee)
                .and_then(|t| t.checked_add(first.action_fee))
                .unwrap();
            prop_assert_eq!(first.total, sum);

            if waive {
                prop_assert_eq!(first.late_fee, Money::ZERO);
            } else if let Some(minor) = override_minor {
                prop_assert_eq!(first.late_fee, Money::from_minor_units(minor));
            }
        }
    }
}
