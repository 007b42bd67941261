//! `chessbill-roster`: roster entries and the record recovery pipeline.
//!
//! Roster data arrives from upstream callers in an untrusted shape: display
//! names may be missing or corrupted by failed string concatenation, fees and
//! flags may be absent. This crate owns the one place where that input is
//! repaired and normalized before anything downstream prices or bills it.

pub mod entry;
pub mod recovery;

pub use entry::{NEW_MEMBER_SENTINEL, RosterEntry};
pub use recovery::{
    RecoveredRosterEntry, RecoveryAction, RecoveryMethod, RecoveryOutcome, RecoveryReport,
    RecoverySummary, recover,
};
