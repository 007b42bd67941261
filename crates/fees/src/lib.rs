//! `chessbill-fees`: pure fee computation for roster entries.
//!
//! No IO, no provider types: a sanitized roster entry plus the event's fee
//! schedule in, a priced line item out.

pub mod calculator;

pub use calculator::{FeeSchedule, PricedLineItem, price};
