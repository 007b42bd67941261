//! `chessbill-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the `Money` value object, and the domain error
//! model shared by the roster, fee, billing, and request crates.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{RecordId, RequestId, UserId};
pub use money::Money;
