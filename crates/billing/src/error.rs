//! Billing error model.
//!
//! Provider failures are never swallowed: the structured category/code/detail
//! triple crosses this boundary intact so callers can handle specific
//! rejections programmatically while still getting one readable message.

use thiserror::Error;

use crate::provider::ProviderError;
use chessbill_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// The request shape or roster data failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unrecoverable roster entries under the fail-closed policy.
    #[error("{count} player record(s) could not be recovered; refusing to bill placeholder names")]
    UnrecoverableEntries { count: usize },

    /// The provider rejected a call; carries its structured error verbatim.
    #[error("provider rejected the request [{category}/{code}]: {detail}")]
    ExternalService {
        category: String,
        code: String,
        detail: String,
    },

    /// A referenced provider resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A bounded wait (e.g. for invoice URL propagation) was exceeded.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A deterministic domain failure surfaced during pricing.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<ProviderError> for BillingError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::Api {
                category,
                code,
                detail,
            } => BillingError::ExternalService {
                category,
                code,
                detail,
            },
            ProviderError::NotFound(what) => BillingError::NotFound(what),
            ProviderError::Transport(detail) => BillingError::ExternalService {
                category: "NETWORK".to_string(),
                code: "TRANSPORT_ERROR".to_string(),
                detail,
            },
        }
    }
}
