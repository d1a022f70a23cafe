// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Domain error taxonomy for payment operations.

use crate::providers::ProviderError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Missing credentials, network failure or non-2xx provider answer.
    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider answered without a field we depend on.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),
}

impl From<StorageError> for PaymentError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(what) => PaymentError::RecordNotFound(what),
            other => PaymentError::Storage(other),
        }
    }
}

impl From<ProviderError> for PaymentError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::InvalidResponse { .. } => PaymentError::InvalidResponse(error.to_string()),
            ProviderError::Signature(_) | ProviderError::InvalidReference { .. } => {
                PaymentError::ValidationError(error.to_string())
            }
            other => PaymentError::ProviderUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PaymentProvider;

    #[test]
    fn storage_not_found_becomes_record_not_found() {
        let error: PaymentError = StorageError::NotFound("Payment p1".into()).into();
        assert!(matches!(error, PaymentError::RecordNotFound(ref what) if what == "Payment p1"));
    }

    #[test]
    fn provider_errors_split_between_unavailable_and_invalid() {
        let unavailable: PaymentError = ProviderError::NotConfigured(PaymentProvider::Qonto).into();
        assert!(matches!(unavailable, PaymentError::ProviderUnavailable(_)));

        let invalid: PaymentError = ProviderError::InvalidResponse {
            provider: "revolut",
            message: "missing checkout_url".into(),
        }
        .into();
        assert!(matches!(invalid, PaymentError::InvalidResponse(ref m) if m.contains("checkout_url")));

        let request: PaymentError = ProviderError::Request {
            provider: "stripe",
            message: "returned 402: card_declined".into(),
        }
        .into();
        assert!(request.to_string().contains("card_declined"));

        let reference: PaymentError = ProviderError::InvalidReference {
            provider: "revolut",
            reference: "../customers".into(),
        }
        .into();
        assert!(matches!(reference, PaymentError::ValidationError(_)));
    }
}
