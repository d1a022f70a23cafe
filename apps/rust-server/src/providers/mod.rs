// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External payment provider adapters.
//!
//! Every adapter creates a provider-side payment object for an internal
//! payment record and reports its status as a [`ProviderStatus`]. Amounts
//! reaching an adapter are always integer minor units (cents).

pub mod qonto;
pub mod revolut;
pub mod revolut_oauth;
pub mod stripe;

use std::{sync::Arc, time::Duration};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::storage::PaymentProvider;

pub use qonto::{QontoClient, QontoConfig, QontoLinkStatus};
pub use revolut::{RevolutClient, RevolutConfig};
pub use revolut_oauth::{RevolutOAuthClient, RevolutOAuthConfig, TokenCache, TokenFetcher};
pub use stripe::{StripeClient, StripeConfig, StripeEvent};

/// Outbound request timeout shared by every provider client.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Tri-state status reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Success,
    Pending,
    Error,
}

/// Provider-side object created for a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRef {
    /// Correlation id (intent id, payment link id or order id).
    pub reference: String,
    /// Hosted checkout page, when the provider has one.
    pub checkout_url: Option<String>,
    /// Client secret for front-end confirmation (Stripe).
    pub client_secret: Option<String>,
    /// Status reported at creation time.
    pub raw_status: Option<String>,
}

/// Status as observed on the provider, with the raw value kept for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: ProviderStatus,
    pub raw_status: String,
}

/// Parameters of a payment creation request.
#[derive(Debug, Clone, Copy)]
pub struct CreatePaymentRequest<'a> {
    pub payment_id: &'a str,
    pub amount_minor: u64,
    pub currency: &'a str,
    pub description: Option<&'a str>,
    /// Where the provider sends the payer back after checkout.
    pub return_url: Option<&'a str>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} configuration missing: {name}")]
    MissingConfig { provider: &'static str, name: String },

    #[error("{0} is not configured")]
    NotConfigured(PaymentProvider),

    #[error("{provider} auth failed: {message}")]
    Auth {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} request failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} response was invalid: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} reference is not a valid id: {reference:?}")]
    InvalidReference {
        provider: &'static str,
        reference: String,
    },

    #[error("webhook signature rejected: {0}")]
    Signature(String),
}

impl ProviderError {
    pub(crate) fn request(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Request {
            provider,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider,
            message: message.into(),
        }
    }
}

/// The provider clients configured for this process.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    pub stripe: Option<Arc<StripeClient>>,
    pub qonto: Option<Arc<QontoClient>>,
    pub revolut: Option<Arc<RevolutClient>>,
    pub revolut_oauth: Option<Arc<RevolutOAuthClient>>,
}

impl ProviderRegistry {
    /// Register every provider whose credentials are present. A provider
    /// whose configuration is present but broken is logged and skipped.
    pub fn from_env() -> Self {
        fn load<T>(name: &str, configured: bool, build: impl FnOnce() -> Result<T, ProviderError>) -> Option<Arc<T>> {
            if !configured {
                tracing::info!(provider = name, "provider not configured");
                return None;
            }
            match build() {
                Ok(client) => {
                    tracing::info!(provider = name, "provider configured");
                    Some(Arc::new(client))
                }
                Err(error) => {
                    tracing::error!(provider = name, error = %error, "provider configuration invalid");
                    None
                }
            }
        }

        Self {
            stripe: load("stripe", StripeConfig::is_configured(), || {
                StripeClient::new(StripeConfig::from_env()?)
            }),
            qonto: load("qonto", QontoConfig::is_configured(), || {
                QontoClient::new(QontoConfig::from_env()?)
            }),
            revolut: load("revolut", RevolutConfig::is_configured(), || {
                RevolutClient::new(RevolutConfig::from_env()?)
            }),
            revolut_oauth: load("revolut_oauth", RevolutOAuthConfig::is_configured(), || {
                RevolutOAuthClient::new(RevolutOAuthConfig::from_env()?)
            }),
        }
    }

    pub fn is_configured(&self, provider: PaymentProvider) -> bool {
        match provider {
            PaymentProvider::Stripe => self.stripe.is_some(),
            PaymentProvider::Qonto => self.qonto.is_some(),
            PaymentProvider::Revolut => self.revolut.is_some(),
        }
    }

    /// Create the provider-side object for a payment.
    pub async fn create_payment_request(
        &self,
        provider: PaymentProvider,
        request: CreatePaymentRequest<'_>,
    ) -> Result<ProviderRef, ProviderError> {
        match provider {
            PaymentProvider::Stripe => self.stripe()?.create_payment_request(request).await,
            PaymentProvider::Qonto => self.qonto()?.create_payment_request(request).await,
            PaymentProvider::Revolut => self.revolut()?.create_payment_request(request).await,
        }
    }

    /// Query the live status of a provider-side object.
    pub async fn query_payment_status(
        &self,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<StatusReport, ProviderError> {
        match provider {
            PaymentProvider::Stripe => self.stripe()?.query_payment_status(reference).await,
            PaymentProvider::Qonto => self.qonto()?.query_payment_status(reference).await,
            PaymentProvider::Revolut => self.revolut()?.query_payment_status(reference).await,
        }
    }

    pub fn stripe(&self) -> Result<&StripeClient, ProviderError> {
        self.stripe
            .as_deref()
            .ok_or(ProviderError::NotConfigured(PaymentProvider::Stripe))
    }

    pub fn qonto(&self) -> Result<&QontoClient, ProviderError> {
        self.qonto
            .as_deref()
            .ok_or(ProviderError::NotConfigured(PaymentProvider::Qonto))
    }

    pub fn revolut(&self) -> Result<&RevolutClient, ProviderError> {
        self.revolut
            .as_deref()
            .ok_or(ProviderError::NotConfigured(PaymentProvider::Revolut))
    }

    pub fn revolut_oauth(&self) -> Result<&RevolutOAuthClient, ProviderError> {
        self.revolut_oauth
            .as_deref()
            .ok_or(ProviderError::NotConfigured(PaymentProvider::Revolut))
    }
}

pub(crate) fn http_client(provider: &'static str) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::request(provider, format!("failed to build HTTP client: {e}")))
}

/// Decode a JSON body, turning non-2xx responses into `Request` errors that
/// carry the provider's body verbatim.
pub(crate) async fn read_json(
    provider: &'static str,
    context: &str,
    response: reqwest::Response,
) -> Result<Value, ProviderError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::request(
            provider,
            format!("{context} returned {status}: {body}"),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::invalid(provider, format!("{context} invalid JSON: {e}")))
}

const MAX_REFERENCE_LEN: usize = 128;

/// Provider ids are spliced into request paths as one segment, so only
/// `[A-Za-z0-9_-]` is accepted.
pub(crate) fn checked_reference<'a>(
    provider: &'static str,
    reference: &'a str,
) -> Result<&'a str, ProviderError> {
    let valid = !reference.is_empty()
        && reference.len() <= MAX_REFERENCE_LEN
        && reference
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(reference)
    } else {
        Err(ProviderError::InvalidReference {
            provider,
            reference: reference.to_string(),
        })
    }
}

pub(crate) fn str_field<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Format minor units as a decimal string with two places.
pub(crate) fn format_minor(amount_minor: u64) -> String {
    format!("{}.{:02}", amount_minor / 100, amount_minor % 100)
}

pub(crate) fn env_present(name: &str) -> bool {
    env_optional(name).is_some()
}

pub(crate) fn env_required(provider: &'static str, name: &str) -> Result<String, ProviderError> {
    env_optional(name).ok_or_else(|| ProviderError::MissingConfig {
        provider,
        name: name.to_string(),
    })
}

pub(crate) fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}
