// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Qonto payment links.
//!
//! Qonto authenticates with a raw `Authorization: <login>:<secret key>`
//! header. The status of a link is derived from two calls: the link itself
//! and the payments made through it.

use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use utoipa::ToSchema;

use super::{
    checked_reference, env_or_default, env_present, env_required, format_minor, http_client, read_json, str_field,
    CreatePaymentRequest, ProviderError, ProviderRef, ProviderStatus, StatusReport,
};
use crate::config::{QONTO_API_BASE_URL_ENV, QONTO_LOGIN_ENV, QONTO_SECRET_KEY_ENV};

const PROVIDER: &str = "qonto";
const DEFAULT_API_BASE_URL: &str = "https://thirdparty.qonto.com";
const PAID_STATUS: &str = "paid";

#[derive(Debug, Clone)]
pub struct QontoConfig {
    pub api_base_url: String,
    pub login: String,
    pub secret_key: String,
}

impl QontoConfig {
    pub fn is_configured() -> bool {
        env_present(QONTO_LOGIN_ENV) && env_present(QONTO_SECRET_KEY_ENV)
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self {
            api_base_url: env_or_default(QONTO_API_BASE_URL_ENV, DEFAULT_API_BASE_URL),
            login: env_required(PROVIDER, QONTO_LOGIN_ENV)?,
            secret_key: env_required(PROVIDER, QONTO_SECRET_KEY_ENV)?,
        })
    }
}

/// Normalized view of a payment link and its payments.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QontoLinkStatus {
    pub link_status: String,
    pub has_successful_payment: bool,
    #[schema(value_type = Vec<Object>)]
    pub payments: Vec<Value>,
}

impl QontoLinkStatus {
    pub fn from_parts(link_status: String, payments: Vec<Value>) -> Self {
        let has_successful_payment = payments
            .iter()
            .any(|payment| str_field(payment, "/status") == Some(PAID_STATUS));
        Self {
            link_status,
            has_successful_payment,
            payments,
        }
    }

    /// A successful payment wins over the link status.
    pub fn derive_status(&self) -> ProviderStatus {
        if self.has_successful_payment {
            return ProviderStatus::Success;
        }
        match self.link_status.trim().to_ascii_lowercase().as_str() {
            "expired" | "cancelled" | "canceled" => ProviderStatus::Error,
            _ => ProviderStatus::Pending,
        }
    }

    /// Status report with `paid` as raw status once a payment succeeded.
    pub fn report(&self) -> StatusReport {
        let raw_status = if self.has_successful_payment {
            PAID_STATUS.to_string()
        } else {
            self.link_status.clone()
        };
        StatusReport {
            status: self.derive_status(),
            raw_status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QontoClient {
    config: QontoConfig,
    http: Client,
}

impl QontoClient {
    pub fn new(config: QontoConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            http: http_client(PROVIDER)?,
        })
    }

    /// Create a single-use payment link.
    pub async fn create_payment_request(
        &self,
        request: CreatePaymentRequest<'_>,
    ) -> Result<ProviderRef, ProviderError> {
        let title = request
            .description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Paiement {}", request.payment_id));

        let payload = json!({
            "payment_link": {
                "potential_payment_methods": ["credit_card", "apple_pay", "paypal", "ideal"],
                "reusable": false,
                "items": [{
                    "title": title,
                    "quantity": 1,
                    "unit_price": {
                        "value": format_minor(request.amount_minor),
                        "currency": request.currency.to_ascii_uppercase(),
                    },
                    "vat_rate": "0",
                }],
                "metadata": { "payment_id": request.payment_id },
            }
        });

        let response = self
            .http
            .post(self.url("/v2/payment_links"))
            .header("Authorization", self.auth_header())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, format!("POST /v2/payment_links failed: {e}")))?;
        let body = read_json(PROVIDER, "POST /v2/payment_links", response).await?;
        let link = body.get("payment_link").unwrap_or(&body);

        let id = str_field(link, "/id")
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "missing payment link id in response"))?;
        let url = str_field(link, "/url")
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "missing payment link url in response"))?;
        let status = str_field(link, "/status").unwrap_or("open");

        info!(payment_id = %request.payment_id, payment_link_id = %id, "qonto payment link created");

        Ok(ProviderRef {
            reference: id.to_string(),
            checkout_url: Some(url.to_string()),
            client_secret: None,
            raw_status: Some(status.to_string()),
        })
    }

    /// Fetch the link and its payments.
    pub async fn link_status(&self, payment_link_id: &str) -> Result<QontoLinkStatus, ProviderError> {
        let payment_link_id = checked_reference(PROVIDER, payment_link_id)?;
        let link_path = format!("/v2/payment_links/{payment_link_id}");
        let link = self.get_json(&link_path).await?;
        let link = link.get("payment_link").cloned().unwrap_or(link);
        let link_status = str_field(&link, "/status")
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "missing payment link status"))?
            .to_string();

        let payments = self.get_json(&format!("{link_path}/payments")).await?;
        let payments = payments
            .get("payments")
            .or_else(|| payments.get("data"))
            .and_then(Value::as_array)
            .cloned()
            .or_else(|| payments.as_array().cloned())
            .unwrap_or_default();

        Ok(QontoLinkStatus::from_parts(link_status, payments))
    }

    pub async fn query_payment_status(
        &self,
        payment_link_id: &str,
    ) -> Result<StatusReport, ProviderError> {
        Ok(self.link_status(payment_link_id).await?.report())
    }

    async fn get_json(&self, path: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(self.url(path))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, format!("GET {path} failed: {e}")))?;
        read_json(PROVIDER, &format!("GET {path}"), response).await
    }

    fn auth_header(&self) -> String {
        format!("{}:{}", self.config.login, self.config.secret_key)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }
}
