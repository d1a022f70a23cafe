// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Revolut Merchant orders.

use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::info;

use super::{
    checked_reference, env_or_default, env_present, env_required, http_client, read_json, str_field,
    CreatePaymentRequest, ProviderError, ProviderRef, ProviderStatus, StatusReport,
};
use crate::config::{REVOLUT_API_BASE_URL_ENV, REVOLUT_API_KEY_ENV, REVOLUT_API_VERSION_ENV};

const PROVIDER: &str = "revolut";
const DEFAULT_API_BASE_URL: &str = "https://sandbox-merchant.revolut.com";
const DEFAULT_API_VERSION: &str = "2024-09-01";

#[derive(Debug, Clone)]
pub struct RevolutConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub api_version: String,
}

impl RevolutConfig {
    pub fn is_configured() -> bool {
        env_present(REVOLUT_API_KEY_ENV)
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self {
            api_base_url: env_or_default(REVOLUT_API_BASE_URL_ENV, DEFAULT_API_BASE_URL),
            api_key: env_required(PROVIDER, REVOLUT_API_KEY_ENV)?,
            api_version: env_or_default(REVOLUT_API_VERSION_ENV, DEFAULT_API_VERSION),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RevolutClient {
    config: RevolutConfig,
    http: Client,
}

impl RevolutClient {
    pub fn new(config: RevolutConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            http: http_client(PROVIDER)?,
        })
    }

    /// Create an order with a hosted checkout page.
    pub async fn create_payment_request(
        &self,
        request: CreatePaymentRequest<'_>,
    ) -> Result<ProviderRef, ProviderError> {
        let mut payload = json!({
            "amount": request.amount_minor,
            "currency": request.currency.to_ascii_uppercase(),
            "merchant_order_ext_ref": request.payment_id,
            "metadata": { "payment_id": request.payment_id },
        });
        if let Some(description) = request.description {
            payload["description"] = Value::String(description.to_string());
        }
        if let Some(return_url) = request.return_url {
            payload["redirect_url"] = Value::String(return_url.to_string());
        }

        let response = self
            .authorized(self.http.post(self.url("/api/orders")))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, format!("POST /api/orders failed: {e}")))?;
        let order = read_json(PROVIDER, "POST /api/orders", response).await?;

        let id = str_field(&order, "/id")
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "missing order id in response"))?;
        let checkout_url = str_field(&order, "/checkout_url")
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "missing checkout_url in response"))?;

        info!(payment_id = %request.payment_id, order_id = %id, "revolut order created");

        Ok(ProviderRef {
            reference: id.to_string(),
            checkout_url: Some(checkout_url.to_string()),
            client_secret: None,
            raw_status: str_field(&order, "/state").map(str::to_string),
        })
    }

    /// Raw order object as returned by Revolut.
    pub async fn get_order(&self, order_id: &str) -> Result<Value, ProviderError> {
        let order_id = checked_reference(PROVIDER, order_id)?;
        let path = format!("/api/orders/{order_id}");
        let response = self
            .authorized(self.http.get(self.url(&path)))
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, format!("GET {path} failed: {e}")))?;
        read_json(PROVIDER, &format!("GET {path}"), response).await
    }

    pub async fn query_payment_status(&self, order_id: &str) -> Result<StatusReport, ProviderError> {
        let order = self.get_order(order_id).await?;
        let state = str_field(&order, "/state")
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "missing order state"))?;
        Ok(StatusReport {
            status: map_order_state(state),
            raw_status: state.to_string(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.config.api_key)
            .header("Revolut-Api-Version", &self.config.api_version)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }
}

pub fn map_order_state(raw_state: &str) -> ProviderStatus {
    match raw_state.trim().to_ascii_lowercase().as_str() {
        "completed" => ProviderStatus::Success,
        "failed" | "cancelled" => ProviderStatus::Error,
        _ => ProviderStatus::Pending,
    }
}
