// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stripe PaymentIntents over the form-encoded REST API, plus webhook
//! signature verification (`Stripe-Signature`, HMAC-SHA256).

use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{error, info};

use super::{
    checked_reference, env_optional, env_or_default, env_present, env_required, http_client, str_field,
    CreatePaymentRequest, ProviderError, ProviderRef, ProviderStatus, StatusReport,
};
use crate::config::{STRIPE_API_BASE_URL_ENV, STRIPE_SECRET_KEY_ENV, STRIPE_WEBHOOK_SECRET_ENV};

type HmacSha256 = Hmac<Sha256>;

const PROVIDER: &str = "stripe";
const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
/// Maximum age of a signed webhook payload.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_base_url: String,
    pub secret_key: String,
    pub webhook_secret: Option<String>,
}

impl StripeConfig {
    pub fn is_configured() -> bool {
        env_present(STRIPE_SECRET_KEY_ENV)
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self {
            api_base_url: env_or_default(STRIPE_API_BASE_URL_ENV, DEFAULT_API_BASE_URL),
            secret_key: env_required(PROVIDER, STRIPE_SECRET_KEY_ENV)?,
            webhook_secret: env_optional(STRIPE_WEBHOOK_SECRET_ENV),
        })
    }
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

impl StripeEvent {
    /// PaymentIntent id carried by `payment_intent.*` events.
    pub fn payment_intent_id(&self) -> Option<&str> {
        if !self.type_.starts_with("payment_intent.") {
            return None;
        }
        str_field(&self.data.object, "/id")
    }

    pub fn object_status(&self) -> Option<&str> {
        str_field(&self.data.object, "/status")
    }
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    config: StripeConfig,
    http: Client,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            http: http_client(PROVIDER)?,
        })
    }

    /// Create a PaymentIntent for `amount_minor` cents.
    pub async fn create_payment_request(
        &self,
        request: CreatePaymentRequest<'_>,
    ) -> Result<ProviderRef, ProviderError> {
        let mut form = vec![
            ("amount", request.amount_minor.to_string()),
            ("currency", request.currency.to_ascii_lowercase()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[payment_id]", request.payment_id.to_string()),
        ];
        if let Some(description) = request.description {
            form.push(("description", description.to_string()));
        }

        let response = self
            .http
            .post(self.url("/v1/payment_intents"))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, format!("create payment intent failed: {e}")))?;
        let intent = Self::ensure_success(response, "create payment intent").await?;

        let id = str_field(&intent, "/id")
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "missing payment intent id"))?;
        let client_secret = str_field(&intent, "/client_secret").map(str::to_string);

        info!(payment_id = %request.payment_id, payment_intent_id = %id, "stripe payment intent created");

        Ok(ProviderRef {
            reference: id.to_string(),
            checkout_url: None,
            client_secret,
            raw_status: str_field(&intent, "/status").map(str::to_string),
        })
    }

    pub async fn query_payment_status(
        &self,
        payment_intent_id: &str,
    ) -> Result<StatusReport, ProviderError> {
        let payment_intent_id = checked_reference(PROVIDER, payment_intent_id)?;
        let response = self
            .http
            .get(self.url(&format!("/v1/payment_intents/{payment_intent_id}")))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.secret_key))
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, format!("retrieve payment intent failed: {e}")))?;
        let intent = Self::ensure_success(response, "retrieve payment intent").await?;

        let status = str_field(&intent, "/status")
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "missing payment intent status"))?;
        Ok(StatusReport {
            status: map_intent_status(status),
            raw_status: status.to_string(),
        })
    }

    /// Verify the `Stripe-Signature` header and parse the event.
    pub fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<StripeEvent, ProviderError> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .ok_or_else(|| ProviderError::MissingConfig {
                provider: PROVIDER,
                name: STRIPE_WEBHOOK_SECRET_ENV.to_string(),
            })?;
        verify_webhook_signature(secret, payload, signature_header, now)?;

        serde_json::from_slice(payload)
            .map_err(|e| ProviderError::invalid(PROVIDER, format!("invalid event payload: {e}")))
    }

    /// Log Stripe's error envelope and fail with the body attached.
    async fn ensure_success(response: reqwest::Response, context: &str) -> Result<Value, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ProviderError::invalid(PROVIDER, format!("{context} invalid JSON: {e}")));
        }

        let request_id = response
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let envelope: Option<Value> = serde_json::from_str(&body).ok();
        let error_code = envelope
            .as_ref()
            .and_then(|v| str_field(v, "/error/code"))
            .map(str::to_string);

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_code = ?error_code,
            context = %context,
            "stripe api request failed"
        );

        Err(ProviderError::request(
            PROVIDER,
            format!("{context} returned {status}: {body}"),
        ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }
}

pub fn map_intent_status(raw_status: &str) -> ProviderStatus {
    match raw_status.trim().to_ascii_lowercase().as_str() {
        "succeeded" => ProviderStatus::Success,
        "canceled" => ProviderStatus::Error,
        _ => ProviderStatus::Pending,
    }
}

/// Check `t=<ts>,v1=<hex>` against `HMAC-SHA256(secret, "<ts>.<payload>")`.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
    now: i64,
) -> Result<(), ProviderError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("t=") {
            timestamp = Some(rest);
        } else if let Some(rest) = part.strip_prefix("v1=") {
            signatures.push(rest);
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ProviderError::Signature("missing timestamp".to_string()))?;
    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| ProviderError::Signature("malformed timestamp".to_string()))?;
    if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(ProviderError::Signature("timestamp outside tolerance".to_string()));
    }
    if signatures.is_empty() {
        return Err(ProviderError::Signature("missing v1 signature".to_string()));
    }

    for signature in signatures {
        let Ok(provided) = hex::decode(signature) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ProviderError::Signature(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&provided).is_ok() {
            return Ok(());
        }
    }

    Err(ProviderError::Signature("no matching v1 signature".to_string()))
}

#[cfg(test)]
pub(crate) fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "whsec_test";

    fn client(server: &MockServer) -> StripeClient {
        StripeClient::new(StripeConfig {
            api_base_url: server.uri(),
            secret_key: "sk_test_123".into(),
            webhook_secret: Some(SECRET.into()),
        })
        .unwrap()
    }

    #[test]
    fn intent_statuses_map_to_tri_state() {
        assert_eq!(map_intent_status("succeeded"), ProviderStatus::Success);
        assert_eq!(map_intent_status("canceled"), ProviderStatus::Error);
        assert_eq!(map_intent_status("requires_payment_method"), ProviderStatus::Pending);
        assert_eq!(map_intent_status("processing"), ProviderStatus::Pending);
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let header = sign_payload(SECRET, payload, 1_700_000_000);
        assert!(verify_webhook_signature(SECRET, payload, &header, 1_700_000_010).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let header = sign_payload(SECRET, b"original", 1_700_000_000);
        let result = verify_webhook_signature(SECRET, b"tampered", &header, 1_700_000_000);
        assert!(matches!(result, Err(ProviderError::Signature(_))));
    }

    #[test]
    fn stale_signature_is_rejected() {
        let header = sign_payload(SECRET, b"{}", 1_700_000_000);
        let result = verify_webhook_signature(SECRET, b"{}", &header, 1_700_000_000 + 301);
        assert!(matches!(result, Err(ProviderError::Signature(_))));
    }

    #[test]
    fn verify_webhook_parses_intent_event() {
        let server_less = StripeClient::new(StripeConfig {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            secret_key: "sk".into(),
            webhook_secret: Some(SECRET.into()),
        })
        .unwrap();
        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1","status":"succeeded"}}}"#;
        let header = sign_payload(SECRET, payload, 1_700_000_000);

        let event = server_less.verify_webhook(payload, &header, 1_700_000_000).unwrap();
        assert_eq!(event.payment_intent_id(), Some("pi_1"));
        assert_eq!(event.object_status(), Some("succeeded"));
    }

    #[tokio::test]
    async fn create_intent_posts_cents_and_lowercase_currency() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(header("Authorization", "Bearer sk_test_123"))
            .and(body_string_contains("amount=10000"))
            .and(body_string_contains("currency=eur"))
            .and(body_string_contains("metadata%5Bpayment_id%5D=p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_1",
                "status": "requires_payment_method",
                "client_secret": "pi_1_secret_abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server)
            .create_payment_request(CreatePaymentRequest {
                payment_id: "p1",
                amount_minor: 10_000,
                currency: "EUR",
                description: None,
                return_url: None,
            })
            .await
            .unwrap();
        assert_eq!(created.reference, "pi_1");
        assert_eq!(created.client_secret.as_deref(), Some("pi_1_secret_abc"));
    }

    #[tokio::test]
    async fn stripe_error_body_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "resource_missing", "message": "No such payment_intent" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).query_payment_status("pi_404").await.unwrap_err();
        assert!(err.to_string().contains("No such payment_intent"));
    }

    #[tokio::test]
    async fn status_query_rejects_ids_that_escape_the_intents_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "succeeded" })))
            .expect(0)
            .mount(&server)
            .await;

        let result = client(&server)
            .query_payment_status("../customers?limit=100")
            .await;
        assert!(matches!(result, Err(ProviderError::InvalidReference { .. })));
    }
}
