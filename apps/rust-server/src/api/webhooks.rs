// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider webhook receivers.
//!
//! Qonto deliveries are always acknowledged with 200 so the provider does not
//! retry forever on a payload we cannot use; failures are logged. They carry
//! no signature, so a claimed payment is confirmed against the live link
//! whenever the Qonto client is configured. Stripe deliveries are signed and
//! a bad signature is answered with 400.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    providers::ProviderError,
    reconciliation::{PaymentError, QontoWebhookEvent, WebhookOutcome},
    state::AppState,
    storage::{AuditEvent, AuditEventType, AuditRepository},
};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

fn ack() -> Json<WebhookAck> {
    Json(WebhookAck { received: true })
}

fn record(state: &AppState, event: AuditEvent) {
    if let Err(error) = AuditRepository::new(&state.storage).log(&event) {
        warn!(error = %error, "failed to write audit event");
    }
}

fn log_outcome(state: &AppState, provider: &str, event_type: &str, outcome: Result<WebhookOutcome, PaymentError>) {
    match outcome {
        Ok(WebhookOutcome::Applied(outcome)) => {
            info!(
                provider,
                event_type,
                payment_id = %outcome.payment.id,
                status = %outcome.payment.status,
                status_changed = outcome.status_changed,
                project_promoted = outcome.project_promoted,
                "webhook reconciled"
            );
            record(
                state,
                AuditEvent::new(AuditEventType::WebhookReceived)
                    .with_resource("payment", &outcome.payment.id)
                    .with_details(json!({ "provider": provider, "event_type": event_type })),
            );
        }
        Ok(WebhookOutcome::UnknownReference(reference)) => {
            warn!(provider, event_type, reference = %reference, "webhook for unknown payment");
        }
        Ok(WebhookOutcome::Ignored(reason)) => {
            info!(provider, event_type, reason, "webhook ignored");
        }
        Err(error) => {
            warn!(provider, event_type, error = %error, "webhook reconciliation failed");
        }
    }
}

/// Qonto webhook: `{ "event_type": "...", "data": { ... } }`.
#[utoipa::path(
    post,
    path = "/v1/webhooks/qonto",
    tag = "Webhooks",
    request_body = QontoWebhookEvent,
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck)
    )
)]
pub async fn qonto_webhook(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    let event: QontoWebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(error) => {
            warn!(error = %error, "unreadable qonto webhook payload");
            return ack();
        }
    };

    let outcome = state.reconciler.confirm_qonto_webhook(&event).await;
    log_outcome(&state, "qonto", &event.event_type, outcome);
    ack()
}

/// Stripe webhook, verified against `Stripe-Signature`.
#[utoipa::path(
    post,
    path = "/v1/webhooks/stripe",
    tag = "Webhooks",
    request_body(content = String, description = "Raw Stripe event JSON"),
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature"),
        (status = 503, description = "Stripe webhooks not configured")
    )
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let stripe = state.providers().stripe().map_err(PaymentError::from)?;
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let event = match stripe.verify_webhook(&body, signature, chrono::Utc::now().timestamp()) {
        Ok(event) => event,
        Err(ProviderError::MissingConfig { name, .. }) => {
            return Err(ApiError::service_unavailable(format!("{name} is not set")));
        }
        Err(error) => {
            warn!(error = %error, "stripe webhook rejected");
            record(
                &state,
                AuditEvent::new(AuditEventType::WebhookRejected)
                    .with_details(json!({ "provider": "stripe" }))
                    .failed(error.to_string()),
            );
            return Err(ApiError::new(StatusCode::BAD_REQUEST, error.to_string()));
        }
    };

    let outcome = state.reconciler.handle_stripe_event(&event);
    log_outcome(&state, "stripe", &event.type_, outcome);
    Ok(ack())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::stripe::sign_payload;
    use crate::providers::{
        ProviderRegistry, QontoClient, QontoConfig, StripeClient, StripeConfig,
    };
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use crate::state::test_support::{test_state, test_state_with};
    use crate::storage::{
        PaymentRepository, PaymentStatus, ProjectRepository, ProjectStatus, StoredPayment,
        StoredProject,
    };
    use std::sync::Arc;

    const SECRET: &str = "whsec_test";

    fn seed_qonto_payment(state: &AppState) {
        ProjectRepository::new(&state.storage)
            .create(&StoredProject::new(
                "proj_1".into(),
                "Cuisine".into(),
                "client_1".into(),
                None,
                None,
            ))
            .unwrap();
        let mut payment =
            StoredPayment::new_pending("p2".into(), "proj_1".into(), 10_000, "EUR".into(), None);
        payment.attach_qonto("pl_1".into(), "open".into(), "https://pay.qonto.com/pl_1".into());
        PaymentRepository::new(&state.storage).create(&payment).unwrap();
    }

    fn stripe_state() -> (AppState, tempfile::TempDir) {
        let client = StripeClient::new(StripeConfig {
            api_base_url: "http://127.0.0.1:9".into(),
            secret_key: "sk_test".into(),
            webhook_secret: Some(SECRET.into()),
        })
        .unwrap();
        test_state_with(ProviderRegistry {
            stripe: Some(Arc::new(client)),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn qonto_paid_webhook_validates_and_promotes() {
        let (state, _temp_dir) = test_state();
        seed_qonto_payment(&state);

        let body = Bytes::from_static(
            br#"{"event_type":"payment_link.paid","data":{"payment_link_id":"pl_1"}}"#,
        );
        let Json(ack) = qonto_webhook(State(state.clone()), body).await;
        assert!(ack.received);

        let payment = PaymentRepository::new(&state.storage).get("p2").unwrap();
        assert_eq!(payment.status, PaymentStatus::Validated);
        assert_eq!(payment.qonto_status.as_deref(), Some("paid"));
        let project = ProjectRepository::new(&state.storage).get("proj_1").unwrap();
        assert_eq!(project.status, ProjectStatus::InProgress);
    }

    async fn qonto_state(
        server: &MockServer,
        live_link_status: &str,
        live_payments: serde_json::Value,
    ) -> (AppState, tempfile::TempDir) {
        Mock::given(method("GET"))
            .and(path("/v2/payment_links/pl_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_link": { "id": "pl_1", "status": live_link_status }
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/payment_links/pl_1/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "payments": live_payments })))
            .expect(1)
            .mount(server)
            .await;

        let qonto = QontoClient::new(QontoConfig {
            api_base_url: server.uri(),
            login: "acme".into(),
            secret_key: "sk".into(),
        })
        .unwrap();
        test_state_with(ProviderRegistry {
            qonto: Some(Arc::new(qonto)),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn forged_qonto_paid_webhook_is_checked_against_the_link() {
        let server = MockServer::start().await;
        let (state, _temp_dir) = qonto_state(&server, "open", json!([])).await;
        seed_qonto_payment(&state);

        let body = Bytes::from_static(
            br#"{"event_type":"payment_link.paid","data":{"payment_link_id":"pl_1"}}"#,
        );
        let Json(ack) = qonto_webhook(State(state.clone()), body).await;
        assert!(ack.received);

        let payment = PaymentRepository::new(&state.storage).get("p2").unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.qonto_status.as_deref(), Some("open"));
        let project = ProjectRepository::new(&state.storage).get("proj_1").unwrap();
        assert_eq!(project.status, ProjectStatus::Pending);
    }

    #[tokio::test]
    async fn qonto_paid_webhook_confirmed_by_link_validates() {
        let server = MockServer::start().await;
        let (state, _temp_dir) =
            qonto_state(&server, "open", json!([{ "id": "pay_1", "status": "paid" }])).await;
        seed_qonto_payment(&state);

        let body = Bytes::from_static(
            br#"{"event_type":"payment_link.paid","data":{"payment_link_id":"pl_1"}}"#,
        );
        qonto_webhook(State(state.clone()), body).await;

        let payment = PaymentRepository::new(&state.storage).get("p2").unwrap();
        assert_eq!(payment.status, PaymentStatus::Validated);
        let project = ProjectRepository::new(&state.storage).get("proj_1").unwrap();
        assert_eq!(project.status, ProjectStatus::InProgress);
    }

    #[tokio::test]
    async fn qonto_garbage_is_still_acknowledged() {
        let (state, _temp_dir) = test_state();
        let Json(ack) = qonto_webhook(State(state), Bytes::from_static(b"not json")).await;
        assert!(ack.received);
    }

    #[tokio::test]
    async fn qonto_unknown_link_is_acknowledged() {
        let (state, _temp_dir) = test_state();
        let body = Bytes::from_static(
            br#"{"event_type":"payment_link.paid","data":{"payment_link_id":"pl_missing"}}"#,
        );
        let Json(ack) = qonto_webhook(State(state), body).await;
        assert!(ack.received);
    }

    #[tokio::test]
    async fn stripe_webhook_requires_configuration() {
        let (state, _temp_dir) = test_state();
        let error = stripe_webhook(State(state), HeaderMap::new(), Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert_eq!(error.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn stripe_webhook_rejects_bad_signature() {
        let (state, _temp_dir) = stripe_state();
        let mut headers = HeaderMap::new();
        headers.insert(STRIPE_SIGNATURE_HEADER, "t=1,v1=deadbeef".parse().unwrap());

        let error = stripe_webhook(State(state), headers, Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_stripe_success_validates_payment() {
        let (state, _temp_dir) = stripe_state();
        ProjectRepository::new(&state.storage)
            .create(&StoredProject::new(
                "proj_s".into(),
                "Toiture".into(),
                "client_1".into(),
                None,
                None,
            ))
            .unwrap();
        let mut payment =
            StoredPayment::new_pending("ps".into(), "proj_s".into(), 5_000, "EUR".into(), None);
        payment.attach_stripe("pi_1".into(), Some("requires_payment_method".into()));
        PaymentRepository::new(&state.storage).create(&payment).unwrap();

        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1","status":"succeeded"}}}"#;
        let now = chrono::Utc::now().timestamp();
        let mut headers = HeaderMap::new();
        headers.insert(
            STRIPE_SIGNATURE_HEADER,
            sign_payload(SECRET, payload, now).parse().unwrap(),
        );

        let Json(ack) = stripe_webhook(State(state.clone()), headers, Bytes::from_static(payload))
            .await
            .unwrap();
        assert!(ack.received);

        let payment = PaymentRepository::new(&state.storage).get("ps").unwrap();
        assert_eq!(payment.status, PaymentStatus::Validated);
        assert_eq!(payment.provider_status.as_deref(), Some("succeeded"));
        let project = ProjectRepository::new(&state.storage).get("proj_s").unwrap();
        assert_eq!(project.status, ProjectStatus::InProgress);
    }
}
