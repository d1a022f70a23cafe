// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    providers::{ProviderStatus, QontoLinkStatus},
    reconciliation::{ConfirmationState, ConfirmationView, QontoWebhookEvent},
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, PaymentProvider, PaymentStatus, ProjectStatus, StoredPayment,
    },
};

pub mod admin;
pub mod health;
pub mod payments;
pub mod projects;
pub mod provider_status;
pub mod webhooks;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/projects/{project_id}", get(projects::get_project))
        .route(
            "/projects/{project_id}/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route("/payments/{payment_id}", get(payments::get_payment))
        .route(
            "/payments/{payment_id}/checkout",
            post(payments::checkout_payment),
        )
        .route(
            "/payments/{payment_id}/confirmation",
            get(payments::payment_confirmation),
        )
        .route(
            "/qonto/payment-links/status",
            get(provider_status::qonto_link_status),
        )
        .route(
            "/revolut/orders/status",
            get(provider_status::revolut_order_status),
        )
        .route("/webhooks/qonto", post(webhooks::qonto_webhook))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/admin/audit", get(admin::query_audit_logs))
        .route(
            "/admin/revolut/transactions",
            get(admin::list_revolut_transactions),
        )
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        projects::create_project,
        projects::list_projects,
        projects::get_project,
        payments::create_payment,
        payments::list_payments,
        payments::get_payment,
        payments::checkout_payment,
        payments::payment_confirmation,
        provider_status::qonto_link_status,
        provider_status::revolut_order_status,
        webhooks::qonto_webhook,
        webhooks::stripe_webhook,
        admin::query_audit_logs,
        admin::list_revolut_transactions
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            projects::CreateProjectRequest,
            projects::ProjectResponse,
            projects::ProjectListResponse,
            payments::CreatePaymentRequest,
            payments::PaymentResponse,
            payments::PaymentListResponse,
            payments::CheckoutRequest,
            payments::CheckoutResponse,
            webhooks::WebhookAck,
            admin::AuditLogResponse,
            StoredPayment,
            PaymentStatus,
            PaymentProvider,
            ProjectStatus,
            ProviderStatus,
            QontoLinkStatus,
            QontoWebhookEvent,
            ConfirmationState,
            ConfirmationView,
            AuditEvent,
            AuditEventType
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Projects", description = "Renovation projects"),
        (name = "Payments", description = "Payment records, checkout and confirmation"),
        (name = "Providers", description = "Live provider status lookups"),
        (name = "Webhooks", description = "Provider callbacks"),
        (name = "Admin", description = "Audit log and operational tooling")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderRegistry, QontoClient, QontoConfig};
    use crate::state::test_support::{test_state, test_state_with};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Unsigned token accepted in development mode.
    fn bearer(user_id: &str, role: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(
            json!({ "sub": user_id, "exp": 9_999_999_999i64, "iss": "test", "role": role })
                .to_string(),
        );
        format!("Bearer {header}.{claims}.sig")
    }

    async fn send(app: &Router, method: &str, uri: &str, auth: Option<String>, body: Option<Value>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            request = request.header("authorization", auth);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_project(app: &Router) -> String {
        let response = send(
            app,
            "POST",
            "/v1/projects",
            Some(bearer("courtier_1", "courtier")),
            Some(json!({ "name": "Salle de bain", "client_id": "client_1", "artisan_id": "artisan_1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let project = body_json(response).await;
        assert_eq!(project["status"], "pending");
        assert_eq!(project["courtier_id"], "courtier_1");
        project["id"].as_str().unwrap().to_string()
    }

    async fn create_payment(app: &Router, project_id: &str) -> String {
        let response = send(
            app,
            "POST",
            &format!("/v1/projects/{project_id}/payments"),
            Some(bearer("client_1", "client")),
            Some(json!({ "amount": "100.00", "description": "Acompte" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let payment = body_json(response).await;
        assert_eq!(payment["amount"], 10_000);
        assert_eq!(payment["status"], "pending");
        payment["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_and_openapi_are_public() {
        let (state, _temp_dir) = test_state();
        let app = router(state);

        let response = send(&app, "GET", "/health/live", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let response = send(&app, "GET", "/api-doc/openapi.json", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let doc = body_json(response).await;
        assert!(doc["paths"]["/v1/payments/{payment_id}/confirmation"].is_object());
        assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
    }

    #[tokio::test]
    async fn v1_routes_require_a_token() {
        let (state, _temp_dir) = test_state();
        let app = router(state);
        let response = send(&app, "GET", "/v1/projects", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn clients_cannot_create_projects() {
        let (state, _temp_dir) = test_state();
        let app = router(state);
        let response = send(
            &app,
            "POST",
            "/v1/projects",
            Some(bearer("client_1", "client")),
            Some(json!({ "name": "Cuisine", "client_id": "client_1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn outsiders_are_denied_project_access() {
        let (state, _temp_dir) = test_state();
        let app = router(state);
        let project_id = create_project(&app).await;

        let response = send(
            &app,
            "GET",
            &format!("/v1/projects/{project_id}"),
            Some(bearer("someone_else", "artisan")),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(
            &app,
            "GET",
            &format!("/v1/projects/{project_id}"),
            Some(bearer("admin_1", "admin")),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn encoded_traversal_ids_are_not_found() {
        let (state, _temp_dir) = test_state();
        let app = router(state);

        for uri in ["/v1/payments/..%2F..%2Fx", "/v1/projects/..%2Fpayments%2Fx"] {
            let response = send(&app, "GET", uri, Some(bearer("admin_1", "admin")), None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn payment_without_provider_confirms_as_error() {
        let (state, _temp_dir) = test_state();
        let app = router(state);
        let project_id = create_project(&app).await;
        let payment_id = create_payment(&app, &project_id).await;

        let response = send(
            &app,
            "GET",
            &format!("/v1/payments/{payment_id}/confirmation"),
            Some(bearer("client_1", "client")),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let view = body_json(response).await;
        assert_eq!(view["state"], "error");
        assert_eq!(view["payment_id"], payment_id.as_str());
    }

    #[tokio::test]
    async fn confirmation_of_unknown_payment_is_error_view() {
        let (state, _temp_dir) = test_state();
        let app = router(state);
        let response = send(
            &app,
            "GET",
            "/v1/payments/nope/confirmation",
            Some(bearer("client_1", "client")),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["state"], "error");
    }

    #[tokio::test]
    async fn checkout_with_unconfigured_provider_is_unavailable() {
        let (state, _temp_dir) = test_state();
        let app = router(state);
        let project_id = create_project(&app).await;
        let payment_id = create_payment(&app, &project_id).await;

        let response = send(
            &app,
            "POST",
            &format!("/v1/payments/{payment_id}/checkout"),
            Some(bearer("client_1", "client")),
            Some(json!({ "provider": "qonto" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn qonto_checkout_then_paid_webhook_promotes_project() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/payment_links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_link": { "id": "pl_1", "status": "open", "url": "https://pay.qonto.com/pl_1" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/payment_links/pl_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_link": { "id": "pl_1", "status": "open" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/payment_links/pl_1/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payments": [{ "id": "pay_1", "status": "paid" }]
            })))
            .mount(&server)
            .await;

        let qonto = QontoClient::new(QontoConfig {
            api_base_url: server.uri(),
            login: "acme".into(),
            secret_key: "sk".into(),
        })
        .unwrap();
        let (state, _temp_dir) = test_state_with(ProviderRegistry {
            qonto: Some(Arc::new(qonto)),
            ..Default::default()
        });
        let app = router(state);
        let project_id = create_project(&app).await;
        let payment_id = create_payment(&app, &project_id).await;

        let response = send(
            &app,
            "POST",
            &format!("/v1/payments/{payment_id}/checkout"),
            Some(bearer("client_1", "client")),
            Some(json!({ "provider": "qonto" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let checkout = body_json(response).await;
        assert_eq!(checkout["reference"], "pl_1");
        assert_eq!(checkout["payment"]["qonto_payment_link_id"], "pl_1");
        assert_eq!(checkout["checkout_url"], "https://pay.qonto.com/pl_1");

        let response = send(
            &app,
            "POST",
            "/v1/webhooks/qonto",
            None,
            Some(json!({ "event_type": "payment_link.paid", "data": { "payment_link_id": "pl_1" } })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            "GET",
            &format!("/v1/payments/{payment_id}/confirmation"),
            Some(bearer("client_1", "client")),
            None,
        )
        .await;
        assert_eq!(body_json(response).await["state"], "success");

        let response = send(
            &app,
            "GET",
            &format!("/v1/projects/{project_id}"),
            Some(bearer("client_1", "client")),
            None,
        )
        .await;
        let project = body_json(response).await;
        assert_eq!(project["status"], "in_progress");
        assert_eq!(project["status_label"], "En cours");

        let response = send(
            &app,
            "POST",
            &format!("/v1/payments/{payment_id}/checkout"),
            Some(bearer("client_1", "client")),
            Some(json!({ "provider": "qonto" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn admin_audit_requires_admin() {
        let (state, _temp_dir) = test_state();
        let app = router(state);

        let response = send(&app, "GET", "/v1/admin/audit", Some(bearer("client_1", "client")), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, "GET", "/v1/admin/audit", Some(bearer("admin_1", "admin")), None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
