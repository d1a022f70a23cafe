// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Live provider status lookups. Each lookup also reconciles the matching
//! payment record, when there is one.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use utoipa::IntoParams;

use crate::{
    auth::Auth,
    error::ApiError,
    providers::{revolut::map_order_state, str_field, QontoLinkStatus, StatusReport},
    reconciliation::PaymentError,
    state::AppState,
    storage::PaymentProvider,
};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct QontoStatusQuery {
    /// Qonto payment link id.
    pub payment_link_id: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct RevolutStatusQuery {
    /// Revolut order id.
    pub order_id: String,
}

fn required(value: &str, name: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{name} is required")));
    }
    Ok(value.to_string())
}

/// Reconcile the payment behind `reference`. Failures are logged only, the
/// caller still gets the provider's answer.
fn reconcile_quietly(
    state: &AppState,
    provider: PaymentProvider,
    reference: &str,
    report: StatusReport,
) {
    if let Err(error) = state.reconciler.apply_report(provider, reference, &report) {
        warn!(
            provider = %provider,
            reference = %reference,
            error = %error,
            "reconciliation after status lookup failed"
        );
    }
}

/// Normalized status of a Qonto payment link.
#[utoipa::path(
    get,
    path = "/v1/qonto/payment-links/status",
    tag = "Providers",
    security(("bearer_auth" = [])),
    params(QontoStatusQuery),
    responses(
        (status = 200, description = "Link status and payments", body = QontoLinkStatus),
        (status = 400, description = "Missing or malformed paymentLinkId"),
        (status = 503, description = "Qonto not configured or unreachable")
    )
)]
pub async fn qonto_link_status(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Query(query): Query<QontoStatusQuery>,
) -> Result<Json<QontoLinkStatus>, ApiError> {
    let link_id = required(&query.payment_link_id, "paymentLinkId")?;
    let qonto = state.providers().qonto().map_err(PaymentError::from)?;
    let status = qonto
        .link_status(&link_id)
        .await
        .map_err(PaymentError::from)?;

    reconcile_quietly(&state, PaymentProvider::Qonto, &link_id, status.report());

    Ok(Json(status))
}

/// Raw Revolut order object.
#[utoipa::path(
    get,
    path = "/v1/revolut/orders/status",
    tag = "Providers",
    security(("bearer_auth" = [])),
    params(RevolutStatusQuery),
    responses(
        (status = 200, description = "Revolut order as returned by the Merchant API"),
        (status = 400, description = "Missing or malformed orderId"),
        (status = 503, description = "Revolut not configured or unreachable")
    )
)]
pub async fn revolut_order_status(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Query(query): Query<RevolutStatusQuery>,
) -> Result<Json<Value>, ApiError> {
    let order_id = required(&query.order_id, "orderId")?;
    let revolut = state.providers().revolut().map_err(PaymentError::from)?;
    let order = revolut
        .get_order(&order_id)
        .await
        .map_err(PaymentError::from)?;

    if let Some(raw_state) = str_field(&order, "/state") {
        reconcile_quietly(
            &state,
            PaymentProvider::Revolut,
            &order_id,
            StatusReport {
                status: map_order_state(raw_state),
                raw_status: raw_state.to_string(),
            },
        );
    }

    Ok(Json(order))
}
