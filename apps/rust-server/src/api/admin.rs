// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only endpoints: audit log queries and the Revolut Business
//! transaction listing used to check the sandbox OAuth setup.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{
    audit_log,
    auth::AdminOnly,
    error::ApiError,
    reconciliation::PaymentError,
    state::AppState,
    storage::{AuditEvent, AuditEventType, AuditRepository},
};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;
const DEFAULT_TRANSACTION_COUNT: u32 = 20;
const MAX_TRANSACTION_COUNT: u32 = 1000;

/// Query parameters for audit log queries.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Start date (YYYY-MM-DD), defaults to today.
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD), defaults to today.
    pub end_date: Option<String>,
    /// Filter by event type, e.g. `payment_status_changed`.
    pub event_type: Option<String>,
    /// Filter by resource ID (payment or project id).
    pub resource_id: Option<String>,
    /// Maximum number of results (default 100, max 1000).
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub events: Vec<AuditEvent>,
    /// Count before limit/offset.
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TransactionQueryParams {
    /// Number of transactions (default 20, max 1000).
    pub count: Option<u32>,
}

fn parse_date(raw: Option<&str>, default: &str, name: &str) -> Result<String, ApiError> {
    let value = raw.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(default);
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("Invalid {name} format. Use YYYY-MM-DD.")))?;
    Ok(value.to_string())
}

fn event_type_name(event: &AuditEvent) -> String {
    serde_json::to_value(&event.event_type)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Query audit logs.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "Admin",
    params(AuditQueryParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Audit events", body = AuditLogResponse),
        (status = 400, description = "Invalid query parameters"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn query_audit_logs(
    AdminOnly(admin_user): AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let start_date = parse_date(params.start_date.as_deref(), &today, "start_date")?;
    let end_date = parse_date(params.end_date.as_deref(), &today, "end_date")?;
    if start_date > end_date {
        return Err(ApiError::bad_request("start_date must not be after end_date"));
    }

    let mut events = AuditRepository::new(&state.storage).read_events_range(&start_date, &end_date)?;

    if let Some(event_type) = &params.event_type {
        events.retain(|e| event_type_name(e) == *event_type);
    }
    if let Some(resource_id) = &params.resource_id {
        events.retain(|e| e.resource_id.as_deref() == Some(resource_id.as_str()));
    }

    let total = events.len();
    let limit = params.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let has_more = offset.saturating_add(limit) < total;
    let events: Vec<AuditEvent> = events.into_iter().skip(offset).take(limit).collect();

    audit_log!(&state.storage, AuditEventType::AdminAccess, &admin_user);

    Ok(Json(AuditLogResponse {
        events,
        total,
        has_more,
    }))
}

/// List Revolut Business transactions through the OAuth client.
#[utoipa::path(
    get,
    path = "/v1/admin/revolut/transactions",
    tag = "Admin",
    params(TransactionQueryParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transactions as returned by Revolut Business"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 503, description = "Revolut Business not configured or unreachable")
    )
)]
pub async fn list_revolut_transactions(
    AdminOnly(admin_user): AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<TransactionQueryParams>,
) -> Result<Json<Value>, ApiError> {
    let count = params
        .count
        .unwrap_or(DEFAULT_TRANSACTION_COUNT)
        .clamp(1, MAX_TRANSACTION_COUNT);

    let client = state.providers().revolut_oauth().map_err(PaymentError::from)?;
    let transactions = client
        .list_transactions(count)
        .await
        .map_err(PaymentError::from)?;

    audit_log!(&state.storage, AuditEventType::AdminAccess, &admin_user);

    Ok(Json(transactions))
}
