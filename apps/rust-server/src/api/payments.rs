// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment records: creation, listing, provider checkout and confirmation.
//!
//! Amounts enter the API as decimal strings in major units (`"100.00"`) and
//! are converted once, here, into integer cents. Nothing downstream of this
//! module sees a decimal amount.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::projects::load_project;
use crate::{
    audit_log,
    auth::{Auth, AuthenticatedUser},
    error::ApiError,
    providers::{format_minor, CreatePaymentRequest as ProviderPaymentRequest, ProviderError},
    reconciliation::{ConfirmationView, PaymentError},
    state::AppState,
    storage::{
        AuditEventType, PaymentProvider, PaymentRepository, PaymentStatus, StoredPayment,
    },
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    /// Amount in major units, at most two decimals (e.g. `"100.00"`).
    pub amount: String,
    /// ISO-4217 code; defaults to EUR.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentResponse {
    #[serde(flatten)]
    pub payment: StoredPayment,
    /// Amount formatted in major units.
    pub amount_display: String,
    /// French label shown in the UI.
    pub status_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

impl From<StoredPayment> for PaymentResponse {
    fn from(payment: StoredPayment) -> Self {
        Self {
            amount_display: format_minor(payment.amount),
            status_label: payment.status.label_fr().to_string(),
            checkout_url: payment.checkout_url().map(str::to_string),
            payment,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentListResponse {
    pub payments: Vec<PaymentResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// `stripe`, `qonto` or `revolut`.
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub payment: PaymentResponse,
    pub provider: PaymentProvider,
    /// Provider correlation id (intent, payment link or order id).
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    /// Stripe client secret for front-end confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Parse a decimal major-unit amount into `(normalized, cents)`.
pub(crate) fn parse_amount_to_minor(amount: &str) -> Result<(String, u64), ApiError> {
    const INVALID: &str = "amount must be a valid positive number";

    let trimmed = amount.trim();
    let (whole_part, fraction_part) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request(INVALID));
    }
    if fraction_part.len() > 2 || !fraction_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request("amount must have at most 2 decimal places"));
    }

    let whole = whole_part
        .parse::<u64>()
        .map_err(|_| ApiError::bad_request("amount is too large"))?;
    let fraction = match fraction_part.len() {
        0 => 0,
        1 => fraction_part.parse::<u64>().map_err(|_| ApiError::bad_request(INVALID))? * 10,
        _ => fraction_part.parse::<u64>().map_err(|_| ApiError::bad_request(INVALID))?,
    };

    let minor = whole
        .checked_mul(100)
        .and_then(|base| base.checked_add(fraction))
        .ok_or_else(|| ApiError::bad_request("amount is too large"))?;
    if minor == 0 {
        return Err(ApiError::bad_request(INVALID));
    }

    Ok((format!("{whole}.{fraction:02}"), minor))
}

fn parse_currency(raw: Option<&str>) -> Result<String, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok("EUR".to_string());
    };
    if raw.len() != 3 || !raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::bad_request("currency must be a 3-letter ISO code"));
    }
    Ok(raw.to_ascii_uppercase())
}

fn parse_provider(raw: &str) -> Result<PaymentProvider, ApiError> {
    PaymentProvider::parse(raw).ok_or_else(|| {
        ApiError::bad_request(format!(
            "Unsupported provider '{}'. Use stripe, qonto or revolut",
            raw.trim()
        ))
    })
}

/// Load a payment and check the caller may access its project.
fn load_payment(
    state: &AppState,
    payment_id: &str,
    user: &AuthenticatedUser,
) -> Result<StoredPayment, ApiError> {
    let payment = PaymentRepository::new(&state.storage)
        .get(payment_id)
        .map_err(|_| ApiError::not_found("Payment not found"))?;
    load_project(state, &payment.project_id, user)?;
    Ok(payment)
}

/// Create a pending payment record on a project.
#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/payments",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(("project_id" = String, Path, description = "Project ID")),
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = PaymentResponse),
        (status = 400, description = "Invalid amount or currency"),
        (status = 403, description = "Not a member of this project"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn create_payment(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let project = load_project(&state, &project_id, &user)?;
    let (_, amount_minor) = parse_amount_to_minor(&request.amount)?;
    let currency = parse_currency(request.currency.as_deref())?;
    let description = request
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let payment = StoredPayment::new_pending(
        uuid::Uuid::new_v4().to_string(),
        project.id,
        amount_minor,
        currency,
        description,
    );
    PaymentRepository::new(&state.storage).create(&payment)?;

    audit_log!(
        &state.storage,
        AuditEventType::PaymentCreated,
        &user,
        "payment",
        &payment.id
    );

    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// List a project's payments, newest first.
#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/payments",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(("project_id" = String, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Payments of the project", body = PaymentListResponse),
        (status = 403, description = "Not a member of this project"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn list_payments(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<PaymentListResponse>, ApiError> {
    let project = load_project(&state, &project_id, &user)?;
    let payments: Vec<PaymentResponse> = PaymentRepository::new(&state.storage)
        .list_by_project(&project.id)?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(PaymentListResponse {
        total: payments.len(),
        payments,
    }))
}

/// Get a payment.
#[utoipa::path(
    get,
    path = "/v1/payments/{payment_id}",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(("payment_id" = String, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = PaymentResponse),
        (status = 403, description = "Not a member of the payment's project"),
        (status = 404, description = "Payment not found")
    )
)]
pub async fn get_payment(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = load_payment(&state, &payment_id, &user)?;
    Ok(Json(payment.into()))
}

/// Create the provider-side payment object and attach it to the record.
///
/// Calling checkout again on a pending payment replaces the previous
/// provider attachment.
#[utoipa::path(
    post,
    path = "/v1/payments/{payment_id}/checkout",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(("payment_id" = String, Path, description = "Payment ID")),
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Provider payment created", body = CheckoutResponse),
        (status = 400, description = "Unknown provider"),
        (status = 404, description = "Payment not found"),
        (status = 422, description = "Payment is no longer pending"),
        (status = 502, description = "Provider returned an invalid response"),
        (status = 503, description = "Provider not configured or unreachable")
    )
)]
pub async fn checkout_payment(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let provider = parse_provider(&request.provider)?;
    let mut payment = load_payment(&state, &payment_id, &user)?;
    if payment.status != PaymentStatus::Pending {
        return Err(ApiError::unprocessable(format!(
            "Payment is already {}",
            payment.status
        )));
    }

    let return_url = format!(
        "{}/payments/{}/confirmation",
        state.public_base_url.trim_end_matches('/'),
        payment.id
    );
    let created = state
        .providers()
        .create_payment_request(
            provider,
            ProviderPaymentRequest {
                payment_id: &payment.id,
                amount_minor: payment.amount,
                currency: &payment.currency,
                description: payment.description.as_deref(),
                return_url: Some(&return_url),
            },
        )
        .await
        .map_err(PaymentError::from)?;

    match provider {
        PaymentProvider::Stripe => {
            payment.attach_stripe(created.reference.clone(), created.raw_status.clone());
        }
        PaymentProvider::Qonto => {
            let url = created.checkout_url.clone().ok_or_else(|| {
                PaymentError::from(ProviderError::invalid("qonto", "payment link has no url"))
            })?;
            payment.attach_qonto(
                created.reference.clone(),
                created.raw_status.clone().unwrap_or_else(|| "open".to_string()),
                url,
            );
        }
        PaymentProvider::Revolut => {
            let url = created.checkout_url.clone().ok_or_else(|| {
                PaymentError::from(ProviderError::invalid("revolut", "order has no checkout url"))
            })?;
            payment.attach_revolut(created.reference.clone(), url, created.raw_status.clone());
        }
    }
    PaymentRepository::new(&state.storage).save(&payment)?;

    info!(
        payment_id = %payment.id,
        provider = %provider,
        reference = %created.reference,
        "payment checkout started"
    );
    audit_log!(
        &state.storage,
        AuditEventType::PaymentCheckoutStarted,
        &user,
        "payment",
        &payment.id
    );

    Ok(Json(CheckoutResponse {
        payment: payment.into(),
        provider,
        reference: created.reference,
        checkout_url: created.checkout_url,
        client_secret: created.client_secret,
    }))
}

/// Confirmation page state. Polls the provider while the payment is pending.
#[utoipa::path(
    get,
    path = "/v1/payments/{payment_id}/confirmation",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(("payment_id" = String, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "success, pending or error", body = ConfirmationView),
        (status = 403, description = "Not a member of the payment's project")
    )
)]
pub async fn payment_confirmation(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<ConfirmationView>, ApiError> {
    // A missing payment is an `error` view, not a 404.
    if let Ok(payment) = PaymentRepository::new(&state.storage).get(&payment_id) {
        load_project(&state, &payment.project_id, &user)?;
    }
    Ok(Json(state.reconciler.confirmation(&payment_id).await))
}
