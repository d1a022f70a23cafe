// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payment Status Reconciliation
//!
//! Maps provider status onto the internal payment status, persists it and
//! promotes the owning project on first validation.
//!
//! Two entry points share the same rules:
//!
//! - **Webhooks** look the payment up by its provider correlation id.
//! - **Polls** (confirmation page, status endpoints, background poller)
//!   query the provider live.
//!
//! The payment write and the project write are two separate, idempotent
//! operations. If the second one fails the next poll or webhook for the same
//! payment re-applies the promotion rule, even when the payment is already
//! validated. Concurrent callers are not serialized: the last write wins.

pub mod error;
pub mod transitions;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::providers::{ProviderRegistry, ProviderStatus, StatusReport, StripeEvent};
use crate::storage::{
    AuditEvent, AuditEventType, AuditRepository, DocumentStorage, PaymentFilter, PaymentPatch,
    PaymentProvider, PaymentRepository, PaymentStatus, ProjectRepository, ProjectStatus,
    StoredPayment,
};

pub use error::PaymentError;
pub use transitions::Transition;

/// Result of applying a status to one payment.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub payment: StoredPayment,
    pub status_changed: bool,
    pub project_promoted: bool,
}

/// What a webhook delivery led to.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Applied(ReconcileOutcome),
    /// No payment carries the correlation id.
    UnknownReference(String),
    Ignored(&'static str),
}

/// Body of a Qonto webhook delivery.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QontoWebhookEvent {
    pub event_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

impl QontoWebhookEvent {
    pub fn payment_link_id(&self) -> Option<&str> {
        ["/payment_link_id", "/payment_link/id", "/id"]
            .iter()
            .find_map(|pointer| self.data.pointer(pointer).and_then(Value::as_str))
            .filter(|id| !id.trim().is_empty())
    }

    pub fn data_status(&self) -> Option<&str> {
        ["/status", "/payment_link/status"]
            .iter()
            .find_map(|pointer| self.data.pointer(pointer).and_then(Value::as_str))
    }

    /// Raw status recorded on the payment: the carried status, else the
    /// event suffix (`paid`, `expired`).
    pub fn raw_status(&self) -> String {
        self.data_status()
            .map(str::to_string)
            .or_else(|| {
                self.event_type
                    .strip_prefix("payment_link.")
                    .map(str::to_string)
            })
            .unwrap_or_else(|| self.event_type.clone())
    }
}

/// State shown by the payment confirmation page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationState {
    Success,
    Pending,
    Error,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfirmationView {
    pub state: ConfirmationState,
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<PaymentProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ConfirmationView {
    fn error(payment_id: &str, detail: impl Into<String>) -> Self {
        Self {
            state: ConfirmationState::Error,
            payment_id: payment_id.to_string(),
            payment_status: None,
            project_id: None,
            provider: None,
            detail: Some(detail.into()),
        }
    }

    fn for_payment(payment: &StoredPayment, state: ConfirmationState) -> Self {
        Self {
            state,
            payment_id: payment.id.clone(),
            payment_status: Some(payment.status),
            project_id: Some(payment.project_id.clone()),
            provider: payment.provider_reference().map(|(provider, _)| provider),
            detail: None,
        }
    }
}

fn confirmation_state(status: PaymentStatus) -> ConfirmationState {
    match status {
        PaymentStatus::Validated => ConfirmationState::Success,
        PaymentStatus::Failed => ConfirmationState::Error,
        PaymentStatus::Pending => ConfirmationState::Pending,
    }
}

/// Counters from one poller sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub changed: usize,
    pub promoted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    storage: Arc<DocumentStorage>,
    providers: ProviderRegistry,
}

impl Reconciler {
    pub fn new(storage: Arc<DocumentStorage>, providers: ProviderRegistry) -> Self {
        Self { storage, providers }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Apply a target status and the raw provider status to a payment, then
    /// the promotion rule. Terminal payments are never rewritten.
    pub fn apply_status(
        &self,
        payment_id: &str,
        target: Option<PaymentStatus>,
        raw_status: Option<String>,
        provider: PaymentProvider,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let payments = PaymentRepository::new(&self.storage);
        let current = payments.get(payment_id)?;

        let (payment, status_changed) = match transitions::plan_transition(current.status, target) {
            Transition::Rejected { current: held, requested } => {
                warn!(
                    payment_id = %payment_id,
                    current = %held,
                    requested = %requested,
                    "ignoring status change on terminal payment"
                );
                (current, false)
            }
            _ if current.status.is_terminal() => (current, false),
            transition => {
                let new_status = match transition {
                    Transition::Apply(status) => Some(status),
                    _ => None,
                };
                let patch = PaymentPatch {
                    status: new_status,
                    qonto_status: match provider {
                        PaymentProvider::Qonto => raw_status.clone(),
                        _ => None,
                    },
                    provider_status: raw_status,
                };
                let updated = payments.update(payment_id, &patch)?;
                if let Some(status) = new_status {
                    info!(
                        payment_id = %payment_id,
                        provider = %provider,
                        status = %status,
                        "payment status updated"
                    );
                    self.audit(
                        AuditEvent::new(AuditEventType::PaymentStatusChanged)
                            .with_resource("payment", payment_id)
                            .with_details(serde_json::json!({
                                "provider": provider,
                                "status": status,
                                "provider_status": updated.provider_status,
                            })),
                    );
                }
                (updated, new_status.is_some())
            }
        };

        let project_promoted = self.ensure_project_promoted(&payment)?;

        Ok(ReconcileOutcome {
            payment,
            status_changed,
            project_promoted,
        })
    }

    /// Promote the owning project if the payment is validated and the
    /// project still pending. Safe to call any number of times.
    pub fn ensure_project_promoted(&self, payment: &StoredPayment) -> Result<bool, PaymentError> {
        if payment.status != PaymentStatus::Validated {
            return Ok(false);
        }

        let projects = ProjectRepository::new(&self.storage);
        let project = projects.get(&payment.project_id)?;
        if !transitions::should_promote(payment.status, project.status) {
            return Ok(false);
        }

        projects.update_status(&project.id, ProjectStatus::InProgress)?;
        info!(
            project_id = %project.id,
            payment_id = %payment.id,
            "project promoted to in_progress"
        );
        self.audit(
            AuditEvent::new(AuditEventType::ProjectPromoted)
                .with_resource("project", &project.id)
                .with_details(serde_json::json!({ "payment_id": payment.id })),
        );
        Ok(true)
    }

    /// Webhook-driven reconciliation for Qonto payment links.
    pub fn handle_qonto_webhook(
        &self,
        event: &QontoWebhookEvent,
    ) -> Result<WebhookOutcome, PaymentError> {
        if !transitions::is_known_qonto_event(&event.event_type) {
            return Ok(WebhookOutcome::Ignored("unrecognized event type"));
        }
        let Some(link_id) = event.payment_link_id() else {
            return Ok(WebhookOutcome::Ignored("missing payment link id"));
        };

        let payments = PaymentRepository::new(&self.storage);
        let Some(payment) = payments.find_by_qonto_link(link_id)? else {
            return Ok(WebhookOutcome::UnknownReference(link_id.to_string()));
        };

        let target = transitions::qonto_webhook_status(&event.event_type, event.data_status());
        let outcome = self.apply_status(
            &payment.id,
            target,
            Some(event.raw_status()),
            PaymentProvider::Qonto,
        )?;
        Ok(WebhookOutcome::Applied(outcome))
    }

    /// Entry point for Qonto deliveries. They are unsigned, so with the Qonto
    /// client configured a delivery that would validate a payment is checked
    /// against the live link and the live status is applied in its place.
    pub async fn confirm_qonto_webhook(
        &self,
        event: &QontoWebhookEvent,
    ) -> Result<WebhookOutcome, PaymentError> {
        let claims_validation = transitions::is_known_qonto_event(&event.event_type)
            && transitions::qonto_webhook_status(&event.event_type, event.data_status())
                == Some(PaymentStatus::Validated);
        let live = claims_validation
            .then(|| self.providers.qonto().ok())
            .flatten();
        let (Some(link_id), Some(qonto)) = (event.payment_link_id(), live) else {
            return self.handle_qonto_webhook(event);
        };

        if PaymentRepository::new(&self.storage)
            .find_by_qonto_link(link_id)?
            .is_none()
        {
            return Ok(WebhookOutcome::UnknownReference(link_id.to_string()));
        }

        let report = qonto.link_status(link_id).await?.report();
        if report.status != ProviderStatus::Success {
            warn!(
                payment_link_id = %link_id,
                live_status = %report.raw_status,
                "qonto paid webhook not confirmed by the payment link"
            );
        }
        match self.apply_report(PaymentProvider::Qonto, link_id, &report)? {
            Some(outcome) => Ok(WebhookOutcome::Applied(outcome)),
            None => Ok(WebhookOutcome::UnknownReference(link_id.to_string())),
        }
    }

    /// Webhook-driven reconciliation for Stripe PaymentIntent events.
    pub fn handle_stripe_event(&self, event: &StripeEvent) -> Result<WebhookOutcome, PaymentError> {
        let Some(intent_id) = event.payment_intent_id() else {
            return Ok(WebhookOutcome::Ignored("not a payment intent event"));
        };

        let payments = PaymentRepository::new(&self.storage);
        let Some(payment) = payments.find_by_stripe_intent(intent_id)? else {
            return Ok(WebhookOutcome::UnknownReference(intent_id.to_string()));
        };

        let raw = match event.object_status() {
            Some(status) => status.to_string(),
            None => match event.type_.as_str() {
                "payment_intent.succeeded" => "succeeded".to_string(),
                "payment_intent.canceled" => "canceled".to_string(),
                _ => "requires_payment_method".to_string(),
            },
        };
        let target = transitions::internal_status_for(crate::providers::stripe::map_intent_status(&raw));
        let outcome = self.apply_status(&payment.id, target, Some(raw), PaymentProvider::Stripe)?;
        Ok(WebhookOutcome::Applied(outcome))
    }

    /// Apply a status report already fetched for `reference`.
    pub fn apply_report(
        &self,
        provider: PaymentProvider,
        reference: &str,
        report: &StatusReport,
    ) -> Result<Option<ReconcileOutcome>, PaymentError> {
        let payments = PaymentRepository::new(&self.storage);
        let payment = match provider {
            PaymentProvider::Qonto => payments.find_by_qonto_link(reference)?,
            PaymentProvider::Revolut => payments.find_by_revolut_order(reference)?,
            PaymentProvider::Stripe => payments.find_by_stripe_intent(reference)?,
        };
        let Some(payment) = payment else {
            debug!(provider = %provider, reference = %reference, "no payment for provider reference");
            return Ok(None);
        };

        self.apply_status(
            &payment.id,
            transitions::internal_status_for(report.status),
            Some(report.raw_status.clone()),
            provider,
        )
        .map(Some)
    }

    /// Poll-driven reconciliation: query the provider live and apply.
    pub async fn reconcile_payment(&self, payment_id: &str) -> Result<ReconcileOutcome, PaymentError> {
        let payment = PaymentRepository::new(&self.storage).get(payment_id)?;
        let Some((provider, reference)) = payment.provider_reference() else {
            return Err(PaymentError::ValidationError(format!(
                "payment {payment_id} has no provider reference yet"
            )));
        };

        let report = self
            .providers
            .query_payment_status(provider, reference)
            .await?;

        self.apply_status(
            payment_id,
            transitions::internal_status_for(report.status),
            Some(report.raw_status),
            provider,
        )
    }

    /// Confirmation page view. Never fails: a missing payment or a payment
    /// without provider reference is `error`, a provider failure `pending`.
    pub async fn confirmation(&self, payment_id: &str) -> ConfirmationView {
        let payment = match PaymentRepository::new(&self.storage).get(payment_id) {
            Ok(payment) => payment,
            Err(error) => {
                debug!(payment_id = %payment_id, error = %error, "confirmation for unknown payment");
                return ConfirmationView::error(payment_id, "payment not found");
            }
        };

        if payment.provider_reference().is_none() {
            let mut view = ConfirmationView::for_payment(&payment, ConfirmationState::Error);
            view.detail = Some("payment has not been sent to a provider".to_string());
            return view;
        }

        if payment.status.is_terminal() {
            if let Err(error) = self.ensure_project_promoted(&payment) {
                warn!(payment_id = %payment_id, error = %error, "project promotion failed");
            }
            return ConfirmationView::for_payment(&payment, confirmation_state(payment.status));
        }

        match self.reconcile_payment(payment_id).await {
            Ok(outcome) => ConfirmationView::for_payment(
                &outcome.payment,
                confirmation_state(outcome.payment.status),
            ),
            Err(error) => {
                warn!(payment_id = %payment_id, error = %error, "confirmation poll failed");
                let mut view = ConfirmationView::for_payment(&payment, ConfirmationState::Pending);
                view.detail = Some(error.to_string());
                view
            }
        }
    }

    /// One background sweep: poll every pending payment that has a provider
    /// reference, and re-apply promotion for validated ones.
    pub async fn sweep(&self) -> Result<SweepSummary, PaymentError> {
        let payments = PaymentRepository::new(&self.storage);
        let mut summary = SweepSummary::default();

        let pending = payments.query(&PaymentFilter {
            status: Some(PaymentStatus::Pending),
            ..Default::default()
        })?;
        for payment in pending.iter().filter(|p| p.provider_reference().is_some()) {
            let Some((provider, _)) = payment.provider_reference() else {
                continue;
            };
            if !self.providers.is_configured(provider) {
                continue;
            }

            summary.checked += 1;
            match self.reconcile_payment(&payment.id).await {
                Ok(outcome) => {
                    summary.changed += usize::from(outcome.status_changed);
                    summary.promoted += usize::from(outcome.project_promoted);
                }
                Err(error) => {
                    summary.failed += 1;
                    warn!(payment_id = %payment.id, error = %error, "payment poll failed");
                }
            }
        }

        let validated = payments.query(&PaymentFilter {
            status: Some(PaymentStatus::Validated),
            ..Default::default()
        })?;
        for payment in &validated {
            match self.ensure_project_promoted(payment) {
                Ok(promoted) => summary.promoted += usize::from(promoted),
                Err(error) => {
                    summary.failed += 1;
                    warn!(payment_id = %payment.id, error = %error, "project promotion failed");
                }
            }
        }

        Ok(summary)
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(error) = AuditRepository::new(&self.storage).log(&event) {
            warn!(error = %error, "failed to write audit event");
        }
    }
}
