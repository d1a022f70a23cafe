// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment record repository.
//!
//! A payment record carries the amount (minor units), the internal status and
//! at most one set of provider correlation fields. The field names are the
//! document contract shared with the web front-end.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::paths::is_document_id;
use super::super::{DocumentStorage, StorageError, StorageResult};

/// Internal payment status.
///
/// Documents written by the previous system used French labels; those are
/// accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[serde(alias = "en_attente")]
    Pending,
    #[serde(alias = "validé", alias = "valide")]
    Validated,
    #[serde(alias = "échoué", alias = "echoue")]
    Failed,
}

impl PaymentStatus {
    /// `Validated` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Label shown to French-speaking users.
    pub fn label_fr(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "En attente",
            PaymentStatus::Validated => "Validé",
            PaymentStatus::Failed => "Échoué",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Validated => write!(f, "validated"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// External payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Stripe,
    Qonto,
    Revolut,
}

impl PaymentProvider {
    pub const ALL: [PaymentProvider; 3] = [
        PaymentProvider::Stripe,
        PaymentProvider::Qonto,
        PaymentProvider::Revolut,
    ];

    /// Parse a provider name (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stripe" => Some(PaymentProvider::Stripe),
            "qonto" => Some(PaymentProvider::Qonto),
            "revolut" => Some(PaymentProvider::Revolut),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Qonto => "qonto",
            PaymentProvider::Revolut => "revolut",
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted payment record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredPayment {
    pub id: String,
    #[serde(rename = "projectId", alias = "project_id")]
    pub project_id: String,
    /// Amount in minor currency units (cents).
    pub amount: u64,
    /// ISO-4217 code, upper-case.
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: PaymentStatus,
    /// Raw provider status last observed, whatever the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_payment_intent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qonto_payment_link_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qonto_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qonto_checkout_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revolut_payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revolut_checkout_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

impl StoredPayment {
    /// Construct a new pending payment without any provider attached.
    pub fn new_pending(
        id: String,
        project_id: String,
        amount: u64,
        currency: String,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id,
            amount,
            currency,
            description,
            status: PaymentStatus::Pending,
            provider_status: None,
            stripe_payment_intent_id: None,
            qonto_payment_link_id: None,
            qonto_status: None,
            qonto_checkout_url: None,
            revolut_payment_id: None,
            revolut_checkout_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active provider and its correlation id, if any.
    pub fn provider_reference(&self) -> Option<(PaymentProvider, &str)> {
        if let Some(id) = self.qonto_payment_link_id.as_deref() {
            return Some((PaymentProvider::Qonto, id));
        }
        if let Some(id) = self.revolut_payment_id.as_deref() {
            return Some((PaymentProvider::Revolut, id));
        }
        self.stripe_payment_intent_id
            .as_deref()
            .map(|id| (PaymentProvider::Stripe, id))
    }

    /// URL the payer is redirected to, when the provider hosts the checkout.
    pub fn checkout_url(&self) -> Option<&str> {
        self.qonto_checkout_url
            .as_deref()
            .or(self.revolut_checkout_url.as_deref())
    }

    fn clear_provider_fields(&mut self) {
        self.stripe_payment_intent_id = None;
        self.qonto_payment_link_id = None;
        self.qonto_status = None;
        self.qonto_checkout_url = None;
        self.revolut_payment_id = None;
        self.revolut_checkout_url = None;
    }

    pub fn attach_stripe(&mut self, payment_intent_id: String, raw_status: Option<String>) {
        self.clear_provider_fields();
        self.stripe_payment_intent_id = Some(payment_intent_id);
        self.provider_status = raw_status;
        self.updated_at = Utc::now();
    }

    pub fn attach_qonto(&mut self, payment_link_id: String, link_status: String, url: String) {
        self.clear_provider_fields();
        self.qonto_payment_link_id = Some(payment_link_id);
        self.provider_status = Some(link_status.clone());
        self.qonto_status = Some(link_status);
        self.qonto_checkout_url = Some(url);
        self.updated_at = Utc::now();
    }

    pub fn attach_revolut(
        &mut self,
        order_id: String,
        checkout_url: String,
        raw_state: Option<String>,
    ) {
        self.clear_provider_fields();
        self.revolut_payment_id = Some(order_id);
        self.revolut_checkout_url = Some(checkout_url);
        self.provider_status = raw_state;
        self.updated_at = Utc::now();
    }
}

/// Partial update applied by `PaymentRepository::update`.
#[derive(Debug, Clone, Default)]
pub struct PaymentPatch {
    pub status: Option<PaymentStatus>,
    pub provider_status: Option<String>,
    pub qonto_status: Option<String>,
}

impl PaymentPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.provider_status.is_none() && self.qonto_status.is_none()
    }

    fn apply(&self, record: &mut StoredPayment) -> bool {
        let mut changed = false;
        if let Some(status) = self.status {
            changed |= record.status != status;
            record.status = status;
        }
        if let Some(raw) = &self.provider_status {
            changed |= record.provider_status.as_ref() != Some(raw);
            record.provider_status = Some(raw.clone());
        }
        if let Some(raw) = &self.qonto_status {
            changed |= record.qonto_status.as_ref() != Some(raw);
            record.qonto_status = Some(raw.clone());
        }
        changed
    }
}

/// Query filter; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub project_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub stripe_payment_intent_id: Option<String>,
    pub qonto_payment_link_id: Option<String>,
    pub revolut_payment_id: Option<String>,
}

impl PaymentFilter {
    pub fn matches(&self, record: &StoredPayment) -> bool {
        fn eq(want: &Option<String>, have: &Option<String>) -> bool {
            want.is_none() || want == have
        }

        self.project_id
            .as_ref()
            .is_none_or(|id| *id == record.project_id)
            && self.status.is_none_or(|status| status == record.status)
            && eq(&self.stripe_payment_intent_id, &record.stripe_payment_intent_id)
            && eq(&self.qonto_payment_link_id, &record.qonto_payment_link_id)
            && eq(&self.revolut_payment_id, &record.revolut_payment_id)
    }
}

/// Repository for payment records.
pub struct PaymentRepository<'a> {
    storage: &'a DocumentStorage,
}

impl<'a> PaymentRepository<'a> {
    pub fn new(storage: &'a DocumentStorage) -> Self {
        Self { storage }
    }

    /// File of `payment_id`. Ids that are not plain document ids never name a
    /// stored record.
    fn document(&self, payment_id: &str) -> StorageResult<PathBuf> {
        if !is_document_id(payment_id) {
            return Err(StorageError::NotFound(format!("Payment {payment_id}")));
        }
        Ok(self.storage.paths().payment(payment_id))
    }

    pub fn exists(&self, payment_id: &str) -> bool {
        self.document(payment_id)
            .map(|path| self.storage.exists(path))
            .unwrap_or(false)
    }

    pub fn get(&self, payment_id: &str) -> StorageResult<StoredPayment> {
        let path = self.document(payment_id)?;
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!("Payment {payment_id}")));
        }
        self.storage.read_json(path)
    }

    pub fn create(&self, payment: &StoredPayment) -> StorageResult<()> {
        if self.exists(&payment.id) {
            return Err(StorageError::AlreadyExists(format!("Payment {}", payment.id)));
        }
        self.storage
            .write_json(self.document(&payment.id)?, payment)
    }

    /// Replace an existing record.
    pub fn save(&self, payment: &StoredPayment) -> StorageResult<()> {
        if !self.exists(&payment.id) {
            return Err(StorageError::NotFound(format!("Payment {}", payment.id)));
        }
        self.storage
            .write_json(self.document(&payment.id)?, payment)
    }

    /// Apply a partial update. Nothing is written when the patch changes no
    /// field, so repeating an update is a no-op.
    pub fn update(&self, payment_id: &str, patch: &PaymentPatch) -> StorageResult<StoredPayment> {
        let mut record = self.get(payment_id)?;
        if patch.apply(&mut record) {
            record.updated_at = Utc::now();
            self.storage
                .write_json(self.document(payment_id)?, &record)?;
        }
        Ok(record)
    }

    /// All records matching `filter`, newest first.
    pub fn query(&self, filter: &PaymentFilter) -> StorageResult<Vec<StoredPayment>> {
        let ids = self
            .storage
            .list_files(self.storage.paths().payments_dir(), "json")?;

        let mut records = Vec::new();
        for id in ids {
            match self.get(&id) {
                Ok(record) if filter.matches(&record) => records.push(record),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(payment_id = %id, error = %error, "skipping unreadable payment document");
                }
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub fn list_by_project(&self, project_id: &str) -> StorageResult<Vec<StoredPayment>> {
        self.query(&PaymentFilter {
            project_id: Some(project_id.to_string()),
            ..Default::default()
        })
    }

    fn find_one(&self, filter: PaymentFilter) -> StorageResult<Option<StoredPayment>> {
        Ok(self.query(&filter)?.into_iter().next())
    }

    pub fn find_by_qonto_link(&self, link_id: &str) -> StorageResult<Option<StoredPayment>> {
        self.find_one(PaymentFilter {
            qonto_payment_link_id: Some(link_id.to_string()),
            ..Default::default()
        })
    }

    pub fn find_by_revolut_order(&self, order_id: &str) -> StorageResult<Option<StoredPayment>> {
        self.find_one(PaymentFilter {
            revolut_payment_id: Some(order_id.to_string()),
            ..Default::default()
        })
    }

    pub fn find_by_stripe_intent(&self, intent_id: &str) -> StorageResult<Option<StoredPayment>> {
        self.find_one(PaymentFilter {
            stripe_payment_intent_id: Some(intent_id.to_string()),
            ..Default::default()
        })
    }
}
