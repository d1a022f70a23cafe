// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pure status rules shared by the webhook and poll paths.

use crate::providers::ProviderStatus;
use crate::storage::{PaymentStatus, ProjectStatus};

pub const QONTO_CONNECTION_UPDATED: &str = "connection.updated";
pub const QONTO_LINK_PAID: &str = "payment_link.paid";
pub const QONTO_LINK_EXPIRED: &str = "payment_link.expired";

/// Event types the Qonto webhook acts on. Anything else is acknowledged and
/// ignored.
pub fn is_known_qonto_event(event_type: &str) -> bool {
    matches!(
        event_type,
        QONTO_CONNECTION_UPDATED | QONTO_LINK_PAID | QONTO_LINK_EXPIRED
    )
}

/// `None` means "leave the internal status as it is".
pub fn internal_status_for(status: ProviderStatus) -> Option<PaymentStatus> {
    match status {
        ProviderStatus::Success => Some(PaymentStatus::Validated),
        ProviderStatus::Error => Some(PaymentStatus::Failed),
        ProviderStatus::Pending => None,
    }
}

fn status_from_raw(raw: &str) -> Option<PaymentStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "paid" => Some(PaymentStatus::Validated),
        "expired" | "cancelled" | "canceled" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

/// Target status for a Qonto webhook. The link events decide by their type;
/// `connection.updated` decides by the status carried in `data`.
pub fn qonto_webhook_status(event_type: &str, data_status: Option<&str>) -> Option<PaymentStatus> {
    match event_type {
        QONTO_LINK_PAID => Some(PaymentStatus::Validated),
        QONTO_LINK_EXPIRED => Some(PaymentStatus::Failed),
        QONTO_CONNECTION_UPDATED => data_status.and_then(status_from_raw),
        _ => None,
    }
}

/// What to do with the status of a stored payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move from `pending` to the given terminal status.
    Apply(PaymentStatus),
    /// Nothing to change (no target, or already there).
    Unchanged,
    /// The record is terminal and the target differs.
    Rejected {
        current: PaymentStatus,
        requested: PaymentStatus,
    },
}

/// Terminal states are immutable; only `pending` moves.
pub fn plan_transition(current: PaymentStatus, target: Option<PaymentStatus>) -> Transition {
    match target {
        None => Transition::Unchanged,
        Some(target) if target == current => Transition::Unchanged,
        Some(target) if current == PaymentStatus::Pending => Transition::Apply(target),
        Some(requested) => Transition::Rejected { current, requested },
    }
}

/// A project leaves `pending` on its first validated payment and is never
/// touched again by later validations.
pub fn should_promote(payment: PaymentStatus, project: ProjectStatus) -> bool {
    payment == PaymentStatus::Validated && project == ProjectStatus::Pending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tri_state_maps_to_internal_status() {
        assert_eq!(internal_status_for(ProviderStatus::Success), Some(PaymentStatus::Validated));
        assert_eq!(internal_status_for(ProviderStatus::Error), Some(PaymentStatus::Failed));
        assert_eq!(internal_status_for(ProviderStatus::Pending), None);
    }

    #[test]
    fn qonto_link_events_decide_by_type() {
        assert_eq!(
            qonto_webhook_status(QONTO_LINK_PAID, None),
            Some(PaymentStatus::Validated)
        );
        assert_eq!(
            qonto_webhook_status(QONTO_LINK_EXPIRED, Some("open")),
            Some(PaymentStatus::Failed)
        );
    }

    #[test]
    fn connection_updated_decides_by_data_status() {
        assert_eq!(
            qonto_webhook_status(QONTO_CONNECTION_UPDATED, Some("paid")),
            Some(PaymentStatus::Validated)
        );
        assert_eq!(
            qonto_webhook_status(QONTO_CONNECTION_UPDATED, Some("cancelled")),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(qonto_webhook_status(QONTO_CONNECTION_UPDATED, Some("open")), None);
        assert_eq!(qonto_webhook_status(QONTO_CONNECTION_UPDATED, None), None);
    }

    #[test]
    fn unknown_qonto_events_are_not_recognized() {
        assert!(!is_known_qonto_event("payment_link.created"));
        assert_eq!(qonto_webhook_status("payment_link.created", Some("paid")), None);
        assert!(is_known_qonto_event(QONTO_CONNECTION_UPDATED));
    }

    #[test]
    fn pending_moves_to_terminal_once() {
        assert_eq!(
            plan_transition(PaymentStatus::Pending, Some(PaymentStatus::Validated)),
            Transition::Apply(PaymentStatus::Validated)
        );
        assert_eq!(
            plan_transition(PaymentStatus::Pending, None),
            Transition::Unchanged
        );
    }

    #[test]
    fn repeated_validation_is_a_no_op() {
        assert_eq!(
            plan_transition(PaymentStatus::Validated, Some(PaymentStatus::Validated)),
            Transition::Unchanged
        );
    }

    #[test]
    fn terminal_states_do_not_regress() {
        assert_eq!(
            plan_transition(PaymentStatus::Validated, Some(PaymentStatus::Failed)),
            Transition::Rejected {
                current: PaymentStatus::Validated,
                requested: PaymentStatus::Failed,
            }
        );
        assert!(matches!(
            plan_transition(PaymentStatus::Failed, Some(PaymentStatus::Validated)),
            Transition::Rejected { .. }
        ));
    }

    #[test]
    fn promotion_only_from_pending_project() {
        assert!(should_promote(PaymentStatus::Validated, ProjectStatus::Pending));
        assert!(!should_promote(PaymentStatus::Validated, ProjectStatus::InProgress));
        assert!(!should_promote(PaymentStatus::Validated, ProjectStatus::Completed));
        assert!(!should_promote(PaymentStatus::Pending, ProjectStatus::Pending));
        assert!(!should_promote(PaymentStatus::Failed, ProjectStatus::Pending));
    }
}
