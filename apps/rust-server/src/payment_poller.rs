// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payment Poller
//!
//! Background task that re-reconciles payments server-side, so a payment
//! reaches its terminal status even when the provider webhook is lost and no
//! user keeps the confirmation page open.
//!
//! Every `poll_interval` (default 30 s) one [`Reconciler::sweep`] runs: each
//! pending payment with a provider reference is queried live, and every
//! validated payment gets the project promotion rule re-applied.
//!
//! Stops when its `CancellationToken` is cancelled.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_POLL_INTERVAL_SECS;
use crate::reconciliation::Reconciler;

pub struct PaymentPoller {
    reconciler: Reconciler,
    poll_interval: Duration,
}

impl PaymentPoller {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run until the token is cancelled.
    ///
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Payment poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Payment poller shutting down");
    }

    async fn poll_step(&self) {
        match self.reconciler.sweep().await {
            Ok(summary) if summary.checked == 0 && summary.promoted == 0 => {
                debug!("Payment poller: nothing to reconcile");
            }
            Ok(summary) => {
                info!(
                    checked = summary.checked,
                    changed = summary.changed,
                    promoted = summary.promoted,
                    failed = summary.failed,
                    "Payment poller: sweep complete"
                );
            }
            Err(error) => {
                warn!(error = %error, "Payment poller: sweep failed");
            }
        }
    }
}
