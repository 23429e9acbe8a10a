use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::*;
use crate::notifier::{Notification, Notifier};
use crate::store::Store;
use crate::stripe::PaymentGateway;

/// Admin-initiated refunds for appointments and orders. The local record
/// always flips to `refunded`/`cancelled` first; a failed processor refund
/// is logged and left to manual reconciliation rather than blocking the
/// cancellation.
pub struct RefundCoordinator {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Notifier,
    config: Arc<AppConfig>,
}

impl RefundCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Notifier,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            config,
        }
    }

    pub async fn refund(
        &self,
        req: RefundRequest,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, ApiError> {
        match req.kind {
            RefundKind::Appointment => self.refund_appointment(&req.id, &req.reason, now).await,
            RefundKind::Order => self.refund_order(&req.id, &req.reason, now).await,
        }
    }

    async fn refund_appointment(
        &self,
        id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, ApiError> {
        let mut all = self.store.appointments().await?;
        let appt = all
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ApiError::not_found("appointment"))?;

        if appt.payment_status == PaymentStatus::Refunded {
            return Err(ApiError::conflict("already refunded"));
        }
        let eligible = matches!(
            appt.payment_status,
            PaymentStatus::DepositPaid | PaymentStatus::Paid
        );
        if !eligible {
            return Err(ApiError::conflict("no payment collected to refund"));
        }

        // Refund what was actually collected: the deposit alone until the
        // balance settles, the full price afterwards.
        let amount = if appt.balance_paid {
            appt.price
        } else {
            appt.deposit_amount
        };
        let payment_intent = appt.payment_intent_id.clone();

        appt.payment_status = PaymentStatus::Refunded;
        appt.status = AppointmentStatus::Cancelled;
        appt.updated_at = now;
        let appt = appt.clone();
        self.store.save_appointments(&all).await?;

        let provider_refund_id = self.external_refund(payment_intent, reason).await;

        self.notifier.enqueue(Notification::RefundNotice {
            email: appt.customer_email.clone(),
            name: appt.customer_name.clone(),
            description: format!("{} on {}", appt.service_name, appt.date),
            amount,
            reason: reason.to_string(),
            from: self.config.email_from.clone(),
        });

        tracing::info!("Appointment {} refunded ({})", appt.id, amount);
        Ok(RefundOutcome {
            kind: RefundKind::Appointment,
            id: appt.id,
            amount,
            provider_refund_id,
        })
    }

    async fn refund_order(
        &self,
        id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, ApiError> {
        let mut all = self.store.orders().await?;
        let order = all
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| ApiError::not_found("order"))?;

        if order.payment_status == PaymentStatus::Refunded {
            return Err(ApiError::conflict("already refunded"));
        }
        if order.payment_status != PaymentStatus::Paid {
            return Err(ApiError::conflict("no payment collected to refund"));
        }

        let amount = order.total;
        let payment_intent = order.payment_intent_id.clone();

        order.payment_status = PaymentStatus::Refunded;
        order.status = OrderStatus::Cancelled;
        order.updated_at = now;
        let order = order.clone();
        self.store.save_orders(&all).await?;

        let provider_refund_id = self.external_refund(payment_intent, reason).await;

        self.notifier.enqueue(Notification::RefundNotice {
            email: order.customer_email.clone(),
            name: order.customer_name.clone(),
            description: format!("order {}", order.id),
            amount,
            reason: reason.to_string(),
            from: self.config.email_from.clone(),
        });

        tracing::info!("Order {} refunded ({})", order.id, amount);
        Ok(RefundOutcome {
            kind: RefundKind::Order,
            id: order.id,
            amount,
            provider_refund_id,
        })
    }

    /// Best-effort processor refund. Returns the refund id, or `None` when
    /// there was nothing to refund externally or the call failed.
    async fn external_refund(
        &self,
        payment_intent: Option<String>,
        reason: &str,
    ) -> Option<String> {
        let payment_intent = match payment_intent {
            Some(pi) => pi,
            None => {
                tracing::warn!("no payment intent on refunded record; skipping processor refund");
                return None;
            }
        };
        match self.gateway.create_refund(&payment_intent, reason).await {
            Ok(receipt) => Some(receipt.id),
            Err(e) => {
                tracing::error!(
                    "processor refund for {} failed, needs manual reconciliation: {:#}",
                    payment_intent,
                    e
                );
                None
            }
        }
    }
}

// ── Tests ──
