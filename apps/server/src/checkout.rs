use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::appointments::apply_deposit_reconciliation;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::*;
use crate::notifier::{Notification, Notifier};
use crate::store::Store;
use crate::stripe::{PaymentGateway, SessionMode, SessionRequest};

/// Drives hosted checkout for appointment deposits and order totals, and
/// reconciles local payment state once the processor reports a session paid.
/// Verification is redirect-driven, so the same session may be verified any
/// number of times; only the first paid verification mutates anything.
pub struct CheckoutCoordinator {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Notifier,
    config: Arc<AppConfig>,
}

impl CheckoutCoordinator {
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

    // ── Appointment deposits ──

    /// Start deposit checkout for a pending appointment. The deposit split is
    /// persisted before the processor call so a crash between the two leaves
    /// a consistent record.
    pub async fn create_deposit_session(
        &self,
        req: AppointmentCheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutRedirect, ApiError> {
        let mut all = self.store.appointments().await?;
        let appt = all
            .iter_mut()
            .find(|a| a.id == req.appointment_id)
            .ok_or_else(|| ApiError::not_found("appointment"))?;

        if appt.status == AppointmentStatus::Cancelled {
            return Err(ApiError::conflict("appointment is cancelled"));
        }
        if appt.payment_status != PaymentStatus::Pending {
            return Err(ApiError::conflict("appointment is already paid"));
        }

        // Deposit never exceeds the service price.
        let deposit = self.config.deposit_amount.min(appt.price);
        appt.deposit_amount = deposit;
        appt.remaining_balance = appt.price - deposit;
        appt.updated_at = now;
        let appt = appt.clone();
        self.store.save_appointments(&all).await?;

        let session = self
            .gateway
            .create_checkout_session(SessionRequest {
                mode: SessionMode::Payment {
                    amount: deposit,
                    currency: self.config.currency.clone(),
                    product_name: format!("Booking deposit: {}", appt.service_name),
                },
                customer_email: Some(appt.customer_email.clone()),
                metadata: vec![
                    ("kind".into(), "appointment_deposit".into()),
                    ("appointment_id".into(), appt.id.clone()),
                ],
                success_url: self.config.checkout_success_url.clone(),
                cancel_url: self.config.checkout_cancel_url.clone(),
            })
            .await
            .map_err(ApiError::Upstream)?;

        Ok(CheckoutRedirect {
            session_id: session.id,
            url: session.url,
        })
    }

    /// Reconcile a deposit session after the success redirect.
    pub async fn verify_deposit_session(
        &self,
        req: AppointmentVerifyRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, ApiError> {
        let session = self
            .gateway
            .retrieve_checkout_session(&req.session_id)
            .await
            .map_err(ApiError::Upstream)?;

        if !session.is_paid() {
            return Err(ApiError::PaymentIncomplete);
        }

        let mut all = self.store.appointments().await?;
        let appt = all
            .iter_mut()
            .find(|a| a.id == req.appointment_id)
            .ok_or_else(|| ApiError::not_found("appointment"))?;

        // Re-verification of an already reconciled session is a no-op.
        if appt.payment_status != PaymentStatus::Pending {
            return Ok(appt.clone());
        }

        if session.metadata.get("appointment_id").map(String::as_str) != Some(appt.id.as_str()) {
            return Err(ApiError::conflict(
                "checkout session does not belong to this appointment",
            ));
        }

        apply_deposit_reconciliation(appt, session.payment_intent.clone(), now);
        let appt = appt.clone();
        self.store.save_appointments(&all).await?;

        self.notifier
            .enqueue(Notification::AppointmentConfirmation(appt.clone()));

        tracing::info!("Appointment {} deposit reconciled", appt.id);
        Ok(appt)
    }

    // ── Orders ──

    /// Create a pending order. The total is computed server-side from the
    /// line items; a client-sent total is never trusted.
    pub async fn create_order(
        &self,
        req: CreateOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<Order, ApiError> {
        if req.customer_name.trim().is_empty() {
            return Err(ApiError::validation("customer name is required"));
        }
        if !req.customer_email.contains('@') {
            return Err(ApiError::validation("invalid customer email"));
        }
        if req.items.is_empty() {
            return Err(ApiError::validation("order has no items"));
        }
        for item in &req.items {
            if item.quantity == 0 || item.unit_price <= 0 {
                return Err(ApiError::validation("invalid line item"));
            }
        }

        let total = req
            .items
            .iter()
            .map(|i| i.unit_price * i.quantity as i64)
            .sum();

        let order = Order {
            id: Uuid::now_v7().to_string(),
            customer_name: req.customer_name,
            customer_email: req.customer_email,
            items: req.items,
            total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut all = self.store.orders().await?;
        all.push(order.clone());
        self.store.save_orders(&all).await?;

        tracing::info!("Order {} created, total {}", order.id, order.total);
        Ok(order)
    }

    pub async fn get_order(&self, id: &str) -> Result<Order, ApiError> {
        self.store
            .orders()
            .await?
            .into_iter()
            .find(|o| o.id == id)
            .ok_or_else(|| ApiError::not_found("order"))
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, ApiError> {
        let mut all = self.store.orders().await?;
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    /// Start checkout for the full order total.
    pub async fn create_order_session(
        &self,
        req: OrderCheckoutRequest,
    ) -> Result<CheckoutRedirect, ApiError> {
        let order = self.get_order(&req.order_id).await?;

        if order.status == OrderStatus::Cancelled {
            return Err(ApiError::conflict("order is cancelled"));
        }
        if order.payment_status != PaymentStatus::Pending {
            return Err(ApiError::conflict("order is already paid"));
        }

        let session = self
            .gateway
            .create_checkout_session(SessionRequest {
                mode: SessionMode::Payment {
                    amount: order.total,
                    currency: self.config.currency.clone(),
                    product_name: format!("Order ({} items)", order.items.len()),
                },
                customer_email: Some(order.customer_email.clone()),
                metadata: vec![
                    ("kind".into(), "order".into()),
                    ("order_id".into(), order.id.clone()),
                ],
                success_url: self.config.checkout_success_url.clone(),
                cancel_url: self.config.checkout_cancel_url.clone(),
            })
            .await
            .map_err(ApiError::Upstream)?;

        Ok(CheckoutRedirect {
            session_id: session.id,
            url: session.url,
        })
    }

    /// Reconcile an order session: `paid` + `processing`.
    pub async fn verify_order_session(
        &self,
        req: OrderVerifyRequest,
        now: DateTime<Utc>,
    ) -> Result<Order, ApiError> {
        let session = self
            .gateway
            .retrieve_checkout_session(&req.session_id)
            .await
            .map_err(ApiError::Upstream)?;

        if !session.is_paid() {
            return Err(ApiError::PaymentIncomplete);
        }

        let mut all = self.store.orders().await?;
        let order = all
            .iter_mut()
            .find(|o| o.id == req.order_id)
            .ok_or_else(|| ApiError::not_found("order"))?;

        if order.payment_status != PaymentStatus::Pending {
            return Ok(order.clone());
        }

        if session.metadata.get("order_id").map(String::as_str) != Some(order.id.as_str()) {
            return Err(ApiError::conflict(
                "checkout session does not belong to this order",
            ));
        }

        order.payment_status = PaymentStatus::Paid;
        order.status = OrderStatus::Processing;
        order.payment_intent_id = session.payment_intent.clone();
        order.updated_at = now;
        let order = order.clone();
        self.store.save_orders(&all).await?;

        self.notifier
            .enqueue(Notification::OrderConfirmation(order.clone()));

        tracing::info!("Order {} payment reconciled", order.id);
        Ok(order)
    }
}

// ── Tests ──
