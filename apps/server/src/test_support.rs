//! In-memory collaborators for lifecycle-manager tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::*;
use crate::schedule::ScheduleSettings;
use crate::store::Store;
use crate::stripe::{
    CheckoutSession, PaymentGateway, RefundReceipt, SessionDetails, SessionRequest,
};

// ── Store fake ──

#[derive(Default)]
pub struct MemStore {
    pub appointments: Mutex<Vec<Appointment>>,
    pub orders: Mutex<Vec<Order>>,
    pub users: Mutex<Vec<User>>,
    pub settings: Mutex<Option<ScheduleSettings>>,
}

#[async_trait]
impl Store for MemStore {
    async fn appointments(&self) -> Result<Vec<Appointment>> {
        Ok(self.appointments.lock().unwrap().clone())
    }

    async fn save_appointments(&self, all: &[Appointment]) -> Result<()> {
        *self.appointments.lock().unwrap() = all.to_vec();
        Ok(())
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn save_orders(&self, all: &[Order]) -> Result<()> {
        *self.orders.lock().unwrap() = all.to_vec();
        Ok(())
    }

    async fn users(&self) -> Result<Vec<User>> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn save_users(&self, all: &[User]) -> Result<()> {
        *self.users.lock().unwrap() = all.to_vec();
        Ok(())
    }

    async fn schedule_settings(&self) -> Result<ScheduleSettings> {
        Ok(self.settings.lock().unwrap().clone().unwrap_or_default())
    }

    async fn save_schedule_settings(&self, settings: &ScheduleSettings) -> Result<()> {
        *self.settings.lock().unwrap() = Some(settings.clone());
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

// ── Gateway fake ──

/// Records every call; sessions must be planted before retrieval.
#[derive(Default)]
pub struct FakeGateway {
    pub sessions: Mutex<HashMap<String, SessionDetails>>,
    pub created: Mutex<Vec<SessionRequest>>,
    pub refunds: Mutex<Vec<(String, String)>>,
    pub cancel_calls: Mutex<Vec<(String, bool)>>,
    pub fail_refunds: bool,
    pub fail_subscription_updates: bool,
}

impl FakeGateway {
    pub fn with_session(session: SessionDetails) -> Self {
        let gw = Self::default();
        gw.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
        gw
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(&self, req: SessionRequest) -> Result<CheckoutSession> {
        let mut created = self.created.lock().unwrap();
        created.push(req);
        let id = format!("cs_test_{}", created.len());
        Ok(CheckoutSession {
            id: id.clone(),
            url: format!("https://checkout.example/{id}"),
        })
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<SessionDetails> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such session: {session_id}"))
    }

    async fn create_refund(&self, payment_intent_id: &str, reason: &str) -> Result<RefundReceipt> {
        if self.fail_refunds {
            anyhow::bail!("stripe api error: 500");
        }
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push((payment_intent_id.to_string(), reason.to_string()));
        Ok(RefundReceipt {
            id: format!("re_test_{}", refunds.len()),
        })
    }

    async fn set_subscription_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<()> {
        if self.fail_subscription_updates {
            anyhow::bail!("stripe api error: 500");
        }
        self.cancel_calls
            .lock()
            .unwrap()
            .push((subscription_id.to_string(), cancel));
        Ok(())
    }
}

// ── Builders ──

pub fn paid_session(id: &str, metadata: &[(&str, &str)]) -> SessionDetails {
    SessionDetails {
        id: id.into(),
        payment_status: "paid".into(),
        payment_intent: Some("pi_test_1".into()),
        customer: Some("cus_test_1".into()),
        metadata: metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        subscription: None,
    }
}

pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

pub fn pending_appointment(id: &str, price: i64) -> Appointment {
    Appointment {
        id: id.into(),
        service_id: "svc-fullset".into(),
        service_name: "Gel Full Set".into(),
        customer_name: "Mia".into(),
        customer_email: "mia@example.com".into(),
        customer_phone: "555-0100".into(),
        date: "2026-03-17".into(),
        time: "10:00".into(),
        price,
        deposit_amount: 0,
        deposit_paid: false,
        remaining_balance: price,
        balance_paid: false,
        user_id: None,
        technician_id: None,
        status: AppointmentStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_intent_id: None,
        created_at: test_now(),
        updated_at: test_now(),
    }
}

pub fn pending_order(id: &str, total: i64) -> Order {
    Order {
        id: id.into(),
        customer_name: "Mia".into(),
        customer_email: "mia@example.com".into(),
        items: vec![LineItem {
            product_id: "prod-oil".into(),
            name: "Cuticle Oil".into(),
            quantity: 1,
            unit_price: total,
        }],
        total,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_intent_id: None,
        created_at: test_now(),
        updated_at: test_now(),
    }
}

pub fn member_user(id: &str, status: MembershipStatus) -> User {
    User {
        id: id.into(),
        name: "Mia".into(),
        email: "mia@example.com".into(),
        membership: Some(Membership {
            tier_id: "signature".into(),
            tier_name: "Signature".into(),
            status,
            cancel_at_period_end: false,
            stripe_customer_id: Some("cus_test_1".into()),
            stripe_subscription_id: Some("sub_test_1".into()),
            current_period_end: Some(test_now() + chrono::Duration::days(20)),
            usage: BenefitUsage::fresh(test_now()),
        }),
    }
}

pub fn plain_user(id: &str) -> User {
    User {
        id: id.into(),
        name: "Noa".into(),
        email: "noa@example.com".into(),
        membership: None,
    }
}

pub fn test_config() -> crate::config::AppConfig {
    crate::config::AppConfig {
        deposit_amount: 2500,
        currency: "usd".into(),
        checkout_success_url: "https://salon.example/checkout/success".into(),
        checkout_cancel_url: "https://salon.example/checkout/cancelled".into(),
        email_from: "bookings@lunenails.example".into(),
        tiers: vec![
            crate::config::MembershipTier {
                id: "essential".into(),
                name: "Essential".into(),
                stripe_price_id: "price_essential".into(),
                monthly_price: 6500,
                refills_per_period: Some(2),
                full_sets_per_period: Some(0),
            },
            crate::config::MembershipTier {
                id: "signature".into(),
                name: "Signature".into(),
                stripe_price_id: "price_signature".into(),
                monthly_price: 11000,
                refills_per_period: Some(2),
                full_sets_per_period: Some(1),
            },
        ],
    }
}
