use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::membership;
use crate::models::*;
use crate::notifier::{Notification, Notifier};
use crate::schedule;
use crate::store::Store;

/// Owns the appointment status/payment-status state machine. All updates go
/// through whole-collection read-modify-write on the store.
pub struct AppointmentManager {
    store: Arc<dyn Store>,
    notifier: Notifier,
    config: Arc<AppConfig>,
}

impl AppointmentManager {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Create a `pending/pending` appointment. The requested slot must be
    /// currently bookable; capacity is not reserved until the deposit is
    /// paid.
    pub async fn create(
        &self,
        req: CreateAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, ApiError> {
        let date = validate_booking_fields(
            &req.service_id,
            &req.customer_name,
            &req.customer_email,
            &req.date,
            &req.time,
        )?;
        if req.price <= 0 {
            return Err(ApiError::validation("price must be positive"));
        }

        self.ensure_slot_available(date, &req.time, now).await?;

        let appointment = Appointment {
            id: Uuid::now_v7().to_string(),
            service_id: req.service_id,
            service_name: req.service_name,
            customer_name: req.customer_name,
            customer_email: req.customer_email,
            customer_phone: req.customer_phone,
            date: req.date,
            time: req.time,
            price: req.price,
            deposit_amount: 0,
            deposit_paid: false,
            remaining_balance: req.price,
            balance_paid: false,
            user_id: req.user_id,
            technician_id: req.technician_id,
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut all = self.store.appointments().await?;
        all.push(appointment.clone());
        self.store.save_appointments(&all).await?;

        tracing::info!("Appointment {} created for {}", appointment.id, appointment.date);
        Ok(appointment)
    }

    /// Membership-funded booking: verifies the user holds an active
    /// membership, draws down the benefit counter, and creates the
    /// appointment directly in `confirmed/paid` with zero amounts.
    pub async fn create_priority(
        &self,
        req: PriorityBookingRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, ApiError> {
        let date = validate_booking_fields(
            &req.service_id,
            &req.customer_name,
            &req.customer_email,
            &req.date,
            &req.time,
        )?;

        self.ensure_slot_available(date, &req.time, now).await?;

        // Draw the benefit before creating the appointment; an exhausted
        // allowance must not leave a booking behind.
        let mut users = self.store.users().await?;
        let user = users
            .iter_mut()
            .find(|u| u.id == req.user_id)
            .ok_or_else(|| ApiError::not_found("user"))?;
        let member = user
            .membership
            .as_mut()
            .ok_or_else(|| ApiError::conflict("user has no membership"))?;
        let tier = self
            .config
            .tier(&member.tier_id)
            .ok_or_else(|| ApiError::not_found("membership tier"))?;
        membership::consume_benefit(member, tier, req.benefit, now)?;
        self.store.save_users(&users).await?;

        let appointment = Appointment {
            id: Uuid::now_v7().to_string(),
            service_id: req.service_id,
            service_name: req.service_name,
            customer_name: req.customer_name,
            customer_email: req.customer_email,
            customer_phone: req.customer_phone,
            date: req.date,
            time: req.time,
            price: 0,
            deposit_amount: 0,
            deposit_paid: true,
            remaining_balance: 0,
            balance_paid: true,
            user_id: Some(req.user_id),
            technician_id: req.technician_id,
            status: AppointmentStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut all = self.store.appointments().await?;
        all.push(appointment.clone());
        self.store.save_appointments(&all).await?;

        self.notifier
            .enqueue(Notification::AppointmentConfirmation(appointment.clone()));

        tracing::info!("Priority booking {} created", appointment.id);
        Ok(appointment)
    }

    /// Bookable slot labels for a calendar date.
    pub async fn slots(&self, date: &str, now: DateTime<Utc>) -> Result<Vec<String>, ApiError> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| ApiError::validation("invalid date format"))?;
        let settings = self.store.schedule_settings().await?;
        let appointments = self.store.appointments().await?;
        Ok(schedule::available_slots(date, &settings, &appointments, now))
    }

    pub async fn get(&self, id: &str) -> Result<Appointment, ApiError> {
        self.store
            .appointments()
            .await?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| ApiError::not_found("appointment"))
    }

    /// Appointments filtered by exact date or inclusive date range, ordered
    /// by date then time.
    pub async fn list(&self, query: &AppointmentsQuery) -> Result<Vec<Appointment>, ApiError> {
        let mut all = self.store.appointments().await?;
        if let Some(date) = &query.date {
            all.retain(|a| &a.date == date);
        } else if let (Some(from), Some(to)) = (&query.from, &query.to) {
            all.retain(|a| &a.date >= from && &a.date <= to);
        }
        all.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));
        Ok(all)
    }

    /// Admin cancellation. Payment state is untouched; refunds go through
    /// the refund coordinator.
    pub async fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<Appointment, ApiError> {
        self.transition(id, now, |appt| match appt.status {
            AppointmentStatus::Cancelled => Err(ApiError::conflict("appointment already cancelled")),
            AppointmentStatus::Completed => {
                Err(ApiError::conflict("completed appointment cannot be cancelled"))
            }
            _ => {
                appt.status = AppointmentStatus::Cancelled;
                Ok(())
            }
        })
        .await
    }

    pub async fn complete(&self, id: &str, now: DateTime<Utc>) -> Result<Appointment, ApiError> {
        self.transition(id, now, |appt| {
            if appt.status != AppointmentStatus::Confirmed {
                return Err(ApiError::conflict(
                    "only confirmed appointments can be completed",
                ));
            }
            appt.status = AppointmentStatus::Completed;
            Ok(())
        })
        .await
    }

    async fn transition(
        &self,
        id: &str,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut Appointment) -> Result<(), ApiError>,
    ) -> Result<Appointment, ApiError> {
        let mut all = self.store.appointments().await?;
        let appt = all
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ApiError::not_found("appointment"))?;
        apply(appt)?;
        appt.updated_at = now;
        let updated = appt.clone();
        self.store.save_appointments(&all).await?;
        Ok(updated)
    }

    async fn ensure_slot_available(
        &self,
        date: NaiveDate,
        time: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let settings = self.store.schedule_settings().await?;
        let appointments = self.store.appointments().await?;
        let slots = schedule::available_slots(date, &settings, &appointments, now);
        if !slots.iter().any(|s| s == time) {
            return Err(ApiError::conflict("requested slot is not available"));
        }
        Ok(())
    }
}

/// First successful deposit reconciliation. Caller must have checked the
/// appointment is still `payment_status == pending`.
pub fn apply_deposit_reconciliation(
    appt: &mut Appointment,
    payment_intent: Option<String>,
    now: DateTime<Utc>,
) {
    appt.deposit_paid = true;
    appt.balance_paid = appt.remaining_balance == 0;
    appt.payment_status = if appt.balance_paid {
        PaymentStatus::Paid
    } else {
        PaymentStatus::DepositPaid
    };
    appt.status = AppointmentStatus::Confirmed;
    appt.payment_intent_id = payment_intent;
    appt.updated_at = now;
}

fn validate_booking_fields(
    service_id: &str,
    customer_name: &str,
    customer_email: &str,
    date: &str,
    time: &str,
) -> Result<NaiveDate, ApiError> {
    if service_id.trim().is_empty() {
        return Err(ApiError::validation("service is required"));
    }
    if customer_name.trim().is_empty() {
        return Err(ApiError::validation("customer name is required"));
    }
    if !customer_email.contains('@') {
        return Err(ApiError::validation("invalid customer email"));
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ApiError::validation("invalid date format"))?;
    NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| ApiError::validation("invalid time format"))?;
    Ok(date)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn manager(store: Arc<MemStore>) -> (AppointmentManager, tokio::sync::mpsc::UnboundedReceiver<Notification>) {
        let (notifier, rx) = Notifier::channel();
        (
            AppointmentManager::new(store, notifier, Arc::new(test_config())),
            rx,
        )
    }

    fn create_request() -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            service_id: "svc-fullset".into(),
            service_name: "Gel Full Set".into(),
            customer_name: "Mia".into(),
            customer_email: "mia@example.com".into(),
            customer_phone: "555-0100".into(),
            // 2026-03-17 is a Tuesday (open 09:00-17:00 by default)
            date: "2026-03-17".into(),
            time: "10:00".into(),
            price: 8000,
            user_id: None,
            technician_id: None,
        }
    }

    fn priority_request(user_id: &str, benefit: BenefitKind) -> PriorityBookingRequest {
        PriorityBookingRequest {
            user_id: user_id.into(),
            benefit,
            service_id: "svc-refill".into(),
            service_name: "Refill".into(),
            customer_name: "Mia".into(),
            customer_email: "mia@example.com".into(),
            customer_phone: String::new(),
            date: "2026-03-17".into(),
            time: "11:00".into(),
            technician_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_pending_appointment() {
        let store = Arc::new(MemStore::default());
        let (mgr, _rx) = manager(store.clone());

        let appt = mgr.create(create_request(), test_now()).await.unwrap();
        assert_eq!(appt.status, AppointmentStatus::Pending);
        assert_eq!(appt.payment_status, PaymentStatus::Pending);
        assert_eq!(appt.remaining_balance, appt.price);
        assert_eq!(store.appointments.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_ids_are_time_ordered() {
        let store = Arc::new(MemStore::default());
        let (mgr, _rx) = manager(store);
        let a = mgr.create(create_request(), test_now()).await.unwrap();
        let mut second = create_request();
        second.time = "11:00".into();
        let b = mgr.create(second, test_now()).await.unwrap();
        assert!(a.id < b.id);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let store = Arc::new(MemStore::default());
        let (mgr, _rx) = manager(store.clone());

        let mut req = create_request();
        req.customer_email = "not-an-email".into();
        assert!(matches!(
            mgr.create(req, test_now()).await,
            Err(ApiError::Validation(_))
        ));

        let mut req = create_request();
        req.date = "17/03/2026".into();
        assert!(matches!(
            mgr.create(req, test_now()).await,
            Err(ApiError::Validation(_))
        ));

        // No mutation happened
        assert!(store.appointments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_unavailable_slot() {
        let store = Arc::new(MemStore::default());
        let (mgr, _rx) = manager(store);

        let mut req = create_request();
        req.time = "08:00".into(); // before opening
        assert!(matches!(
            mgr.create(req, test_now()).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_priority_booking_confirmed_paid_zero_amounts() {
        let store = Arc::new(MemStore::default());
        store
            .users
            .lock()
            .unwrap()
            .push(member_user("u1", MembershipStatus::Active));
        let (mgr, mut rx) = manager(store.clone());

        let appt = mgr
            .create_priority(priority_request("u1", BenefitKind::Refill), test_now())
            .await
            .unwrap();

        assert_eq!(appt.status, AppointmentStatus::Confirmed);
        assert_eq!(appt.payment_status, PaymentStatus::Paid);
        assert_eq!(appt.price, 0);
        assert_eq!(appt.deposit_amount, 0);
        assert_eq!(appt.remaining_balance, 0);

        // Usage counter drawn down
        let users = store.users.lock().unwrap();
        assert_eq!(users[0].membership.as_ref().unwrap().usage.refills_used, 1);
        drop(users);

        // Confirmation queued
        assert!(matches!(
            rx.try_recv(),
            Ok(Notification::AppointmentConfirmation(_))
        ));
    }

    #[tokio::test]
    async fn test_priority_booking_requires_active_membership() {
        let store = Arc::new(MemStore::default());
        store
            .users
            .lock()
            .unwrap()
            .push(member_user("u1", MembershipStatus::Inactive));
        store.users.lock().unwrap().push(plain_user("u2"));
        let (mgr, _rx) = manager(store.clone());

        assert!(matches!(
            mgr.create_priority(priority_request("u1", BenefitKind::Refill), test_now())
                .await,
            Err(ApiError::Conflict(_))
        ));
        assert!(matches!(
            mgr.create_priority(priority_request("u2", BenefitKind::Refill), test_now())
                .await,
            Err(ApiError::Conflict(_))
        ));
        assert!(matches!(
            mgr.create_priority(priority_request("ghost", BenefitKind::Refill), test_now())
                .await,
            Err(ApiError::NotFound(_))
        ));
        assert!(store.appointments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_priority_booking_exhausted_allowance() {
        let store = Arc::new(MemStore::default());
        let mut user = member_user("u1", MembershipStatus::Active);
        // signature tier allows 2 refills per period
        user.membership.as_mut().unwrap().usage.refills_used = 2;
        store.users.lock().unwrap().push(user);
        let (mgr, _rx) = manager(store.clone());

        assert!(matches!(
            mgr.create_priority(priority_request("u1", BenefitKind::Refill), test_now())
                .await,
            Err(ApiError::Conflict(_))
        ));
        // No booking created for a rejected draw
        assert!(store.appointments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_and_complete_transitions() {
        let store = Arc::new(MemStore::default());
        let mut appt = pending_appointment("a1", 8000);
        appt.status = AppointmentStatus::Confirmed;
        store.appointments.lock().unwrap().push(appt);
        let (mgr, _rx) = manager(store.clone());

        let done = mgr.complete("a1", test_now()).await.unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);

        // Completed cannot be cancelled
        assert!(matches!(
            mgr.cancel("a1", test_now()).await,
            Err(ApiError::Conflict(_))
        ));

        // Pending cannot be completed
        store
            .appointments
            .lock()
            .unwrap()
            .push(pending_appointment("a2", 8000));
        assert!(matches!(
            mgr.complete("a2", test_now()).await,
            Err(ApiError::Conflict(_))
        ));
        let cancelled = mgr.cancel("a2", test_now()).await.unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let store = Arc::new(MemStore::default());
        {
            let mut all = store.appointments.lock().unwrap();
            let mut a = pending_appointment("a1", 8000);
            a.date = "2026-03-18".into();
            a.time = "10:00".into();
            let mut b = pending_appointment("a2", 8000);
            b.date = "2026-03-17".into();
            b.time = "14:00".into();
            let mut c = pending_appointment("a3", 8000);
            c.date = "2026-03-17".into();
            c.time = "09:00".into();
            all.extend([a, b, c]);
        }
        let (mgr, _rx) = manager(store);

        let day = mgr
            .list(&AppointmentsQuery {
                date: Some("2026-03-17".into()),
                from: None,
                to: None,
            })
            .await
            .unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].id, "a3");

        let range = mgr
            .list(&AppointmentsQuery {
                date: None,
                from: Some("2026-03-17".into()),
                to: Some("2026-03-18".into()),
            })
            .await
            .unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[2].id, "a1");
    }

    #[test]
    fn test_apply_deposit_reconciliation_splits() {
        let mut appt = pending_appointment("a1", 8000);
        appt.deposit_amount = 2500;
        appt.remaining_balance = 5500;
        apply_deposit_reconciliation(&mut appt, Some("pi_1".into()), test_now());

        assert!(appt.deposit_paid);
        assert!(!appt.balance_paid);
        assert_eq!(appt.payment_status, PaymentStatus::DepositPaid);
        assert_eq!(appt.status, AppointmentStatus::Confirmed);
        assert_eq!(appt.deposit_amount + appt.remaining_balance, appt.price);
    }

    #[test]
    fn test_apply_deposit_reconciliation_full_payment() {
        // price below the deposit constant: deposit covers everything
        let mut appt = pending_appointment("a1", 2000);
        appt.deposit_amount = 2000;
        appt.remaining_balance = 0;
        apply_deposit_reconciliation(&mut appt, Some("pi_1".into()), test_now());

        assert!(appt.balance_paid);
        assert_eq!(appt.payment_status, PaymentStatus::Paid);
    }
}
