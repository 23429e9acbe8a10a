use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Entity status enums ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// Payment side of the joint state machine. `Refunded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    DepositPaid,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Inactive,
    Active,
}

/// Membership-included services that priority bookings draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenefitKind {
    Refill,
    FullSet,
}

// ── Stored entities ──

/// A timed salon appointment. Prices are integer cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub service_id: String,
    pub service_name: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Slot label, `HH:MM`.
    pub time: String,
    pub price: i64,
    pub deposit_amount: i64,
    pub deposit_paid: bool,
    pub remaining_balance: i64,
    pub balance_paid: bool,
    pub user_id: Option<String>,
    pub technician_id: Option<String>,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    /// Processor payment reference, set on reconciliation.
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Whether this appointment consumes slot capacity: paid and not
    /// cancelled. Pending checkouts deliberately do not reserve capacity.
    pub fn occupies_slot(&self) -> bool {
        self.status != AppointmentStatus::Cancelled && self.payment_status == PaymentStatus::Paid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

/// A product purchase. Same refunded-is-terminal rule as appointments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub items: Vec<LineItem>,
    pub total: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-billing-period benefit counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenefitUsage {
    pub current_period_start: DateTime<Utc>,
    pub refills_used: u32,
    pub full_sets_used: u32,
}

impl BenefitUsage {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            current_period_start: now,
            refills_used: 0,
            full_sets_used: 0,
        }
    }
}

/// Subscription-backed membership, embedded in a user. At most one per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub tier_id: String,
    pub tier_name: String,
    pub status: MembershipStatus,
    pub cancel_at_period_end: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub usage: BenefitUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub membership: Option<Membership>,
}

// ── API request/response types ──

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentsQuery {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub service_id: String,
    pub service_name: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: String,
    pub date: String,
    pub time: String,
    pub price: i64,
    pub user_id: Option<String>,
    pub technician_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriorityBookingRequest {
    pub user_id: String,
    pub benefit: BenefitKind,
    pub service_id: String,
    pub service_name: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: String,
    pub date: String,
    pub time: String,
    pub technician_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub items: Vec<LineItem>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentCheckoutRequest {
    pub appointment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentVerifyRequest {
    pub session_id: String,
    pub appointment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderCheckoutRequest {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderVerifyRequest {
    pub session_id: String,
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MembershipCheckoutRequest {
    pub user_id: String,
    pub tier_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MembershipVerifyRequest {
    pub session_id: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MembershipCancelRequest {
    pub user_id: String,
}

/// What a checkout-session creation hands back to the client.
#[derive(Debug, Serialize)]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundKind {
    Order,
    Appointment,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub kind: RefundKind,
    pub id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RefundOutcome {
    pub kind: RefundKind,
    pub id: String,
    pub amount: i64,
    /// Absent when the external refund failed and was left to manual
    /// reconciliation.
    pub provider_refund_id: Option<String>,
}

// ── Response envelope ──

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
