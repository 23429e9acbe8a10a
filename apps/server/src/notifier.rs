use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::models::{Appointment, Order};

/// Transactional emails the core emits. Delivery is best-effort: a failure is
/// logged by the worker and never reaches the request that queued it.
#[derive(Debug, Clone)]
pub enum Notification {
    AppointmentConfirmation(Appointment),
    OrderConfirmation(Order),
    RefundNotice {
        email: String,
        name: String,
        description: String,
        amount: i64,
        reason: String,
        from: String,
    },
    MembershipActivated {
        email: String,
        name: String,
        tier_name: String,
    },
    MembershipCancelled {
        email: String,
        name: String,
        tier_name: String,
        period_end: Option<DateTime<Utc>>,
    },
}

// ── Queue handle ──

/// Cloneable sender side of the notification queue. `enqueue` cannot fail
/// the caller; a closed queue is logged and the message dropped.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::warn!("notification queue closed; dropping message");
        }
    }
}

// ── Delivery ──

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Delivery attempts per message before giving up.
const MAX_ATTEMPTS: u32 = 3;
/// Pause between attempts.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Drains the queue in the background. Runs for the life of the process.
pub fn spawn_worker(
    mut rx: mpsc::UnboundedReceiver<Notification>,
    mailer: Arc<dyn Mailer>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            for attempt in 1..=MAX_ATTEMPTS {
                match mailer.deliver(&notification).await {
                    Ok(()) => break,
                    Err(e) if attempt == MAX_ATTEMPTS => {
                        tracing::error!(
                            "notification delivery failed after {} attempts: {:#}",
                            MAX_ATTEMPTS,
                            e
                        );
                    }
                    Err(e) => {
                        tracing::warn!("notification delivery attempt {} failed: {:#}", attempt, e);
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
    })
}

// ── Rendering ──

pub fn format_cents(amount: i64) -> String {
    format!("${}.{:02}", amount / 100, amount % 100)
}

/// (from, to, subject, body) for a notification. `default_from` is overridden
/// by the refund notice's explicit sender.
pub fn render(notification: &Notification, default_from: &str) -> (String, String, String, String) {
    match notification {
        Notification::AppointmentConfirmation(appt) => (
            default_from.to_string(),
            appt.customer_email.clone(),
            format!("Appointment confirmed: {}", appt.service_name),
            format!(
                "Hi {},\n\nYour {} appointment on {} at {} is confirmed.\n\
                 Deposit received: {}. Remaining balance due at your visit: {}.\n\n\
                 See you soon!",
                appt.customer_name,
                appt.service_name,
                appt.date,
                appt.time,
                format_cents(appt.deposit_amount),
                format_cents(appt.remaining_balance),
            ),
        ),
        Notification::OrderConfirmation(order) => (
            default_from.to_string(),
            order.customer_email.clone(),
            "Order confirmed".to_string(),
            format!(
                "Hi {},\n\nThanks for your order! We received your payment of {} \
                 for {} item(s) and are getting it ready.",
                order.customer_name,
                format_cents(order.total),
                order.items.len(),
            ),
        ),
        Notification::RefundNotice {
            email,
            name,
            description,
            amount,
            reason,
            from,
        } => (
            from.clone(),
            email.clone(),
            "Your refund is on its way".to_string(),
            format!(
                "Hi {name},\n\nWe've refunded {} for {description}.\nReason: {reason}\n\n\
                 The funds should appear within a few business days.",
                format_cents(*amount),
            ),
        ),
        Notification::MembershipActivated {
            email,
            name,
            tier_name,
        } => (
            default_from.to_string(),
            email.clone(),
            format!("Welcome to the {tier_name} membership"),
            format!(
                "Hi {name},\n\nYour {tier_name} membership is now active. \
                 Your included services are ready to book."
            ),
        ),
        Notification::MembershipCancelled {
            email,
            name,
            tier_name,
            period_end,
        } => {
            let until = period_end
                .map(|d| format!(" You keep your benefits until {}.", d.format("%Y-%m-%d")))
                .unwrap_or_default();
            (
                default_from.to_string(),
                email.clone(),
                format!("{tier_name} membership cancellation"),
                format!(
                    "Hi {name},\n\nYour {tier_name} membership will not renew.{until}"
                ),
            )
        }
    }
}

/// Sends mail through a transactional-email HTTP API.
pub struct HttpMailer {
    api_key: String,
    default_from: String,
    endpoint: String,
    http: reqwest::Client,
}

impl HttpMailer {
    pub fn new(api_key: String, default_from: String) -> Self {
        Self {
            api_key,
            default_from,
            endpoint: "https://api.resend.com/emails".into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        if self.api_key.is_empty() {
            anyhow::bail!("email provider not configured");
        }

        let (from, to, subject, body) = render(notification, &self.default_from);
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": from,
                "to": [to],
                "subject": subject,
                "text": body,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("email api error: {} - {}", status, text);
        }
        Ok(())
    }
}

// ── Tests ──
