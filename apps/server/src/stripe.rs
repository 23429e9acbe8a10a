use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;

// ── Gateway contract ──

#[derive(Debug, Clone)]
pub enum SessionMode {
    /// One-off charge (appointment deposit, order total).
    Payment {
        amount: i64,
        currency: String,
        product_name: String,
    },
    /// Recurring membership subscription.
    Subscription { price_id: String },
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub mode: SessionMode,
    pub customer_email: Option<String>,
    /// Carried through the processor and read back on verification.
    pub metadata: Vec<(String, String)>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SubscriptionDetails {
    pub id: String,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SessionDetails {
    pub id: String,
    pub payment_status: String,
    pub payment_intent: Option<String>,
    pub customer: Option<String>,
    pub metadata: HashMap<String, String>,
    pub subscription: Option<SubscriptionDetails>,
}

impl SessionDetails {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub id: String,
}

/// External card-payment processor. All calls are fallible and
/// caller-retryable; no retry happens in here.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, req: SessionRequest) -> Result<CheckoutSession>;
    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<SessionDetails>;
    async fn create_refund(&self, payment_intent_id: &str, reason: &str) -> Result<RefundReceipt>;
    async fn set_subscription_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<()>;
}

// ── Stripe implementation ──

const STRIPE_API: &str = "https://api.stripe.com/v1";

pub struct StripeGateway {
    secret_key: String,
    http: reqwest::Client,
}

impl StripeGateway {
    pub fn new(secret_key: String) -> Self {
        Self {
            secret_key,
            http: reqwest::Client::new(),
        }
    }

    fn key(&self) -> Result<&str> {
        if self.secret_key.is_empty() {
            anyhow::bail!("payment provider not configured");
        }
        Ok(&self.secret_key)
    }
}

/// Stripe wants nested form keys; build them once so they can be tested.
fn session_form(req: &SessionRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        (
            "success_url".into(),
            format!("{}?session_id={{CHECKOUT_SESSION_ID}}", req.success_url),
        ),
        ("cancel_url".into(), req.cancel_url.clone()),
    ];

    match &req.mode {
        SessionMode::Payment {
            amount,
            currency,
            product_name,
        } => {
            form.push(("mode".into(), "payment".into()));
            form.push((
                "line_items[0][price_data][currency]".into(),
                currency.clone(),
            ));
            form.push((
                "line_items[0][price_data][unit_amount]".into(),
                amount.to_string(),
            ));
            form.push((
                "line_items[0][price_data][product_data][name]".into(),
                product_name.clone(),
            ));
            form.push(("line_items[0][quantity]".into(), "1".into()));
        }
        SessionMode::Subscription { price_id } => {
            form.push(("mode".into(), "subscription".into()));
            form.push(("line_items[0][price]".into(), price_id.clone()));
            form.push(("line_items[0][quantity]".into(), "1".into()));
        }
    }

    if let Some(email) = &req.customer_email {
        form.push(("customer_email".into(), email.clone()));
    }
    for (k, v) in &req.metadata {
        form.push((format!("metadata[{k}]"), v.clone()));
    }
    form
}

#[derive(Debug, Deserialize)]
struct ApiSessionCreated {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSubscription {
    id: String,
    current_period_end: i64,
    #[serde(default)]
    cancel_at_period_end: bool,
}

#[derive(Debug, Deserialize)]
struct ApiSession {
    id: String,
    payment_status: String,
    payment_intent: Option<String>,
    customer: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    subscription: Option<ApiSubscription>,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, req: SessionRequest) -> Result<CheckoutSession> {
        let key = self.key()?;
        let form = session_form(&req);

        let resp = self
            .http
            .post(format!("{STRIPE_API}/checkout/sessions"))
            .basic_auth(key, None::<&str>)
            .form(&form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::error!("Stripe session creation failed: {} - {}", status, text);
            anyhow::bail!("stripe api error: {}", status);
        }

        let session: ApiSessionCreated = resp.json().await?;
        let url = session
            .url
            .ok_or_else(|| anyhow::anyhow!("missing checkout url on session {}", session.id))?;

        tracing::info!("Stripe checkout session created: {}", session.id);
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<SessionDetails> {
        let key = self.key()?;

        let resp = self
            .http
            .get(format!("{STRIPE_API}/checkout/sessions/{session_id}"))
            .basic_auth(key, None::<&str>)
            .query(&[("expand[]", "subscription")])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::error!("Stripe session retrieve failed: {} - {}", status, text);
            anyhow::bail!("stripe api error: {}", status);
        }

        let session: ApiSession = resp.json().await?;
        let subscription = session.subscription.map(|s| SubscriptionDetails {
            id: s.id,
            current_period_end: Utc
                .timestamp_opt(s.current_period_end, 0)
                .single()
                .unwrap_or_else(Utc::now),
            cancel_at_period_end: s.cancel_at_period_end,
        });

        Ok(SessionDetails {
            id: session.id,
            payment_status: session.payment_status,
            payment_intent: session.payment_intent,
            customer: session.customer,
            metadata: session.metadata,
            subscription,
        })
    }

    async fn create_refund(&self, payment_intent_id: &str, reason: &str) -> Result<RefundReceipt> {
        let key = self.key()?;

        // Stripe's `reason` field is a closed enum; the free-text reason
        // travels in metadata instead.
        let form = vec![
            ("payment_intent".to_string(), payment_intent_id.to_string()),
            ("reason".to_string(), "requested_by_customer".to_string()),
            ("metadata[reason]".to_string(), reason.to_string()),
        ];

        let resp = self
            .http
            .post(format!("{STRIPE_API}/refunds"))
            .basic_auth(key, None::<&str>)
            .form(&form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::error!("Stripe refund failed: {} - {}", status, text);
            anyhow::bail!("stripe api error: {}", status);
        }

        #[derive(Deserialize)]
        struct ApiRefund {
            id: String,
        }
        let refund: ApiRefund = resp.json().await?;
        tracing::info!("Stripe refund created for {}", payment_intent_id);
        Ok(RefundReceipt { id: refund.id })
    }

    async fn set_subscription_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<()> {
        let key = self.key()?;

        let resp = self
            .http
            .post(format!("{STRIPE_API}/subscriptions/{subscription_id}"))
            .basic_auth(key, None::<&str>)
            .form(&[("cancel_at_period_end", cancel.to_string())])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::error!("Stripe subscription update failed: {} - {}", status, text);
            anyhow::bail!("stripe api error: {}", status);
        }

        tracing::info!(
            "Stripe subscription {} cancel_at_period_end={}",
            subscription_id,
            cancel
        );
        Ok(())
    }
}

// ── Tests ──
