use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::{AppConfig, MembershipTier};
use crate::error::ApiError;
use crate::models::*;
use crate::notifier::{Notification, Notifier};
use crate::store::Store;
use crate::stripe::{PaymentGateway, SessionMode, SessionRequest};

/// Subscription lifecycle: checkout, activation, period-end cancellation.
/// A user holds at most one membership record; `inactive` records left by
/// abandoned checkouts are overwritten by the next attempt.
pub struct MembershipManager {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Notifier,
    config: Arc<AppConfig>,
}

impl MembershipManager {
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

    /// Start subscription checkout. An already active membership is rejected
    /// before any processor call.
    pub async fn create_checkout_session(
        &self,
        req: MembershipCheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutRedirect, ApiError> {
        let tier = self
            .config
            .tier(&req.tier_id)
            .ok_or_else(|| ApiError::not_found("membership tier"))?
            .clone();
        if tier.stripe_price_id.is_empty() {
            return Err(ApiError::validation("tier has no subscription price"));
        }

        let mut users = self.store.users().await?;
        let user = users
            .iter_mut()
            .find(|u| u.id == req.user_id)
            .ok_or_else(|| ApiError::not_found("user"))?;

        if let Some(m) = &user.membership {
            if m.status == MembershipStatus::Active {
                return Err(ApiError::conflict("membership already active"));
            }
        }

        // Placeholder record; activation happens on verification.
        user.membership = Some(Membership {
            tier_id: tier.id.clone(),
            tier_name: tier.name.clone(),
            status: MembershipStatus::Inactive,
            cancel_at_period_end: false,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            current_period_end: None,
            usage: BenefitUsage::fresh(now),
        });
        let email = user.email.clone();
        self.store.save_users(&users).await?;

        let session = self
            .gateway
            .create_checkout_session(SessionRequest {
                mode: SessionMode::Subscription {
                    price_id: tier.stripe_price_id.clone(),
                },
                customer_email: Some(email),
                metadata: vec![
                    ("kind".into(), "membership".into()),
                    ("user_id".into(), req.user_id.clone()),
                    ("tier_id".into(), tier.id.clone()),
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

    /// Activate a membership from a paid subscription session. Idempotent:
    /// re-verifying an active membership changes nothing.
    pub async fn verify_session(
        &self,
        req: MembershipVerifyRequest,
        now: DateTime<Utc>,
    ) -> Result<User, ApiError> {
        let session = self
            .gateway
            .retrieve_checkout_session(&req.session_id)
            .await
            .map_err(ApiError::Upstream)?;

        // A non-subscription session can never activate a membership, paid
        // or not.
        if session.metadata.get("kind").map(String::as_str) != Some("membership") {
            return Err(ApiError::conflict("invalid session type"));
        }
        let subscription = session
            .subscription
            .as_ref()
            .ok_or_else(|| ApiError::conflict("invalid session type"))?;

        if !session.is_paid() {
            return Err(ApiError::PaymentIncomplete);
        }

        if session.metadata.get("user_id").map(String::as_str) != Some(req.user_id.as_str()) {
            return Err(ApiError::conflict(
                "checkout session does not belong to this user",
            ));
        }

        let mut users = self.store.users().await?;
        let user = users
            .iter_mut()
            .find(|u| u.id == req.user_id)
            .ok_or_else(|| ApiError::not_found("user"))?;
        let member = user
            .membership
            .as_mut()
            .ok_or_else(|| ApiError::conflict("no membership checkout in progress"))?;

        if member.status == MembershipStatus::Active {
            return Ok(user.clone());
        }

        // A stale session from an earlier tier choice must not activate a
        // different placeholder.
        if session.metadata.get("tier_id").map(String::as_str) != Some(member.tier_id.as_str()) {
            return Err(ApiError::conflict(
                "checkout session is for a different tier",
            ));
        }

        member.status = MembershipStatus::Active;
        member.cancel_at_period_end = subscription.cancel_at_period_end;
        member.stripe_customer_id = session.customer.clone();
        member.stripe_subscription_id = Some(subscription.id.clone());
        member.current_period_end = Some(subscription.current_period_end);
        member.usage = BenefitUsage::fresh(now);

        let tier_name = member.tier_name.clone();
        let user = user.clone();
        self.store.save_users(&users).await?;

        self.notifier.enqueue(Notification::MembershipActivated {
            email: user.email.clone(),
            name: user.name.clone(),
            tier_name,
        });

        tracing::info!("Membership activated for user {}", user.id);
        Ok(user)
    }

    /// User record with membership state, for the storefront account page.
    pub async fn get_user(&self, user_id: &str) -> Result<User, ApiError> {
        self.store
            .users()
            .await?
            .into_iter()
            .find(|u| u.id == user_id)
            .ok_or_else(|| ApiError::not_found("user"))
    }

    /// Flag the membership to lapse at period end. The local flag flips even
    /// when the processor update fails; the discrepancy is logged for manual
    /// reconciliation.
    pub async fn cancel(&self, req: MembershipCancelRequest) -> Result<User, ApiError> {
        let mut users = self.store.users().await?;
        let user = users
            .iter_mut()
            .find(|u| u.id == req.user_id)
            .ok_or_else(|| ApiError::not_found("user"))?;
        let member = user
            .membership
            .as_mut()
            .filter(|m| m.status == MembershipStatus::Active)
            .ok_or_else(|| ApiError::conflict("no active membership"))?;

        if let Some(subscription_id) = member.stripe_subscription_id.clone() {
            if let Err(e) = self
                .gateway
                .set_subscription_cancel_at_period_end(&subscription_id, true)
                .await
            {
                tracing::error!(
                    "subscription {} cancel update failed, needs manual reconciliation: {:#}",
                    subscription_id,
                    e
                );
            }
        }

        member.cancel_at_period_end = true;
        let tier_name = member.tier_name.clone();
        let period_end = member.current_period_end;
        let user = user.clone();
        self.store.save_users(&users).await?;

        self.notifier.enqueue(Notification::MembershipCancelled {
            email: user.email.clone(),
            name: user.name.clone(),
            tier_name,
            period_end,
        });

        tracing::info!("Membership for user {} set to lapse", user.id);
        Ok(user)
    }
}

/// Draw one benefit from an active membership. Resets stale usage counters
/// lazily when the stored billing period has rolled over.
pub fn consume_benefit(
    member: &mut Membership,
    tier: &MembershipTier,
    benefit: BenefitKind,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    if member.status != MembershipStatus::Active {
        return Err(ApiError::conflict("membership is not active"));
    }

    if let Some(period_end) = member.current_period_end {
        if now >= period_end {
            member.usage = BenefitUsage::fresh(now);
            member.current_period_end = None;
        }
    }

    let used = match benefit {
        BenefitKind::Refill => &mut member.usage.refills_used,
        BenefitKind::FullSet => &mut member.usage.full_sets_used,
    };
    // `None` allowance is unlimited.
    if let Some(cap) = tier.allowance(benefit) {
        if *used >= cap {
            return Err(ApiError::conflict("benefit allowance exhausted"));
        }
    }
    *used += 1;
    Ok(())
}

// ── Tests ──
