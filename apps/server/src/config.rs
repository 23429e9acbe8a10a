use serde::{Deserialize, Serialize};

use crate::models::BenefitKind;

/// A purchasable membership tier. Benefit allowances are per billing period;
/// `None` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipTier {
    pub id: String,
    pub name: String,
    /// Processor price reference used for subscription checkout.
    pub stripe_price_id: String,
    /// Monthly price in cents, for display and notifications.
    pub monthly_price: i64,
    pub refills_per_period: Option<u32>,
    pub full_sets_per_period: Option<u32>,
}

impl MembershipTier {
    pub fn allowance(&self, benefit: BenefitKind) -> Option<u32> {
        match benefit {
            BenefitKind::Refill => self.refills_per_period,
            BenefitKind::FullSet => self.full_sets_per_period,
        }
    }
}

/// Payment policy injected into the coordinators. No hard-coded literals in
/// the managers themselves.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Booking deposit in cents, capped at the appointment price.
    pub deposit_amount: i64,
    pub currency: String,
    /// Where the processor redirects after checkout.
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    /// Sender address for customer notifications.
    pub email_from: String,
    pub tiers: Vec<MembershipTier>,
}

/// Default deposit: $25.
const DEFAULT_DEPOSIT_CENTS: i64 = 2500;

impl AppConfig {
    pub fn from_env() -> Self {
        let deposit_amount = std::env::var("DEPOSIT_AMOUNT_CENTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DEPOSIT_CENTS);
        let webapp_url =
            std::env::var("WEBAPP_URL").unwrap_or_else(|_| "https://example.com".into());

        Self {
            deposit_amount,
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "usd".into()),
            checkout_success_url: format!("{webapp_url}/checkout/success"),
            checkout_cancel_url: format!("{webapp_url}/checkout/cancelled"),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "bookings@lunenails.example".into()),
            tiers: default_tiers(),
        }
    }

    pub fn tier(&self, tier_id: &str) -> Option<&MembershipTier> {
        self.tiers.iter().find(|t| t.id == tier_id)
    }
}

/// Built-in tier table. Price ids point at the processor's catalog.
fn default_tiers() -> Vec<MembershipTier> {
    vec![
        MembershipTier {
            id: "essential".into(),
            name: "Essential".into(),
            stripe_price_id: std::env::var("STRIPE_PRICE_ESSENTIAL").unwrap_or_default(),
            monthly_price: 6500,
            refills_per_period: Some(2),
            full_sets_per_period: Some(0),
        },
        MembershipTier {
            id: "signature".into(),
            name: "Signature".into(),
            stripe_price_id: std::env::var("STRIPE_PRICE_SIGNATURE").unwrap_or_default(),
            monthly_price: 11000,
            refills_per_period: Some(2),
            full_sets_per_period: Some(1),
        },
    ]
}
