mod appointments;
mod checkout;
mod config;
mod error;
mod handlers;
mod membership;
mod models;
mod notifier;
mod refunds;
mod schedule;
mod store;
mod stripe;
#[cfg(test)]
mod test_support;

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use appointments::AppointmentManager;
use checkout::CheckoutCoordinator;
use config::AppConfig;
use membership::MembershipManager;
use notifier::Notifier;
use refunds::RefundCoordinator;
use store::Store;
use stripe::PaymentGateway;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Notifier,
    pub config: Arc<AppConfig>,
    pub admin_token: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn appointments(&self) -> AppointmentManager {
        AppointmentManager::new(
            self.store.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
    }

    pub fn checkout(&self) -> CheckoutCoordinator {
        CheckoutCoordinator::new(
            self.store.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
    }

    pub fn memberships(&self) -> MembershipManager {
        MembershipManager::new(
            self.store.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
    }

    pub fn refunds(&self) -> RefundCoordinator {
        RefundCoordinator::new(
            self.store.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Tracing ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Env ──
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:lune.db?mode=rwc".into());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let stripe_secret_key = std::env::var("STRIPE_SECRET_KEY").unwrap_or_default();
    let resend_api_key = std::env::var("RESEND_API_KEY").unwrap_or_default();
    let admin_token = std::env::var("ADMIN_TOKEN").unwrap_or_default();
    let webapp_url =
        std::env::var("WEBAPP_URL").unwrap_or_else(|_| "https://example.com".into());

    if stripe_secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY not set — payments will fail");
    }
    if admin_token.is_empty() {
        tracing::warn!("ADMIN_TOKEN not set — admin endpoints disabled");
    }

    let app_config = Arc::new(AppConfig::from_env());

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    let sqlite_store = store::SqliteStore::new(pool);
    sqlite_store.run_migrations().await?;
    let store: Arc<dyn Store> = Arc::new(sqlite_store);

    // ── Notification worker ──
    let (notifier, rx) = Notifier::channel();
    let mailer = Arc::new(notifier::HttpMailer::new(
        resend_api_key,
        app_config.email_from.clone(),
    ));
    notifier::spawn_worker(rx, mailer);

    let state = Arc::new(AppState {
        store,
        gateway: Arc::new(stripe::StripeGateway::new(stripe_secret_key)),
        notifier,
        config: app_config,
        admin_token,
        started_at: Instant::now(),
    });

    // ── CORS: whitelist WEBAPP_URL when configured, otherwise allow any ──
    let cors = if webapp_url != "https://example.com" {
        let origins: Vec<axum::http::HeaderValue> = vec![
            webapp_url.parse().expect("WEBAPP_URL must be a valid URL"),
            "http://localhost:5173".parse().unwrap(), // Vite dev server
        ];
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // ── Router ──
    let client_routes = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route("/api/slots", get(handlers::client::available_slots))
        .route(
            "/api/appointments",
            post(handlers::client::create_appointment),
        )
        .route(
            "/api/appointments/priority",
            post(handlers::client::create_priority_booking),
        )
        .route(
            "/api/appointments/{id}",
            get(handlers::client::get_appointment),
        )
        .route(
            "/api/checkout/appointments",
            post(handlers::client::appointment_checkout),
        )
        .route(
            "/api/checkout/appointments/verify",
            post(handlers::client::appointment_verify),
        )
        .route("/api/orders", post(handlers::client::create_order))
        .route("/api/orders/{id}", get(handlers::client::get_order))
        .route(
            "/api/checkout/orders",
            post(handlers::client::order_checkout),
        )
        .route(
            "/api/checkout/orders/verify",
            post(handlers::client::order_verify),
        )
        .route(
            "/api/memberships/{user_id}",
            get(handlers::client::get_membership),
        )
        .route(
            "/api/memberships/checkout",
            post(handlers::client::membership_checkout),
        )
        .route(
            "/api/memberships/verify",
            post(handlers::client::membership_verify),
        )
        .route(
            "/api/memberships/cancel",
            post(handlers::client::membership_cancel),
        );

    let admin_routes = Router::new()
        .route(
            "/api/admin/appointments",
            get(handlers::admin::list_appointments),
        )
        .route(
            "/api/admin/appointments/{id}/cancel",
            post(handlers::admin::cancel_appointment),
        )
        .route(
            "/api/admin/appointments/{id}/complete",
            post(handlers::admin::complete_appointment),
        )
        .route("/api/admin/orders", get(handlers::admin::list_orders))
        .route("/api/admin/refunds", post(handlers::admin::create_refund))
        .route("/api/admin/schedule", get(handlers::admin::get_schedule))
        .route("/api/admin/schedule", put(handlers::admin::update_schedule));

    let app = Router::new()
        .merge(client_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Lune Nails server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
