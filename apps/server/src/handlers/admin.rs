use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::*;
use crate::schedule::ScheduleSettings;
use crate::AppState;

/// Bearer-token guard for all admin endpoints. An empty configured token
/// disables the whole admin surface.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if state.admin_token.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == state.admin_token => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

// ── Appointments ──

/// GET /api/admin/appointments?date= | ?from=&to=
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<ApiResponse<Vec<Appointment>>>, ApiError> {
    require_admin(&state, &headers)?;
    let all = state.appointments().list(&query).await?;
    Ok(Json(ApiResponse::success(all)))
}

/// POST /api/admin/appointments/{id}/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Appointment>>, ApiError> {
    require_admin(&state, &headers)?;
    let appt = state.appointments().cancel(&id, Utc::now()).await?;
    Ok(Json(ApiResponse::success(appt)))
}

/// POST /api/admin/appointments/{id}/complete
pub async fn complete_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Appointment>>, ApiError> {
    require_admin(&state, &headers)?;
    let appt = state.appointments().complete(&id, Utc::now()).await?;
    Ok(Json(ApiResponse::success(appt)))
}

// ── Orders ──

/// GET /api/admin/orders — newest first.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<Order>>>, ApiError> {
    require_admin(&state, &headers)?;
    let orders = state.checkout().list_orders().await?;
    Ok(Json(ApiResponse::success(orders)))
}

// ── Refunds ──

/// POST /api/admin/refunds
pub async fn create_refund(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RefundRequest>,
) -> Result<Json<ApiResponse<RefundOutcome>>, ApiError> {
    require_admin(&state, &headers)?;
    let outcome = state.refunds().refund(req, Utc::now()).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

// ── Schedule settings ──

/// GET /api/admin/schedule
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<ScheduleSettings>>, ApiError> {
    require_admin(&state, &headers)?;
    let settings = state.store.schedule_settings().await?;
    Ok(Json(ApiResponse::success(settings)))
}

/// PUT /api/admin/schedule — replace the working-hours configuration.
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(settings): Json<ScheduleSettings>,
) -> Result<Json<ApiResponse<ScheduleSettings>>, ApiError> {
    require_admin(&state, &headers)?;
    if settings.slot_duration_minutes == 0 {
        return Err(ApiError::validation("slot duration must be positive"));
    }
    if settings.max_appointments_per_slot == 0 {
        return Err(ApiError::validation("slot capacity must be positive"));
    }
    state.store.save_schedule_settings(&settings).await?;
    tracing::info!("Schedule settings updated");
    Ok(Json(ApiResponse::success(settings)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Notifier;
    use crate::test_support::*;
    use axum::http::HeaderValue;
    use std::time::Instant;

    fn test_state(admin_token: &str) -> AppState {
        let (notifier, _rx) = Notifier::channel();
        AppState {
            store: Arc::new(MemStore::default()),
            gateway: Arc::new(FakeGateway::default()),
            notifier,
            config: Arc::new(test_config()),
            admin_token: admin_token.into(),
            started_at: Instant::now(),
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_guard_accepts_matching_token() {
        let state = test_state("secret");
        assert!(require_admin(&state, &bearer("secret")).is_ok());
    }

    #[test]
    fn test_guard_rejects_wrong_or_missing_token() {
        let state = test_state("secret");
        assert!(matches!(
            require_admin(&state, &bearer("guess")),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            require_admin(&state, &HeaderMap::new()),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn test_guard_disabled_without_configured_token() {
        let state = test_state("");
        // Even an empty bearer must not match an empty configured token
        assert!(matches!(
            require_admin(&state, &bearer("")),
            Err(ApiError::Unauthorized)
        ));
    }
}
