use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::*;
use crate::AppState;

// ── Availability & appointments ──

/// GET /api/slots?date=YYYY-MM-DD — bookable slot labels for a date.
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let slots = state.appointments().slots(&query.date, Utc::now()).await?;
    Ok(Json(ApiResponse::success(slots)))
}

/// POST /api/appointments — create a pending appointment.
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiResponse<Appointment>>, ApiError> {
    let appt = state.appointments().create(req, Utc::now()).await?;
    Ok(Json(ApiResponse::success(appt)))
}

/// POST /api/appointments/priority — membership-funded booking.
pub async fn create_priority_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PriorityBookingRequest>,
) -> Result<Json<ApiResponse<Appointment>>, ApiError> {
    let appt = state.appointments().create_priority(req, Utc::now()).await?;
    Ok(Json(ApiResponse::success(appt)))
}

/// GET /api/appointments/{id}
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Appointment>>, ApiError> {
    let appt = state.appointments().get(&id).await?;
    Ok(Json(ApiResponse::success(appt)))
}

// ── Appointment deposit checkout ──

/// POST /api/checkout/appointments — start deposit checkout.
pub async fn appointment_checkout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AppointmentCheckoutRequest>,
) -> Result<Json<ApiResponse<CheckoutRedirect>>, ApiError> {
    let redirect = state.checkout().create_deposit_session(req, Utc::now()).await?;
    Ok(Json(ApiResponse::success(redirect)))
}

/// POST /api/checkout/appointments/verify — reconcile after redirect.
pub async fn appointment_verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AppointmentVerifyRequest>,
) -> Result<Json<ApiResponse<Appointment>>, ApiError> {
    let appt = state.checkout().verify_deposit_session(req, Utc::now()).await?;
    Ok(Json(ApiResponse::success(appt)))
}

// ── Orders ──

/// POST /api/orders — create a pending order.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let order = state.checkout().create_order(req, Utc::now()).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let order = state.checkout().get_order(&id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/checkout/orders — start checkout for the order total.
pub async fn order_checkout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OrderCheckoutRequest>,
) -> Result<Json<ApiResponse<CheckoutRedirect>>, ApiError> {
    let redirect = state.checkout().create_order_session(req).await?;
    Ok(Json(ApiResponse::success(redirect)))
}

/// POST /api/checkout/orders/verify
pub async fn order_verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OrderVerifyRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let order = state.checkout().verify_order_session(req, Utc::now()).await?;
    Ok(Json(ApiResponse::success(order)))
}

// ── Memberships ──

/// GET /api/memberships/{user_id} — user with membership state.
pub async fn get_membership(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.memberships().get_user(&user_id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// POST /api/memberships/checkout — start subscription checkout.
pub async fn membership_checkout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MembershipCheckoutRequest>,
) -> Result<Json<ApiResponse<CheckoutRedirect>>, ApiError> {
    let redirect = state
        .memberships()
        .create_checkout_session(req, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(redirect)))
}

/// POST /api/memberships/verify — activate after redirect.
pub async fn membership_verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MembershipVerifyRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.memberships().verify_session(req, Utc::now()).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// POST /api/memberships/cancel — lapse at period end.
pub async fn membership_cancel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MembershipCancelRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.memberships().cancel(req).await?;
    Ok(Json(ApiResponse::success(user)))
}
