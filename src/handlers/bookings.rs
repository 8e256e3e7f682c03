use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, CustomerInfo};
use crate::services::booking::{self, BookingOutcome, BookingRequest};
use crate::services::flow::BookingFlow;
use crate::state::AppState;

const WIRE_FMT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Deserialize)]
pub struct CreateBookingPayload {
    pub workspace_id: String,
    pub service_id: String,
    pub staff_id: Option<String>,
    /// Wall-clock start in the calendar's timezone.
    pub start_time: NaiveDateTime,
    #[serde(default)]
    pub customer: CustomerInfo,
    pub booking_page_id: Option<String>,
    pub answers: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    /// When the client fetched the availability it is committing against
    /// (UTC). Selections older than the hold TTL are rejected so nobody
    /// books from a long-stale slot list. Omitted means "just now".
    pub selected_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub service_id: String,
    pub staff_id: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
}

impl BookingResponse {
    fn from_outcome(outcome: &BookingOutcome) -> Self {
        BookingResponse {
            id: outcome.booking.id.clone(),
            service_id: outcome.booking.service_id.clone(),
            staff_id: outcome.booking.staff_id.clone(),
            start_time: outcome.local_start.format(WIRE_FMT).to_string(),
            end_time: outcome.local_end.format(WIRE_FMT).to_string(),
            status: outcome.booking.status.as_str().to_string(),
        }
    }
}

// POST /bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBookingPayload>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let now_utc = Utc::now().naive_utc();

    let outcome = {
        let mut db = state.db.lock().unwrap();

        let service = queries::get_service(&db, &payload.service_id, &payload.workspace_id)?
            .filter(|s| s.is_active)
            .ok_or_else(|| AppError::NotFound(format!("service {}", payload.service_id)))?;

        // Replay the client's booking-page walk through the flow: a held
        // slot that outlived the selection TTL or incomplete details are
        // rejected before the transaction manager runs.
        let mut flow = BookingFlow::new(vec![service], state.config.selection_ttl_secs);
        flow.select_slot(
            payload.start_time,
            payload.staff_id.as_deref().unwrap_or("auto"),
            payload.selected_at.unwrap_or(now_utc),
        )?;
        let selection =
            flow.submit_details(&payload.customer, &[], payload.answers.as_ref(), now_utc)?;

        let request = BookingRequest {
            workspace_id: payload.workspace_id,
            service_id: payload.service_id,
            staff_id: payload.staff_id,
            start_time: selection.start_time,
            customer: payload.customer,
            booking_page_id: payload.booking_page_id,
            answers: payload.answers,
            idempotency_key: payload.idempotency_key,
        };

        match booking::book(&mut db, &request, now_utc) {
            Ok(outcome) => {
                flow.confirm()?;
                outcome
            }
            Err(e) => {
                if matches!(e, AppError::Conflict { .. }) {
                    flow.on_conflict();
                }
                return Err(e);
            }
        }
    };

    notify(&state, &outcome.booking, NotifyKind::Confirmed).await;

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse::from_outcome(&outcome)),
    ))
}

#[derive(Deserialize)]
pub struct CancelPayload {
    pub workspace_id: String,
}

// POST /bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<CancelPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cancelled = {
        let db = state.db.lock().unwrap();
        booking::cancel(&db, &id, &payload.workspace_id)?
    };

    notify(&state, &cancelled, NotifyKind::Cancelled).await;

    Ok(Json(serde_json::json!({
        "id": cancelled.id,
        "status": cancelled.status.as_str(),
    })))
}

#[derive(Deserialize)]
pub struct ReschedulePayload {
    pub workspace_id: String,
    /// New wall-clock start in the calendar's timezone.
    pub start_time: NaiveDateTime,
    pub staff_id: Option<String>,
}

// POST /bookings/:id/reschedule
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ReschedulePayload>,
) -> Result<Json<BookingResponse>, AppError> {
    let outcome = {
        let mut db = state.db.lock().unwrap();
        booking::reschedule(
            &mut db,
            &id,
            &payload.workspace_id,
            payload.start_time,
            payload.staff_id.as_deref(),
            Utc::now().naive_utc(),
        )?
    };

    notify(&state, &outcome.booking, NotifyKind::Rescheduled).await;

    Ok(Json(BookingResponse::from_outcome(&outcome)))
}

enum NotifyKind {
    Confirmed,
    Cancelled,
    Rescheduled,
}

/// Notification failures never fail the request; the booking is already
/// committed by the time we get here.
async fn notify(state: &AppState, booking: &Booking, kind: NotifyKind) {
    let result = match kind {
        NotifyKind::Confirmed => state.notifier.booking_confirmed(booking).await,
        NotifyKind::Cancelled => state.notifier.booking_cancelled(booking).await,
        NotifyKind::Rescheduled => state.notifier.booking_rescheduled(booking).await,
    };
    if let Err(e) = result {
        tracing::warn!(booking_id = %booking.id, "notification failed: {e}");
    }
}
