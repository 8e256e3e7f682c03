use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Interval, Slot};
use crate::services::assignment::{AssignmentMode, AssignmentStrategy};
use crate::services::slots::GenerateParams;
use crate::services::{availability, slots, utc_to_local};
use crate::state::AppState;

const WIRE_FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// Window used for least-booked fairness counts.
const LEAST_BOOKED_WINDOW_DAYS: i64 = 7;

#[derive(Deserialize)]
pub struct SlotsQuery {
    pub workspace_id: String,
    pub service_id: String,
    /// Defaults to today in the calendar's timezone.
    pub date: Option<NaiveDate>,
    /// per_staff | round_robin | least_booked | fixed_staff
    pub mode: Option<String>,
    pub staff_id: Option<String>,
    pub buffer_before: Option<i64>,
    pub buffer_after: Option<i64>,
    pub min_notice_hours: Option<i64>,
    pub max_advance_days: Option<i64>,
}

#[derive(Serialize)]
pub struct ServiceSummary {
    pub id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub price: f64,
}

#[derive(Serialize)]
pub struct SlotResponse {
    pub start: String,
    pub end: String,
    pub staff_id: String,
    pub staff_name: String,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    pub date: String,
    pub service: ServiceSummary,
    pub mode: String,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub slots: Vec<SlotResponse>,
}

// GET /slots
pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let db = state.db.lock().unwrap();

    let service = queries::get_service(&db, &query.service_id, &query.workspace_id)?
        .filter(|s| s.is_active)
        .ok_or_else(|| AppError::NotFound(format!("service {}", query.service_id)))?;

    let calendar_id = service.calendar_id.clone().ok_or_else(|| {
        AppError::Validation("service is not attached to a calendar".to_string())
    })?;
    let calendar = queries::get_calendar(&db, &calendar_id)?
        .filter(|c| c.is_active)
        .ok_or_else(|| AppError::NotFound(format!("calendar {calendar_id}")))?;
    let tz = calendar.tz()?;

    let mode_str = query.mode.clone().unwrap_or_else(|| "per_staff".to_string());
    let mode = AssignmentMode::parse(&mode_str)?;
    if mode == AssignmentMode::FixedStaff && query.staff_id.is_none() {
        return Err(AppError::Validation(
            "fixed_staff mode requires a staff_id".to_string(),
        ));
    }

    let now_utc = Utc::now().naive_utc();
    let now_local = utc_to_local(now_utc, &tz);
    let date = query.date.unwrap_or_else(|| now_local.date());

    let buffer_before = query.buffer_before.unwrap_or(calendar.buffer_before_minutes);
    let buffer_after = query.buffer_after.unwrap_or(calendar.buffer_after_minutes);
    let notice_cutoff =
        now_local + Duration::hours(query.min_notice_hours.unwrap_or(calendar.min_notice_hours));
    let advance_cutoff =
        now_local + Duration::days(query.max_advance_days.unwrap_or(calendar.max_advance_days));

    let service_summary = ServiceSummary {
        id: service.id.clone(),
        name: service.name.clone(),
        duration_minutes: service.duration_minutes,
        price: service.price,
    };

    // A date entirely outside the booking window is answered, not erred:
    // an empty list with an explanation.
    let day_start = date.and_time(NaiveTime::MIN);
    let day_end = day_start + Duration::days(1);
    if day_end <= notice_cutoff || day_start > advance_cutoff {
        return Ok(Json(SlotsResponse {
            date: date.to_string(),
            service: service_summary,
            mode: mode_str,
            degraded: false,
            message: Some("date is outside the booking window".to_string()),
            slots: vec![],
        }));
    }

    let snapshot = availability::resolve(
        &db,
        &service,
        &calendar,
        date,
        buffer_before,
        buffer_after,
        query.staff_id.as_deref(),
        now_utc,
        state.config.sync_staleness_minutes,
    )?;

    let mut candidates: Vec<Slot> = Vec::new();
    for staff in &snapshot.staff {
        let intervals = slots::generate(&GenerateParams {
            working_intervals: &staff.working_intervals,
            busy_intervals: &staff.busy_intervals,
            duration_minutes: service.duration_minutes,
            slot_interval_minutes: calendar.slot_interval_minutes,
            buffer_before_minutes: buffer_before,
            buffer_after_minutes: buffer_after,
            notice_cutoff,
            advance_cutoff,
        });
        for interval in intervals {
            candidates.push(Slot {
                start_time: interval.start,
                end_time: interval.end,
                staff_id: staff.staff.id.clone(),
                staff_name: staff.staff.name.clone(),
            });
        }
    }

    let assigned = match mode {
        AssignmentMode::PerStaff => {
            candidates.sort_by(|a, b| {
                (a.start_time, &a.staff_id).cmp(&(b.start_time, &b.staff_id))
            });
            candidates
        }
        AssignmentMode::RoundRobin => {
            // Viewing availability never mutates the rotation: the
            // persisted cursor moves only when a booking commits, so
            // refreshing the slot list cannot permute future turns.
            let order: Vec<String> = snapshot.staff.iter().map(|s| s.staff.id.clone()).collect();
            let cursor = queries::rotation_cursor(&db, &calendar.id)?;
            AssignmentStrategy::RoundRobin { order, cursor }.collapse(candidates)
        }
        AssignmentMode::LeastBooked => {
            let window = Interval::new(now_utc, now_utc + Duration::days(LEAST_BOOKED_WINDOW_DAYS));
            let counts: HashMap<String, i64> =
                queries::booking_counts_between(&db, &query.workspace_id, &window)?
                    .into_iter()
                    .collect();
            AssignmentStrategy::LeastBooked { counts }.collapse(candidates)
        }
        AssignmentMode::FixedStaff => {
            // Presence checked above.
            let staff_id = query.staff_id.clone().unwrap_or_default();
            AssignmentStrategy::FixedStaff { staff_id }.collapse(candidates)
        }
    };

    let message = snapshot
        .degraded
        .then(|| "external calendar data may be out of date".to_string());

    Ok(Json(SlotsResponse {
        date: date.to_string(),
        service: service_summary,
        mode: mode_str,
        degraded: snapshot.degraded,
        message,
        slots: assigned
            .into_iter()
            .map(|slot| SlotResponse {
                start: slot.start_time.format(WIRE_FMT).to_string(),
                end: slot.end_time.format(WIRE_FMT).to_string(),
                staff_id: slot.staff_id,
                staff_name: slot.staff_name,
            })
            .collect(),
    }))
}
