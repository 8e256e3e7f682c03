use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::staff::WorkingHours;
use crate::models::{CalendarConfig, Interval, Service, StaffMember};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct CalendarPayload {
    pub id: Option<String>,
    pub workspace_id: String,
    pub name: String,
    pub timezone: String,
    #[serde(default = "default_notice")]
    pub min_notice_hours: i64,
    #[serde(default = "default_advance")]
    pub max_advance_days: i64,
    #[serde(default = "default_interval")]
    pub slot_interval_minutes: i64,
    #[serde(default)]
    pub buffer_before_minutes: i64,
    #[serde(default)]
    pub buffer_after_minutes: i64,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_notice() -> i64 {
    1
}
fn default_advance() -> i64 {
    60
}
fn default_interval() -> i64 {
    30
}
fn default_true() -> bool {
    true
}

// POST /api/admin/calendars
pub async fn create_calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CalendarPayload>,
) -> Result<(StatusCode, Json<CalendarConfig>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let calendar = CalendarConfig {
        id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        workspace_id: payload.workspace_id,
        name: payload.name,
        timezone: payload.timezone,
        min_notice_hours: payload.min_notice_hours,
        max_advance_days: payload.max_advance_days,
        slot_interval_minutes: payload.slot_interval_minutes,
        buffer_before_minutes: payload.buffer_before_minutes,
        buffer_after_minutes: payload.buffer_after_minutes,
        is_public: payload.is_public,
        is_active: payload.is_active,
    };
    calendar.validate()?;

    let db = state.db.lock().unwrap();
    queries::save_calendar(&db, &calendar)?;

    Ok((StatusCode::CREATED, Json(calendar)))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub workspace_id: String,
}

// GET /api/admin/calendars
pub async fn list_calendars(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CalendarConfig>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let calendars = queries::list_calendars(&db, &query.workspace_id)?;
    Ok(Json(calendars))
}

#[derive(Deserialize)]
pub struct CalendarUpdate {
    pub name: Option<String>,
    pub timezone: Option<String>,
    pub min_notice_hours: Option<i64>,
    pub max_advance_days: Option<i64>,
    pub slot_interval_minutes: Option<i64>,
    pub buffer_before_minutes: Option<i64>,
    pub buffer_after_minutes: Option<i64>,
    pub is_public: Option<bool>,
    pub is_active: Option<bool>,
}

// PATCH /api/admin/calendars/:id
pub async fn update_calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<CalendarUpdate>,
) -> Result<Json<CalendarConfig>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let mut calendar = queries::get_calendar(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("calendar {id}")))?;

    if let Some(name) = update.name {
        calendar.name = name;
    }
    if let Some(timezone) = update.timezone {
        calendar.timezone = timezone;
    }
    if let Some(v) = update.min_notice_hours {
        calendar.min_notice_hours = v;
    }
    if let Some(v) = update.max_advance_days {
        calendar.max_advance_days = v;
    }
    if let Some(v) = update.slot_interval_minutes {
        calendar.slot_interval_minutes = v;
    }
    if let Some(v) = update.buffer_before_minutes {
        calendar.buffer_before_minutes = v;
    }
    if let Some(v) = update.buffer_after_minutes {
        calendar.buffer_after_minutes = v;
    }
    if let Some(v) = update.is_public {
        calendar.is_public = v;
    }
    if let Some(v) = update.is_active {
        calendar.is_active = v;
    }

    calendar.validate()?;
    queries::save_calendar(&db, &calendar)?;
    Ok(Json(calendar))
}

#[derive(Deserialize)]
pub struct ServicePayload {
    pub id: Option<String>,
    pub workspace_id: String,
    pub calendar_id: Option<String>,
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// POST /api/admin/services
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ServicePayload>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if payload.duration_minutes <= 0 {
        return Err(AppError::Validation(
            "duration_minutes must be > 0".to_string(),
        ));
    }

    let db = state.db.lock().unwrap();
    if let Some(calendar_id) = payload.calendar_id.as_deref() {
        queries::get_calendar(&db, calendar_id)?
            .ok_or_else(|| AppError::NotFound(format!("calendar {calendar_id}")))?;
    }

    let service = Service {
        id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        workspace_id: payload.workspace_id,
        calendar_id: payload.calendar_id,
        name: payload.name,
        duration_minutes: payload.duration_minutes,
        price: payload.price,
        is_active: payload.is_active,
    };
    queries::save_service(&db, &service)?;

    Ok((StatusCode::CREATED, Json(service)))
}

#[derive(Deserialize)]
pub struct StaffPayload {
    pub id: Option<String>,
    pub workspace_id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub accepts_bookings: bool,
}

// POST /api/admin/staff
pub async fn create_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<StaffPayload>,
) -> Result<(StatusCode, Json<StaffMember>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let staff = StaffMember {
        id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        workspace_id: payload.workspace_id,
        name: payload.name,
        is_active: payload.is_active,
        accepts_bookings: payload.accepts_bookings,
    };

    let db = state.db.lock().unwrap();
    queries::save_staff(&db, &staff)?;

    Ok((StatusCode::CREATED, Json(staff)))
}

#[derive(Deserialize)]
pub struct AssignServicePayload {
    pub service_id: String,
}

// POST /api/admin/staff/:id/services
pub async fn assign_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(staff_id): Path<String>,
    Json(payload): Json<AssignServicePayload>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    queries::get_staff(&db, &staff_id)?
        .ok_or_else(|| AppError::NotFound(format!("staff member {staff_id}")))?;
    queries::assign_staff_service(&db, &staff_id, &payload.service_id)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct WorkingHoursPayload {
    /// 0 = Sunday through 6 = Saturday.
    pub weekday: u8,
    pub start_time: String,
    pub end_time: String,
}

// POST /api/admin/staff/:id/working-hours
pub async fn add_working_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(staff_id): Path<String>,
    Json(payload): Json<WorkingHoursPayload>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if payload.weekday > 6 {
        return Err(AppError::Validation("weekday must be 0-6".to_string()));
    }
    let start = NaiveTime::parse_from_str(&payload.start_time, "%H:%M")
        .map_err(|_| AppError::Validation("start_time must be HH:MM".to_string()))?;
    let end = NaiveTime::parse_from_str(&payload.end_time, "%H:%M")
        .map_err(|_| AppError::Validation("end_time must be HH:MM".to_string()))?;
    if end <= start {
        return Err(AppError::Validation(
            "end_time must be after start_time".to_string(),
        ));
    }

    let db = state.db.lock().unwrap();
    queries::get_staff(&db, &staff_id)?
        .ok_or_else(|| AppError::NotFound(format!("staff member {staff_id}")))?;
    queries::add_working_hours(
        &db,
        &staff_id,
        &WorkingHours {
            weekday: payload.weekday,
            start_time: payload.start_time,
            end_time: payload.end_time,
        },
    )?;

    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
pub struct BusyBlockPayload {
    /// UTC.
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Defaults to now; backdating lets a sync job report its real run time.
    pub synced_at: Option<NaiveDateTime>,
}

// POST /api/admin/staff/:id/busy-blocks
pub async fn add_busy_block(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(staff_id): Path<String>,
    Json(payload): Json<BusyBlockPayload>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if payload.end_time <= payload.start_time {
        return Err(AppError::Validation(
            "end_time must be after start_time".to_string(),
        ));
    }

    let db = state.db.lock().unwrap();
    queries::get_staff(&db, &staff_id)?
        .ok_or_else(|| AppError::NotFound(format!("staff member {staff_id}")))?;
    queries::add_busy_block(
        &db,
        &staff_id,
        &Interval::new(payload.start_time, payload.end_time),
        &payload.synced_at.unwrap_or_else(|| Utc::now().naive_utc()),
    )?;

    Ok(StatusCode::CREATED)
}
