use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, CustomerInfo, Interval, Service};
use crate::services::{local_to_utc, utc_to_local};

/// Window used when auto-picking the least-booked staff member.
const AUTO_PICK_WINDOW_DAYS: i64 = 7;

pub struct BookingRequest {
    pub workspace_id: String,
    pub service_id: String,
    /// None lets the engine pick the least-booked eligible staff member.
    pub staff_id: Option<String>,
    /// Wall-clock start in the calendar's timezone.
    pub start_time: NaiveDateTime,
    pub customer: CustomerInfo,
    pub booking_page_id: Option<String>,
    pub answers: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug)]
pub struct BookingOutcome {
    pub booking: Booking,
    /// Appointment interval in the calendar's timezone, for the response.
    pub local_start: NaiveDateTime,
    pub local_end: NaiveDateTime,
}

struct SlotWindow {
    tz: Tz,
    buffer_before: i64,
    buffer_after: i64,
    /// Appointment interval in UTC.
    interval_utc: Interval,
    /// Appointment plus buffers in UTC; this is what must stay clear.
    occupied_utc: Interval,
}

/// Commit a chosen slot as a confirmed booking.
///
/// The availability data the client saw is not trusted: the slot is
/// re-validated against the calendar rules and then re-checked for
/// overlaps inside an immediate transaction, so of two racing commits for
/// the same staff member exactly one wins and the other gets a conflict.
pub fn book(
    conn: &mut Connection,
    req: &BookingRequest,
    now_utc: NaiveDateTime,
) -> Result<BookingOutcome, AppError> {
    // A replayed idempotency key short-circuits everything, including
    // validation: the original booking is the answer.
    if let Some(key) = req.idempotency_key.as_deref() {
        if let Some(existing) = queries::find_booking_by_idempotency_key(conn, key)? {
            tracing::info!(booking_id = %existing.id, "idempotency key replay, returning original booking");
            return outcome_for(conn, existing, &req.workspace_id);
        }
    }

    if !req.customer.has_contact() {
        return Err(AppError::Validation(
            "customer name, email, or phone is required".to_string(),
        ));
    }

    let service = load_active_service(conn, &req.service_id, &req.workspace_id)?;

    let staff_id = match req.staff_id.as_deref() {
        Some(id) => {
            queries::get_staff(conn, id)?
                .ok_or_else(|| AppError::NotFound(format!("staff member {id}")))?;
            ensure_eligible(conn, &service, id)?;
            id.to_string()
        }
        None => pick_least_booked(conn, &service, now_utc)?,
    };

    let window = validate_slot(conn, &service, &staff_id, req.start_time, now_utc)?;

    let now = now_utc;
    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        workspace_id: req.workspace_id.clone(),
        service_id: service.id.clone(),
        staff_id: staff_id.clone(),
        start_time: window.interval_utc.start,
        end_time: window.interval_utc.end,
        customer_name: req.customer.name.clone(),
        customer_email: req.customer.email.clone(),
        customer_phone: req.customer.phone.clone(),
        notes: req.customer.notes.clone(),
        booking_page_id: req.booking_page_id.clone(),
        answers: req.answers.clone(),
        status: BookingStatus::Confirmed,
        idempotency_key: req.idempotency_key.clone(),
        created_at: now,
        updated_at: now,
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Re-check the key inside the transaction in case a concurrent retry
    // with the same key committed between the read above and here.
    if let Some(key) = req.idempotency_key.as_deref() {
        if let Some(existing) = queries::find_booking_by_idempotency_key(&tx, key)? {
            drop(tx);
            return outcome_for(conn, existing, &req.workspace_id);
        }
    }

    check_for_conflicts(&tx, &staff_id, &window, None)?;

    if let Err(e) = queries::insert_booking(&tx, &booking) {
        return Err(map_insert_error(e, &window));
    }
    tx.commit()?;

    // The round-robin rotation advances on committed bookings, not on
    // availability reads: the next turn goes to whoever follows the staff
    // member who just got booked.
    if let Some(calendar_id) = service.calendar_id.as_deref() {
        let eligible =
            queries::eligible_staff_for_service(conn, &service.id, &service.workspace_id)?;
        if let Some(idx) = eligible.iter().position(|s| s.id == staff_id) {
            queries::set_rotation_cursor(conn, calendar_id, (idx + 1) % eligible.len())?;
        }
    }

    tracing::info!(
        booking_id = %booking.id,
        staff_id = %staff_id,
        start = %booking.start_time,
        "booking committed"
    );

    let local_start = utc_to_local(booking.start_time, &window.tz);
    let local_end = utc_to_local(booking.end_time, &window.tz);
    Ok(BookingOutcome {
        booking,
        local_start,
        local_end,
    })
}

/// Cancel a confirmed booking. Cancellation never needs a conflict check;
/// it only frees time.
pub fn cancel(conn: &Connection, id: &str, workspace_id: &str) -> Result<Booking, AppError> {
    let mut booking = queries::get_booking(conn, id)?
        .filter(|b| b.workspace_id == workspace_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::Validation("booking is already cancelled".to_string()));
    }

    queries::update_booking_status(conn, id, &BookingStatus::Cancelled)?;
    booking.status = BookingStatus::Cancelled;

    tracing::info!(booking_id = %id, "booking cancelled");
    Ok(booking)
}

/// Move a confirmed booking to a new start time (and optionally a new
/// staff member), re-running the same atomic overlap check with the
/// booking itself excluded.
pub fn reschedule(
    conn: &mut Connection,
    id: &str,
    workspace_id: &str,
    new_start: NaiveDateTime,
    new_staff_id: Option<&str>,
    now_utc: NaiveDateTime,
) -> Result<BookingOutcome, AppError> {
    let booking = queries::get_booking(conn, id)?
        .filter(|b| b.workspace_id == workspace_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::Validation(
            "cancelled bookings cannot be rescheduled".to_string(),
        ));
    }

    let service = load_active_service(conn, &booking.service_id, workspace_id)?;

    let staff_id = match new_staff_id {
        Some(sid) => {
            queries::get_staff(conn, sid)?
                .ok_or_else(|| AppError::NotFound(format!("staff member {sid}")))?;
            ensure_eligible(conn, &service, sid)?;
            sid.to_string()
        }
        None => booking.staff_id.clone(),
    };

    let window = validate_slot(conn, &service, &staff_id, new_start, now_utc)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    check_for_conflicts(&tx, &staff_id, &window, Some(id))?;
    queries::reschedule_booking(&tx, id, &staff_id, &window.interval_utc)?;
    tx.commit()?;

    let updated = queries::get_booking(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    tracing::info!(booking_id = %id, start = %updated.start_time, "booking rescheduled");

    let local_start = utc_to_local(updated.start_time, &window.tz);
    let local_end = utc_to_local(updated.end_time, &window.tz);
    Ok(BookingOutcome {
        booking: updated,
        local_start,
        local_end,
    })
}

fn load_active_service(
    conn: &Connection,
    service_id: &str,
    workspace_id: &str,
) -> Result<Service, AppError> {
    queries::get_service(conn, service_id, workspace_id)?
        .filter(|s| s.is_active)
        .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))
}

fn ensure_eligible(conn: &Connection, service: &Service, staff_id: &str) -> Result<(), AppError> {
    let eligible = queries::eligible_staff_for_service(conn, &service.id, &service.workspace_id)?;
    if eligible.iter().any(|s| s.id == staff_id) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "staff member {staff_id} cannot perform this service"
        )))
    }
}

fn pick_least_booked(
    conn: &Connection,
    service: &Service,
    now_utc: NaiveDateTime,
) -> Result<String, AppError> {
    let eligible = queries::eligible_staff_for_service(conn, &service.id, &service.workspace_id)?;
    if eligible.is_empty() {
        return Err(AppError::Validation(
            "no available staff for this service".to_string(),
        ));
    }

    let window = Interval::new(now_utc, now_utc + Duration::days(AUTO_PICK_WINDOW_DAYS));
    let counts = queries::booking_counts_between(conn, &service.workspace_id, &window)?;
    let count_for = |id: &str| {
        counts
            .iter()
            .find(|(staff, _)| staff == id)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };

    // eligible is already ordered by id, so ties are deterministic.
    let picked = eligible
        .iter()
        .min_by_key(|s| count_for(&s.id))
        .ok_or_else(|| AppError::Validation("no available staff for this service".to_string()))?;
    Ok(picked.id.clone())
}

/// Re-validate a slot the way the generator would have produced it: on the
/// grid, inside working hours with buffers, and within the notice/advance
/// window. Calendar-agnostic services only supply a duration, so for them
/// this reduces to computing the UTC interval.
fn validate_slot(
    conn: &Connection,
    service: &Service,
    staff_id: &str,
    start_local: NaiveDateTime,
    now_utc: NaiveDateTime,
) -> Result<SlotWindow, AppError> {
    let Some(calendar_id) = service.calendar_id.as_deref() else {
        let start_utc = start_local;
        let interval_utc = Interval::new(
            start_utc,
            start_utc + Duration::minutes(service.duration_minutes),
        );
        return Ok(SlotWindow {
            tz: chrono_tz::UTC,
            buffer_before: 0,
            buffer_after: 0,
            occupied_utc: interval_utc,
            interval_utc,
        });
    };

    let calendar = queries::get_calendar(conn, calendar_id)?
        .ok_or_else(|| AppError::NotFound(format!("calendar {calendar_id}")))?;
    let tz = calendar.tz()?;

    let now_local = utc_to_local(now_utc, &tz);
    let notice_cutoff = now_local + Duration::hours(calendar.min_notice_hours);
    let advance_cutoff = now_local + Duration::days(calendar.max_advance_days);

    if start_local < notice_cutoff {
        return Err(AppError::Validation(format!(
            "start time is inside the minimum notice window of {} hours",
            calendar.min_notice_hours
        )));
    }
    if start_local > advance_cutoff {
        return Err(AppError::Validation(format!(
            "start time is beyond the maximum advance window of {} days",
            calendar.max_advance_days
        )));
    }

    let occupied_minutes = service.duration_minutes
        + calendar.buffer_before_minutes
        + calendar.buffer_after_minutes;
    let occupied_local = Interval::new(
        start_local,
        start_local + Duration::minutes(occupied_minutes),
    );

    let weekday = start_local.date().weekday().num_days_from_sunday() as u8;
    let hours = queries::working_hours_for(conn, staff_id, weekday)?;

    let mut inside_hours = false;
    let mut on_grid = false;
    for block in &hours {
        let Ok(start) = NaiveTime::parse_from_str(&block.start_time, "%H:%M") else {
            continue;
        };
        let Ok(end) = NaiveTime::parse_from_str(&block.end_time, "%H:%M") else {
            continue;
        };
        let window = Interval::new(
            start_local.date().and_time(start),
            start_local.date().and_time(end),
        );
        if window.contains(&occupied_local) {
            inside_hours = true;
            let offset = (start_local - window.start).num_minutes();
            if offset % calendar.slot_interval_minutes == 0 {
                on_grid = true;
                break;
            }
        }
    }

    if !inside_hours {
        return Err(AppError::Validation(
            "start time is outside the staff member's working hours".to_string(),
        ));
    }
    if !on_grid {
        return Err(AppError::Validation(format!(
            "start time is not aligned to the {}-minute slot grid",
            calendar.slot_interval_minutes
        )));
    }

    let start_utc = local_to_utc(start_local, &tz);
    Ok(SlotWindow {
        tz,
        buffer_before: calendar.buffer_before_minutes,
        buffer_after: calendar.buffer_after_minutes,
        interval_utc: Interval::new(
            start_utc,
            start_utc + Duration::minutes(service.duration_minutes),
        ),
        occupied_utc: Interval::new(start_utc, start_utc + Duration::minutes(occupied_minutes)),
    })
}

/// The commit-time overlap check. Runs inside the caller's transaction so
/// concurrent commits for the same staff member serialize on the store.
fn check_for_conflicts(
    conn: &Connection,
    staff_id: &str,
    window: &SlotWindow,
    exclude_id: Option<&str>,
) -> Result<(), AppError> {
    let margin = window.buffer_before + window.buffer_after;
    let probe = window.occupied_utc.expanded(margin, margin);

    let existing = queries::confirmed_bookings_overlapping(conn, staff_id, &probe, exclude_id)?;
    for other in &existing {
        let expanded = other.expanded(window.buffer_before, window.buffer_after);
        if expanded.overlaps(&window.occupied_utc) {
            return Err(conflict_error(other, &window.tz));
        }
    }

    let blocks = queries::busy_blocks_overlapping(conn, staff_id, &probe)?;
    for block in &blocks {
        let expanded = block.expanded(window.buffer_before, window.buffer_after);
        if expanded.overlaps(&window.occupied_utc) {
            return Err(conflict_error(block, &window.tz));
        }
    }

    Ok(())
}

fn conflict_error(taken: &Interval, tz: &Tz) -> AppError {
    AppError::Conflict {
        start: utc_to_local(taken.start, tz)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
        end: utc_to_local(taken.end, tz)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
    }
}

/// The unique index on confirmed (staff_id, start_time) backstops the
/// overlap check; surface its violation as a conflict, not a 500.
fn map_insert_error(e: anyhow::Error, window: &SlotWindow) -> AppError {
    if let Some(rusqlite::Error::SqliteFailure(f, _)) = e.downcast_ref::<rusqlite::Error>() {
        if f.code == rusqlite::ErrorCode::ConstraintViolation {
            return conflict_error(&window.interval_utc, &window.tz);
        }
    }
    AppError::Internal(e)
}

fn outcome_for(
    conn: &Connection,
    booking: Booking,
    workspace_id: &str,
) -> Result<BookingOutcome, AppError> {
    let tz = match queries::get_service(conn, &booking.service_id, workspace_id)?
        .and_then(|s| s.calendar_id)
        .and_then(|cid| queries::get_calendar(conn, &cid).ok().flatten())
    {
        Some(cal) => cal.tz()?,
        None => chrono_tz::UTC,
    };

    let local_start = utc_to_local(booking.start_time, &tz);
    let local_end = utc_to_local(booking.end_time, &tz);
    Ok(BookingOutcome {
        booking,
        local_start,
        local_end,
    })
}
