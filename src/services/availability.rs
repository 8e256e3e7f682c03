use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{CalendarConfig, Interval, Service, StaffMember};
use crate::services::{local_to_utc, utc_to_local};

/// One staff member's schedule for the target date, read in a single
/// snapshot. All intervals are wall-clock times in the calendar timezone;
/// busy intervals are already expanded by the applicable buffers.
pub struct StaffAvailability {
    pub staff: StaffMember,
    pub working_intervals: Vec<Interval>,
    pub busy_intervals: Vec<Interval>,
}

pub struct AvailabilitySnapshot {
    pub staff: Vec<StaffAvailability>,
    /// True when some staff member's external calendar sync is older than
    /// the staleness threshold. The local data is still returned; the
    /// caller can warn the user.
    pub degraded: bool,
}

/// Load eligible staff with their working and busy intervals for `date`.
///
/// A service with no eligible staff yields an empty snapshot, not an
/// error. The resolver never reaches out to the external sync; it only
/// reads the locally cached busy blocks and judges their freshness.
#[allow(clippy::too_many_arguments)]
pub fn resolve(
    conn: &Connection,
    service: &Service,
    calendar: &CalendarConfig,
    date: NaiveDate,
    buffer_before_minutes: i64,
    buffer_after_minutes: i64,
    staff_filter: Option<&str>,
    now_utc: NaiveDateTime,
    sync_staleness_minutes: i64,
) -> Result<AvailabilitySnapshot, AppError> {
    let tz = calendar.tz()?;
    let weekday = date.weekday().num_days_from_sunday() as u8;

    let eligible = queries::eligible_staff_for_service(conn, &service.id, &service.workspace_id)?;

    // The UTC probe window is padded by a day on each side so buffered busy
    // intervals straddling midnight are never missed.
    let day_start = date.and_time(NaiveTime::MIN);
    let probe = Interval::new(
        local_to_utc(day_start, &tz) - Duration::days(1),
        local_to_utc(day_start + Duration::days(1), &tz) + Duration::days(1),
    );

    let mut degraded = false;
    let mut staff_out = Vec::new();

    for staff in eligible {
        if staff_filter.is_some_and(|id| id != staff.id) {
            continue;
        }

        let working_intervals: Vec<Interval> = queries::working_hours_for(conn, &staff.id, weekday)?
            .iter()
            .filter_map(|hours| {
                let start = NaiveTime::parse_from_str(&hours.start_time, "%H:%M").ok()?;
                let end = NaiveTime::parse_from_str(&hours.end_time, "%H:%M").ok()?;
                (end > start).then(|| Interval::new(date.and_time(start), date.and_time(end)))
            })
            .collect();

        let mut busy_intervals: Vec<Interval> = Vec::new();

        for booked in queries::confirmed_bookings_overlapping(conn, &staff.id, &probe, None)? {
            let local = Interval::new(
                utc_to_local(booked.start, &tz),
                utc_to_local(booked.end, &tz),
            );
            busy_intervals.push(local.expanded(buffer_before_minutes, buffer_after_minutes));
        }

        for block in queries::busy_blocks_overlapping(conn, &staff.id, &probe)? {
            let local = Interval::new(
                utc_to_local(block.start, &tz),
                utc_to_local(block.end, &tz),
            );
            busy_intervals.push(local.expanded(buffer_before_minutes, buffer_after_minutes));
        }

        if let Some(synced_at) = queries::latest_sync(conn, &staff.id)? {
            if now_utc - synced_at > Duration::minutes(sync_staleness_minutes) {
                tracing::warn!(
                    staff_id = %staff.id,
                    "external busy blocks are stale, flagging availability as degraded"
                );
                degraded = true;
            }
        }

        busy_intervals.sort_by_key(|interval| interval.start);

        staff_out.push(StaffAvailability {
            staff,
            working_intervals,
            busy_intervals,
        });
    }

    Ok(AvailabilitySnapshot {
        staff: staff_out,
        degraded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::staff::WorkingHours;
    use crate::models::{Booking, BookingStatus};
    use chrono::Utc;

    fn setup() -> Connection {
        let conn = db::init_db(":memory:").unwrap();

        let cal = test_calendar();
        queries::save_calendar(&conn, &cal).unwrap();

        let service = test_service();
        queries::save_service(&conn, &service).unwrap();

        let staff = StaffMember {
            id: "staff-a".to_string(),
            workspace_id: "ws-1".to_string(),
            name: "Alice".to_string(),
            is_active: true,
            accepts_bookings: true,
        };
        queries::save_staff(&conn, &staff).unwrap();
        queries::assign_staff_service(&conn, "staff-a", "svc-1").unwrap();

        // Monday 09:00-12:00, UTC calendar
        queries::add_working_hours(
            &conn,
            "staff-a",
            &WorkingHours {
                weekday: 1,
                start_time: "09:00".to_string(),
                end_time: "12:00".to_string(),
            },
        )
        .unwrap();

        conn
    }

    fn test_calendar() -> CalendarConfig {
        CalendarConfig {
            id: "cal-1".to_string(),
            workspace_id: "ws-1".to_string(),
            name: "Main".to_string(),
            timezone: "UTC".to_string(),
            min_notice_hours: 1,
            max_advance_days: 7,
            slot_interval_minutes: 30,
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            is_public: true,
            is_active: true,
        }
    }

    fn test_service() -> Service {
        Service {
            id: "svc-1".to_string(),
            workspace_id: "ws-1".to_string(),
            calendar_id: Some("cal-1".to_string()),
            name: "Consultation".to_string(),
            duration_minutes: 30,
            price: 50.0,
            is_active: true,
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    // 2025-06-16 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    #[test]
    fn test_working_hours_become_intervals() {
        let conn = setup();
        let snapshot = resolve(
            &conn,
            &test_service(),
            &test_calendar(),
            monday(),
            0,
            0,
            None,
            dt("2025-06-15 12:00"),
            15,
        )
        .unwrap();

        assert!(!snapshot.degraded);
        assert_eq!(snapshot.staff.len(), 1);
        let staff = &snapshot.staff[0];
        assert_eq!(staff.working_intervals.len(), 1);
        assert_eq!(staff.working_intervals[0].start, dt("2025-06-16 09:00"));
        assert_eq!(staff.working_intervals[0].end, dt("2025-06-16 12:00"));
        assert!(staff.busy_intervals.is_empty());
    }

    #[test]
    fn test_no_eligible_staff_is_empty_not_error() {
        let conn = db::init_db(":memory:").unwrap();
        queries::save_calendar(&conn, &test_calendar()).unwrap();
        queries::save_service(&conn, &test_service()).unwrap();
        let snapshot = resolve(
            &conn,
            &test_service(),
            &test_calendar(),
            monday(),
            0,
            0,
            None,
            dt("2025-06-15 12:00"),
            15,
        )
        .unwrap();
        assert!(snapshot.staff.is_empty());
    }

    #[test]
    fn test_bookings_and_blocks_become_buffered_busy_intervals() {
        let conn = setup();
        let now = Utc::now().naive_utc();

        let booking = Booking {
            id: "b-1".to_string(),
            workspace_id: "ws-1".to_string(),
            service_id: "svc-1".to_string(),
            staff_id: "staff-a".to_string(),
            start_time: dt("2025-06-16 10:00"),
            end_time: dt("2025-06-16 10:30"),
            customer_name: Some("Bob".to_string()),
            customer_email: None,
            customer_phone: None,
            notes: None,
            booking_page_id: None,
            answers: None,
            status: BookingStatus::Confirmed,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_booking(&conn, &booking).unwrap();

        queries::add_busy_block(
            &conn,
            "staff-a",
            &Interval::new(dt("2025-06-16 11:00"), dt("2025-06-16 11:30")),
            &now,
        )
        .unwrap();

        let snapshot = resolve(
            &conn,
            &test_service(),
            &test_calendar(),
            monday(),
            10,
            10,
            None,
            now,
            15,
        )
        .unwrap();

        let busy = &snapshot.staff[0].busy_intervals;
        assert_eq!(busy.len(), 2);
        assert_eq!(busy[0].start, dt("2025-06-16 09:50"));
        assert_eq!(busy[0].end, dt("2025-06-16 10:40"));
        assert_eq!(busy[1].start, dt("2025-06-16 10:50"));
        assert_eq!(busy[1].end, dt("2025-06-16 11:40"));
    }

    #[test]
    fn test_cancelled_bookings_are_not_busy() {
        let conn = setup();
        let now = Utc::now().naive_utc();
        let booking = Booking {
            id: "b-2".to_string(),
            workspace_id: "ws-1".to_string(),
            service_id: "svc-1".to_string(),
            staff_id: "staff-a".to_string(),
            start_time: dt("2025-06-16 10:00"),
            end_time: dt("2025-06-16 10:30"),
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            notes: None,
            booking_page_id: None,
            answers: None,
            status: BookingStatus::Cancelled,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_booking(&conn, &booking).unwrap();

        let snapshot = resolve(
            &conn,
            &test_service(),
            &test_calendar(),
            monday(),
            0,
            0,
            None,
            now,
            15,
        )
        .unwrap();
        assert!(snapshot.staff[0].busy_intervals.is_empty());
    }

    #[test]
    fn test_stale_sync_flags_degraded() {
        let conn = setup();
        let now = dt("2025-06-15 12:00");
        let stale = now - Duration::minutes(60);

        queries::add_busy_block(
            &conn,
            "staff-a",
            &Interval::new(dt("2025-06-16 11:00"), dt("2025-06-16 11:30")),
            &stale,
        )
        .unwrap();

        let snapshot = resolve(
            &conn,
            &test_service(),
            &test_calendar(),
            monday(),
            0,
            0,
            None,
            now,
            15,
        )
        .unwrap();

        // Stale data is flagged but still present.
        assert!(snapshot.degraded);
        assert_eq!(snapshot.staff[0].busy_intervals.len(), 1);
    }

    #[test]
    fn test_timezone_shifts_stored_utc_bookings() {
        let conn = setup();
        let mut cal = test_calendar();
        cal.timezone = "America/New_York".to_string();

        let now = Utc::now().naive_utc();
        // 14:00 UTC is 10:00 in New York in June (UTC-4).
        let booking = Booking {
            id: "b-3".to_string(),
            workspace_id: "ws-1".to_string(),
            service_id: "svc-1".to_string(),
            staff_id: "staff-a".to_string(),
            start_time: dt("2025-06-16 14:00"),
            end_time: dt("2025-06-16 14:30"),
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            notes: None,
            booking_page_id: None,
            answers: None,
            status: BookingStatus::Confirmed,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_booking(&conn, &booking).unwrap();

        let snapshot =
            resolve(&conn, &test_service(), &cal, monday(), 0, 0, None, now, 15).unwrap();
        let busy = &snapshot.staff[0].busy_intervals;
        assert_eq!(busy[0].start, dt("2025-06-16 10:00"));
        assert_eq!(busy[0].end, dt("2025-06-16 10:30"));
    }

    #[test]
    fn test_staff_filter_narrows_result() {
        let conn = setup();
        let snapshot = resolve(
            &conn,
            &test_service(),
            &test_calendar(),
            monday(),
            0,
            0,
            Some("staff-zzz"),
            dt("2025-06-15 12:00"),
            15,
        )
        .unwrap();
        assert!(snapshot.staff.is_empty());
    }
}
