use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::staff::WorkingHours;
use crate::models::{Booking, BookingStatus, CalendarConfig, Interval, Service, StaffMember};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FMT).to_string()
}

/// A malformed stored datetime is a corrupt row; surface it instead of
/// inventing an interval.
fn parse_dt(s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DT_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ── Calendars ──

pub fn save_calendar(conn: &Connection, cal: &CalendarConfig) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO calendars (id, workspace_id, name, timezone, min_notice_hours, max_advance_days,
                                slot_interval_minutes, buffer_before_minutes, buffer_after_minutes,
                                is_public, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           timezone = excluded.timezone,
           min_notice_hours = excluded.min_notice_hours,
           max_advance_days = excluded.max_advance_days,
           slot_interval_minutes = excluded.slot_interval_minutes,
           buffer_before_minutes = excluded.buffer_before_minutes,
           buffer_after_minutes = excluded.buffer_after_minutes,
           is_public = excluded.is_public,
           is_active = excluded.is_active,
           updated_at = datetime('now')",
        params![
            cal.id,
            cal.workspace_id,
            cal.name,
            cal.timezone,
            cal.min_notice_hours,
            cal.max_advance_days,
            cal.slot_interval_minutes,
            cal.buffer_before_minutes,
            cal.buffer_after_minutes,
            cal.is_public as i32,
            cal.is_active as i32,
        ],
    )?;
    Ok(())
}

fn calendar_from_row(row: &rusqlite::Row) -> rusqlite::Result<CalendarConfig> {
    Ok(CalendarConfig {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        name: row.get(2)?,
        timezone: row.get(3)?,
        min_notice_hours: row.get(4)?,
        max_advance_days: row.get(5)?,
        slot_interval_minutes: row.get(6)?,
        buffer_before_minutes: row.get(7)?,
        buffer_after_minutes: row.get(8)?,
        is_public: row.get::<_, i32>(9)? != 0,
        is_active: row.get::<_, i32>(10)? != 0,
    })
}

const CALENDAR_COLS: &str = "id, workspace_id, name, timezone, min_notice_hours, max_advance_days, \
     slot_interval_minutes, buffer_before_minutes, buffer_after_minutes, is_public, is_active";

pub fn get_calendar(conn: &Connection, id: &str) -> anyhow::Result<Option<CalendarConfig>> {
    let result = conn.query_row(
        &format!("SELECT {CALENDAR_COLS} FROM calendars WHERE id = ?1"),
        params![id],
        calendar_from_row,
    );

    match result {
        Ok(cal) => Ok(Some(cal)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_calendars(conn: &Connection, workspace_id: &str) -> anyhow::Result<Vec<CalendarConfig>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CALENDAR_COLS} FROM calendars WHERE workspace_id = ?1 ORDER BY name"
    ))?;
    let rows = stmt.query_map(params![workspace_id], calendar_from_row)?;

    let mut calendars = vec![];
    for row in rows {
        calendars.push(row?);
    }
    Ok(calendars)
}

// ── Services ──

pub fn save_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, workspace_id, calendar_id, name, duration_minutes, price, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
           calendar_id = excluded.calendar_id,
           name = excluded.name,
           duration_minutes = excluded.duration_minutes,
           price = excluded.price,
           is_active = excluded.is_active",
        params![
            service.id,
            service.workspace_id,
            service.calendar_id,
            service.name,
            service.duration_minutes,
            service.price,
            service.is_active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_service(
    conn: &Connection,
    id: &str,
    workspace_id: &str,
) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        "SELECT id, workspace_id, calendar_id, name, duration_minutes, price, is_active
         FROM services WHERE id = ?1 AND workspace_id = ?2",
        params![id, workspace_id],
        |row| {
            Ok(Service {
                id: row.get(0)?,
                workspace_id: row.get(1)?,
                calendar_id: row.get(2)?,
                name: row.get(3)?,
                duration_minutes: row.get(4)?,
                price: row.get(5)?,
                is_active: row.get::<_, i32>(6)? != 0,
            })
        },
    );

    match result {
        Ok(service) => Ok(Some(service)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Staff ──

pub fn save_staff(conn: &Connection, staff: &StaffMember) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO staff_members (id, workspace_id, name, is_active, accepts_bookings)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           is_active = excluded.is_active,
           accepts_bookings = excluded.accepts_bookings",
        params![
            staff.id,
            staff.workspace_id,
            staff.name,
            staff.is_active as i32,
            staff.accepts_bookings as i32,
        ],
    )?;
    Ok(())
}

pub fn get_staff(conn: &Connection, id: &str) -> anyhow::Result<Option<StaffMember>> {
    let result = conn.query_row(
        "SELECT id, workspace_id, name, is_active, accepts_bookings FROM staff_members WHERE id = ?1",
        params![id],
        staff_from_row,
    );

    match result {
        Ok(staff) => Ok(Some(staff)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn staff_from_row(row: &rusqlite::Row) -> rusqlite::Result<StaffMember> {
    Ok(StaffMember {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        name: row.get(2)?,
        is_active: row.get::<_, i32>(3)? != 0,
        accepts_bookings: row.get::<_, i32>(4)? != 0,
    })
}

pub fn assign_staff_service(
    conn: &Connection,
    staff_id: &str,
    service_id: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO staff_services (staff_id, service_id) VALUES (?1, ?2)",
        params![staff_id, service_id],
    )?;
    Ok(())
}

/// Active staff who can perform the service and accept bookings, ordered by
/// id so downstream tie-breaks are deterministic.
pub fn eligible_staff_for_service(
    conn: &Connection,
    service_id: &str,
    workspace_id: &str,
) -> anyhow::Result<Vec<StaffMember>> {
    let mut stmt = conn.prepare(
        "SELECT sm.id, sm.workspace_id, sm.name, sm.is_active, sm.accepts_bookings
         FROM staff_members sm
         JOIN staff_services ss ON sm.id = ss.staff_id
         WHERE ss.service_id = ?1 AND sm.workspace_id = ?2
           AND sm.is_active = 1 AND sm.accepts_bookings = 1
         ORDER BY sm.id",
    )?;
    let rows = stmt.query_map(params![service_id, workspace_id], staff_from_row)?;

    let mut staff = vec![];
    for row in rows {
        staff.push(row?);
    }
    Ok(staff)
}

// ── Working hours ──

pub fn add_working_hours(
    conn: &Connection,
    staff_id: &str,
    hours: &WorkingHours,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO staff_working_hours (staff_id, weekday, start_time, end_time)
         VALUES (?1, ?2, ?3, ?4)",
        params![staff_id, hours.weekday, hours.start_time, hours.end_time],
    )?;
    Ok(())
}

pub fn working_hours_for(
    conn: &Connection,
    staff_id: &str,
    weekday: u8,
) -> anyhow::Result<Vec<WorkingHours>> {
    let mut stmt = conn.prepare(
        "SELECT weekday, start_time, end_time FROM staff_working_hours
         WHERE staff_id = ?1 AND weekday = ?2 ORDER BY start_time",
    )?;
    let rows = stmt.query_map(params![staff_id, weekday], |row| {
        Ok(WorkingHours {
            weekday: row.get(0)?,
            start_time: row.get(1)?,
            end_time: row.get(2)?,
        })
    })?;

    let mut hours = vec![];
    for row in rows {
        hours.push(row?);
    }
    Ok(hours)
}

// ── External busy blocks ──

pub fn add_busy_block(
    conn: &Connection,
    staff_id: &str,
    block: &Interval,
    synced_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO external_busy_blocks (staff_id, start_time, end_time, synced_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            staff_id,
            fmt_dt(&block.start),
            fmt_dt(&block.end),
            fmt_dt(synced_at)
        ],
    )?;
    Ok(())
}

pub fn busy_blocks_overlapping(
    conn: &Connection,
    staff_id: &str,
    window: &Interval,
) -> anyhow::Result<Vec<Interval>> {
    let mut stmt = conn.prepare(
        "SELECT start_time, end_time FROM external_busy_blocks
         WHERE staff_id = ?1 AND start_time < ?2 AND end_time > ?3
         ORDER BY start_time",
    )?;
    let rows = stmt.query_map(
        params![staff_id, fmt_dt(&window.end), fmt_dt(&window.start)],
        |row| {
            let start: String = row.get(0)?;
            let end: String = row.get(1)?;
            Ok(Interval::new(parse_dt(&start)?, parse_dt(&end)?))
        },
    )?;

    let mut blocks = vec![];
    for row in rows {
        blocks.push(row?);
    }
    Ok(blocks)
}

/// Most recent sync timestamp for a staff member's external blocks.
/// None means no external calendar is connected.
pub fn latest_sync(conn: &Connection, staff_id: &str) -> anyhow::Result<Option<NaiveDateTime>> {
    let result: Option<String> = conn.query_row(
        "SELECT MAX(synced_at) FROM external_busy_blocks WHERE staff_id = ?1",
        params![staff_id],
        |row| row.get(0),
    )?;
    Ok(result.map(|s| parse_dt(&s)).transpose()?)
}

// ── Bookings ──

const BOOKING_COLS: &str = "id, workspace_id, service_id, staff_id, start_time, end_time, \
     customer_name, customer_email, customer_phone, notes, booking_page_id, answers, \
     status, idempotency_key, created_at, updated_at";

fn booking_from_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let start: String = row.get(4)?;
    let end: String = row.get(5)?;
    let answers: Option<String> = row.get(11)?;
    let status: String = row.get(12)?;
    let created: String = row.get(14)?;
    let updated: String = row.get(15)?;

    Ok(Booking {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        service_id: row.get(2)?,
        staff_id: row.get(3)?,
        start_time: parse_dt(&start)?,
        end_time: parse_dt(&end)?,
        customer_name: row.get(6)?,
        customer_email: row.get(7)?,
        customer_phone: row.get(8)?,
        notes: row.get(9)?,
        booking_page_id: row.get(10)?,
        answers: answers.and_then(|s| serde_json::from_str(&s).ok()),
        status: BookingStatus::parse(&status),
        idempotency_key: row.get(13)?,
        created_at: parse_dt(&created)?,
        updated_at: parse_dt(&updated)?,
    })
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let answers = booking
        .answers
        .as_ref()
        .map(|v| serde_json::to_string(v))
        .transpose()?;

    conn.execute(
        "INSERT INTO bookings (id, workspace_id, service_id, staff_id, start_time, end_time,
                               customer_name, customer_email, customer_phone, notes,
                               booking_page_id, answers, status, idempotency_key, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            booking.id,
            booking.workspace_id,
            booking.service_id,
            booking.staff_id,
            fmt_dt(&booking.start_time),
            fmt_dt(&booking.end_time),
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            booking.notes,
            booking.booking_page_id,
            answers,
            booking.status.as_str(),
            booking.idempotency_key,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLS} FROM bookings WHERE id = ?1"),
        params![id],
        booking_from_row,
    );

    match result {
        Ok(booking) => Ok(Some(booking)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn find_booking_by_idempotency_key(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLS} FROM bookings WHERE idempotency_key = ?1"),
        params![key],
        booking_from_row,
    );

    match result {
        Ok(booking) => Ok(Some(booking)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Confirmed bookings for a staff member whose raw (unbuffered) interval
/// intersects the given UTC window.
pub fn confirmed_bookings_overlapping(
    conn: &Connection,
    staff_id: &str,
    window: &Interval,
    exclude_id: Option<&str>,
) -> anyhow::Result<Vec<Interval>> {
    let mut stmt = conn.prepare(
        "SELECT start_time, end_time FROM bookings
         WHERE staff_id = ?1 AND status = 'confirmed'
           AND start_time < ?2 AND end_time > ?3
           AND id != ?4
         ORDER BY start_time",
    )?;
    let rows = stmt.query_map(
        params![
            staff_id,
            fmt_dt(&window.end),
            fmt_dt(&window.start),
            exclude_id.unwrap_or("")
        ],
        |row| {
            let start: String = row.get(0)?;
            let end: String = row.get(1)?;
            Ok(Interval::new(parse_dt(&start)?, parse_dt(&end)?))
        },
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: &BookingStatus,
) -> anyhow::Result<bool> {
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

pub fn reschedule_booking(
    conn: &Connection,
    id: &str,
    staff_id: &str,
    new_interval: &Interval,
) -> anyhow::Result<bool> {
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE bookings SET staff_id = ?1, start_time = ?2, end_time = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            staff_id,
            fmt_dt(&new_interval.start),
            fmt_dt(&new_interval.end),
            now,
            id
        ],
    )?;
    Ok(count > 0)
}

/// Confirmed-booking counts per staff member in a UTC window, for the
/// least-booked assignment mode.
pub fn booking_counts_between(
    conn: &Connection,
    workspace_id: &str,
    window: &Interval,
) -> anyhow::Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT staff_id, COUNT(*) FROM bookings
         WHERE workspace_id = ?1 AND status = 'confirmed'
           AND start_time >= ?2 AND start_time < ?3
         GROUP BY staff_id",
    )?;
    let rows = stmt.query_map(
        params![workspace_id, fmt_dt(&window.start), fmt_dt(&window.end)],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
    )?;

    let mut counts = vec![];
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}

// ── Rotation cursors ──

pub fn rotation_cursor(conn: &Connection, calendar_id: &str) -> anyhow::Result<usize> {
    let result = conn.query_row(
        "SELECT position FROM rotation_cursors WHERE calendar_id = ?1",
        params![calendar_id],
        |row| row.get::<_, i64>(0),
    );

    match result {
        Ok(position) => Ok(position.max(0) as usize),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

pub fn set_rotation_cursor(
    conn: &Connection,
    calendar_id: &str,
    position: usize,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO rotation_cursors (calendar_id, position) VALUES (?1, ?2)
         ON CONFLICT(calendar_id) DO UPDATE SET position = excluded.position",
        params![calendar_id, position as i64],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_malformed_stored_datetime_is_an_error() {
        let conn = db::init_db(":memory:").unwrap();
        conn.execute(
            "INSERT INTO staff_members (id, workspace_id, name) VALUES ('s1', 'ws-1', 'A')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO external_busy_blocks (staff_id, start_time, end_time, synced_at)
             VALUES ('s1', '2025-06-16 10:00:00', 'not-a-datetime', '2025-06-16 00:00:00')",
            [],
        )
        .unwrap();

        let window = Interval::new(
            NaiveDateTime::parse_from_str("2025-06-01 00:00:00", DT_FMT).unwrap(),
            NaiveDateTime::parse_from_str("2025-07-01 00:00:00", DT_FMT).unwrap(),
        );
        assert!(busy_blocks_overlapping(&conn, "s1", &window).is_err());
    }

    #[test]
    fn test_rotation_cursor_defaults_to_zero() {
        let conn = db::init_db(":memory:").unwrap();
        assert_eq!(rotation_cursor(&conn, "cal-missing").unwrap(), 0);

        conn.execute(
            "INSERT INTO calendars (id, workspace_id, name) VALUES ('cal-1', 'ws-1', 'Main')",
            [],
        )
        .unwrap();
        set_rotation_cursor(&conn, "cal-1", 2).unwrap();
        assert_eq!(rotation_cursor(&conn, "cal-1").unwrap(), 2);

        set_rotation_cursor(&conn, "cal-1", 0).unwrap();
        assert_eq!(rotation_cursor(&conn, "cal-1").unwrap(), 0);
    }
}
