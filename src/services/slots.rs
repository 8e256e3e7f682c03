use chrono::{Duration, NaiveDateTime};

use crate::models::Interval;

/// Inputs for one staff member's slot walk. All datetimes are wall-clock
/// times in the calendar's timezone; `now` is never read here, the caller
/// injects both cutoffs so the function stays deterministic.
pub struct GenerateParams<'a> {
    pub working_intervals: &'a [Interval],
    /// Already expanded by the applicable buffers.
    pub busy_intervals: &'a [Interval],
    pub duration_minutes: i64,
    pub slot_interval_minutes: i64,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
    pub notice_cutoff: NaiveDateTime,
    pub advance_cutoff: NaiveDateTime,
}

/// Walk each working interval in `slot_interval_minutes` steps from the
/// interval start and emit every start time whose occupied window
/// (duration plus both buffers) fits inside the working interval, avoids
/// every busy interval, and falls within the notice/advance cutoffs.
///
/// Returned intervals cover the appointment itself (start..start+duration);
/// buffers only influence eligibility.
pub fn generate(params: &GenerateParams) -> Vec<Interval> {
    let duration = Duration::minutes(params.duration_minutes);
    let step = Duration::minutes(params.slot_interval_minutes);
    let occupied = Duration::minutes(
        params.duration_minutes + params.buffer_before_minutes + params.buffer_after_minutes,
    );

    let mut slots = Vec::new();

    for window in params.working_intervals {
        let mut start = window.start;
        while start < window.end {
            let block = Interval::new(start, start + occupied);

            // A window shorter than the occupied block yields nothing more.
            if block.end > window.end {
                break;
            }

            let bookable = start >= params.notice_cutoff
                && start <= params.advance_cutoff
                && !params.busy_intervals.iter().any(|busy| block.overlaps(busy));

            if bookable {
                slots.push(Interval::new(start, start + duration));
            }

            start += step;
        }
    }

    slots.sort_by_key(|slot| slot.start);
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn iv(start: &str, end: &str) -> Interval {
        Interval::new(dt(start), dt(end))
    }

    fn params<'a>(
        working: &'a [Interval],
        busy: &'a [Interval],
        duration: i64,
        interval: i64,
    ) -> GenerateParams<'a> {
        GenerateParams {
            working_intervals: working,
            busy_intervals: busy,
            duration_minutes: duration,
            slot_interval_minutes: interval,
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            notice_cutoff: dt("2025-06-16 00:00"),
            advance_cutoff: dt("2025-06-23 00:00"),
        }
    }

    #[test]
    fn test_basic_walk() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 12:00")];
        let slots = generate(&params(&working, &[], 30, 30));
        let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();
        assert_eq!(starts, ["09:00", "09:30", "10:00", "10:30", "11:00", "11:30"]);
    }

    // Worked example: 09:00-12:00 shift, 30-minute grid, existing booking
    // 10:00-10:30 blocks exactly one slot.
    #[test]
    fn test_existing_booking_excludes_slot() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 12:00")];
        let busy = [iv("2025-06-16 10:00", "2025-06-16 10:30")];
        let slots = generate(&params(&working, &busy, 30, 30));
        let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();
        assert_eq!(starts, ["09:00", "09:30", "10:30", "11:00", "11:30"]);
    }

    #[test]
    fn test_notice_cutoff_trims_leading_slots() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 12:00")];
        let mut p = params(&working, &[], 30, 30);
        p.notice_cutoff = dt("2025-06-16 10:15");
        let slots = generate(&p);
        let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();
        assert_eq!(starts, ["10:30", "11:00", "11:30"]);
    }

    #[test]
    fn test_advance_cutoff_trims_trailing_slots() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 12:00")];
        let mut p = params(&working, &[], 30, 30);
        p.advance_cutoff = dt("2025-06-16 10:00");
        let slots = generate(&p);
        let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();
        assert_eq!(starts, ["09:00", "09:30", "10:00"]);
    }

    #[test]
    fn test_date_entirely_before_notice_cutoff() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 12:00")];
        let mut p = params(&working, &[], 30, 30);
        p.notice_cutoff = dt("2025-06-17 00:00");
        assert!(generate(&p).is_empty());
    }

    #[test]
    fn test_window_shorter_than_duration() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 09:20")];
        assert!(generate(&params(&working, &[], 30, 30)).is_empty());
    }

    #[test]
    fn test_busy_interval_covering_whole_window() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 12:00")];
        let busy = [iv("2025-06-16 08:00", "2025-06-16 13:00")];
        assert!(generate(&params(&working, &busy, 30, 30)).is_empty());
    }

    #[test]
    fn test_buffers_shrink_the_tail() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 11:00")];
        let mut p = params(&working, &[], 30, 30);
        p.buffer_after_minutes = 15;
        let slots = generate(&p);
        let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();
        // 10:30 would occupy until 11:15, past the end of the shift.
        assert_eq!(starts, ["09:00", "09:30", "10:00"]);
        // The emitted interval still covers only the appointment.
        assert_eq!(slots[0].end, dt("2025-06-16 09:30"));
    }

    #[test]
    fn test_buffered_block_collides_with_busy_neighbor() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 12:00")];
        let busy = [iv("2025-06-16 10:00", "2025-06-16 10:30")];
        let mut p = params(&working, &busy, 30, 30);
        p.buffer_after_minutes = 15;
        let slots = generate(&p);
        let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();
        // 09:30 occupies until 10:15 and now touches the 10:00 booking.
        assert_eq!(starts, ["09:00", "10:30", "11:00"]);
    }

    #[test]
    fn test_grid_aligns_to_window_start_not_midnight() {
        let working = [iv("2025-06-16 09:10", "2025-06-16 10:40")];
        let slots = generate(&params(&working, &[], 30, 30));
        let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();
        assert_eq!(starts, ["09:10", "09:40", "10:10"]);
    }

    #[test]
    fn test_multiple_windows_emit_in_order() {
        let working = [
            iv("2025-06-16 14:00", "2025-06-16 15:00"),
            iv("2025-06-16 09:00", "2025-06-16 10:00"),
        ];
        let slots = generate(&params(&working, &[], 60, 60));
        let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();
        assert_eq!(starts, ["09:00", "14:00"]);
    }

    #[test]
    fn test_deterministic_for_fixed_input() {
        let working = [iv("2025-06-16 09:00", "2025-06-16 12:00")];
        let busy = [iv("2025-06-16 10:00", "2025-06-16 11:00")];
        let a = generate(&params(&working, &busy, 30, 15));
        let b = generate(&params(&working, &busy, 30, 15));
        assert_eq!(a, b);
    }
}
