use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Half-open time span `[start, end)` in a single timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains(&self, other: &Interval) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Widen by the given buffers, in minutes.
    pub fn expanded(&self, before_minutes: i64, after_minutes: i64) -> Interval {
        Interval {
            start: self.start - Duration::minutes(before_minutes),
            end: self.end + Duration::minutes(after_minutes),
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn iv(start: &str, end: &str) -> Interval {
        Interval::new(dt(start), dt(end))
    }

    #[test]
    fn test_overlap_detection() {
        let a = iv("2025-06-16 10:00", "2025-06-16 11:00");
        assert!(a.overlaps(&iv("2025-06-16 10:30", "2025-06-16 11:30")));
        assert!(a.overlaps(&iv("2025-06-16 09:00", "2025-06-16 12:00")));
        // Adjacent intervals do not overlap
        assert!(!a.overlaps(&iv("2025-06-16 11:00", "2025-06-16 12:00")));
        assert!(!a.overlaps(&iv("2025-06-16 09:00", "2025-06-16 10:00")));
    }

    #[test]
    fn test_containment() {
        let window = iv("2025-06-16 09:00", "2025-06-16 17:00");
        assert!(window.contains(&iv("2025-06-16 09:00", "2025-06-16 10:00")));
        assert!(!window.contains(&iv("2025-06-16 16:30", "2025-06-16 17:30")));
    }

    #[test]
    fn test_expanded_by_buffers() {
        let a = iv("2025-06-16 10:00", "2025-06-16 11:00");
        let e = a.expanded(15, 30);
        assert_eq!(e.start, dt("2025-06-16 09:45"));
        assert_eq!(e.end, dt("2025-06-16 11:30"));
    }
}
