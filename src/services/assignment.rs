use std::collections::{BTreeMap, HashMap};

use crate::errors::AppError;
use crate::models::Slot;

/// How the `mode` query parameter maps onto slot post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentMode {
    /// "Choose your staff": keep every (start, staff) candidate.
    PerStaff,
    RoundRobin,
    LeastBooked,
    FixedStaff,
}

impl AssignmentMode {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "per_staff" => Ok(AssignmentMode::PerStaff),
            "round_robin" => Ok(AssignmentMode::RoundRobin),
            "least_booked" => Ok(AssignmentMode::LeastBooked),
            "fixed_staff" => Ok(AssignmentMode::FixedStaff),
            _ => Err(AppError::Validation(format!("unknown assignment mode: {s}"))),
        }
    }
}

/// Picks which staff member serves a start time when several are eligible.
/// Kept as a tagged enum so new modes never touch the slot math.
pub enum AssignmentStrategy {
    RoundRobin {
        /// Eligible staff ids in rotation order (sorted for determinism).
        order: Vec<String>,
        /// Index of the staff member whose turn is next. Persisted per
        /// calendar between requests.
        cursor: usize,
    },
    LeastBooked {
        /// Confirmed-booking counts for the current window.
        counts: HashMap<String, i64>,
    },
    FixedStaff {
        staff_id: String,
    },
}

impl AssignmentStrategy {
    /// Pick one slot from the candidates sharing a single start time.
    /// `None` means nobody is free then; that is an expected outcome,
    /// never an error.
    pub fn assign(&mut self, candidates: &[Slot]) -> Option<Slot> {
        match self {
            AssignmentStrategy::RoundRobin { order, cursor } => {
                if order.is_empty() {
                    return None;
                }
                for i in 0..order.len() {
                    let idx = (*cursor + i) % order.len();
                    if let Some(slot) = candidates.iter().find(|c| c.staff_id == order[idx]) {
                        // The cursor moves only when a slot is actually
                        // assigned; a staff member who was merely a
                        // candidate keeps their place in the rotation.
                        *cursor = (idx + 1) % order.len();
                        return Some(slot.clone());
                    }
                }
                None
            }
            AssignmentStrategy::LeastBooked { counts } => candidates
                .iter()
                .min_by_key(|c| {
                    (
                        counts.get(&c.staff_id).copied().unwrap_or(0),
                        c.staff_id.clone(),
                    )
                })
                .cloned(),
            AssignmentStrategy::FixedStaff { staff_id } => candidates
                .iter()
                .find(|c| c.staff_id == *staff_id)
                .cloned(),
        }
    }

    /// Collapse per-staff candidates to at most one slot per start time,
    /// preserving chronological order.
    pub fn collapse(&mut self, candidates: Vec<Slot>) -> Vec<Slot> {
        let mut by_start: BTreeMap<chrono::NaiveDateTime, Vec<Slot>> = BTreeMap::new();
        for slot in candidates {
            by_start.entry(slot.start_time).or_default().push(slot);
        }

        by_start
            .into_values()
            .filter_map(|group| self.assign(&group))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn slot(start: &str, staff: &str) -> Slot {
        let start_time =
            NaiveDateTime::parse_from_str(&format!("2025-06-16 {start}"), "%Y-%m-%d %H:%M").unwrap();
        Slot {
            start_time,
            end_time: start_time + chrono::Duration::minutes(30),
            staff_id: staff.to_string(),
            staff_name: staff.to_uppercase(),
        }
    }

    fn order(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(
            AssignmentMode::parse("round_robin").unwrap(),
            AssignmentMode::RoundRobin
        );
        assert!(AssignmentMode::parse("russian_roulette").is_err());
    }

    #[test]
    fn test_round_robin_rotates() {
        let mut strategy = AssignmentStrategy::RoundRobin {
            order: order(&["a", "b", "c"]),
            cursor: 0,
        };

        let first = strategy
            .assign(&[slot("09:00", "a"), slot("09:00", "b"), slot("09:00", "c")])
            .unwrap();
        assert_eq!(first.staff_id, "a");

        let second = strategy
            .assign(&[slot("09:30", "a"), slot("09:30", "b"), slot("09:30", "c")])
            .unwrap();
        assert_eq!(second.staff_id, "b");

        let third = strategy
            .assign(&[slot("10:00", "a"), slot("10:00", "b"), slot("10:00", "c")])
            .unwrap();
        assert_eq!(third.staff_id, "c");
    }

    #[test]
    fn test_round_robin_skips_busy_staff() {
        let mut strategy = AssignmentStrategy::RoundRobin {
            order: order(&["a", "b", "c"]),
            cursor: 0,
        };

        // "a" is not free at 09:00: "b" serves, cursor lands after "b".
        let first = strategy.assign(&[slot("09:00", "b"), slot("09:00", "c")]).unwrap();
        assert_eq!(first.staff_id, "b");

        let second = strategy
            .assign(&[slot("09:30", "a"), slot("09:30", "b"), slot("09:30", "c")])
            .unwrap();
        assert_eq!(second.staff_id, "c");

        // The wrap brings "a" back before anyone repeats.
        let third = strategy
            .assign(&[slot("10:00", "a"), slot("10:00", "b"), slot("10:00", "c")])
            .unwrap();
        assert_eq!(third.staff_id, "a");
    }

    #[test]
    fn test_round_robin_cursor_stays_on_failed_assignment() {
        let mut strategy = AssignmentStrategy::RoundRobin {
            order: order(&["a", "b"]),
            cursor: 0,
        };

        assert!(strategy.assign(&[]).is_none());

        let next = strategy.assign(&[slot("09:00", "a"), slot("09:00", "b")]).unwrap();
        assert_eq!(next.staff_id, "a");
    }

    #[test]
    fn test_least_booked_prefers_smallest_count() {
        let mut counts = HashMap::new();
        counts.insert("a".to_string(), 5);
        counts.insert("b".to_string(), 2);
        let mut strategy = AssignmentStrategy::LeastBooked { counts };

        let picked = strategy.assign(&[slot("09:00", "a"), slot("09:00", "b")]).unwrap();
        assert_eq!(picked.staff_id, "b");
    }

    #[test]
    fn test_least_booked_ties_break_by_staff_id() {
        let mut strategy = AssignmentStrategy::LeastBooked {
            counts: HashMap::new(),
        };
        let picked = strategy.assign(&[slot("09:00", "b"), slot("09:00", "a")]).unwrap();
        assert_eq!(picked.staff_id, "a");
    }

    #[test]
    fn test_fixed_staff_validates_candidacy() {
        let mut strategy = AssignmentStrategy::FixedStaff {
            staff_id: "b".to_string(),
        };
        assert!(strategy.assign(&[slot("09:00", "a")]).is_none());
        let picked = strategy.assign(&[slot("09:30", "a"), slot("09:30", "b")]).unwrap();
        assert_eq!(picked.staff_id, "b");
    }

    #[test]
    fn test_collapse_one_slot_per_start_time_in_order() {
        let mut strategy = AssignmentStrategy::LeastBooked {
            counts: HashMap::new(),
        };
        let collapsed = strategy.collapse(vec![
            slot("09:30", "b"),
            slot("09:00", "a"),
            slot("09:00", "b"),
            slot("09:30", "a"),
        ]);

        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].start_time, slot("09:00", "a").start_time);
        assert_eq!(collapsed[0].staff_id, "a");
        assert_eq!(collapsed[1].start_time, slot("09:30", "a").start_time);
    }
}
