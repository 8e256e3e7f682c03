use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A transient bookable candidate, produced fresh on every availability
/// query and never persisted. Times are in the calendar's timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub staff_id: String,
    pub staff_name: String,
}
