use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub is_active: bool,
    pub accepts_bookings: bool,
}

/// One configured working block for a weekday, times as "HH:MM" in the
/// calendar's timezone. Weekday 0 = Sunday, matching strftime('%w').
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub weekday: u8,
    pub start_time: String,
    pub end_time: String,
}
