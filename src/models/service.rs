use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub workspace_id: String,
    /// None means calendar-agnostic: the service supplies its own duration
    /// but cannot be offered through a calendar's slot query.
    pub calendar_id: Option<String>,
    pub name: String,
    pub duration_minutes: i64,
    pub price: f64,
    pub is_active: bool,
}
