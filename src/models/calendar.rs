use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Slot grid sizes a calendar may use.
pub const ALLOWED_SLOT_INTERVALS: [i64; 5] = [10, 15, 20, 30, 60];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub timezone: String,
    pub min_notice_hours: i64,
    pub max_advance_days: i64,
    pub slot_interval_minutes: i64,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
    pub is_public: bool,
    pub is_active: bool,
}

impl CalendarConfig {
    pub fn tz(&self) -> Result<Tz, AppError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| AppError::Validation(format!("invalid timezone: {}", self.timezone)))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.tz()?;
        if self.min_notice_hours < 0 {
            return Err(AppError::Validation(
                "min_notice_hours must be >= 0".to_string(),
            ));
        }
        if self.max_advance_days <= 0 {
            return Err(AppError::Validation(
                "max_advance_days must be > 0".to_string(),
            ));
        }
        if !ALLOWED_SLOT_INTERVALS.contains(&self.slot_interval_minutes) {
            return Err(AppError::Validation(format!(
                "slot_interval_minutes must be one of {ALLOWED_SLOT_INTERVALS:?}"
            )));
        }
        if self.buffer_before_minutes < 0 || self.buffer_after_minutes < 0 {
            return Err(AppError::Validation("buffers must be >= 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CalendarConfig {
        CalendarConfig {
            id: "cal-1".to_string(),
            workspace_id: "ws-1".to_string(),
            name: "Main".to_string(),
            timezone: "America/New_York".to_string(),
            min_notice_hours: 1,
            max_advance_days: 60,
            slot_interval_minutes: 30,
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            is_public: true,
            is_active: true,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let mut cal = base();
        cal.timezone = "Mars/Olympus_Mons".to_string();
        assert!(cal.validate().is_err());
    }

    #[test]
    fn test_rejects_off_menu_interval() {
        let mut cal = base();
        cal.slot_interval_minutes = 45;
        assert!(cal.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_notice() {
        let mut cal = base();
        cal.min_notice_hours = -1;
        assert!(cal.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_advance() {
        let mut cal = base();
        cal.max_advance_days = 0;
        assert!(cal.validate().is_err());
    }
}
