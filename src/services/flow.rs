use chrono::NaiveDateTime;

use crate::errors::AppError;
use crate::models::{CustomerInfo, Service};

/// Where the visitor currently is in the public booking page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    SelectingService,
    SelectingTime,
    EnteringDetails,
    Confirmed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("this step is not available right now")]
    WrongState,
    #[error("unknown service")]
    UnknownService,
    #[error("the selected time was held too long, please pick again")]
    StaleSelection,
    #[error("missing required field: {0}")]
    MissingField(String),
}

impl From<FlowError> for AppError {
    fn from(e: FlowError) -> Self {
        match e {
            FlowError::UnknownService => AppError::NotFound("service".to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// A tentative slot choice. Holding a selection reserves nothing; the
/// commit decides who actually gets the time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSelection {
    pub start_time: NaiveDateTime,
    pub staff_id: String,
    pub selected_at: NaiveDateTime,
}

/// Drives one visitor's pass through the booking page: pick a service,
/// pick a time, enter details, confirm. Holds no database handles; the
/// caller maps its output onto the transaction manager.
pub struct BookingFlow {
    state: FlowState,
    services: Vec<Service>,
    selected_service: Option<String>,
    selection: Option<SlotSelection>,
    selection_ttl_secs: i64,
}

impl BookingFlow {
    /// A single-service page skips service selection entirely.
    pub fn new(services: Vec<Service>, selection_ttl_secs: i64) -> Self {
        let (state, selected_service) = match services.as_slice() {
            [only] => (FlowState::SelectingTime, Some(only.id.clone())),
            _ => (FlowState::SelectingService, None),
        };
        BookingFlow {
            state,
            services,
            selected_service,
            selection: None,
            selection_ttl_secs,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn selected_service(&self) -> Option<&Service> {
        let id = self.selected_service.as_deref()?;
        self.services.iter().find(|s| s.id == id)
    }

    pub fn selection(&self) -> Option<&SlotSelection> {
        self.selection.as_ref()
    }

    pub fn select_service(&mut self, service_id: &str) -> Result<(), FlowError> {
        if self.state != FlowState::SelectingService {
            return Err(FlowError::WrongState);
        }
        if !self.services.iter().any(|s| s.id == service_id) {
            return Err(FlowError::UnknownService);
        }
        self.selected_service = Some(service_id.to_string());
        self.state = FlowState::SelectingTime;
        Ok(())
    }

    pub fn select_slot(
        &mut self,
        start_time: NaiveDateTime,
        staff_id: &str,
        now: NaiveDateTime,
    ) -> Result<(), FlowError> {
        if self.state != FlowState::SelectingTime {
            return Err(FlowError::WrongState);
        }
        self.selection = Some(SlotSelection {
            start_time,
            staff_id: staff_id.to_string(),
            selected_at: now,
        });
        self.state = FlowState::EnteringDetails;
        Ok(())
    }

    /// Validate the visitor's details against the page's required custom
    /// questions and hand back the selection to commit. The selection
    /// expires after the hold TTL so nobody submits against availability
    /// they saw long ago.
    pub fn submit_details(
        &mut self,
        customer: &CustomerInfo,
        required_answers: &[String],
        answers: Option<&serde_json::Value>,
        now: NaiveDateTime,
    ) -> Result<SlotSelection, FlowError> {
        if self.state != FlowState::EnteringDetails {
            return Err(FlowError::WrongState);
        }
        let selection = self.selection.clone().ok_or(FlowError::WrongState)?;

        if (now - selection.selected_at).num_seconds() > self.selection_ttl_secs {
            self.selection = None;
            self.state = FlowState::SelectingTime;
            return Err(FlowError::StaleSelection);
        }

        if !customer.has_contact() {
            return Err(FlowError::MissingField("contact".to_string()));
        }

        for field in required_answers {
            let answered = answers
                .and_then(|a| a.get(field))
                .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
            if !answered {
                return Err(FlowError::MissingField(field.clone()));
            }
        }

        Ok(selection)
    }

    /// Mark the flow done after the transaction manager committed.
    pub fn confirm(&mut self) -> Result<(), FlowError> {
        if self.state != FlowState::EnteringDetails {
            return Err(FlowError::WrongState);
        }
        self.state = FlowState::Confirmed;
        Ok(())
    }

    /// The commit lost a race: drop the stale selection and send the
    /// visitor back to the time picker for a fresh look.
    pub fn on_conflict(&mut self) {
        self.selection = None;
        if self.state != FlowState::Confirmed {
            self.state = FlowState::SelectingTime;
        }
    }

    /// Step one screen back. Never discards the service list and never
    /// errors; backing out of the first screen is a no-op.
    pub fn back(&mut self) {
        self.state = match self.state {
            FlowState::SelectingService | FlowState::Confirmed => self.state,
            FlowState::SelectingTime => {
                if self.services.len() == 1 {
                    FlowState::SelectingTime
                } else {
                    self.selected_service = None;
                    FlowState::SelectingService
                }
            }
            FlowState::EnteringDetails => {
                self.selection = None;
                FlowState::SelectingTime
            }
        };
    }
}
