pub mod booking;
pub mod calendar;
pub mod interval;
pub mod service;
pub mod slot;
pub mod staff;

pub use booking::{Booking, BookingStatus, CustomerInfo};
pub use calendar::CalendarConfig;
pub use interval::Interval;
pub use service::Service;
pub use slot::Slot;
pub use staff::StaffMember;
