pub mod bookings;
pub mod calendars;
pub mod health;
pub mod slots;
