use async_trait::async_trait;

use crate::models::Booking;

/// Downstream notification collaborator. Called only after a successful
/// commit; delivery itself (email/SMS) lives outside this crate.
#[async_trait]
pub trait BookingNotifier: Send + Sync {
    async fn booking_confirmed(&self, booking: &Booking) -> anyhow::Result<()>;
    async fn booking_cancelled(&self, booking: &Booking) -> anyhow::Result<()>;
    async fn booking_rescheduled(&self, booking: &Booking) -> anyhow::Result<()>;
}

pub struct LogNotifier;

#[async_trait]
impl BookingNotifier for LogNotifier {
    async fn booking_confirmed(&self, booking: &Booking) -> anyhow::Result<()> {
        tracing::info!(
            booking_id = %booking.id,
            staff_id = %booking.staff_id,
            start = %booking.start_time,
            "booking confirmed"
        );
        Ok(())
    }

    async fn booking_cancelled(&self, booking: &Booking) -> anyhow::Result<()> {
        tracing::info!(booking_id = %booking.id, "booking cancelled");
        Ok(())
    }

    async fn booking_rescheduled(&self, booking: &Booking) -> anyhow::Result<()> {
        tracing::info!(
            booking_id = %booking.id,
            start = %booking.start_time,
            "booking rescheduled"
        );
        Ok(())
    }
}
