use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    /// External busy blocks older than this are still used, but the
    /// availability response is flagged as degraded.
    pub sync_staleness_minutes: i64,
    /// How long a chosen slot stays valid in the public booking flow
    /// before the client is forced to re-fetch availability.
    pub selection_ttl_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "bookable.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            sync_staleness_minutes: env::var("SYNC_STALENESS_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            selection_ttl_secs: env::var("SELECTION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }
}
