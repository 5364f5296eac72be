use chrono::Utc;

use crate::domain::models::OpportunityStatus;

mod opportunity_repository;
mod role_repository;
mod session_repository;
mod watchlist_repository;

pub use opportunity_repository::{OpportunityRepository, UpsertOutcome};
pub use role_repository::RoleRepository;
pub use session_repository::SessionRepository;
pub use watchlist_repository::WatchlistRepository;

pub fn map_opportunity_status(s: &str) -> OpportunityStatus {
    match s {
        "Ignore" => OpportunityStatus::Ignore,
        _ => OpportunityStatus::New,
    }
}

pub(crate) fn parse_datetime(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
