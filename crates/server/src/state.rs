use std::time::Duration;

use axum::extract::FromRef;
use storage::Db;

use crate::realtime::RoomHub;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub rooms: RoomHub,
    pub admin_token: String,
    /// Upper bound for the count side of a listing.
    pub count_timeout: Duration,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}
