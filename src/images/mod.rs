pub mod handlers;
pub mod intake;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::upload_routes()
}
