use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Admin Router Module
///
/// Moderation endpoints. The whole router is wrapped by `admin_middleware`: no token
/// yields 401, a token whose stored user is not an admin yields 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /users
        .route("/users", get(handlers::list_users))
        // PATCH /users/admin/{id}
        // Grants the admin role.
        .route("/users/admin/{id}", patch(handlers::make_admin))
        .route("/tags", post(handlers::create_tag))
        .route("/announcements", post(handlers::create_announcement))
        // GET /reports
        // Review queue for reported comments.
        .route("/reports", get(handlers::list_reports))
}
