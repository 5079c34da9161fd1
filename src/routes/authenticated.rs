use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every route here sits behind `auth_middleware`, which rejects requests without a
/// valid bearer token (401) and attaches the decoded claims to the request.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /users/admin/{email}
        // Self-only admin flag check. The segment is named `id` because the admin
        // router registers PATCH on the same path shape.
        .route("/users/admin/{id}", get(handlers::check_admin))
        // GET /payments/{email}
        // The caller's own payment history.
        .route("/payments/{email}", get(handlers::list_payments))
        // POST /payments
        // Records a payment for the caller.
        .route("/payments", post(handlers::record_payment))
}
