use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token. `GET /posts/{id}` is the one exception that
/// checks a token itself, and only when the key is an author email.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Liveness probe.
        .route("/", get(handlers::health))
        // POST /jwt
        // Exchanges the client's claims (must include `email`) for a one-hour token.
        .route("/jwt", post(handlers::issue_token))
        // --- Posts ---
        // GET /posts?search=...&email=...&sort=asc|desc
        // Title search and author filter, ranked by upvote minus downvote.
        .route(
            "/posts",
            get(handlers::get_posts).post(handlers::create_post),
        )
        // GET/DELETE /posts/{id}
        // GET also accepts an author email in place of the id (token required).
        .route(
            "/posts/{id}",
            get(handlers::get_post).delete(handlers::delete_post),
        )
        // PATCH /posts/upvote/{id}, /posts/downvote/{id}
        // Atomic counter adjustment.
        .route("/posts/upvote/{id}", patch(handlers::upvote_post))
        .route("/posts/downvote/{id}", patch(handlers::downvote_post))
        // GET /all-posts?page=...&size=...
        // Offset pagination in storage order.
        .route("/all-posts", get(handlers::get_all_posts))
        .route("/post-count", get(handlers::post_count))
        // --- Users ---
        // POST /users
        // Sign-in upsert: inserts only if the email is new.
        .route("/users", post(handlers::create_user))
        // --- Forum content ---
        .route("/tags", get(handlers::list_tags))
        .route("/announcements", get(handlers::list_announcements))
        .route("/announcement-count", get(handlers::announcement_count))
        .route(
            "/comments",
            get(handlers::list_comments).post(handlers::create_comment),
        )
        .route("/reports", post(handlers::create_report))
        .route("/reports/{id}", delete(handlers::delete_report))
        // --- Payments & Dashboard ---
        .route(
            "/create-payment-intent",
            post(handlers::create_payment_intent),
        )
        .route("/admin-stats", get(handlers::admin_stats))
}
