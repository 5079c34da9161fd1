use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod query;
pub mod repository;

// Routers segregated by access level (Public, Authenticated, Admin).
pub mod routes;
use auth::{AdminUser, AuthUser};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use payments::{MockPaymentService, PaymentState, StripeClient};
pub use repository::{MemoryRepository, MongoRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers and
/// `ToSchema` models, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::issue_token,
        handlers::get_posts, handlers::get_post, handlers::create_post, handlers::delete_post,
        handlers::upvote_post, handlers::downvote_post, handlers::get_all_posts,
        handlers::post_count,
        handlers::list_users, handlers::create_user, handlers::check_admin, handlers::make_admin,
        handlers::list_tags, handlers::create_tag,
        handlers::list_announcements, handlers::announcement_count, handlers::create_announcement,
        handlers::list_comments, handlers::create_comment,
        handlers::list_reports, handlers::create_report, handlers::delete_report,
        handlers::list_payments, handlers::record_payment, handlers::create_payment_intent,
        handlers::admin_stats
    ),
    components(
        schemas(
            models::User, models::Author, models::Post, models::Comment, models::Tag,
            models::Announcement, models::Report, models::Payment,
            models::PaymentIntentRequest, models::PaymentIntentResponse,
            models::InsertResult, models::UpdateResult, models::DeleteResult,
            models::TokenResponse, models::AdminStatus, models::CountResponse,
            models::AdminStats,
        )
    ),
    tags(
        (name = "forum", description = "Discussion forum API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a handler can reach: the storage client, the payment processor, and
/// the immutable configuration. Built once in `main` and cloned per request (each
/// field is an `Arc` or cheap to clone).
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub payments: PaymentState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors such as `AuthUser` and `AdminUser` pull only what they need.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for PaymentState {
    fn from_ref(app_state: &AppState) -> PaymentState {
        app_state.payments.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Gate for `authenticated_routes`. Extracting `AuthUser` rejects the request with 401
/// when the bearer token is missing or invalid; on success the decoded claims are
/// attached to the request for the handler.
async fn auth_middleware(AuthUser { claims }: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(claims);
    next.run(request).await
}

/// admin_middleware
///
/// Gate for `admin_routes`: 401 without a valid token, 403 unless the stored user
/// behind the token is an admin.
async fn admin_middleware(admin: AdminUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(admin.claims.clone());
    request.extensions_mut().insert(admin);
    next.run(request).await
}

/// create_router
///
/// Assembles the routers, applies the access gates and the observability layers,
/// and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Unique id per request, used to correlate log lines.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span with method, uri and the `x-request-id` set by
/// `SetRequestIdLayer`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
