use crate::{
    AppState,
    auth::{self, AdminUser, AuthUser},
    error::{ApiError, ApiResult},
    models::{
        AdminStats, AdminStatus, Announcement, Comment, CountResponse, DeleteResult,
        InsertResult, Payment, PaymentIntentRequest, PaymentIntentResponse, Post, Report, Tag,
        TokenResponse, UpdateResult, User, Validate,
    },
    query::{Page, PageParams, PostFilter, PostQuery, VoteKind},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Currency used for every payment intent.
const CURRENCY: &str = "usd";

// --- Filter Structs ---

/// CommentFilter
///
/// Optional post title restricting `GET /comments` to a single thread.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct CommentFilter {
    pub title: Option<String>,
}

// --- Handlers ---

/// [Public Route] Liveness text.
#[utoipa::path(get, path = "/", responses((status = 200, description = "Running")))]
pub async fn health() -> &'static str {
    "Forum is running"
}

/// issue_token
///
/// [Public Route] Signs the request body as token claims. The body must be a JSON
/// object containing an `email`; the token is valid for one hour.
#[utoipa::path(
    post,
    path = "/jwt",
    responses(
        (status = 200, description = "Signed token", body = TokenResponse),
        (status = 400, description = "Missing email")
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    Json(payload): Json<Map<String, Value>>,
) -> ApiResult<Json<TokenResponse>> {
    let token = auth::issue_token(payload, &state.config.token_secret)?;
    Ok(Json(TokenResponse { token }))
}

// --- Posts ---

/// get_posts
///
/// [Public Route] Searches posts by title and author, ranked by vote difference.
/// Ranking is descending unless `sort=asc`.
#[utoipa::path(
    get,
    path = "/posts",
    params(PostFilter),
    responses((status = 200, description = "Ranked posts", body = [Post]))
)]
pub async fn get_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
) -> ApiResult<Json<Vec<Post>>> {
    let query = PostQuery::from(filter);
    let posts = state.repo.search_posts(&query).await?;
    Ok(Json(posts))
}

/// get_post
///
/// `GET /posts/{id}` serves two lookups on the same path shape. A key containing `@`
/// is an author email and requires a valid token; it returns that author's posts,
/// newest first. Any other key is a post id and returns the post or `null`.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = String, Path, description = "Post ID, or author email (token required)")),
    responses(
        (status = 200, description = "The post (or null), or the author's posts", body = Post),
        (status = 400, description = "Malformed id"),
        (status = 401, description = "Email lookup without a valid token")
    )
)]
pub async fn get_post(
    auth: Result<AuthUser, ApiError>,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    if key.contains('@') {
        auth?;
        let posts = state.repo.posts_by_author(&key).await?;
        return Ok(Json(posts).into_response());
    }
    let post = state.repo.get_post(&key).await?;
    Ok(Json(post).into_response())
}

/// [Public Route] Creates a post. Counters default to "0" when omitted.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = Post,
    responses(
        (status = 200, description = "Inserted", body = InsertResult),
        (status = 400, description = "Invalid post")
    )
)]
pub async fn create_post(
    State(state): State<AppState>,
    Json(post): Json<Post>,
) -> ApiResult<Json<InsertResult>> {
    post.validate()?;
    Ok(Json(state.repo.insert_post(post).await?))
}

#[utoipa::path(
    delete,
    path = "/posts/{id}",
    params(("id" = String, Path, description = "Post ID")),
    responses((status = 200, description = "Deleted", body = DeleteResult))
)]
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResult>> {
    Ok(Json(state.repo.delete_post(&id).await?))
}

/// upvote_post
///
/// [Public Route] Adds one to the post's `upvote` counter.
#[utoipa::path(
    patch,
    path = "/posts/upvote/{id}",
    params(("id" = String, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Counter updated", body = UpdateResult),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn upvote_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UpdateResult>> {
    Ok(Json(state.repo.adjust_vote(&id, VoteKind::Up).await?))
}

/// downvote_post
///
/// [Public Route] Subtracts one from the post's `downvote` counter.
#[utoipa::path(
    patch,
    path = "/posts/downvote/{id}",
    params(("id" = String, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Counter updated", body = UpdateResult),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn downvote_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UpdateResult>> {
    Ok(Json(state.repo.adjust_vote(&id, VoteKind::Down).await?))
}

/// get_all_posts
///
/// [Public Route] Offset pagination in natural storage order. Missing or non-numeric
/// `page`/`size` yield an empty list rather than an error.
#[utoipa::path(
    get,
    path = "/all-posts",
    params(PageParams),
    responses((status = 200, description = "One page of posts", body = [Post]))
)]
pub async fn get_all_posts(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Vec<Post>>> {
    let Some(page) = Page::from_params(&params) else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.repo.page_posts(page).await?))
}

#[utoipa::path(
    get,
    path = "/post-count",
    responses((status = 200, description = "Estimated number of posts", body = CountResponse))
)]
pub async fn post_count(State(state): State<AppState>) -> ApiResult<Json<CountResponse>> {
    let count = state.repo.count_posts().await?;
    Ok(Json(CountResponse { count }))
}

// --- Users ---

/// [Admin Route] Lists every user.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 401, description = "No valid token"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_users(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.repo.list_users().await?))
}

/// create_user
///
/// [Public Route] Called on every sign-in. Inserts the user only when no record with
/// the same email exists; otherwise answers with `insertedId: null`. Any `role` in
/// the body is ignored.
#[utoipa::path(
    post,
    path = "/users",
    request_body = User,
    responses((status = 200, description = "Inserted, or already present", body = InsertResult))
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> ApiResult<Json<InsertResult>> {
    user.validate()?;
    Ok(Json(state.repo.insert_user(user).await?))
}

/// check_admin
///
/// [Authenticated Route] Reports whether the caller is an admin. Callers may only
/// ask about themselves.
#[utoipa::path(
    get,
    path = "/users/admin/{id}",
    params(("id" = String, Path, description = "The caller's own email")),
    responses(
        (status = 200, description = "Admin flag", body = AdminStatus),
        (status = 403, description = "Email differs from the token's")
    )
)]
pub async fn check_admin(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Json<AdminStatus>> {
    if email != auth.email() {
        return Err(ApiError::Forbidden);
    }
    let admin = state
        .repo
        .find_user_by_email(&email)
        .await?
        .is_some_and(|user| user.is_admin());
    Ok(Json(AdminStatus { admin }))
}

/// [Admin Route] Grants the admin role to the user with the given id.
#[utoipa::path(
    patch,
    path = "/users/admin/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses((status = 200, description = "Role updated", body = UpdateResult))
)]
pub async fn make_admin(
    AdminUser { claims, .. }: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UpdateResult>> {
    let result = state.repo.make_admin(&id).await?;
    tracing::info!(granted_by = %claims.email, user_id = %id, "admin role granted");
    Ok(Json(result))
}

// --- Tags ---

#[utoipa::path(get, path = "/tags", responses((status = 200, description = "All tags", body = [Tag])))]
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.repo.list_tags().await?))
}

#[utoipa::path(
    post,
    path = "/tags",
    request_body = Tag,
    responses((status = 200, description = "Inserted", body = InsertResult))
)]
pub async fn create_tag(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(tag): Json<Tag>,
) -> ApiResult<Json<InsertResult>> {
    tag.validate()?;
    Ok(Json(state.repo.insert_tag(tag).await?))
}

// --- Announcements ---

/// [Public Route] Announcements, newest first.
#[utoipa::path(
    get,
    path = "/announcements",
    responses((status = 200, description = "All announcements", body = [Announcement]))
)]
pub async fn list_announcements(State(state): State<AppState>) -> ApiResult<Json<Vec<Announcement>>> {
    Ok(Json(state.repo.list_announcements().await?))
}

#[utoipa::path(
    get,
    path = "/announcement-count",
    responses((status = 200, description = "Number of announcements", body = CountResponse))
)]
pub async fn announcement_count(State(state): State<AppState>) -> ApiResult<Json<CountResponse>> {
    let count = state.repo.count_announcements().await?;
    Ok(Json(CountResponse { count }))
}

#[utoipa::path(
    post,
    path = "/announcements",
    request_body = Announcement,
    responses((status = 200, description = "Inserted", body = InsertResult))
)]
pub async fn create_announcement(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(item): Json<Announcement>,
) -> ApiResult<Json<InsertResult>> {
    item.validate()?;
    Ok(Json(state.repo.insert_announcement(item).await?))
}

// --- Comments ---

#[utoipa::path(
    get,
    path = "/comments",
    params(CommentFilter),
    responses((status = 200, description = "Comments", body = [Comment]))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Query(filter): Query<CommentFilter>,
) -> ApiResult<Json<Vec<Comment>>> {
    let comments = state.repo.list_comments(filter.title.as_deref()).await?;
    Ok(Json(comments))
}

#[utoipa::path(
    post,
    path = "/comments",
    request_body = Comment,
    responses((status = 200, description = "Inserted", body = InsertResult))
)]
pub async fn create_comment(
    State(state): State<AppState>,
    Json(comment): Json<Comment>,
) -> ApiResult<Json<InsertResult>> {
    comment.validate()?;
    Ok(Json(state.repo.insert_comment(comment).await?))
}

// --- Reports ---

/// [Admin Route] Reported comments awaiting review.
#[utoipa::path(
    get,
    path = "/reports",
    responses((status = 200, description = "All reports", body = [Report]))
)]
pub async fn list_reports(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Report>>> {
    Ok(Json(state.repo.list_reports().await?))
}

#[utoipa::path(
    post,
    path = "/reports",
    request_body = Report,
    responses((status = 200, description = "Inserted", body = InsertResult))
)]
pub async fn create_report(
    State(state): State<AppState>,
    Json(report): Json<Report>,
) -> ApiResult<Json<InsertResult>> {
    report.validate()?;
    Ok(Json(state.repo.insert_report(report).await?))
}

#[utoipa::path(
    delete,
    path = "/reports/{id}",
    params(("id" = String, Path, description = "Report ID")),
    responses((status = 200, description = "Deleted", body = DeleteResult))
)]
pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResult>> {
    Ok(Json(state.repo.delete_report(&id).await?))
}

// --- Payments ---

/// [Authenticated Route] The caller's own payment history.
#[utoipa::path(
    get,
    path = "/payments/{email}",
    params(("email" = String, Path, description = "The caller's own email")),
    responses(
        (status = 200, description = "Payments", body = [Payment]),
        (status = 403, description = "Email differs from the token's")
    )
)]
pub async fn list_payments(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Json<Vec<Payment>>> {
    if email != auth.email() {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(state.repo.payments_by_email(&email).await?))
}

/// record_payment
///
/// [Authenticated Route] Stores a completed payment. The record must belong to the
/// caller.
#[utoipa::path(
    post,
    path = "/payments",
    request_body = Payment,
    responses(
        (status = 200, description = "Inserted", body = InsertResult),
        (status = 403, description = "Payment email differs from the token's")
    )
)]
pub async fn record_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payment): Json<Payment>,
) -> ApiResult<Json<InsertResult>> {
    payment.validate()?;
    if payment.email != auth.email() {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(state.repo.insert_payment(payment).await?))
}

/// create_payment_intent
///
/// [Public Route] Creates a processor payment intent for `price` dollars and returns
/// the client secret used by the browser to confirm the charge.
#[utoipa::path(
    post,
    path = "/create-payment-intent",
    request_body = PaymentIntentRequest,
    responses(
        (status = 200, description = "Intent created", body = PaymentIntentResponse),
        (status = 400, description = "Non-positive price"),
        (status = 500, description = "Processor failure")
    )
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(request): Json<PaymentIntentRequest>,
) -> ApiResult<Json<PaymentIntentResponse>> {
    let amount = request.amount_cents()?;
    let client_secret = state
        .payments
        .create_payment_intent(amount, CURRENCY)
        .await?;
    Ok(Json(PaymentIntentResponse { client_secret }))
}

// --- Dashboard ---

#[utoipa::path(
    get,
    path = "/admin-stats",
    responses((status = 200, description = "Totals", body = AdminStats))
)]
pub async fn admin_stats(State(state): State<AppState>) -> ApiResult<Json<AdminStats>> {
    Ok(Json(state.repo.stats().await?))
}
