use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use forum_api::{
    AppState, MemoryRepository, MockPaymentService,
    auth::{AdminUser, AuthUser, Claims},
    config::AppConfig,
    error::ApiError,
    handlers::{self, CommentFilter},
    models::{
        Announcement, Author, Comment, Payment, PaymentIntentRequest, Post, Report, Tag, User,
    },
    query::{PageParams, PostFilter},
    repository::USER_EXISTS,
};
use mongodb::bson::oid::ObjectId;
use serde_json::{Map, Value};
use std::sync::Arc;

// --- Test Fixtures ---

fn create_test_state(repo: MemoryRepository) -> AppState {
    AppState {
        repo: Arc::new(repo),
        payments: Arc::new(MockPaymentService::new()),
        config: AppConfig::default(),
    }
}

fn claims(email: &str) -> Claims {
    Claims {
        email: email.to_string(),
        iat: 0,
        exp: 0,
        extra: Map::new(),
    }
}

fn auth_user(email: &str) -> AuthUser {
    AuthUser {
        claims: claims(email),
    }
}

fn admin_user(email: &str) -> AdminUser {
    AdminUser {
        claims: claims(email),
        user: User {
            email: email.to_string(),
            role: Some("admin".to_string()),
            ..Default::default()
        },
    }
}

fn post(title: &str, email: &str, upvote: &str, downvote: &str) -> Post {
    Post {
        title: title.to_string(),
        author: Author {
            name: "Author".to_string(),
            email: email.to_string(),
            image: None,
        },
        upvote: upvote.to_string(),
        downvote: downvote.to_string(),
        ..Default::default()
    }
}

fn titles(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|p| p.title.as_str()).collect()
}

fn status_of(err: ApiError) -> StatusCode {
    err.into_response().status()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn first_post_id(state: &AppState) -> String {
    let posts = state
        .repo
        .page_posts(forum_api::query::Page { number: 1, size: 1 })
        .await
        .unwrap();
    posts[0].id.unwrap().to_hex()
}

// --- Users ---

#[tokio::test]
async fn test_create_user_skips_existing_email() {
    let state = create_test_state(MemoryRepository::new());
    let user = User {
        email: "new@forum.dev".to_string(),
        name: Some("New".to_string()),
        ..Default::default()
    };

    let Json(first) = handlers::create_user(State(state.clone()), Json(user.clone()))
        .await
        .unwrap();
    assert!(first.inserted_id.is_some());

    let Json(second) = handlers::create_user(State(state.clone()), Json(user))
        .await
        .unwrap();
    assert_eq!(second.inserted_id, None);
    assert_eq!(second.message.as_deref(), Some(USER_EXISTS));

    assert_eq!(state.repo.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_user_ignores_role_in_body() {
    let state = create_test_state(MemoryRepository::new());
    let user = User {
        email: "sneaky@forum.dev".to_string(),
        role: Some("admin".to_string()),
        ..Default::default()
    };

    handlers::create_user(State(state.clone()), Json(user))
        .await
        .unwrap();

    let stored = state
        .repo
        .find_user_by_email("sneaky@forum.dev")
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_admin());
}

#[tokio::test]
async fn test_create_user_rejects_missing_email() {
    let state = create_test_state(MemoryRepository::new());

    let err = handlers::create_user(State(state), Json(User::default()))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_make_admin_then_check_admin() {
    let repo = MemoryRepository::new()
        .with_users(vec![User {
            email: "member@forum.dev".to_string(),
            ..Default::default()
        }])
        .await;
    let state = create_test_state(repo);
    let member = state.repo.list_users().await.unwrap().remove(0);
    let id = member.id.unwrap().to_hex();

    let Json(before) = handlers::check_admin(
        auth_user("member@forum.dev"),
        State(state.clone()),
        Path("member@forum.dev".to_string()),
    )
    .await
    .unwrap();
    assert!(!before.admin);

    let Json(update) = handlers::make_admin(
        admin_user("admin@forum.dev"),
        State(state.clone()),
        Path(id.clone()),
    )
    .await
    .unwrap();
    assert_eq!(update.matched_count, 1);
    assert_eq!(update.modified_count, 1);

    let Json(after) = handlers::check_admin(
        auth_user("member@forum.dev"),
        State(state.clone()),
        Path("member@forum.dev".to_string()),
    )
    .await
    .unwrap();
    assert!(after.admin);

    // Granting again matches but changes nothing.
    let Json(repeat) = handlers::make_admin(admin_user("admin@forum.dev"), State(state), Path(id))
        .await
        .unwrap();
    assert_eq!(repeat.matched_count, 1);
    assert_eq!(repeat.modified_count, 0);
}

#[tokio::test]
async fn test_check_admin_is_self_only() {
    let state = create_test_state(MemoryRepository::new());

    let err = handlers::check_admin(
        auth_user("member@forum.dev"),
        State(state),
        Path("admin@forum.dev".to_string()),
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_make_admin_with_malformed_id() {
    let state = create_test_state(MemoryRepository::new());

    let err = handlers::make_admin(
        admin_user("admin@forum.dev"),
        State(state),
        Path("not-an-object-id".to_string()),
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
}

// --- Posts ---

#[tokio::test]
async fn test_get_posts_ranks_by_vote_difference() {
    let repo = MemoryRepository::new()
        .with_posts(vec![
            post("Rust tips", "a@forum.dev", "5", "1"),
            post("Go tips", "b@forum.dev", "10", "0"),
            post("rust news", "a@forum.dev", "1", "4"),
            post("Rust tooling", "c@forum.dev", "oops", "0"),
        ])
        .await;
    let state = create_test_state(repo);

    let Json(desc) = handlers::get_posts(State(state.clone()), Query(PostFilter::default()))
        .await
        .unwrap();
    assert_eq!(
        titles(&desc),
        vec!["Go tips", "Rust tips", "Rust tooling", "rust news"]
    );

    let filter = PostFilter {
        search: Some("RUST".to_string()),
        sort: Some("asc".to_string()),
        ..Default::default()
    };
    let Json(asc) = handlers::get_posts(State(state.clone()), Query(filter))
        .await
        .unwrap();
    assert_eq!(titles(&asc), vec!["rust news", "Rust tooling", "Rust tips"]);

    let filter = PostFilter {
        email: Some("a@forum.dev".to_string()),
        sort: Some("ASC".to_string()),
        ..Default::default()
    };
    let Json(by_author) = handlers::get_posts(State(state), Query(filter))
        .await
        .unwrap();
    // Only the exact "asc" flips the order.
    assert_eq!(titles(&by_author), vec!["Rust tips", "rust news"]);
}

#[tokio::test]
async fn test_get_all_posts_paginates() {
    let posts = (0..25)
        .map(|i| post(&format!("Post {i}"), "a@forum.dev", "0", "0"))
        .collect();
    let state = create_test_state(MemoryRepository::new().with_posts(posts).await);

    let params = PageParams {
        page: Some("2".to_string()),
        size: Some("10".to_string()),
    };
    let Json(page) = handlers::get_all_posts(State(state.clone()), Query(params))
        .await
        .unwrap();
    let expected: Vec<String> = (10..20).map(|i| format!("Post {i}")).collect();
    assert_eq!(titles(&page), expected.iter().map(String::as_str).collect::<Vec<_>>());

    let params = PageParams {
        page: Some("3".to_string()),
        size: Some("10".to_string()),
    };
    let Json(last) = handlers::get_all_posts(State(state.clone()), Query(params))
        .await
        .unwrap();
    assert_eq!(last.len(), 5);

    let Json(count) = handlers::post_count(State(state)).await.unwrap();
    assert_eq!(count.count, 25);
}

#[tokio::test]
async fn test_get_all_posts_with_invalid_params_is_empty() {
    let posts = vec![post("Only", "a@forum.dev", "0", "0")];
    let state = create_test_state(MemoryRepository::new().with_posts(posts).await);

    for (page, size) in [(Some("abc"), Some("10")), (None, Some("10")), (Some("1"), Some("0"))] {
        let params = PageParams {
            page: page.map(str::to_string),
            size: size.map(str::to_string),
        };
        let Json(result) = handlers::get_all_posts(State(state.clone()), Query(params))
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}

#[tokio::test]
async fn test_vote_counters_adjust() {
    let posts = vec![post("Voted", "a@forum.dev", "5", "3")];
    let state = create_test_state(MemoryRepository::new().with_posts(posts).await);
    let id = first_post_id(&state).await;

    let Json(up) = handlers::upvote_post(State(state.clone()), Path(id.clone()))
        .await
        .unwrap();
    assert_eq!(up.modified_count, 1);

    handlers::downvote_post(State(state.clone()), Path(id.clone()))
        .await
        .unwrap();

    let stored = state.repo.get_post(&id).await.unwrap().unwrap();
    assert_eq!(stored.upvote, "6");
    assert_eq!(stored.downvote, "2");
}

#[tokio::test]
async fn test_vote_on_missing_post_matches_nothing() {
    let state = create_test_state(MemoryRepository::new());

    let Json(result) = handlers::upvote_post(State(state), Path(ObjectId::new().to_hex()))
        .await
        .unwrap();
    assert_eq!(result.matched_count, 0);
    assert_eq!(result.modified_count, 0);
}

#[tokio::test]
async fn test_vote_with_malformed_id_is_bad_request() {
    let state = create_test_state(MemoryRepository::new());

    let err = handlers::upvote_post(State(state), Path("xyz".to_string()))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_post_by_id_or_null() {
    let posts = vec![post("Single", "a@forum.dev", "0", "0")];
    let state = create_test_state(MemoryRepository::new().with_posts(posts).await);
    let id = first_post_id(&state).await;

    let response = handlers::get_post(Err(ApiError::Unauthorized), State(state.clone()), Path(id))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["title"], "Single");

    let response = handlers::get_post(
        Err(ApiError::Unauthorized),
        State(state),
        Path(ObjectId::new().to_hex()),
    )
    .await
    .unwrap();
    assert_eq!(body_json(response).await, Value::Null);
}

#[tokio::test]
async fn test_get_post_by_author_email_requires_token() {
    let posts = vec![
        post("First", "a@forum.dev", "0", "0"),
        post("Other", "b@forum.dev", "0", "0"),
        post("Second", "a@forum.dev", "0", "0"),
    ];
    let state = create_test_state(MemoryRepository::new().with_posts(posts).await);

    let err = handlers::get_post(
        Err(ApiError::Unauthorized),
        State(state.clone()),
        Path("a@forum.dev".to_string()),
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), StatusCode::UNAUTHORIZED);

    let response = handlers::get_post(
        Ok(auth_user("b@forum.dev")),
        State(state),
        Path("a@forum.dev".to_string()),
    )
    .await
    .unwrap();
    let body = body_json(response).await;
    let listed: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert_eq!(listed, vec!["Second", "First"]);
}

#[tokio::test]
async fn test_create_and_delete_post() {
    let state = create_test_state(MemoryRepository::new());
    let mut new_post = post("Fresh", "a@forum.dev", "0", "0");
    new_post.tag = Some("rust".to_string());

    let Json(inserted) = handlers::create_post(State(state.clone()), Json(new_post))
        .await
        .unwrap();
    let id = inserted.inserted_id.unwrap();

    let stored = state.repo.get_post(&id).await.unwrap().unwrap();
    assert!(stored.created_at.is_some());

    let Json(deleted) = handlers::delete_post(State(state.clone()), Path(id.clone()))
        .await
        .unwrap();
    assert_eq!(deleted.deleted_count, 1);

    let Json(again) = handlers::delete_post(State(state), Path(id))
        .await
        .unwrap();
    assert_eq!(again.deleted_count, 0);
}

#[tokio::test]
async fn test_create_post_rejects_bad_counters() {
    let state = create_test_state(MemoryRepository::new());

    let err = handlers::create_post(State(state), Json(post("Bad", "a@forum.dev", "lots", "0")))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
}

// --- Forum Content ---

#[tokio::test]
async fn test_comments_filter_by_title() {
    let state = create_test_state(MemoryRepository::new());
    for (title, text) in [("Rust tips", "nice"), ("Go tips", "meh"), ("Rust tips", "agreed")] {
        let comment = Comment {
            post_title: title.to_string(),
            email: "c@forum.dev".to_string(),
            text: text.to_string(),
            ..Default::default()
        };
        handlers::create_comment(State(state.clone()), Json(comment))
            .await
            .unwrap();
    }

    let filter = CommentFilter {
        title: Some("Rust tips".to_string()),
    };
    let Json(thread) = handlers::list_comments(State(state.clone()), Query(filter))
        .await
        .unwrap();
    let texts: Vec<&str> = thread.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["nice", "agreed"]);

    let Json(all) = handlers::list_comments(State(state), Query(CommentFilter { title: None }))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_tags_and_announcements() {
    let state = create_test_state(MemoryRepository::new());
    let admin = admin_user("admin@forum.dev");

    handlers::create_tag(
        admin.clone(),
        State(state.clone()),
        Json(Tag {
            id: None,
            name: "rust".to_string(),
        }),
    )
    .await
    .unwrap();
    let Json(tags) = handlers::list_tags(State(state.clone())).await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "rust");

    for title in ["Welcome", "Maintenance"] {
        let item = Announcement {
            author_name: "Admin".to_string(),
            title: title.to_string(),
            description: "details".to_string(),
            ..Default::default()
        };
        handlers::create_announcement(admin.clone(), State(state.clone()), Json(item))
            .await
            .unwrap();
    }

    let Json(items) = handlers::list_announcements(State(state.clone())).await.unwrap();
    let listed: Vec<&str> = items.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(listed, vec!["Maintenance", "Welcome"]);

    let Json(count) = handlers::announcement_count(State(state)).await.unwrap();
    assert_eq!(count.count, 2);
}

#[tokio::test]
async fn test_report_lifecycle() {
    let state = create_test_state(MemoryRepository::new());
    let report = Report {
        comment_id: ObjectId::new().to_hex(),
        email: "c@forum.dev".to_string(),
        feedback: "spam".to_string(),
        ..Default::default()
    };

    let Json(inserted) = handlers::create_report(State(state.clone()), Json(report))
        .await
        .unwrap();
    let id = inserted.inserted_id.unwrap();

    let Json(reports) = handlers::list_reports(admin_user("admin@forum.dev"), State(state.clone()))
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);

    let Json(deleted) = handlers::delete_report(State(state.clone()), Path(id))
        .await
        .unwrap();
    assert_eq!(deleted.deleted_count, 1);

    let Json(reports) = handlers::list_reports(admin_user("admin@forum.dev"), State(state))
        .await
        .unwrap();
    assert!(reports.is_empty());
}

#[tokio::test]
async fn test_admin_stats_counts_collections() {
    let repo = MemoryRepository::new()
        .with_users(vec![
            User {
                email: "a@forum.dev".to_string(),
                ..Default::default()
            },
            User {
                email: "b@forum.dev".to_string(),
                ..Default::default()
            },
        ])
        .await
        .with_posts(vec![post("One", "a@forum.dev", "0", "0")])
        .await;
    let state = create_test_state(repo);
    let comment = Comment {
        post_title: "One".to_string(),
        email: "b@forum.dev".to_string(),
        text: "hi".to_string(),
        ..Default::default()
    };
    handlers::create_comment(State(state.clone()), Json(comment))
        .await
        .unwrap();

    let Json(stats) = handlers::admin_stats(State(state)).await.unwrap();
    assert_eq!((stats.posts, stats.comments, stats.users), (1, 1, 2));
}

// --- Payments ---

fn payment(email: &str, transaction_id: &str) -> Payment {
    Payment {
        email: email.to_string(),
        price: 9.99,
        transaction_id: transaction_id.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_payments_are_scoped_to_the_caller() {
    let state = create_test_state(MemoryRepository::new());
    let me = "payer@forum.dev";

    for txn in ["pi_1", "pi_2"] {
        handlers::record_payment(auth_user(me), State(state.clone()), Json(payment(me, txn)))
            .await
            .unwrap();
    }

    let err = handlers::record_payment(
        auth_user(me),
        State(state.clone()),
        Json(payment("someone@forum.dev", "pi_3")),
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), StatusCode::FORBIDDEN);

    let Json(history) = handlers::list_payments(auth_user(me), State(state.clone()), Path(me.to_string()))
        .await
        .unwrap();
    let txns: Vec<&str> = history.iter().map(|p| p.transaction_id.as_str()).collect();
    assert_eq!(txns, vec!["pi_2", "pi_1"]);

    let err = handlers::list_payments(
        auth_user(me),
        State(state),
        Path("someone@forum.dev".to_string()),
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_payment_intent_converts_to_cents() {
    let state = create_test_state(MemoryRepository::new());

    let Json(intent) = handlers::create_payment_intent(
        State(state),
        Json(PaymentIntentRequest { price: 12.5 }),
    )
    .await
    .unwrap();
    assert_eq!(intent.client_secret, "pi_mock_1250_usd_secret_fake");
}

#[tokio::test]
async fn test_create_payment_intent_rejects_non_positive_price() {
    let state = create_test_state(MemoryRepository::new());

    let err = handlers::create_payment_intent(State(state), Json(PaymentIntentRequest { price: 0.0 }))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_payment_intent_processor_failure() {
    let mut state = create_test_state(MemoryRepository::new());
    state.payments = Arc::new(MockPaymentService::new_failing());

    let err = handlers::create_payment_intent(State(state), Json(PaymentIntentRequest { price: 5.0 }))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
}

// --- Storage Failures ---

#[tokio::test]
async fn test_storage_failure_is_internal_error() {
    let state = create_test_state(MemoryRepository::new_failing());

    let err = handlers::get_posts(State(state.clone()), Query(PostFilter::default()))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);

    let err = handlers::upvote_post(State(state.clone()), Path(ObjectId::new().to_hex()))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);

    let err = handlers::admin_stats(State(state)).await.unwrap_err();
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].is_string());
}
