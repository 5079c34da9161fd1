use async_trait::async_trait;
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc, oid::ObjectId},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    error::StoreError,
    models::{
        AdminStats, Announcement, Comment, DeleteResult, InsertResult, Payment, Post, Report, Tag,
        UpdateResult, User,
    },
    query::{Page, PostQuery, VoteKind},
};

const USERS: &str = "users";
const POSTS: &str = "posts";
const COMMENTS: &str = "comments";
const TAGS: &str = "tags";
const ANNOUNCEMENTS: &str = "announcements";
const REPORTS: &str = "reports";
const PAYMENTS: &str = "payments";

/// MongoDB's duplicate key error code.
const DUPLICATE_KEY: i32 = 11000;

pub const USER_EXISTS: &str = "user already exist";

/// Repository Trait
///
/// The persistence contract used by every handler. Each method maps to one storage
/// operation (or one aggregation) so the handlers stay thin pass-throughs.
///
/// `Send + Sync + async_trait` make `Arc<dyn Repository>` shareable across Axum's tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    /// Inserts the user unless one with the same email exists, in which case
    /// `inserted_id` is null.
    async fn insert_user(&self, user: User) -> Result<InsertResult, StoreError>;
    async fn make_admin(&self, id: &str) -> Result<UpdateResult, StoreError>;

    // --- Posts ---
    async fn search_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError>;
    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError>;
    async fn posts_by_author(&self, email: &str) -> Result<Vec<Post>, StoreError>;
    async fn insert_post(&self, post: Post) -> Result<InsertResult, StoreError>;
    async fn delete_post(&self, id: &str) -> Result<DeleteResult, StoreError>;
    async fn adjust_vote(&self, id: &str, kind: VoteKind) -> Result<UpdateResult, StoreError>;
    /// One page of posts in natural storage order.
    async fn page_posts(&self, page: Page) -> Result<Vec<Post>, StoreError>;
    /// Approximate; backed by collection metadata rather than a scan.
    async fn count_posts(&self) -> Result<u64, StoreError>;

    // --- Comments, Tags, Announcements ---
    async fn list_comments(&self, post_title: Option<&str>) -> Result<Vec<Comment>, StoreError>;
    async fn insert_comment(&self, comment: Comment) -> Result<InsertResult, StoreError>;
    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError>;
    async fn insert_tag(&self, tag: Tag) -> Result<InsertResult, StoreError>;
    async fn list_announcements(&self) -> Result<Vec<Announcement>, StoreError>;
    async fn count_announcements(&self) -> Result<u64, StoreError>;
    async fn insert_announcement(&self, item: Announcement) -> Result<InsertResult, StoreError>;

    // --- Reports ---
    async fn list_reports(&self) -> Result<Vec<Report>, StoreError>;
    async fn insert_report(&self, report: Report) -> Result<InsertResult, StoreError>;
    async fn delete_report(&self, id: &str) -> Result<DeleteResult, StoreError>;

    // --- Payments ---
    async fn payments_by_email(&self, email: &str) -> Result<Vec<Payment>, StoreError>;
    async fn insert_payment(&self, payment: Payment) -> Result<InsertResult, StoreError>;

    // --- Dashboard ---
    async fn stats(&self) -> Result<AdminStats, StoreError>;

    /// Releases the storage connection. Called once after the server stops.
    async fn shutdown(&self);
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

pub fn parse_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

// --- Record Stamping ---

/// Stored
///
/// Records that receive an identifier (and, where present, a creation timestamp)
/// when they are inserted.
trait Stored {
    fn stamp(&mut self, id: Option<ObjectId>);
    fn object_id(&self) -> Option<ObjectId>;
}

macro_rules! stored {
    ($($ty:ty),+ ; timestamped) => {$(
        impl Stored for $ty {
            fn stamp(&mut self, id: Option<ObjectId>) {
                self.id = id;
                self.created_at = Some(Utc::now());
            }
            fn object_id(&self) -> Option<ObjectId> {
                self.id
            }
        }
    )+};
    ($($ty:ty),+) => {$(
        impl Stored for $ty {
            fn stamp(&mut self, id: Option<ObjectId>) {
                self.id = id;
            }
            fn object_id(&self) -> Option<ObjectId> {
                self.id
            }
        }
    )+};
}

stored!(Post, Comment, Announcement, Report, Payment; timestamped);
stored!(User, Tag);

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

/// MongoRepository
///
/// The production implementation backed by a single long-lived `mongodb::Client`.
/// The driver pools connections internally, so one repository is wrapped in an
/// `Arc` at startup and shared by all requests.
pub struct MongoRepository {
    client: Client,
    db: Database,
}

impl MongoRepository {
    /// connect
    ///
    /// Opens the client, pings the deployment, and makes sure the unique email index
    /// exists before the first request is served.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 }).await?;
        tracing::info!(database = db_name, "connected to MongoDB");

        let repo = Self { client, db };
        repo.ensure_indexes().await;
        Ok(repo)
    }

    /// The unique email index closes the check-then-insert race in `insert_user`.
    /// Pre-existing duplicate emails make index creation fail; the server still starts
    /// and relies on the check alone.
    async fn ensure_indexes(&self) {
        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        if let Err(e) = self.users().create_index(index).await {
            tracing::warn!("could not create unique email index: {:?}", e);
        }
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn posts(&self) -> Collection<Post> {
        self.db.collection(POSTS)
    }

    fn comments(&self) -> Collection<Comment> {
        self.db.collection(COMMENTS)
    }

    fn tags(&self) -> Collection<Tag> {
        self.db.collection(TAGS)
    }

    fn announcements(&self) -> Collection<Announcement> {
        self.db.collection(ANNOUNCEMENTS)
    }

    fn reports(&self) -> Collection<Report> {
        self.db.collection(REPORTS)
    }

    fn payments(&self) -> Collection<Payment> {
        self.db.collection(PAYMENTS)
    }

    async fn insert<T>(collection: Collection<T>, mut record: T) -> Result<InsertResult, StoreError>
    where
        T: Stored + serde::Serialize + Send + Sync,
    {
        record.stamp(None);
        let result = collection.insert_one(&record).await?;
        Ok(InsertResult {
            acknowledged: true,
            inserted_id: result.inserted_id.as_object_id().map(|id| id.to_hex()),
            message: None,
        })
    }

    async fn delete_by_id<T>(collection: Collection<T>, id: &str) -> Result<DeleteResult, StoreError>
    where
        T: Send + Sync,
    {
        let oid = parse_id(id)?;
        let result = collection.delete_one(doc! { "_id": oid }).await?;
        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: result.deleted_count,
        })
    }

    async fn find_all<T>(collection: Collection<T>, filter: Document) -> Result<Vec<T>, StoreError>
    where
        T: serde::de::DeserializeOwned + Unpin + Send + Sync,
    {
        let cursor = collection.find(filter).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl Repository for MongoRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(doc! { "email": email }).await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Self::find_all(self.users(), doc! {}).await
    }

    /// insert_user
    ///
    /// Check-then-insert. A concurrent insert of the same email that slips past the
    /// check is stopped by the unique index and reported as an existing user.
    async fn insert_user(&self, mut user: User) -> Result<InsertResult, StoreError> {
        if self.find_user_by_email(&user.email).await?.is_some() {
            return Ok(InsertResult::skipped(USER_EXISTS));
        }
        user.role = None;
        match Self::insert(self.users(), user).await {
            Err(StoreError::Database(e)) if is_duplicate_key(&e) => {
                tracing::debug!("duplicate user insert lost the race");
                Ok(InsertResult::skipped(USER_EXISTS))
            }
            other => other,
        }
    }

    async fn make_admin(&self, id: &str) -> Result<UpdateResult, StoreError> {
        let oid = parse_id(id)?;
        let result = self
            .users()
            .update_one(doc! { "_id": oid }, doc! { "$set": { "role": "admin" } })
            .await?;
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn search_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError> {
        let cursor = self
            .posts()
            .aggregate(query.pipeline())
            .with_type::<Post>()
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        let oid = parse_id(id)?;
        Ok(self.posts().find_one(doc! { "_id": oid }).await?)
    }

    async fn posts_by_author(&self, email: &str) -> Result<Vec<Post>, StoreError> {
        let cursor = self
            .posts()
            .find(doc! { "author.email": email })
            .sort(doc! { "_id": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_post(&self, post: Post) -> Result<InsertResult, StoreError> {
        Self::insert(self.posts(), post).await
    }

    async fn delete_post(&self, id: &str) -> Result<DeleteResult, StoreError> {
        Self::delete_by_id(self.posts(), id).await
    }

    /// adjust_vote
    ///
    /// One update-pipeline call; the counter stays a string in storage.
    async fn adjust_vote(&self, id: &str, kind: VoteKind) -> Result<UpdateResult, StoreError> {
        let oid = parse_id(id)?;
        let result = self
            .posts()
            .update_one(doc! { "_id": oid }, kind.update_pipeline())
            .await?;
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn page_posts(&self, page: Page) -> Result<Vec<Post>, StoreError> {
        let limit = i64::try_from(page.size).unwrap_or(i64::MAX);
        let cursor = self
            .posts()
            .find(doc! {})
            .skip(page.offset())
            .limit(limit)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_posts(&self) -> Result<u64, StoreError> {
        Ok(self.posts().estimated_document_count().await?)
    }

    async fn list_comments(&self, post_title: Option<&str>) -> Result<Vec<Comment>, StoreError> {
        let filter = match post_title {
            Some(title) => doc! { "post_title": title },
            None => doc! {},
        };
        Self::find_all(self.comments(), filter).await
    }

    async fn insert_comment(&self, comment: Comment) -> Result<InsertResult, StoreError> {
        Self::insert(self.comments(), comment).await
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        Self::find_all(self.tags(), doc! {}).await
    }

    async fn insert_tag(&self, tag: Tag) -> Result<InsertResult, StoreError> {
        Self::insert(self.tags(), tag).await
    }

    async fn list_announcements(&self) -> Result<Vec<Announcement>, StoreError> {
        let cursor = self
            .announcements()
            .find(doc! {})
            .sort(doc! { "_id": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_announcements(&self) -> Result<u64, StoreError> {
        Ok(self.announcements().estimated_document_count().await?)
    }

    async fn insert_announcement(&self, item: Announcement) -> Result<InsertResult, StoreError> {
        Self::insert(self.announcements(), item).await
    }

    async fn list_reports(&self) -> Result<Vec<Report>, StoreError> {
        Self::find_all(self.reports(), doc! {}).await
    }

    async fn insert_report(&self, report: Report) -> Result<InsertResult, StoreError> {
        Self::insert(self.reports(), report).await
    }

    async fn delete_report(&self, id: &str) -> Result<DeleteResult, StoreError> {
        Self::delete_by_id(self.reports(), id).await
    }

    async fn payments_by_email(&self, email: &str) -> Result<Vec<Payment>, StoreError> {
        let cursor = self
            .payments()
            .find(doc! { "email": email })
            .sort(doc! { "_id": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_payment(&self, payment: Payment) -> Result<InsertResult, StoreError> {
        Self::insert(self.payments(), payment).await
    }

    async fn stats(&self) -> Result<AdminStats, StoreError> {
        Ok(AdminStats {
            posts: self.posts().estimated_document_count().await?,
            comments: self.comments().estimated_document_count().await?,
            users: self.users().estimated_document_count().await?,
        })
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().await;
        tracing::info!("MongoDB client closed");
    }
}

// --- In-Memory Implementation (For Tests) ---

#[derive(Default)]
struct MemoryCollections {
    users: Vec<User>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    tags: Vec<Tag>,
    announcements: Vec<Announcement>,
    reports: Vec<Report>,
    payments: Vec<Payment>,
}

/// MemoryRepository
///
/// A `Repository` held entirely in process. Vectors keep insertion order, which plays
/// the role of MongoDB's natural order. Used by the test suite to drive handlers and
/// the full router without a database.
#[derive(Default)]
pub struct MemoryRepository {
    data: RwLock<MemoryCollections>,
    /// When true, every operation fails with a simulated storage error.
    pub should_fail: bool,
}

fn memory_insert<T: Stored>(records: &mut Vec<T>, mut record: T) -> InsertResult {
    let id = ObjectId::new();
    record.stamp(Some(id));
    records.push(record);
    InsertResult::inserted(id)
}

fn memory_delete<T: Stored>(records: &mut Vec<T>, id: &str) -> Result<DeleteResult, StoreError> {
    let oid = parse_id(id)?;
    let before = records.len();
    if let Some(pos) = records.iter().position(|r| r.object_id() == Some(oid)) {
        records.remove(pos);
    }
    Ok(DeleteResult {
        acknowledged: true,
        deleted_count: (before - records.len()) as u64,
    })
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Seeds users as-is, assigning ids to those that lack one.
    pub async fn with_users(self, users: Vec<User>) -> Self {
        {
            let mut data = self.data.write().await;
            for mut user in users {
                user.id = user.id.or_else(|| Some(ObjectId::new()));
                data.users.push(user);
            }
        }
        self
    }

    /// Seeds posts as-is, assigning ids to those that lack one.
    pub async fn with_posts(self, posts: Vec<Post>) -> Self {
        {
            let mut data = self.data.write().await;
            for mut post in posts {
                post.id = post.id.or_else(|| Some(ObjectId::new()));
                data.posts.push(post);
            }
        }
        self
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.should_fail {
            return Err(StoreError::Unavailable(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.check()?;
        let data = self.data.read().await;
        Ok(data.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.check()?;
        Ok(self.data.read().await.users.clone())
    }

    async fn insert_user(&self, mut user: User) -> Result<InsertResult, StoreError> {
        self.check()?;
        let mut data = self.data.write().await;
        if data.users.iter().any(|u| u.email == user.email) {
            return Ok(InsertResult::skipped(USER_EXISTS));
        }
        user.role = None;
        Ok(memory_insert(&mut data.users, user))
    }

    async fn make_admin(&self, id: &str) -> Result<UpdateResult, StoreError> {
        self.check()?;
        let oid = parse_id(id)?;
        let mut data = self.data.write().await;
        let Some(user) = data.users.iter_mut().find(|u| u.id == Some(oid)) else {
            return Ok(UpdateResult { acknowledged: true, ..UpdateResult::default() });
        };
        let modified = !user.is_admin();
        user.role = Some("admin".to_string());
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: 1,
            modified_count: modified as u64,
        })
    }

    async fn search_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError> {
        self.check()?;
        let data = self.data.read().await;
        Ok(query.rank(data.posts.iter().cloned()))
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        self.check()?;
        let oid = parse_id(id)?;
        let data = self.data.read().await;
        Ok(data.posts.iter().find(|p| p.id == Some(oid)).cloned())
    }

    async fn posts_by_author(&self, email: &str) -> Result<Vec<Post>, StoreError> {
        self.check()?;
        let data = self.data.read().await;
        Ok(data
            .posts
            .iter()
            .rev()
            .filter(|p| p.author.email == email)
            .cloned()
            .collect())
    }

    async fn insert_post(&self, post: Post) -> Result<InsertResult, StoreError> {
        self.check()?;
        Ok(memory_insert(&mut self.data.write().await.posts, post))
    }

    async fn delete_post(&self, id: &str) -> Result<DeleteResult, StoreError> {
        self.check()?;
        memory_delete(&mut self.data.write().await.posts, id)
    }

    async fn adjust_vote(&self, id: &str, kind: VoteKind) -> Result<UpdateResult, StoreError> {
        self.check()?;
        let oid = parse_id(id)?;
        let mut data = self.data.write().await;
        let Some(post) = data.posts.iter_mut().find(|p| p.id == Some(oid)) else {
            return Ok(UpdateResult { acknowledged: true, ..UpdateResult::default() });
        };
        let counter = match kind {
            VoteKind::Up => &mut post.upvote,
            VoteKind::Down => &mut post.downvote,
        };
        *counter = kind.apply(counter);
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: 1,
            modified_count: 1,
        })
    }

    async fn page_posts(&self, page: Page) -> Result<Vec<Post>, StoreError> {
        self.check()?;
        let data = self.data.read().await;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let size = usize::try_from(page.size).unwrap_or(usize::MAX);
        Ok(data.posts.iter().skip(offset).take(size).cloned().collect())
    }

    async fn count_posts(&self) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.data.read().await.posts.len() as u64)
    }

    async fn list_comments(&self, post_title: Option<&str>) -> Result<Vec<Comment>, StoreError> {
        self.check()?;
        let data = self.data.read().await;
        Ok(data
            .comments
            .iter()
            .filter(|c| post_title.is_none_or(|title| c.post_title == title))
            .cloned()
            .collect())
    }

    async fn insert_comment(&self, comment: Comment) -> Result<InsertResult, StoreError> {
        self.check()?;
        Ok(memory_insert(&mut self.data.write().await.comments, comment))
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.check()?;
        Ok(self.data.read().await.tags.clone())
    }

    async fn insert_tag(&self, tag: Tag) -> Result<InsertResult, StoreError> {
        self.check()?;
        Ok(memory_insert(&mut self.data.write().await.tags, tag))
    }

    async fn list_announcements(&self) -> Result<Vec<Announcement>, StoreError> {
        self.check()?;
        let data = self.data.read().await;
        Ok(data.announcements.iter().rev().cloned().collect())
    }

    async fn count_announcements(&self) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.data.read().await.announcements.len() as u64)
    }

    async fn insert_announcement(&self, item: Announcement) -> Result<InsertResult, StoreError> {
        self.check()?;
        Ok(memory_insert(&mut self.data.write().await.announcements, item))
    }

    async fn list_reports(&self) -> Result<Vec<Report>, StoreError> {
        self.check()?;
        Ok(self.data.read().await.reports.clone())
    }

    async fn insert_report(&self, report: Report) -> Result<InsertResult, StoreError> {
        self.check()?;
        Ok(memory_insert(&mut self.data.write().await.reports, report))
    }

    async fn delete_report(&self, id: &str) -> Result<DeleteResult, StoreError> {
        self.check()?;
        memory_delete(&mut self.data.write().await.reports, id)
    }

    async fn payments_by_email(&self, email: &str) -> Result<Vec<Payment>, StoreError> {
        self.check()?;
        let data = self.data.read().await;
        Ok(data
            .payments
            .iter()
            .rev()
            .filter(|p| p.email == email)
            .cloned()
            .collect())
    }

    async fn insert_payment(&self, payment: Payment) -> Result<InsertResult, StoreError> {
        self.check()?;
        Ok(memory_insert(&mut self.data.write().await.payments, payment))
    }

    async fn stats(&self) -> Result<AdminStats, StoreError> {
        self.check()?;
        let data = self.data.read().await;
        Ok(AdminStats {
            posts: data.posts.len() as u64,
            comments: data.comments.len() as u64,
            users: data.users.len() as u64,
        })
    }

    async fn shutdown(&self) {}
}
