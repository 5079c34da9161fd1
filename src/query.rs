use mongodb::bson::{Document, doc};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::models::Post;

/// Name of the computed ranking field added by the search pipeline.
pub const VOTE_DIFFERENCE: &str = "voteDifference";

// --- Query Parameters ---

/// PostFilter
///
/// Query parameters accepted by `GET /posts`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PostFilter {
    /// Case-insensitive substring matched against the post title.
    pub search: Option<String>,
    /// Exact author email.
    pub email: Option<String>,
    /// "asc" ranks by ascending vote difference; anything else ranks descending.
    pub sort: Option<String>,
}

/// PageParams
///
/// Raw `page`/`size` parameters for `GET /all-posts`. Kept as strings so that
/// non-numeric input yields an empty page instead of a rejected request.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageParams {
    pub page: Option<String>,
    pub size: Option<String>,
}

// --- Sorting ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Only the exact string "asc" selects ascending order.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("asc") => SortOrder::Ascending,
            _ => SortOrder::Descending,
        }
    }

    fn direction(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// Parses a stored vote counter. Unparseable counters rank as zero, matching the
/// `onError` fallback of the aggregation pipeline.
pub fn parse_counter(raw: &str) -> i64 {
    raw.parse().unwrap_or(0)
}

/// Upvotes minus downvotes.
pub fn vote_difference(post: &Post) -> i64 {
    parse_counter(&post.upvote) - parse_counter(&post.downvote)
}

/// `$convert` expression turning a string counter field into a 64-bit integer.
fn counter_expr(field: &str) -> Document {
    doc! {
        "$convert": {
            "input": format!("${field}"),
            "to": "long",
            "onError": 0_i64,
            "onNull": 0_i64,
        }
    }
}

// --- Post Search ---

/// PostQuery
///
/// A validated search request over the posts collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub search: Option<String>,
    pub author_email: Option<String>,
    pub order: SortOrder,
}

impl From<PostFilter> for PostQuery {
    fn from(filter: PostFilter) -> Self {
        let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Self {
            order: SortOrder::from_param(filter.sort.as_deref()),
            search: non_blank(filter.search),
            author_email: non_blank(filter.email),
        }
    }
}

impl PostQuery {
    /// The `$match` stage. Search text is escaped so it is matched literally.
    pub fn match_stage(&self) -> Document {
        let mut filter = Document::new();
        if let Some(search) = &self.search {
            filter.insert(
                "title",
                doc! { "$regex": regex::escape(search), "$options": "i" },
            );
        }
        if let Some(email) = &self.author_email {
            filter.insert("author.email", email.as_str());
        }
        filter
    }

    /// pipeline
    ///
    /// Builds the aggregation run by `GET /posts`: filter, derive the vote difference,
    /// then sort on it. `_id` breaks ties so equal scores come back in insertion order.
    pub fn pipeline(&self) -> Vec<Document> {
        vec![
            doc! { "$match": self.match_stage() },
            doc! {
                "$addFields": {
                    VOTE_DIFFERENCE: {
                        "$subtract": [counter_expr("upvote"), counter_expr("downvote")]
                    }
                }
            },
            doc! { "$sort": { VOTE_DIFFERENCE: self.order.direction(), "_id": 1 } },
        ]
    }

    /// In-process equivalent of the `$match` stage.
    pub fn matches(&self, post: &Post) -> bool {
        let title_ok = self.search.as_ref().is_none_or(|search| {
            post.title
                .to_lowercase()
                .contains(&search.to_lowercase())
        });
        let author_ok = self
            .author_email
            .as_ref()
            .is_none_or(|email| &post.author.email == email);
        title_ok && author_ok
    }

    /// In-process equivalent of the whole pipeline. The sort is stable, so ties keep
    /// the order in which `posts` was given.
    pub fn rank(&self, posts: impl IntoIterator<Item = Post>) -> Vec<Post> {
        let mut ranked: Vec<Post> = posts.into_iter().filter(|p| self.matches(p)).collect();
        match self.order {
            SortOrder::Ascending => ranked.sort_by_key(vote_difference),
            SortOrder::Descending => ranked.sort_by_key(|p| std::cmp::Reverse(vote_difference(p))),
        }
        ranked
    }
}

// --- Pagination ---

/// Page
///
/// A 1-based page of `size` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub size: u64,
}

impl Page {
    /// Returns `None` for missing, non-numeric or zero values; callers answer with an
    /// empty list in that case.
    pub fn from_params(params: &PageParams) -> Option<Self> {
        let number = params.page.as_deref()?.trim().parse::<u64>().ok()?;
        let size = params.size.as_deref()?.trim().parse::<u64>().ok()?;
        if number == 0 || size == 0 {
            return None;
        }
        Some(Self { number, size })
    }

    /// Number of records skipped before this page.
    pub fn offset(&self) -> u64 {
        (self.number - 1).saturating_mul(self.size)
    }
}

// --- Vote Adjustment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    /// Adds one to `upvote`.
    Up,
    /// Subtracts one from `downvote`.
    Down,
}

impl VoteKind {
    pub fn field(self) -> &'static str {
        match self {
            VoteKind::Up => "upvote",
            VoteKind::Down => "downvote",
        }
    }

    pub fn delta(self) -> i64 {
        match self {
            VoteKind::Up => 1,
            VoteKind::Down => -1,
        }
    }

    /// Applies the adjustment to an in-memory counter.
    pub fn apply(self, counter: &str) -> String {
        (parse_counter(counter) + self.delta()).to_string()
    }

    /// update_pipeline
    ///
    /// A single-document update pipeline that parses, adjusts and re-stringifies the
    /// counter server-side. The whole read-modify-write is one atomic update.
    pub fn update_pipeline(self) -> Vec<Document> {
        let field = self.field();
        vec![doc! {
            "$set": {
                field: {
                    "$toString": { "$add": [counter_expr(field), self.delta()] }
                }
            }
        }]
    }
}
