use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::StoreError;

// --- Validation ---

/// Validate
///
/// Implemented by every record accepted from a request body. Runs before the record
/// reaches the repository so malformed documents never get persisted.
pub trait Validate {
    fn validate(&self) -> Result<(), StoreError>;
}

fn require(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn require_email(field: &str, value: &str) -> Result<(), StoreError> {
    require(field, value)?;
    if !value.contains('@') {
        return Err(StoreError::Validation(format!("{field} must be an email address")));
    }
    Ok(())
}

fn require_counter(field: &str, value: &str) -> Result<(), StoreError> {
    value
        .parse::<i64>()
        .map(|_| ())
        .map_err(|_| StoreError::Validation(format!("{field} must be an integer")))
}

fn zero_count() -> String {
    "0".to_string()
}

// --- Stored Records ---

/// User
///
/// A forum member. Created on first sign-in; `role` is either absent or "admin".
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[ts(type = "{ $oid: string } | null")]
    #[schema(value_type = Option<Object>)]
    pub id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

impl Validate for User {
    fn validate(&self) -> Result<(), StoreError> {
        require_email("email", &self.email)
    }
}

/// Author
///
/// Embedded in every post. `email` is the key used to list a member's posts.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Author {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Post
///
/// Vote counters are stored as numeric strings; ranking parses them back to integers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Post {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[ts(type = "{ $oid: string } | null")]
    #[schema(value_type = Option<Object>)]
    pub id: Option<ObjectId>,
    pub title: String,
    pub author: Author,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "zero_count")]
    pub upvote: String,
    #[serde(default = "zero_count")]
    pub downvote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Validate for Post {
    fn validate(&self) -> Result<(), StoreError> {
        require("title", &self.title)?;
        require("author.name", &self.author.name)?;
        require_email("author.email", &self.author.email)?;
        require_counter("upvote", &self.upvote)?;
        require_counter("downvote", &self.downvote)
    }
}

/// Comment
///
/// Linked to its post by title only; nothing enforces that the post exists.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Comment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[ts(type = "{ $oid: string } | null")]
    #[schema(value_type = Option<Object>)]
    pub id: Option<ObjectId>,
    pub post_title: String,
    pub email: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Validate for Comment {
    fn validate(&self) -> Result<(), StoreError> {
        require("post_title", &self.post_title)?;
        require_email("email", &self.email)?;
        require("text", &self.text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Tag {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[ts(type = "{ $oid: string } | null")]
    #[schema(value_type = Option<Object>)]
    pub id: Option<ObjectId>,
    pub name: String,
}

impl Validate for Tag {
    fn validate(&self) -> Result<(), StoreError> {
        require("name", &self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Announcement {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[ts(type = "{ $oid: string } | null")]
    #[schema(value_type = Option<Object>)]
    pub id: Option<ObjectId>,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_image: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Validate for Announcement {
    fn validate(&self) -> Result<(), StoreError> {
        require("author_name", &self.author_name)?;
        require("title", &self.title)?;
        require("description", &self.description)
    }
}

/// Report
///
/// A member's complaint about a comment. Admins review and delete them.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Report {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[ts(type = "{ $oid: string } | null")]
    #[schema(value_type = Option<Object>)]
    pub id: Option<ObjectId>,
    pub comment_id: String,
    pub email: String,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Validate for Report {
    fn validate(&self) -> Result<(), StoreError> {
        require("comment_id", &self.comment_id)?;
        require_email("email", &self.email)?;
        require("feedback", &self.feedback)
    }
}

/// Payment
///
/// Recorded by the client after the processor confirms a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Payment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[ts(type = "{ $oid: string } | null")]
    #[schema(value_type = Option<Object>)]
    pub id: Option<ObjectId>,
    pub email: String,
    pub price: f64,
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Validate for Payment {
    fn validate(&self) -> Result<(), StoreError> {
        require_email("email", &self.email)?;
        require("transaction_id", &self.transaction_id)?;
        if !(self.price.is_finite() && self.price > 0.0) {
            return Err(StoreError::Validation("price must be positive".to_string()));
        }
        Ok(())
    }
}

// --- Request Payloads ---

/// Body of `POST /create-payment-intent`. `price` is in dollars.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PaymentIntentRequest {
    pub price: f64,
}

impl PaymentIntentRequest {
    /// Converts the dollar price to integer cents, rejecting non-positive amounts.
    pub fn amount_cents(&self) -> Result<i64, StoreError> {
        if !(self.price.is_finite() && self.price > 0.0) {
            return Err(StoreError::Validation("price must be positive".to_string()));
        }
        Ok((self.price * 100.0).round() as i64)
    }
}

// --- Response Payloads ---

/// Outcome of an insert. `inserted_id` is null when nothing was written.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InsertResult {
    pub acknowledged: bool,
    pub inserted_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InsertResult {
    pub fn inserted(id: ObjectId) -> Self {
        Self {
            acknowledged: true,
            inserted_id: Some(id.to_hex()),
            message: None,
        }
    }

    pub fn skipped(message: &str) -> Self {
        Self {
            acknowledged: true,
            inserted_id: None,
            message: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AdminStatus {
    pub admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CountResponse {
    pub count: u64,
}

/// AdminStats
///
/// Totals shown on the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct AdminStats {
    pub posts: u64,
    pub comments: u64,
    pub users: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}
