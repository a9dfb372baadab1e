use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-generated document identifier, serialized as `_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub rating: f64,
    pub likes: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub email: String,
    pub name: String,
    pub photo: Option<String>,
    pub rating: f64,
    pub review_text: String,
    pub recipe_id: String,
    pub recipe_name: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub likes: i64,
    #[serde(rename = "likedBy")]
    pub liked_by: Vec<String>,
    #[serde(rename = "bookmarkedBy")]
    pub bookmarked_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub email: Option<String>,
    pub recipe_id: Option<String>,
    /// Denormalized recipe snapshot supplied by the client. Never inspected.
    pub recipe: Option<serde_json::Value>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Partial recipe update. `None` leaves the stored field untouched, so a
/// patch can overwrite an optional field but never clear it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub rating: Option<f64>,
    pub likes: Option<i64>,
}

impl RecipeChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Partial review update. Same merge rule as [`RecipeChanges`]: a missing
/// field keeps its stored value and `photo`/`recipe_name` cannot be cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub photo: Option<String>,
    pub rating: Option<f64>,
    pub review_text: Option<String>,
    pub recipe_id: Option<String>,
    pub recipe_name: Option<String>,
}

impl ReviewChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub recipe_id: Option<String>,
    pub email: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Newest,
    TopRated,
    MostLiked,
}

/// Outcome of an update, shaped like a document-store acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
}

impl UpdateResult {
    pub fn new(matched: u64, modified: u64) -> Self {
        Self {
            acknowledged: true,
            matched_count: matched,
            modified_count: modified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertResult {
    pub acknowledged: bool,
    pub inserted_id: DocumentId,
}

impl InsertResult {
    pub fn new(id: DocumentId) -> Self {
        Self {
            acknowledged: true,
            inserted_id: id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

impl DeleteResult {
    pub fn new(deleted: u64) -> Self {
        Self {
            acknowledged: true,
            deleted_count: deleted,
        }
    }
}

/// Fixed-width RFC 3339 so that stored timestamps sort lexically.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DbError::CorruptTimestamp(s.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Corrupt document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt document id: {0}")]
    CorruptId(String),
    #[error("Corrupt timestamp: {0}")]
    CorruptTimestamp(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;
