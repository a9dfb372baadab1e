use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{non_empty, parse_id, ApiError, ApiResult, JsonBody};
use crate::db::{
    DeleteResult, DocumentId, InsertResult, Review, ReviewChanges, ReviewFilter, ReviewRepo,
    SortOrder, UpdateResult,
};
use crate::server::AppState;
use crate::util::{coerce_count, coerce_rating, QueryParams};

pub const TOP_LIKED_REVIEWS_LIMIT: u32 = 6;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReviewRequest {
    #[serde(alias = "reviewer_email", alias = "userEmail", alias = "user_email")]
    pub email: Option<String>,
    #[serde(alias = "reviewer_name")]
    pub name: Option<String>,
    #[serde(alias = "reviewer_photo")]
    pub photo: Option<String>,
    pub rating: Option<Value>,
    #[serde(alias = "reviewText")]
    pub review_text: Option<String>,
    #[serde(alias = "recipeId")]
    pub recipe_id: Option<String>,
    #[serde(alias = "recipeName", alias = "food_name", alias = "foodName")]
    pub recipe_name: Option<String>,
    pub likes: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateReviewRequest {
    #[serde(alias = "reviewer_email", alias = "userEmail", alias = "user_email")]
    pub email: Option<String>,
    #[serde(alias = "reviewer_name")]
    pub name: Option<String>,
    #[serde(alias = "reviewer_photo")]
    pub photo: Option<String>,
    pub rating: Option<Value>,
    #[serde(alias = "reviewText")]
    pub review_text: Option<String>,
    #[serde(alias = "recipeId")]
    pub recipe_id: Option<String>,
    #[serde(alias = "recipeName", alias = "food_name", alias = "foodName")]
    pub recipe_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserEmailRequest {
    #[serde(rename = "userEmail", alias = "user_email", alias = "email")]
    pub user_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookmarkResponse {
    pub success: bool,
    pub bookmarked: bool,
}

fn require(field: &str, value: Option<String>) -> ApiResult<String> {
    non_empty(value).ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))
}

fn require_user_email(req: UserEmailRequest) -> ApiResult<String> {
    require("userEmail", req.user_email)
}

/// GET /reviews?recipeId=&email=&search=
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> ApiResult<Json<Vec<Review>>> {
    let filter = ReviewFilter {
        recipe_id: params.get("recipeId").map(str::to_string),
        email: params
            .get_any(&["email", "userEmail", "reviewer_email"])
            .map(str::to_string),
        search: params.get("search").map(str::to_string),
    };
    let reviews = state
        .db
        .list_reviews(&filter, SortOrder::Newest, None)
        .await?;
    Ok(Json(reviews))
}

pub async fn list_reviews_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Json<Vec<Review>>> {
    let filter = ReviewFilter {
        email: Some(email),
        ..Default::default()
    };
    let reviews = state
        .db
        .list_reviews(&filter, SortOrder::Newest, None)
        .await?;
    Ok(Json(reviews))
}

pub async fn list_all_reviews(State(state): State<AppState>) -> ApiResult<Json<Vec<Review>>> {
    let reviews = state
        .db
        .list_reviews(&ReviewFilter::default(), SortOrder::Newest, None)
        .await?;
    Ok(Json(reviews))
}

pub async fn list_top_liked_reviews(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Review>>> {
    let reviews = state
        .db
        .list_reviews(
            &ReviewFilter::default(),
            SortOrder::MostLiked,
            Some(TOP_LIKED_REVIEWS_LIMIT),
        )
        .await?;
    Ok(Json(reviews))
}

pub async fn list_bookmarked_reviews(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Json<Vec<Review>>> {
    let reviews = state.db.list_bookmarked_reviews(&email).await?;
    Ok(Json(reviews))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Review>> {
    let id = parse_id(&id)?;
    let review = state.db.get_review(&id).await?;
    Ok(Json(review))
}

pub async fn create_review(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<InsertResult>)> {
    if req.rating.as_ref().map_or(true, Value::is_null) {
        return Err(ApiError::BadRequest("rating is required".to_string()));
    }

    let review = Review {
        id: DocumentId::new(),
        email: require("email", req.email)?,
        name: require("name", req.name)?,
        photo: req.photo,
        rating: coerce_rating(req.rating.as_ref()),
        review_text: require("review_text", req.review_text)?,
        recipe_id: require("recipe_id", req.recipe_id)?,
        recipe_name: req.recipe_name,
        created_at: Utc::now(),
        likes: coerce_count(req.likes.as_ref()),
        liked_by: Vec::new(),
        bookmarked_by: Vec::new(),
    };

    state.db.insert_review(&review).await?;
    info!(id = %review.id, recipe = %review.recipe_id, "review created");

    Ok((StatusCode::CREATED, Json(InsertResult::new(review.id))))
}

/// PATCH /reviews-likes/:id
///
/// Repeating a like from the same user returns the review unchanged.
pub async fn like_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UserEmailRequest>,
) -> ApiResult<Json<Review>> {
    let id = parse_id(&id)?;
    let user_email = require_user_email(req)?;

    let recorded = state.db.like_review(&id, &user_email).await?;
    debug!(review = %id, user = %user_email, recorded, "review like");

    let review = state.db.get_review(&id).await?;
    Ok(Json(review))
}

/// PATCH /reviews/:id/bookmark
pub async fn toggle_review_bookmark(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UserEmailRequest>,
) -> ApiResult<Json<BookmarkResponse>> {
    let id = parse_id(&id)?;
    let user_email = require_user_email(req)?;

    let bookmarked = state.db.toggle_bookmark(&id, &user_email).await?;
    debug!(review = %id, user = %user_email, bookmarked, "review bookmark");

    Ok(Json(BookmarkResponse {
        success: true,
        bookmarked,
    }))
}

/// PATCH /reviews/:id, 404 when no stored value changed.
pub async fn update_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateReviewRequest>,
) -> ApiResult<Json<UpdateResult>> {
    let id = parse_id(&id)?;

    let changes = ReviewChanges {
        email: non_empty(req.email),
        name: non_empty(req.name),
        photo: req.photo,
        rating: req.rating.as_ref().map(|r| coerce_rating(Some(r))),
        review_text: non_empty(req.review_text),
        recipe_id: non_empty(req.recipe_id),
        recipe_name: req.recipe_name,
    };
    if changes.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let result = state.db.update_review(&id, &changes).await?;
    if result.modified_count == 0 {
        return Err(ApiError::NotFound(format!("Review not found or unchanged: {}", id)));
    }
    Ok(Json(result))
}

pub async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResult>> {
    let id = parse_id(&id)?;
    let result = state.db.delete_review(&id).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::NotFound(format!("Review not found: {}", id)));
    }
    info!(id = %id, "review deleted");
    Ok(Json(result))
}
