use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{non_empty, parse_id, ApiError, ApiResult, JsonBody};
use crate::db::{
    DeleteResult, DocumentId, InsertResult, Recipe, RecipeChanges, RecipeRepo, SortOrder,
    UpdateResult,
};
use crate::server::AppState;
use crate::util::{coerce_count, coerce_rating, QueryParams};

pub const FEATURED_RECIPES_LIMIT: u32 = 6;
pub const TOP_LIKED_RECIPES_LIMIT: u32 = 6;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRecipeRequest {
    pub name: Option<String>,
    #[serde(alias = "reviewer_email", alias = "userEmail", alias = "user_email")]
    pub email: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub rating: Option<Value>,
    pub likes: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRecipeRequest {
    pub name: Option<String>,
    #[serde(alias = "reviewer_email", alias = "userEmail", alias = "user_email")]
    pub email: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub rating: Option<Value>,
    pub likes: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LikesRequest {
    pub likes: Option<Value>,
}

/// Likes must be a non-negative integer, not a numeric string.
fn validate_likes(value: Option<&Value>) -> ApiResult<i64> {
    value
        .and_then(Value::as_u64)
        .and_then(|n| i64::try_from(n).ok())
        .ok_or_else(|| ApiError::BadRequest("likes must be a non-negative integer".to_string()))
}

/// GET /recipes?featured&email=
pub async fn list_recipes(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> ApiResult<Json<Vec<Recipe>>> {
    let recipes = if params.flag("featured") {
        state
            .db
            .list_recipes(None, SortOrder::TopRated, Some(FEATURED_RECIPES_LIMIT))
            .await?
    } else {
        let owner = params.get_any(&["email", "userEmail", "reviewer_email"]);
        state.db.list_recipes(owner, SortOrder::Newest, None).await?
    };
    Ok(Json(recipes))
}

pub async fn list_recipes_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Json<Vec<Recipe>>> {
    let recipes = state
        .db
        .list_recipes(Some(&email), SortOrder::Newest, None)
        .await?;
    Ok(Json(recipes))
}

pub async fn list_all_recipes(State(state): State<AppState>) -> ApiResult<Json<Vec<Recipe>>> {
    let recipes = state.db.list_recipes(None, SortOrder::Newest, None).await?;
    Ok(Json(recipes))
}

pub async fn list_top_liked_recipes(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Recipe>>> {
    let recipes = state
        .db
        .list_recipes(None, SortOrder::MostLiked, Some(TOP_LIKED_RECIPES_LIMIT))
        .await?;
    Ok(Json(recipes))
}

pub async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Recipe>> {
    let id = parse_id(&id)?;
    let recipe = state.db.get_recipe(&id).await?;
    Ok(Json(recipe))
}

pub async fn create_recipe(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateRecipeRequest>,
) -> ApiResult<(StatusCode, Json<InsertResult>)> {
    let recipe = Recipe {
        id: DocumentId::new(),
        name: req.name,
        email: non_empty(req.email),
        image: req.image,
        description: req.description,
        category: req.category,
        rating: coerce_rating(req.rating.as_ref()),
        likes: coerce_count(req.likes.as_ref()),
        created_at: Utc::now(),
    };

    state.db.insert_recipe(&recipe).await?;
    info!(id = %recipe.id, "recipe created");

    Ok((StatusCode::CREATED, Json(InsertResult::new(recipe.id))))
}

/// PATCH /recipes-likes/:id
pub async fn update_recipe_likes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<LikesRequest>,
) -> ApiResult<Json<UpdateResult>> {
    let id = parse_id(&id)?;
    let likes = validate_likes(req.likes.as_ref())?;

    let changes = RecipeChanges {
        likes: Some(likes),
        ..Default::default()
    };
    let result = state.db.update_recipe(&id, &changes).await?;
    if result.matched_count == 0 {
        return Err(ApiError::NotFound(format!("Recipe not found: {}", id)));
    }
    Ok(Json(result))
}

/// PATCH /recipes/:id, 404 when no stored value changed.
pub async fn update_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateRecipeRequest>,
) -> ApiResult<Json<UpdateResult>> {
    let id = parse_id(&id)?;

    let changes = RecipeChanges {
        name: req.name,
        email: non_empty(req.email),
        image: req.image,
        description: req.description,
        category: req.category,
        rating: req.rating.as_ref().map(|r| coerce_rating(Some(r))),
        likes: req
            .likes
            .as_ref()
            .map(|l| validate_likes(Some(l)))
            .transpose()?,
    };
    if changes.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let result = state.db.update_recipe(&id, &changes).await?;
    if result.modified_count == 0 {
        return Err(ApiError::NotFound(format!("Recipe not found or unchanged: {}", id)));
    }
    Ok(Json(result))
}

pub async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResult>> {
    let id = parse_id(&id)?;
    let result = state.db.delete_recipe(&id).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::NotFound(format!("Recipe not found: {}", id)));
    }
    info!(id = %id, "recipe deleted");
    Ok(Json(result))
}
