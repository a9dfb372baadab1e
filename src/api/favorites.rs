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
use crate::db::{DeleteResult, DocumentId, Favorite, FavoriteRepo, InsertResult};
use crate::server::AppState;
use crate::util::QueryParams;

/// Denormalized recipe data (name, image, rating...) goes under `recipe`.
/// Unknown top-level fields are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFavoriteRequest {
    #[serde(alias = "userEmail", alias = "user_email")]
    pub email: Option<String>,
    #[serde(alias = "recipeId")]
    pub recipe_id: Option<String>,
    pub recipe: Option<Value>,
}

pub async fn create_favorite(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateFavoriteRequest>,
) -> ApiResult<(StatusCode, Json<InsertResult>)> {
    let favorite = Favorite {
        id: DocumentId::new(),
        email: non_empty(req.email),
        recipe_id: req.recipe_id,
        recipe: req.recipe,
        created_at: Utc::now(),
    };

    state.db.insert_favorite(&favorite).await?;
    info!(id = %favorite.id, "favorite created");

    Ok((StatusCode::CREATED, Json(InsertResult::new(favorite.id))))
}

/// GET /favorites?email=
pub async fn list_favorites(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> ApiResult<Json<Vec<Favorite>>> {
    let email = params.get_any(&["email", "userEmail"]);
    let favorites = state.db.list_favorites(email).await?;
    Ok(Json(favorites))
}

pub async fn delete_favorite(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResult>> {
    let id = parse_id(&id)?;
    let result = state.db.delete_favorite(&id).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::NotFound(format!("Favorite not found: {}", id)));
    }
    Ok(Json(result))
}
