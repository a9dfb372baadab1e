use async_trait::async_trait;

use super::model::*;

#[async_trait]
pub trait RecipeRepo: Send + Sync {
    async fn insert_recipe(&self, recipe: &Recipe) -> DbResult<()>;
    async fn get_recipe(&self, id: &DocumentId) -> DbResult<Recipe>;
    async fn list_recipes(
        &self,
        owner: Option<&str>,
        order: SortOrder,
        limit: Option<u32>,
    ) -> DbResult<Vec<Recipe>>;
    async fn update_recipe(&self, id: &DocumentId, changes: &RecipeChanges) -> DbResult<UpdateResult>;
    async fn delete_recipe(&self, id: &DocumentId) -> DbResult<DeleteResult>;
}

#[async_trait]
pub trait ReviewRepo: Send + Sync {
    async fn insert_review(&self, review: &Review) -> DbResult<()>;
    async fn get_review(&self, id: &DocumentId) -> DbResult<Review>;
    async fn list_reviews(
        &self,
        filter: &ReviewFilter,
        order: SortOrder,
        limit: Option<u32>,
    ) -> DbResult<Vec<Review>>;
    async fn list_bookmarked_reviews(&self, email: &str) -> DbResult<Vec<Review>>;
    async fn update_review(&self, id: &DocumentId, changes: &ReviewChanges) -> DbResult<UpdateResult>;
    async fn delete_review(&self, id: &DocumentId) -> DbResult<DeleteResult>;
    /// Adds `email` to `likedBy` and bumps `likes`, unless already present.
    /// Returns whether the like was recorded.
    async fn like_review(&self, id: &DocumentId, email: &str) -> DbResult<bool>;
    /// Flips bookmark membership, returning the new state.
    async fn toggle_bookmark(&self, id: &DocumentId, email: &str) -> DbResult<bool>;
}

#[async_trait]
pub trait FavoriteRepo: Send + Sync {
    async fn insert_favorite(&self, favorite: &Favorite) -> DbResult<()>;
    async fn list_favorites(&self, email: Option<&str>) -> DbResult<Vec<Favorite>>;
    async fn delete_favorite(&self, id: &DocumentId) -> DbResult<DeleteResult>;
}

#[async_trait]
pub trait Repository: RecipeRepo + ReviewRepo + FavoriteRepo + Send + Sync {
    async fn ping(&self) -> DbResult<()>;
    async fn close(&self);
}
