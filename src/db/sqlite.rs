use std::fmt::Write;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::model::*;
use super::repo::*;

const RECIPE_COLUMNS: &str =
    "id, name, email, image, description, category, rating, likes, created_at";

type RecipeRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    f64,
    i64,
    String,
);

// likedBy / bookmarkedBy come back as JSON arrays.
const REVIEW_COLUMNS: &str = "r.id, r.email, r.name, r.photo, r.rating, r.review_text, r.recipe_id, \
     r.recipe_name, r.likes, r.created_at, \
     (SELECT json_group_array(l.email) FROM review_likes l WHERE l.review_id = r.id), \
     (SELECT json_group_array(b.email) FROM review_bookmarks b WHERE b.review_id = r.id)";

type ReviewRow = (
    String,
    String,
    String,
    Option<String>,
    f64,
    String,
    String,
    Option<String>,
    i64,
    String,
    String,
    String,
);

type FavoriteRow = (String, Option<String>, Option<String>, Option<String>, String);

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(db_path: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        info!("Database initialized at {}", db_path);

        Ok(store)
    }

    /// Private in-memory database. A single pinned connection keeps it alive.
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> DbResult<()> {
        let schema = include_str!("schema.sql");
        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }
}

fn parse_id(s: &str) -> DbResult<DocumentId> {
    DocumentId::from_str(s).map_err(|_| DbError::CorruptId(s.to_string()))
}

/// Search key for a name. SQLite's `lower()` only folds ASCII.
fn fold(s: &str) -> String {
    s.to_lowercase()
}

async fn count_matching(conn: &mut SqliteConnection, table: &str, id: &str) -> DbResult<u64> {
    let query = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table);
    let (count,) = sqlx::query_as::<_, (i64,)>(&query)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count.max(0) as u64)
}

fn order_clause(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Newest => "created_at DESC, rowid DESC",
        SortOrder::TopRated => "rating DESC, created_at DESC",
        SortOrder::MostLiked => "likes DESC, created_at DESC",
    }
}

fn recipe_from_row(r: RecipeRow) -> DbResult<Recipe> {
    Ok(Recipe {
        id: parse_id(&r.0)?,
        name: r.1,
        email: r.2,
        image: r.3,
        description: r.4,
        category: r.5,
        rating: r.6,
        likes: r.7,
        created_at: parse_timestamp(&r.8)?,
    })
}

fn review_from_row(r: ReviewRow) -> DbResult<Review> {
    Ok(Review {
        id: parse_id(&r.0)?,
        email: r.1,
        name: r.2,
        photo: r.3,
        rating: r.4,
        review_text: r.5,
        recipe_id: r.6,
        recipe_name: r.7,
        likes: r.8,
        created_at: parse_timestamp(&r.9)?,
        liked_by: serde_json::from_str(&r.10)?,
        bookmarked_by: serde_json::from_str(&r.11)?,
    })
}

fn favorite_from_row(r: FavoriteRow) -> DbResult<Favorite> {
    Ok(Favorite {
        id: parse_id(&r.0)?,
        email: r.1,
        recipe_id: r.2,
        recipe: r.3.as_deref().map(|s| serde_json::from_str(s)).transpose()?,
        created_at: parse_timestamp(&r.4)?,
    })
}

#[async_trait]
impl RecipeRepo for SqliteStore {
    async fn insert_recipe(&self, recipe: &Recipe) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO recipes
            (id, name, email, image, description, category, rating, likes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(recipe.id.to_string())
        .bind(&recipe.name)
        .bind(&recipe.email)
        .bind(&recipe.image)
        .bind(&recipe.description)
        .bind(&recipe.category)
        .bind(recipe.rating)
        .bind(recipe.likes)
        .bind(format_timestamp(&recipe.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_recipe(&self, id: &DocumentId) -> DbResult<Recipe> {
        let query = format!("SELECT {} FROM recipes WHERE id = ?", RECIPE_COLUMNS);
        let row = sqlx::query_as::<_, RecipeRow>(&query)
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => DbError::NotFound(format!("Recipe not found: {}", id)),
                _ => DbError::Sqlx(e),
            })?;
        recipe_from_row(row)
    }

    async fn list_recipes(
        &self,
        owner: Option<&str>,
        order: SortOrder,
        limit: Option<u32>,
    ) -> DbResult<Vec<Recipe>> {
        let mut query = format!("SELECT {} FROM recipes", RECIPE_COLUMNS);
        if owner.is_some() {
            query.push_str(" WHERE email = ?");
        }
        let _ = write!(&mut query, " ORDER BY {}", order_clause(order));
        if let Some(limit) = limit {
            let _ = write!(&mut query, " LIMIT {}", limit);
        }

        let mut q = sqlx::query_as::<_, RecipeRow>(&query);
        if let Some(owner) = owner {
            q = q.bind(owner);
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.into_iter().map(recipe_from_row).collect()
    }

    async fn update_recipe(&self, id: &DocumentId, changes: &RecipeChanges) -> DbResult<UpdateResult> {
        let id_str = id.to_string();
        let mut tx = self.pool.begin().await?;

        // Rows whose values would not change are left out of the update.
        let modified = sqlx::query(
            "UPDATE recipes SET
                name = COALESCE(?1, name),
                email = COALESCE(?2, email),
                image = COALESCE(?3, image),
                description = COALESCE(?4, description),
                category = COALESCE(?5, category),
                rating = COALESCE(?6, rating),
                likes = COALESCE(?7, likes)
            WHERE id = ?8 AND NOT (
                name IS COALESCE(?1, name)
                AND email IS COALESCE(?2, email)
                AND image IS COALESCE(?3, image)
                AND description IS COALESCE(?4, description)
                AND category IS COALESCE(?5, category)
                AND rating IS COALESCE(?6, rating)
                AND likes IS COALESCE(?7, likes)
            )",
        )
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(&changes.image)
        .bind(&changes.description)
        .bind(&changes.category)
        .bind(changes.rating)
        .bind(changes.likes)
        .bind(&id_str)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let matched = if modified > 0 {
            modified
        } else {
            count_matching(&mut tx, "recipes", &id_str).await?
        };

        tx.commit().await?;
        Ok(UpdateResult::new(matched, modified))
    }

    async fn delete_recipe(&self, id: &DocumentId) -> DbResult<DeleteResult> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(DeleteResult::new(result.rows_affected()))
    }
}

#[async_trait]
impl ReviewRepo for SqliteStore {
    async fn insert_review(&self, review: &Review) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO reviews
            (id, email, name, photo, rating, review_text, recipe_id, recipe_name, likes, created_at,
             name_key, recipe_name_key)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(review.id.to_string())
        .bind(&review.email)
        .bind(&review.name)
        .bind(&review.photo)
        .bind(review.rating)
        .bind(&review.review_text)
        .bind(&review.recipe_id)
        .bind(&review.recipe_name)
        .bind(review.likes)
        .bind(format_timestamp(&review.created_at))
        .bind(fold(&review.name))
        .bind(review.recipe_name.as_deref().map(fold))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_review(&self, id: &DocumentId) -> DbResult<Review> {
        let query = format!("SELECT {} FROM reviews r WHERE r.id = ?", REVIEW_COLUMNS);
        let row = sqlx::query_as::<_, ReviewRow>(&query)
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => DbError::NotFound(format!("Review not found: {}", id)),
                _ => DbError::Sqlx(e),
            })?;
        review_from_row(row)
    }

    async fn list_reviews(
        &self,
        filter: &ReviewFilter,
        order: SortOrder,
        limit: Option<u32>,
    ) -> DbResult<Vec<Review>> {
        let mut conditions = Vec::new();
        let mut binds: Vec<&str> = Vec::new();
        let search = filter.search.as_deref().map(fold);

        if let Some(ref recipe_id) = filter.recipe_id {
            conditions.push("r.recipe_id = ?");
            binds.push(recipe_id);
        }
        if let Some(ref email) = filter.email {
            conditions.push("r.email = ?");
            binds.push(email);
        }
        if let Some(ref search) = search {
            conditions.push(
                "(instr(COALESCE(r.recipe_name_key, ''), ?) > 0 OR instr(r.name_key, ?) > 0)",
            );
            binds.push(search);
            binds.push(search);
        }

        let mut query = format!("SELECT {} FROM reviews r", REVIEW_COLUMNS);
        if !conditions.is_empty() {
            let _ = write!(&mut query, " WHERE {}", conditions.join(" AND "));
        }
        let _ = write!(&mut query, " ORDER BY {}", order_clause(order));
        if let Some(limit) = limit {
            let _ = write!(&mut query, " LIMIT {}", limit);
        }
        debug!(query = %query, "listing reviews");

        let mut q = sqlx::query_as::<_, ReviewRow>(&query);
        for value in binds {
            q = q.bind(value);
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.into_iter().map(review_from_row).collect()
    }

    async fn list_bookmarked_reviews(&self, email: &str) -> DbResult<Vec<Review>> {
        let query = format!(
            "SELECT {} FROM reviews r
             WHERE EXISTS (SELECT 1 FROM review_bookmarks m WHERE m.review_id = r.id AND m.email = ?)
             ORDER BY {}",
            REVIEW_COLUMNS,
            order_clause(SortOrder::Newest)
        );
        let rows = sqlx::query_as::<_, ReviewRow>(&query)
            .bind(email)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(review_from_row).collect()
    }

    async fn update_review(&self, id: &DocumentId, changes: &ReviewChanges) -> DbResult<UpdateResult> {
        let id_str = id.to_string();
        let mut tx = self.pool.begin().await?;

        let modified = sqlx::query(
            "UPDATE reviews SET
                email = COALESCE(?1, email),
                name = COALESCE(?2, name),
                photo = COALESCE(?3, photo),
                rating = COALESCE(?4, rating),
                review_text = COALESCE(?5, review_text),
                recipe_id = COALESCE(?6, recipe_id),
                recipe_name = COALESCE(?7, recipe_name),
                name_key = COALESCE(?8, name_key),
                recipe_name_key = COALESCE(?9, recipe_name_key)
            WHERE id = ?10 AND NOT (
                email IS COALESCE(?1, email)
                AND name IS COALESCE(?2, name)
                AND photo IS COALESCE(?3, photo)
                AND rating IS COALESCE(?4, rating)
                AND review_text IS COALESCE(?5, review_text)
                AND recipe_id IS COALESCE(?6, recipe_id)
                AND recipe_name IS COALESCE(?7, recipe_name)
            )",
        )
        .bind(&changes.email)
        .bind(&changes.name)
        .bind(&changes.photo)
        .bind(changes.rating)
        .bind(&changes.review_text)
        .bind(&changes.recipe_id)
        .bind(&changes.recipe_name)
        .bind(changes.name.as_deref().map(fold))
        .bind(changes.recipe_name.as_deref().map(fold))
        .bind(&id_str)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let matched = if modified > 0 {
            modified
        } else {
            count_matching(&mut tx, "reviews", &id_str).await?
        };

        tx.commit().await?;
        Ok(UpdateResult::new(matched, modified))
    }

    async fn delete_review(&self, id: &DocumentId) -> DbResult<DeleteResult> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(DeleteResult::new(result.rows_affected()))
    }

    async fn like_review(&self, id: &DocumentId, email: &str) -> DbResult<bool> {
        let id_str = id.to_string();
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction takes the write lock up front.
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO review_likes (review_id, email, created_at)
             SELECT id, ?, ? FROM reviews WHERE id = ?",
        )
        .bind(email)
        .bind(format_timestamp(&Utc::now()))
        .bind(&id_str)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            sqlx::query("UPDATE reviews SET likes = likes + 1 WHERE id = ?")
                .bind(&id_str)
                .execute(&mut *tx)
                .await?;
        } else if count_matching(&mut tx, "reviews", &id_str).await? == 0 {
            return Err(DbError::NotFound(format!("Review not found: {}", id)));
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn toggle_bookmark(&self, id: &DocumentId, email: &str) -> DbResult<bool> {
        let id_str = id.to_string();
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM review_bookmarks WHERE review_id = ? AND email = ?")
            .bind(&id_str)
            .bind(email)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed > 0 {
            tx.commit().await?;
            return Ok(false);
        }

        let added = sqlx::query(
            "INSERT INTO review_bookmarks (review_id, email, created_at)
             SELECT id, ?, ? FROM reviews WHERE id = ?",
        )
        .bind(email)
        .bind(format_timestamp(&Utc::now()))
        .bind(&id_str)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if added == 0 {
            return Err(DbError::NotFound(format!("Review not found: {}", id)));
        }

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl FavoriteRepo for SqliteStore {
    async fn insert_favorite(&self, favorite: &Favorite) -> DbResult<()> {
        let recipe = favorite
            .recipe
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO favorites (id, email, recipe_id, recipe, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(favorite.id.to_string())
        .bind(&favorite.email)
        .bind(&favorite.recipe_id)
        .bind(recipe)
        .bind(format_timestamp(&favorite.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_favorites(&self, email: Option<&str>) -> DbResult<Vec<Favorite>> {
        let mut query = "SELECT id, email, recipe_id, recipe, created_at FROM favorites".to_string();
        if email.is_some() {
            query.push_str(" WHERE email = ?");
        }
        query.push_str(" ORDER BY created_at DESC, rowid DESC");

        let mut q = sqlx::query_as::<_, FavoriteRow>(&query);
        if let Some(email) = email {
            q = q.bind(email);
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.into_iter().map(favorite_from_row).collect()
    }

    async fn delete_favorite(&self, id: &DocumentId) -> DbResult<DeleteResult> {
        let result = sqlx::query("DELETE FROM favorites WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(DeleteResult::new(result.rows_affected()))
    }
}

#[async_trait]
impl Repository for SqliteStore {
    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
