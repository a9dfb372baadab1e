use axum::{
    extract::Request,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api;
use crate::config::Config;
use crate::db::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<SqliteStore>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<SqliteStore>) -> Self {
        Self {
            config: Arc::new(config),
            db,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let recipe_routes = Router::new()
        .route(
            "/recipes",
            get(api::list_recipes).post(api::create_recipe),
        )
        .route(
            "/recipes/:id",
            get(api::get_recipe)
                .patch(api::update_recipe)
                .delete(api::delete_recipe),
        )
        .route("/recipes/email/:email", get(api::list_recipes_by_email))
        .route("/recipes-likes/:id", patch(api::update_recipe_likes))
        .route("/all-recipes", get(api::list_all_recipes))
        .route("/all-recipes/like", get(api::list_top_liked_recipes));

    let review_routes = Router::new()
        .route(
            "/reviews",
            get(api::list_reviews).post(api::create_review),
        )
        .route(
            "/reviews/:id",
            get(api::get_review)
                .patch(api::update_review)
                .delete(api::delete_review),
        )
        .route("/reviews/:id/bookmark", patch(api::toggle_review_bookmark))
        .route("/reviews/email/:email", get(api::list_reviews_by_email))
        .route(
            "/reviews/bookmarked/:email",
            get(api::list_bookmarked_reviews),
        )
        .route("/reviews-likes/:id", patch(api::like_review))
        .route("/all-reviews", get(api::list_all_reviews))
        .route("/all-reviews/like", get(api::list_top_liked_reviews));

    let favorite_routes = Router::new()
        .route(
            "/favorites",
            get(api::list_favorites).post(api::create_favorite),
        )
        .route("/favorites/:id", axum::routing::delete(api::delete_favorite));

    Router::new()
        .route("/", get(api::banner_handler))
        .route("/health", get(api::health_handler))
        .merge(recipe_routes)
        .merge(review_routes)
        .merge(favorite_routes)
        .fallback(fallback_handler)
        .layer(axum::middleware::from_fn(crate::middleware::log_request))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback_handler(req: Request) -> impl IntoResponse {
    if req.method() == axum::http::Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    (
        StatusCode::NOT_FOUND,
        axum::Json(api::ErrorResponse {
            message: format!("No route for {} {}", req.method(), req.uri().path()),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let db = Arc::new(SqliteStore::in_memory().await.unwrap());
        build_router(AppState::new(Config::default(), db))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn create(app: &Router, uri: &str, body: Value) -> String {
        let (status, ack) = call(app, Method::POST, uri, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", ack);
        assert_eq!(ack["acknowledged"], true);
        ack["insertedId"].as_str().unwrap().to_string()
    }

    fn review_body(recipe_id: &str) -> Value {
        json!({
            "email": "ann@example.com",
            "name": "Ann",
            "rating": "4",
            "review_text": "Great noodles",
            "recipe_id": recipe_id,
            "recipe_name": "Pad Thai",
        })
    }

    #[tokio::test]
    async fn test_banner_and_health() {
        let app = test_app().await;
        let (status, body) = call(&app, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Local Food Lovers Network server is running");

        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Healthy");

        let (status, _) = call(&app, Method::GET, "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recipe_likes_scenario() {
        let app = test_app().await;
        let id = create(&app, "/recipes", json!({"name": "Pad Thai", "rating": "4.5"})).await;

        let (status, recipe) = call(&app, Method::GET, &format!("/recipes/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(recipe["rating"], 4.5);
        assert_eq!(recipe["likes"], 0);
        assert!(recipe["createdAt"].is_string());

        let uri = format!("/recipes-likes/{}", id);
        let (status, ack) = call(&app, Method::PATCH, &uri, Some(json!({"likes": 5}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["matchedCount"], 1);

        let (_, recipe) = call(&app, Method::GET, &format!("/recipes/{}", id), None).await;
        assert_eq!(recipe["likes"], 5);

        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"likes": -1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"likes": "7"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, recipe) = call(&app, Method::GET, &format!("/recipes/{}", id), None).await;
        assert_eq!(recipe["likes"], 5);
    }

    #[tokio::test]
    async fn test_recipe_coercion_defaults() {
        let app = test_app().await;
        let id = create(&app, "/recipes", json!({"name": "Soup", "rating": "tasty", "likes": "many"})).await;
        let (_, recipe) = call(&app, Method::GET, &format!("/recipes/{}", id), None).await;
        assert_eq!(recipe["rating"], 0.0);
        assert_eq!(recipe["likes"], 0);

        let id = create(&app, "/recipes", json!({})).await;
        let (_, recipe) = call(&app, Method::GET, &format!("/recipes/{}", id), None).await;
        assert_eq!(recipe["rating"], 0.0);
        assert_eq!(recipe["likes"], 0);
        assert!(recipe["name"].is_null());
    }

    #[tokio::test]
    async fn test_recipe_errors() {
        let app = test_app().await;
        let missing = crate::db::DocumentId::new();

        let (status, _) = call(&app, Method::GET, &format!("/recipes/{}", missing), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = call(&app, Method::GET, "/recipes/not-an-id", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("not-an-id"));

        let uri = format!("/recipes-likes/{}", missing);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"likes": 1}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/recipes/{}", missing);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::POST, "/recipes", Some(json!({"owner": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_recipe_update_and_listings() {
        let app = test_app().await;
        let a = create(&app, "/recipes", json!({"name": "A", "email": "cook@x.com", "rating": 3})).await;
        let b = create(&app, "/recipes", json!({"name": "B", "reviewer_email": "cook@x.com", "rating": 5, "likes": 2})).await;
        let _c = create(&app, "/recipes", json!({"name": "C", "email": "other@x.com", "rating": 4, "likes": 9})).await;

        let uri = format!("/recipes/{}", a);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"name": "A2", "rating": "4.25"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, recipe) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(recipe["name"], "A2");
        assert_eq!(recipe["rating"], 4.25);
        assert_eq!(recipe["email"], "cook@x.com");

        let (_, owned) = call(&app, Method::GET, "/recipes?email=cook@x.com", None).await;
        assert_eq!(owned.as_array().unwrap().len(), 2);
        let (_, owned) = call(&app, Method::GET, "/recipes/email/cook@x.com", None).await;
        assert_eq!(owned.as_array().unwrap().len(), 2);

        let (_, featured) = call(&app, Method::GET, "/recipes?featured=true", None).await;
        assert_eq!(featured[0]["_id"], b);

        let (_, all) = call(&app, Method::GET, "/all-recipes", None).await;
        assert_eq!(all.as_array().unwrap().len(), 3);
        assert_eq!(all[0]["name"], "C");

        let (_, liked) = call(&app, Method::GET, "/all-recipes/like", None).await;
        assert_eq!(liked[0]["name"], "C");
        assert_eq!(liked[1]["_id"], b);

        let (status, ack) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["deletedCount"], 1);
        let (status, _) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_review_create_requires_fields() {
        let app = test_app().await;
        let mut body = review_body("r1");
        body.as_object_mut().unwrap().remove("review_text");
        let (status, body) = call(&app, Method::POST, "/reviews", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "review_text is required");

        let mut body = review_body("r1");
        body["rating"] = Value::Null;
        let (status, _) = call(&app, Method::POST, "/reviews", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut body = review_body("r1");
        body["email"] = json!("  ");
        let (status, _) = call(&app, Method::POST, "/reviews", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let id = create(&app, "/reviews", review_body("r1")).await;
        let (_, review) = call(&app, Method::GET, &format!("/reviews/{}", id), None).await;
        assert_eq!(review["rating"], 4.0);
        assert_eq!(review["likes"], 0);
        assert_eq!(review["likedBy"], json!([]));
        assert_eq!(review["bookmarkedBy"], json!([]));
    }

    #[tokio::test]
    async fn test_review_like_is_idempotent() {
        let app = test_app().await;
        let id = create(&app, "/reviews", review_body("r1")).await;
        let uri = format!("/reviews-likes/{}", id);

        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, first) = call(&app, Method::PATCH, &uri, Some(json!({"userEmail": "bob@x.com"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["likes"], 1);
        assert_eq!(first["likedBy"], json!(["bob@x.com"]));

        let (status, second) = call(&app, Method::PATCH, &uri, Some(json!({"userEmail": "bob@x.com"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["likes"], first["likes"]);
        assert_eq!(second["likedBy"], first["likedBy"]);

        let missing = format!("/reviews-likes/{}", crate::db::DocumentId::new());
        let (status, _) = call(&app, Method::PATCH, &missing, Some(json!({"userEmail": "bob@x.com"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_review_bookmark_round_trip() {
        let app = test_app().await;
        let id = create(&app, "/reviews", review_body("r1")).await;
        let uri = format!("/reviews/{}/bookmark", id);
        let who = json!({"userEmail": "bob@x.com"});

        let (status, body) = call(&app, Method::PATCH, &uri, Some(who.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "bookmarked": true}));

        let (_, marked) = call(&app, Method::GET, "/reviews/bookmarked/bob@x.com", None).await;
        assert_eq!(marked.as_array().unwrap().len(), 1);
        assert_eq!(marked[0]["_id"], id);

        let (_, body) = call(&app, Method::PATCH, &uri, Some(who)).await;
        assert_eq!(body["bookmarked"], false);
        let (_, marked) = call(&app, Method::GET, "/reviews/bookmarked/bob@x.com", None).await;
        assert!(marked.as_array().unwrap().is_empty());
        let (_, review) = call(&app, Method::GET, &format!("/reviews/{}", id), None).await;
        assert_eq!(review["bookmarkedBy"], json!([]));
    }

    #[tokio::test]
    async fn test_review_filters_update_delete() {
        let app = test_app().await;
        let first = create(&app, "/reviews", review_body("r1")).await;
        let mut other = review_body("r2");
        other["email"] = json!("bob@x.com");
        other["recipe_name"] = json!("Green Curry");
        create(&app, "/reviews", other).await;

        let (_, found) = call(&app, Method::GET, "/reviews?recipeId=r1", None).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        let (_, found) = call(&app, Method::GET, "/reviews?email=bob@x.com", None).await;
        assert_eq!(found[0]["recipe_id"], "r2");
        let (_, found) = call(&app, Method::GET, "/reviews/email/bob@x.com", None).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        let (_, found) = call(&app, Method::GET, "/reviews?search=curry", None).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        let (_, found) = call(&app, Method::GET, "/reviews", None).await;
        assert_eq!(found.as_array().unwrap().len(), 2);
        let (_, found) = call(&app, Method::GET, "/all-reviews/like", None).await;
        assert_eq!(found.as_array().unwrap().len(), 2);

        let uri = format!("/reviews/{}", first);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"review_text": "Even better"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, review) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(review["review_text"], "Even better");

        let (status, _) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_patch_with_identical_values_is_not_found() {
        let app = test_app().await;
        let id = create(&app, "/recipes", json!({"name": "Pad Thai", "rating": 4})).await;
        let uri = format!("/recipes/{}", id);

        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"name": "Pad Thai"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"name": "Pad Thai", "rating": "4"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, ack) = call(&app, Method::PATCH, &uri, Some(json!({"name": "Pad See Ew"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, json!({"acknowledged": true, "matchedCount": 1, "modifiedCount": 1}));

        // Likes-only update still succeeds when the count is unchanged.
        let likes_uri = format!("/recipes-likes/{}", id);
        let (status, ack) = call(&app, Method::PATCH, &likes_uri, Some(json!({"likes": 0}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["matchedCount"], 1);
        assert_eq!(ack["modifiedCount"], 0);

        let review = create(&app, "/reviews", review_body(&id)).await;
        let uri = format!("/reviews/{}", review);
        let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"review_text": "Great noodles"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, ack) = call(&app, Method::PATCH, &uri, Some(json!({"review_text": "Good noodles"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["modifiedCount"], 1);
    }

    #[tokio::test]
    async fn test_favorite_rejects_top_level_recipe_fields() {
        let app = test_app().await;
        let body = json!({"email": "ann@x.com", "name": "Pad Thai", "image": "p.jpg"});
        let (status, _) = call(&app, Method::POST, "/favorites", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = json!({"email": "ann@x.com", "recipe": {"name": "Pad Thai", "image": "p.jpg"}});
        create(&app, "/favorites", body).await;
    }

    #[tokio::test]
    async fn test_favorites() {
        let app = test_app().await;
        let body = json!({"userEmail": "ann@x.com", "recipe_id": "r1", "recipe": {"name": "Pad Thai"}});
        let id = create(&app, "/favorites", body.clone()).await;
        create(&app, "/favorites", body).await;
        create(&app, "/favorites", json!({"email": "bob@x.com"})).await;

        let (_, mine) = call(&app, Method::GET, "/favorites?email=ann@x.com", None).await;
        assert_eq!(mine.as_array().unwrap().len(), 2);
        assert_eq!(mine[0]["recipe"]["name"], "Pad Thai");
        let (_, all) = call(&app, Method::GET, "/favorites", None).await;
        assert_eq!(all.as_array().unwrap().len(), 3);

        let uri = format!("/favorites/{}", id);
        let (status, ack) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["deletedCount"], 1);
        let (status, _) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, "/favorites/garbage", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
