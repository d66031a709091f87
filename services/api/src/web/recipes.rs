//! services/api/src/web/recipes.rs
//!
//! REST handlers for the assistant's recipe and vendor features and the
//! saved-recipe collection.

use crate::error::{HttpError, HttpResult};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use reminders_core::assistant::{RecipeRequest, VendorQuery};
use reminders_core::domain::{Recipe, SavedRecipe, VendorRecommendation};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// POST /recipes/generate - Ask the assistant for a recipe
///
/// The user's dietary restrictions are applied when the request names none.
#[utoipa::path(
    post,
    path = "/recipes/generate",
    request_body(content_type = "application/json", description = "prompt, optional servings and dietary_restrictions."),
    responses(
        (status = 200, description = "The generated recipe (not saved)"),
        (status = 400, description = "Empty prompt"),
        (status = 502, description = "Every AI provider failed")
    )
)]
pub async fn generate_recipe_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(mut req): Json<RecipeRequest>,
) -> HttpResult<Json<Recipe>> {
    if req.prompt.trim().is_empty() {
        return Err(HttpError::bad_request("Describe the dish to cook"));
    }
    if req.dietary_restrictions.is_empty() {
        req.dietary_restrictions = state.db.get_preferences(user_id).await?.dietary_restrictions;
    }
    let recipe = state.assistant.generate_recipe(&req).await?;
    Ok(Json(recipe))
}

/// GET /recipes - Saved recipes, newest first
#[utoipa::path(
    get,
    path = "/recipes",
    responses((status = 200, description = "The user's saved recipes"))
)]
pub async fn list_recipes_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HttpResult<Json<Vec<SavedRecipe>>> {
    Ok(Json(state.db.list_saved_recipes(user_id).await?))
}

/// POST /recipes - Save a recipe
#[utoipa::path(
    post,
    path = "/recipes",
    request_body(content_type = "application/json", description = "A recipe, typically one returned by /recipes/generate."),
    responses(
        (status = 201, description = "The saved recipe"),
        (status = 400, description = "Recipe without a title")
    )
)]
pub async fn save_recipe_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(recipe): Json<Recipe>,
) -> HttpResult<impl IntoResponse> {
    if recipe.title.trim().is_empty() {
        return Err(HttpError::bad_request("A recipe needs a title"));
    }
    let saved = SavedRecipe {
        id: Uuid::new_v4(),
        recipe,
        saved_at: state.clock.now(),
    };
    state.db.save_recipe(user_id, &saved).await?;
    info!("User {} saved recipe {}", user_id, saved.id);
    Ok((StatusCode::CREATED, Json(saved)))
}

/// DELETE /recipes/{id}
#[utoipa::path(
    delete,
    path = "/recipes/{id}",
    params(("id" = Uuid, Path, description = "Saved recipe id")),
    responses(
        (status = 204, description = "Recipe deleted"),
        (status = 404, description = "Unknown recipe")
    )
)]
pub async fn delete_recipe_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> HttpResult<StatusCode> {
    state.db.delete_saved_recipe(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /vendors/recommend - Suggest vendors for a need
///
/// Falls back to the location in the user's preferences.
#[utoipa::path(
    post,
    path = "/vendors/recommend",
    request_body(content_type = "application/json", description = "need and optional location."),
    responses(
        (status = 200, description = "Suggested vendors"),
        (status = 400, description = "Empty need"),
        (status = 502, description = "Every AI provider failed")
    )
)]
pub async fn recommend_vendors_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(mut query): Json<VendorQuery>,
) -> HttpResult<Json<Vec<VendorRecommendation>>> {
    if query.need.trim().is_empty() {
        return Err(HttpError::bad_request("Say what you are looking for"));
    }
    if query.location.is_none() {
        query.location = state.db.get_preferences(user_id).await?.location;
    }
    let vendors = state.assistant.recommend_vendors(&query).await?;
    Ok(Json(vendors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_db::MemoryDb;
    use crate::web::test_support::{state_with, ScriptedCompletions};
    use crate::web::workspace::tests::start;
    use axum::http::StatusCode;
    use reminders_core::clock::ManualClock;
    use reminders_core::domain::UserPreferences;
    use reminders_core::assistant::extract_json;
    use reminders_core::ports::{DatabaseService, PortError};

    const PANCAKES: &str = r#"```json
{"title":"Pancakes","ingredients":[{"name":"oat milk","quantity":"300 ml"}],"steps":["Whisk","Fry"]}
```"#;

    #[tokio::test]
    async fn generated_recipes_respect_saved_dietary_restrictions() {
        let db = Arc::new(MemoryDb::new());
        let user_id = Uuid::new_v4();
        let prefs = UserPreferences {
            dietary_restrictions: vec!["vegan".to_string()],
            ..Default::default()
        };
        db.save_preferences(user_id, &prefs).await.unwrap();
        let completions = ScriptedCompletions::new(vec![Ok(PANCAKES.to_string())]);
        let state = state_with(db, ManualClock::new(start()), completions.clone());

        let request = RecipeRequest {
            prompt: "pancakes".to_string(),
            ..Default::default()
        };
        let Json(recipe) = generate_recipe_handler(State(state), Extension(user_id), Json(request))
            .await
            .unwrap();

        assert_eq!(recipe.title, "Pancakes");
        assert!(completions.prompts.lock().unwrap()[0].contains("vegan"));
    }

    #[tokio::test]
    async fn provider_failures_are_bad_gateway() {
        let completions = ScriptedCompletions::new(vec![Err(PortError::Timeout {
            provider: "gemini".to_string(),
        })]);
        let state = state_with(Arc::new(MemoryDb::new()), ManualClock::new(start()), completions);

        let query = VendorQuery {
            need: "birthday cake".to_string(),
            location: Some("Leeds".to_string()),
        };
        let err = recommend_vendors_handler(State(state), Extension(Uuid::new_v4()), Json(query))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn saved_recipes_can_be_listed_and_deleted() {
        let db = Arc::new(MemoryDb::new());
        let state = state_with(db, ManualClock::new(start()), ScriptedCompletions::new(vec![]));
        let user_id = Uuid::new_v4();
        let recipe: Recipe = serde_json::from_str(extract_json(PANCAKES)).unwrap();

        save_recipe_handler(State(state.clone()), Extension(user_id), Json(recipe))
            .await
            .unwrap();
        let Json(saved) = list_recipes_handler(State(state.clone()), Extension(user_id))
            .await
            .unwrap();
        assert_eq!(saved.len(), 1);

        let status = delete_recipe_handler(State(state.clone()), Extension(user_id), Path(saved[0].id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let err = delete_recipe_handler(State(state), Extension(user_id), Path(saved[0].id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
