//! Staff account handlers

use axum::{extract::State, http::StatusCode, Json};
use shared::User;

use crate::error::AppResult;
use crate::middleware::{require_admin, CurrentActor};
use crate::services::auth::CreateUserInput;
use crate::AppState;

/// Current user profile
pub async fn me(CurrentActor(actor): CurrentActor) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "user_id": actor.user_id,
        "role": actor.role,
    }))
}

/// Create an inspector or administrator account
pub async fn create_user(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(input): Json<CreateUserInput>,
) -> AppResult<(StatusCode, Json<User>)> {
    require_admin(&actor)?;
    let user = state.auth.create_user(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
