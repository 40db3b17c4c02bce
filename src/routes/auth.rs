use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::get,
};

use crate::AppState;
use crate::auth::extract_current_user;
use crate::error::AppResult;
use crate::models::{MeResponse, ProfileResponse};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

// GET /api/auth/me
async fn get_me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<MeResponse>> {
    let user_id = extract_current_user(&state, &headers).await?;
    let profile = state.repo.fetch_profile(user_id).await?;

    Ok(Json(MeResponse {
        user_id,
        profile: profile.map(ProfileResponse::from),
    }))
}
