use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    routing::get,
};

use crate::AppState;
use crate::auth::extract_current_user;
use crate::error::{AppError, AppResult};
use crate::models::{
    CitationStyle, DISPLAY_NAME_MAX_CHARS, Profile, ProfileChanges, ProfileResponse,
    ProfileUpdateResponse, UpdateProfile,
};
use crate::timezone::parse_timezone;

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/", get(get_profile).patch(update_profile))
}

// GET /api/profile
async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<ProfileResponse>> {
    let user_id = extract_current_user(&state, &headers).await?;
    let profile = state
        .repo
        .fetch_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    Ok(Json(ProfileResponse::from(profile)))
}

// PATCH /api/profile
async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UpdateProfile>, JsonRejection>,
) -> AppResult<Json<ProfileUpdateResponse>> {
    let user_id = extract_current_user(&state, &headers).await?;
    let Json(input) = body.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let current = state
        .repo
        .fetch_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    let changes = diff_profile(&current, &input)?;
    if changes.is_empty() {
        return Ok(Json(ProfileUpdateResponse {
            changed: false,
            profile: ProfileResponse::from(current),
        }));
    }

    state.repo.update_profile(user_id, &changes).await?;
    tracing::info!(%user_id, "Updated profile");

    let updated = Profile {
        display_name: changes.display_name.unwrap_or(current.display_name),
        citation_style: changes
            .citation_style
            .map(|s| s.as_str().to_string())
            .or(current.citation_style),
        timezone: changes.timezone.unwrap_or(current.timezone),
        id: current.id,
    };
    Ok(Json(ProfileUpdateResponse {
        changed: true,
        profile: ProfileResponse::from(updated),
    }))
}

/// Validates the submitted fields and keeps only those that differ from the
/// stored profile. A blank timezone clears it.
pub fn diff_profile(current: &Profile, input: &UpdateProfile) -> AppResult<ProfileChanges> {
    let mut changes = ProfileChanges::default();

    if let Some(name) = &input.display_name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Display name is required".to_string()));
        }
        if name.chars().count() > DISPLAY_NAME_MAX_CHARS {
            return Err(AppError::Validation(format!(
                "Display name must be at most {} characters",
                DISPLAY_NAME_MAX_CHARS
            )));
        }
        if name != current.display_name {
            changes.display_name = Some(name.to_string());
        }
    }

    if let Some(raw) = &input.citation_style {
        let style = CitationStyle::parse(raw).ok_or_else(|| {
            AppError::Validation("citation_style must be 'apa', 'mla', or 'chicago'".to_string())
        })?;
        if current.citation_style.as_deref() != Some(style.as_str()) {
            changes.citation_style = Some(style);
        }
    }

    if let Some(raw) = &input.timezone {
        let raw = raw.trim();
        let next = if raw.is_empty() {
            None
        } else {
            let tz = parse_timezone(raw).ok_or_else(|| {
                AppError::Validation(format!("Unknown timezone '{}'", raw))
            })?;
            Some(tz.name().to_string())
        };
        if next != current.timezone {
            changes.timezone = Some(next);
        }
    }

    Ok(changes)
}
