use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::AppState;
use crate::auth::extract_current_user;
use crate::dashboard::{
    DEFAULT_MIN_TERM_TOTAL, DEFAULT_TOP_K_TERMS, GroupBy, MAX_TOP_K_TERMS, MIN_TOP_K_TERMS,
    TimeGrain, calculate_streak, compute_semantic_trends, compute_time_of_day, today_in,
};
use crate::error::AppResult;
use crate::models::{
    ReadingEvent, Scope, StreakResponse, TimeOfDayQuery, TimeOfDayResponse, TrendsQuery,
    TrendsResponse,
};
use crate::timezone::get_timezone;

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/trends", get(get_trends))
        .route("/time-of-day", get(get_time_of_day))
        .route("/streak", get(get_streak))
}

struct Viewer {
    user_id: Uuid,
    tz: Tz,
}

async fn load_viewer(state: &AppState, headers: &HeaderMap) -> AppResult<Viewer> {
    let user_id = extract_current_user(state, headers).await?;
    let profile = state.repo.fetch_profile(user_id).await?;
    Ok(Viewer {
        user_id,
        tz: get_timezone(profile.as_ref().and_then(|p| p.timezone.as_deref())),
    })
}

async fn load_events(state: &AppState, viewer: &Viewer, scope: Scope) -> AppResult<Vec<ReadingEvent>> {
    let filter = match scope {
        Scope::Personal => Some(viewer.user_id),
        Scope::Team => None,
    };
    state.repo.fetch_reading_events(filter).await
}

// GET /api/dashboard/trends
async fn get_trends(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TrendsQuery>,
) -> AppResult<Json<TrendsResponse>> {
    let grain = TimeGrain::parse(query.grain.as_deref().unwrap_or("monthly"))?;
    let top_k = query
        .top_k
        .unwrap_or(DEFAULT_TOP_K_TERMS)
        .clamp(MIN_TOP_K_TERMS, MAX_TOP_K_TERMS);
    let scope = query.scope.unwrap_or(Scope::Personal);

    let viewer = load_viewer(&state, &headers).await?;
    let events = load_events(&state, &viewer, scope).await?;
    let data = compute_semantic_trends(&events, grain, viewer.tz, top_k, DEFAULT_MIN_TERM_TOTAL);

    Ok(Json(TrendsResponse {
        scope,
        grain: grain.as_str().to_string(),
        timezone: viewer.tz.name().to_string(),
        data,
    }))
}

// GET /api/dashboard/time-of-day
async fn get_time_of_day(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TimeOfDayQuery>,
) -> AppResult<Json<TimeOfDayResponse>> {
    let group_by = GroupBy::parse(query.group_by.as_deref().unwrap_or("monthly"))?;
    let scope = query.scope.unwrap_or(Scope::Personal);

    let viewer = load_viewer(&state, &headers).await?;
    let events = load_events(&state, &viewer, scope).await?;

    Ok(Json(TimeOfDayResponse {
        scope,
        group_by: group_by.as_str().to_string(),
        timezone: viewer.tz.name().to_string(),
        data: compute_time_of_day(&events, group_by, viewer.tz),
    }))
}

// GET /api/dashboard/streak
async fn get_streak(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<StreakResponse>> {
    let viewer = load_viewer(&state, &headers).await?;
    let events = load_events(&state, &viewer, Scope::Personal).await?;
    let dates: Vec<_> = events.iter().map(|e| e.read_at).collect();

    Ok(Json(StreakResponse {
        streak: calculate_streak(&dates, viewer.tz, today_in(viewer.tz)),
        timezone: viewer.tz.name().to_string(),
    }))
}
