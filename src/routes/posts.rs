use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};

use crate::AppState;
use crate::auth::extract_current_user;
use crate::citation::format_citation;
use crate::error::{AppError, AppResult};
use crate::ingest::ingest_bibtex;
use crate::models::{
    CitationStyle, CreatePost, PostCreatedResponse, TimelineItemResponse, TimelineQuery,
    TimelineResponse,
};
use crate::timezone::{format_in_timezone, get_timezone};

pub const DEFAULT_TIMELINE_LIMIT: i64 = 50;
pub const MAX_TIMELINE_LIMIT: i64 = 200;

pub fn posts_routes() -> Router<AppState> {
    Router::new().route("/", get(list_posts).post(create_post))
}

// ============================
// Timeline
// ============================

async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TimelineQuery>,
) -> AppResult<Json<TimelineResponse>> {
    let user_id = extract_current_user(&state, &headers).await?;
    let viewer = state.repo.fetch_profile(user_id).await?;
    let tz = get_timezone(viewer.as_ref().and_then(|p| p.timezone.as_deref()));

    let limit = query
        .limit
        .unwrap_or(DEFAULT_TIMELINE_LIMIT)
        .clamp(1, MAX_TIMELINE_LIMIT);
    let posts = state.repo.fetch_timeline(limit).await?;

    let items = posts
        .into_iter()
        .map(|post| {
            let style = CitationStyle::from_stored(post.citation_style.as_deref());
            TimelineItemResponse {
                id: post.id,
                user_id: post.user_id,
                is_mine: post.user_id == user_id,
                display_name: post.display_name,
                note: post.note,
                read_at: post.read_at,
                read_at_display: format_in_timezone(post.read_at, tz),
                citation: format_citation(&post.reference, style),
                reference_id: post.reference.id,
            }
        })
        .collect();

    Ok(Json(TimelineResponse {
        posts: items,
        timezone: tz.name().to_string(),
    }))
}

// ============================
// Log a reading
// ============================

async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreatePost>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    // Identity first; the body is only looked at once we know who is posting.
    let user_id = extract_current_user(&state, &headers).await?;
    let Json(input) = body.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    let outcome = ingest_bibtex(
        state.repo.as_ref(),
        state.terms.as_ref(),
        user_id,
        &input.bibtex,
        input.note.as_deref(),
    )
    .await
    .inspect_err(|e| tracing::info!(%user_id, error = %e, "Rejected reading submission"))?;

    Ok((
        StatusCode::CREATED,
        Json(PostCreatedResponse {
            post_id: outcome.post_id,
            reference_id: outcome.reference_id,
            bibtex_key: outcome.bibtex_key,
            reference_reused: outcome.reference_reused,
            read_at: outcome.read_at,
            terms: outcome.terms,
        }),
    ))
}
