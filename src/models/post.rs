use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reference::Reference;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reference_id: Uuid,
    pub note: Option<String>,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPost {
    pub user_id: Uuid,
    pub reference_id: Uuid,
    pub note: Option<String>,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostTerm {
    pub post_id: Uuid,
    pub term: String,
    pub weight: i64,
}

/// A post joined with its poster's profile and the reference it logs.
#[derive(Debug, Clone)]
pub struct TimelinePost {
    pub id: Uuid,
    pub user_id: Uuid,
    pub note: Option<String>,
    pub read_at: DateTime<Utc>,
    pub display_name: String,
    pub citation_style: Option<String>,
    pub reference: Reference,
}

/// The slice of a post the dashboard aggregates over.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingEvent {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
    pub title: String,
    pub abstract_text: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePost {
    pub bibtex: String,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostCreatedResponse {
    pub post_id: Uuid,
    pub reference_id: Uuid,
    pub bibtex_key: Option<String>,
    pub reference_reused: bool,
    pub read_at: DateTime<Utc>,
    pub terms: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TimelineQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TimelineItemResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub is_mine: bool,
    pub note: Option<String>,
    pub read_at: DateTime<Utc>,
    pub read_at_display: String,
    pub citation: String,
    pub reference_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub posts: Vec<TimelineItemResponse>,
    pub timezone: String,
}
