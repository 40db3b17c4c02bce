use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, de::DeserializeOwned};
use uuid::Uuid;

use super::Repository;
use crate::config::SupabaseSettings;
use crate::error::{AppError, AppResult};
use crate::models::{
    NewPost, NewReference, Post, PostTerm, Profile, ProfileChanges, ReadingEvent, Reference,
    TimelinePost,
};

pub const REQUEST_TIMEOUT_SECS: u64 = 15;

const PROFILE_SELECT: &str = "id,display_name,citation_style,timezone";
const REFERENCE_SELECT: &str =
    "id,bibtex_key,bibtex_raw,csl_json,title,abstract,authors,year,venue,doi,url,fingerprint";
const POST_SELECT: &str = "id,user_id,reference_id,note,read_at";

#[derive(Debug, Deserialize)]
struct PostRow {
    id: Uuid,
    user_id: Uuid,
    reference_id: Uuid,
    note: Option<String>,
    read_at: DateTime<Utc>,
}

/// Repository over the Supabase REST API (PostgREST). Row-level security is
/// enforced by the database according to the credentials sent.
#[derive(Clone)]
pub struct PostgrestRepository {
    client: reqwest::Client,
    rest_url: String,
}

impl PostgrestRepository {
    pub fn new(settings: &SupabaseSettings) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(settings.api_key())?);
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", settings.bearer()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", settings.url.trim_end_matches('/')),
        })
    }

    fn table(&self, name: &str) -> String {
        format!("{}/{}", self.rest_url, name)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> AppResult<Vec<T>> {
        let response = self.client.get(self.table(table)).query(query).send().await?;
        read_json(response, table).await
    }

    async fn insert_returning<B, T>(&self, table: &str, body: &B) -> AppResult<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.table(table))
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let rows: Vec<T> = read_json(response, table).await?;
        require_single_row(rows, table)
    }

    async fn fetch_profiles_by_id(&self, ids: &BTreeSet<Uuid>) -> AppResult<HashMap<Uuid, Profile>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<Profile> = self
            .select(
                "profiles",
                &[("select", PROFILE_SELECT.to_string()), ("id", in_filter(ids))],
            )
            .await?;
        Ok(rows.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn fetch_refs_by_id(&self, ids: &BTreeSet<Uuid>) -> AppResult<HashMap<Uuid, Reference>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<Reference> = self
            .select(
                "references",
                &[("select", REFERENCE_SELECT.to_string()), ("id", in_filter(ids))],
            )
            .await?;
        Ok(rows.into_iter().map(|r| (r.id, r)).collect())
    }
}

#[async_trait]
impl Repository for PostgrestRepository {
    async fn fetch_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let rows: Vec<Profile> = self
            .select(
                "profiles",
                &[
                    ("select", PROFILE_SELECT.to_string()),
                    ("id", format!("eq.{}", user_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        // Profiles are assumed to exist; updating a missing row is a no-op.
        let response = self
            .client
            .patch(self.table("profiles"))
            .query(&[("id", format!("eq.{}", user_id))])
            .header("Prefer", "return=minimal")
            .json(&changes.to_json())
            .send()
            .await?;
        ensure_success(response, "profiles").await
    }

    async fn find_reference_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> AppResult<Option<Reference>> {
        let rows: Vec<Reference> = self
            .select(
                "references",
                &[
                    ("select", REFERENCE_SELECT.to_string()),
                    ("fingerprint", format!("eq.{}", fingerprint)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_reference(&self, reference: &NewReference) -> AppResult<Reference> {
        self.insert_returning("references", reference).await
    }

    async fn insert_post(&self, post: &NewPost) -> AppResult<Post> {
        let row: PostRow = self.insert_returning("posts", post).await?;
        Ok(Post {
            id: row.id,
            user_id: row.user_id,
            reference_id: row.reference_id,
            note: row.note,
            read_at: row.read_at,
        })
    }

    async fn insert_post_terms(&self, terms: &[PostTerm]) -> AppResult<()> {
        if terms.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(self.table("post_terms"))
            .header("Prefer", "return=minimal")
            .json(terms)
            .send()
            .await?;
        ensure_success(response, "post_terms").await
    }

    async fn delete_post(&self, post_id: Uuid) -> AppResult<()> {
        let response = self
            .client
            .delete(self.table("posts"))
            .query(&[("id", format!("eq.{}", post_id))])
            .header("Prefer", "return=minimal")
            .send()
            .await?;
        ensure_success(response, "posts").await
    }

    async fn fetch_timeline(&self, limit: i64) -> AppResult<Vec<TimelinePost>> {
        let posts: Vec<PostRow> = self
            .select(
                "posts",
                &[
                    ("select", POST_SELECT.to_string()),
                    ("order", "read_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let user_ids: BTreeSet<Uuid> = posts.iter().map(|p| p.user_id).collect();
        let ref_ids: BTreeSet<Uuid> = posts.iter().map(|p| p.reference_id).collect();
        let profiles = self.fetch_profiles_by_id(&user_ids).await?;
        let refs = self.fetch_refs_by_id(&ref_ids).await?;

        let timeline = posts
            .into_iter()
            .filter_map(|p| {
                let (Some(profile), Some(reference)) =
                    (profiles.get(&p.user_id), refs.get(&p.reference_id))
                else {
                    tracing::warn!(post_id = %p.id, "Skipping orphaned post");
                    return None;
                };
                Some(TimelinePost {
                    id: p.id,
                    user_id: p.user_id,
                    note: p.note,
                    read_at: p.read_at,
                    display_name: profile.display_name.clone(),
                    citation_style: profile.citation_style.clone(),
                    reference: reference.clone(),
                })
            })
            .collect();
        Ok(timeline)
    }

    async fn fetch_reading_events(&self, user_id: Option<Uuid>) -> AppResult<Vec<ReadingEvent>> {
        let mut query = vec![
            ("select", POST_SELECT.to_string()),
            ("order", "read_at.asc".to_string()),
        ];
        if let Some(user_id) = user_id {
            query.push(("user_id", format!("eq.{}", user_id)));
        }
        let posts: Vec<PostRow> = self.select("posts", &query).await?;
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let ref_ids: BTreeSet<Uuid> = posts.iter().map(|p| p.reference_id).collect();
        let refs = self.fetch_refs_by_id(&ref_ids).await?;

        Ok(posts
            .into_iter()
            .filter_map(|p| {
                let reference = refs.get(&p.reference_id)?;
                Some(ReadingEvent {
                    post_id: p.id,
                    user_id: p.user_id,
                    read_at: p.read_at,
                    title: reference.title.clone().unwrap_or_default(),
                    abstract_text: reference.abstract_text.clone().unwrap_or_default(),
                })
            })
            .collect())
    }
}

fn header_value(raw: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(raw)
        .map_err(|_| AppError::Config("Supabase credentials contain invalid characters".into()))
}

fn in_filter(ids: &BTreeSet<Uuid>) -> String {
    let joined = ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
    format!("in.({})", joined)
}

async fn ensure_success(response: reqwest::Response, table: &str) -> AppResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(table, status = %status, "PostgREST request failed");
    Err(AppError::Persistence(format!(
        "{} request returned {}: {}",
        table, status, body
    )))
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, table: &str) -> AppResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        tracing::warn!(table, status = %status, "PostgREST request failed");
        return Err(AppError::Persistence(format!(
            "{} request returned {}: {}",
            table, status, body
        )));
    }
    serde_json::from_str(&body).map_err(|e| {
        AppError::Persistence(format!("Unexpected {} response shape: {}", table, e))
    })
}

/// Inserts return a one-row array; anything else usually means RLS hid the
/// row or `Prefer: return=representation` was ignored.
fn require_single_row<T>(rows: Vec<T>, table: &str) -> AppResult<T> {
    let count = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), count) {
        (Some(row), 1) => Ok(row),
        (None, _) => Err(AppError::Persistence(format!(
            "Store returned no data for {} insert. Check RLS policies.",
            table
        ))),
        _ => Err(AppError::Persistence(format!(
            "Expected 1 row for {} insert, got {}",
            table, count
        ))),
    }
}
