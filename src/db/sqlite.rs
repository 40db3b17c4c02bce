use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, QueryBuilder, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use uuid::Uuid;

use super::Repository;
use crate::error::{AppError, AppResult};
use crate::models::{
    NewPost, NewReference, Post, PostTerm, Profile, ProfileChanges, ReadingEvent, Reference,
    TimelinePost,
};

const REFERENCE_COLUMNS: &str = r#"
    r.id, r.bibtex_key, r.bibtex_raw, r.csl_json, r.title, r.abstract, r.authors,
    r.year, r.venue, r.doi, r.url, r.fingerprint
"#;

pub async fn init_db(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // Every connection to `:memory:` opens its own database, so keep exactly one alive.
    let in_memory = database_url.contains(":memory:");
    let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
    if in_memory {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options.connect_with(options).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            citation_style TEXT NOT NULL DEFAULT 'apa',
            timezone TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "references" (
            id TEXT PRIMARY KEY,
            bibtex_key TEXT,
            bibtex_raw TEXT,
            csl_json TEXT,
            title TEXT,
            abstract TEXT,
            authors TEXT,
            year INTEGER,
            venue TEXT,
            doi TEXT,
            url TEXT,
            fingerprint TEXT NOT NULL UNIQUE,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            reference_id TEXT NOT NULL,
            note TEXT,
            read_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES profiles(id) ON DELETE CASCADE,
            FOREIGN KEY (reference_id) REFERENCES "references"(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_read_at ON posts (read_at)")
        .execute(&pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts (user_id)")
        .execute(&pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS post_terms (
            post_id TEXT NOT NULL,
            term TEXT NOT NULL,
            weight INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (post_id, term),
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// Profiles are provisioned by the auth service in production; the local
/// store provisions the development identity itself.
pub async fn ensure_profile(
    pool: &SqlitePool,
    user_id: Uuid,
    display_name: &str,
) -> Result<(), sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO profiles (id, display_name) VALUES (?, ?)")
        .bind(user_id.to_string())
        .bind(display_name)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        tracing::info!(%user_id, "Provisioned local profile");
    }
    Ok(())
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: String,
    display_name: String,
    citation_style: Option<String>,
    timezone: Option<String>,
}

impl ProfileRow {
    fn into_profile(self) -> AppResult<Profile> {
        Ok(Profile {
            id: parse_uuid(&self.id)?,
            display_name: self.display_name,
            citation_style: self.citation_style,
            timezone: self.timezone,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReferenceRow {
    id: String,
    bibtex_key: Option<String>,
    bibtex_raw: Option<String>,
    csl_json: Option<String>,
    title: Option<String>,
    #[sqlx(rename = "abstract")]
    abstract_text: Option<String>,
    authors: Option<String>,
    year: Option<i64>,
    venue: Option<String>,
    doi: Option<String>,
    url: Option<String>,
    fingerprint: String,
}

impl ReferenceRow {
    fn into_reference(self) -> AppResult<Reference> {
        let csl_json = self
            .csl_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Reference {
            id: parse_uuid(&self.id)?,
            bibtex_key: self.bibtex_key,
            bibtex_raw: self.bibtex_raw,
            csl_json,
            title: self.title,
            abstract_text: self.abstract_text,
            authors: self.authors,
            year: self.year.and_then(|y| i32::try_from(y).ok()),
            venue: self.venue,
            doi: self.doi,
            url: self.url,
            fingerprint: self.fingerprint,
        })
    }
}

#[derive(Debug, FromRow)]
struct TimelineRow {
    post_id: String,
    user_id: String,
    note: Option<String>,
    read_at: DateTime<Utc>,
    display_name: String,
    citation_style: Option<String>,
    #[sqlx(flatten)]
    reference: ReferenceRow,
}

#[derive(Debug, FromRow)]
struct ReadingEventRow {
    post_id: String,
    user_id: String,
    read_at: DateTime<Utc>,
    title: Option<String>,
    #[sqlx(rename = "abstract")]
    abstract_text: Option<String>,
}

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn fetch_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, display_name, citation_style, timezone FROM profiles WHERE id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProfileRow::into_profile).transpose()
    }

    async fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new("UPDATE profiles SET ");
        {
            let mut separated = query_builder.separated(", ");
            if let Some(name) = &changes.display_name {
                separated.push("display_name = ");
                separated.push_bind_unseparated(name.clone());
            }
            if let Some(style) = changes.citation_style {
                separated.push("citation_style = ");
                separated.push_bind_unseparated(style.as_str());
            }
            if let Some(tz) = &changes.timezone {
                separated.push("timezone = ");
                separated.push_bind_unseparated(tz.clone());
            }
        }
        query_builder.push(" WHERE id = ");
        query_builder.push_bind(user_id.to_string());

        query_builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn find_reference_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> AppResult<Option<Reference>> {
        let sql = format!(
            r#"SELECT {} FROM "references" r WHERE r.fingerprint = ? LIMIT 1"#,
            REFERENCE_COLUMNS
        );
        let row = sqlx::query_as::<_, ReferenceRow>(&sql)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ReferenceRow::into_reference).transpose()
    }

    async fn insert_reference(&self, reference: &NewReference) -> AppResult<Reference> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO "references"
               (id, bibtex_key, bibtex_raw, csl_json, title, abstract, authors, year, venue, doi, url, fingerprint)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(&reference.bibtex_key)
        .bind(&reference.bibtex_raw)
        .bind(reference.csl_json.to_string())
        .bind(&reference.title)
        .bind(&reference.abstract_text)
        .bind(&reference.authors)
        .bind(reference.year)
        .bind(&reference.venue)
        .bind(&reference.doi)
        .bind(&reference.url)
        .bind(&reference.fingerprint)
        .execute(&self.pool)
        .await?;

        Ok(reference.clone().into_reference(id))
    }

    async fn insert_post(&self, post: &NewPost) -> AppResult<Post> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO posts (id, user_id, reference_id, note, read_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(post.user_id.to_string())
        .bind(post.reference_id.to_string())
        .bind(&post.note)
        .bind(post.read_at)
        .execute(&self.pool)
        .await?;

        Ok(Post {
            id,
            user_id: post.user_id,
            reference_id: post.reference_id,
            note: post.note.clone(),
            read_at: post.read_at,
        })
    }

    async fn insert_post_terms(&self, terms: &[PostTerm]) -> AppResult<()> {
        if terms.is_empty() {
            return Ok(());
        }

        let mut query_builder =
            QueryBuilder::<Sqlite>::new("INSERT INTO post_terms (post_id, term, weight) ");
        query_builder.push_values(terms, |mut row, term| {
            row.push_bind(term.post_id.to_string())
                .push_bind(term.term.clone())
                .push_bind(term.weight);
        });
        query_builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_post(&self, post_id: Uuid) -> AppResult<()> {
        // post_terms rows go with it through ON DELETE CASCADE.
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_timeline(&self, limit: i64) -> AppResult<Vec<TimelinePost>> {
        let sql = format!(
            r#"
            SELECT
                p.id AS post_id,
                p.user_id AS user_id,
                p.note AS note,
                p.read_at AS read_at,
                pr.display_name AS display_name,
                pr.citation_style AS citation_style,
                {}
            FROM posts p
            JOIN profiles pr ON pr.id = p.user_id
            JOIN "references" r ON r.id = p.reference_id
            ORDER BY p.read_at DESC
            LIMIT ?
            "#,
            REFERENCE_COLUMNS
        );
        let rows = sqlx::query_as::<_, TimelineRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(TimelinePost {
                    id: parse_uuid(&row.post_id)?,
                    user_id: parse_uuid(&row.user_id)?,
                    note: row.note,
                    read_at: row.read_at,
                    display_name: row.display_name,
                    citation_style: row.citation_style,
                    reference: row.reference.into_reference()?,
                })
            })
            .collect()
    }

    async fn fetch_reading_events(&self, user_id: Option<Uuid>) -> AppResult<Vec<ReadingEvent>> {
        let user_id = user_id.map(|id| id.to_string());
        let rows = sqlx::query_as::<_, ReadingEventRow>(
            r#"
            SELECT p.id AS post_id, p.user_id AS user_id, p.read_at AS read_at,
                   r.title AS title, r.abstract AS abstract
            FROM posts p
            JOIN "references" r ON r.id = p.reference_id
            WHERE ?1 IS NULL OR p.user_id = ?1
            ORDER BY p.read_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ReadingEvent {
                    post_id: parse_uuid(&row.post_id)?,
                    user_id: parse_uuid(&row.user_id)?,
                    read_at: row.read_at,
                    title: row.title.unwrap_or_default(),
                    abstract_text: row.abstract_text.unwrap_or_default(),
                })
            })
            .collect()
    }
}

fn parse_uuid(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| AppError::Persistence(format!("Invalid id '{}' in store: {}", raw, e)))
}
