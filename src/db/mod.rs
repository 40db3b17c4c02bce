pub mod postgrest;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::resolve_user_id;
use crate::config::{Settings, StorageSettings};
use crate::error::AppResult;
use crate::models::{
    NewPost, NewReference, Post, PostTerm, Profile, ProfileChanges, ReadingEvent, Reference,
    TimelinePost,
};

pub use postgrest::PostgrestRepository;
pub use sqlite::SqliteRepository;

pub const LOCAL_DISPLAY_NAME: &str = "Local reader";

/// Reads and writes against the `profiles`, `references`, `posts` and
/// `post_terms` tables. Implementations surface storage failures as
/// `AppError::Persistence`.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn fetch_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>>;

    async fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges) -> AppResult<()>;

    async fn find_reference_by_fingerprint(&self, fingerprint: &str)
    -> AppResult<Option<Reference>>;

    async fn insert_reference(&self, reference: &NewReference) -> AppResult<Reference>;

    async fn insert_post(&self, post: &NewPost) -> AppResult<Post>;

    async fn insert_post_terms(&self, terms: &[PostTerm]) -> AppResult<()>;

    /// Removes a post and its terms. Deleting a missing post is not an error.
    async fn delete_post(&self, post_id: Uuid) -> AppResult<()>;

    /// Most recent posts first; rows whose profile or reference is missing
    /// are skipped.
    async fn fetch_timeline(&self, limit: i64) -> AppResult<Vec<TimelinePost>>;

    /// Oldest first. `None` means every user.
    async fn fetch_reading_events(&self, user_id: Option<Uuid>) -> AppResult<Vec<ReadingEvent>>;
}

pub async fn connect(settings: &Settings) -> AppResult<Arc<dyn Repository>> {
    match &settings.storage {
        StorageSettings::Supabase(supabase) => {
            tracing::info!(url = %supabase.url, "Using Supabase PostgREST storage");
            Ok(Arc::new(PostgrestRepository::new(supabase)?))
        }
        StorageSettings::Sqlite { database_url } => {
            tracing::info!(%database_url, "Using local SQLite storage");
            let pool = sqlite::init_db(database_url).await?;
            // The local store has no auth service to create profiles.
            if let Some(raw) = settings.local_user_id.as_deref() {
                let user_id = resolve_user_id(None, Some(raw))?;
                sqlite::ensure_profile(&pool, user_id, LOCAL_DISPLAY_NAME).await?;
            }
            Ok(Arc::new(SqliteRepository::new(pool)))
        }
    }
}
