use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::bibtex::{ParsedBibtex, parse_bibtex_entry};
use crate::db::Repository;
use crate::error::{AppError, AppResult};
use crate::models::{NewPost, PostTerm, Reference};
use crate::terms::TermExtractor;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub post_id: Uuid,
    pub reference_id: Uuid,
    pub bibtex_key: Option<String>,
    pub reference_reused: bool,
    pub read_at: DateTime<Utc>,
    pub terms: Vec<String>,
}

/// Records that `user_id` read the paper described by `raw`.
///
/// Nothing is written unless the entry parses and validates. Writes are
/// sequential: a post whose terms fail to insert is deleted again, while a
/// newly inserted reference always stays (it is reused by fingerprint).
pub async fn ingest_bibtex(
    repo: &dyn Repository,
    extractor: &dyn TermExtractor,
    user_id: Uuid,
    raw: &str,
    note: Option<&str>,
) -> AppResult<IngestOutcome> {
    let parsed = parse_bibtex_entry(raw)?;

    let (reference, reference_reused) = find_or_insert_reference(repo, &parsed).await?;

    let note = note.map(str::trim).filter(|n| !n.is_empty());
    let post = repo
        .insert_post(&NewPost {
            user_id,
            reference_id: reference.id,
            note: note.map(str::to_string),
            read_at: Utc::now(),
        })
        .await?;

    let weighted = extractor.extract(&parsed.title, &parsed.abstract_text);
    let post_terms: Vec<PostTerm> = weighted
        .into_iter()
        .map(|(term, weight)| PostTerm {
            post_id: post.id,
            term,
            weight,
        })
        .collect();
    if let Err(e) = repo.insert_post_terms(&post_terms).await {
        tracing::warn!(post_id = %post.id, error = %e, "Term insert failed, removing post");
        if let Err(cleanup) = repo.delete_post(post.id).await {
            tracing::error!(post_id = %post.id, error = %cleanup, "Failed to remove post");
        }
        return Err(e);
    }

    tracing::info!(
        %user_id,
        post_id = %post.id,
        reference_id = %reference.id,
        reference_reused,
        terms = post_terms.len(),
        "Logged reading"
    );

    Ok(IngestOutcome {
        post_id: post.id,
        reference_id: reference.id,
        bibtex_key: reference.bibtex_key.or(parsed.bibtex_key),
        reference_reused,
        read_at: post.read_at,
        terms: post_terms.into_iter().map(|t| t.term).collect(),
    })
}

/// Reuses a known reference. A concurrent submission of the same paper can
/// win the unique fingerprint between lookup and insert, so a failed insert
/// is followed by a second lookup.
async fn find_or_insert_reference(
    repo: &dyn Repository,
    parsed: &ParsedBibtex,
) -> AppResult<(Reference, bool)> {
    if let Some(existing) = repo.find_reference_by_fingerprint(&parsed.fingerprint).await? {
        return Ok((existing, true));
    }

    match repo.insert_reference(&parsed.to_new_reference()).await {
        Ok(inserted) => Ok((inserted, false)),
        Err(e @ AppError::Persistence(_)) => {
            match repo.find_reference_by_fingerprint(&parsed.fingerprint).await? {
                Some(existing) => {
                    tracing::debug!(
                        reference_id = %existing.id,
                        "Reference inserted concurrently"
                    );
                    Ok((existing, true))
                }
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use crate::db::SqliteRepository;
    use crate::db::sqlite::{ensure_profile, init_db};
    use crate::models::{NewReference, Post, Profile, ProfileChanges, ReadingEvent, TimelinePost};
    use crate::terms::KeywordExtractor;

    const DOE: &str =
        "@article{doe2023,title={A Study},author={Doe, J.},year={2023},abstract={We study X.}}";

    async fn setup() -> (SqliteRepository, Uuid) {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let user_id = Uuid::new_v4();
        ensure_profile(&pool, user_id, "Ada").await.unwrap();
        (SqliteRepository::new(pool), user_id)
    }

    async fn post_count(repo: &SqliteRepository) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(repo.pool())
            .await
            .unwrap()
    }

    /// SQLite with switchable failures: term writes can be rejected, and the
    /// next fingerprint lookup can miss as if another request raced us.
    struct FlakyRepository {
        inner: SqliteRepository,
        fail_terms: AtomicBool,
        hide_next_lookup: AtomicBool,
    }

    impl FlakyRepository {
        fn new(inner: SqliteRepository) -> Self {
            Self {
                inner,
                fail_terms: AtomicBool::new(false),
                hide_next_lookup: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Repository for FlakyRepository {
        async fn fetch_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
            self.inner.fetch_profile(user_id).await
        }

        async fn update_profile(&self, user_id: Uuid, changes: &ProfileChanges) -> AppResult<()> {
            self.inner.update_profile(user_id, changes).await
        }

        async fn find_reference_by_fingerprint(
            &self,
            fingerprint: &str,
        ) -> AppResult<Option<Reference>> {
            if self.hide_next_lookup.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_reference_by_fingerprint(fingerprint).await
        }

        async fn insert_reference(&self, reference: &NewReference) -> AppResult<Reference> {
            self.inner.insert_reference(reference).await
        }

        async fn insert_post(&self, post: &NewPost) -> AppResult<Post> {
            self.inner.insert_post(post).await
        }

        async fn insert_post_terms(&self, terms: &[PostTerm]) -> AppResult<()> {
            if self.fail_terms.load(Ordering::SeqCst) {
                return Err(AppError::Persistence("post_terms request returned 403".into()));
            }
            self.inner.insert_post_terms(terms).await
        }

        async fn delete_post(&self, post_id: Uuid) -> AppResult<()> {
            self.inner.delete_post(post_id).await
        }

        async fn fetch_timeline(&self, limit: i64) -> AppResult<Vec<TimelinePost>> {
            self.inner.fetch_timeline(limit).await
        }

        async fn fetch_reading_events(
            &self,
            user_id: Option<Uuid>,
        ) -> AppResult<Vec<ReadingEvent>> {
            self.inner.fetch_reading_events(user_id).await
        }
    }

    #[tokio::test]
    async fn valid_entry_creates_one_post() {
        let (repo, user_id) = setup().await;
        let extractor = KeywordExtractor::default();

        let outcome = ingest_bibtex(&repo, &extractor, user_id, DOE, Some("  "))
            .await
            .unwrap();

        assert_eq!(outcome.bibtex_key.as_deref(), Some("doe2023"));
        assert!(!outcome.reference_reused);
        assert_eq!(outcome.terms, vec!["study".to_string()]);
        assert_eq!(post_count(&repo).await, 1);

        let timeline = repo.fetch_timeline(10).await.unwrap();
        assert_eq!(timeline[0].id, outcome.post_id);
        assert_eq!(timeline[0].user_id, user_id);
        assert_eq!(timeline[0].note, None);
        assert_eq!(timeline[0].reference.bibtex_key.as_deref(), Some("doe2023"));
    }

    #[tokio::test]
    async fn missing_abstract_is_rejected_without_writing() {
        let (repo, user_id) = setup().await;
        let err = ingest_bibtex(
            &repo,
            &KeywordExtractor::default(),
            user_id,
            "@article{doe2023,title={A Study}}",
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(post_count(&repo).await, 0);
    }

    #[tokio::test]
    async fn malformed_text_is_a_parse_error() {
        let (repo, user_id) = setup().await;
        let err = ingest_bibtex(
            &repo,
            &KeywordExtractor::default(),
            user_id,
            "just some notes about a paper",
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Parse(_)));
        assert_eq!(post_count(&repo).await, 0);
    }

    #[tokio::test]
    async fn reingesting_reuses_the_reference() {
        let (repo, user_id) = setup().await;
        let extractor = KeywordExtractor::default();

        let first = ingest_bibtex(&repo, &extractor, user_id, DOE, None).await.unwrap();
        let again = DOE.replace("A Study", "A  study!");
        let second = ingest_bibtex(&repo, &extractor, user_id, &again, Some("second pass"))
            .await
            .unwrap();

        assert!(second.reference_reused);
        assert_eq!(first.reference_id, second.reference_id);
        assert_ne!(first.post_id, second.post_id);
        assert_eq!(post_count(&repo).await, 2);
    }

    #[tokio::test]
    async fn unknown_user_is_a_persistence_error() {
        let (repo, _) = setup().await;
        let err = ingest_bibtex(&repo, &KeywordExtractor::default(), Uuid::new_v4(), DOE, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[tokio::test]
    async fn failed_term_insert_leaves_no_post_behind() {
        let (inner, user_id) = setup().await;
        let repo = FlakyRepository::new(inner);
        let extractor = KeywordExtractor::default();
        repo.fail_terms.store(true, Ordering::SeqCst);

        let err = ingest_bibtex(&repo, &extractor, user_id, DOE, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(post_count(&repo.inner).await, 0);

        repo.fail_terms.store(false, Ordering::SeqCst);
        let retry = ingest_bibtex(&repo, &extractor, user_id, DOE, None).await.unwrap();
        assert!(retry.reference_reused);
        assert_eq!(post_count(&repo.inner).await, 1);
    }

    #[tokio::test]
    async fn concurrent_reference_insert_is_reused() {
        let (inner, user_id) = setup().await;
        let repo = FlakyRepository::new(inner);
        let extractor = KeywordExtractor::default();

        let first = ingest_bibtex(&repo, &extractor, user_id, DOE, None).await.unwrap();
        repo.hide_next_lookup.store(true, Ordering::SeqCst);
        let second = ingest_bibtex(&repo, &extractor, user_id, DOE, None).await.unwrap();

        assert!(second.reference_reused);
        assert_eq!(first.reference_id, second.reference_id);
        assert_eq!(post_count(&repo.inner).await, 2);
    }
}
