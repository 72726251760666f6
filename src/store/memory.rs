/// インメモリのストア実装（テスト用フェイク）。
///
/// 本番実装と同じETag・変更フィードのセマンティクスを、プロセス内の
/// マップとシーケンス番号で再現します。
use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::changefeed::ChangeBatch;
use super::models::{
    Article, BatchJob, Category, Cluster, Container, FeedPollState, StoryStatus, UserInteraction,
    UserProfile,
};
use super::{Etag, NewsStore, ReplaceOutcome, UpsertOutcome};

#[derive(Debug, Clone)]
struct Versioned<T> {
    doc: T,
    version: u64,
    seq: i64,
}

#[derive(Debug, Default)]
struct Inner {
    articles: HashMap<String, Versioned<Article>>,
    clusters: HashMap<String, Versioned<Cluster>>,
    feed_states: HashMap<String, FeedPollState>,
    batch_jobs: HashMap<String, BatchJob>,
    profiles: HashMap<String, UserProfile>,
    interactions: Vec<UserInteraction>,
    leases: HashMap<(String, String), i64>,
    article_seq: i64,
    cluster_seq: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lease_cursor(inner: &Inner, container: Container, lease: &str) -> i64 {
        inner
            .leases
            .get(&(container.as_str().to_string(), lease.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl NewsStore for MemoryStore {
    async fn upsert_article(&self, article: &Article) -> Result<UpsertOutcome> {
        let mut inner = self.inner.write().expect("store lock");
        inner.article_seq += 1;
        let seq = inner.article_seq;

        match inner.articles.get_mut(&article.id) {
            Some(existing) => {
                let mut replacement = article.clone();
                // 初回取得時刻は上書きしない
                replacement.fetched_at = existing.doc.fetched_at;
                existing.doc = replacement;
                existing.version += 1;
                existing.seq = seq;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                inner.articles.insert(
                    article.id.clone(),
                    Versioned {
                        doc: article.clone(),
                        version: 1,
                        seq,
                    },
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner.articles.get(id).map(|v| v.doc.clone()))
    }

    async fn purge_articles_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().expect("store lock");
        let before = inner.articles.len();
        inner.articles.retain(|_, v| v.doc.updated_at >= cutoff);
        Ok((before - inner.articles.len()) as u64)
    }

    async fn create_cluster(&self, cluster: &Cluster) -> Result<Etag> {
        let mut inner = self.inner.write().expect("store lock");
        anyhow::ensure!(
            !inner.clusters.contains_key(&cluster.id),
            "cluster already exists: {}",
            cluster.id
        );
        inner.cluster_seq += 1;
        let seq = inner.cluster_seq;
        inner.clusters.insert(
            cluster.id.clone(),
            Versioned {
                doc: cluster.clone(),
                version: 1,
                seq,
            },
        );
        Ok(Etag::new("1"))
    }

    async fn read_cluster(
        &self,
        id: &str,
        category: Category,
    ) -> Result<Option<(Cluster, Etag)>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner
            .clusters
            .get(id)
            .filter(|v| v.doc.category == category)
            .map(|v| (v.doc.clone(), Etag::new(v.version.to_string()))))
    }

    async fn find_cluster(&self, id: &str) -> Result<Option<(Cluster, Etag)>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner
            .clusters
            .get(id)
            .map(|v| (v.doc.clone(), Etag::new(v.version.to_string()))))
    }

    async fn replace_cluster(&self, cluster: &Cluster, etag: &Etag) -> Result<ReplaceOutcome> {
        let mut inner = self.inner.write().expect("store lock");
        inner.cluster_seq += 1;
        let seq = inner.cluster_seq;

        let Some(existing) = inner.clusters.get_mut(&cluster.id) else {
            return Ok(ReplaceOutcome::Conflict);
        };
        if existing.version.to_string() != etag.as_str() {
            return Ok(ReplaceOutcome::Conflict);
        }

        existing.doc = cluster.clone();
        existing.version += 1;
        existing.seq = seq;
        Ok(ReplaceOutcome::Applied(Etag::new(
            existing.version.to_string(),
        )))
    }

    async fn query_recent_clusters(
        &self,
        category: Option<Category>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Cluster>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner
            .clusters
            .values()
            .filter(|v| category.is_none_or(|c| v.doc.category == c))
            .filter(|v| v.doc.last_updated >= since)
            .take(limit)
            .map(|v| v.doc.clone())
            .collect())
    }

    async fn query_by_fingerprint(
        &self,
        fingerprint: &str,
        category: Category,
        since_hours: u32,
    ) -> Result<Vec<Cluster>> {
        let since = Utc::now() - Duration::hours(i64::from(since_hours));
        let inner = self.inner.read().expect("store lock");
        Ok(inner
            .clusters
            .values()
            .filter(|v| v.doc.fingerprint == fingerprint && v.doc.category == category)
            .filter(|v| v.doc.last_updated >= since)
            .map(|v| v.doc.clone())
            .collect())
    }

    async fn query_by_status(&self, status: StoryStatus, limit: usize) -> Result<Vec<Cluster>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner
            .clusters
            .values()
            .filter(|v| v.doc.status == status)
            .take(limit)
            .map(|v| v.doc.clone())
            .collect())
    }

    async fn query_backfill_candidates(
        &self,
        first_seen_after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Cluster>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner
            .clusters
            .values()
            .filter(|v| v.doc.status != StoryStatus::Monitoring)
            .filter(|v| v.doc.summary.is_none())
            .filter(|v| v.doc.first_seen >= first_seen_after)
            .take(limit)
            .map(|v| v.doc.clone())
            .collect())
    }

    async fn pull_article_changes(
        &self,
        lease: &str,
        limit: usize,
    ) -> Result<ChangeBatch<Article>> {
        let inner = self.inner.read().expect("store lock");
        let cursor = Self::lease_cursor(&inner, Container::RawArticles, lease);

        let mut changed: Vec<&Versioned<Article>> = inner
            .articles
            .values()
            .filter(|v| v.seq > cursor)
            .collect();
        changed.sort_by_key(|v| v.seq);
        changed.truncate(limit);

        let cursor = changed.last().map(|v| v.seq);
        Ok(ChangeBatch {
            documents: changed.into_iter().map(|v| v.doc.clone()).collect(),
            cursor,
        })
    }

    async fn pull_cluster_changes(
        &self,
        lease: &str,
        limit: usize,
    ) -> Result<ChangeBatch<Cluster>> {
        let inner = self.inner.read().expect("store lock");
        let cursor = Self::lease_cursor(&inner, Container::StoryClusters, lease);

        let mut changed: Vec<&Versioned<Cluster>> = inner
            .clusters
            .values()
            .filter(|v| v.seq > cursor)
            .collect();
        changed.sort_by_key(|v| v.seq);
        changed.truncate(limit);

        let cursor = changed.last().map(|v| v.seq);
        Ok(ChangeBatch {
            documents: changed.into_iter().map(|v| v.doc.clone()).collect(),
            cursor,
        })
    }

    async fn commit_lease(&self, container: Container, lease: &str, cursor: i64) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner
            .leases
            .insert((container.as_str().to_string(), lease.to_string()), cursor);
        Ok(())
    }

    async fn upsert_feed_state(&self, state: &FeedPollState) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner
            .feed_states
            .insert(state.feed_url.clone(), state.clone());
        Ok(())
    }

    async fn list_feed_states(&self) -> Result<Vec<FeedPollState>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner.feed_states.values().cloned().collect())
    }

    async fn upsert_batch_job(&self, job: &BatchJob) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner.batch_jobs.insert(job.batch_id.clone(), job.clone());
        Ok(())
    }

    async fn list_open_batch_jobs(&self) -> Result<Vec<BatchJob>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner
            .batch_jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner.profiles.get(user_id).cloned())
    }

    async fn upsert_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner.profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn record_interaction(&self, interaction: &UserInteraction) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner.interactions.push(interaction.clone());
        Ok(())
    }

    async fn purge_interactions_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().expect("store lock");
        let before = inner.interactions.len();
        inner.interactions.retain(|i| i.occurred_at >= cutoff);
        Ok((before - inner.interactions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::super::models::SummaryVersion;
    use super::*;
    use std::collections::BTreeMap;

    fn sample_article(id_url: &str, source: &str) -> Article {
        let url = format!("https://example.com/{id_url}");
        Article {
            id: Article::derive_id(source, &url),
            source: source.to_string(),
            source_tier: 1,
            url,
            title: "Sample Title".into(),
            description: "desc".into(),
            content: String::new(),
            published_at: Utc::now(),
            fetched_at: Utc::now(),
            updated_at: Utc::now(),
            category: Category::World,
            language: "en".into(),
            entities: BTreeMap::new(),
            fingerprint: "abc123".into(),
        }
    }

    fn sample_cluster(id: &str) -> Cluster {
        Cluster {
            id: id.into(),
            category: Category::World,
            title: "Sample".into(),
            summary: None,
            source_articles: vec!["ap_000000000001".into()],
            status: StoryStatus::Monitoring,
            verification_level: 1,
            first_seen: Utc::now(),
            last_updated: Utc::now(),
            update_count: 0,
            entities: BTreeMap::new(),
            fingerprint: "abc123".into(),
        }
    }

    #[tokio::test]
    async fn upsert_preserves_fetched_at() {
        let store = MemoryStore::new();
        let mut article = sample_article("a", "ap");
        let original_fetch = article.fetched_at;

        assert_eq!(
            store.upsert_article(&article).await.unwrap(),
            UpsertOutcome::Created
        );

        article.title = "Updated Title".into();
        article.fetched_at = Utc::now() + Duration::hours(1);
        article.updated_at = Utc::now() + Duration::hours(1);
        assert_eq!(
            store.upsert_article(&article).await.unwrap(),
            UpsertOutcome::Updated
        );

        let stored = store.get_article(&article.id).await.unwrap().unwrap();
        assert_eq!(stored.fetched_at, original_fetch);
        assert_eq!(stored.title, "Updated Title");
    }

    #[tokio::test]
    async fn replace_with_stale_etag_conflicts() {
        let store = MemoryStore::new();
        let cluster = sample_cluster("c1");
        let etag = store.create_cluster(&cluster).await.unwrap();

        let (mut c1, e1) = store
            .read_cluster("c1", Category::World)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(e1, etag);

        c1.update_count = 1;
        let outcome = store.replace_cluster(&c1, &e1).await.unwrap();
        assert!(matches!(outcome, ReplaceOutcome::Applied(_)));

        // 古いETagでの置換は拒否される
        let outcome = store.replace_cluster(&c1, &e1).await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::Conflict);
    }

    #[tokio::test]
    async fn read_cluster_respects_partition() {
        let store = MemoryStore::new();
        let cluster = sample_cluster("c1");
        store.create_cluster(&cluster).await.unwrap();

        assert!(
            store
                .read_cluster("c1", Category::Sports)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .read_cluster("c1", Category::World)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn change_feed_resumes_from_lease() {
        let store = MemoryStore::new();
        store
            .upsert_article(&sample_article("a", "ap"))
            .await
            .unwrap();
        store
            .upsert_article(&sample_article("b", "bbc"))
            .await
            .unwrap();

        let batch = store.pull_article_changes("test-lease", 10).await.unwrap();
        assert_eq!(batch.documents.len(), 2);
        let cursor = batch.cursor.unwrap();
        store
            .commit_lease(Container::RawArticles, "test-lease", cursor)
            .await
            .unwrap();

        // コミット後は新しい変更のみが配信される
        let batch = store.pull_article_changes("test-lease", 10).await.unwrap();
        assert!(batch.is_empty());

        store
            .upsert_article(&sample_article("c", "reuters"))
            .await
            .unwrap();
        let batch = store.pull_article_changes("test-lease", 10).await.unwrap();
        assert_eq!(batch.documents.len(), 1);
    }

    #[tokio::test]
    async fn change_feed_redelivers_uncommitted() {
        let store = MemoryStore::new();
        store
            .upsert_article(&sample_article("a", "ap"))
            .await
            .unwrap();

        let first = store.pull_article_changes("lease", 10).await.unwrap();
        let second = store.pull_article_changes("lease", 10).await.unwrap();
        assert_eq!(first.documents.len(), 1);
        assert_eq!(second.documents.len(), 1, "uncommitted batch is redelivered");
    }

    #[tokio::test]
    async fn fingerprint_query_filters_by_category_and_window() {
        let store = MemoryStore::new();

        let world = sample_cluster("c1");
        store.create_cluster(&world).await.unwrap();

        let mut sports = sample_cluster("c2");
        sports.category = Category::Sports;
        store.create_cluster(&sports).await.unwrap();

        let mut stale = sample_cluster("c3");
        stale.last_updated = Utc::now() - Duration::hours(72);
        store.create_cluster(&stale).await.unwrap();

        let hits = store
            .query_by_fingerprint("abc123", Category::World, 48)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c1");
    }

    #[tokio::test]
    async fn backfill_candidates_exclude_monitoring_and_summarised() {
        let store = MemoryStore::new();

        let mut monitoring = sample_cluster("c1");
        monitoring.status = StoryStatus::Monitoring;
        store.create_cluster(&monitoring).await.unwrap();

        let mut verified = sample_cluster("c2");
        verified.status = StoryStatus::Verified;
        store.create_cluster(&verified).await.unwrap();

        let mut summarised = sample_cluster("c3");
        summarised.status = StoryStatus::Verified;
        summarised.summary = Some(SummaryVersion {
            version: 1,
            text: "text".into(),
            generated_at: Utc::now(),
            model: "m".into(),
            word_count: 100,
            prompt_tokens: 10,
            completion_tokens: 10,
            cached_tokens: 0,
            cost_usd: 0.0,
            batch_processed: false,
            generation_time_ms: 5,
        });
        store.create_cluster(&summarised).await.unwrap();

        let candidates = store
            .query_backfill_candidates(Utc::now() - Duration::hours(48), 100)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "c2");
    }
}
