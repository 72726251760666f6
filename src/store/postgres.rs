/// Postgres実装のドキュメントストア。
///
/// 各コンテナはJSONBドキュメント + 述語用の列（カテゴリ、ステータス、
/// タイムスタンプ）で構成します。ETagは `version` 列、変更フィードは
/// グローバルシーケンス `seq` 列とリーステーブルで実現します。
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::changefeed::ChangeBatch;
use super::models::{
    Article, BatchJob, Category, Cluster, Container, FeedPollState, StoryStatus, UserInteraction,
    UserProfile,
};
use super::{Etag, NewsStore, ReplaceOutcome, UpsertOutcome};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// コンテナとリーステーブルを作成する（存在すれば何もしない）。
    ///
    /// 起動時に一度だけ呼び出します。
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r"
            CREATE SEQUENCE IF NOT EXISTS raw_articles_seq;
            CREATE SEQUENCE IF NOT EXISTS story_clusters_seq;

            CREATE TABLE IF NOT EXISTS raw_articles (
                id TEXT PRIMARY KEY,
                published_date DATE NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                doc JSONB NOT NULL,
                seq BIGINT NOT NULL DEFAULT nextval('raw_articles_seq')
            );
            CREATE INDEX IF NOT EXISTS raw_articles_seq_idx ON raw_articles (seq);
            CREATE INDEX IF NOT EXISTS raw_articles_updated_idx ON raw_articles (updated_at);

            CREATE TABLE IF NOT EXISTS story_clusters (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                status TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                first_seen TIMESTAMPTZ NOT NULL,
                last_updated TIMESTAMPTZ NOT NULL,
                doc JSONB NOT NULL,
                version BIGINT NOT NULL DEFAULT 1,
                seq BIGINT NOT NULL DEFAULT nextval('story_clusters_seq')
            );
            CREATE INDEX IF NOT EXISTS story_clusters_seq_idx ON story_clusters (seq);
            CREATE INDEX IF NOT EXISTS story_clusters_recent_idx
                ON story_clusters (category, last_updated);
            CREATE INDEX IF NOT EXISTS story_clusters_status_idx ON story_clusters (status);
            CREATE INDEX IF NOT EXISTS story_clusters_fingerprint_idx
                ON story_clusters (category, fingerprint);

            CREATE TABLE IF NOT EXISTS batch_tracking (
                batch_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                doc JSONB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feed_poll_state (
                feed_url TEXT PRIMARY KEY,
                doc JSONB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_profiles (
                id TEXT PRIMARY KEY,
                doc JSONB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_interactions (
                id BIGSERIAL PRIMARY KEY,
                user_id TEXT NOT NULL,
                cluster_id TEXT NOT NULL,
                doc JSONB NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS user_interactions_user_idx
                ON user_interactions (user_id);
            CREATE INDEX IF NOT EXISTS user_interactions_occurred_idx
                ON user_interactions (occurred_at);

            CREATE TABLE IF NOT EXISTS leases (
                container TEXT NOT NULL,
                lease TEXT NOT NULL,
                cursor BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (container, lease)
            );
            ",
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure store schema")?;
        Ok(())
    }

    async fn lease_cursor(&self, container: Container, lease: &str) -> Result<i64> {
        let row = sqlx::query(r"SELECT cursor FROM leases WHERE container = $1 AND lease = $2")
            .bind(container.as_str())
            .bind(lease)
            .fetch_optional(&self.pool)
            .await
            .context("failed to read lease cursor")?;

        Ok(row
            .map(|r| r.try_get::<i64, _>("cursor"))
            .transpose()
            .context("lease row missing cursor column")?
            .unwrap_or(0))
    }

    fn decode_clusters(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<Cluster>> {
        rows.into_iter()
            .map(|row| {
                let doc: Json<serde_json::Value> = row
                    .try_get("doc")
                    .context("cluster row missing doc column")?;
                serde_json::from_value(doc.0).context("failed to decode cluster document")
            })
            .collect()
    }
}

#[async_trait]
impl NewsStore for PgStore {
    async fn upsert_article(&self, article: &Article) -> Result<UpsertOutcome> {
        let doc = serde_json::to_value(article).context("failed to encode article")?;

        // 既存行では保存済みの fetched_at を保持したままドキュメントを置き換える。
        // xmax = 0 は挿入（更新ではない）ことを示す。
        let row = sqlx::query(
            r"
            INSERT INTO raw_articles (id, published_date, updated_at, doc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                doc = jsonb_set(EXCLUDED.doc, '{fetched_at}', raw_articles.doc->'fetched_at'),
                updated_at = EXCLUDED.updated_at,
                seq = nextval('raw_articles_seq')
            RETURNING (xmax = 0) AS created
            ",
        )
        .bind(&article.id)
        .bind(article.published_at.date_naive())
        .bind(article.updated_at)
        .bind(Json(doc))
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert article")?;

        let created: bool = row
            .try_get("created")
            .context("upsert result missing created column")?;
        Ok(if created {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let row = sqlx::query(r"SELECT doc FROM raw_articles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch article")?;

        row.map(|r| {
            let doc: Json<serde_json::Value> =
                r.try_get("doc").context("article row missing doc column")?;
            serde_json::from_value(doc.0).context("failed to decode article document")
        })
        .transpose()
    }

    async fn purge_articles_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(r"DELETE FROM raw_articles WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to purge expired articles")?;
        Ok(result.rows_affected())
    }

    async fn create_cluster(&self, cluster: &Cluster) -> Result<Etag> {
        let doc = serde_json::to_value(cluster).context("failed to encode cluster")?;

        sqlx::query(
            r"
            INSERT INTO story_clusters
                (id, category, status, fingerprint, first_seen, last_updated, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(&cluster.id)
        .bind(cluster.category.as_str())
        .bind(cluster.status.as_str())
        .bind(&cluster.fingerprint)
        .bind(cluster.first_seen)
        .bind(cluster.last_updated)
        .bind(Json(doc))
        .execute(&self.pool)
        .await
        .context("failed to create cluster")?;

        Ok(Etag::new("1"))
    }

    async fn read_cluster(
        &self,
        id: &str,
        category: Category,
    ) -> Result<Option<(Cluster, Etag)>> {
        let row = sqlx::query(
            r"SELECT doc, version FROM story_clusters WHERE id = $1 AND category = $2",
        )
        .bind(id)
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to read cluster")?;

        row.map(|r| {
            let doc: Json<serde_json::Value> =
                r.try_get("doc").context("cluster row missing doc column")?;
            let version: i64 = r
                .try_get("version")
                .context("cluster row missing version column")?;
            let cluster: Cluster =
                serde_json::from_value(doc.0).context("failed to decode cluster document")?;
            Ok((cluster, Etag::new(version.to_string())))
        })
        .transpose()
    }

    async fn find_cluster(&self, id: &str) -> Result<Option<(Cluster, Etag)>> {
        let row = sqlx::query(r"SELECT doc, version FROM story_clusters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to find cluster")?;

        row.map(|r| {
            let doc: Json<serde_json::Value> =
                r.try_get("doc").context("cluster row missing doc column")?;
            let version: i64 = r
                .try_get("version")
                .context("cluster row missing version column")?;
            let cluster: Cluster =
                serde_json::from_value(doc.0).context("failed to decode cluster document")?;
            Ok((cluster, Etag::new(version.to_string())))
        })
        .transpose()
    }

    async fn replace_cluster(&self, cluster: &Cluster, etag: &Etag) -> Result<ReplaceOutcome> {
        let Ok(expected_version) = etag.as_str().parse::<i64>() else {
            return Ok(ReplaceOutcome::Conflict);
        };
        let doc = serde_json::to_value(cluster).context("failed to encode cluster")?;

        let row = sqlx::query(
            r"
            UPDATE story_clusters SET
                doc = $3,
                status = $4,
                fingerprint = $5,
                last_updated = $6,
                version = version + 1,
                seq = nextval('story_clusters_seq')
            WHERE id = $1 AND version = $2
            RETURNING version
            ",
        )
        .bind(&cluster.id)
        .bind(expected_version)
        .bind(Json(doc))
        .bind(cluster.status.as_str())
        .bind(&cluster.fingerprint)
        .bind(cluster.last_updated)
        .fetch_optional(&self.pool)
        .await
        .context("failed to replace cluster")?;

        match row {
            Some(r) => {
                let version: i64 = r
                    .try_get("version")
                    .context("replace result missing version column")?;
                Ok(ReplaceOutcome::Applied(Etag::new(version.to_string())))
            }
            None => Ok(ReplaceOutcome::Conflict),
        }
    }

    async fn query_recent_clusters(
        &self,
        category: Option<Category>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Cluster>> {
        // 順序付けなしのページを返す。並べ替えは呼び出し側が行う。
        let rows = sqlx::query(
            r"
            SELECT doc FROM story_clusters
            WHERE ($1::TEXT IS NULL OR category = $1) AND last_updated >= $2
            LIMIT $3
            ",
        )
        .bind(category.map(Category::as_str))
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to query recent clusters")?;

        Self::decode_clusters(rows)
    }

    async fn query_by_fingerprint(
        &self,
        fingerprint: &str,
        category: Category,
        since_hours: u32,
    ) -> Result<Vec<Cluster>> {
        let since = Utc::now() - Duration::hours(i64::from(since_hours));
        let rows = sqlx::query(
            r"
            SELECT doc FROM story_clusters
            WHERE fingerprint = $1 AND category = $2 AND last_updated >= $3
            ",
        )
        .bind(fingerprint)
        .bind(category.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("failed to query clusters by fingerprint")?;

        Self::decode_clusters(rows)
    }

    async fn query_by_status(&self, status: StoryStatus, limit: usize) -> Result<Vec<Cluster>> {
        let rows = sqlx::query(r"SELECT doc FROM story_clusters WHERE status = $1 LIMIT $2")
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("failed to query clusters by status")?;

        Self::decode_clusters(rows)
    }

    async fn query_backfill_candidates(
        &self,
        first_seen_after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Cluster>> {
        let rows = sqlx::query(
            r"
            SELECT doc FROM story_clusters
            WHERE status <> 'MONITORING'
              AND doc->'summary' = 'null'::jsonb
              AND first_seen >= $1
            LIMIT $2
            ",
        )
        .bind(first_seen_after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to query backfill candidates")?;

        Self::decode_clusters(rows)
    }

    async fn pull_article_changes(
        &self,
        lease: &str,
        limit: usize,
    ) -> Result<ChangeBatch<Article>> {
        let cursor = self.lease_cursor(Container::RawArticles, lease).await?;

        let rows = sqlx::query(
            r"SELECT doc, seq FROM raw_articles WHERE seq > $1 ORDER BY seq ASC LIMIT $2",
        )
        .bind(cursor)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to pull article changes")?;

        let mut documents = Vec::with_capacity(rows.len());
        let mut last_seq = None;
        for row in rows {
            let doc: Json<serde_json::Value> = row
                .try_get("doc")
                .context("article row missing doc column")?;
            let seq: i64 = row.try_get("seq").context("article row missing seq column")?;
            documents
                .push(serde_json::from_value(doc.0).context("failed to decode article document")?);
            last_seq = Some(seq);
        }

        Ok(ChangeBatch {
            documents,
            cursor: last_seq,
        })
    }

    async fn pull_cluster_changes(
        &self,
        lease: &str,
        limit: usize,
    ) -> Result<ChangeBatch<Cluster>> {
        let cursor = self.lease_cursor(Container::StoryClusters, lease).await?;

        let rows = sqlx::query(
            r"SELECT doc, seq FROM story_clusters WHERE seq > $1 ORDER BY seq ASC LIMIT $2",
        )
        .bind(cursor)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to pull cluster changes")?;

        let mut documents = Vec::with_capacity(rows.len());
        let mut last_seq = None;
        for row in rows {
            let doc: Json<serde_json::Value> = row
                .try_get("doc")
                .context("cluster row missing doc column")?;
            let seq: i64 = row.try_get("seq").context("cluster row missing seq column")?;
            documents
                .push(serde_json::from_value(doc.0).context("failed to decode cluster document")?);
            last_seq = Some(seq);
        }

        Ok(ChangeBatch {
            documents,
            cursor: last_seq,
        })
    }

    async fn commit_lease(&self, container: Container, lease: &str, cursor: i64) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO leases (container, lease, cursor, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (container, lease) DO UPDATE SET
                cursor = EXCLUDED.cursor,
                updated_at = NOW()
            ",
        )
        .bind(container.as_str())
        .bind(lease)
        .bind(cursor)
        .execute(&self.pool)
        .await
        .context("failed to commit lease cursor")?;
        Ok(())
    }

    async fn upsert_feed_state(&self, state: &FeedPollState) -> Result<()> {
        let doc = serde_json::to_value(state).context("failed to encode feed state")?;
        sqlx::query(
            r"
            INSERT INTO feed_poll_state (feed_url, doc)
            VALUES ($1, $2)
            ON CONFLICT (feed_url) DO UPDATE SET doc = EXCLUDED.doc
            ",
        )
        .bind(&state.feed_url)
        .bind(Json(doc))
        .execute(&self.pool)
        .await
        .context("failed to upsert feed state")?;
        Ok(())
    }

    async fn list_feed_states(&self) -> Result<Vec<FeedPollState>> {
        let rows = sqlx::query(r"SELECT doc FROM feed_poll_state")
            .fetch_all(&self.pool)
            .await
            .context("failed to list feed states")?;

        rows.into_iter()
            .map(|row| {
                let doc: Json<serde_json::Value> = row
                    .try_get("doc")
                    .context("feed state row missing doc column")?;
                serde_json::from_value(doc.0).context("failed to decode feed state document")
            })
            .collect()
    }

    async fn upsert_batch_job(&self, job: &BatchJob) -> Result<()> {
        let doc = serde_json::to_value(job).context("failed to encode batch job")?;

        sqlx::query(
            r"
            INSERT INTO batch_tracking (batch_id, status, doc)
            VALUES ($1, $2, $3)
            ON CONFLICT (batch_id) DO UPDATE SET
                status = EXCLUDED.status,
                doc = EXCLUDED.doc
            ",
        )
        .bind(&job.batch_id)
        .bind(job.status.as_str())
        .bind(Json(doc))
        .execute(&self.pool)
        .await
        .context("failed to upsert batch job")?;
        Ok(())
    }

    async fn list_open_batch_jobs(&self) -> Result<Vec<BatchJob>> {
        let rows = sqlx::query(
            r"SELECT doc FROM batch_tracking WHERE status IN ('submitted', 'in_progress')",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list open batch jobs")?;

        rows.into_iter()
            .map(|row| {
                let doc: Json<serde_json::Value> = row
                    .try_get("doc")
                    .context("batch job row missing doc column")?;
                serde_json::from_value(doc.0).context("failed to decode batch job document")
            })
            .collect()
    }

    async fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query(r"SELECT doc FROM user_profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch user profile")?;

        row.map(|r| {
            let doc: Json<serde_json::Value> =
                r.try_get("doc").context("profile row missing doc column")?;
            serde_json::from_value(doc.0).context("failed to decode user profile")
        })
        .transpose()
    }

    async fn upsert_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let doc = serde_json::to_value(profile).context("failed to encode user profile")?;
        sqlx::query(
            r"
            INSERT INTO user_profiles (id, doc)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc
            ",
        )
        .bind(&profile.id)
        .bind(Json(doc))
        .execute(&self.pool)
        .await
        .context("failed to upsert user profile")?;
        Ok(())
    }

    async fn record_interaction(&self, interaction: &UserInteraction) -> Result<()> {
        let doc = serde_json::to_value(interaction).context("failed to encode interaction")?;
        sqlx::query(
            r"
            INSERT INTO user_interactions (user_id, cluster_id, doc, occurred_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&interaction.user_id)
        .bind(&interaction.cluster_id)
        .bind(Json(doc))
        .bind(interaction.occurred_at)
        .execute(&self.pool)
        .await
        .context("failed to record interaction")?;
        Ok(())
    }

    async fn purge_interactions_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(r"DELETE FROM user_interactions WHERE occurred_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to purge expired interactions")?;
        Ok(result.rows_affected())
    }
}
