/// ドキュメントストアアダプター。
///
/// クラスタへの書き込みはすべてETagガード付きで行い、変更フィードは
/// リースに保存したカーソルから再開可能（at-least-once配信）です。
pub mod changefeed;
pub mod memory;
pub mod models;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use self::changefeed::ChangeBatch;
use self::models::{
    Article, BatchJob, Category, Cluster, Container, FeedPollState, StoryStatus, UserInteraction,
    UserProfile,
};

/// ストアが発行する不透明な同時実行トークン。
///
/// 呼び出し側が内容を解釈することはありません。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Etag(String);

impl Etag {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 記事upsertの結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// ETagガード付き置換の結果。
///
/// `Conflict` はサーバー側のETagが一致しなかったことを示し、呼び出し側は
/// 再読込のうえ再試行します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Applied(Etag),
    Conflict,
}

/// ドキュメントストアに対する型付き操作。
///
/// 本番実装は [`postgres::PgStore`]、テスト用フェイクは
/// [`memory::MemoryStore`] です。
#[async_trait]
pub trait NewsStore: Send + Sync {
    // -- articles ---------------------------------------------------------

    /// 記事をupsertする。既存IDの場合は `fetched_at` を保存済みの値のまま
    /// 維持し、それ以外のフィールドを置き換える。
    async fn upsert_article(&self, article: &Article) -> Result<UpsertOutcome>;

    async fn get_article(&self, id: &str) -> Result<Option<Article>>;

    /// 保持期限を過ぎた記事を削除し、削除件数を返す。
    async fn purge_articles_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    // -- clusters ---------------------------------------------------------

    async fn create_cluster(&self, cluster: &Cluster) -> Result<Etag>;

    /// パーティションキー（カテゴリ）指定でクラスタを読み取る。
    async fn read_cluster(&self, id: &str, category: Category)
    -> Result<Option<(Cluster, Etag)>>;

    /// パーティション横断でクラスタを読み取る（読み取りAPI用）。
    async fn find_cluster(&self, id: &str) -> Result<Option<(Cluster, Etag)>>;

    /// ETagが一致する場合のみクラスタを置き換える。
    async fn replace_cluster(&self, cluster: &Cluster, etag: &Etag) -> Result<ReplaceOutcome>;

    /// `last_updated` が `since` 以降のクラスタを返す。
    ///
    /// 返却ページは順序不定。並べ替えは呼び出し側がメモリ上で行います。
    async fn query_recent_clusters(
        &self,
        category: Option<Category>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Cluster>>;

    async fn query_by_fingerprint(
        &self,
        fingerprint: &str,
        category: Category,
        since_hours: u32,
    ) -> Result<Vec<Cluster>>;

    async fn query_by_status(&self, status: StoryStatus, limit: usize) -> Result<Vec<Cluster>>;

    /// バッチ要約の対象候補（MONITORING以外・サマリー未生成・
    /// `first_seen` が指定時刻以降）を返す。
    async fn query_backfill_candidates(
        &self,
        first_seen_after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Cluster>>;

    // -- change feed ------------------------------------------------------

    /// 記事コンテナの変更フィードからリースカーソル以降のドキュメントを取得する。
    async fn pull_article_changes(&self, lease: &str, limit: usize)
    -> Result<ChangeBatch<Article>>;

    /// クラスタコンテナの変更フィードからリースカーソル以降のドキュメントを取得する。
    async fn pull_cluster_changes(&self, lease: &str, limit: usize)
    -> Result<ChangeBatch<Cluster>>;

    /// 処理済みバッチのカーソルをリースに記録する。
    ///
    /// ハンドラー完了後にのみ呼び出すこと。クラッシュ時は未コミット分が
    /// 再配信されるため、ハンドラーは冪等である必要があります。
    async fn commit_lease(&self, container: Container, lease: &str, cursor: i64) -> Result<()>;

    // -- feed poll state --------------------------------------------------

    async fn upsert_feed_state(&self, state: &FeedPollState) -> Result<()>;

    async fn list_feed_states(&self) -> Result<Vec<FeedPollState>>;

    // -- batch jobs -------------------------------------------------------

    async fn upsert_batch_job(&self, job: &BatchJob) -> Result<()>;

    /// 終端状態に達していないバッチジョブを返す。
    async fn list_open_batch_jobs(&self) -> Result<Vec<BatchJob>>;

    // -- users ------------------------------------------------------------

    async fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn upsert_user_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn record_interaction(&self, interaction: &UserInteraction) -> Result<()>;

    async fn purge_interactions_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
