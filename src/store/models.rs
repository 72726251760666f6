/// ストアに永続化されるドキュメントモデル定義。
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 記事・クラスタが属する固定カテゴリ集合。
///
/// クラスタのパーティションキーであり、作成後に変化することはありません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    World,
    Us,
    Europe,
    Business,
    Tech,
    Science,
    Health,
    Sports,
    Entertainment,
    General,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::World,
        Category::Us,
        Category::Europe,
        Category::Business,
        Category::Tech,
        Category::Science,
        Category::Health,
        Category::Sports,
        Category::Entertainment,
        Category::General,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::World => "world",
            Category::Us => "us",
            Category::Europe => "europe",
            Category::Business => "business",
            Category::Tech => "tech",
            Category::Science => "science",
            Category::Health => "health",
            Category::Sports => "sports",
            Category::Entertainment => "entertainment",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// クラスタの検証ライフサイクル状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryStatus {
    Monitoring,
    Developing,
    Verified,
    Breaking,
    Archived,
}

impl StoryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StoryStatus::Monitoring => "MONITORING",
            StoryStatus::Developing => "DEVELOPING",
            StoryStatus::Verified => "VERIFIED",
            StoryStatus::Breaking => "BREAKING",
            StoryStatus::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 単一フィードから取得された1件の記事。
///
/// `id` はURL由来で安定しており、同一URLの再取得は同じドキュメントを
/// 上書きします。`fetched_at` は初回保存時のまま変化しません。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub source: String,
    pub source_tier: u8,
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub content: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category: Category,
    pub language: String,
    #[serde(default)]
    pub entities: BTreeMap<String, u32>,
    pub fingerprint: String,
}

impl Article {
    /// `source + "_" + md5(url)[0:12]` 形式の安定IDを導出する。
    #[must_use]
    pub fn derive_id(source: &str, canonical_url: &str) -> String {
        let digest = md5::compute(canonical_url.as_bytes());
        let hex = format!("{digest:x}");
        format!("{source}_{}", &hex[..12])
    }
}

/// 記事IDからソーストークンを取り出す。
///
/// IDの末尾はアンダースコア区切りの12桁ハッシュなので、最後の区切りで
/// 分割すれば `abc_au` のような下線入りソースも正しく復元できます。
#[must_use]
pub fn source_of_article_id(article_id: &str) -> &str {
    article_id
        .rsplit_once('_')
        .map_or(article_id, |(source, _)| source)
}

/// クラスタに保持される現行サマリー。再生成時は全体が置き換わります。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryVersion {
    pub version: u32,
    pub text: String,
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub word_count: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub cost_usd: f64,
    pub batch_processed: bool,
    pub generation_time_ms: u64,
}

/// 同一の実世界イベントを扱う記事群（ストーリー）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub category: Category,
    pub title: String,
    #[serde(default)]
    pub summary: Option<SummaryVersion>,
    pub source_articles: Vec<String>,
    pub status: StoryStatus,
    pub verification_level: u8,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub update_count: u32,
    #[serde(default)]
    pub entities: BTreeMap<String, u32>,
    pub fingerprint: String,
}

impl Cluster {
    /// 時刻接頭辞付きの安定IDを生成する。
    #[must_use]
    pub fn derive_id(now: DateTime<Utc>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}", now.format("%Y%m%d%H%M%S"), &suffix[..8])
    }

    /// メンバーシップからユニークソース数を数える。
    #[must_use]
    pub fn unique_sources(&self) -> usize {
        let mut sources: Vec<&str> = self
            .source_articles
            .iter()
            .map(|id| source_of_article_id(id))
            .collect();
        sources.sort_unstable();
        sources.dedup();
        sources.len()
    }
}

/// 変更フィードの監視対象コンテナ。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    RawArticles,
    StoryClusters,
}

impl Container {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Container::RawArticles => "raw_articles",
            Container::StoryClusters => "story_clusters",
        }
    }
}

/// LLMプロバイダーへの未完了バッチ送信の追跡レコード。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Submitted,
    InProgress,
    Completed,
    Failed,
}

impl BatchStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Submitted => "submitted",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub batch_id: String,
    pub status: BatchStatus,
    pub cluster_ids: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub request_count: u32,
    pub succeeded_count: u32,
    pub errored_count: u32,
    pub total_cost_usd: f64,
}

/// フィード単位のポーリング状態。RSSワーカーのみが書き込みます。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPollState {
    pub feed_url: String,
    pub last_polled_at: DateTime<Utc>,
    pub last_outcome: PollOutcome,
    pub consecutive_failures: u32,
    #[serde(default)]
    pub quarantined_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    Success,
    Failure,
}

/// ユーザープロファイル（認証は外部サービスが担う）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub preferred_categories: Vec<Category>,
    #[serde(default)]
    pub device_tokens: Vec<String>,
    #[serde(default)]
    pub last_feed_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            preferred_categories: Vec::new(),
            device_tokens: Vec::new(),
            last_feed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Save,
    View,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInteraction {
    pub user_id: String,
    pub cluster_id: String,
    pub kind: InteractionKind,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn article_id_is_stable_for_a_url() {
        let a = Article::derive_id("ap", "https://apnews.com/x");
        let b = Article::derive_id("ap", "https://apnews.com/x");
        assert_eq!(a, b);
        assert!(a.starts_with("ap_"));
        assert_eq!(a.len(), "ap_".len() + 12);
    }

    #[test]
    fn article_id_differs_by_url() {
        let a = Article::derive_id("ap", "https://apnews.com/x");
        let b = Article::derive_id("ap", "https://apnews.com/y");
        assert_ne!(a, b);
    }

    #[test]
    fn source_recovered_from_id_with_underscores() {
        let id = Article::derive_id("abc_au", "https://abc.net.au/news/1");
        assert_eq!(source_of_article_id(&id), "abc_au");
    }

    #[test]
    fn cluster_id_is_time_prefixed() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 45).unwrap();
        let id = Cluster::derive_id(now);
        assert!(id.starts_with("20260301123045_"));
    }

    #[test]
    fn unique_sources_counts_distinct_tokens() {
        let cluster = Cluster {
            id: "c1".into(),
            category: Category::World,
            title: "t".into(),
            summary: None,
            source_articles: vec![
                "ap_000000000001".into(),
                "ap_000000000002".into(),
                "bbc_000000000003".into(),
            ],
            status: StoryStatus::Monitoring,
            verification_level: 1,
            first_seen: Utc::now(),
            last_updated: Utc::now(),
            update_count: 0,
            entities: BTreeMap::new(),
            fingerprint: "abc123".into(),
        };
        assert_eq!(cluster.unique_sources(), 2);
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn status_serialises_screaming_snake() {
        let json = serde_json::to_string(&StoryStatus::Breaking).unwrap();
        assert_eq!(json, "\"BREAKING\"");
    }
}
