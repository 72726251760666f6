/// ストーリー読み取りエンドポイント。
///
/// フィード・速報・検索・単一ストーリー取得を提供します。ストアは順序
/// 保証のないページを返すため、並べ替えはすべてメモリ上で行います。
/// 表示用のソース重複排除はこの層だけが行い、保存済みメンバーシップは
/// 変更しません。
use std::collections::{HashMap, HashSet};

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::AppState;
use crate::poller::feeds::display_name;
use crate::store::NewsStore;
use crate::store::models::{
    Article, Category, Cluster, InteractionKind, StoryStatus, SummaryVersion, UserInteraction,
    UserProfile,
};
use crate::util::time;

use super::auth::Identity;
use super::error::ApiError;

/// フィードが遡る時間窓。アーカイブ移行（30日）と揃えてある。
const FEED_WINDOW_DAYS: i64 = 30;

/// 検索が遡る時間窓。
const SEARCH_WINDOW_DAYS: i64 = 30;

const SCAN_LIMIT: usize = 2000;
const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub(crate) struct FeedQuery {
    offset: Option<usize>,
    limit: Option<usize>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InteractBody {
    action: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SummaryView {
    version: u32,
    text: String,
    generated_at: DateTime<Utc>,
    model: String,
    word_count: u32,
}

impl From<&SummaryVersion> for SummaryView {
    fn from(summary: &SummaryVersion) -> Self {
        Self {
            version: summary.version,
            text: summary.text.clone(),
            generated_at: summary.generated_at,
            model: summary.model.clone(),
            word_count: summary.word_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StoryListItem {
    id: String,
    category: Category,
    title: String,
    status: StoryStatus,
    verification_level: u8,
    first_seen: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    update_count: u32,
    source_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SummaryView>,
}

impl StoryListItem {
    fn from_cluster(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id.clone(),
            category: cluster.category,
            title: cluster.title.clone(),
            status: cluster.status,
            verification_level: cluster.verification_level,
            first_seen: cluster.first_seen,
            last_updated: cluster.last_updated,
            update_count: cluster.update_count,
            source_count: cluster.unique_sources(),
            summary: cluster.summary.as_ref().map(SummaryView::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SourceArticleView {
    id: String,
    source: String,
    source_name: &'static str,
    source_tier: u8,
    url: String,
    title: String,
    published_at: DateTime<Utc>,
}

impl From<&Article> for SourceArticleView {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id.clone(),
            source: article.source.clone(),
            source_name: display_name(&article.source),
            source_tier: article.source_tier,
            url: article.url.clone(),
            title: article.title.clone(),
            published_at: article.published_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StoryDetail {
    #[serde(flatten)]
    story: StoryListItem,
    sources: Vec<SourceArticleView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InteractResponse {
    status: &'static str,
}

/// `GET /api/stories/feed` — MONITORING以外を `last_updated` 降順で返す。
pub(crate) async fn feed(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<StoryListItem>>, ApiError> {
    let store = state.store();
    let now = time::now();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

    let explicit = match query.category.as_deref() {
        Some(raw) => match raw.parse::<Category>() {
            Ok(category) => Some(category),
            // 未知のカテゴリは合致なしとして扱う
            Err(_) => return Ok(Json(Vec::new())),
        },
        None => None,
    };

    let profile = store
        .get_user_profile(&identity.user_id)
        .await
        .map_err(ApiError::from)?;
    let preference_filter: Option<HashSet<Category>> = if explicit.is_none() {
        profile
            .as_ref()
            .filter(|p| !p.preferred_categories.is_empty())
            .map(|p| p.preferred_categories.iter().copied().collect())
    } else {
        None
    };

    let since = now - Duration::days(FEED_WINDOW_DAYS);
    let mut clusters = store
        .query_recent_clusters(explicit, since, SCAN_LIMIT)
        .await
        .map_err(ApiError::from)?;

    clusters.retain(|c| c.status != StoryStatus::Monitoring);
    if let Some(preferences) = &preference_filter {
        clusters.retain(|c| preferences.contains(&c.category));
    }
    sort_by_recency(&mut clusters);

    let page: Vec<StoryListItem> = clusters
        .iter()
        .skip(offset)
        .take(limit)
        .map(StoryListItem::from_cluster)
        .collect();

    // フィード閲覧時刻を記録する（失敗してもレスポンスは返す）
    let mut profile = profile.unwrap_or_else(|| UserProfile::new(&identity.user_id));
    profile.last_feed_at = Some(now);
    if let Err(error) = store.upsert_user_profile(&profile).await {
        warn!(error = %error, user = identity.user_id, "failed to update last_feed_at");
    }

    Ok(Json(page))
}

/// `GET /api/stories/breaking` — BREAKINGのみを新しい順で返す。
pub(crate) async fn breaking(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<StoryListItem>>, ApiError> {
    let limit = query.limit.unwrap_or(10).min(MAX_PAGE_SIZE);

    let mut clusters = state
        .store()
        .query_by_status(StoryStatus::Breaking, SCAN_LIMIT)
        .await
        .map_err(ApiError::from)?;
    sort_by_recency(&mut clusters);

    Ok(Json(
        clusters
            .iter()
            .take(limit)
            .map(StoryListItem::from_cluster)
            .collect(),
    ))
}

/// `GET /api/stories/search` — タイトルとサマリーに対する全文一致検索。
///
/// スコアはタイトル一致を2倍で数える単純な語頻度で、同点は
/// `last_updated` 降順・ID昇順で安定化します。
pub(crate) async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<StoryListItem>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let terms: Vec<String> = query
        .q
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let since = time::now() - Duration::days(SEARCH_WINDOW_DAYS);
    let clusters = state
        .store()
        .query_recent_clusters(None, since, SCAN_LIMIT)
        .await
        .map_err(ApiError::from)?;

    let mut scored: Vec<(usize, &Cluster)> = clusters
        .iter()
        .filter_map(|cluster| {
            let score = search_score(cluster, &terms);
            (score > 0).then_some((score, cluster))
        })
        .collect();
    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.last_updated.cmp(&a.1.last_updated))
            .then_with(|| a.1.id.cmp(&b.1.id))
    });

    Ok(Json(
        scored
            .into_iter()
            .take(limit)
            .map(|(_, cluster)| StoryListItem::from_cluster(cluster))
            .collect(),
    ))
}

/// `GET /api/stories/{id}` — クラスタ全体と重複排除済みソース。
pub(crate) async fn get_story(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoryDetail>, ApiError> {
    let Some((cluster, _)) = state
        .store()
        .find_cluster(&id)
        .await
        .map_err(ApiError::from)?
    else {
        return Err(ApiError::not_found(format!("unknown cluster: {id}")));
    };

    let (sources, duplicates) = deduped_sources(state.store().as_ref(), &cluster)
        .await
        .map_err(ApiError::from)?;
    state
        .telemetry()
        .metrics()
        .api_source_duplicates
        .inc_by(duplicates as f64);

    let mut story = StoryListItem::from_cluster(&cluster);
    story.source_count = sources.len();

    Ok(Json(StoryDetail {
        story,
        sources: sources.iter().map(SourceArticleView::from).collect(),
    }))
}

/// `GET /api/stories/{id}/sources` — 重複排除済みソースのみ。
pub(crate) async fn sources(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SourceArticleView>>, ApiError> {
    let Some((cluster, _)) = state
        .store()
        .find_cluster(&id)
        .await
        .map_err(ApiError::from)?
    else {
        return Err(ApiError::not_found(format!("unknown cluster: {id}")));
    };

    let (sources, _) = deduped_sources(state.store().as_ref(), &cluster)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(sources.iter().map(SourceArticleView::from).collect()))
}

/// `POST /api/stories/{id}/interact` — いいね/保存/閲覧を記録する。
pub(crate) async fn interact(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(body): Json<InteractBody>,
) -> Result<Json<InteractResponse>, ApiError> {
    let kind = match body.action.as_str() {
        "like" => InteractionKind::Like,
        "save" => InteractionKind::Save,
        "view" => InteractionKind::View,
        other => return Err(ApiError::bad_request(format!("unknown action: {other}"))),
    };

    if state
        .store()
        .find_cluster(&id)
        .await
        .map_err(ApiError::from)?
        .is_none()
    {
        return Err(ApiError::not_found(format!("unknown cluster: {id}")));
    }

    state
        .store()
        .record_interaction(&UserInteraction {
            user_id: identity.user_id,
            cluster_id: id,
            kind,
            occurred_at: time::now(),
        })
        .await
        .map_err(ApiError::from)?;

    Ok(Json(InteractResponse { status: "recorded" }))
}

fn sort_by_recency(clusters: &mut [Cluster]) {
    clusters.sort_by(|a, b| {
        b.last_updated
            .cmp(&a.last_updated)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn search_score(cluster: &Cluster, terms: &[String]) -> usize {
    let title = cluster.title.to_lowercase();
    let summary = cluster
        .summary
        .as_ref()
        .map(|s| s.text.to_lowercase())
        .unwrap_or_default();

    terms
        .iter()
        .map(|term| title.matches(term.as_str()).count() * 2 + summary.matches(term.as_str()).count())
        .sum()
}

/// 表示用にソースを重複排除する。
///
/// ソーストークンごとに `published_at` が最新の1本だけを残します。
/// 畳まれた件数を併せて返します。
async fn deduped_sources(
    store: &dyn NewsStore,
    cluster: &Cluster,
) -> anyhow::Result<(Vec<Article>, usize)> {
    let reads = cluster
        .source_articles
        .iter()
        .map(|article_id| store.get_article(article_id));
    let articles: Vec<Article> = futures::future::try_join_all(reads)
        .await?
        .into_iter()
        .flatten()
        .collect();

    let total = articles.len();
    let mut best: HashMap<String, Article> = HashMap::new();
    for article in articles {
        match best.get(&article.source) {
            Some(current) if current.published_at >= article.published_at => {}
            _ => {
                best.insert(article.source.clone(), article);
            }
        }
    }

    let mut deduped: Vec<Article> = best.into_values().collect();
    deduped.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.id.cmp(&b.id)));
    let duplicates = total - deduped.len();

    Ok((deduped, duplicates))
}
