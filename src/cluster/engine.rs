/// 変更フィード駆動のクラスタリング処理。
///
/// 記事ごとに高々1つのクラスタへ合流させます。合流はETagガード付きで、
/// 競合時は再読込のうえ指数バックオフで再試行します。配信はat-least-once
/// なので、メンバーシップ確認により再配信を無害化します。
use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::lifecycle::status::{StatusInput, evaluate_status, verification_level};
use crate::observability::metrics::Metrics;
use crate::store::changefeed::CLUSTERING_LEASE;
use crate::store::models::{Article, Cluster, Container, StoryStatus};
use crate::store::{NewsStore, ReplaceOutcome};
use crate::util::retry::RetryConfig;
use crate::util::time;

use super::matcher::{CANDIDATE_LIMIT, CANDIDATE_WINDOW_HOURS, best_match};

/// 1記事の処理結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// 新しいクラスタを作成した。
    Created(String),
    /// 既存クラスタへ追加した。
    Added(String),
    /// すでにメンバーだったため何もしなかった（再配信）。
    AlreadyMember(String),
    /// 再試行の予算を使い切り断念した。次回配信で再収束する。
    Dropped,
}

pub struct ClusteringEngine {
    store: Arc<dyn NewsStore>,
    metrics: Arc<Metrics>,
    batch_size: usize,
    poll_interval: std::time::Duration,
}

impl ClusteringEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn NewsStore>,
        metrics: Arc<Metrics>,
        batch_size: usize,
        poll_interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            batch_size,
            poll_interval,
        }
    }

    /// シャットダウンが通知されるまで変更フィードを消費し続ける。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let processed = match self.process_batch().await {
                Ok(count) => count,
                Err(error) => {
                    error!(error = %error, "clustering batch failed");
                    0
                }
            };

            // バッチが空のときだけ待つ。処理が追いつかない間は連続で回す。
            if processed == 0 {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(self.poll_interval) => {}
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        info!("clustering engine stopped");
    }

    /// 変更フィードから1バッチ取り出して処理し、処理件数を返す。
    pub async fn process_batch(&self) -> Result<usize> {
        let batch = self
            .store
            .pull_article_changes(CLUSTERING_LEASE, self.batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.documents.len();
        for article in &batch.documents {
            let started = std::time::Instant::now();
            match self.handle_article(article).await {
                Ok(outcome) => debug!(article = article.id, ?outcome, "article clustered"),
                Err(error) => {
                    // 記事ドキュメントは残っているため、次の更新配信で再処理される
                    warn!(error = %error, article = article.id, "article clustering failed");
                }
            }
            self.metrics
                .clustering_duration
                .observe(started.elapsed().as_secs_f64());
        }

        if let Some(cursor) = batch.cursor {
            self.store
                .commit_lease(Container::RawArticles, CLUSTERING_LEASE, cursor)
                .await?;
        }

        Ok(count)
    }

    /// 1記事を既存クラスタへ合流させるか、新規クラスタを作る。
    pub async fn handle_article(&self, article: &Article) -> Result<HandleOutcome> {
        let since = time::now() - Duration::hours(CANDIDATE_WINDOW_HOURS);
        let candidates = self
            .store
            .query_recent_clusters(Some(article.category), since, CANDIDATE_LIMIT)
            .await?;

        match best_match(article, &candidates) {
            Some(cluster) => {
                let cluster_id = cluster.id.clone();
                self.add_to_cluster(&cluster_id, article).await
            }
            None => self.create_cluster(article).await,
        }
    }

    /// ETagガード付きでクラスタへ記事を追加する。
    ///
    /// 追加前のメンバー数を捕捉してから新しい列を組み立てることで、
    /// `is_gaining_sources` の判定が保存済み列の別名参照に汚染されない
    /// ようにします。
    async fn add_to_cluster(&self, cluster_id: &str, article: &Article) -> Result<HandleOutcome> {
        let retry = RetryConfig::conflict();

        for attempt in 0..retry.max_attempts {
            tokio::time::sleep(retry.delay_for_attempt(attempt)).await;

            let Some((current, etag)) = self
                .store
                .read_cluster(cluster_id, article.category)
                .await?
            else {
                warn!(cluster = cluster_id, "matched cluster disappeared");
                return Ok(HandleOutcome::Dropped);
            };

            if current.source_articles.contains(&article.id) {
                return Ok(HandleOutcome::AlreadyMember(current.id));
            }

            let now = time::now();
            let prev_count = current.source_articles.len();

            let mut members = current.source_articles.clone();
            members.push(article.id.clone());

            let mut updated = current.clone();
            updated.source_articles = members;
            let is_gaining_sources = updated.source_articles.len() > prev_count;

            for (token, count) in &article.entities {
                *updated.entities.entry(token.clone()).or_insert(0) += count;
            }

            let unique_sources = updated.unique_sources();
            updated.verification_level = verification_level(unique_sources);

            let previous_status = current.status;
            updated.status = evaluate_status(
                previous_status,
                &StatusInput {
                    unique_sources,
                    age: now.signed_duration_since(current.first_seen),
                    idle: now.signed_duration_since(current.last_updated),
                    is_gaining_sources,
                },
            );
            updated.last_updated = now;
            updated.update_count = current.update_count + 1;

            match self.store.replace_cluster(&updated, &etag).await? {
                ReplaceOutcome::Applied(_) => {
                    self.metrics.cluster_matches.inc();
                    if updated.status != previous_status {
                        self.metrics.status_transitions.inc();
                        info!(
                            cluster = updated.id,
                            from = %previous_status,
                            to = %updated.status,
                            sources = unique_sources,
                            "cluster status transitioned"
                        );
                    }
                    return Ok(HandleOutcome::Added(updated.id));
                }
                ReplaceOutcome::Conflict => {
                    self.metrics.etag_conflicts.inc();
                    self.metrics.retries.inc();
                }
            }
        }

        warn!(
            cluster = cluster_id,
            article = article.id,
            "cluster update abandoned after retries"
        );
        Ok(HandleOutcome::Dropped)
    }

    /// 記事を種にして新しいクラスタを作成する。
    async fn create_cluster(&self, article: &Article) -> Result<HandleOutcome> {
        let now = time::now();
        let cluster = Cluster {
            id: Cluster::derive_id(now),
            category: article.category,
            title: article.title.clone(),
            summary: None,
            source_articles: vec![article.id.clone()],
            status: StoryStatus::Monitoring,
            verification_level: verification_level(1),
            first_seen: now,
            last_updated: now,
            update_count: 0,
            entities: article.entities.clone(),
            fingerprint: article.fingerprint.clone(),
        };

        self.store.create_cluster(&cluster).await?;
        self.metrics.clusters_created.inc();
        info!(
            cluster = cluster.id,
            article = article.id,
            category = %article.category,
            "cluster created"
        );
        Ok(HandleOutcome::Created(cluster.id))
    }
}
