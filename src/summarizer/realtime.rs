/// イベント駆動の要約ワーカー。
///
/// クラスタ変更フィードを購読し、BREAKING/VERIFIEDへ入ったクラスタと
/// BREAKING中にソースが増えたクラスタをリアルタイムで要約します。
/// 併せて、ソース追加のたびに見出しの再評価を行います。毎分の
/// リクエスト数を超えた分はバッチ経路に委ねます。
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clients::llm::{CompletionRequest, LlmApi};
use crate::observability::metrics::Metrics;
use crate::store::changefeed::SUMMARY_LEASE;
use crate::store::models::{Cluster, Container, StoryStatus};
use crate::store::{NewsStore, ReplaceOutcome};
use crate::util::retry::RetryConfig;
use crate::util::time;

use super::prompt::{
    ArticleBrief, HeadlineDecision, build_headline_prompt, build_summary_prompt,
    parse_headline_response, parse_summary_response,
};
use super::select::representative_articles;
use super::{GenerationStats, apply_summary, cost};

/// 要約リクエストの生成トークン上限。
const SUMMARY_MAX_TOKENS: u32 = 600;

/// 見出し再評価リクエストの生成トークン上限。
const HEADLINE_MAX_TOKENS: u32 = 80;

const TEMPERATURE: f32 = 0.3;

/// 1分窓のリクエストレートリミッター。
///
/// `limit` が0の場合、リアルタイム経路は常に抑止されます（全量が
/// バッチへ回る）。
#[derive(Debug)]
pub struct MinuteRateLimiter {
    limit: u32,
    state: Mutex<(Instant, u32)>,
}

impl MinuteRateLimiter {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            state: Mutex::new((Instant::now(), 0)),
        }
    }

    /// 予算が残っていれば1リクエスト分を消費する。
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("rate limiter lock");

        if state.0.elapsed().as_secs() >= 60 {
            *state = (Instant::now(), 0);
        }

        if state.1 < self.limit {
            state.1 += 1;
            true
        } else {
            false
        }
    }
}

pub struct RealtimeSummarizer {
    store: Arc<dyn NewsStore>,
    llm: Arc<dyn LlmApi>,
    metrics: Arc<Metrics>,
    limiter: MinuteRateLimiter,
    batch_size: usize,
    poll_interval: std::time::Duration,
    seen_update_counts: Mutex<HashMap<String, u32>>,
}

impl RealtimeSummarizer {
    #[must_use]
    pub fn new(
        store: Arc<dyn NewsStore>,
        llm: Arc<dyn LlmApi>,
        metrics: Arc<Metrics>,
        rpm_limit: u32,
        batch_size: usize,
        poll_interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            llm,
            metrics,
            limiter: MinuteRateLimiter::new(rpm_limit),
            batch_size,
            poll_interval,
            seen_update_counts: Mutex::new(HashMap::new()),
        }
    }

    /// シャットダウンが通知されるまでクラスタ変更フィードを消費し続ける。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let processed = match self.process_batch().await {
                Ok(count) => count,
                Err(error) => {
                    error!(error = %error, "realtime summary batch failed");
                    0
                }
            };

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

        info!("realtime summarizer stopped");
    }

    /// クラスタ変更フィードから1バッチ処理し、処理件数を返す。
    pub async fn process_batch(&self) -> Result<usize> {
        let batch = self
            .store
            .pull_cluster_changes(SUMMARY_LEASE, self.batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.documents.len();
        for cluster in &batch.documents {
            if let Err(error) = self.handle_cluster_change(cluster).await {
                warn!(error = %error, cluster = cluster.id, "cluster summary handling failed");
            }
        }

        if let Some(cursor) = batch.cursor {
            self.store
                .commit_lease(Container::StoryClusters, SUMMARY_LEASE, cursor)
                .await?;
        }

        Ok(count)
    }

    /// 1クラスタの変更イベントを処理する。
    ///
    /// 冪等性: サマリー書き込みは `last_updated` を進めないため、処理済み
    /// イベントの再配信では `generated_at >= last_updated` が成り立ち、
    /// 再生成は発生しません。
    pub async fn handle_cluster_change(&self, cluster: &Cluster) -> Result<()> {
        if cluster.status == StoryStatus::Archived {
            return Ok(());
        }

        if self.membership_grew(cluster) {
            self.reevaluate_headline(cluster).await?;
        }

        let needs_first_summary = matches!(
            cluster.status,
            StoryStatus::Breaking | StoryStatus::Verified
        ) && cluster.summary.is_none();
        let needs_refresh = cluster.status == StoryStatus::Breaking
            && cluster
                .summary
                .as_ref()
                .is_some_and(|s| s.generated_at < cluster.last_updated);

        if needs_first_summary || needs_refresh {
            self.generate_summary(cluster).await?;
        }

        Ok(())
    }

    /// このワーカーが前回見たときよりメンバーが増えたかどうか。
    ///
    /// 初見のクラスタは現在値を記録するだけで追加扱いにしません。再起動
    /// 直後に既存の全クラスタへ見出しプロンプトを投げ直さないためです。
    fn membership_grew(&self, cluster: &Cluster) -> bool {
        let mut seen = self.seen_update_counts.lock().expect("seen lock");
        match seen.insert(cluster.id.clone(), cluster.update_count) {
            Some(previous) => cluster.update_count > previous,
            None => false,
        }
    }

    async fn generate_summary(&self, cluster: &Cluster) -> Result<()> {
        if !self.limiter.try_acquire() {
            debug!(
                cluster = cluster.id,
                "realtime budget exhausted, deferring to batch path"
            );
            return Ok(());
        }

        let reads = cluster
            .source_articles
            .iter()
            .map(|article_id| self.store.get_article(article_id));
        let members: Vec<_> = futures::future::try_join_all(reads)
            .await?
            .into_iter()
            .flatten()
            .collect();
        if members.is_empty() {
            warn!(cluster = cluster.id, "no readable member articles, skipping summary");
            return Ok(());
        }

        let briefs: Vec<ArticleBrief> = representative_articles(&members)
            .into_iter()
            .map(ArticleBrief::from)
            .collect();
        let prompt = build_summary_prompt(&cluster.title, &briefs);

        let started = Instant::now();
        let completion = self
            .llm
            .complete(&CompletionRequest {
                prompt,
                max_tokens: SUMMARY_MAX_TOKENS,
                temperature: TEMPERATURE,
            })
            .await?;
        let generation_time_ms = started.elapsed().as_millis() as u64;
        self.metrics
            .summary_duration
            .observe(started.elapsed().as_secs_f64());

        let parsed = match parse_summary_response(&completion.text) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.metrics.summary_failures.inc();
                warn!(error = %error, cluster = cluster.id, "summary response rejected");
                return Ok(());
            }
        };

        let cost_usd = cost::completion_cost_usd(
            &completion.model,
            completion.prompt_tokens,
            completion.completion_tokens,
            completion.cached_tokens,
            false,
        );

        let applied = apply_summary(
            &self.store,
            &cluster.id,
            cluster.category,
            &parsed,
            &completion.model,
            GenerationStats {
                prompt_tokens: completion.prompt_tokens,
                completion_tokens: completion.completion_tokens,
                cached_tokens: completion.cached_tokens,
                cost_usd,
                generation_time_ms,
                batch_processed: false,
            },
            time::now(),
        )
        .await?;

        if applied {
            self.metrics.summaries_generated.inc();
            self.metrics.llm_cost_usd.inc_by(cost_usd);
            info!(
                cluster = cluster.id,
                words = parsed.word_count,
                cost_usd,
                "realtime summary stored"
            );
        }

        Ok(())
    }

    /// 最新のソース追加に対して見出しを再評価する。
    async fn reevaluate_headline(&self, cluster: &Cluster) -> Result<()> {
        if !self.limiter.try_acquire() {
            debug!(cluster = cluster.id, "headline re-evaluation rate limited");
            return Ok(());
        }

        let Some(newest_id) = cluster.source_articles.last() else {
            return Ok(());
        };
        let Some(newest) = self.store.get_article(newest_id).await? else {
            return Ok(());
        };

        let prompt = build_headline_prompt(&cluster.title, &newest.title);
        let completion = self
            .llm
            .complete(&CompletionRequest {
                prompt,
                max_tokens: HEADLINE_MAX_TOKENS,
                temperature: 0.0,
            })
            .await?;

        match parse_headline_response(&completion.text) {
            HeadlineDecision::KeepCurrent => Ok(()),
            HeadlineDecision::Replace(new_headline) => {
                self.apply_headline(&cluster.id, cluster.category, &new_headline)
                    .await
            }
        }
    }

    /// 見出しのみをETagガード付きで置き換える。`last_updated` は不変。
    async fn apply_headline(
        &self,
        cluster_id: &str,
        category: crate::store::models::Category,
        new_headline: &str,
    ) -> Result<()> {
        let retry = RetryConfig::conflict();

        for attempt in 0..retry.max_attempts {
            tokio::time::sleep(retry.delay_for_attempt(attempt)).await;

            let Some((current, etag)) = self.store.read_cluster(cluster_id, category).await?
            else {
                return Ok(());
            };
            if current.title == new_headline {
                return Ok(());
            }

            let mut updated = current.clone();
            updated.title = new_headline.to_string();

            match self.store.replace_cluster(&updated, &etag).await? {
                ReplaceOutcome::Applied(_) => {
                    self.metrics.headline_updates.inc();
                    info!(cluster = cluster_id, headline = new_headline, "headline updated");
                    return Ok(());
                }
                ReplaceOutcome::Conflict => continue,
            }
        }

        warn!(cluster = cluster_id, "headline update abandoned after retries");
        Ok(())
    }
}
