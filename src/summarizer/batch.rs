/// バッチ要約ワーカー。
///
/// 30分周期で (1) 未完了のバッチジョブをポーリングして完了分の結果を
/// 適用し、(2) サマリー未生成のクラスタをまとめて1件のバッチとして
/// プロバイダーへ送信します。要約需要の大半は数時間の遅延を許容できる
/// ため、割引のあるバッチ経路が既定の受け皿になります。
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clients::llm::{BatchItem, CompletionRequest, LlmApi, ProviderBatchStatus};
use crate::observability::metrics::Metrics;
use crate::store::NewsStore;
use crate::store::models::{BatchJob, BatchStatus, Category, Cluster};
use crate::util::time;

use super::prompt::{ArticleBrief, build_summary_prompt, parse_summary_response};
use super::select::representative_articles;
use super::{GenerationStats, apply_summary, cost};

const SUMMARY_MAX_TOKENS: u32 = 600;
const TEMPERATURE: f32 = 0.3;

/// 1サイクルの集計。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub jobs_polled: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub summaries_applied: usize,
    pub summaries_skipped: usize,
    pub submitted: usize,
}

pub struct BatchSummarizer {
    store: Arc<dyn NewsStore>,
    llm: Arc<dyn LlmApi>,
    metrics: Arc<Metrics>,
    enabled: bool,
    max_size: usize,
    backfill_hours: u32,
    interval: std::time::Duration,
}

impl BatchSummarizer {
    #[must_use]
    pub fn new(
        store: Arc<dyn NewsStore>,
        llm: Arc<dyn LlmApi>,
        metrics: Arc<Metrics>,
        enabled: bool,
        max_size: usize,
        backfill_hours: u32,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            llm,
            metrics,
            enabled,
            max_size,
            backfill_hours,
            interval,
        }
    }

    /// シャットダウンが通知されるまで周期的にサイクルを回す。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            match self.cycle_once().await {
                Ok(report) => {
                    if report != CycleReport::default() {
                        info!(
                            jobs_polled = report.jobs_polled,
                            jobs_completed = report.jobs_completed,
                            applied = report.summaries_applied,
                            skipped = report.summaries_skipped,
                            submitted = report.submitted,
                            "batch summary cycle complete"
                        );
                    }
                }
                Err(error) => error!(error = %error, "batch summary cycle failed"),
            }
        }

        info!("batch summarizer stopped");
    }

    /// 1サイクル: 未完了ジョブのポーリング → 新規バッチの送信。
    pub async fn cycle_once(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        self.poll_open_jobs(&mut report).await?;

        if self.enabled {
            self.submit_backfill(&mut report).await?;
        }

        let open = self.store.list_open_batch_jobs().await?;
        self.metrics.open_batch_jobs.set(open.len() as f64);

        Ok(report)
    }

    async fn poll_open_jobs(&self, report: &mut CycleReport) -> Result<()> {
        let jobs = self.store.list_open_batch_jobs().await?;

        for mut job in jobs {
            report.jobs_polled += 1;

            let status = match self.llm.poll_batch(&job.batch_id).await {
                Ok(status) => status,
                Err(error) => {
                    warn!(error = %error, batch = job.batch_id, "batch poll failed");
                    continue;
                }
            };

            match status {
                ProviderBatchStatus::InProgress => {
                    if job.status != BatchStatus::InProgress {
                        job.status = BatchStatus::InProgress;
                        self.store.upsert_batch_job(&job).await?;
                    }
                }
                ProviderBatchStatus::Failed => {
                    warn!(batch = job.batch_id, "batch failed at provider");
                    job.status = BatchStatus::Failed;
                    job.ended_at = Some(time::now());
                    self.store.upsert_batch_job(&job).await?;
                    report.jobs_failed += 1;
                }
                ProviderBatchStatus::Completed => {
                    self.apply_completed_job(&mut job, report).await?;
                    report.jobs_completed += 1;
                }
            }
        }

        Ok(())
    }

    async fn apply_completed_job(
        &self,
        job: &mut BatchJob,
        report: &mut CycleReport,
    ) -> Result<()> {
        let results = self
            .llm
            .fetch_batch_results(&job.batch_id)
            .await
            .with_context(|| format!("failed to fetch results for batch {}", job.batch_id))?;

        let mut succeeded = 0u32;
        let mut errored = 0u32;
        let mut total_cost = 0.0f64;

        for result in results {
            let Some(target) = BatchTarget::decode(&result.custom_id) else {
                warn!(custom_id = result.custom_id, "unparsable batch custom id");
                errored += 1;
                continue;
            };

            let Some(completion) = result.completion else {
                debug!(
                    cluster = target.cluster_id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "batch item errored at provider"
                );
                errored += 1;
                continue;
            };

            let parsed = match parse_summary_response(&completion.text) {
                Ok(parsed) => parsed,
                Err(error) => {
                    self.metrics.summary_failures.inc();
                    warn!(error = %error, cluster = target.cluster_id, "batch summary rejected");
                    errored += 1;
                    continue;
                }
            };

            // 送信時からメンバーシップが実質的に変わったクラスタには適用しない
            let Some((current, _)) = self.store.find_cluster(&target.cluster_id).await? else {
                report.summaries_skipped += 1;
                continue;
            };
            if current.source_articles.len() != target.member_count {
                debug!(
                    cluster = target.cluster_id,
                    submitted = target.member_count,
                    now = current.source_articles.len(),
                    "membership changed since submission, skipping batch summary"
                );
                report.summaries_skipped += 1;
                continue;
            }

            let cost_usd = cost::completion_cost_usd(
                &completion.model,
                completion.prompt_tokens,
                completion.completion_tokens,
                completion.cached_tokens,
                true,
            );

            let applied = apply_summary(
                &self.store,
                &target.cluster_id,
                target.category,
                &parsed,
                &completion.model,
                GenerationStats {
                    prompt_tokens: completion.prompt_tokens,
                    completion_tokens: completion.completion_tokens,
                    cached_tokens: completion.cached_tokens,
                    cost_usd,
                    generation_time_ms: 0,
                    batch_processed: true,
                },
                time::now(),
            )
            .await?;

            if applied {
                succeeded += 1;
                total_cost += cost_usd;
                report.summaries_applied += 1;
                self.metrics.batch_results_applied.inc();
                self.metrics.llm_cost_usd.inc_by(cost_usd);
            } else {
                report.summaries_skipped += 1;
            }
        }

        job.status = BatchStatus::Completed;
        job.ended_at = Some(time::now());
        job.succeeded_count = succeeded;
        job.errored_count = errored;
        job.total_cost_usd = total_cost;
        self.store.upsert_batch_job(job).await?;

        info!(
            batch = job.batch_id,
            succeeded, errored, total_cost, "batch job completed"
        );
        Ok(())
    }

    async fn submit_backfill(&self, report: &mut CycleReport) -> Result<()> {
        let since = time::now() - Duration::hours(i64::from(self.backfill_hours));
        let candidates = self
            .store
            .query_backfill_candidates(since, self.max_size)
            .await?;
        if candidates.is_empty() {
            return Ok(());
        }

        let mut items = Vec::with_capacity(candidates.len());
        let mut cluster_ids = Vec::with_capacity(candidates.len());

        for cluster in &candidates {
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
                continue;
            }

            let briefs: Vec<ArticleBrief> = representative_articles(&members)
                .into_iter()
                .map(ArticleBrief::from)
                .collect();

            items.push(BatchItem {
                custom_id: BatchTarget::encode(cluster),
                request: CompletionRequest {
                    prompt: build_summary_prompt(&cluster.title, &briefs),
                    max_tokens: SUMMARY_MAX_TOKENS,
                    temperature: TEMPERATURE,
                },
            });
            cluster_ids.push(cluster.id.clone());
        }

        if items.is_empty() {
            return Ok(());
        }

        let batch_id = self
            .llm
            .submit_batch(&items)
            .await
            .context("batch submission failed")?;

        let job = BatchJob {
            batch_id: batch_id.clone(),
            status: BatchStatus::Submitted,
            cluster_ids,
            submitted_at: time::now(),
            ended_at: None,
            request_count: items.len() as u32,
            succeeded_count: 0,
            errored_count: 0,
            total_cost_usd: 0.0,
        };
        self.store.upsert_batch_job(&job).await?;
        self.metrics.batch_jobs_submitted.inc();
        report.submitted = items.len();

        info!(batch = batch_id, requests = items.len(), "batch submitted");
        Ok(())
    }
}

/// バッチ項目の`custom_id`に埋め込むクラスタ座標。
///
/// 形式は `category|cluster_id|member_count`。メンバー数は結果適用時の
/// 「実質的な変更」検出に使います。
#[derive(Debug, PartialEq, Eq)]
struct BatchTarget {
    category: Category,
    cluster_id: String,
    member_count: usize,
}

impl BatchTarget {
    fn encode(cluster: &Cluster) -> String {
        format!(
            "{}|{}|{}",
            cluster.category,
            cluster.id,
            cluster.source_articles.len()
        )
    }

    fn decode(custom_id: &str) -> Option<Self> {
        let mut parts = custom_id.splitn(3, '|');
        let category = parts.next()?.parse().ok()?;
        let cluster_id = parts.next()?.to_string();
        let member_count = parts.next()?.parse().ok()?;
        Some(Self {
            category,
            cluster_id,
            member_count,
        })
    }
}
