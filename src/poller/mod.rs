/// RSSポーリングワーカー。
///
/// 固定間隔のtickごとに少数のフィードを選び、取得・正規化・フィルター・
/// upsertを行います。失敗はフィード単位で隔離し、他のフィードの進行を
/// 妨げません。
pub mod canonical;
pub mod feeds;
pub mod fetch;
pub mod schedule;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::analysis::spam;
use crate::config::Config;
use crate::observability::metrics::Metrics;
use crate::store::models::{Article, PollOutcome};
use crate::store::{NewsStore, UpsertOutcome};
use crate::util::time;

use self::fetch::FeedFetcher;
use self::schedule::FeedScheduler;

/// 1tickの集計。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub feeds_polled: usize,
    pub articles_new: usize,
    pub articles_updated: usize,
    pub articles_filtered: usize,
    pub failures: usize,
}

pub struct RssPoller {
    store: Arc<dyn NewsStore>,
    fetcher: FeedFetcher,
    scheduler: FeedScheduler,
    metrics: Arc<Metrics>,
    tick: std::time::Duration,
    feeds_per_tick: usize,
}

impl RssPoller {
    /// ポーリングワーカーを構築する。
    ///
    /// # Errors
    /// フェッチ用HTTPクライアントの構築に失敗した場合はエラーを返す。
    pub fn new(store: Arc<dyn NewsStore>, metrics: Arc<Metrics>, config: &Config) -> Result<Self> {
        Ok(Self {
            store,
            fetcher: FeedFetcher::new(config.rss_fetch_timeout())?,
            scheduler: FeedScheduler::new(config.rss_cooldown()),
            metrics,
            tick: config.rss_tick(),
            feeds_per_tick: config.rss_feeds_per_tick(),
        })
    }

    /// 永続化済みのフィード状態からスケジューラを復元する。
    pub async fn hydrate(&mut self) -> Result<()> {
        let states = self.store.list_feed_states().await?;
        self.scheduler.hydrate(&states);
        Ok(())
    }

    /// シャットダウンが通知されるまでtickループを回す。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // intervalの初回tickは即時に完了するため、最初のポーリングを
        // 1tick分遅らせてから回し始める
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            if let Err(error) = self.tick_once().await {
                error!(error = %error, "rss tick failed");
            }
        }

        info!("rss poller stopped");
    }

    /// 1tick分のポーリングを実行する。
    pub async fn tick_once(&mut self) -> Result<TickReport> {
        let now = time::now();
        let started = std::time::Instant::now();
        let selected = self.scheduler.select(now, self.feeds_per_tick);

        let mut report = TickReport::default();
        for feed in selected {
            self.metrics.feeds_polled.inc();
            report.feeds_polled += 1;

            match self.fetcher.fetch(feed, now).await {
                Ok(articles) => {
                    self.scheduler.record_success(feed.url, now);
                    let counts = self.ingest(articles).await;
                    report.articles_new += counts.articles_new;
                    report.articles_updated += counts.articles_updated;
                    report.articles_filtered += counts.articles_filtered;
                    report.failures += counts.failures;

                    let snapshot = self.scheduler.snapshot(feed.url, PollOutcome::Success);
                    if let Err(error) = self.store.upsert_feed_state(&snapshot).await {
                        warn!(error = %error, feed = feed.url, "failed to persist feed state");
                    }
                }
                Err(error) => {
                    warn!(error = %error, feed = feed.url, "feed fetch failed");
                    self.metrics.poll_failures.inc();
                    report.failures += 1;

                    if self.scheduler.record_failure(feed.url, now) {
                        warn!(feed = feed.url, "feed quarantined after repeated failures");
                    }
                    let snapshot = self.scheduler.snapshot(feed.url, PollOutcome::Failure);
                    if let Err(error) = self.store.upsert_feed_state(&snapshot).await {
                        warn!(error = %error, feed = feed.url, "failed to persist feed state");
                    }
                }
            }
        }

        self.metrics
            .feeds_quarantined
            .set(self.scheduler.quarantined_count(now) as f64);
        self.metrics
            .poll_tick_duration
            .observe(started.elapsed().as_secs_f64());

        if report.feeds_polled > 0 {
            info!(
                feeds = report.feeds_polled,
                new = report.articles_new,
                updated = report.articles_updated,
                filtered = report.articles_filtered,
                failures = report.failures,
                "rss tick complete"
            );
        }

        Ok(report)
    }

    /// 取得済み記事にフィルターを適用し、通過したものをupsertする。
    async fn ingest(&self, articles: Vec<Article>) -> TickReport {
        let mut counts = TickReport::default();

        for article in articles {
            if let Some(reason) = spam::classify(&article.title, &article.description, &article.url)
            {
                debug!(?reason, title = article.title, "article filtered");
                self.metrics.articles_filtered.inc();
                counts.articles_filtered += 1;
                continue;
            }

            match self.store.upsert_article(&article).await {
                Ok(UpsertOutcome::Created) => {
                    self.metrics.articles_new.inc();
                    counts.articles_new += 1;
                }
                Ok(UpsertOutcome::Updated) => {
                    self.metrics.articles_updated.inc();
                    counts.articles_updated += 1;
                }
                Err(error) => {
                    warn!(error = %error, article = article.id, "article upsert failed");
                    counts.failures += 1;
                }
            }
        }

        counts
    }
}
