/// 長時間稼働ワーカーの起動と停止。
///
/// 各ワーカーは独立したタスクとして動き、watchチャネル経由の
/// シャットダウン通知を次のサスペンドポイントで受け取ります。
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::clients::llm::LlmApi;
use crate::cluster::engine::ClusteringEngine;
use crate::config::Config;
use crate::lifecycle::sweeper::StatusSweeper;
use crate::observability::metrics::Metrics;
use crate::poller::RssPoller;
use crate::store::NewsStore;
use crate::summarizer::batch::BatchSummarizer;
use crate::summarizer::realtime::RealtimeSummarizer;

/// 起動済みワーカー群と、その停止用ハンドル。
pub struct WorkerSet {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerSet {
    /// 全ワーカーにシャットダウンを通知し、終了を待つ。
    pub async fn shutdown(self) {
        info!("signalling workers to stop");
        let _ = self.shutdown_tx.send(true);

        for handle in self.handles {
            if let Err(error) = handle.await {
                error!(error = %error, "worker task join failed");
            }
        }
        info!("all workers stopped");
    }
}

/// パイプラインの全ワーカーを起動する。
///
/// # Errors
/// ワーカーの事前構築（HTTPクライアント等）に失敗した場合はエラーを返す。
pub fn spawn_workers(
    config: &Arc<Config>,
    store: &Arc<dyn NewsStore>,
    llm: &Arc<dyn LlmApi>,
    metrics: &Arc<Metrics>,
) -> Result<WorkerSet> {
    let (shutdown_tx, _) = watch::channel(false);
    let mut handles = Vec::new();

    handles.push(spawn_poller(
        Arc::clone(config),
        Arc::clone(store),
        Arc::clone(metrics),
        shutdown_tx.subscribe(),
    )?);
    handles.push(spawn_clustering(
        config,
        Arc::clone(store),
        Arc::clone(metrics),
        shutdown_tx.subscribe(),
    ));
    handles.push(spawn_sweeper(
        config,
        Arc::clone(store),
        Arc::clone(metrics),
        shutdown_tx.subscribe(),
    ));
    handles.push(spawn_realtime_summarizer(
        config,
        Arc::clone(store),
        Arc::clone(llm),
        Arc::clone(metrics),
        shutdown_tx.subscribe(),
    ));
    handles.push(spawn_batch_summarizer(
        config,
        Arc::clone(store),
        Arc::clone(llm),
        Arc::clone(metrics),
        shutdown_tx.subscribe(),
    ));

    info!(workers = handles.len(), "pipeline workers started");
    Ok(WorkerSet {
        shutdown_tx,
        handles,
    })
}

fn spawn_poller(
    config: Arc<Config>,
    store: Arc<dyn NewsStore>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let mut poller = RssPoller::new(store, metrics, &config)?;
    Ok(tokio::spawn(async move {
        if let Err(error) = poller.hydrate().await {
            error!(error = %error, "failed to hydrate feed schedule, starting cold");
        }
        poller.run(shutdown).await;
    }))
}

fn spawn_clustering(
    config: &Config,
    store: Arc<dyn NewsStore>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let engine = ClusteringEngine::new(
        store,
        metrics,
        config.changefeed_batch_size(),
        config.changefeed_poll_interval(),
    );
    tokio::spawn(engine.run(shutdown))
}

fn spawn_sweeper(
    config: &Config,
    store: Arc<dyn NewsStore>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let sweeper = StatusSweeper::new(store, metrics, config.sweeper_interval());
    tokio::spawn(sweeper.run(shutdown))
}

fn spawn_realtime_summarizer(
    config: &Config,
    store: Arc<dyn NewsStore>,
    llm: Arc<dyn LlmApi>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let worker = RealtimeSummarizer::new(
        store,
        llm,
        metrics,
        config.llm_rpm_limit(),
        config.changefeed_batch_size(),
        config.changefeed_poll_interval(),
    );
    tokio::spawn(worker.run(shutdown))
}

fn spawn_batch_summarizer(
    config: &Config,
    store: Arc<dyn NewsStore>,
    llm: Arc<dyn LlmApi>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let worker = BatchSummarizer::new(
        store,
        llm,
        metrics,
        config.batch_processing_enabled(),
        config.batch_max_size(),
        config.batch_backfill_hours(),
        config.batch_poll_interval(),
    );
    tokio::spawn(worker.run(shutdown))
}
