/// 2経路の要約サブシステム。
///
/// 低遅延のイベント駆動経路と、割引価格の非同期バッチ経路が、同じ
/// プロンプトテンプレートとパーサーを共有します。時間に敏感な
/// コンテンツだけがリアルタイム経路を使い、残りはバッチに回ります。
pub mod batch;
pub mod cost;
pub mod prompt;
pub mod realtime;
pub mod select;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::store::models::{Cluster, SummaryVersion};
use crate::store::{NewsStore, ReplaceOutcome};
use crate::util::retry::RetryConfig;

use self::prompt::ParsedSummary;

/// 生成済みサマリーの適用に必要な計測値。
#[derive(Debug, Clone, Copy)]
pub struct GenerationStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub cost_usd: f64,
    pub generation_time_ms: u64,
    pub batch_processed: bool,
}

/// パース済みサマリーをETagガード付きでクラスタへ適用する。
///
/// サマリーの書き込みは `last_updated` に触れません。タイムスタンプは
/// ストーリーの変化（メンバーシップ・ステータス）だけを反映します。
/// 見出し候補が空でなければクラスタの現行タイトルも置き換えます。
pub(crate) async fn apply_summary(
    store: &Arc<dyn NewsStore>,
    cluster_id: &str,
    category: crate::store::models::Category,
    parsed: &ParsedSummary,
    model: &str,
    stats: GenerationStats,
    generated_at: DateTime<Utc>,
) -> Result<bool> {
    let retry = RetryConfig::conflict();

    for attempt in 0..retry.max_attempts {
        tokio::time::sleep(retry.delay_for_attempt(attempt)).await;

        let Some((current, etag)) = store.read_cluster(cluster_id, category).await? else {
            warn!(cluster = cluster_id, "cluster disappeared before summary apply");
            return Ok(false);
        };

        let version = current.summary.as_ref().map_or(1, |s| s.version + 1);
        let mut updated: Cluster = current.clone();
        updated.summary = Some(SummaryVersion {
            version,
            text: parsed.summary.clone(),
            generated_at,
            model: model.to_string(),
            word_count: parsed.word_count,
            prompt_tokens: stats.prompt_tokens,
            completion_tokens: stats.completion_tokens,
            cached_tokens: stats.cached_tokens,
            cost_usd: stats.cost_usd,
            batch_processed: stats.batch_processed,
            generation_time_ms: stats.generation_time_ms,
        });
        if !parsed.headline.is_empty() {
            updated.title = parsed.headline.clone();
        }

        match store.replace_cluster(&updated, &etag).await? {
            ReplaceOutcome::Applied(_) => return Ok(true),
            ReplaceOutcome::Conflict => continue,
        }
    }

    warn!(cluster = cluster_id, "summary apply abandoned after retries");
    Ok(false)
}
