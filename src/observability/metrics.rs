/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub feeds_polled: Counter,
    pub articles_new: Counter,
    pub articles_updated: Counter,
    pub articles_filtered: Counter,
    pub poll_failures: Counter,
    pub clusters_created: Counter,
    pub cluster_matches: Counter,
    pub etag_conflicts: Counter,
    pub status_transitions: Counter,
    pub summaries_generated: Counter,
    pub summary_failures: Counter,
    pub headline_updates: Counter,
    pub batch_jobs_submitted: Counter,
    pub batch_results_applied: Counter,
    pub llm_cost_usd: Counter,
    pub retries: Counter,
    pub api_source_duplicates: Counter,

    // ヒストグラム
    pub poll_tick_duration: Histogram,
    pub clustering_duration: Histogram,
    pub summary_duration: Histogram,

    // ゲージ
    pub feeds_quarantined: Gauge,
    pub open_batch_jobs: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    #[allow(clippy::too_many_lines)]
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            feeds_polled: register_counter_with_registry!(
                "newsdesk_feeds_polled_total",
                "Total number of feed polls attempted",
                registry
            )?,
            articles_new: register_counter_with_registry!(
                "newsdesk_articles_new_total",
                "Total number of newly stored articles",
                registry
            )?,
            articles_updated: register_counter_with_registry!(
                "newsdesk_articles_updated_total",
                "Total number of in-place article updates",
                registry
            )?,
            articles_filtered: register_counter_with_registry!(
                "newsdesk_articles_filtered_total",
                "Total number of articles rejected by the spam filter",
                registry
            )?,
            poll_failures: register_counter_with_registry!(
                "newsdesk_poll_failures_total",
                "Total number of failed feed fetches",
                registry
            )?,
            clusters_created: register_counter_with_registry!(
                "newsdesk_clusters_created_total",
                "Total number of clusters created",
                registry
            )?,
            cluster_matches: register_counter_with_registry!(
                "newsdesk_cluster_matches_total",
                "Total number of articles matched into an existing cluster",
                registry
            )?,
            etag_conflicts: register_counter_with_registry!(
                "newsdesk_etag_conflicts_total",
                "Total number of optimistic-concurrency conflicts on replace",
                registry
            )?,
            status_transitions: register_counter_with_registry!(
                "newsdesk_status_transitions_total",
                "Total number of cluster status transitions",
                registry
            )?,
            summaries_generated: register_counter_with_registry!(
                "newsdesk_summaries_generated_total",
                "Total number of summary versions stored",
                registry
            )?,
            summary_failures: register_counter_with_registry!(
                "newsdesk_summary_failures_total",
                "Total number of summary generations rejected or failed",
                registry
            )?,
            headline_updates: register_counter_with_registry!(
                "newsdesk_headline_updates_total",
                "Total number of cluster headline replacements",
                registry
            )?,
            batch_jobs_submitted: register_counter_with_registry!(
                "newsdesk_batch_jobs_submitted_total",
                "Total number of batch jobs submitted to the LLM provider",
                registry
            )?,
            batch_results_applied: register_counter_with_registry!(
                "newsdesk_batch_results_applied_total",
                "Total number of batch summaries applied to clusters",
                registry
            )?,
            llm_cost_usd: register_counter_with_registry!(
                "newsdesk_llm_cost_usd_total",
                "Accumulated LLM spend in USD",
                registry
            )?,
            retries: register_counter_with_registry!(
                "newsdesk_retries_total",
                "Total number of retries across store and HTTP operations",
                registry
            )?,
            api_source_duplicates: register_counter_with_registry!(
                "newsdesk_api_source_duplicates_total",
                "Number of duplicate sources collapsed at the API layer",
                registry
            )?,
            poll_tick_duration: register_histogram_with_registry!(
                "newsdesk_poll_tick_duration_seconds",
                "Duration of a single RSS poll tick",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
                registry
            )?,
            clustering_duration: register_histogram_with_registry!(
                "newsdesk_clustering_duration_seconds",
                "Duration of clustering a single article",
                vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
                registry
            )?,
            summary_duration: register_histogram_with_registry!(
                "newsdesk_summary_duration_seconds",
                "Duration of a real-time summary generation",
                vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0],
                registry
            )?,
            feeds_quarantined: register_gauge_with_registry!(
                "newsdesk_feeds_quarantined",
                "Number of feeds currently quarantined",
                registry
            )?,
            open_batch_jobs: register_gauge_with_registry!(
                "newsdesk_open_batch_jobs",
                "Number of batch jobs awaiting provider completion",
                registry
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_increment() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).expect("metrics register");

        metrics.feeds_polled.inc();
        metrics.articles_new.inc_by(3.0);
        metrics.feeds_quarantined.set(2.0);

        assert!((metrics.feeds_polled.get() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.articles_new.get() - 3.0).abs() < f64::EPSILON);
        assert!((metrics.feeds_quarantined.get() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Registry::new();
        let _metrics = Metrics::new(&registry).expect("first registration");
        assert!(Metrics::new(&registry).is_err());
    }
}
