/// メトリクスエンドポイント。
///
/// `/metrics` はPrometheusスクレイプ用のテキスト形式（公開）、
/// `/api/admin/metrics` は管理者向けのJSONサマリーです。
use std::collections::BTreeMap;

use axum::{Json, extract::State};
use prometheus::proto::MetricType;
use serde::Serialize;

use crate::app::AppState;

use super::auth::Identity;
use super::error::ApiError;

pub(crate) async fn exporter(State(state): State<AppState>) -> String {
    state.telemetry().render_prometheus()
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminMetrics {
    counters: BTreeMap<String, f64>,
}

pub(crate) async fn admin_metrics(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<AdminMetrics>, ApiError> {
    if !identity.is_admin {
        return Err(ApiError::forbidden());
    }

    let mut counters = BTreeMap::new();
    for family in state.telemetry().registry_families() {
        let total: f64 = match family.get_field_type() {
            MetricType::COUNTER => family
                .get_metric()
                .iter()
                .map(|m| m.get_counter().get_value())
                .sum(),
            MetricType::GAUGE => family
                .get_metric()
                .iter()
                .map(|m| m.get_gauge().get_value())
                .sum(),
            // ヒストグラムはPrometheusスクレイプ側で扱う
            _ => continue,
        };
        counters.insert(family.get_name().to_string(), total);
    }

    Ok(Json(AdminMetrics { counters }))
}
