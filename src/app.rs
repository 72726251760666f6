use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;

use crate::{
    api,
    clients::llm::{HttpLlmClient, LlmApi},
    config::Config,
    observability::Telemetry,
    store::{NewsStore, postgres::PgStore},
};

#[derive(Clone)]
pub struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    store: Arc<dyn NewsStore>,
    llm: Arc<dyn LlmApi>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn store(&self) -> Arc<dyn NewsStore> {
        Arc::clone(&self.registry.store)
    }
}

impl ComponentRegistry {
    /// 構成情報と依存をまとめて初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// ストアに到達できない場合はここで失敗し、プロセスは起動しません。
    ///
    /// # Errors
    /// Telemetryの初期化、ストア接続、LLMクライアント構築が失敗した場合は
    /// エラーを返す。
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.store_max_connections())
            .acquire_timeout(config.store_operation_timeout())
            .test_before_acquire(true)
            .connect_lazy(&config.store_dsn())
            .context("failed to configure store connection pool")?;
        let pg_store = PgStore::new(pool);
        pg_store
            .ensure_schema()
            .await
            .context("store unreachable at startup")?;
        let store: Arc<dyn NewsStore> = Arc::new(pg_store);

        let llm: Arc<dyn LlmApi> = Arc::new(HttpLlmClient::new(
            config.llm_base_url(),
            config.llm_api_key(),
            config.llm_model(),
            config.llm_realtime_timeout(),
            config.llm_batch_submit_timeout(),
        )?);

        Ok(Self {
            config,
            telemetry,
            store,
            llm,
        })
    }

    /// 構築済みの依存からレジストリを組み立てる（テストと組み込み用）。
    ///
    /// # Errors
    /// Telemetryの初期化に失敗した場合はエラーを返す。
    pub fn with_components(
        config: Config,
        store: Arc<dyn NewsStore>,
        llm: Arc<dyn LlmApi>,
    ) -> Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            telemetry: Telemetry::new()?,
            store,
            llm,
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn NewsStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn llm(&self) -> Arc<dyn LlmApi> {
        Arc::clone(&self.llm)
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::issue_token;
    use crate::clients::fake::ScriptedLlm;
    use crate::config::ENV_MUTEX;
    use crate::store::memory::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::util::ServiceExt;

    fn test_config() -> Config {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        // SAFETY: environment access is serialised through ENV_MUTEX for the
        // duration of Config::from_env().
        unsafe {
            std::env::set_var("STORE_CONNECTION", "postgres://localhost:5432");
            std::env::set_var("STORE_DATABASE", "newsdesk_test");
            std::env::set_var("LLM_API_KEY", "test");
            std::env::set_var("LLM_MODEL", "test-model");
            std::env::set_var("AUTH_CREDENTIALS", "router-secret");
        }
        Config::from_env().expect("config loads")
    }

    fn test_router() -> Router {
        let registry = ComponentRegistry::with_components(
            test_config(),
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedLlm::new()),
        )
        .expect("registry builds");
        build_router(registry)
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = test_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn breaking_is_public_and_empty_before_ingest() {
        let response = test_router()
            .oneshot(
                Request::get("/api/stories/breaking")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"[]");
    }

    #[tokio::test]
    async fn feed_requires_identity() {
        let response = test_router()
            .oneshot(
                Request::get("/api/stories/feed")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn feed_accepts_valid_token() {
        let token = issue_token("user-1", "router-secret");
        let response = test_router()
            .oneshot(
                Request::get("/api/stories/feed")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_story_is_404_with_error_body() {
        let response = test_router()
            .oneshot(
                Request::get("/api/stories/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "not_found");
        assert!(body["detail"].as_str().unwrap().contains("does-not-exist"));
    }

    #[tokio::test]
    async fn admin_metrics_rejects_non_admin() {
        let token = issue_token("user-1", "router-secret");
        let response = test_router()
            .oneshot(
                Request::get("/api/admin/metrics")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let token = issue_token("admin", "router-secret");
        let response = test_router()
            .oneshot(
                Request::get("/api/admin/metrics")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
