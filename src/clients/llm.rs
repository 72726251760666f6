/// LLMプロバイダークライアント。
///
/// 同期補完とバッチAPIの2つの窓口を細いケイパビリティトレイトとして
/// 公開します。モデル識別子は不透明な文字列として扱い、生成結果に
/// そのまま記録します。
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::util::retry::{RetryConfig, is_retryable_error};

/// 同期補完リクエスト。
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// 補完レスポンス。トークン数は課金計算に使います。
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
}

/// バッチ送信の1項目。`custom_id` で結果をクラスタへ対応付けます。
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub custom_id: String,
    pub request: CompletionRequest,
}

/// バッチ結果の1項目。失敗した項目は `error` のみが埋まります。
#[derive(Debug, Clone)]
pub struct BatchResultItem {
    pub custom_id: String,
    pub completion: Option<Completion>,
    pub error: Option<String>,
}

/// プロバイダー側のバッチ進行状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderBatchStatus {
    InProgress,
    Completed,
    Failed,
}

/// LLMプロバイダーへの窓口。
///
/// 本番実装は [`HttpLlmClient`]、テスト用は
/// [`crate::clients::fake::ScriptedLlm`] です。
#[async_trait]
pub trait LlmApi: Send + Sync {
    /// 生成に使うモデル識別子（不透明）。
    fn model(&self) -> &str;

    /// 同期補完を1件実行する。
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// バッチを送信し、プロバイダー発行のバッチIDを返す。
    async fn submit_batch(&self, items: &[BatchItem]) -> Result<String>;

    /// バッチの進行状態を取得する。
    async fn poll_batch(&self, batch_id: &str) -> Result<ProviderBatchStatus>;

    /// 完了したバッチの全結果を取得する。
    async fn fetch_batch_results(&self, batch_id: &str) -> Result<Vec<BatchResultItem>>;
}

#[derive(Debug, Clone)]
pub struct HttpLlmClient {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
    batch_submit_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct WireCompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct WireCompletionResponse {
    model: Option<String>,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: WireTokenDetails,
}

#[derive(Debug, Default, Deserialize)]
struct WireTokenDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Serialize)]
struct WireBatchRequest<'a> {
    requests: Vec<WireBatchItem<'a>>,
}

#[derive(Debug, Serialize)]
struct WireBatchItem<'a> {
    custom_id: &'a str,
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct WireBatchCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireBatchStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct WireBatchResults {
    results: Vec<WireBatchResultItem>,
}

#[derive(Debug, Deserialize)]
struct WireBatchResultItem {
    custom_id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpLlmClient {
    /// クライアントを構築する。
    ///
    /// # Errors
    /// ベースURLが不正、またはHTTPクライアントの構築に失敗した場合は
    /// エラーを返す。
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        realtime_timeout: Duration,
        batch_submit_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(realtime_timeout)
            .build()
            .context("failed to build LLM client")?;

        let mut raw = base_url.into();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).context("invalid LLM base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            batch_submit_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("failed to build LLM endpoint: {path}"))
    }

    /// 一時的な失敗をFull Jitterバックオフで再試行しながら送信する。
    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let retry = RetryConfig::network();
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..retry.max_attempts {
            tokio::time::sleep(retry.delay_for_attempt(attempt)).await;

            match build().bearer_auth(&self.api_key).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error()
                        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        warn!(%status, attempt, "LLM request returned retryable status");
                        last_error = Some(anyhow!("LLM provider returned status {status}"));
                        continue;
                    }
                    return response
                        .error_for_status()
                        .context("LLM provider returned error status");
                }
                Err(error) => {
                    if is_retryable_error(&error) && retry.can_retry(attempt + 1) {
                        warn!(error = %error, attempt, "retrying LLM request");
                        last_error = Some(error.into());
                        continue;
                    }
                    return Err(error).context("LLM request failed");
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("LLM request retries exhausted")))
    }
}

#[async_trait]
impl LlmApi for HttpLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let url = self.endpoint("completions")?;
        let payload = WireCompletionRequest {
            model: &self.model,
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = self.model, "sending completion request");
        let response = self
            .send_with_retry(|| self.client.post(url.clone()).json(&payload))
            .await?;

        let body: WireCompletionResponse = response
            .json()
            .await
            .context("failed to decode completion response")?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("completion response contained no choices"))?;

        Ok(Completion {
            text: choice.text,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            prompt_tokens: body.usage.prompt_tokens,
            completion_tokens: body.usage.completion_tokens,
            cached_tokens: body.usage.prompt_tokens_details.cached_tokens,
        })
    }

    async fn submit_batch(&self, items: &[BatchItem]) -> Result<String> {
        let url = self.endpoint("batches")?;
        let payload = WireBatchRequest {
            requests: items
                .iter()
                .map(|item| WireBatchItem {
                    custom_id: &item.custom_id,
                    model: &self.model,
                    prompt: &item.request.prompt,
                    max_tokens: item.request.max_tokens,
                    temperature: item.request.temperature,
                })
                .collect(),
        };

        debug!(requests = items.len(), "submitting batch");
        let response = self
            .send_with_retry(|| {
                self.client
                    .post(url.clone())
                    .timeout(self.batch_submit_timeout)
                    .json(&payload)
            })
            .await?;

        let created: WireBatchCreated = response
            .json()
            .await
            .context("failed to decode batch creation response")?;
        Ok(created.id)
    }

    async fn poll_batch(&self, batch_id: &str) -> Result<ProviderBatchStatus> {
        let url = self.endpoint(&format!("batches/{batch_id}"))?;
        let response = self.send_with_retry(|| self.client.get(url.clone())).await?;

        let body: WireBatchStatus = response
            .json()
            .await
            .context("failed to decode batch status response")?;

        Ok(match body.status.as_str() {
            "completed" => ProviderBatchStatus::Completed,
            "failed" | "expired" | "cancelled" => ProviderBatchStatus::Failed,
            _ => ProviderBatchStatus::InProgress,
        })
    }

    async fn fetch_batch_results(&self, batch_id: &str) -> Result<Vec<BatchResultItem>> {
        let url = self.endpoint(&format!("batches/{batch_id}/results"))?;
        let response = self.send_with_retry(|| self.client.get(url.clone())).await?;

        let body: WireBatchResults = response
            .json()
            .await
            .context("failed to decode batch results")?;

        Ok(body
            .results
            .into_iter()
            .map(|item| {
                let completion = item.text.map(|text| {
                    let usage = item.usage.unwrap_or_default();
                    Completion {
                        text,
                        model: self.model.clone(),
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        cached_tokens: usage.prompt_tokens_details.cached_tokens,
                    }
                });
                BatchResultItem {
                    custom_id: item.custom_id,
                    completion,
                    error: item.error,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> HttpLlmClient {
        HttpLlmClient::new(
            base,
            "test-key",
            "test-model-1",
            Duration::from_secs(5),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn complete_decodes_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "test-model-1",
                "choices": [{"text": "{\"summary\": \"s\", \"headline\": \"h\"}"}],
                "usage": {
                    "prompt_tokens": 120,
                    "completion_tokens": 48,
                    "prompt_tokens_details": {"cached_tokens": 32}
                }
            })))
            .mount(&server)
            .await;

        let completion = client(&server.uri())
            .complete(&CompletionRequest {
                prompt: "p".into(),
                max_tokens: 256,
                temperature: 0.3,
            })
            .await
            .unwrap();

        assert_eq!(completion.prompt_tokens, 120);
        assert_eq!(completion.completion_tokens, 48);
        assert_eq!(completion.cached_tokens, 32);
        assert_eq!(completion.model, "test-model-1");
    }

    #[tokio::test]
    async fn complete_retries_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"text": "ok"}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1}
            })))
            .mount(&server)
            .await;

        let completion = client(&server.uri())
            .complete(&CompletionRequest {
                prompt: "p".into(),
                max_tokens: 16,
                temperature: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(completion.text, "ok");
    }

    #[tokio::test]
    async fn batch_lifecycle_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batches"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "batch-42"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/batches/batch-42"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "completed"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/batches/batch-42/results"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {
                        "custom_id": "world|c1|3",
                        "text": "result text",
                        "usage": {"prompt_tokens": 10, "completion_tokens": 5}
                    },
                    {"custom_id": "world|c2|2", "error": "model refused"}
                ]
            })))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let batch_id = client
            .submit_batch(&[BatchItem {
                custom_id: "world|c1|3".into(),
                request: CompletionRequest {
                    prompt: "p".into(),
                    max_tokens: 256,
                    temperature: 0.3,
                },
            }])
            .await
            .unwrap();
        assert_eq!(batch_id, "batch-42");

        assert_eq!(
            client.poll_batch(&batch_id).await.unwrap(),
            ProviderBatchStatus::Completed
        );

        let results = client.fetch_batch_results(&batch_id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].completion.is_some());
        assert!(results[1].completion.is_none());
        assert_eq!(results[1].error.as_deref(), Some("model refused"));
    }
}
