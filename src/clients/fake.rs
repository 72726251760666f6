/// テスト用のスクリプト式LLMフェイク。
///
/// 事前に積んだレスポンスを順に返し、受け取ったリクエストを記録します。
/// バッチはプロセス内で即時「完了」します。
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use super::llm::{
    BatchItem, BatchResultItem, Completion, CompletionRequest, LlmApi, ProviderBatchStatus,
};

#[derive(Debug, Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    batches: Mutex<HashMap<String, Vec<BatchItem>>>,
    batch_counter: AtomicU64,
}

impl ScriptedLlm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の補完呼び出しが返すテキストを積む。
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses.lock().expect("fake lock").push_back(text.into());
    }

    /// これまでに受け取った補完リクエストのコピーを返す。
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("fake lock").clone()
    }

    fn next_response(&self) -> Result<String> {
        self.responses
            .lock()
            .expect("fake lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted responses exhausted"))
    }

    fn completion_for(&self, prompt: &str, text: String) -> Completion {
        Completion {
            prompt_tokens: (prompt.len() / 4) as u64,
            completion_tokens: (text.len() / 4) as u64,
            cached_tokens: 0,
            model: self.model().to_string(),
            text,
        }
    }
}

#[async_trait]
impl LlmApi for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.requests.lock().expect("fake lock").push(request.clone());
        let text = self.next_response()?;
        Ok(self.completion_for(&request.prompt, text))
    }

    async fn submit_batch(&self, items: &[BatchItem]) -> Result<String> {
        let id = format!("batch-{}", self.batch_counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.batches
            .lock()
            .expect("fake lock")
            .insert(id.clone(), items.to_vec());
        Ok(id)
    }

    async fn poll_batch(&self, batch_id: &str) -> Result<ProviderBatchStatus> {
        let batches = self.batches.lock().expect("fake lock");
        if batches.contains_key(batch_id) {
            Ok(ProviderBatchStatus::Completed)
        } else {
            Ok(ProviderBatchStatus::Failed)
        }
    }

    async fn fetch_batch_results(&self, batch_id: &str) -> Result<Vec<BatchResultItem>> {
        let items = {
            let batches = self.batches.lock().expect("fake lock");
            batches
                .get(batch_id)
                .cloned()
                .ok_or_else(|| anyhow!("unknown batch: {batch_id}"))?
        };

        items
            .into_iter()
            .map(|item| {
                let text = self.next_response()?;
                Ok(BatchResultItem {
                    completion: Some(self.completion_for(&item.request.prompt, text)),
                    custom_id: item.custom_id,
                    error: None,
                })
            })
            .collect()
    }
}
