/// LLM要約レスポンスのJSON Schema定義。
use once_cell::sync::Lazy;
use serde_json::{Value, json};

/// 要約生成レスポンスのJSON Schema。
///
/// 語数の上下限（80〜180語）はトークン化に依存するためスキーマでは
/// 表現せず、パーサー側で検証します。
pub(crate) static SUMMARY_RESPONSE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "Cluster Summary Response",
        "description": "Response contract for cluster summary generation",
        "type": "object",
        "properties": {
            "summary": {
                "type": "string",
                "minLength": 1,
                "description": "Synthesised story summary"
            },
            "headline": {
                "type": "string",
                "minLength": 1,
                "maxLength": 120,
                "description": "Candidate headline for the story"
            }
        },
        "required": ["summary", "headline"],
        "additionalProperties": true
    })
});
