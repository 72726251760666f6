/// プロンプトテンプレートとレスポンスパーサー。
///
/// リアルタイム経路とバッチ経路の両方がこのモジュールを共有します。
/// 契約: 入力は `{source, title, description, published_at}` のリストと
/// 現行見出し、出力は `{summary, headline}` のJSONオブジェクト。
/// 語数・文字数の制約を外れたレスポンスは生成失敗として扱い、保存
/// しません。
use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::schema::summary::SUMMARY_RESPONSE_SCHEMA;
use crate::schema::validate_json;
use crate::store::models::Article;

/// サマリー本文の最小語数。
pub const SUMMARY_MIN_WORDS: usize = 80;

/// サマリー本文の最大語数。
pub const SUMMARY_MAX_WORDS: usize = 180;

/// 見出しの最大文字数。
pub const HEADLINE_MAX_CHARS: usize = 120;

/// プロンプトに載せる記事の抜粋。
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleBrief {
    pub source: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
}

impl From<&Article> for ArticleBrief {
    fn from(article: &Article) -> Self {
        Self {
            source: article.source.clone(),
            title: article.title.clone(),
            description: article.description.clone(),
            published_at: article.published_at,
        }
    }
}

/// 検証済みのサマリーレスポンス。
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSummary {
    pub summary: String,
    pub headline: String,
    pub word_count: u32,
}

#[derive(Debug, Deserialize)]
struct RawSummaryResponse {
    summary: String,
    headline: String,
}

/// クラスタ要約プロンプトを構築する。
#[must_use]
pub fn build_summary_prompt(current_headline: &str, articles: &[ArticleBrief]) -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(
        "You are a news editor synthesising one story from multiple source reports.\n\
         Write a neutral, factual summary of the story below.\n\n",
    );
    prompt.push_str(&format!("Current headline: {current_headline}\n\nSource reports:\n"));

    for (index, article) in articles.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{}] {} ({})\n   {}\n",
            index + 1,
            article.source,
            article.title,
            article.published_at.to_rfc3339(),
            article.description
        ));
    }

    prompt.push_str(&format!(
        "\nRespond with a single JSON object and nothing else:\n\
         {{\"summary\": \"...\", \"headline\": \"...\"}}\n\
         Constraints: the summary must be between {SUMMARY_MIN_WORDS} and {SUMMARY_MAX_WORDS} \
         words; the headline must be at most {HEADLINE_MAX_CHARS} characters and must not be \
         sensationalised.\n"
    ));

    prompt
}

/// サマリーレスポンスを検証付きでパースする。
///
/// # Errors
/// JSONとして読めない、スキーマに合わない、または語数・文字数の制約を
/// 外れている場合はエラーを返す。呼び出し側はこれを生成失敗として扱い、
/// クラスタを更新しません。
pub fn parse_summary_response(raw: &str) -> Result<ParsedSummary> {
    let json_text = extract_json(raw);
    let value: Value = serde_json::from_str(json_text)
        .map_err(|e| anyhow!("summary response is not valid JSON: {e}"))?;

    let validation = validate_json(&SUMMARY_RESPONSE_SCHEMA, &value);
    if !validation.valid {
        bail!("summary response failed schema validation: {:?}", validation.errors);
    }

    let parsed: RawSummaryResponse =
        serde_json::from_value(value).map_err(|e| anyhow!("summary response mismatch: {e}"))?;

    let word_count = parsed.summary.split_whitespace().count();
    if !(SUMMARY_MIN_WORDS..=SUMMARY_MAX_WORDS).contains(&word_count) {
        bail!(
            "summary word count {word_count} outside [{SUMMARY_MIN_WORDS}, {SUMMARY_MAX_WORDS}]"
        );
    }

    let headline = parsed.headline.trim().to_string();
    if headline.is_empty() || headline.chars().count() > HEADLINE_MAX_CHARS {
        bail!("headline missing or longer than {HEADLINE_MAX_CHARS} characters");
    }

    Ok(ParsedSummary {
        summary: parsed.summary.trim().to_string(),
        headline,
        word_count: word_count as u32,
    })
}

/// 見出し再評価プロンプトを構築する。
#[must_use]
pub fn build_headline_prompt(current_headline: &str, new_title: &str) -> String {
    format!(
        "A developing news story currently has this headline:\n  {current_headline}\n\n\
         A newly arrived source report is titled:\n  {new_title}\n\n\
         If the current headline still describes the story accurately and completely, respond \
         with exactly:\nKEEP_CURRENT\n\n\
         Otherwise respond with a single improved headline (at most {HEADLINE_MAX_CHARS} \
         characters) and nothing else."
    )
}

/// 見出し再評価の判定結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlineDecision {
    KeepCurrent,
    Replace(String),
}

/// 見出し再評価レスポンスをパースする。
///
/// 空のレスポンスや制約外のレスポンスは現状維持として扱います。
#[must_use]
pub fn parse_headline_response(raw: &str) -> HeadlineDecision {
    let trimmed = raw.trim().trim_matches('"').trim();

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("KEEP_CURRENT") {
        return HeadlineDecision::KeepCurrent;
    }
    if trimmed.chars().count() > HEADLINE_MAX_CHARS || trimmed.contains('\n') {
        return HeadlineDecision::KeepCurrent;
    }

    HeadlineDecision::Replace(trimmed.to_string())
}

/// コードフェンスで包まれたレスポンスからJSON部分を取り出す。
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}
