/// フィードのHTTP取得とエントリの記事化。
///
/// RSS 2.0とAtomの両方をサポートし、エントリごとに正規URL・安定ID・
/// エンティティ・フィンガープリントを付与した記事を組み立てます。
use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::analysis::entities::{DEFAULT_TOP_K, extract_entities};
use crate::analysis::fingerprint::fingerprint;
use crate::store::models::Article;

use super::canonical::canonicalise;
use super::feeds::FeedSpec;

#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    /// フェッチ用クライアントを構築する。
    ///
    /// # Errors
    /// HTTPクライアントの構築に失敗した場合はエラーを返す。
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("newsdesk/0.1")
            .build()
            .context("failed to build feed fetch client")?;
        Ok(Self { client })
    }

    /// フィードを1回取得し、パース済みの記事候補を返す。
    ///
    /// スパムフィルターはここでは適用しません。呼び出し側（ポーリング
    /// ワーカー）が保存前に適用し、件数を計上します。
    pub async fn fetch(&self, spec: &FeedSpec, now: DateTime<Utc>) -> Result<Vec<Article>> {
        let response = self
            .client
            .get(spec.url)
            .send()
            .await
            .with_context(|| format!("feed request failed: {}", spec.url))?
            .error_for_status()
            .with_context(|| format!("feed returned error status: {}", spec.url))?;

        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read feed body: {}", spec.url))?;

        let parsed = feed_rs::parser::parse(body.as_ref())
            .with_context(|| format!("failed to parse feed: {}", spec.url))?;

        let language = parsed
            .language
            .as_deref()
            .map(normalise_language)
            .unwrap_or_else(|| "en".to_string());

        let mut articles = Vec::with_capacity(parsed.entries.len());
        for entry in parsed.entries {
            let Some(title) = entry
                .title
                .as_ref()
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
            else {
                continue;
            };
            let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
                continue;
            };
            let url = match canonicalise(&link) {
                Ok(url) => url,
                Err(error) => {
                    debug!(%error, link, "skipping entry with unparsable link");
                    continue;
                }
            };

            let description = entry
                .summary
                .as_ref()
                .map(|s| strip_html(&s.content))
                .unwrap_or_default();
            let content = entry
                .content
                .as_ref()
                .and_then(|c| c.body.as_deref())
                .map(strip_html)
                .unwrap_or_default();
            let published_at = entry.published.or(entry.updated).unwrap_or(now);

            let entities = extract_entities(&title, DEFAULT_TOP_K);
            let fp = fingerprint(&title, &entities);

            articles.push(Article {
                id: Article::derive_id(spec.source, &url),
                source: spec.source.to_string(),
                source_tier: spec.source_tier,
                url,
                title,
                description,
                content,
                published_at,
                fetched_at: now,
                updated_at: now,
                category: spec.category,
                language: language.clone(),
                entities,
                fingerprint: fp,
            });
        }

        Ok(articles)
    }
}

/// HTMLタグを取り除き、主要な文字実体参照を復元する。
fn strip_html(html: &str) -> String {
    let cleaned = ammonia::Builder::empty().clean(html).to_string();
    cleaned
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_string()
}

/// `en-GB` のような地域付きコードを短い言語コードに揃える。
fn normalise_language(raw: &str) -> String {
    raw.split(['-', '_'])
        .next()
        .unwrap_or(raw)
        .to_lowercase()
}
