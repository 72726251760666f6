/// プロンプトに載せる代表記事の選定。
///
/// 最古・最新の記事に加えて、ソースの多様性を優先した新しい順の
/// サンプルで枠を埋めます。
use std::collections::HashSet;

use crate::store::models::Article;

/// プロンプトへ渡す記事数の上限。
pub const MAX_PROMPT_ARTICLES: usize = 8;

/// クラスタのメンバー記事から代表を選ぶ。
///
/// 返却は `published_at` 昇順。入力が上限以下ならそのまま全件返します。
#[must_use]
pub fn representative_articles(articles: &[Article]) -> Vec<&Article> {
    let mut ordered: Vec<&Article> = articles.iter().collect();
    ordered.sort_by_key(|a| (a.published_at, a.id.clone()));

    if ordered.len() <= MAX_PROMPT_ARTICLES {
        return ordered;
    }

    let mut picked_ids: HashSet<&str> = HashSet::new();
    let mut picked: Vec<&Article> = Vec::with_capacity(MAX_PROMPT_ARTICLES);

    let earliest = ordered[0];
    let latest = ordered[ordered.len() - 1];
    picked.push(earliest);
    picked_ids.insert(&earliest.id);
    picked.push(latest);
    picked_ids.insert(&latest.id);

    let mut seen_sources: HashSet<&str> = HashSet::new();
    seen_sources.insert(&earliest.source);
    seen_sources.insert(&latest.source);

    // ソース多様性優先: まだ出ていないソースの最新記事から拾う
    for article in ordered.iter().rev() {
        if picked.len() >= MAX_PROMPT_ARTICLES {
            break;
        }
        if picked_ids.contains(article.id.as_str()) {
            continue;
        }
        if seen_sources.contains(article.source.as_str()) {
            continue;
        }
        picked.push(article);
        picked_ids.insert(&article.id);
        seen_sources.insert(&article.source);
    }

    // 残り枠は新しい順で埋める
    for article in ordered.iter().rev() {
        if picked.len() >= MAX_PROMPT_ARTICLES {
            break;
        }
        if picked_ids.contains(article.id.as_str()) {
            continue;
        }
        picked.push(article);
        picked_ids.insert(&article.id);
    }

    picked.sort_by_key(|a| (a.published_at, a.id.clone()));
    picked
}
