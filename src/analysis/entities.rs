/// タイトルからの固有名詞エンティティ抽出。
use std::collections::BTreeMap;

use crate::util::text::{is_stop_word, starts_uppercase, tokenize};

/// 抽出する上位エンティティ数の既定値。
pub const DEFAULT_TOP_K: usize = 5;

/// タイトルをトークン化し、大文字で始まる長さ4以上のトークンを
/// 出現回数付きで上位 `k` 件返す。
///
/// ストップワードと数字のみのトークンは除外します。同数の場合は
/// 辞書順で安定化するため、同じ入力に対して常に同じ結果になります。
#[must_use]
pub fn extract_entities(title: &str, k: usize) -> BTreeMap<String, u32> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for token in tokenize(title) {
        if token.len() < 4 {
            continue;
        }
        if !starts_uppercase(&token) {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if is_stop_word(&token) {
            continue;
        }
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(k).collect()
}

/// 出現回数順で最上位のエンティティを返す。
#[must_use]
pub fn top_entity(entities: &BTreeMap<String, u32>) -> Option<&str> {
    entities
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(token, _)| token.as_str())
}
