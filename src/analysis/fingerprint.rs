/// タイトルの中核概念を表す短い損失性ハッシュ。
///
/// 同じ出来事を扱うタイトル同士が衝突するように意図的に粗くしてあり、
/// クラスタリングの一次キーとして使います。
use std::collections::BTreeMap;

use crate::util::text::significant_words;

use super::entities::top_entity;

/// タイトルと抽出済みエンティティから6文字の16進フィンガープリントを導出する。
///
/// 基底文字列は、長さ3を超える有意語の上位3件（辞書順に整列）と
/// 最上位エンティティを小文字で連結したものです。
#[must_use]
pub fn fingerprint(title: &str, entities: &BTreeMap<String, u32>) -> String {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for word in significant_words(title, 3) {
        *counts.entry(word).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut top_words: Vec<String> = ranked.into_iter().take(3).map(|(w, _)| w).collect();
    top_words.sort_unstable();

    let mut basis = top_words.concat();
    if let Some(entity) = top_entity(entities) {
        basis.push_str(&entity.to_lowercase());
    }

    let digest = md5::compute(basis.as_bytes());
    format!("{digest:x}")[..6].to_string()
}

#[cfg(test)]
mod tests {
    use super::super::entities::{DEFAULT_TOP_K, extract_entities};
    use super::*;

    fn fingerprint_of(title: &str) -> String {
        let entities = extract_entities(title, DEFAULT_TOP_K);
        fingerprint(title, &entities)
    }

    #[test]
    fn fingerprint_is_six_hex_chars() {
        let fp = fingerprint_of("Magnitude 7 Earthquake Strikes Eastern Turkey");
        assert_eq!(fp.len(), 6);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint_of("Magnitude 7 Earthquake Strikes Eastern Turkey");
        let b = fingerprint_of("Magnitude 7 Earthquake Strikes Eastern Turkey");
        assert_eq!(a, b);
    }

    #[test]
    fn word_order_does_not_change_fingerprint() {
        // 上位語は辞書順に並べ替えてから連結するため語順に依存しない
        let a = fingerprint_of("Earthquake Strikes Turkey");
        let b = fingerprint_of("Turkey Earthquake Strikes");
        assert_eq!(a, b);
    }

    #[test]
    fn different_concepts_differ() {
        let a = fingerprint_of("Magnitude 7 Earthquake Strikes Eastern Turkey");
        let b = fingerprint_of("Central Bank Raises Interest Rates Again");
        assert_ne!(a, b);
    }
}
