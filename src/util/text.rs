/// 見出しテキストのトークン化ユーティリティ。
///
/// エンティティ抽出・類似度計算・スパム判定が共有する正規化処理を提供します。
use std::collections::HashSet;

use once_cell::sync::Lazy;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "nor", "so", "yet", "of", "in", "on", "at", "to",
        "for", "with", "by", "from", "as", "is", "are", "was", "were", "be", "been", "being",
        "it", "its", "this", "that", "these", "those", "his", "her", "hers", "their", "theirs",
        "our", "ours", "your", "yours", "after", "before", "over", "under", "into", "onto",
        "out", "up", "down", "off", "about", "against", "amid", "among", "between", "during",
        "through", "will", "would", "could", "should", "can", "may", "might", "must", "have",
        "has", "had", "not", "no", "than", "then", "when", "while", "where", "who", "whom",
        "what", "which", "why", "how", "all", "any", "both", "each", "few", "more", "most",
        "other", "some", "such", "only", "own", "same", "too", "very", "just", "also", "amidst",
    ]
    .into_iter()
    .collect()
});

/// タイトルを単語トークンに分割する。
///
/// 空白で区切り、前後の句読点を取り除きます。大文字小文字は保持します。
#[must_use]
pub fn tokenize(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .map(|raw| raw.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

/// ストップワードかどうかを判定する（大文字小文字を区別しない）。
#[must_use]
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word.to_lowercase().as_str())
}

/// タイトル中の有意語（小文字化済み）を出現順に返す。
///
/// 長さが `min_len` を超え、ストップワードでも数字でもないトークンが対象です。
#[must_use]
pub fn significant_words(title: &str, min_len: usize) -> Vec<String> {
    tokenize(title)
        .into_iter()
        .filter(|token| token.len() > min_len)
        .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
        .filter(|token| !is_stop_word(token))
        .map(|token| token.to_lowercase())
        .collect()
}

/// 先頭が大文字で始まるトークンかどうか。
#[must_use]
pub fn starts_uppercase(token: &str) -> bool {
    token.chars().next().is_some_and(char::is_uppercase)
}

/// トークン列のうち大文字で始まるものの割合を返す。
#[must_use]
pub fn capitalised_ratio(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let capitalised = tokens.iter().filter(|t| starts_uppercase(t)).count();
    capitalised as f64 / tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_strips_punctuation() {
        let tokens = tokenize("Turkey Earthquake: Rescue Operations Begin");
        assert_eq!(
            tokens,
            vec!["Turkey", "Earthquake", "Rescue", "Operations", "Begin"]
        );
    }

    #[test]
    fn tokenize_keeps_inner_hyphenless_words() {
        let tokens = tokenize("  Pro-Palestine  rally ");
        assert_eq!(tokens, vec!["Pro-Palestine", "rally"]);
    }

    #[test]
    fn significant_words_drop_stop_words_and_digits() {
        let words = significant_words("The Earthquake of 2026 Strikes Eastern Turkey", 3);
        assert_eq!(words, vec!["earthquake", "strikes", "eastern", "turkey"]);
    }

    #[test]
    fn capitalised_ratio_counts_leading_uppercase() {
        let tokens = tokenize("Paper Daisy");
        assert!((capitalised_ratio(&tokens) - 1.0).abs() < f64::EPSILON);

        let tokens = tokenize("one Two three four");
        assert!((capitalised_ratio(&tokens) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn capitalised_ratio_empty_is_zero() {
        assert!(capitalised_ratio(&[]).abs() < f64::EPSILON);
    }
}
