/// タイトル間の重み付き類似度スコア。
///
/// 4つのシグナルを重み付けして合成します:
/// キーワード重なり 50% / 共有固有名詞 30% / 最長共通部分文字列比 15% /
/// 全トークンのJaccard 5%。3個以上のエンティティが一致する場合は
/// 1.2倍のブースト（上限1.0）を掛けます。
use std::collections::HashSet;

use crate::util::text::{significant_words, starts_uppercase, tokenize};

use super::entities::extract_entities;

/// 類似度比較では保存時より広めにエンティティを見る。
const SIMILARITY_TOP_K: usize = 10;

const WEIGHT_KEYWORDS: f64 = 0.50;
const WEIGHT_ENTITIES: f64 = 0.30;
const WEIGHT_SUBSTRING: f64 = 0.15;
const WEIGHT_JACCARD: f64 = 0.05;
const ENTITY_BOOST_THRESHOLD: usize = 3;
const ENTITY_BOOST: f64 = 1.2;

/// 2つのタイトルの類似度を[0,1]で返す。
#[must_use]
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let keywords_a: HashSet<String> = significant_words(a, 3).into_iter().collect();
    let keywords_b: HashSet<String> = significant_words(b, 3).into_iter().collect();
    let keyword_overlap = overlap_ratio(&keywords_a, &keywords_b);

    let shared = shared_entities(a, b);
    let entities_a = entity_set(a);
    let entities_b = entity_set(b);
    let entity_overlap = if entities_a.is_empty() || entities_b.is_empty() {
        0.0
    } else {
        shared as f64 / entities_a.len().min(entities_b.len()) as f64
    };

    let lowered_a = a.to_lowercase();
    let lowered_b = b.to_lowercase();
    let substring_fraction = if lowered_a.is_empty() || lowered_b.is_empty() {
        0.0
    } else {
        let lcs = longest_common_substring(&lowered_a, &lowered_b);
        lcs as f64 / lowered_a.chars().count().min(lowered_b.chars().count()) as f64
    };

    let tokens_a: HashSet<String> = tokenize(a).into_iter().map(|t| t.to_lowercase()).collect();
    let tokens_b: HashSet<String> = tokenize(b).into_iter().map(|t| t.to_lowercase()).collect();
    let jaccard = jaccard_ratio(&tokens_a, &tokens_b);

    let mut score = WEIGHT_KEYWORDS * keyword_overlap
        + WEIGHT_ENTITIES * entity_overlap
        + WEIGHT_SUBSTRING * substring_fraction
        + WEIGHT_JACCARD * jaccard;

    if shared >= ENTITY_BOOST_THRESHOLD {
        score = (score * ENTITY_BOOST).min(1.0);
    }

    score.clamp(0.0, 1.0)
}

/// 両タイトルに共通する固有名詞エンティティ数（大文字小文字を無視）。
#[must_use]
pub fn shared_entities(a: &str, b: &str) -> usize {
    entity_set(a).intersection(&entity_set(b)).count()
}

/// 両タイトルに共通する、長さ4を超える大文字始まり語の数。
///
/// フィンガープリントも類似度も決め手に欠ける場合の最終フォールバック
/// 照合に使います。
#[must_use]
pub fn shared_long_uppercase_words(a: &str, b: &str) -> usize {
    long_uppercase_words(a)
        .intersection(&long_uppercase_words(b))
        .count()
}

fn entity_set(title: &str) -> HashSet<String> {
    extract_entities(title, SIMILARITY_TOP_K)
        .into_keys()
        .map(|token| token.to_lowercase())
        .collect()
}

fn long_uppercase_words(title: &str) -> HashSet<String> {
    tokenize(title)
        .into_iter()
        .filter(|token| token.len() > 4 && starts_uppercase(token))
        .map(|token| token.to_lowercase())
        .collect()
}

fn overlap_ratio(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    shared as f64 / a.len().min(b.len()) as f64
}

fn jaccard_ratio(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = 0;

    for i in 1..=a.len() {
        let mut curr = vec![0usize; b.len() + 1];
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                curr[j] = prev[j - 1] + 1;
                best = best.max(curr[j]);
            }
        }
        prev = curr;
    }

    best
}
