/// 記事と候補クラスタの照合規則。
///
/// フィンガープリント一致 → ファジー一致 → エンティティフォールバックの
/// 順に評価します。すべて純関数です。
use crate::analysis::conflict::topics_conflict;
use crate::analysis::similarity::{shared_long_uppercase_words, title_similarity};
use crate::store::models::{Article, Cluster};

/// 候補クエリの上限件数。
pub const CANDIDATE_LIMIT: usize = 500;

/// 候補クエリの対象となる `last_updated` の窓（時間）。
pub const CANDIDATE_WINDOW_HOURS: i64 = 48;

/// ファジー一致を受け入れるスコア下限（この値ちょうどでは不採用）。
pub const FUZZY_ACCEPT_THRESHOLD: f64 = 0.30;

/// エンティティフォールバックを検討するスコア下限。
pub const ENTITY_FALLBACK_THRESHOLD: f64 = 0.20;

/// エンティティフォールバックが要求する共有語数。
pub const ENTITY_FALLBACK_SHARED: usize = 2;

/// 記事に最も適合する既存クラスタを選ぶ。
///
/// 1. フィンガープリントが一致する候補のうち最も新しく更新されたもの。
/// 2. タイトル類似度が最良の候補。トピック競合がなく、スコアが閾値を
///    超えていれば採用。
/// 3. それでも未決なら、最良候補とのスコアが下限を超え、長い大文字語を
///    2つ以上共有している場合に採用。トピック競合した候補はフォール
///    バックでも採用しない。
#[must_use]
pub fn best_match<'a>(article: &Article, candidates: &'a [Cluster]) -> Option<&'a Cluster> {
    if let Some(by_fingerprint) = candidates
        .iter()
        .filter(|c| c.fingerprint == article.fingerprint)
        .max_by_key(|c| c.last_updated)
    {
        return Some(by_fingerprint);
    }

    let mut best: Option<(f64, &Cluster)> = None;
    for candidate in candidates {
        let score = title_similarity(&article.title, &candidate.title);
        if best.is_none_or(|(current, _)| score > current) {
            best = Some((score, candidate));
        }
    }
    let (score, candidate) = best?;

    if topics_conflict(&article.title, &candidate.title) {
        return None;
    }

    if score > FUZZY_ACCEPT_THRESHOLD {
        return Some(candidate);
    }

    if score > ENTITY_FALLBACK_THRESHOLD
        && shared_long_uppercase_words(&article.title, &candidate.title)
            >= ENTITY_FALLBACK_SHARED
    {
        return Some(candidate);
    }

    None
}
