/// モデル別レート表とコスト計算。
///
/// レートは100万トークンあたりのUSD。バッチ処理は同期価格の約半額です。
/// 未知のモデルには保守的な既定レートを適用します。

/// バッチ処理の割引率。
pub const BATCH_DISCOUNT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRate {
    pub prompt_per_mtok: f64,
    pub cached_per_mtok: f64,
    pub completion_per_mtok: f64,
}

/// モデル名の前方一致で引くレート表。
const RATES: &[(&str, ModelRate)] = &[
    (
        "gpt-4o-mini",
        ModelRate {
            prompt_per_mtok: 0.15,
            cached_per_mtok: 0.075,
            completion_per_mtok: 0.60,
        },
    ),
    (
        "gpt-4o",
        ModelRate {
            prompt_per_mtok: 2.50,
            cached_per_mtok: 1.25,
            completion_per_mtok: 10.00,
        },
    ),
    (
        "gpt-4.1-mini",
        ModelRate {
            prompt_per_mtok: 0.40,
            cached_per_mtok: 0.10,
            completion_per_mtok: 1.60,
        },
    ),
    (
        "claude-3-5-haiku",
        ModelRate {
            prompt_per_mtok: 0.80,
            cached_per_mtok: 0.08,
            completion_per_mtok: 4.00,
        },
    ),
    (
        "claude-sonnet",
        ModelRate {
            prompt_per_mtok: 3.00,
            cached_per_mtok: 0.30,
            completion_per_mtok: 15.00,
        },
    ),
];

const DEFAULT_RATE: ModelRate = ModelRate {
    prompt_per_mtok: 1.00,
    cached_per_mtok: 0.50,
    completion_per_mtok: 4.00,
};

/// モデル識別子に対応するレートを返す。
#[must_use]
pub fn rate_for(model: &str) -> ModelRate {
    RATES
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map_or(DEFAULT_RATE, |(_, rate)| *rate)
}

/// 1レスポンス分のコストをUSDで計算する。
#[must_use]
pub fn completion_cost_usd(
    model: &str,
    prompt_tokens: u64,
    completion_tokens: u64,
    cached_tokens: u64,
    batch_processed: bool,
) -> f64 {
    let rate = rate_for(model);
    let billable_prompt = prompt_tokens.saturating_sub(cached_tokens);

    let cost = (billable_prompt as f64 * rate.prompt_per_mtok
        + cached_tokens as f64 * rate.cached_per_mtok
        + completion_tokens as f64 * rate.completion_per_mtok)
        / 1_000_000.0;

    if batch_processed {
        cost * BATCH_DISCOUNT
    } else {
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_lookup_uses_longest_matching_prefix_first() {
        // 表の順序で"gpt-4o-mini"が"gpt-4o"より先に一致する
        assert_eq!(rate_for("gpt-4o-mini-2025-01").prompt_per_mtok, 0.15);
        assert_eq!(rate_for("gpt-4o-2025-01").prompt_per_mtok, 2.50);
    }

    #[test]
    fn unknown_model_gets_default_rate() {
        assert_eq!(rate_for("mystery-model"), DEFAULT_RATE);
    }

    #[test]
    fn cached_tokens_are_billed_at_cached_rate() {
        let full = completion_cost_usd("gpt-4o-mini", 1_000_000, 0, 0, false);
        let cached = completion_cost_usd("gpt-4o-mini", 1_000_000, 0, 1_000_000, false);
        assert!((full - 0.15).abs() < 1e-9);
        assert!((cached - 0.075).abs() < 1e-9);
    }

    #[test]
    fn batch_processing_halves_the_cost() {
        let realtime = completion_cost_usd("gpt-4o-mini", 100_000, 10_000, 0, false);
        let batch = completion_cost_usd("gpt-4o-mini", 100_000, 10_000, 0, true);
        assert!((batch - realtime * BATCH_DISCOUNT).abs() < 1e-12);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert!(completion_cost_usd("gpt-4o", 0, 0, 0, false).abs() < f64::EPSILON);
    }
}
