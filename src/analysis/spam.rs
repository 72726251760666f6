/// スパム/ライフスタイル記事フィルター。
///
/// プロモーション記事やレストラン紹介のような非ニュース項目を、
/// 保存前に取り除きます。除外は正常系であり、メトリクスで計数されます。
use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

use crate::util::text::{capitalised_ratio, tokenize};

/// 明示的なプロモーション表現。タイトル+説明+URLの連結に対して照合します。
const PROMO_KEYWORDS: &[&str] = &[
    "sponsored",
    "advertorial",
    "promo code",
    "discount code",
    "coupon",
    "% off",
    "giveaway",
    "sweepstakes",
    "best deals",
    "deal of the day",
    "buy now",
    "shop now",
    "sale ends",
    "win tickets",
    "limited time offer",
    "free shipping",
    "subscribe today",
];

/// ライフスタイル系のURLセグメント。
const LIFESTYLE_URL_SEGMENTS: &[&str] = &[
    "/good-food",
    "/best-restaurant",
    "/food-drink",
    "/venue",
    "/eating-out",
    "/lifestyle",
    "/food",
    "/dining",
    "/restaurants",
];

/// 短い大文字タイトルをニュースとして救済する動詞/名詞。
const NEWS_VERBS: &[&str] = &[
    "says", "announces", "reports", "confirms", "claims", "accuses", "reveals", "attack",
    "fire", "death", "killed", "injured", "arrested", "charged", "verdict", "found",
];

/// 説明文に現れるライフスタイル語彙。
const LIFESTYLE_KEYWORDS: &[&str] = &[
    "restaurant",
    "recipe",
    "menu",
    "chef",
    "dining",
    "brunch",
    "cocktail",
    "wine",
    "cafe",
    "eatery",
    "foodie",
    "bistro",
    "bakery",
    "getaway",
    "staycation",
    "wellness",
    "spa",
    "fashion",
    "boutique",
    "decor",
];

static PROMO_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(PROMO_KEYWORDS)
        .expect("promo keyword automaton")
});

static LIFESTYLE_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(LIFESTYLE_KEYWORDS)
        .expect("lifestyle keyword automaton")
});

/// 記事が除外された理由。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Promotional,
    LifestyleUrl,
    LifestyleDescription,
}

/// タイトル・説明・URLからスパム/ライフスタイル記事を判定する。
///
/// `Some` を返した記事は保存されません。ルール:
/// 1. プロモーション表現がどこかに含まれる。
/// 2. URLがライフスタイルセグメントを含み、タイトルが1〜4語かつ70%以上
///    大文字始まりで、ニュース動詞を含まない（説明が空でも成立）。
/// 3. タイトルが1〜4語かつ70%以上大文字始まりで、説明にライフスタイル
///    語彙が含まれる。
#[must_use]
pub fn classify(title: &str, description: &str, url: &str) -> Option<FilterReason> {
    let combined = format!("{title} {description} {url}");
    if PROMO_MATCHER.is_match(&combined) {
        return Some(FilterReason::Promotional);
    }

    let tokens = tokenize(title);
    let short_capitalised = (1..=4).contains(&tokens.len()) && capitalised_ratio(&tokens) >= 0.7;

    if short_capitalised {
        let lowered_url = url.to_lowercase();
        let has_lifestyle_segment = LIFESTYLE_URL_SEGMENTS
            .iter()
            .any(|segment| lowered_url.contains(segment));
        let has_news_verb = tokens
            .iter()
            .any(|token| NEWS_VERBS.contains(&token.to_lowercase().as_str()));

        if has_lifestyle_segment && !has_news_verb {
            return Some(FilterReason::LifestyleUrl);
        }

        if LIFESTYLE_MATCHER.is_match(description) {
            return Some(FilterReason::LifestyleDescription);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotional_keyword_rejects() {
        assert_eq!(
            classify(
                "Great Gadget Reviewed",
                "Use our promo code for 20% off",
                "https://example.com/review"
            ),
            Some(FilterReason::Promotional)
        );
    }

    #[test]
    fn lifestyle_url_with_short_capitalised_title_rejects() {
        // 説明が空でもURLルールは成立する
        assert_eq!(
            classify("Paper Daisy", "", "https://example.com/good-food/paper-daisy"),
            Some(FilterReason::LifestyleUrl)
        );
    }

    #[test]
    fn news_verb_rescues_lifestyle_url() {
        assert_eq!(
            classify(
                "Restaurant Fire Reported",
                "",
                "https://example.com/food/restaurant-fire"
            ),
            None
        );
    }

    #[test]
    fn lifestyle_description_rejects_short_title() {
        assert_eq!(
            classify(
                "Harbour View",
                "The new rooftop restaurant has a stunning menu",
                "https://example.com/city/harbour-view"
            ),
            Some(FilterReason::LifestyleDescription)
        );
    }

    #[test]
    fn long_news_titles_pass() {
        assert_eq!(
            classify(
                "Magnitude 7 Earthquake Strikes Eastern Turkey",
                "Rescue operations are under way",
                "https://example.com/world/earthquake"
            ),
            None
        );
    }

    #[test]
    fn lowercase_title_passes_even_on_lifestyle_url() {
        assert_eq!(
            classify(
                "what we ate this week",
                "",
                "https://example.com/food/weekly"
            ),
            None
        );
    }
}
