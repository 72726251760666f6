/// URL正規化。
///
/// トラッキング用クエリパラメータを取り除き、フラグメントを捨てます。
/// ホストはパース時に小文字化されるため、同じ記事URLは常に同じ
/// 正規形（ひいては同じ記事ID）になります。
use anyhow::{Context as _, Result};
use reqwest::Url;

const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "cmpid",
    "ocid",
    "ito",
    "ref",
    "smid",
    "partner",
    "ns_campaign",
    "ns_mchannel",
    "ns_source",
    "at_medium",
    "at_campaign",
];

/// 記事リンクを正規形に変換する。
///
/// # Errors
/// URLとしてパースできない場合はエラーを返す。
pub fn canonicalise(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw.trim()).with_context(|| format!("invalid article URL: {raw}"))?;

    url.set_fragment(None);

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if retained.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(retained);
    }

    Ok(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_utm_parameters() {
        let canonical =
            canonicalise("https://example.com/story?utm_source=rss&utm_medium=feed").unwrap();
        assert_eq!(canonical, "https://example.com/story");
    }

    #[test]
    fn keeps_content_parameters() {
        let canonical = canonicalise("https://example.com/story?id=42&utm_source=rss").unwrap();
        assert_eq!(canonical, "https://example.com/story?id=42");
    }

    #[test]
    fn lowercases_host() {
        let canonical = canonicalise("https://Example.COM/Story").unwrap();
        assert_eq!(canonical, "https://example.com/Story");
    }

    #[test]
    fn drops_fragment() {
        let canonical = canonicalise("https://example.com/story#section-2").unwrap();
        assert_eq!(canonical, "https://example.com/story");
    }

    #[test]
    fn same_url_with_different_tracking_is_identical() {
        let a = canonicalise("https://example.com/story?fbclid=abc").unwrap();
        let b = canonicalise("https://example.com/story?gclid=xyz").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_url_is_an_error() {
        assert!(canonicalise("not a url").is_err());
    }
}
