/// 静的フィード設定テーブル。
///
/// 各フィードはソーストークン・ティア・カテゴリ・URLを持ちます。
/// ソーストークンは記事IDの接頭辞として使われるため安定である必要が
/// あります。ティアは 1=主要通信社/全国紙、2=地域媒体、3=専門媒体。
use crate::store::models::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSpec {
    pub source: &'static str,
    pub source_tier: u8,
    pub category: Category,
    pub url: &'static str,
}

const fn feed(
    source: &'static str,
    source_tier: u8,
    category: Category,
    url: &'static str,
) -> FeedSpec {
    FeedSpec {
        source,
        source_tier,
        category,
        url,
    }
}

pub static FEEDS: &[FeedSpec] = &[
    // -- world ------------------------------------------------------------
    feed("bbc", 1, Category::World, "https://feeds.bbci.co.uk/news/world/rss.xml"),
    feed("reuters", 1, Category::World, "https://feeds.reuters.com/reuters/worldNews"),
    feed("ap", 1, Category::World, "https://apnews.com/hub/world-news.rss"),
    feed("guardian", 1, Category::World, "https://www.theguardian.com/world/rss"),
    feed("nyt", 1, Category::World, "https://rss.nytimes.com/services/xml/rss/nyt/World.xml"),
    feed("cnn", 1, Category::World, "http://rss.cnn.com/rss/edition_world.rss"),
    feed("aljazeera", 1, Category::World, "https://www.aljazeera.com/xml/rss/all.xml"),
    feed("npr", 1, Category::World, "https://feeds.npr.org/1004/rss.xml"),
    feed("sky", 1, Category::World, "https://feeds.skynews.com/feeds/rss/world.xml"),
    feed("wapo", 1, Category::World, "https://feeds.washingtonpost.com/rss/world"),
    feed("fox", 2, Category::World, "https://moxie.foxnews.com/google-publisher/world.xml"),
    feed("abcnews", 1, Category::World, "https://abcnews.go.com/abcnews/internationalheadlines"),
    feed("cbc", 2, Category::World, "https://www.cbc.ca/webfeed/rss/rss-world"),
    feed("dw", 2, Category::World, "https://rss.dw.com/rdf/rss-en-world"),
    feed("smh", 2, Category::World, "https://www.smh.com.au/rss/world.xml"),
    feed("abc_au", 2, Category::World, "https://www.abc.net.au/news/feed/51120/rss.xml"),
    feed("japantimes", 2, Category::World, "https://www.japantimes.co.jp/feed"),
    feed("scmp", 2, Category::World, "https://www.scmp.com/rss/91/feed"),
    feed("toi", 2, Category::World, "https://timesofindia.indiatimes.com/rssfeeds/296589292.cms"),
    // -- us ---------------------------------------------------------------
    feed("nyt", 1, Category::Us, "https://rss.nytimes.com/services/xml/rss/nyt/US.xml"),
    feed("wapo", 1, Category::Us, "https://feeds.washingtonpost.com/rss/national"),
    feed("npr", 1, Category::Us, "https://feeds.npr.org/1003/rss.xml"),
    feed("cnn", 1, Category::Us, "http://rss.cnn.com/rss/edition_us.rss"),
    feed("fox", 2, Category::Us, "https://moxie.foxnews.com/google-publisher/us.xml"),
    feed("politico", 2, Category::Us, "https://www.politico.com/rss/politics-news.xml"),
    feed("axios", 2, Category::Us, "https://api.axios.com/feed/politics"),
    feed("abcnews", 1, Category::Us, "https://abcnews.go.com/abcnews/usheadlines"),
    feed("cbs", 2, Category::Us, "https://www.cbsnews.com/latest/rss/us"),
    feed("nbc", 2, Category::Us, "https://feeds.nbcnews.com/nbcnews/public/news"),
    // -- europe -----------------------------------------------------------
    feed("bbc", 1, Category::Europe, "https://feeds.bbci.co.uk/news/world/europe/rss.xml"),
    feed("guardian", 1, Category::Europe, "https://www.theguardian.com/world/europe-news/rss"),
    feed("euronews", 2, Category::Europe, "https://www.euronews.com/rss?level=vertical&name=my-europe"),
    feed("dw", 2, Category::Europe, "https://rss.dw.com/rdf/rss-en-eu"),
    feed("france24", 2, Category::Europe, "https://www.france24.com/en/europe/rss"),
    feed("spiegel", 2, Category::Europe, "https://www.spiegel.de/international/index.rss"),
    feed("elpais", 2, Category::Europe, "https://feeds.elpais.com/mrss-s/pages/ep/site/english.elpais.com/portada"),
    feed("lemonde", 2, Category::Europe, "https://www.lemonde.fr/en/europe/rss_full.xml"),
    feed("irishtimes", 2, Category::Europe, "https://www.irishtimes.com/cmlink/news-1.1319192"),
    feed("politico", 2, Category::Europe, "https://www.politico.eu/feed"),
    // -- business ---------------------------------------------------------
    feed("bloomberg", 1, Category::Business, "https://feeds.bloomberg.com/markets/news.rss"),
    feed("ft", 1, Category::Business, "https://www.ft.com/rss/home"),
    feed("wsj", 1, Category::Business, "https://feeds.a.dj.com/rss/WSJcomUSBusiness.xml"),
    feed("cnbc", 1, Category::Business, "https://www.cnbc.com/id/10001147/device/rss/rss.html"),
    feed("economist", 1, Category::Business, "https://www.economist.com/finance-and-economics/rss.xml"),
    feed("reuters", 1, Category::Business, "https://feeds.reuters.com/reuters/businessNews"),
    feed("marketwatch", 2, Category::Business, "https://feeds.content.dowjones.io/public/rss/mw_topstories"),
    feed("forbes", 2, Category::Business, "https://www.forbes.com/business/feed"),
    feed("insider", 2, Category::Business, "https://www.businessinsider.com/rss"),
    feed("guardian", 1, Category::Business, "https://www.theguardian.com/business/rss"),
    feed("bbc", 1, Category::Business, "https://feeds.bbci.co.uk/news/business/rss.xml"),
    // -- tech -------------------------------------------------------------
    feed("techcrunch", 3, Category::Tech, "https://techcrunch.com/feed"),
    feed("verge", 3, Category::Tech, "https://www.theverge.com/rss/index.xml"),
    feed("wired", 3, Category::Tech, "https://www.wired.com/feed/rss"),
    feed("ars", 3, Category::Tech, "https://feeds.arstechnica.com/arstechnica/index"),
    feed("engadget", 3, Category::Tech, "https://www.engadget.com/rss.xml"),
    feed("register", 3, Category::Tech, "https://www.theregister.com/headlines.atom"),
    feed("zdnet", 3, Category::Tech, "https://www.zdnet.com/news/rss.xml"),
    feed("mittr", 3, Category::Tech, "https://www.technologyreview.com/feed"),
    feed("bbc", 1, Category::Tech, "https://feeds.bbci.co.uk/news/technology/rss.xml"),
    feed("guardian", 1, Category::Tech, "https://www.theguardian.com/uk/technology/rss"),
    feed("nyt", 1, Category::Tech, "https://rss.nytimes.com/services/xml/rss/nyt/Technology.xml"),
    // -- science ----------------------------------------------------------
    feed("nature", 1, Category::Science, "https://www.nature.com/nature.rss"),
    feed("sciencedaily", 3, Category::Science, "https://www.sciencedaily.com/rss/all.xml"),
    feed("newscientist", 3, Category::Science, "https://www.newscientist.com/feed/home"),
    feed("sciam", 3, Category::Science, "http://rss.sciam.com/ScientificAmerican-Global"),
    feed("physorg", 3, Category::Science, "https://phys.org/rss-feed"),
    feed("space", 3, Category::Science, "https://www.space.com/feeds/all"),
    feed("bbc", 1, Category::Science, "https://feeds.bbci.co.uk/news/science_and_environment/rss.xml"),
    feed("guardian", 1, Category::Science, "https://www.theguardian.com/science/rss"),
    // -- health -----------------------------------------------------------
    feed("statnews", 3, Category::Health, "https://www.statnews.com/feed"),
    feed("mnt", 3, Category::Health, "https://www.medicalnewstoday.com/rss"),
    feed("kff", 3, Category::Health, "https://kffhealthnews.org/feed"),
    feed("bbc", 1, Category::Health, "https://feeds.bbci.co.uk/news/health/rss.xml"),
    feed("reuters", 1, Category::Health, "https://feeds.reuters.com/reuters/healthNews"),
    feed("nyt", 1, Category::Health, "https://rss.nytimes.com/services/xml/rss/nyt/Health.xml"),
    feed("guardian", 1, Category::Health, "https://www.theguardian.com/society/health/rss"),
    // -- sports -----------------------------------------------------------
    feed("espn", 2, Category::Sports, "https://www.espn.com/espn/rss/news"),
    feed("bbc", 1, Category::Sports, "https://feeds.bbci.co.uk/sport/rss.xml"),
    feed("skysports", 2, Category::Sports, "https://www.skysports.com/rss/12040"),
    feed("guardian", 1, Category::Sports, "https://www.theguardian.com/sport/rss"),
    feed("smh", 2, Category::Sports, "https://www.smh.com.au/rss/sport.xml"),
    feed("nine", 2, Category::Sports, "https://www.9news.com.au/sport/rss"),
    feed("reuters", 1, Category::Sports, "https://feeds.reuters.com/reuters/sportsNews"),
    // -- entertainment ----------------------------------------------------
    feed("variety", 3, Category::Entertainment, "https://variety.com/feed"),
    feed("thr", 3, Category::Entertainment, "https://www.hollywoodreporter.com/feed"),
    feed("billboard", 3, Category::Entertainment, "https://www.billboard.com/feed"),
    feed("rollingstone", 3, Category::Entertainment, "https://www.rollingstone.com/feed"),
    feed("deadline", 3, Category::Entertainment, "https://deadline.com/feed"),
    feed("bbc", 1, Category::Entertainment, "https://feeds.bbci.co.uk/news/entertainment_and_arts/rss.xml"),
    feed("guardian", 1, Category::Entertainment, "https://www.theguardian.com/culture/rss"),
    // -- general ----------------------------------------------------------
    feed("ap", 1, Category::General, "https://apnews.com/index.rss"),
    feed("reuters", 1, Category::General, "https://feeds.reuters.com/reuters/topNews"),
    feed("bbc", 1, Category::General, "https://feeds.bbci.co.uk/news/rss.xml"),
    feed("npr", 1, Category::General, "https://feeds.npr.org/1001/rss.xml"),
    feed("sky", 1, Category::General, "https://feeds.skynews.com/feeds/rss/home.xml"),
    feed("cbc", 2, Category::General, "https://www.cbc.ca/webfeed/rss/rss-topstories"),
    feed("smh", 2, Category::General, "https://www.smh.com.au/rss/feed.xml"),
    feed("abc_au", 2, Category::General, "https://www.abc.net.au/news/feed/45910/rss.xml"),
];

/// ソーストークンを表示名に変換する静的マッピング。
#[must_use]
pub fn display_name(source: &str) -> &'static str {
    match source {
        "ap" => "Associated Press",
        "reuters" => "Reuters",
        "bbc" => "BBC News",
        "guardian" => "The Guardian",
        "nyt" => "The New York Times",
        "cnn" => "CNN",
        "aljazeera" => "Al Jazeera",
        "npr" => "NPR",
        "sky" => "Sky News",
        "wapo" => "The Washington Post",
        "fox" => "Fox News",
        "abcnews" => "ABC News",
        "cbc" => "CBC News",
        "dw" => "Deutsche Welle",
        "smh" => "The Sydney Morning Herald",
        "abc_au" => "ABC News Australia",
        "japantimes" => "The Japan Times",
        "scmp" => "South China Morning Post",
        "toi" => "The Times of India",
        "politico" => "Politico",
        "axios" => "Axios",
        "cbs" => "CBS News",
        "nbc" => "NBC News",
        "euronews" => "Euronews",
        "france24" => "France 24",
        "spiegel" => "Der Spiegel",
        "elpais" => "El País",
        "lemonde" => "Le Monde",
        "irishtimes" => "The Irish Times",
        "bloomberg" => "Bloomberg",
        "ft" => "Financial Times",
        "wsj" => "The Wall Street Journal",
        "cnbc" => "CNBC",
        "economist" => "The Economist",
        "marketwatch" => "MarketWatch",
        "forbes" => "Forbes",
        "insider" => "Business Insider",
        "techcrunch" => "TechCrunch",
        "verge" => "The Verge",
        "wired" => "Wired",
        "ars" => "Ars Technica",
        "engadget" => "Engadget",
        "register" => "The Register",
        "zdnet" => "ZDNET",
        "mittr" => "MIT Technology Review",
        "nature" => "Nature",
        "sciencedaily" => "ScienceDaily",
        "newscientist" => "New Scientist",
        "sciam" => "Scientific American",
        "physorg" => "Phys.org",
        "space" => "Space.com",
        "statnews" => "STAT News",
        "mnt" => "Medical News Today",
        "kff" => "KFF Health News",
        "espn" => "ESPN",
        "skysports" => "Sky Sports",
        "nine" => "Nine News",
        "variety" => "Variety",
        "thr" => "The Hollywood Reporter",
        "billboard" => "Billboard",
        "rollingstone" => "Rolling Stone",
        "deadline" => "Deadline",
        _ => "Unknown Source",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn feed_urls_are_unique() {
        let urls: HashSet<&str> = FEEDS.iter().map(|f| f.url).collect();
        assert_eq!(urls.len(), FEEDS.len());
    }

    #[test]
    fn every_category_has_feeds() {
        for category in Category::ALL {
            assert!(
                FEEDS.iter().any(|f| f.category == category),
                "no feeds configured for {category}"
            );
        }
    }

    #[test]
    fn every_source_has_a_display_name() {
        for feed in FEEDS {
            assert_ne!(
                display_name(feed.source),
                "Unknown Source",
                "missing display name for {}",
                feed.source
            );
        }
    }

    #[test]
    fn tiers_are_in_range() {
        assert!(FEEDS.iter().all(|f| (1..=3).contains(&f.source_tier)));
    }
}
