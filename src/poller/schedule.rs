/// フィード選択スケジューラ。
///
/// クールダウンを過ぎたフィードをカテゴリ横断のラウンドロビンで選び、
/// 1tickに同一カテゴリから複数のフィードを取らないことを保証します。
/// カテゴリの偏った連続投入が下流のフィード表示を波打たせるのを防ぐため
/// の方式です。
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::store::models::{Category, FeedPollState, PollOutcome};

use super::feeds::{FEEDS, FeedSpec};

/// この回数連続で失敗したフィードは隔離される。
const FAILURE_THRESHOLD: u32 = 3;

/// 隔離期間。
const QUARANTINE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default)]
struct FeedRuntime {
    last_polled_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    quarantined_until: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct FeedScheduler {
    cooldown: Duration,
    states: HashMap<&'static str, FeedRuntime>,
    category_cursor: usize,
    per_category_cursor: HashMap<Category, usize>,
}

impl FeedScheduler {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            states: HashMap::new(),
            category_cursor: 0,
            per_category_cursor: HashMap::new(),
        }
    }

    /// 永続化済みのポーリング状態から復元する。
    ///
    /// 再起動直後にすべてのフィードへ一斉にアクセスするのを防ぎます。
    pub fn hydrate(&mut self, persisted: &[FeedPollState]) {
        for state in persisted {
            let Some(spec) = FEEDS.iter().find(|f| f.url == state.feed_url) else {
                continue;
            };
            self.states.insert(
                spec.url,
                FeedRuntime {
                    last_polled_at: Some(state.last_polled_at),
                    consecutive_failures: state.consecutive_failures,
                    quarantined_until: state.quarantined_until,
                },
            );
        }
    }

    /// このtickでポーリングするフィードを最大 `count` 件選ぶ。
    ///
    /// カテゴリごとに高々1フィードで、カテゴリ順は前回tickの続きから
    /// 回転します。
    pub fn select(&mut self, now: DateTime<Utc>, count: usize) -> Vec<&'static FeedSpec> {
        let mut eligible: HashMap<Category, Vec<&'static FeedSpec>> = HashMap::new();
        for feed in FEEDS {
            if self.is_eligible(feed, now) {
                eligible.entry(feed.category).or_default().push(feed);
            }
        }

        let total_categories = Category::ALL.len();
        let mut picked = Vec::with_capacity(count);
        let mut inspected = 0;

        while picked.len() < count && inspected < total_categories {
            let category = Category::ALL[self.category_cursor % total_categories];
            self.category_cursor = (self.category_cursor + 1) % total_categories;
            inspected += 1;

            let Some(feeds) = eligible.get(&category) else {
                continue;
            };
            if feeds.is_empty() {
                continue;
            }

            let cursor = self.per_category_cursor.entry(category).or_insert(0);
            let feed = feeds[*cursor % feeds.len()];
            *cursor = cursor.wrapping_add(1);
            picked.push(feed);
        }

        picked
    }

    /// ポーリング成功を記録する。失敗カウンタはリセットされる。
    pub fn record_success(&mut self, url: &'static str, now: DateTime<Utc>) {
        let state = self.states.entry(url).or_default();
        state.last_polled_at = Some(now);
        state.consecutive_failures = 0;
        state.quarantined_until = None;
    }

    /// ポーリング失敗を記録する。
    ///
    /// 閾値に達した場合は隔離し、`true` を返す。
    pub fn record_failure(&mut self, url: &'static str, now: DateTime<Utc>) -> bool {
        let state = self.states.entry(url).or_default();
        state.last_polled_at = Some(now);
        state.consecutive_failures += 1;

        if state.consecutive_failures >= FAILURE_THRESHOLD {
            state.quarantined_until =
                Some(now + chrono::Duration::from_std(QUARANTINE).unwrap_or_default());
            state.consecutive_failures = 0;
            return true;
        }
        false
    }

    /// 現在隔離中のフィード数。
    #[must_use]
    pub fn quarantined_count(&self, now: DateTime<Utc>) -> usize {
        self.states
            .values()
            .filter(|s| s.quarantined_until.is_some_and(|until| until > now))
            .count()
    }

    /// 永続化用のポーリング状態スナップショットを作る。
    #[must_use]
    pub fn snapshot(&self, url: &'static str, outcome: PollOutcome) -> FeedPollState {
        let state = self.states.get(url).cloned().unwrap_or_default();
        FeedPollState {
            feed_url: url.to_string(),
            last_polled_at: state.last_polled_at.unwrap_or_else(Utc::now),
            last_outcome: outcome,
            consecutive_failures: state.consecutive_failures,
            quarantined_until: state.quarantined_until,
        }
    }

    fn is_eligible(&self, feed: &FeedSpec, now: DateTime<Utc>) -> bool {
        let Some(state) = self.states.get(feed.url) else {
            return true;
        };

        if state.quarantined_until.is_some_and(|until| until > now) {
            return false;
        }

        match state.last_polled_at {
            Some(last) => {
                now.signed_duration_since(last)
                    >= chrono::Duration::from_std(self.cooldown).unwrap_or_default()
            }
            None => true,
        }
    }
}
