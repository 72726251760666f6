/// ステータス状態機械と検証レベル。
use chrono::Duration;

use crate::store::models::StoryStatus;

/// 3ソース到達時にBREAKING扱いとする新規性の窓（分）。
pub const BREAKING_AGE_WINDOW_MINUTES: i64 = 30;

/// 進行中の既存イベントをBREAKINGに昇格させる活動間隔の上限（分）。
pub const BREAKING_IDLE_WINDOW_MINUTES: i64 = 30;

/// BREAKINGから静穏によりVERIFIEDへ降格するまでの時間（分）。
pub const BREAKING_QUIET_PERIOD_MINUTES: i64 = 90;

/// VERIFIEDからARCHIVEDへ移行する経過日数。
pub const ARCHIVE_AFTER_DAYS: i64 = 30;

/// ユニークソース数から検証レベルを導出する単調ステップ関数。
#[must_use]
pub fn verification_level(unique_sources: usize) -> u8 {
    match unique_sources {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 3,
        5..=9 => 4,
        _ => 5,
    }
}

/// 状態評価の入力。
///
/// `idle` は今回の更新前の `last_updated` からの経過時間です。
#[derive(Debug, Clone, Copy)]
pub struct StatusInput {
    pub unique_sources: usize,
    pub age: Duration,
    pub idle: Duration,
    pub is_gaining_sources: bool,
}

/// クラスタ更新時の次ステータスを決定する。
///
/// ARCHIVEDは終端。BREAKINGからの降格は更新イベントでは起こらず、
/// スイーパーの静穏判定のみが行います。
#[must_use]
pub fn evaluate_status(current: StoryStatus, input: &StatusInput) -> StoryStatus {
    match current {
        StoryStatus::Archived => StoryStatus::Archived,
        StoryStatus::Breaking if input.unique_sources >= 3 => StoryStatus::Breaking,
        _ => match input.unique_sources {
            0 | 1 => StoryStatus::Monitoring,
            2 => StoryStatus::Developing,
            _ => {
                if input.age < Duration::minutes(BREAKING_AGE_WINDOW_MINUTES) {
                    StoryStatus::Breaking
                } else if input.is_gaining_sources
                    && input.idle < Duration::minutes(BREAKING_IDLE_WINDOW_MINUTES)
                {
                    StoryStatus::Breaking
                } else {
                    StoryStatus::Verified
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn input(
        unique_sources: usize,
        age_minutes: i64,
        idle_minutes: i64,
        is_gaining_sources: bool,
    ) -> StatusInput {
        StatusInput {
            unique_sources,
            age: Duration::minutes(age_minutes),
            idle: Duration::minutes(idle_minutes),
            is_gaining_sources,
        }
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 3)]
    #[case(4, 3)]
    #[case(5, 4)]
    #[case(9, 4)]
    #[case(10, 5)]
    #[case(25, 5)]
    fn verification_level_steps(#[case] sources: usize, #[case] expected: u8) {
        assert_eq!(verification_level(sources), expected);
    }

    #[test]
    fn three_fresh_sources_are_breaking_not_verified() {
        // ちょうど3ソース・30分未満の若いクラスタはBREAKING
        let status = evaluate_status(StoryStatus::Developing, &input(3, 29, 1, true));
        assert_eq!(status, StoryStatus::Breaking);
    }

    #[test]
    fn three_sources_at_exactly_thirty_minutes_are_verified() {
        let status = evaluate_status(StoryStatus::Developing, &input(3, 30, 40, false));
        assert_eq!(status, StoryStatus::Verified);
    }

    #[test]
    fn old_story_gaining_sources_promotes_to_breaking() {
        // 古いイベントでも活発にソースが増えていれば昇格する
        let status = evaluate_status(StoryStatus::Verified, &input(4, 600, 10, true));
        assert_eq!(status, StoryStatus::Breaking);
    }

    #[test]
    fn old_story_with_stale_updates_stays_verified() {
        let status = evaluate_status(StoryStatus::Verified, &input(4, 600, 45, true));
        assert_eq!(status, StoryStatus::Verified);
    }

    #[test]
    fn two_sources_are_developing() {
        let status = evaluate_status(StoryStatus::Monitoring, &input(2, 5, 1, true));
        assert_eq!(status, StoryStatus::Developing);
    }

    #[test]
    fn single_source_stays_monitoring() {
        let status = evaluate_status(StoryStatus::Monitoring, &input(1, 5, 1, false));
        assert_eq!(status, StoryStatus::Monitoring);
    }

    #[test]
    fn breaking_is_not_demoted_by_evaluation() {
        // 降格はスイーパーだけが行う
        let status = evaluate_status(StoryStatus::Breaking, &input(3, 600, 80, false));
        assert_eq!(status, StoryStatus::Breaking);
    }

    #[test]
    fn archived_is_terminal() {
        let status = evaluate_status(StoryStatus::Archived, &input(10, 1, 1, true));
        assert_eq!(status, StoryStatus::Archived);
    }

    #[test]
    fn evaluation_is_a_fixpoint_on_unchanged_clusters() {
        // 変化のないクラスタを再評価しても現状維持になる
        for (current, sources, age, idle) in [
            (StoryStatus::Monitoring, 1, 10, 10),
            (StoryStatus::Developing, 2, 40, 20),
            (StoryStatus::Verified, 3, 120, 95),
            (StoryStatus::Breaking, 3, 10, 5),
        ] {
            let next = evaluate_status(current, &input(sources, age, idle, false));
            assert_eq!(next, current, "{current:?} drifted to {next:?}");
        }
    }
}
