/// トピック競合検出。
///
/// 字面上は似ていても別の出来事を指すタイトル同士（別の国家指導者、
/// 別の災害種、別の競技など)を高スコア一致から除外します。
use std::collections::HashSet;

use crate::util::text::tokenize;

/// 主題テーブル。各主題はタイトルトークンに対する別名の集合で認識します。
struct SubjectGroup {
    subjects: &'static [(&'static str, &'static [&'static str])],
}

const LEADERS: SubjectGroup = SubjectGroup {
    subjects: &[
        ("trump", &["trump"]),
        ("biden", &["biden"]),
        ("harris", &["harris"]),
        ("putin", &["putin"]),
        ("zelensky", &["zelensky", "zelenskyy"]),
        ("xi", &["jinping"]),
        ("macron", &["macron"]),
        ("scholz", &["scholz"]),
        ("merz", &["merz"]),
        ("modi", &["modi"]),
        ("netanyahu", &["netanyahu"]),
        ("starmer", &["starmer"]),
        ("albanese", &["albanese"]),
        ("trudeau", &["trudeau"]),
        ("carney", &["carney"]),
        ("erdogan", &["erdogan"]),
        ("lula", &["lula"]),
        ("milei", &["milei"]),
        ("meloni", &["meloni"]),
        ("orban", &["orban"]),
    ],
};

const DISASTERS: SubjectGroup = SubjectGroup {
    subjects: &[
        ("earthquake", &["earthquake", "quake", "aftershock"]),
        ("flood", &["flood", "floods", "flooding"]),
        ("wildfire", &["wildfire", "wildfires", "bushfire", "bushfires"]),
        ("hurricane", &["hurricane"]),
        ("typhoon", &["typhoon"]),
        ("cyclone", &["cyclone"]),
        ("tornado", &["tornado", "tornadoes"]),
        ("tsunami", &["tsunami"]),
        ("landslide", &["landslide", "mudslide"]),
        ("eruption", &["eruption", "volcano", "volcanic"]),
        ("drought", &["drought"]),
        ("blizzard", &["blizzard"]),
        ("heatwave", &["heatwave"]),
    ],
};

const SPORTS: SubjectGroup = SubjectGroup {
    subjects: &[
        ("football", &["nfl", "football"]),
        ("soccer", &["soccer"]),
        ("cricket", &["cricket"]),
        ("tennis", &["tennis", "wimbledon"]),
        ("golf", &["golf"]),
        ("rugby", &["rugby"]),
        ("baseball", &["baseball", "mlb"]),
        ("basketball", &["basketball", "nba"]),
        ("hockey", &["hockey", "nhl"]),
        ("olympics", &["olympic", "olympics"]),
        ("formula", &["f1", "formula"]),
    ],
};

const GROUPS: [&SubjectGroup; 3] = [&LEADERS, &DISASTERS, &SPORTS];

/// 2つのタイトルが別々の主題を扱っているかを判定する。
///
/// 同一グループ内で双方が主題を持ち、かつ共通の主題がない場合に
/// `true`（競合）を返します。
#[must_use]
pub fn topics_conflict(a: &str, b: &str) -> bool {
    let tokens_a = lowered_tokens(a);
    let tokens_b = lowered_tokens(b);

    for group in GROUPS {
        let subjects_a = matched_subjects(group, &tokens_a);
        let subjects_b = matched_subjects(group, &tokens_b);

        if subjects_a.is_empty() || subjects_b.is_empty() {
            continue;
        }
        if subjects_a.is_disjoint(&subjects_b) {
            return true;
        }
    }

    false
}

fn lowered_tokens(title: &str) -> HashSet<String> {
    tokenize(title)
        .into_iter()
        .map(|t| t.to_lowercase())
        .collect()
}

fn matched_subjects(group: &SubjectGroup, tokens: &HashSet<String>) -> HashSet<&'static str> {
    group
        .subjects
        .iter()
        .filter(|(_, aliases)| aliases.iter().any(|alias| tokens.contains(*alias)))
        .map(|(subject, _)| *subject)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn different_leaders_conflict() {
        assert!(topics_conflict(
            "Trump Announces New Tariff Package",
            "Putin Announces New Military Package"
        ));
    }

    #[test]
    fn same_leader_does_not_conflict() {
        assert!(!topics_conflict(
            "Trump Announces New Tariff Package",
            "Trump Defends Tariff Package in Speech"
        ));
    }

    #[test]
    fn different_disasters_conflict() {
        assert!(topics_conflict(
            "Deadly Earthquake Strikes Coastal Region",
            "Deadly Flood Strikes Coastal Region"
        ));
    }

    #[test]
    fn quake_alias_matches_earthquake() {
        assert!(!topics_conflict(
            "Major Quake Hits Turkey",
            "Turkey Earthquake Toll Rises"
        ));
    }

    #[test]
    fn different_sports_conflict() {
        assert!(topics_conflict(
            "Tennis Final Delayed by Rain",
            "Cricket Final Delayed by Rain"
        ));
    }

    #[test]
    fn unrecognised_subjects_never_conflict() {
        assert!(!topics_conflict(
            "Parliament Debates Budget Bill",
            "Senate Debates Budget Bill"
        ));
    }

    #[test]
    fn one_sided_subject_does_not_conflict() {
        assert!(!topics_conflict(
            "Trump Signs Executive Order",
            "Markets Rally on Trade Hopes"
        ));
    }

    #[test]
    fn shared_subject_across_titles_with_extras() {
        // 片方が複数主題を含んでも、共通主題があれば競合としない
        assert!(!topics_conflict(
            "Trump and Putin Meet in Helsinki",
            "Putin Arrives for Summit Talks"
        ));
    }
}
