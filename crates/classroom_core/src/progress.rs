//! Streak, XP and level transitions applied when a lesson is completed.

use chrono::{Days, NaiveDate};

use crate::domain::{LessonResult, UserStats, XP_PER_LEVEL};

/// Largest XP, streak or answer count a learner's progress may hold.
pub const MAX_PROGRESS_VALUE: u32 = i32::MAX as u32;

/// Reasons client-supplied progress is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    #[error("XP cannot go down (stored {stored}, posted {posted})")]
    XpDecreased { stored: u32, posted: u32 },
    #[error("{field} of {value} is out of range")]
    OutOfRange { field: &'static str, value: u32 },
    #[error("Score must be between 0 and 100, got {0}")]
    InvalidScore(u32),
    #[error("{correct} correct answers out of {total} quizzes")]
    TooManyCorrect { correct: u32, total: u32 },
}

fn in_range(field: &'static str, value: u32) -> Result<u32, ProgressError> {
    if value > MAX_PROGRESS_VALUE {
        return Err(ProgressError::OutOfRange { field, value });
    }
    Ok(value)
}

/// Level derived from total XP: one level per 100 XP, starting at 1.
pub fn level_for(xp: u32) -> u32 {
    xp / XP_PER_LEVEL + 1
}

/// Next streak value for a lesson completed on `today`.
///
/// Consecutive days extend the streak, a second lesson on the same day keeps it,
/// and any gap starts over at 1.
pub fn next_streak(streak: u32, last_lesson_date: Option<NaiveDate>, today: NaiveDate) -> u32 {
    let yesterday = today.checked_sub_days(Days::new(1));
    match last_lesson_date {
        Some(last) if Some(last) == yesterday => streak.saturating_add(1).min(MAX_PROGRESS_VALUE),
        Some(last) if last == today => streak,
        _ => 1,
    }
}

/// The session-end reducer: folds a finished lesson into the learner's stats.
pub fn apply_lesson_result(stats: &UserStats, result: &LessonResult, today: NaiveDate) -> UserStats {
    let xp = stats.xp.saturating_add(result.xp_earned).min(MAX_PROGRESS_VALUE);
    UserStats {
        xp,
        level: level_for(xp),
        streak: next_streak(stats.streak, stats.last_lesson_date, today),
        last_lesson_date: Some(today),
    }
}

/// Merges stats posted by a client into the stored ones. XP may only grow and
/// the level is always derived from it.
pub fn reconcile_stats(stored: &UserStats, posted: &UserStats) -> Result<UserStats, ProgressError> {
    let xp = in_range("xp", posted.xp)?;
    if xp < stored.xp {
        return Err(ProgressError::XpDecreased {
            stored: stored.xp,
            posted: xp,
        });
    }
    Ok(UserStats {
        xp,
        level: level_for(xp),
        streak: in_range("streak", posted.streak)?,
        last_lesson_date: posted.last_lesson_date,
    })
}

/// Checks a client-posted lesson result before it is stored.
pub fn check_result(result: &LessonResult) -> Result<(), ProgressError> {
    if result.score > 100 {
        return Err(ProgressError::InvalidScore(result.score));
    }
    in_range("xpEarned", result.xp_earned)?;
    let total = in_range("totalQuizzes", result.total_quizzes)?;
    let correct = in_range("correctAnswers", result.correct_answers)?;
    if correct > total {
        return Err(ProgressError::TooManyCorrect { correct, total });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LessonPlan;
    use chrono::Utc;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn result_with_xp(xp: u32) -> LessonResult {
        let plan = LessonPlan {
            subject: "History".to_string(),
            grade: "6th Grade".to_string(),
            topic: "Rome".to_string(),
            learning_objectives: vec![],
            steps: vec![],
        };
        LessonResult {
            xp_earned: xp,
            ..LessonResult::from_plan(&plan, &[], Utc::now())
        }
    }

    #[test]
    fn yesterday_extends_streak() {
        assert_eq!(next_streak(4, Some(date(2024, 3, 9)), date(2024, 3, 10)), 5);
    }

    #[test]
    fn same_day_keeps_streak() {
        assert_eq!(next_streak(4, Some(date(2024, 3, 10)), date(2024, 3, 10)), 4);
    }

    #[test]
    fn gap_or_first_lesson_resets_to_one() {
        assert_eq!(next_streak(4, Some(date(2024, 3, 1)), date(2024, 3, 10)), 1);
        assert_eq!(next_streak(0, None, date(2024, 3, 10)), 1);
    }

    #[test]
    fn streak_crosses_month_boundary() {
        assert_eq!(next_streak(2, Some(date(2024, 2, 29)), date(2024, 3, 1)), 3);
    }

    #[test]
    fn reducer_levels_up_and_stamps_today() {
        let stats = UserStats {
            xp: 90,
            level: 1,
            streak: 1,
            last_lesson_date: Some(date(2024, 3, 9)),
        };
        let next = apply_lesson_result(&stats, &result_with_xp(30), date(2024, 3, 10));
        assert_eq!(next.xp, 120);
        assert_eq!(next.level, 2);
        assert_eq!(next.streak, 2);
        assert_eq!(next.last_lesson_date, Some(date(2024, 3, 10)));
    }

    #[test]
    fn posted_stats_get_a_derived_level() {
        let stored = UserStats::default();
        let posted = UserStats {
            xp: 250,
            level: 9,
            streak: 2,
            last_lesson_date: Some(date(2024, 3, 10)),
        };
        let merged = reconcile_stats(&stored, &posted).unwrap();
        assert_eq!(merged.level, 3);
        assert_eq!(merged.streak, 2);
    }

    #[test]
    fn posted_stats_cannot_lower_or_overflow_xp() {
        let stored = UserStats {
            xp: 300,
            level: 4,
            ..UserStats::default()
        };
        let lower = UserStats {
            xp: 100,
            ..stored.clone()
        };
        assert_eq!(
            reconcile_stats(&stored, &lower),
            Err(ProgressError::XpDecreased {
                stored: 300,
                posted: 100
            })
        );
        let huge = UserStats {
            xp: u32::MAX,
            ..stored.clone()
        };
        assert!(matches!(
            reconcile_stats(&stored, &huge),
            Err(ProgressError::OutOfRange { field: "xp", .. })
        ));
    }

    #[test]
    fn results_need_a_percentage_score() {
        let mut result = result_with_xp(30);
        assert_eq!(check_result(&result), Ok(()));
        result.score = 150;
        assert_eq!(check_result(&result), Err(ProgressError::InvalidScore(150)));
    }

    #[test]
    fn reducer_caps_xp_at_the_storable_maximum() {
        let stats = UserStats {
            xp: MAX_PROGRESS_VALUE - 10,
            ..UserStats::default()
        };
        let next = apply_lesson_result(&stats, &result_with_xp(60), date(2024, 3, 10));
        assert_eq!(next.xp, MAX_PROGRESS_VALUE);
    }

    proptest! {
        #[test]
        fn level_is_floor_of_xp_over_100_plus_one(xp in 0u32..100_000) {
            prop_assert_eq!(level_for(xp), xp / 100 + 1);
        }

        #[test]
        fn streak_rule_holds_for_any_gap(streak in 0u32..1000, gap in 0u64..30) {
            let today = date(2025, 6, 15);
            let last = today.checked_sub_days(Days::new(gap)).unwrap();
            let next = next_streak(streak, Some(last), today);
            let expected = match gap {
                0 => streak,
                1 => streak + 1,
                _ => 1,
            };
            prop_assert_eq!(next, expected);
        }

        #[test]
        fn xp_never_decreases(xp in 0u32..10_000, earned in 0u32..200) {
            let stats = UserStats { xp, level: level_for(xp), ..UserStats::default() };
            let next = apply_lesson_result(&stats, &result_with_xp(earned), date(2025, 1, 1));
            prop_assert!(next.xp >= stats.xp);
        }
    }
}
