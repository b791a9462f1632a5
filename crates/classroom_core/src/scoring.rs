//! Quiz scoring and XP rewards for a finished lesson.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{LessonPlan, LessonResult};

const BASE_XP: u32 = 10;
const XP_PER_CORRECT: u32 = 10;
const PERFECT_BONUS_XP: u32 = 20;

/// Percentage of correct answers, rounded. A lesson without quizzes scores 100.
pub fn score(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 100;
    }
    (100.0 * f64::from(correct) / f64::from(total)).round() as u32
}

pub fn xp_earned(correct: u32, score: u32) -> u32 {
    let bonus = if score == 100 { PERFECT_BONUS_XP } else { 0 };
    BASE_XP + XP_PER_CORRECT * correct + bonus
}

impl LessonResult {
    /// Builds the immutable result of a session from the plan and the recorded answers.
    pub fn from_plan(plan: &LessonPlan, answers: &[bool], completed_at: DateTime<Utc>) -> Self {
        let total_quizzes = plan.quiz_count() as u32;
        let correct_answers = answers.iter().filter(|a| **a).count() as u32;
        let score = score(correct_answers, total_quizzes);

        Self {
            id: Uuid::new_v4(),
            topic: plan.topic.clone(),
            subject: plan.subject.clone(),
            grade: plan.grade.clone(),
            score,
            correct_answers,
            total_quizzes,
            completed_at,
            lesson_plan: plan.clone(),
            xp_earned: xp_earned(correct_answers, score),
        }
    }
}
