//! services/api/src/adapters/db.rs
//!
//! The Postgres adapter behind accounts, auth tokens, stats, lesson history and
//! preferences. It implements the `ProgressStore` and `AccountService` ports from
//! the `core` crate using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use classroom_core::domain::{LessonPlan, LessonResult, Preferences, Theme, UserStats};
use classroom_core::ports::{
    Account, AccountService, Credentials, PortError, PortResult, ProgressStore,
};
use classroom_core::progress::apply_lesson_result;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn db_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("Row not found".to_string()),
        other => PortError::Unexpected(other.to_string()),
    }
}

fn upsert_stats(learner_id: Uuid, stats: &UserStats) -> Query<'static, Postgres, PgArguments> {
    sqlx::query(
        "INSERT INTO user_stats (user_id, xp, level, streak, last_lesson_date) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (user_id) DO UPDATE SET xp = EXCLUDED.xp, level = EXCLUDED.level, \
         streak = EXCLUDED.streak, last_lesson_date = EXCLUDED.last_lesson_date",
    )
    .bind(learner_id)
    .bind(db_int(stats.xp))
    .bind(db_int(stats.level))
    .bind(db_int(stats.streak))
    .bind(stats.last_lesson_date)
}

fn insert_history(learner_id: Uuid, result: &LessonResult) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        "INSERT INTO lesson_history (id, user_id, topic, subject, grade, score, \
         correct_answers, total_quizzes, completed_at, lesson_plan, xp_earned) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(result.id)
    .bind(learner_id)
    .bind(&result.topic)
    .bind(&result.subject)
    .bind(&result.grade)
    .bind(db_int(result.score))
    .bind(db_int(result.correct_answers))
    .bind(db_int(result.total_quizzes))
    .bind(result.completed_at)
    .bind(Json(&result.lesson_plan))
    .bind(db_int(result.xp_earned))
}

/// Progress counters are stored as INTEGER columns.
fn db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct AccountRecord {
    user_id: Uuid,
    username: String,
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    username: String,
    password_hash: String,
}

#[derive(FromRow)]
struct StatsRecord {
    xp: i32,
    level: i32,
    streak: i32,
    last_lesson_date: Option<NaiveDate>,
}
impl StatsRecord {
    fn to_domain(self) -> UserStats {
        UserStats {
            xp: self.xp.max(0) as u32,
            level: self.level.max(1) as u32,
            streak: self.streak.max(0) as u32,
            last_lesson_date: self.last_lesson_date,
        }
    }
}

#[derive(FromRow)]
struct HistoryRecord {
    id: Uuid,
    topic: String,
    subject: String,
    grade: String,
    score: i32,
    correct_answers: i32,
    total_quizzes: i32,
    completed_at: DateTime<Utc>,
    lesson_plan: Json<LessonPlan>,
    xp_earned: i32,
}
impl HistoryRecord {
    fn to_domain(self) -> LessonResult {
        LessonResult {
            id: self.id,
            topic: self.topic,
            subject: self.subject,
            grade: self.grade,
            score: self.score.max(0) as u32,
            correct_answers: self.correct_answers.max(0) as u32,
            total_quizzes: self.total_quizzes.max(0) as u32,
            completed_at: self.completed_at,
            lesson_plan: self.lesson_plan.0,
            xp_earned: self.xp_earned.max(0) as u32,
        }
    }
}

#[derive(FromRow)]
struct PreferencesRecord {
    theme: String,
}
impl PreferencesRecord {
    fn to_domain(self) -> Preferences {
        let theme = match self.theme.as_str() {
            "dark" => Theme::Dark,
            _ => Theme::Light,
        };
        Preferences { theme }
    }
}

fn theme_name(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "light",
        Theme::Dark => "dark",
    }
}

//=========================================================================================
// `AccountService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountService for DbAdapter {
    async fn register(&self, username: &str, password_hash: &str) -> PortResult<Account> {
        let record = sqlx::query_as::<_, AccountRecord>(
            "INSERT INTO accounts (user_id, username, password_hash) VALUES ($1, $2, $3) \
             RETURNING user_id, username",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("Username '{}' is taken", username))
            }
            other => db_error(other),
        })?;

        Ok(Account {
            user_id: record.user_id,
            username: record.username,
        })
    }

    async fn find_credentials(&self, username: &str) -> PortResult<Credentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, username, password_hash FROM accounts WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| PortError::NotFound(format!("Account '{}' not found", username)))?;

        Ok(Credentials {
            user_id: record.user_id,
            username: record.username,
            password_hash: record.password_hash,
        })
    }

    async fn create_auth_token(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn validate_auth_token(&self, token: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_tokens WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_token(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

//=========================================================================================
// `ProgressStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgressStore for DbAdapter {
    async fn get_stats(&self, learner_id: Uuid) -> PortResult<UserStats> {
        let record = sqlx::query_as::<_, StatsRecord>(
            "SELECT xp, level, streak, last_lesson_date FROM user_stats WHERE user_id = $1",
        )
        .bind(learner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(record.map(StatsRecord::to_domain).unwrap_or_default())
    }

    async fn update_stats(&self, learner_id: Uuid, stats: &UserStats) -> PortResult<()> {
        upsert_stats(learner_id, stats)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn get_history(&self, learner_id: Uuid) -> PortResult<Vec<LessonResult>> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            "SELECT id, topic, subject, grade, score, correct_answers, total_quizzes, \
             completed_at, lesson_plan, xp_earned \
             FROM lesson_history WHERE user_id = $1 ORDER BY completed_at DESC",
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(records.into_iter().map(HistoryRecord::to_domain).collect())
    }

    async fn append_history(&self, learner_id: Uuid, result: &LessonResult) -> PortResult<()> {
        insert_history(learner_id, result)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn record_lesson(
        &self,
        learner_id: Uuid,
        result: &LessonResult,
        today: NaiveDate,
    ) -> PortResult<UserStats> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        insert_history(learner_id, result)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        let stats = sqlx::query_as::<_, StatsRecord>(
            "SELECT xp, level, streak, last_lesson_date FROM user_stats \
             WHERE user_id = $1 FOR UPDATE",
        )
        .bind(learner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .map(StatsRecord::to_domain)
        .unwrap_or_default();
        let updated = apply_lesson_result(&stats, result, today);
        upsert_stats(learner_id, &updated)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(updated)
    }

    async fn clear_history(&self, learner_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM lesson_history WHERE user_id = $1")
            .bind(learner_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn get_preferences(&self, learner_id: Uuid) -> PortResult<Preferences> {
        let record = sqlx::query_as::<_, PreferencesRecord>(
            "SELECT theme FROM preferences WHERE user_id = $1",
        )
        .bind(learner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(record.map(PreferencesRecord::to_domain).unwrap_or_default())
    }

    async fn update_preferences(
        &self,
        learner_id: Uuid,
        preferences: &Preferences,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO preferences (user_id, theme) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET theme = EXCLUDED.theme",
        )
        .bind(learner_id)
        .bind(theme_name(preferences.theme))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}
