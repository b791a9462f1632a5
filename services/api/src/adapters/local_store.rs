//! services/api/src/adapters/local_store.rs
//!
//! Offline persistence: one local learner's stats, lesson history and theme kept
//! in a JSON file. The file is read once by `load` and rewritten after every
//! mutation; all access goes through a single async mutex.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use classroom_core::domain::{LessonResult, Preferences, UserStats};
use classroom_core::ports::{PortError, PortResult, ProgressStore};
use classroom_core::progress::apply_lesson_result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// The learner id used for the single offline profile.
pub const LOCAL_LEARNER_ID: Uuid = Uuid::nil();

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalData {
    #[serde(default)]
    stats: UserStats,
    /// Newest first.
    #[serde(default)]
    history: Vec<LessonResult>,
    #[serde(default)]
    preferences: Preferences,
}

pub struct LocalStoreAdapter {
    path: PathBuf,
    data: Mutex<LocalData>,
}

impl LocalStoreAdapter {
    /// Reads the store from `path`. A missing file starts an empty profile; an
    /// unreadable one is set aside and replaced.
    pub async fn load(path: impl AsRef<Path>) -> PortResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<LocalData>(&bytes) {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), "Local store is corrupt, starting fresh: {}", e);
                    let backup = path.with_extension("json.bak");
                    if let Err(e) = tokio::fs::rename(&path, &backup).await {
                        warn!("Failed to set aside corrupt local store: {}", e);
                    }
                    LocalData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LocalData::default(),
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };
        info!(path = %path.display(), lessons = data.history.len(), "Local store loaded");

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Writes the whole store through a temporary file and a rename.
    async fn save(&self, data: &LocalData) -> PortResult<()> {
        let json = serde_json::to_vec_pretty(data)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    /// Applies `change` and persists the result.
    async fn mutate(&self, change: impl FnOnce(&mut LocalData)) -> PortResult<()> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        change(&mut next);
        self.save(&next).await?;
        *data = next;
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for LocalStoreAdapter {
    async fn get_stats(&self, _learner_id: Uuid) -> PortResult<UserStats> {
        Ok(self.data.lock().await.stats.clone())
    }

    async fn update_stats(&self, _learner_id: Uuid, stats: &UserStats) -> PortResult<()> {
        self.mutate(|data| data.stats = stats.clone()).await
    }

    async fn get_history(&self, _learner_id: Uuid) -> PortResult<Vec<LessonResult>> {
        Ok(self.data.lock().await.history.clone())
    }

    async fn append_history(&self, _learner_id: Uuid, result: &LessonResult) -> PortResult<()> {
        self.mutate(|data| data.history.insert(0, result.clone())).await
    }

    async fn clear_history(&self, _learner_id: Uuid) -> PortResult<()> {
        self.mutate(|data| data.history.clear()).await
    }

    async fn record_lesson(
        &self,
        _learner_id: Uuid,
        result: &LessonResult,
        today: NaiveDate,
    ) -> PortResult<UserStats> {
        let mut stats = UserStats::default();
        self.mutate(|data| {
            data.history.insert(0, result.clone());
            data.stats = apply_lesson_result(&data.stats, result, today);
            stats = data.stats.clone();
        })
        .await?;
        Ok(stats)
    }

    async fn get_preferences(&self, _learner_id: Uuid) -> PortResult<Preferences> {
        Ok(self.data.lock().await.preferences)
    }

    async fn update_preferences(
        &self,
        _learner_id: Uuid,
        preferences: &Preferences,
    ) -> PortResult<()> {
        let preferences = *preferences;
        self.mutate(|data| data.preferences = preferences).await
    }
}
