//! Fakes and request helpers shared by the service's tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request};
use chrono::{DateTime, Utc};
use classroom_core::domain::{
    EngagementLevel, LessonPlan, LessonStep, LessonStepType, QuizOption,
};
use classroom_core::ports::{
    Account, AccountService, ChatReply, ChatRequest, Credentials, LessonContentService,
    PortError, PortResult, SpeechToTextService, TextToSpeechService,
};
use uuid::Uuid;

use crate::adapters::LocalStoreAdapter;
use crate::config::Config;
use crate::web::state::AppState;

pub(crate) fn sample_plan(topic: &str) -> LessonPlan {
    let step = |title: &str, step_type: LessonStepType| LessonStep {
        title: title.to_string(),
        step_type,
        content: format!("{title} about {topic}"),
        duration: 1,
        quiz_options: (step_type == LessonStepType::Quiz).then(|| {
            vec![
                QuizOption {
                    option: "Red and blue".to_string(),
                    is_correct: true,
                },
                QuizOption {
                    option: "Green and yellow".to_string(),
                    is_correct: false,
                },
            ]
        }),
    };
    LessonPlan {
        subject: "Art".to_string(),
        grade: "2nd Grade".to_string(),
        topic: topic.to_string(),
        learning_objectives: vec!["Mix secondary colours".to_string()],
        steps: vec![
            step("Welcome", LessonStepType::Lecture),
            step("Quick check", LessonStepType::Quiz),
            step("Paint", LessonStepType::Activity),
        ],
    }
}

//=========================================================================================
// AI Fakes
//=========================================================================================

/// A scripted content gateway. Anything not scripted fails.
#[derive(Default)]
pub(crate) struct FakeContent {
    pub chat: Mutex<Option<ChatReply>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub image: Option<String>,
    pub suggestion: Option<String>,
    pub rewrite: Option<String>,
}

#[async_trait]
impl LessonContentService for FakeContent {
    async fn generate_lesson_plan(
        &self,
        _subject: &str,
        _grade: &str,
        topic: &str,
    ) -> PortResult<LessonPlan> {
        if topic.is_empty() {
            return Err(PortError::InvalidContent("empty topic".to_string()));
        }
        Ok(sample_plan(topic))
    }

    async fn generate_image(&self, _prompt: &str) -> PortResult<String> {
        self.image
            .clone()
            .ok_or_else(|| PortError::Unavailable("no image scripted".to_string()))
    }

    async fn chat_reply(&self, request: ChatRequest) -> PortResult<ChatReply> {
        self.chat_requests.lock().unwrap().push(request);
        self.chat
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PortError::Unavailable("no reply scripted".to_string()))
    }

    async fn adaptive_suggestion(
        &self,
        _step_content: &str,
        _engagement: EngagementLevel,
    ) -> PortResult<String> {
        self.suggestion
            .clone()
            .ok_or_else(|| PortError::Unavailable("no suggestion scripted".to_string()))
    }

    async fn regenerate_step(
        &self,
        _step: &LessonStep,
        _engagement: EngagementLevel,
    ) -> PortResult<String> {
        self.rewrite
            .clone()
            .ok_or_else(|| PortError::Unavailable("no rewrite scripted".to_string()))
    }
}

/// Returns the text itself as "audio".
pub(crate) struct EchoTts;

#[async_trait]
impl TextToSpeechService for EchoTts {
    async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

pub(crate) struct FixedStt(pub Option<String>);

#[async_trait]
impl SpeechToTextService for FixedStt {
    async fn transcribe_audio(&self, _audio_data: &[u8]) -> PortResult<String> {
        self.0
            .clone()
            .ok_or_else(|| PortError::Unexpected("transcription failed".to_string()))
    }
}

//=========================================================================================
// Accounts Fake
//=========================================================================================

#[derive(Default)]
pub(crate) struct MemoryAccounts {
    users: Mutex<HashMap<String, Credentials>>,
    tokens: Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
}

impl MemoryAccounts {
    /// Drops every token, as if they had all expired.
    pub fn expire_all(&self) {
        self.tokens.lock().unwrap().clear();
    }
}

#[async_trait]
impl AccountService for MemoryAccounts {
    async fn register(&self, username: &str, password_hash: &str) -> PortResult<Account> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(username) {
            return Err(PortError::Conflict(format!("Username '{}' is taken", username)));
        }
        let credentials = Credentials {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        users.insert(username.to_string(), credentials.clone());
        Ok(Account {
            user_id: credentials.user_id,
            username: credentials.username,
        })
    }

    async fn find_credentials(&self, username: &str) -> PortResult<Credentials> {
        self.users
            .lock()
            .unwrap()
            .get(username)
            .cloned()
            .ok_or_else(|| PortError::NotFound(username.to_string()))
    }

    async fn create_auth_token(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_token(&self, token: &str) -> PortResult<Uuid> {
        match self.tokens.lock().unwrap().get(token) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_token(&self, token: &str) -> PortResult<()> {
        self.tokens.lock().unwrap().remove(token);
        Ok(())
    }
}

//=========================================================================================
// State Builders
//=========================================================================================

pub(crate) struct TestContext {
    pub state: Arc<AppState>,
    pub content: Arc<FakeContent>,
    pub store: Arc<LocalStoreAdapter>,
    pub accounts: Option<Arc<MemoryAccounts>>,
    pub store_path: PathBuf,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.store_path);
    }
}

pub(crate) fn test_config() -> Config {
    Config {
        quiz_review: Duration::from_secs(2),
        engagement_debounce: Duration::from_secs(2),
        simulation_interval: Duration::from_secs(2),
        ..Config::default()
    }
}

/// An offline server: the local JSON store and no accounts.
pub(crate) async fn offline_context(content: FakeContent) -> TestContext {
    build_context(content, None, FixedStt(Some("What is purple?".to_string()))).await
}

/// A server with accounts, backed by the in-memory fake.
pub(crate) async fn online_context(content: FakeContent) -> TestContext {
    build_context(
        content,
        Some(Arc::new(MemoryAccounts::default())),
        FixedStt(None),
    )
    .await
}

async fn build_context(
    content: FakeContent,
    accounts: Option<Arc<MemoryAccounts>>,
    stt: FixedStt,
) -> TestContext {
    let store_path =
        std::env::temp_dir().join(format!("classroom-test-{}.json", Uuid::new_v4()));
    let store = Arc::new(LocalStoreAdapter::load(&store_path).await.expect("local store"));
    let content = Arc::new(content);
    let state = Arc::new(AppState {
        config: Arc::new(test_config()),
        content: content.clone(),
        tts_adapter: Arc::new(EchoTts),
        stt_adapter: Arc::new(stt),
        progress: store.clone(),
        accounts: accounts
            .clone()
            .map(|a| a as Arc<dyn AccountService>),
    });
    TestContext {
        state,
        content,
        store,
        accounts,
        store_path,
    }
}

//=========================================================================================
// Request Helpers
//=========================================================================================

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

pub(crate) async fn read_text(response: axum::response::Response<Body>) -> String {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    String::from_utf8_lossy(&body).into_owned()
}
