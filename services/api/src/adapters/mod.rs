pub mod db;
pub mod lesson_llm;
pub mod local_store;
pub mod sst;
pub mod tts;

pub use db::DbAdapter;
pub use lesson_llm::OpenAiLessonAdapter;
pub use local_store::{LocalStoreAdapter, LOCAL_LEARNER_ID};
pub use sst::OpenAiSttAdapter;
pub use tts::OpenAiTtsAdapter;
