//! services/api/src/adapters/lesson_llm.rs
//!
//! The AI content gateway: lesson plans, tutor chat with whiteboard tools,
//! adaptive suggestions, step rewrites and illustrations, all through OpenAI.
//! It implements the `LessonContentService` port from the `core` crate.

const LESSON_PLAN_PROMPT: &str = r#"Generate a detailed, engaging, and structured lesson plan for a class of {grade} students on the topic of "{topic}" in the subject of {subject}. The lesson should be broken down into clear steps, including a mix of lectures, visual aids (describe what image to generate), interactive quizzes (with 4 options, exactly one of them correct), and simple activities. The total lesson duration should be around 30-45 minutes."#;

const TUTOR_INSTRUCTIONS: &str = r#"You are a friendly, interactive AI teacher. You are conducting a lesson for a student and have a shared smart whiteboard.
- The current lesson context is: "{context}".
- The student may ask questions about the lesson, their chat uploads, or the contents of the whiteboard.
- The whiteboard's contents are provided as both a JSON object list and a screenshot. Use this context to answer questions.
- You have tools to modify the whiteboard. You can use these tools to add text, shapes, generate and add images, or clear the canvas to better explain concepts. Use your tools when it would be helpful to illustrate your point visually.
- Be supportive, concise, and helpful."#;

const SUGGESTION_PROMPT: &str = r#"As an AI teacher, you've noticed a student's engagement level is {engagement}.
The current topic is: "{content}".

Suggest a brief, alternative way to engage the student. This could be a fun fact, a quick question, or a different way to explain the concept to recapture their interest. Your response should be directly addressed to the student."#;

const REGENERATE_PROMPT: &str = r#"You are an AI teacher. A student's engagement is currently {engagement} during the lesson step "{title}".
The current content is: "{content}".

Your task is to rewrite or restructure this content to make it more engaging.
- If it's a lecture, try using a simple analogy, a story, or a direct question-and-answer format.
- If it's an activity, simplify the instructions or make them more exciting.
- Keep the core learning objective the same.
- The output should ONLY be the new content, ready to be displayed on the whiteboard."#;

const IMAGE_PROMPT_PREFIX: &str = "A vibrant and clear educational illustration for a classroom whiteboard. Style: simple, clean lines, colorful, easy for children to understand. Subject: ";

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, CreateImageRequestArgs, FunctionObjectArgs, Image,
        ImageDetail, ImageModel, ImageResponseFormat, ImageSize, ImageUrlArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use classroom_core::domain::{EngagementLevel, LessonPlan, LessonStep};
use classroom_core::ports::{
    ChatReply, ChatRequest, LessonContentService, PortError, PortResult,
};
use classroom_core::whiteboard::ToolCall;
use serde_json::json;
use tracing::{info, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Implements `LessonContentService` using OpenAI chat completions and image generation.
#[derive(Clone)]
pub struct OpenAiLessonAdapter {
    client: Client<OpenAIConfig>,
    lesson_model: String,
    tutor_model: String,
    image_model: String,
}

impl OpenAiLessonAdapter {
    pub fn new(
        client: Client<OpenAIConfig>,
        lesson_model: String,
        tutor_model: String,
        image_model: String,
    ) -> Self {
        Self {
            client,
            lesson_model,
            tutor_model,
            image_model,
        }
    }

    /// Runs a single-prompt completion and returns its text.
    async fn complete(&self, model: &str, prompt: String) -> PortResult<String> {
        let message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(port_error)?
            .into();
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![message])
            .build()
            .map_err(port_error)?;

        let response = self.client.chat().create(request).await.map_err(port_error)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| PortError::InvalidContent("The model returned no text".to_string()))
    }

    fn image_model(&self) -> ImageModel {
        match self.image_model.as_str() {
            "dall-e-3" => ImageModel::DallE3,
            "dall-e-2" => ImageModel::DallE2,
            other => ImageModel::Other(other.to_string()),
        }
    }
}

fn port_error(e: OpenAIError) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// Schemas and Tool Declarations
//=========================================================================================

fn lesson_plan_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "subject": { "type": "string" },
            "grade": { "type": "string" },
            "topic": { "type": "string" },
            "learningObjectives": { "type": "array", "items": { "type": "string" } },
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "type": { "type": "string", "enum": ["lecture", "image", "quiz", "activity"] },
                        "content": {
                            "type": "string",
                            "description": "For LECTURE, this is the text. For IMAGE, a detailed prompt. For QUIZ, the question. For ACTIVITY, instructions."
                        },
                        "duration": { "type": "integer", "description": "Estimated duration in minutes." },
                        "quizOptions": {
                            "type": "array",
                            "description": "Only include for 'quiz' type steps. Provide 4 options.",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "option": { "type": "string" },
                                    "isCorrect": { "type": "boolean" }
                                },
                                "required": ["option", "isCorrect"]
                            }
                        }
                    },
                    "required": ["title", "type", "content", "duration"]
                }
            }
        },
        "required": ["subject", "grade", "topic", "learningObjectives", "steps"]
    })
}

fn whiteboard_tools() -> Result<Vec<ChatCompletionTool>, OpenAIError> {
    let declarations = [
        (
            "addText",
            "Adds a text box to the smart whiteboard.",
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "The content of the text box." },
                    "options": { "type": "object", "description": "Optional styling like { left: 100, top: 100, color: \"#ff0000\", fontSize: 24 }" }
                },
                "required": ["text"]
            }),
        ),
        (
            "addShape",
            "Adds a shape (rectangle or circle) to the smart whiteboard.",
            json!({
                "type": "object",
                "properties": {
                    "shapeType": { "type": "string", "enum": ["rect", "circle"], "description": "The type of shape to add." },
                    "options": { "type": "object", "description": "Optional styling like { left: 100, top: 100, fill: \"transparent\", stroke: \"#000\" }" }
                },
                "required": ["shapeType"]
            }),
        ),
        (
            "addImage",
            "Generates an image from a text prompt and adds it to the whiteboard.",
            json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "A detailed description of the image to generate." },
                    "options": { "type": "object", "description": "Optional positioning like { left: 100, top: 100 }" }
                },
                "required": ["prompt"]
            }),
        ),
        (
            "clearCanvas",
            "Clears all content from the smart whiteboard.",
            json!({ "type": "object", "properties": {} }),
        ),
    ];

    declarations
        .into_iter()
        .map(|(name, description, parameters)| {
            ChatCompletionToolArgs::default()
                .r#type(ChatCompletionToolType::Function)
                .function(
                    FunctionObjectArgs::default()
                        .name(name)
                        .description(description)
                        .parameters(parameters)
                        .build()?,
                )
                .build()
        })
        .collect()
}

fn text_part(text: impl Into<String>) -> Result<ChatCompletionRequestUserMessageContentPart, OpenAIError> {
    Ok(ChatCompletionRequestUserMessageContentPart::Text(
        ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(text)
            .build()?,
    ))
}

fn image_part(data_url: String) -> Result<ChatCompletionRequestUserMessageContentPart, OpenAIError> {
    Ok(ChatCompletionRequestUserMessageContentPart::ImageUrl(
        ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(data_url)
                    .detail(ImageDetail::Auto)
                    .build()?,
            )
            .build()?,
    ))
}

/// Builds the multimodal user turn: question, optional upload, and the whiteboard.
fn chat_parts(
    request: &ChatRequest,
) -> Result<Vec<ChatCompletionRequestUserMessageContentPart>, OpenAIError> {
    let mut parts = Vec::new();

    if !request.message.is_empty() {
        parts.push(text_part(format!("Student's question: \"{}\"", request.message))?);
    }

    if let Some(image) = &request.image {
        parts.push(text_part("The student has also uploaded this image in the chat:")?);
        parts.push(image_part(image.data_url())?);
    }

    match &request.whiteboard {
        Some(board) if !board.is_empty() && board.image.is_some() => {
            let objects = serde_json::to_string(&board.objects).unwrap_or_else(|_| "[]".to_string());
            parts.push(text_part(
                "Here is the current state of the shared whiteboard. Use this context for your answer.",
            )?);
            parts.push(text_part(format!("Whiteboard objects (JSON): {}", objects))?);
            if let Some(screenshot) = &board.image {
                parts.push(image_part(format!("data:image/png;base64,{}", screenshot))?);
            }
        }
        _ => parts.push(text_part("The shared whiteboard is currently empty.")?),
    }

    Ok(parts)
}

//=========================================================================================
// `LessonContentService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LessonContentService for OpenAiLessonAdapter {
    async fn generate_lesson_plan(
        &self,
        subject: &str,
        grade: &str,
        topic: &str,
    ) -> PortResult<LessonPlan> {
        info!(subject, grade, topic, "Generating lesson plan");
        let prompt = LESSON_PLAN_PROMPT
            .replace("{grade}", grade)
            .replace("{topic}", topic)
            .replace("{subject}", subject);

        let message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(port_error)?
            .into();
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.lesson_model)
            .messages(vec![message])
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: Some("A structured lesson plan".to_string()),
                    name: "lesson_plan".to_string(),
                    schema: Some(lesson_plan_schema()),
                    strict: None,
                },
            })
            .build()
            .map_err(port_error)?;

        let response = self.client.chat().create(request).await.map_err(port_error)?;
        let json_text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::InvalidContent("Empty lesson plan response".to_string()))?;

        let plan: LessonPlan = serde_json::from_str(json_text.trim())
            .map_err(|e| PortError::InvalidContent(format!("Lesson plan JSON: {}", e)))?;
        plan.validate()
            .map_err(|e| PortError::InvalidContent(e.to_string()))?;

        info!(steps = plan.steps.len(), "Lesson plan generated");
        Ok(plan)
    }

    async fn generate_image(&self, prompt: &str) -> PortResult<String> {
        let request = CreateImageRequestArgs::default()
            .prompt(format!("{}{}", IMAGE_PROMPT_PREFIX, prompt))
            .model(self.image_model())
            .n(1)
            .size(ImageSize::S1792x1024)
            .response_format(ImageResponseFormat::B64Json)
            .build()
            .map_err(port_error)?;

        let response = self.client.images().create(request).await.map_err(port_error)?;
        let image = response
            .data
            .first()
            .ok_or_else(|| PortError::InvalidContent("No image was generated".to_string()))?;

        Ok(match image.as_ref() {
            Image::B64Json { b64_json, .. } => format!("data:image/png;base64,{}", b64_json),
            Image::Url { url, .. } => url.clone(),
        })
    }

    async fn chat_reply(&self, request: ChatRequest) -> PortResult<ChatReply> {
        let system: ChatCompletionRequestMessage = ChatCompletionRequestSystemMessageArgs::default()
            .content(TUTOR_INSTRUCTIONS.replace("{context}", &request.lesson_context))
            .build()
            .map_err(port_error)?
            .into();
        let user: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(chat_parts(&request).map_err(port_error)?)
            .build()
            .map_err(port_error)?
            .into();

        let completion = CreateChatCompletionRequestArgs::default()
            .model(&self.tutor_model)
            .messages(vec![system, user])
            .tools(whiteboard_tools().map_err(port_error)?)
            .build()
            .map_err(port_error)?;

        let response = self.client.chat().create(completion).await.map_err(port_error)?;
        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| PortError::InvalidContent("Empty chat response".to_string()))?;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|call| {
                match ToolCall::from_function(&call.function.name, &call.function.arguments) {
                    Ok(tool_call) => Some(tool_call),
                    Err(e) => {
                        warn!("Skipping whiteboard tool call: {}", e);
                        None
                    }
                }
            })
            .collect();

        Ok(ChatReply {
            text: message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    async fn adaptive_suggestion(
        &self,
        step_content: &str,
        engagement: EngagementLevel,
    ) -> PortResult<String> {
        let prompt = SUGGESTION_PROMPT
            .replace("{engagement}", &engagement.to_string())
            .replace("{content}", step_content);
        self.complete(&self.tutor_model, prompt).await
    }

    async fn regenerate_step(
        &self,
        step: &LessonStep,
        engagement: EngagementLevel,
    ) -> PortResult<String> {
        let prompt = REGENERATE_PROMPT
            .replace("{engagement}", &engagement.to_string())
            .replace("{title}", &step.title)
            .replace("{content}", &step.content);
        self.complete(&self.tutor_model, prompt).await
    }
}
