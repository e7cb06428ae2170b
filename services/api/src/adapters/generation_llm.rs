//! services/api/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the quiz-generating LLM.
//! It implements the `GenerationService` port from the `core` crate by asking an
//! OpenAI-compatible chat endpoint for JSON and parsing it into candidates.

use std::sync::OnceLock;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use study_core::{
    domain::{FlashcardCandidate, QuestionCandidate},
    ports::{GenerationService, PortError, PortResult},
};
use tracing::warn;

const QUESTION_SYSTEM_PROMPT: &str = "You are an educational expert that creates multiple choice questions from text content. Always respond with valid JSON only, without any additional text.";

const QUESTION_USER_TEMPLATE: &str = r#"Based on the following text content, generate {count} multiple choice questions with 4 options each.
Make sure the questions are relevant to the content and have exactly one correct answer.
Respond in this JSON format:

{
  "questions": [
    {
      "question": "What is the main concept discussed in the text?",
      "choices": [
        {"id": "A", "text": "Option A"},
        {"id": "B", "text": "Option B"},
        {"id": "C", "text": "Option C"},
        {"id": "D", "text": "Option D"}
      ],
      "correct_answer": "B",
      "explanation": "Brief explanation of why this is the correct answer"
    }
  ]
}

Here is the text content:
{text}"#;

const FLASHCARD_SYSTEM_PROMPT: &str = "You are an educational expert that creates study flashcards from text content. Always respond with valid JSON only, without any additional text.";

const FLASHCARD_USER_TEMPLATE: &str = r#"Based on the following text content, generate {count} flashcards.
The front holds a key term or short question, the back holds the definition or answer.
Respond in this JSON format:

{
  "flashcards": [
    {
      "front": "Term or question",
      "back": "Definition or answer",
      "explanation": "Optional extra context"
    }
  ]
}

Here is the text content:
{text}"#;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Sends one system + user prompt pair and returns the raw text of the first choice.
    async fn complete(&self, system: &str, user: String) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.3)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::MalformedOutput("Generation response contained no text content.".to_string())
            })
    }
}

//=========================================================================================
// `GenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationService for OpenAiGenerationAdapter {
    async fn generate_questions(
        &self,
        page_text: &str,
        count: u8,
    ) -> PortResult<Vec<QuestionCandidate>> {
        let prompt = QUESTION_USER_TEMPLATE
            .replace("{count}", &count.to_string())
            .replace("{text}", page_text);
        let raw = self.complete(QUESTION_SYSTEM_PROMPT, prompt).await?;
        parse_questions(&raw)
    }

    async fn generate_flashcards(
        &self,
        page_text: &str,
        count: u8,
    ) -> PortResult<Vec<FlashcardCandidate>> {
        let prompt = FLASHCARD_USER_TEMPLATE
            .replace("{count}", &count.to_string())
            .replace("{text}", page_text);
        let raw = self.complete(FLASHCARD_SYSTEM_PROMPT, prompt).await?;
        parse_flashcards(&raw)
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

// Elements stay raw so that one bad candidate does not sink its siblings.
#[derive(Deserialize)]
struct QuestionEnvelope {
    questions: Vec<Value>,
}

#[derive(Deserialize)]
struct FlashcardEnvelope {
    flashcards: Vec<Value>,
}

/// Converts each element on its own, dropping those that do not fit `T`.
/// Fails only when there were elements and none of them fit.
fn candidates<T: DeserializeOwned>(elements: Vec<Value>, kind: &str) -> PortResult<Vec<T>> {
    let mut last_error = None;
    let parsed: Vec<T> = elements
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| match serde_json::from_value(element) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                warn!("Dropping {} candidate #{}: {}", kind, index + 1, e);
                last_error = Some(e);
                None
            }
        })
        .collect();

    match last_error {
        Some(e) if parsed.is_empty() => Err(PortError::MalformedOutput(format!(
            "{} JSON: no usable candidates, last error: {}",
            kind, e
        ))),
        _ => Ok(parsed),
    }
}

/// Models sometimes wrap JSON in a markdown code fence even when told not to.
fn strip_code_fence(raw: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("fence pattern is valid")
    });
    match fence.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

pub(crate) fn parse_questions(raw: &str) -> PortResult<Vec<QuestionCandidate>> {
    serde_json::from_str::<QuestionEnvelope>(strip_code_fence(raw))
        .map_err(|e| PortError::MalformedOutput(format!("question JSON: {}", e)))
        .and_then(|envelope| candidates(envelope.questions, "question"))
}

pub(crate) fn parse_flashcards(raw: &str) -> PortResult<Vec<FlashcardCandidate>> {
    serde_json::from_str::<FlashcardEnvelope>(strip_code_fence(raw))
        .map_err(|e| PortError::MalformedOutput(format!("flashcard JSON: {}", e)))
        .and_then(|envelope| candidates(envelope.flashcards, "flashcard"))
}
