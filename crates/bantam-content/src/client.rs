//! Chat and image generation over an OpenAI-compatible HTTP API.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Concepts per turn. The batch contract is fixed-count; anything else
/// from the model is a decode error.
const CONCEPT_COUNT: usize = 3;

/// Reading speed used to size explorations.
const WORDS_PER_MINUTE: usize = 250;

/// Spoken when overview generation fails; the turn continues with this.
const OVERVIEW_FALLBACK: &str =
    "I found something really interesting about that — let me show you!";

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("generation API returned status {0}")]
    Api(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One educational concept with an optional illustration URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    pub explanation: String,
    pub illustration: Option<String>,
}

/// A named entity extracted from a passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub category: String,
    pub description: String,
}

// --- Wire types ---

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: String,
}

#[derive(Deserialize)]
struct ConceptsPayload {
    concepts: Vec<RawConcept>,
}

#[derive(Deserialize, Debug)]
struct RawConcept {
    name: String,
    explanation: String,
    image_prompt: String,
}

#[derive(Deserialize)]
struct EntitiesPayload {
    entities: Vec<Entity>,
}

/// Stateless request/response wrapper around the generation API.
pub struct ContentClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    image_model: String,
}

impl ContentClient {
    pub fn new(base_url: &str, api_key: &str, chat_model: &str, image_model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            chat_model: chat_model.to_string(),
            image_model: image_model.to_string(),
        }
    }

    /// A short spoken overview of the topic. Fails soft: any transport,
    /// API, or decode error yields the fixed fallback line.
    pub async fn generate_overview(&self, topic: &str) -> String {
        let system = "You are explaining to a ten-year-old. Give a simple, factually \
                      accurate overview of the topic in two or three sentences, easy to \
                      understand and exciting to listen to.";

        match self.chat(system, topic, false, Some(0.7), Some(250)).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "overview generation failed, using fallback");
                OVERVIEW_FALLBACK.to_string()
            }
        }
    }

    /// Exactly three concepts about the topic, each with an illustration
    /// when image generation succeeds for it. Chat/decode errors
    /// propagate; a single image failure degrades only that concept.
    pub async fn concepts_with_illustrations(
        &self,
        topic: &str,
    ) -> Result<Vec<Concept>, ContentError> {
        let system = "Extract exactly 3 key concepts from the topic that would fascinate \
                      a ten-year-old. Respond as JSON: {\"concepts\": [{\"name\": ..., \
                      \"explanation\": two or three simple sentences, \"image_prompt\": a \
                      detailed prompt for an educational illustration}]}";

        let body = self.chat(system, topic, true, None, None).await?;
        let raw = parse_concepts(&body)?;

        // Illustrations fan out concurrently; the batch never fails on a
        // single image.
        let illustrations = join_all(raw.iter().map(|concept| async {
            match self.generate_illustration(&concept.image_prompt).await {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(concept = %concept.name, error = %e, "illustration failed");
                    None
                }
            }
        }))
        .await;

        Ok(raw
            .into_iter()
            .zip(illustrations)
            .map(|(c, illustration)| Concept {
                name: c.name,
                explanation: c.explanation,
                illustration,
            })
            .collect())
    }

    /// A longer free-form exploration of an interest, sized to a reading
    /// time in minutes.
    pub async fn generate_exploration(
        &self,
        interest: &str,
        minutes: usize,
    ) -> Result<String, ContentError> {
        let words = minutes.max(1) * WORDS_PER_MINUTE;
        let system = format!(
            "Write an engaging exploration of the user's interest in roughly {words} \
             words: three or four clear paragraphs, an engaging hook, specific examples, \
             some lesser-known aspects, and a forward-looking conclusion."
        );

        let text = self.chat(&system, interest, false, Some(0.7), None).await?;
        Ok(text.trim().to_string())
    }

    /// Named entities from a passage, JSON-structured.
    pub async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>, ContentError> {
        let system = "List the notable named entities in the passage. Respond as JSON: \
                      {\"entities\": [{\"name\": ..., \"category\": ..., \"description\": \
                      one sentence}]}";

        let body = self.chat(system, text, true, None, None).await?;
        parse_entities(&body)
    }

    /// One chat completion; returns the first choice's content.
    async fn chat(
        &self,
        system: &str,
        user: &str,
        json_response: bool,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, ContentError> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            response_format: json_response.then_some(ResponseFormat { kind: "json_object" }),
            temperature,
            max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Api(status.as_u16()));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ContentError::Malformed("empty choices".to_string()))
    }

    /// One generated illustration; returns its URL.
    async fn generate_illustration(&self, prompt: &str) -> Result<String, ContentError> {
        let full_prompt = format!(
            "An educational illustration: {prompt}. Simple, clear, and engaging for a \
             ten-year-old, bright colors, no text in the image."
        );
        let request = ImageRequest {
            model: &self.image_model,
            prompt: &full_prompt,
            n: 1,
            size: "1024x1024",
        };

        let response = self
            .http
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Api(status.as_u16()));
        }

        let parsed: ImageResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.url)
            .ok_or_else(|| ContentError::Malformed("empty image data".to_string()))
    }
}

/// Parse the concepts document, enforcing the fixed batch size.
fn parse_concepts(body: &str) -> Result<Vec<RawConcept>, ContentError> {
    let payload: ConceptsPayload =
        serde_json::from_str(body).map_err(|e| ContentError::Malformed(e.to_string()))?;

    if payload.concepts.len() != CONCEPT_COUNT {
        return Err(ContentError::Malformed(format!(
            "expected {CONCEPT_COUNT} concepts, got {}",
            payload.concepts.len()
        )));
    }

    Ok(payload.concepts)
}

fn parse_entities(body: &str) -> Result<Vec<Entity>, ContentError> {
    let payload: EntitiesPayload =
        serde_json::from_str(body).map_err(|e| ContentError::Malformed(e.to_string()))?;
    Ok(payload.entities)
}
