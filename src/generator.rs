//! Answer generation from retrieved passages.
//!
//! The controller hands the top-ranked passages and the user's question to
//! an [`AnswerGenerator`]. Both shipped backends render the same prompt
//! ([`build_prompt`]) and make a single non-streaming request:
//!
//! - **[`OllamaGenerator`]**: `POST {url}/api/generate`, reads `response`.
//! - **[`OpenAiGenerator`]**: `POST {url}/v1/chat/completions`, reads the
//!   first choice. Works against OpenAI or any compatible server
//!   (including Ollama's own `/v1` endpoint). Requires `OPENAI_API_KEY`.
//!
//! There is no retry: a failed call fails the chat turn.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::models::Passage;

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Answer `question` from `context`. Returns the raw model text.
    async fn generate(&self, context: &[Passage], question: &str) -> Result<String>;
}

/// Render the instruction prompt. Passages are joined with blank lines in
/// rank order.
pub fn build_prompt(business_name: &str, context: &[Passage], question: &str) -> String {
    let context_text = context
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an AI assistant for a web development, automation systems, and high intelligent AI business named {business}.\n\
         Use the following retrieved context to answer the user's question. If you don't\n\
         know the answer, state that you do not have enough information and can connect\n\
         them to a human agent. Do not make up any information.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer:\n",
        business = business_name,
        context = context_text,
        question = question,
    )
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

async fn read_json(response: reqwest::Response, label: &str) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("{} returned {}: {}", label, status, body);
    }
    response
        .json()
        .await
        .with_context(|| format!("Invalid {} response body", label))
}

// ============ Ollama ============

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    business_name: String,
}

impl OllamaGenerator {
    pub fn new(config: &GeneratorConfig, business_name: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            business_name: business_name.to_string(),
        })
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

fn parse_ollama_response(json: serde_json::Value) -> Result<String> {
    let parsed: OllamaGenerateResponse =
        serde_json::from_value(json).context("Ollama response has no 'response' field")?;
    Ok(parsed.response)
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate(&self, context: &[Passage], question: &str) -> Result<String> {
        let prompt = build_prompt(&self.business_name, context, question);
        let endpoint = format!("{}/api/generate", self.url);
        debug!(model = %self.model, passages = context.len(), "Sending request to Ollama");

        let response = self
            .client
            .post(&endpoint)
            .json(&OllamaGenerateRequest {
                model: &self.model,
                prompt: &prompt,
                stream: false,
            })
            .send()
            .await
            .with_context(|| format!("Ollama connection error at {}", endpoint))?;

        parse_ollama_response(read_json(response, "Ollama").await?)
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    business_name: String,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig, business_name: &str) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            business_name: business_name.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_chat_completion(json: serde_json::Value) -> Result<String> {
    let parsed: ChatCompletionResponse =
        serde_json::from_value(json).context("Invalid chat completion response")?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("Chat completion returned no content"))
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(&self, context: &[Passage], question: &str) -> Result<String> {
        let prompt = build_prompt(&self.business_name, context, question);
        let endpoint = format!("{}/v1/chat/completions", self.url);
        debug!(model = %self.model, passages = context.len(), "Sending chat completion request");

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Chat completion connection error at {}", endpoint))?;

        parse_chat_completion(read_json(response, "Chat completion").await?)
    }
}

pub fn create_generator(
    config: &GeneratorConfig,
    business_name: &str,
) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config, business_name)?)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config, business_name)?)),
        other => bail!("Unknown generator provider: '{}'", other),
    }
}
