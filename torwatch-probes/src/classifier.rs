//! Risk classification collaborator
//!
//! The core never produces risk prose itself. A [`RiskClassifier`] receives
//! the verified record and returns notes plus a suggested action; the bundled
//! implementation talks to any OpenAI-compatible chat API.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use torwatch_core::ReconRecord;

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Empty response")]
    EmptyResponse,

    #[error("Unreadable assessment: {0}")]
    Parse(String),
}

/// Prose returned by a classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_notes: String,
    pub suggested_action: String,
}

/// External risk classification capability
#[async_trait]
pub trait RiskClassifier: Send + Sync {
    /// Assess a record whose facts were all observed by a probe
    async fn classify(&self, context: &ReconRecord) -> Result<RiskAssessment, ClassifierError>;

    /// Model or implementation name, for the diagnostic log
    fn name(&self) -> &str;
}

/// Thread-safe reference to a classifier
pub type SharedClassifier = Arc<dyn RiskClassifier>;

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"
You are a threat intelligence analyst reviewing reconnaissance data that was
captured from a live scan. Every field you receive was observed directly or is
an explicit placeholder ("Hidden", "Unknown", "MASKED") meaning it was not
observed. Do not invent facts and do not treat placeholders as evidence.

Respond with a single JSON object and nothing else:
{"riskNotes": "<two to four sentences of risk assessment>",
 "suggestedAction": "<one concrete next investigative step>"}
"#;

/// OpenAI-compatible classifier configuration
#[derive(Debug, Clone)]
pub struct LlmClassifierConfig {
    pub api_key: String,
    /// Base URL (for OpenRouter, local servers, etc.)
    pub base_url: Option<String>,
    pub model: String,
    /// Temperature (0.0 - 2.0)
    pub temperature: f32,
    pub max_tokens: u16,
}

impl Default for LlmClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

impl LlmClassifierConfig {
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }
}

/// Classifier backed by an OpenAI-compatible chat completion API
pub struct LlmRiskClassifier {
    client: Client<OpenAIConfig>,
    config: LlmClassifierConfig,
}

impl LlmRiskClassifier {
    pub fn new(config: LlmClassifierConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            config,
        }
    }

    async fn complete(&self, user: &str) -> Result<String, ClassifierError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(CLASSIFIER_SYSTEM_PROMPT)
                    .build()
                    .map_err(|e| ClassifierError::Api(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(|e| ClassifierError::Api(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(messages)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
            .build()
            .map_err(|e| ClassifierError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ClassifierError::Api(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or(ClassifierError::EmptyResponse)
    }
}

#[async_trait]
impl RiskClassifier for LlmRiskClassifier {
    async fn classify(&self, context: &ReconRecord) -> Result<RiskAssessment, ClassifierError> {
        // Raw registry JSON is noise for the model
        let mut context = context.clone();
        if let Some(registry) = context.registry.as_mut() {
            registry.raw_document.clear();
        }

        let facts = serde_json::to_string_pretty(&context)
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;
        let user = format!("Reconnaissance data for {}:\n\n{}", context.target, facts);

        let reply = self.complete(&user).await?;
        debug!("Classifier {} replied with {} chars", self.config.model, reply.len());
        parse_assessment(&reply)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Parse a model reply, tolerating a fenced code block around the JSON
pub fn parse_assessment(reply: &str) -> Result<RiskAssessment, ClassifierError> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body).map_err(|e| ClassifierError::Parse(e.to_string()))
}
