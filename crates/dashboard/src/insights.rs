use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.opentyphoon.ai/v1";
pub const DEFAULT_LLM_MODEL: &str = "typhoon-v2-70b-instruct";

const MAX_TOKENS: u32 = 2048;
const TEMPERATURE: f32 = 0.7;

const PROMPT_TEMPLATE: &str = "
You are an environmental data analyst. Your responsibility is to analyze weather and air pollution data during a given period
and summarize important insights to help the public or relevant agencies make appropriate policy decisions.
Please prepare the report using the following structure:

{context}

📌 Executive Summary
   • Present the overall air quality and weather situation.
   • Identify key indices (temperature, PM2.5, humidity, wind speed) and compare them to standard values.
   • Highlight critical areas and time periods that need special attention.

🔍 Key Insights
   • Analyze relationships between various variables affecting air quality.
   • Identify unusual patterns or trends and explain possible causes.
   • Link the data to human activities or natural phenomena.

⚠️ Policy Recommendations
   • Short-term measures to respond to the current situation.
   • Recommendations for vulnerable populations (children, elderly, people with chronic diseases).
   • Long-term structural measures to solve the problem.

📈 Trend Forecast
   • Forecast the air quality situation over the next 5 days.
   • Identify factors that may affect future changes.
";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Insights are disabled, no API key configured")]
    Disabled,
    #[error("Failed to call text generation API: {0}")]
    Http(String),
    #[error("Unexpected text generation response: {0}")]
    Response(String),
}

/// Turns a statistical summary into an analyst report
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, context: &str) -> Result<String, Error>;
}

pub fn render_prompt(context: &str) -> String {
    PROMPT_TEMPLATE.replace("{context}", context)
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionClient {
    pub fn new(base_url: String, model: String, api_key: String) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    pub fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}

#[async_trait]
impl InsightGenerator for ChatCompletionClient {
    async fn generate(&self, context: &str) -> Result<String, Error> {
        let prompt = render_prompt(context);
        let url = format!("{}/chat/completions", self.base_url);
        info!("requesting insights from {} ({})", url, self.model);
        debug!("prompt length: {} chars", prompt.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(&prompt))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Http(e.to_string()))?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Response(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Response(String::from("no message content in choices")))
    }
}
