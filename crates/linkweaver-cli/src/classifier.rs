//! MessagesClassifier - LLM の Messages API を使う関連判定
//!
//! 1 ペアにつき 1 リクエスト。リトライはしません（失敗したペアは analyzer が飛ばす）。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use linkweaver_core::domain::{Classification, ClassificationRequest};
use linkweaver_core::ports::{Classifier, ClassifyError};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.3;
const NO_LINK_REASONING: &str = "No suitable location for semantic link";

#[derive(Debug, Clone)]
pub struct MessagesConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

pub struct MessagesClassifier {
    client: Client,
    config: MessagesConfig,
}

impl MessagesClassifier {
    pub fn new(config: MessagesConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Classifier for MessagesClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest<'_>,
    ) -> Result<Classification, ClassifyError> {
        let prompt = build_prompt(&request);
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: [Message {
                role: "user",
                content: &prompt,
            }],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout(self.config.request_timeout)
                } else {
                    ClassifyError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Parse(e.to_string()))?;
        let text = parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .unwrap_or_default();

        debug!(
            source = request.source_name,
            target = request.target_name,
            chars = text.len(),
            "classifier answered"
        );
        parse_answer(&text)
    }
}

/// Pull the first `{ ... }` object out of the model's reply.
///
/// A reply with no object at all is read as "don't link".
pub fn parse_answer(text: &str) -> Result<Classification, ClassifyError> {
    let Some(json) = extract_json_object(text) else {
        return Ok(Classification::no_link(NO_LINK_REASONING));
    };
    serde_json::from_str(json).map_err(|e| ClassifyError::Parse(e.to_string()))
}

/// Greedy: from the first `{` to the last `}`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn build_prompt(request: &ClassificationRequest<'_>) -> String {
    format!(
        r#"You are a conservative semantic link analyst. Most pages should NOT get a new link unless there is a compelling reason.

Source post: "{source_name}"
Target post: "{target_name}"

SOURCE CONTENT:
<source-content>
{source_content}
</source-content>

TARGET CONTENT:
<target-content>
{target_content}
</target-content>

Suggest a link only if every one of these holds:
1. The source directly discusses something the target explains in depth.
2. A reader would genuinely benefit from the target at that exact point.
3. The surrounding text naturally leads to the target's topic.
4. The connection is specific, not a passing mention of a broad topic.
5. The text to link is NOT already inside an existing <a href="...">...</a> link.
6. The text to link is 2-4 words copied exactly from the source.

The source content may contain HTML.
If in doubt, answer with shouldLink false.

Respond with ONLY a JSON object:
{{
  "shouldLink": true or false,
  "linkText": "exact 2-4 word phrase from the source",
  "altText": "descriptive title text for the link",
  "confidence": 0-100,
  "reasoning": "one sentence",
  "linkPosition": approximate character offset of linkText in the source (optional)
}}"#,
        source_name = request.source_name,
        target_name = request.target_name,
        source_content = request.source_content,
        target_content = request.target_content,
    )
}
