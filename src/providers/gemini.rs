//! Gemini streaming backend
//!
//! One call per exchange: `POST {base}/models/{model}:streamGenerateContent`
//! with `alt=sse`, consumed as `data: {json}` frames. Open modes stream text
//! chunks and grounding citations as they arrive; structured modes accumulate
//! the raw JSON text and parse it once at stream end (partial JSON is never
//! parsed).

use std::time::Duration;

use async_stream::stream;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::prompts::messages;
use crate::conversation::{Citation, StructuredPayload};
use crate::core::reducer::PartialResult;
use crate::core::request::{ModelRequest, ResponseMode};

use super::{ModelBackend, PartialResultStream, ProviderError};

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            timeout_secs: 120,
        }
    }
}

pub struct GeminiBackend {
    config: GeminiConfig,
    client: Client,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self { config, client }
    }

    fn request_body(request: &ModelRequest) -> Value {
        let contents: Vec<Value> = request
            .turns
            .iter()
            .map(|t| json!({ "role": t.role, "parts": [{ "text": t.text }] }))
            .collect();

        let mut body = json!({
            "contents": contents,
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
        });

        match &request.response {
            ResponseMode::StructuredJson { schema, .. } => {
                body["generationConfig"] = json!({
                    "responseMimeType": "application/json",
                    "responseSchema": schema,
                });
            }
            ResponseMode::OpenText => {
                body["tools"] = json!([{ "googleSearch": {} }]);
            }
        }

        if request.interactive {
            body["generationConfig"]["thinkingConfig"] = json!({ "thinkingBudget": 0 });
        }

        body
    }
}

/// Accumulates raw response bytes and yields complete lines. Splitting
/// happens at the byte level so a multi-byte UTF-8 character crossing a
/// network-chunk boundary stays intact; decoding only ever sees whole lines.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Residual bytes once the stream ends: a final line that arrived
    /// without a trailing newline.
    fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Partial results carried by one SSE line. Structured modes accumulate
/// chunk text into `collected` instead of emitting it.
fn line_events(line: &str, structured: bool, collected: &mut String) -> Vec<PartialResult> {
    let Some(data) = sse_data(line) else {
        return Vec::new();
    };
    if data.is_empty() || data == "[DONE]" {
        return Vec::new();
    }
    let frame: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable stream frame");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    if let Some(text) = chunk_text(&frame) {
        if structured {
            collected.push_str(&text);
        } else {
            events.push(PartialResult::TextChunk(text));
        }
    }
    if !structured {
        if let Some(citations) = chunk_citations(&frame) {
            events.push(PartialResult::Citations(citations));
        }
    }
    events
}

/// Extract the payload of one SSE line, if it is a data line.
fn sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))
}

/// Concatenated part text of one stream frame.
fn chunk_text(frame: &Value) -> Option<String> {
    let parts = frame["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Grounding citations of one stream frame. Candidates missing a uri or a
/// title are discarded.
fn chunk_citations(frame: &Value) -> Option<Vec<Citation>> {
    let chunks = frame["candidates"][0]["groundingMetadata"]["groundingChunks"].as_array()?;
    let citations: Vec<Citation> = chunks
        .iter()
        .filter_map(|c| {
            let uri = c["web"]["uri"].as_str()?;
            let title = c["web"]["title"].as_str()?;
            Some(Citation {
                uri: uri.to_string(),
                title: title.to_string(),
            })
        })
        .collect();
    if citations.is_empty() {
        None
    } else {
        Some(citations)
    }
}

#[async_trait::async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate_stream(
        &self,
        request: ModelRequest,
    ) -> Result<PartialResultStream, ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "GEMINI_API_KEY is not set".to_string(),
            ));
        }

        let url = format!(
            "{}/models/{}:streamGenerateContent",
            self.config.base_url, request.model
        );
        let body = Self::request_body(&request);

        tracing::debug!(model = %request.model, "opening model stream");

        let response = self
            .client
            .post(&url)
            .query(&[("alt", "sse"), ("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidResponse(format!(
                "{}: {}",
                status, body
            )));
        }

        let structured = match request.response {
            ResponseMode::StructuredJson { kind, .. } => Some(kind),
            ResponseMode::OpenText => None,
        };

        let mut bytes = response.bytes_stream();

        let stream = stream! {
            let mut lines = LineBuffer::default();
            let mut collected = String::new();

            loop {
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        for line in lines.push(&chunk) {
                            for event in line_events(&line, structured.is_some(), &mut collected) {
                                yield event;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "model stream transport failed");
                        yield PartialResult::Error(messages::TRANSPORT_FAILURE.to_string());
                        return;
                    }
                    None => break,
                }
            }

            // The last data line may arrive without a trailing newline.
            if let Some(line) = lines.flush() {
                for event in line_events(&line, structured.is_some(), &mut collected) {
                    yield event;
                }
            }

            // Structured modes parse once, only after full text completion.
            if let Some(kind) = structured {
                match StructuredPayload::from_json(kind, &collected) {
                    Ok(payload) => yield PartialResult::StructuredData(payload),
                    Err(e) => {
                        tracing::error!(error = %e, "structured response parse failed");
                        yield PartialResult::Error(messages::PARSE_FAILURE.to_string());
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}
