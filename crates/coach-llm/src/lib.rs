// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod prompts;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Every failure rendered as text starts with this marker.
pub const UNAVAILABLE_PREFIX: &str = "[ai unavailable]";

const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
const BLOCKING_FINISH_REASONS: [&str; 3] = ["SAFETY", "BLOCKLIST", "PROHIBITED_CONTENT"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationFailure {
    NotConfigured,
    Blocked(String),
    Empty,
    Api(String),
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(
                f,
                "{UNAVAILABLE_PREFIX} no AI credential is configured -- set the key named by [ai].api_key_env"
            ),
            Self::Blocked(reason) => {
                write!(f, "{UNAVAILABLE_PREFIX} the response was blocked ({reason})")
            }
            Self::Empty => write!(f, "{UNAVAILABLE_PREFIX} the model returned no text"),
            Self::Api(message) => write!(f, "{UNAVAILABLE_PREFIX} request failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Text(String),
    Unavailable(GenerationFailure),
}

impl Generation {
    pub fn failure(&self) -> Option<&GenerationFailure> {
        match self {
            Self::Text(_) => None,
            Self::Unavailable(failure) => Some(failure),
        }
    }

    /// Flattens to a string; failures become their sentinel text.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Unavailable(failure) => failure.to_string(),
        }
    }
}

pub fn is_unavailable_text(text: &str) -> bool {
    text.trim_start().starts_with(UNAVAILABLE_PREFIX)
}

pub trait TextGenerator {
    fn is_configured(&self) -> bool;

    fn generate(&self, prompt: &str) -> Generation;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    model: String,
    api_key: String,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("ai.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("ai.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "ai.base_url {base_url:?} must use http or https, got {}",
                parsed.scheme()
            );
        }
        if model.trim().is_empty() {
            bail!("ai.model must not be empty");
        }
        if api_key.trim().is_empty() {
            bail!("AI credential must not be empty");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            model: model.trim().to_owned(),
            api_key: api_key.trim().to_owned(),
            http,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One `generateContent` round trip. Transport, status and decoding
    /// problems are errors; blocked or empty answers are not.
    pub fn generate_content(&self, prompt: &str) -> Result<Generation> {
        let endpoint = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateContentRequest::new(prompt);
        debug!(model = %self.model, prompt_len = prompt.len(), "sending generateContent request");

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let parsed: GenerateContentResponse =
            response.json().context("decode generateContent response")?;
        Ok(interpret(parsed))
    }
}

/// The configured AI backend, or nothing.
#[derive(Debug, Clone)]
pub enum Generator {
    Disabled,
    Gemini(Client),
}

impl Generator {
    /// A missing or blank credential yields [`Generator::Disabled`].
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let Some(api_key) = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
        else {
            return Ok(Self::Disabled);
        };

        let client = Client::new(&config.base_url, &config.model, api_key, config.timeout)?;
        Ok(Self::Gemini(client))
    }
}

impl TextGenerator for Generator {
    fn is_configured(&self) -> bool {
        matches!(self, Self::Gemini(_))
    }

    fn generate(&self, prompt: &str) -> Generation {
        let client = match self {
            Self::Disabled => return Generation::Unavailable(GenerationFailure::NotConfigured),
            Self::Gemini(client) => client,
        };

        match client.generate_content(prompt) {
            Ok(generation) => {
                if let Some(failure) = generation.failure() {
                    warn!(model = %client.model(), failure = %failure, "ai produced no usable text");
                }
                generation
            }
            Err(error) => {
                error!(model = %client.model(), error = %format!("{error:#}"), "ai request failed");
                Generation::Unavailable(GenerationFailure::Api(format!("{error:#}")))
            }
        }
    }
}

fn interpret(response: GenerateContentResponse) -> Generation {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
        .filter(|reason| !reason.is_empty())
    {
        return Generation::Unavailable(GenerationFailure::Blocked(reason));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Generation::Unavailable(GenerationFailure::Empty);
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();
    let text = text.trim();
    if !text.is_empty() {
        return Generation::Text(text.to_owned());
    }

    match candidate.finish_reason {
        Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason.as_str()) => {
            Generation::Unavailable(GenerationFailure::Blocked(reason))
        }
        _ => Generation::Unavailable(GenerationFailure::Empty),
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("request to {base_url} timed out -- raise [ai].timeout or retry later");
    }
    anyhow!("cannot reach {base_url} -- check [ai].base_url and network access ({error})")
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(error) = parsed.error
        && !error.message.is_empty()
    {
        return match error.status {
            Some(code) if !code.is_empty() => {
                anyhow!("server error ({} {code}): {}", status.as_u16(), error.message)
            }
            _ => anyhow!("server error ({}): {}", status.as_u16(), error.message),
        };
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    safety_settings: Vec<SafetySetting>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            safety_settings: SAFETY_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: SAFETY_THRESHOLD,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{
        AiConfig, GenerateContentRequest, GenerateContentResponse, Generation, GenerationFailure,
        Generator, TextGenerator, UNAVAILABLE_PREFIX, clean_error_response, interpret,
        is_unavailable_text,
    };
    use anyhow::Result;
    use reqwest::StatusCode;

    fn decode(body: &str) -> Result<GenerateContentResponse> {
        Ok(serde_json::from_str(body)?)
    }

    #[test]
    fn text_parts_are_joined_and_trimmed() -> Result<()> {
        let response = decode(
            r#"{"candidates":[{"content":{"parts":[{"text":"  Walk 20 "},{"text":"minutes\n"}]},"finishReason":"STOP"}]}"#,
        )?;
        assert_eq!(interpret(response), Generation::Text("Walk 20 minutes".to_owned()));
        Ok(())
    }

    #[test]
    fn prompt_block_reason_wins_over_candidates() -> Result<()> {
        let response = decode(
            r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#,
        )?;
        assert_eq!(
            interpret(response),
            Generation::Unavailable(GenerationFailure::Blocked("SAFETY".to_owned()))
        );
        Ok(())
    }

    #[test]
    fn safety_finish_without_text_is_blocked() -> Result<()> {
        let response = decode(r#"{"candidates":[{"finishReason":"PROHIBITED_CONTENT"}]}"#)?;
        assert_eq!(
            interpret(response),
            Generation::Unavailable(GenerationFailure::Blocked(
                "PROHIBITED_CONTENT".to_owned()
            ))
        );
        Ok(())
    }

    #[test]
    fn missing_or_blank_text_is_empty() -> Result<()> {
        for body in [
            r#"{}"#,
            r#"{"candidates":[]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"   "}]},"finishReason":"STOP"}]}"#,
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"MAX_TOKENS"}]}"#,
        ] {
            assert_eq!(
                interpret(decode(body)?),
                Generation::Unavailable(GenerationFailure::Empty),
                "body={body}"
            );
        }
        Ok(())
    }

    #[test]
    fn every_failure_renders_as_sentinel_text() {
        let failures = [
            GenerationFailure::NotConfigured,
            GenerationFailure::Blocked("SAFETY".to_owned()),
            GenerationFailure::Empty,
            GenerationFailure::Api("server returned 500".to_owned()),
        ];
        for failure in failures {
            let text = Generation::Unavailable(failure.clone()).into_text();
            assert!(text.starts_with(UNAVAILABLE_PREFIX), "got {text}");
            assert!(is_unavailable_text(&text), "failure={failure:?}");
        }
        assert!(!is_unavailable_text("Stretch for ten minutes"));
    }

    #[test]
    fn request_carries_prompt_and_all_safety_settings() -> Result<()> {
        let value = serde_json::to_value(GenerateContentRequest::new("hello"))?;
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        let settings = value["safetySettings"]
            .as_array()
            .map(Vec::len)
            .unwrap_or_default();
        assert_eq!(settings, 4);
        assert_eq!(
            value["safetySettings"][3]["category"],
            "HARM_CATEGORY_DANGEROUS_CONTENT"
        );
        assert_eq!(value["safetySettings"][0]["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
        Ok(())
    }

    #[test]
    fn clean_error_response_prefers_api_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        let message = clean_error_response(StatusCode::BAD_REQUEST, body).to_string();
        assert_eq!(message, "server error (400 INVALID_ARGUMENT): API key not valid.");

        let message = clean_error_response(StatusCode::BAD_GATEWAY, "upstream down").to_string();
        assert_eq!(message, "server error (502): upstream down");

        let message = clean_error_response(StatusCode::INTERNAL_SERVER_ERROR, "").to_string();
        assert_eq!(message, "server returned 500");
    }

    #[test]
    fn blank_credential_disables_the_generator() -> Result<()> {
        for api_key in [None, Some(String::new()), Some("   ".to_owned())] {
            let generator = Generator::from_config(&AiConfig {
                api_key,
                ..AiConfig::default()
            })?;
            assert!(!generator.is_configured());
            assert_eq!(
                generator.generate("anything"),
                Generation::Unavailable(GenerationFailure::NotConfigured)
            );
        }
        Ok(())
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = AiConfig {
            api_key: Some("key".to_owned()),
            base_url: "ftp://example.com".to_owned(),
            ..AiConfig::default()
        };
        assert!(Generator::from_config(&config).is_err());
    }
}
