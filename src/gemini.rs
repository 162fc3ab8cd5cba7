//! Client for the Gemini `generateContent` REST endpoint.

use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::InvocationError,
    model::{Generation, GenerationRequest, VisionModel},
};

const API_KEY_HEADER: &str = "x-goog-api-key";
const UNSPECIFIED_BLOCK_REASON: &str = "BLOCK_REASON_UNSPECIFIED";

/// Gemini model handle. Built once at startup and shared read-only.
pub struct GeminiClient {
    client: reqwest::Client,
    config: Config,
}

impl GeminiClient {
    pub fn new(config: Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        )
    }
}

impl VisionModel for GeminiClient {
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<Generation, InvocationError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(InvocationError::MissingCredential)?;

        let body = GenerateContentRequest::from_request(&request)?;

        log::debug!(
            "Sending generateContent request to model {}",
            self.config.model
        );
        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(error_from_status(status, &bytes));
        }

        let parsed: GenerateContentResponse = serde_json::from_slice(&bytes)
            .map_err(|e| InvocationError::MalformedResponse(e.to_string()))?;
        parsed.into_generation()
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

impl GenerateContentRequest {
    fn from_request(request: &GenerationRequest<'_>) -> Result<Self, InvocationError> {
        let mut parts = vec![Part::Text {
            text: request.prompt.as_str().to_string(),
        }];

        if let Some(image) = request.image {
            let png = image.encode_png().map_err(InvocationError::Encode)?;
            parts.push(Part::InlineData {
                inline_data: Blob {
                    mime_type: "image/png".to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(png),
                },
            });
        }

        Ok(Self {
            contents: vec![Content { parts }],
        })
    }
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
struct PromptFeedback {
    block_reason: Option<String>,
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

impl GenerateContentResponse {
    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
            .filter(|reason| *reason != UNSPECIFIED_BLOCK_REASON)
    }

    /// A block reason wins over any candidate; otherwise the text parts of
    /// the first candidate are concatenated.
    fn into_generation(self) -> Result<Generation, InvocationError> {
        if let Some(reason) = self.block_reason() {
            return Ok(Generation::Blocked(reason.to_string()));
        }

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            InvocationError::MalformedResponse("response contained no candidates".to_string())
        })?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(InvocationError::MalformedResponse(format!(
                "response contained no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(Generation::Text(text))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

fn error_from_status(status: StatusCode, body: &[u8]) -> InvocationError {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => match error.status {
            Some(code) => format!("{code}: {}", error.message),
            None => error.message,
        },
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    };
    let message = if message.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        message
    };

    // an invalid key comes back as a plain 400
    let rejected_key = status == StatusCode::BAD_REQUEST && message.contains("API key");
    if rejected_key || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        InvocationError::Credential {
            status: status.as_u16(),
            message,
        }
    } else {
        InvocationError::Service {
            status: status.as_u16(),
            message,
        }
    }
}
