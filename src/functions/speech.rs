use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::FunctionsClient;
use crate::error::{FunctionError, FunctionResult, ValidationError};

/// Longest text accepted in a single request.
pub const MAX_TEXT_CHARS: usize = 4096;
/// Length of the text snippet kept in usage records.
pub const SNIPPET_CHARS: usize = 100;
pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

/// Narration voices accepted by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    #[default]
    Nova,
    Shimmer,
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Voice {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "fable" => Ok(Voice::Fable),
            "onyx" => Ok(Voice::Onyx),
            "nova" => Ok(Voice::Nova),
            "shimmer" => Ok(Voice::Shimmer),
            _ => Err(ValidationError::new("voice", format!("Unknown voice: {}", s))),
        }
    }
}

/// Speech synthesis models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechModel {
    #[default]
    #[serde(rename = "tts-1")]
    Standard,
    #[serde(rename = "tts-1-hd")]
    HighDefinition,
}

impl SpeechModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechModel::Standard => "tts-1",
            SpeechModel::HighDefinition => "tts-1-hd",
        }
    }
}

impl std::str::FromStr for SpeechModel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tts-1" => Ok(SpeechModel::Standard),
            "tts-1-hd" => Ok(SpeechModel::HighDefinition),
            _ => Err(ValidationError::new("model", format!("Unknown model: {}", s))),
        }
    }
}

/// Request body for the text-to-speech function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Voice,
    pub model: SpeechModel,
    /// Always within `MIN_SPEED..=MAX_SPEED`; set through `with_speed`.
    speed: f32,
    pub user_id: String,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: Voice::default(),
            model: SpeechModel::default(),
            speed: 1.0,
            user_id: user_id.into(),
        }
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_model(mut self, model: SpeechModel) -> Self {
        self.model = model;
        self
    }

    /// Set playback speed, clamped to the supported range
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = if speed.is_finite() {
            speed.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            1.0
        };
        self
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::new("text", "Text cannot be empty"));
        }
        if self.text.chars().count() > MAX_TEXT_CHARS {
            return Err(ValidationError::new(
                "text",
                format!("Text exceeds {} characters", MAX_TEXT_CHARS),
            ));
        }
        Ok(())
    }
}

/// What a synthesis call consumed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub user_id: String,
    pub characters: usize,
    pub model: SpeechModel,
    pub voice: Voice,
    pub snippet: String,
}

impl UsageRecord {
    pub fn from_request(request: &SpeechRequest) -> Self {
        Self {
            user_id: request.user_id.clone(),
            characters: request.text.chars().count(),
            model: request.model,
            voice: request.voice,
            snippet: request.text.chars().take(SNIPPET_CHARS).collect(),
        }
    }
}

/// Synthesized audio plus its usage.
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub usage: UsageRecord,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedAudio {
    audio_content: String,
}

impl FunctionsClient {
    /// Synthesize speech; the endpoint answers with raw audio or base64 JSON
    pub async fn text_to_speech(&self, request: &SpeechRequest) -> FunctionResult<SpeechAudio> {
        let response = self.invoke("text-to-speech", request).await?;

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        let bytes = if is_json {
            let encoded: EncodedAudio =
                response
                    .json()
                    .await
                    .map_err(|e| FunctionError::InvalidResponse {
                        message: format!("Failed to parse audio payload: {}", e),
                    })?;
            base64::engine::general_purpose::STANDARD
                .decode(encoded.audio_content)
                .map_err(|e| FunctionError::InvalidResponse {
                    message: format!("Invalid base64 audio: {}", e),
                })?
        } else {
            response.bytes().await.map_err(FunctionError::Http)?.to_vec()
        };

        let usage = UsageRecord::from_request(request);
        info!(
            user = %usage.user_id,
            characters = usage.characters,
            model = usage.model.as_str(),
            voice = usage.voice.as_str(),
            audio_bytes = bytes.len(),
            "Speech synthesized"
        );

        Ok(SpeechAudio { bytes, usage })
    }
}
