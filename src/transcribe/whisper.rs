use crate::error::{ReelError, Result};
use crate::transcribe::{Transcriber, Transcript, TranscriptSegment, TranscriptWord};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// OpenAI transcription endpoint.
const WHISPER_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Maximum upload size accepted by the API (25 MB).
const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff.
const BASE_DELAY: Duration = Duration::from_millis(1000);

/// The only hosted model that returns word-level timestamps.
const WHISPER_MODEL: &str = "whisper-1";

/// Outcome of one API round-trip.
enum CallError {
    /// 4xx: the request itself is wrong, retrying will not help.
    Rejected(ReelError),
    Retryable(ReelError),
}

/// OpenAI Whisper client requesting word and segment timestamps.
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    language: Option<String>,
    base_delay: Duration,
}

impl WhisperClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: WHISPER_API_URL.to_string(),
            language: None,
            base_delay: BASE_DELAY,
        }
    }

    /// Point the client at a different server (proxies, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the spoken language (ISO 639-1 code).
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    async fn build_form(&self, audio_path: &Path) -> Result<Form> {
        let file_bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("narration.mp3")
            .to_string();

        let mime_type = match audio_path.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            Some("ogg") => "audio/ogg",
            Some("webm") => "audio/webm",
            _ => "application/octet-stream",
        };

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str(mime_type)?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", WHISPER_MODEL)
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .text("timestamp_granularities[]", "segment");

        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        Ok(form)
    }

    async fn call_api(&self, form: Form) -> std::result::Result<WhisperResponse, CallError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CallError::Retryable(e.into()))?;

        let status = response.status();
        debug!("Whisper API response status: {}", status);

        let body = response
            .text()
            .await
            .map_err(|e| CallError::Retryable(e.into()))?;

        if status.is_success() {
            debug!(
                "Whisper API response: {}",
                body.chars().take(500).collect::<String>()
            );
            return serde_json::from_str(&body).map_err(|e| CallError::Retryable(e.into()));
        }

        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_error) => format!(
                "Whisper API error ({}): {} ({})",
                status, api_error.error.message, api_error.error.r#type
            ),
            Err(_) => format!("Whisper API error ({}): {}", status, body),
        };

        if status.is_client_error() {
            Err(CallError::Rejected(ReelError::Api(message)))
        } else {
            Err(CallError::Retryable(ReelError::Api(message)))
        }
    }

    /// Rebuilds the form on each attempt since sending consumes it.
    async fn transcribe_with_retry(&self, audio: &Path) -> Result<WhisperResponse> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!("Retry attempt {} after {:?}", attempt, delay);
                tokio::time::sleep(delay).await;
            }

            let form = self.build_form(audio).await?;

            match self.call_api(form).await {
                Ok(response) => return Ok(response),
                Err(CallError::Rejected(e)) => return Err(e),
                Err(CallError::Retryable(e)) => {
                    warn!("Transcription attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ReelError::Api("Unknown error".to_string())))
    }

    fn parse_response(&self, response: WhisperResponse) -> Transcript {
        let words = response
            .words
            .unwrap_or_default()
            .into_iter()
            .map(|w| TranscriptWord {
                word: w.word.trim().to_string(),
                start: w.start,
                end: w.end,
            })
            .filter(|w| !w.word.is_empty())
            .collect();

        let segments = response
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| TranscriptSegment {
                text: s.text.trim().to_string(),
                start: s.start,
                end: s.end,
            })
            .filter(|s| !s.text.is_empty())
            .collect();

        Transcript {
            words,
            segments,
            language: response.language,
        }
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript> {
        debug!("Transcribing {} with Whisper", audio.display());

        let metadata = fs::metadata(audio).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReelError::FileNotFound(audio.display().to_string())
            } else {
                e.into()
            }
        })?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(ReelError::Transcription(format!(
                "File too large for Whisper API: {} bytes (max {} bytes)",
                metadata.len(),
                MAX_FILE_SIZE
            )));
        }

        let response = self.transcribe_with_retry(audio).await?;
        let transcript = self.parse_response(response);

        debug!(
            "Whisper returned {} words, {} segments",
            transcript.words.len(),
            transcript.segments.len()
        );

        Ok(transcript)
    }

    fn name(&self) -> &'static str {
        "OpenAI Whisper"
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    #[allow(dead_code)]
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    words: Option<Vec<WhisperWord>>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperWord {
    word: String,
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    r#type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_words_and_segments() {
        let client = WhisperClient::new("test-key".to_string());
        let response: WhisperResponse = serde_json::from_str(
            r#"{
                "text": "Hello world. How are you?",
                "language": "english",
                "duration": 4.0,
                "words": [
                    {"word": "Hello", "start": 0.0, "end": 0.4},
                    {"word": " world", "start": 0.5, "end": 1.0},
                    {"word": "  ", "start": 1.0, "end": 1.1}
                ],
                "segments": [
                    {"id": 0, "start": 0.0, "end": 2.0, "text": " Hello world."},
                    {"id": 1, "start": 2.5, "end": 4.0, "text": " How are you?"}
                ]
            }"#,
        )
        .unwrap();

        let transcript = client.parse_response(response);
        assert_eq!(transcript.words.len(), 2);
        assert_eq!(transcript.words[1].word, "world");
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].text, "Hello world.");
        assert_eq!(transcript.segments[1].start, 2.5);
        assert_eq!(transcript.language.as_deref(), Some("english"));
    }

    #[test]
    fn test_parse_response_text_only() {
        let client = WhisperClient::new("test-key".to_string());
        let response: WhisperResponse =
            serde_json::from_str(r#"{"text": "Hello world"}"#).unwrap();

        let transcript = client.parse_response(response);
        assert!(transcript.is_empty());
        assert!(transcript.language.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let client = WhisperClient::new("test-key".to_string());
        let result = client.transcribe(Path::new("/nonexistent/narration.mp3")).await;
        assert!(matches!(result, Err(ReelError::FileNotFound(_))));
    }
}
