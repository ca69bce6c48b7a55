//! Mock API tests for speech-to-text driven subtitle timing
//!
//! A scripted `Transcriber` drives the word and segment tiers, and a wiremock
//! server stands in for the Whisper endpoint.

use async_trait::async_trait;
use bookreel::config::{AlignmentConfig, Language};
use bookreel::subtitle::SubtitleAligner;
use bookreel::transcribe::{
    Transcriber, Transcript, TranscriptSegment, TranscriptWord, WhisperClient,
};
use bookreel::{ReelError, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCRIPT: &str = "Hello. This is a test. Goodbye.";

fn words(list: &[(&str, f64, f64)]) -> Vec<TranscriptWord> {
    list.iter()
        .map(|&(w, s, e)| TranscriptWord {
            word: w.to_string(),
            start: s,
            end: e,
        })
        .collect()
}

fn segments(list: &[(&str, f64, f64)]) -> Vec<TranscriptSegment> {
    list.iter()
        .map(|&(t, s, e)| TranscriptSegment {
            text: t.to_string(),
            start: s,
            end: e,
        })
        .collect()
}

// ============================================================================
// Scripted Transcribers
// ============================================================================

struct ScriptedTranscriber {
    transcript: Transcript,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    fn new(transcript: Transcript) -> Self {
        Self {
            transcript,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: &Path) -> Result<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.transcript.clone())
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }
}

struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(&self, _audio: &Path) -> Result<Transcript> {
        Err(ReelError::Transcription("model unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "Failing"
    }
}

struct SlowTranscriber;

#[async_trait]
impl Transcriber for SlowTranscriber {
    async fn transcribe(&self, _audio: &Path) -> Result<Transcript> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Transcript::default())
    }

    fn name(&self) -> &'static str {
        "Slow"
    }
}

fn narration() -> PathBuf {
    PathBuf::from("/tmp/narration.mp3")
}

// ============================================================================
// Aligner Tier Tests
// ============================================================================

mod aligner_tier_tests {
    use super::*;

    #[tokio::test]
    async fn test_word_tier_uses_word_timings() {
        let transcriber = Arc::new(ScriptedTranscriber::new(Transcript {
            words: words(&[
                ("Hello", 0.0, 0.5),
                ("This", 1.0, 1.2),
                ("is", 1.2, 1.3),
                ("a", 1.3, 1.4),
                ("test", 1.4, 2.0),
                ("Goodbye", 4.0, 4.8),
            ]),
            ..Default::default()
        }));
        let aligner = SubtitleAligner::new(AlignmentConfig::default(), Language::English)
            .with_transcriber(transcriber.clone());

        let alignment = aligner.align(SCRIPT, &narration(), 6.0).await.unwrap();

        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
        assert_eq!(alignment.strategy, "word");
        assert_eq!(alignment.filled, 0);
        assert_eq!(alignment.cues.len(), 3);
        assert!((alignment.cues[1].start - 1.0).abs() < 1e-9);
        assert!((alignment.cues[1].end - 2.0).abs() < 1e-9);
        assert!((alignment.cues[2].start - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_segment_tier_when_no_words() {
        let transcriber = Arc::new(ScriptedTranscriber::new(Transcript {
            segments: segments(&[
                ("Hello.", 0.0, 1.0),
                ("This is a test.", 1.2, 3.5),
                ("Goodbye.", 4.0, 5.5),
            ]),
            ..Default::default()
        }));
        let aligner = SubtitleAligner::new(AlignmentConfig::default(), Language::English)
            .with_transcriber(transcriber);

        let alignment = aligner.align(SCRIPT, &narration(), 6.0).await.unwrap();

        assert_eq!(alignment.strategy, "segment");
        let spans: Vec<(f64, f64)> = alignment.cues.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0.0, 1.0), (1.2, 3.5), (4.0, 5.5)]);
    }

    #[tokio::test]
    async fn test_failing_transcriber_falls_back_to_proportional() {
        let aligner = SubtitleAligner::new(AlignmentConfig::default(), Language::English)
            .with_transcriber(Arc::new(FailingTranscriber));

        let alignment = aligner.align(SCRIPT, &narration(), 6.0).await.unwrap();
        assert_eq!(alignment.strategy, "proportional");
        assert_eq!(alignment.cues.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_transcript_falls_back_to_proportional() {
        let aligner = SubtitleAligner::new(AlignmentConfig::default(), Language::English)
            .with_transcriber(Arc::new(ScriptedTranscriber::new(Transcript::default())));

        let alignment = aligner.align(SCRIPT, &narration(), 6.0).await.unwrap();
        assert_eq!(alignment.strategy, "proportional");
    }

    #[tokio::test]
    async fn test_slow_transcriber_times_out() {
        let config = AlignmentConfig {
            stt_timeout_secs: 1,
            ..Default::default()
        };
        let aligner = SubtitleAligner::new(config, Language::English)
            .with_transcriber(Arc::new(SlowTranscriber));

        let started = std::time::Instant::now();
        let alignment = aligner.align(SCRIPT, &narration(), 6.0).await.unwrap();

        assert_eq!(alignment.strategy, "proportional");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_unrelated_transcript_falls_through() {
        let transcriber = Arc::new(ScriptedTranscriber::new(Transcript {
            words: words(&[("completely", 0.0, 1.0), ("different", 1.0, 2.0)]),
            segments: segments(&[("Completely different audio.", 0.0, 2.0)]),
            language: Some("english".to_string()),
        }));
        let aligner = SubtitleAligner::new(AlignmentConfig::default(), Language::English)
            .with_transcriber(transcriber);

        let alignment = aligner.align(SCRIPT, &narration(), 6.0).await.unwrap();
        assert_eq!(alignment.strategy, "proportional");
    }
}

// ============================================================================
// Whisper API Mock Tests
// ============================================================================

mod whisper_tests {
    use super::*;

    const ENDPOINT: &str = "/v1/audio/transcriptions";

    fn audio_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narration.wav");
        std::fs::write(&path, b"RIFF....WAVEfmt ").unwrap();
        (dir, path)
    }

    fn client(server: &MockServer) -> WhisperClient {
        WhisperClient::new("test-api-key".to_string())
            .with_endpoint(format!("{}{}", server.uri(), ENDPOINT))
            .with_language("en")
            .with_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_whisper_client_name() {
        let client = WhisperClient::new("test-api-key".to_string());
        assert_eq!(client.name(), "OpenAI Whisper");
    }

    #[tokio::test]
    async fn test_whisper_handles_missing_file() {
        let client = WhisperClient::new("test-api-key".to_string());
        let result = client.transcribe(Path::new("/tmp/nonexistent_narration.wav")).await;
        assert!(matches!(result, Err(ReelError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_whisper_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(header("Authorization", "Bearer test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "Hello. This is a test. Goodbye.",
                "language": "english",
                "words": [
                    {"word": "Hello", "start": 0.0, "end": 0.5},
                    {"word": "This", "start": 1.0, "end": 1.2},
                    {"word": "is", "start": 1.2, "end": 1.3},
                    {"word": "a", "start": 1.3, "end": 1.4},
                    {"word": "test", "start": 1.4, "end": 2.0},
                    {"word": "Goodbye", "start": 4.0, "end": 4.8}
                ],
                "segments": [
                    {"id": 0, "start": 0.0, "end": 2.0, "text": " Hello. This is a test."},
                    {"id": 1, "start": 4.0, "end": 4.8, "text": " Goodbye."}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (_dir, audio) = audio_file();
        let transcript = client(&server).transcribe(&audio).await.unwrap();

        assert_eq!(transcript.words.len(), 6);
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[1].text, "Goodbye.");
        assert_eq!(transcript.language.as_deref(), Some("english"));
    }

    #[tokio::test]
    async fn test_whisper_drives_word_alignment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "Hello. This is a test. Goodbye.",
                "words": [
                    {"word": "Hello", "start": 0.0, "end": 0.5},
                    {"word": "This", "start": 1.0, "end": 1.2},
                    {"word": "is", "start": 1.2, "end": 1.3},
                    {"word": "a", "start": 1.3, "end": 1.4},
                    {"word": "test", "start": 1.4, "end": 2.0},
                    {"word": "Goodbye", "start": 4.0, "end": 4.8}
                ]
            })))
            .mount(&server)
            .await;

        let (_dir, audio) = audio_file();
        let aligner = SubtitleAligner::new(AlignmentConfig::default(), Language::English)
            .with_transcriber(Arc::new(client(&server)));

        let alignment = aligner.align(SCRIPT, &audio, 6.0).await.unwrap();
        assert_eq!(alignment.strategy, "word");
        assert_eq!(alignment.cues.len(), 3);
    }

    #[tokio::test]
    async fn test_whisper_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Invalid file format.", "type": "invalid_request_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (_dir, audio) = audio_file();
        let result = client(&server).transcribe(&audio).await;

        match result {
            Err(ReelError::Api(message)) => assert!(message.contains("Invalid file format.")),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_whisper_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream unavailable"))
            .expect(3)
            .mount(&server)
            .await;

        let (_dir, audio) = audio_file();
        let result = client(&server).transcribe(&audio).await;
        assert!(matches!(result, Err(ReelError::Api(_))));
    }

    #[tokio::test]
    async fn test_whisper_failure_degrades_alignment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided.", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let (_dir, audio) = audio_file();
        let aligner = SubtitleAligner::new(AlignmentConfig::default(), Language::English)
            .with_transcriber(Arc::new(client(&server)));

        let alignment = aligner.align(SCRIPT, &audio, 6.0).await.unwrap();
        assert_eq!(alignment.strategy, "proportional");
    }
}
