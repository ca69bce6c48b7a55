//! Sentence timing recovery for narration audio.
//!
//! Strategies run in order (word timestamps, then segment text, then a
//! character-weighted split of the audio length) and the first one that
//! places at least one sentence wins. Sentences a strategy could not place
//! are filled in proportionally between their placed neighbours.

use std::path::Path;
use std::sync::Arc;

use strsim::normalized_levenshtein;
use tracing::{debug, info, warn};

use super::postprocess::finalize_cues;
use super::script::{clean_script, normalize_text, normalize_word, normalize_words, split_sentences};
use super::SubtitleCue;
use crate::config::{AlignmentConfig, Language};
use crate::transcribe::{Transcriber, Transcript};

/// Per-sentence `(start, end)`, `None` where a strategy could not place the sentence.
pub type Spans = Vec<Option<(f64, f64)>>;

pub struct AlignmentInput<'a> {
    pub sentences: &'a [String],
    pub transcript: Option<&'a Transcript>,
    pub audio_duration: f64,
    pub config: &'a AlignmentConfig,
}

pub trait AlignmentStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when this strategy has nothing to work with or placed no sentence at all.
    fn align(&self, input: &AlignmentInput<'_>) -> Option<Spans>;
}

fn similar(a: &str, b: &str, threshold: f64) -> bool {
    a == b || normalized_levenshtein(a, b) >= threshold
}

fn any_placed(spans: &Spans) -> bool {
    spans.iter().any(Option::is_some)
}

/// Greedy match of sentence words against STT word timestamps.
pub struct WordAlignment;

impl AlignmentStrategy for WordAlignment {
    fn name(&self) -> &'static str {
        "word"
    }

    fn align(&self, input: &AlignmentInput<'_>) -> Option<Spans> {
        let transcript = input.transcript?;
        let words: Vec<(String, f64, f64)> = transcript
            .words
            .iter()
            .map(|w| (normalize_word(&w.word), w.start, w.end))
            .filter(|(w, _, _)| !w.is_empty())
            .collect();
        if words.is_empty() {
            return None;
        }

        let config = input.config;
        let mut cursor = 0;
        let mut spans = Vec::with_capacity(input.sentences.len());

        for sentence in input.sentences {
            let mut pos = cursor;
            let mut first = None;
            let mut last = None;

            for token in normalize_words(sentence) {
                let window_end = (pos + config.lookahead_words).min(words.len());
                let hit = (pos..window_end).find(|&j| similar(&token, &words[j].0, config.word_similarity));
                if let Some(j) = hit {
                    first.get_or_insert(j);
                    last = Some(j);
                    pos = j + 1;
                }
            }

            match (first, last) {
                (Some(f), Some(l)) => {
                    spans.push(Some((words[f].1, words[l].2)));
                    cursor = l + 1;
                }
                _ => spans.push(None),
            }
        }

        let lead = words[0].1;
        if lead > config.leading_offset_threshold {
            debug!("Shifting word timings back by {:.3}s leading offset", lead);
            for (start, end) in spans.iter_mut().flatten() {
                *start -= lead;
                *end -= lead;
            }
        }

        any_placed(&spans).then_some(spans)
    }
}

/// Whole-sentence match against runs of STT segments.
pub struct SegmentAlignment;

impl AlignmentStrategy for SegmentAlignment {
    fn name(&self) -> &'static str {
        "segment"
    }

    fn align(&self, input: &AlignmentInput<'_>) -> Option<Spans> {
        let transcript = input.transcript?;
        let segments: Vec<(String, f64, f64)> = transcript
            .segments
            .iter()
            .map(|s| (normalize_text(&s.text), s.start, s.end))
            .collect();
        if segments.is_empty() {
            return None;
        }

        let config = input.config;
        let max_span = config.max_segment_span.max(1);
        let mut cursor = 0;
        let mut spans = Vec::with_capacity(input.sentences.len());

        for sentence in input.sentences {
            let target = normalize_text(sentence);
            let mut best: Option<(f64, usize, usize)> = None;

            let last_start = (cursor + max_span).min(segments.len());
            for start in cursor..last_start {
                let mut combined = String::new();
                for end in start..(start + max_span).min(segments.len()) {
                    if !combined.is_empty() {
                        combined.push(' ');
                    }
                    combined.push_str(&segments[end].0);

                    let score = normalized_levenshtein(&target, &combined);
                    if best.map_or(true, |(b, _, _)| score > b) {
                        best = Some((score, start, end));
                    }
                }
            }

            match best {
                Some((score, start, end)) if score >= config.segment_similarity => {
                    spans.push(Some((segments[start].1, segments[end].2)));
                    cursor = end + 1;
                }
                _ => spans.push(None),
            }
        }

        any_placed(&spans).then_some(spans)
    }
}

/// Character-weighted split of the whole audio, clamped per sentence then rescaled to fit.
pub struct ProportionalAlignment;

impl ProportionalAlignment {
    pub fn durations(sentences: &[String], audio_duration: f64, config: &AlignmentConfig) -> Vec<f64> {
        let weights: Vec<f64> = sentences.iter().map(|s| s.chars().count() as f64).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || audio_duration <= 0.0 {
            return vec![0.0; sentences.len()];
        }

        let clamped: Vec<f64> = weights
            .iter()
            .map(|w| {
                (audio_duration * w / total)
                    .clamp(config.min_sentence_duration, config.max_sentence_duration)
            })
            .collect();
        let sum: f64 = clamped.iter().sum();
        clamped.iter().map(|d| d * audio_duration / sum).collect()
    }
}

impl AlignmentStrategy for ProportionalAlignment {
    fn name(&self) -> &'static str {
        "proportional"
    }

    fn align(&self, input: &AlignmentInput<'_>) -> Option<Spans> {
        if input.sentences.is_empty() || input.audio_duration <= 0.0 {
            return None;
        }

        let durations = Self::durations(input.sentences, input.audio_duration, input.config);
        let mut t = 0.0;
        let mut spans: Spans = durations
            .iter()
            .map(|d| {
                let span = (t, t + d);
                t += d;
                Some(span)
            })
            .collect();

        // Land exactly on the audio end despite float drift.
        if let Some(Some((_, end))) = spans.last_mut() {
            *end = input.audio_duration;
        }
        Some(spans)
    }
}

/// Place unmatched sentences proportionally inside the gap their neighbours leave.
fn fill_gaps(spans: &Spans, sentences: &[String], audio_duration: f64, min_len: f64) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(spans.len());
    let mut i = 0;

    while i < spans.len() {
        if let Some(span) = spans[i] {
            out.push(span);
            i += 1;
            continue;
        }

        let run_start = i;
        while i < spans.len() && spans[i].is_none() {
            i += 1;
        }
        let lo = out.last().map(|&(_, end)| end).unwrap_or(0.0);
        let hi = spans
            .get(i)
            .copied()
            .flatten()
            .map(|(start, _)| start)
            .unwrap_or(audio_duration);

        let run = &sentences[run_start..i];
        if hi - lo <= 0.0 {
            let mut t = lo;
            for _ in run {
                out.push((t, t + min_len));
                t += min_len;
            }
            continue;
        }

        let weights: Vec<f64> = run.iter().map(|s| s.chars().count().max(1) as f64).collect();
        let total: f64 = weights.iter().sum();
        let mut t = lo;
        for w in weights {
            let d = (hi - lo) * w / total;
            out.push((t, t + d));
            t += d;
        }
    }

    out
}

/// The recognizer's detected language, when it disagrees with `expected`.
fn detected_mismatch(transcript: &Transcript, expected: Language) -> Option<Language> {
    let detected: Language = transcript.language.as_deref()?.parse().ok()?;
    (detected != expected).then_some(detected)
}

/// Result of aligning one script.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub cues: Vec<SubtitleCue>,
    /// Name of the strategy that produced the timings.
    pub strategy: &'static str,
    /// Sentences that had to be filled in between placed neighbours.
    pub filled: usize,
}

pub struct SubtitleAligner {
    transcriber: Option<Arc<dyn Transcriber>>,
    strategies: Vec<Box<dyn AlignmentStrategy>>,
    config: AlignmentConfig,
    language: Language,
}

impl SubtitleAligner {
    /// Without a transcriber only the proportional strategy can place sentences.
    pub fn new(config: AlignmentConfig, language: Language) -> Self {
        Self {
            transcriber: None,
            strategies: vec![
                Box::new(WordAlignment),
                Box::new(SegmentAlignment),
                Box::new(ProportionalAlignment),
            ],
            config,
            language,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Replace the strategy chain.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn AlignmentStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn sentences(&self, script: &str) -> Vec<String> {
        split_sentences(&clean_script(script), self.language)
    }

    /// Transcribe `audio` and align `script` to it. Transcription problems only
    /// lower the strategy used; `None` means there was nothing to caption.
    pub async fn align(&self, script: &str, audio: &Path, audio_duration: f64) -> Option<Alignment> {
        let transcript = self.transcribe(audio).await;
        self.align_transcript(script, transcript.as_ref(), audio_duration)
    }

    async fn transcribe(&self, audio: &Path) -> Option<Transcript> {
        let transcriber = self.transcriber.as_ref()?;

        match tokio::time::timeout(self.config.stt_timeout(), transcriber.transcribe(audio)).await {
            Ok(Ok(transcript)) if transcript.is_empty() => {
                warn!("{} returned no words or segments", transcriber.name());
                None
            }
            Ok(Ok(transcript)) => {
                if let Some(detected) = detected_mismatch(&transcript, self.language) {
                    warn!(
                        "{} heard {} speech but the narration is {}, timings may be off",
                        transcriber.name(),
                        detected,
                        self.language
                    );
                }
                Some(transcript)
            }
            Ok(Err(e)) => {
                warn!("{} failed, falling back: {}", transcriber.name(), e);
                None
            }
            Err(_) => {
                warn!(
                    "{} timed out after {:?}, falling back",
                    transcriber.name(),
                    self.config.stt_timeout()
                );
                None
            }
        }
    }

    /// Align against an existing transcript (or none).
    pub fn align_transcript(
        &self,
        script: &str,
        transcript: Option<&Transcript>,
        audio_duration: f64,
    ) -> Option<Alignment> {
        let sentences = self.sentences(script);
        if sentences.is_empty() {
            debug!("Script has no sentences, skipping subtitles");
            return None;
        }
        if !audio_duration.is_finite() || audio_duration <= 0.0 {
            warn!("Narration duration {} is unusable, skipping subtitles", audio_duration);
            return None;
        }

        let input = AlignmentInput {
            sentences: &sentences,
            transcript,
            audio_duration,
            config: &self.config,
        };

        let (strategy, spans) = self
            .strategies
            .iter()
            .find_map(|s| s.align(&input).map(|spans| (s.name(), spans)))?;

        let filled = spans.iter().filter(|s| s.is_none()).count();
        let timed = fill_gaps(&spans, &sentences, audio_duration, self.config.min_cue_duration);

        let cues = timed
            .into_iter()
            .zip(sentences)
            .map(|((start, end), text)| SubtitleCue::new(start, end, text))
            .collect();
        let cues = finalize_cues(cues, audio_duration, &self.config);

        info!(
            "Aligned {} subtitle cues using {} timing ({} filled)",
            cues.len(),
            strategy,
            filled
        );

        Some(Alignment {
            cues,
            strategy,
            filled,
        })
    }
}
