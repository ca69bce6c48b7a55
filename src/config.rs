use crate::error::{ReelError, Result};
use crate::media::Resolution;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Narration language. Drives sentence splitting and the STT language hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Korean,
    Japanese,
    Chinese,
    Spanish,
    French,
    German,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Korean => "ko",
            Language::Japanese => "ja",
            Language::Chinese => "zh",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::German => "de",
        }
    }

    /// Whether sentences end with CJK full-width punctuation as well as `.!?`.
    pub fn uses_cjk_punctuation(&self) -> bool {
        matches!(
            self,
            Language::Korean | Language::Japanese | Language::Chinese
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "ko" | "korean" => Ok(Language::Korean),
            "ja" | "japanese" => Ok(Language::Japanese),
            "zh" | "chinese" => Ok(Language::Chinese),
            "es" | "spanish" => Ok(Language::Spanish),
            "fr" | "french" => Ok(Language::French),
            "de" | "german" => Ok(Language::German),
            _ => Err(format!("Unknown language: {}. Use an ISO code like 'en' or 'ko'", s)),
        }
    }
}

/// Tuning knobs for subtitle alignment.
///
/// The two similarity thresholds were tuned by ear on a handful of episodes
/// and should be recalibrated against labelled data before relying on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Minimum normalized Levenshtein similarity for a script word to match an STT word.
    pub word_similarity: f64,
    /// Minimum similarity for a sentence to match a run of STT segments.
    pub segment_similarity: f64,
    /// How many STT words ahead of the cursor a script word may match.
    pub lookahead_words: usize,
    /// Maximum number of consecutive STT segments combined for one sentence.
    pub max_segment_span: usize,
    /// First-word starts beyond this are treated as drift and subtracted.
    pub leading_offset_threshold: f64,
    /// Proportional fallback clamps each sentence into this window before rescaling.
    pub min_sentence_duration: f64,
    pub max_sentence_duration: f64,
    /// Shortest cue emitted after post-processing.
    pub min_cue_duration: f64,
    /// Overlaps up to this length are merged into one cue.
    pub merge_threshold: f64,
    /// Upper bound on a single STT request.
    pub stt_timeout_secs: u64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            word_similarity: 0.6,
            segment_similarity: 0.4,
            lookahead_words: 20,
            max_segment_span: 5,
            leading_offset_threshold: 0.1,
            min_sentence_duration: 2.0,
            max_sentence_duration: 8.0,
            min_cue_duration: 0.5,
            merge_threshold: 0.3,
            stt_timeout_secs: 300,
        }
    }
}

impl AlignmentConfig {
    pub fn stt_timeout(&self) -> Duration {
        Duration::from_secs(self.stt_timeout_secs)
    }
}

/// Burnt-in subtitle appearance (libass `force_style`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub font_name: Option<String>,
    pub font_size: u32,
    pub outline: u32,
    pub margin_v: u32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: None,
            font_size: 22,
            outline: 2,
            margin_v: 40,
        }
    }
}

impl SubtitleStyle {
    pub fn force_style(&self) -> String {
        let mut parts = vec![
            format!("FontSize={}", self.font_size),
            format!("Outline={}", self.outline),
            format!("MarginV={}", self.margin_v),
        ];
        if let Some(ref font) = self.font_name {
            parts.insert(0, format!("FontName={}", font));
        }
        parts.join(",")
    }
}

/// Everything the render path needs, passed explicitly to every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub resolution: Resolution,
    pub fps: u32,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub preset: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,

    /// Cross-fade length between slideshow images (capped per clip).
    pub image_fade: f64,
    pub min_image_duration: f64,
    pub max_image_duration: f64,
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub max_pool_size: usize,

    pub transition_duration: f64,
    pub transition_color: String,
    pub transition_fade: f64,
    /// Fade applied to the head and tail of every section at a boundary.
    pub section_fade: f64,

    pub music_volume: f64,
    pub music_fade_max: f64,
    pub music_fade_fraction: f64,

    pub subtitle_style: SubtitleStyle,
    pub alignment: AlignmentConfig,

    pub keep_temp_on_failure: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::FULL_HD,
            fps: 30,
            video_bitrate: "5000k".to_string(),
            audio_bitrate: "320k".to_string(),
            preset: "medium".to_string(),
            audio_sample_rate: 48000,
            audio_channels: 2,
            image_fade: 1.5,
            min_image_duration: 4.0,
            max_image_duration: 6.0,
            zoom_min: 1.0,
            zoom_max: 1.15,
            max_pool_size: 100,
            transition_duration: 1.0,
            transition_color: "black".to_string(),
            transition_fade: 0.5,
            section_fade: 0.5,
            music_volume: 0.3,
            music_fade_max: 2.0,
            music_fade_fraction: 0.2,
            subtitle_style: SubtitleStyle::default(),
            alignment: AlignmentConfig::default(),
            keep_temp_on_failure: true,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(ReelError::Config("Resolution must be non-zero".to_string()));
        }
        if self.resolution.width % 2 != 0 || self.resolution.height % 2 != 0 {
            return Err(ReelError::Config(format!(
                "Resolution {} must have even dimensions for yuv420p",
                self.resolution
            )));
        }
        if self.fps == 0 {
            return Err(ReelError::Config("FPS must be greater than 0".to_string()));
        }
        if self.min_image_duration <= 0.0 || self.min_image_duration > self.max_image_duration {
            return Err(ReelError::Config(format!(
                "Invalid image duration window [{}, {}]",
                self.min_image_duration, self.max_image_duration
            )));
        }
        if self.zoom_min < 1.0 || self.zoom_min > self.zoom_max {
            return Err(ReelError::Config(format!(
                "Invalid zoom range [{}, {}]",
                self.zoom_min, self.zoom_max
            )));
        }
        if self.max_pool_size == 0 {
            return Err(ReelError::Config(
                "Image pool size must be greater than 0".to_string(),
            ));
        }
        if !(1.0..=1.5).contains(&self.transition_duration) {
            return Err(ReelError::Config(format!(
                "Transition duration {}s outside [1.0, 1.5]",
                self.transition_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.music_volume) {
            return Err(ReelError::Config(format!(
                "Music volume {} outside [0, 1]",
                self.music_volume
            )));
        }
        if self.image_fade < 0.0 || self.section_fade < 0.0 || self.transition_fade < 0.0 {
            return Err(ReelError::Config("Fade durations cannot be negative".to_string()));
        }
        if self.audio_sample_rate == 0 || self.audio_channels == 0 {
            return Err(ReelError::Config("Audio format must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Fade used on each side of a transition card.
    pub fn transition_card_fade(&self) -> f64 {
        self.transition_fade.min(self.transition_duration / 2.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub render: RenderConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents)?;
            }
        }

        // Override with environment variables
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.openai_api_key = Some(key);
        }
        if let Ok(fps) = std::env::var("BOOKREEL_FPS") {
            if let Ok(f) = fps.parse() {
                config.render.fps = f;
            }
        }
        if let Ok(bitrate) = std::env::var("BOOKREEL_VIDEO_BITRATE") {
            config.render.video_bitrate = bitrate;
        }
        if let Ok(bitrate) = std::env::var("BOOKREEL_AUDIO_BITRATE") {
            config.render.audio_bitrate = bitrate;
        }
        if let Ok(preset) = std::env::var("BOOKREEL_PRESET") {
            config.render.preset = preset;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.render.validate()
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bookreel").join("config.toml"))
    }
}
