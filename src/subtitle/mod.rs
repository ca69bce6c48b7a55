pub mod align;
pub mod postprocess;
pub mod script;
pub mod srt;

pub use align::{
    Alignment, AlignmentInput, AlignmentStrategy, ProportionalAlignment, SegmentAlignment,
    SubtitleAligner, WordAlignment,
};
pub use postprocess::finalize_cues;
pub use script::{clean_script, split_sentences};
pub use srt::SrtFormatter;

use serde::{Deserialize, Serialize};

/// One on-screen caption, times in seconds relative to the narration audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            index: 0,
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

pub trait SubtitleFormatter {
    fn format(&self, cues: &[SubtitleCue]) -> String;
    fn extension(&self) -> &'static str;
}
