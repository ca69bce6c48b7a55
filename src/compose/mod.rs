//! Sections, transition cards and the assembled timeline.

pub mod sidecar;

pub use sidecar::{format_chapter_time, ClipType, SectionRecord, Sidecar};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RenderConfig;
use crate::error::{ReelError, Result};
use crate::media::{Fades, MediaAsset};
use crate::sequence::TimedClip;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Narrated Ken Burns slideshow.
    Summary,
    /// Pre-rendered video inserted as-is apart from reframing.
    ExternalVideo,
    /// Still image held for a fixed time, optionally under music.
    Infographic,
}

impl SectionKind {
    pub fn clip_type(&self) -> ClipType {
        match self {
            SectionKind::Summary | SectionKind::ExternalVideo => ClipType::Video,
            SectionKind::Infographic => ClipType::Infographic,
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionKind::Summary => write!(f, "summary"),
            SectionKind::ExternalVideo => write!(f, "video"),
            SectionKind::Infographic => write!(f, "infographic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionContent {
    Slideshow(Vec<TimedClip>),
    External(MediaAsset),
    Still(MediaAsset),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionAudio {
    Narration(PathBuf),
    /// Keep the external video's own track.
    Embedded,
    /// A pre-cut music slice of exactly the section's length.
    Music(PathBuf),
    Silence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub kind: SectionKind,
    pub content: SectionContent,
    pub duration: f64,
    pub audio: SectionAudio,
    pub subtitles: Option<PathBuf>,
}

impl Section {
    /// Slideshow lasting as long as its clips.
    pub fn summary(name: impl Into<String>, clips: Vec<TimedClip>, narration: impl Into<PathBuf>) -> Self {
        let duration = clips.iter().map(|c| c.duration).sum();
        Self {
            name: name.into(),
            kind: SectionKind::Summary,
            content: SectionContent::Slideshow(clips),
            duration,
            audio: SectionAudio::Narration(narration.into()),
            subtitles: None,
        }
    }

    pub fn external(name: impl Into<String>, video: MediaAsset) -> Self {
        Self {
            name: name.into(),
            kind: SectionKind::ExternalVideo,
            duration: video.duration.unwrap_or(0.0),
            content: SectionContent::External(video),
            audio: SectionAudio::Embedded,
            subtitles: None,
        }
    }

    pub fn infographic(name: impl Into<String>, image: MediaAsset, duration: f64) -> Self {
        Self {
            name: name.into(),
            kind: SectionKind::Infographic,
            content: SectionContent::Still(image),
            duration,
            audio: SectionAudio::Silence,
            subtitles: None,
        }
    }

    pub fn with_audio(mut self, audio: SectionAudio) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_subtitles(mut self, subtitles: impl Into<PathBuf>) -> Self {
        self.subtitles = Some(subtitles.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ReelError::InvalidInput(format!(
                "Section '{}' has no usable duration ({})",
                self.name, self.duration
            )));
        }
        if let SectionContent::Slideshow(clips) = &self.content {
            if clips.is_empty() {
                return Err(ReelError::InvalidInput(format!(
                    "Section '{}' has no clips",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// A section at its resolved position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedSection {
    /// 1-based position among sections, transitions not counted.
    pub part_number: usize,
    pub start: f64,
    pub fades: Fades,
    pub section: Section,
}

impl PlacedSection {
    pub fn end(&self) -> f64 {
        self.start + self.section.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionCard {
    pub start: f64,
    pub duration: f64,
    /// Applied at both ends of the card.
    pub fade: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineItem {
    Section(PlacedSection),
    Transition(TransitionCard),
}

impl TimelineItem {
    pub fn start(&self) -> f64 {
        match self {
            TimelineItem::Section(s) => s.start,
            TimelineItem::Transition(t) => t.start,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            TimelineItem::Section(s) => s.section.duration,
            TimelineItem::Transition(t) => t.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub items: Vec<TimelineItem>,
    pub transition_duration: f64,
}

impl Timeline {
    pub fn sections(&self) -> impl Iterator<Item = &PlacedSection> {
        self.items.iter().filter_map(|item| match item {
            TimelineItem::Section(s) => Some(s),
            TimelineItem::Transition(_) => None,
        })
    }

    pub fn transitions(&self) -> impl Iterator<Item = &TransitionCard> {
        self.items.iter().filter_map(|item| match item {
            TimelineItem::Transition(t) => Some(t),
            TimelineItem::Section(_) => None,
        })
    }

    pub fn total_duration(&self) -> f64 {
        self.items.last().map(|i| i.start() + i.duration()).unwrap_or(0.0)
    }

    pub fn sidecar(&self) -> Sidecar {
        Sidecar::from_timeline(self)
    }
}

/// Joins sections with transition cards and boundary fades.
pub struct SectionComposer {
    transition_duration: f64,
    transition_fade: f64,
    section_fade: f64,
}

impl SectionComposer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            transition_duration: config.transition_duration,
            transition_fade: config.transition_card_fade(),
            section_fade: config.section_fade,
        }
    }

    /// Lay out `sections` in order with one card between each adjacent pair.
    ///
    /// Each section fades in unless it opens the video and fades out unless it
    /// closes it, on top of the card's own fades.
    pub fn compose(&self, sections: Vec<Section>) -> Result<Timeline> {
        if sections.is_empty() {
            return Err(ReelError::InvalidInput(
                "Nothing to compose: no sections".to_string(),
            ));
        }
        for section in &sections {
            section.validate()?;
        }

        let count = sections.len();
        let mut items = Vec::with_capacity(count * 2 - 1);
        let mut t = 0.0;

        for (i, section) in sections.into_iter().enumerate() {
            if i > 0 {
                items.push(TimelineItem::Transition(TransitionCard {
                    start: t,
                    duration: self.transition_duration,
                    fade: self.transition_fade,
                }));
                t += self.transition_duration;
            }

            let fade_in = if i > 0 { self.section_fade } else { 0.0 };
            let fade_out = if i + 1 < count { self.section_fade } else { 0.0 };
            let half = section.duration / 2.0;

            debug!(
                "Section {} '{}' ({}) at {:.2}s for {:.2}s",
                i + 1,
                section.name,
                section.kind,
                t,
                section.duration
            );

            let duration = section.duration;
            items.push(TimelineItem::Section(PlacedSection {
                part_number: i + 1,
                start: t,
                fades: Fades::new(fade_in.min(half), fade_out.min(half)),
                section,
            }));
            t += duration;
        }

        let timeline = Timeline {
            items,
            transition_duration: self.transition_duration,
        };
        info!(
            "Composed {} sections with {} transitions, {:.2}s total",
            count,
            count - 1,
            timeline.total_duration()
        );
        Ok(timeline)
    }
}
