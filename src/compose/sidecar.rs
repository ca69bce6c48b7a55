use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Timeline;
use crate::error::{ReelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipType {
    Video,
    Infographic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub part_number: usize,
    pub name: String,
    pub clip_type: ClipType,
    pub start: f64,
    pub duration: f64,
    pub section_end_time: f64,
}

/// Section boundaries of a rendered video, for chapter markers and descriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    pub sections: Vec<SectionRecord>,
    pub transition_duration: f64,
    pub total_duration: f64,
}

impl Sidecar {
    pub fn from_timeline(timeline: &Timeline) -> Self {
        let sections = timeline
            .sections()
            .map(|s| SectionRecord {
                part_number: s.part_number,
                name: s.section.name.clone(),
                clip_type: s.section.kind.clip_type(),
                start: s.start,
                duration: s.section.duration,
                section_end_time: s.end(),
            })
            .collect();

        Self {
            sections,
            transition_duration: timeline.transition_duration,
            total_duration: timeline.total_duration(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!("Wrote section sidecar to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReelError::FileNotFound(path.display().to_string()));
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// YouTube chapter lines, one per section. The first always reads `0:00`.
    pub fn chapters(&self) -> Vec<String> {
        self.sections
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let at = if i == 0 { 0.0 } else { s.start };
                format!("{} {}", format_chapter_time(at, self.total_duration), s.name)
            })
            .collect()
    }
}

/// `M:SS`, or `H:MM:SS` once the video passes an hour.
pub fn format_chapter_time(seconds: f64, total_duration: f64) -> String {
    let secs = seconds.max(0.0).floor() as u64;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if total_duration >= 3600.0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", h * 60 + m, s)
    }
}
