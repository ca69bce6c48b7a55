//! Realizes a composed [`Timeline`] through a [`VideoTimeline`] backend.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::compose::{PlacedSection, SectionAudio, SectionContent, Timeline, TimelineItem, TransitionCard};
use crate::config::RenderConfig;
use crate::error::{ReelError, Result};
use crate::media::{AudioInput, ImageSource, SegmentSpec, VideoTimeline};
use crate::sequence::SequenceRenderer;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    /// Intermediate files in concatenation order.
    pub pieces: Vec<PathBuf>,
    pub frames: usize,
    pub degraded_clips: usize,
}

pub struct Renderer<'a> {
    backend: &'a dyn VideoTimeline,
    images: &'a dyn ImageSource,
    config: &'a RenderConfig,
    work_dir: PathBuf,
    show_progress: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Renderer<'a> {
    pub fn new(
        backend: &'a dyn VideoTimeline,
        images: &'a dyn ImageSource,
        config: &'a RenderConfig,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            images,
            config,
            work_dir: work_dir.into(),
            show_progress: false,
            cancel: None,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Abort between timeline items once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(ReelError::Cancelled),
            _ => Ok(()),
        }
    }

    fn piece_path(&self, index: usize, label: &str) -> PathBuf {
        let label: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        self.work_dir.join(format!("{:03}_{}.mp4", index, label))
    }

    fn render_section(&self, index: usize, placed: &PlacedSection, report: &mut RenderReport) -> Result<PathBuf> {
        let section = &placed.section;
        let output = self.piece_path(index, &section.name);

        info!(
            "Rendering section {} '{}' ({}, {:.2}s)",
            placed.part_number, section.name, section.kind, section.duration
        );

        let audio = match &section.audio {
            SectionAudio::Narration(path) | SectionAudio::Music(path) => AudioInput::File(path.clone()),
            SectionAudio::Embedded | SectionAudio::Silence => AudioInput::Silence,
        };
        let spec = SegmentSpec {
            output: output.clone(),
            duration: section.duration,
            audio,
            subtitles: section.subtitles.clone(),
            fades: placed.fades,
        };
        let frames = SequenceRenderer::new(self.images, self.config).with_progress(self.show_progress);

        match &section.content {
            SectionContent::Slideshow(clips) => {
                let mut sink = self.backend.frame_sink(&spec)?;
                let stats = frames.render(clips, sink.as_mut())?;
                sink.finish()?;
                report.frames += stats.frames;
                report.degraded_clips += stats.degraded;
            }
            SectionContent::Still(image) => {
                let mut sink = self.backend.frame_sink(&spec)?;
                report.frames += frames.render_still(&image.path, section.duration, sink.as_mut())?;
                sink.finish()?;
            }
            SectionContent::External(video) => {
                self.backend
                    .normalize_video(&video.path, &output, section.duration, placed.fades)?;
            }
        }

        self.backend.reattach_audio(&output, section.duration)?;
        Ok(output)
    }

    fn render_transition(&self, index: usize, card: &TransitionCard) -> Result<PathBuf> {
        let output = self.piece_path(index, "transition");
        debug!("Rendering {:.2}s transition card at {:.2}s", card.duration, card.start);
        self.backend.solid_card(&output, card.duration, card.fade)?;
        Ok(output)
    }

    /// Render every item, join them into `output`, and confirm the file exists.
    pub fn render(&self, timeline: &Timeline, output: &Path) -> Result<RenderReport> {
        if timeline.items.is_empty() {
            return Err(ReelError::InvalidInput("Timeline is empty".to_string()));
        }
        std::fs::create_dir_all(&self.work_dir)?;

        let mut report = RenderReport::default();
        for (index, item) in timeline.items.iter().enumerate() {
            self.check_cancelled()?;
            let piece = match item {
                TimelineItem::Section(placed) => self.render_section(index, placed, &mut report)?,
                TimelineItem::Transition(card) => self.render_transition(index, card)?,
            };
            report.pieces.push(piece);
        }

        self.check_cancelled()?;
        self.backend.concat_encode(&report.pieces, output)?;

        if !output.exists() {
            return Err(ReelError::Encode(format!(
                "Encoder reported success but {} was not written",
                output.display()
            )));
        }

        info!("Rendered {} ({:.2}s)", output.display(), timeline.total_duration());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{Section, SectionComposer};
    use crate::media::{Fades, FrameSink, MediaAsset, Resolution};
    use crate::sequence::plan_sequence;
    use image::RgbImage;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct BlankImages;

    impl ImageSource for BlankImages {
        fn load(&self, _path: &Path) -> Result<RgbImage> {
            Ok(RgbImage::new(64, 36))
        }
    }

    struct CountingSink {
        output: PathBuf,
        frames: usize,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl FrameSink for CountingSink {
        fn push(&mut self, _frame: &RgbImage) -> Result<()> {
            self.frames += 1;
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            std::fs::write(&self.output, b"")?;
            self.log.borrow_mut().push(format!("frames:{}", self.frames));
            Ok(())
        }
    }

    /// Records calls and touches output files instead of encoding.
    #[derive(Default)]
    struct RecordingTimeline {
        log: Rc<RefCell<Vec<String>>>,
        skip_final_write: bool,
    }

    impl VideoTimeline for RecordingTimeline {
        fn frame_sink(&self, spec: &SegmentSpec) -> Result<Box<dyn FrameSink>> {
            self.log.borrow_mut().push(format!("sink:{:?}", spec.audio));
            Ok(Box::new(CountingSink {
                output: spec.output.clone(),
                frames: 0,
                log: Rc::clone(&self.log),
            }))
        }

        fn normalize_video(&self, _input: &Path, output: &Path, _duration: f64, _fades: Fades) -> Result<()> {
            self.log.borrow_mut().push("normalize".to_string());
            std::fs::write(output, b"")?;
            Ok(())
        }

        fn solid_card(&self, output: &Path, duration: f64, fade: f64) -> Result<()> {
            self.log.borrow_mut().push(format!("card:{duration}:{fade}"));
            std::fs::write(output, b"")?;
            Ok(())
        }

        fn has_audio(&self, _path: &Path) -> Result<bool> {
            Ok(true)
        }

        fn reattach_audio(&self, _path: &Path, _duration: f64) -> Result<()> {
            self.log.borrow_mut().push("reattach".to_string());
            Ok(())
        }

        fn concat_encode(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
            self.log.borrow_mut().push(format!("concat:{}", inputs.len()));
            if !self.skip_final_write {
                std::fs::write(output, b"")?;
            }
            Ok(())
        }
    }

    fn config() -> RenderConfig {
        RenderConfig {
            resolution: Resolution::new(32, 18),
            fps: 10,
            ..Default::default()
        }
    }

    fn timeline(config: &RenderConfig) -> Timeline {
        let clips = plan_sequence(&[PathBuf::from("a.jpg"), PathBuf::from("b.jpg")], 8.0, config).unwrap();
        let sections = vec![
            Section::summary("Summary", clips, "/narration.mp3"),
            Section::external("Analysis", MediaAsset::video("/analysis.mp4", 30.0, None)),
            Section::infographic("Chart", MediaAsset::image("/chart.png"), 3.0)
                .with_audio(SectionAudio::Music(PathBuf::from("/music_000.wav"))),
        ];
        SectionComposer::new(config).compose(sections).unwrap()
    }

    #[test]
    fn test_renders_items_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let backend = RecordingTimeline::default();
        let output = dir.path().join("episode.mp4");

        let report = Renderer::new(&backend, &BlankImages, &config, dir.path().join("work"))
            .render(&timeline(&config), &output)
            .unwrap();

        assert_eq!(report.pieces.len(), 5);
        assert_eq!(report.frames, 80 + 30);
        assert!(report.pieces[1].ends_with("001_transition.mp4"));

        let log = backend.log.borrow();
        assert_eq!(
            *log,
            vec![
                "sink:File(\"/narration.mp3\")",
                "frames:80",
                "reattach",
                "card:1:0.5",
                "normalize",
                "reattach",
                "card:1:0.5",
                "sink:File(\"/music_000.wav\")",
                "frames:30",
                "reattach",
                "concat:5",
            ]
        );
    }

    #[test]
    fn test_missing_output_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let backend = RecordingTimeline {
            skip_final_write: true,
            ..Default::default()
        };

        let result = Renderer::new(&backend, &BlankImages, &config, dir.path())
            .render(&timeline(&config), &dir.path().join("episode.mp4"));
        assert!(matches!(result, Err(ReelError::Encode(_))));
    }

    #[test]
    fn test_cancel_flag_stops_render() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let backend = RecordingTimeline::default();
        let flag = Arc::new(AtomicBool::new(true));

        let result = Renderer::new(&backend, &BlankImages, &config, dir.path())
            .with_cancel_flag(flag)
            .render(&timeline(&config), &dir.path().join("episode.mp4"));
        assert!(matches!(result, Err(ReelError::Cancelled)));
        assert!(backend.log.borrow().is_empty());
    }

    #[test]
    fn test_piece_names_are_filesystem_safe() {
        let config = config();
        let backend = RecordingTimeline::default();
        let renderer = Renderer::new(&backend, &BlankImages, &config, "/work");
        assert_eq!(
            renderer.piece_path(4, "Key Ideas: Part 1"),
            PathBuf::from("/work/004_key_ideas__part_1.mp4")
        );
    }
}
