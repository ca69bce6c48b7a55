use std::ops::Range;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::media::AudioSource;

use super::{frames_for, AudioBuffer};

/// Read position into the music track, in sample frames.
///
/// Successive segments continue where the previous one stopped, wrapping to
/// the start of the track when it runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicCursor {
    pub position: usize,
    pub track_frames: usize,
}

impl MusicCursor {
    pub fn new(track_frames: usize) -> Self {
        Self {
            position: 0,
            track_frames,
        }
    }

    /// Ranges of the track that, played back to back, last exactly `frames`.
    ///
    /// A request longer than what remains loops the track from the start.
    pub fn advance(&mut self, frames: usize) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        if self.track_frames == 0 {
            return spans;
        }

        let mut remaining = frames;
        while remaining > 0 {
            let available = self.track_frames - self.position;
            let take = remaining.min(available);
            spans.push(self.position..self.position + take);
            remaining -= take;
            self.position += take;
            if self.position >= self.track_frames {
                self.position = 0;
            }
        }

        spans
    }
}

/// Cuts a background-music bed into per-segment slices.
///
/// Music is optional: a mixer without a track hands out `None` for every
/// segment and the caller renders silence instead.
pub struct AudioMixer {
    track: Option<AudioBuffer>,
    cursor: MusicCursor,
    fade_max: f64,
    fade_fraction: f64,
}

impl AudioMixer {
    /// Decode `path` at the render sample format and scale it by `volume`.
    ///
    /// Any failure to read the file leaves the mixer silent.
    pub fn load(
        source: &dyn AudioSource,
        path: Option<&Path>,
        volume: f64,
        config: &RenderConfig,
    ) -> Self {
        let Some(path) = path else {
            debug!("No background music configured");
            return Self::silent(config);
        };

        match source.decode(path, config.audio_sample_rate, config.audio_channels) {
            Ok(track) => {
                info!(
                    "Loaded background music {} ({:.1}s)",
                    path.display(),
                    track.duration()
                );
                Self::from_buffer(track, volume, config)
            }
            Err(e) => {
                warn!(
                    "Background music {} could not be loaded, continuing without music: {}",
                    path.display(),
                    e
                );
                Self::silent(config)
            }
        }
    }

    pub fn from_buffer(mut track: AudioBuffer, volume: f64, config: &RenderConfig) -> Self {
        if track.is_empty() {
            warn!("Background music track is empty, continuing without music");
            return Self::silent(config);
        }

        let clamped = volume.clamp(0.0, 1.0);
        if clamped != volume {
            warn!("Music volume {} clamped to {}", volume, clamped);
        }
        track.apply_gain(clamped as f32);

        let cursor = MusicCursor::new(track.frames());
        Self {
            track: Some(track),
            cursor,
            fade_max: config.music_fade_max,
            fade_fraction: config.music_fade_fraction,
        }
    }

    pub fn silent(config: &RenderConfig) -> Self {
        Self {
            track: None,
            cursor: MusicCursor::new(0),
            fade_max: config.music_fade_max,
            fade_fraction: config.music_fade_fraction,
        }
    }

    pub fn has_music(&self) -> bool {
        self.track.is_some()
    }

    pub fn cursor(&self) -> MusicCursor {
        self.cursor
    }

    /// Next slice of music lasting exactly `duration` seconds, faded at the tail.
    pub fn next_segment(&mut self, duration: f64) -> Option<AudioBuffer> {
        let track = self.track.as_ref()?;
        let frames = frames_for(duration, track.sample_rate);
        let ch = track.channels as usize;

        let spans = self.cursor.advance(frames);
        let mut samples = Vec::with_capacity(frames * ch);
        for span in &spans {
            samples.extend_from_slice(&track.samples[span.start * ch..span.end * ch]);
        }

        if spans.len() > 1 {
            debug!(
                "Music looped {} times to fill {:.2}s segment",
                spans.len(),
                duration
            );
        }

        let mut segment = AudioBuffer::new(samples, track.sample_rate, track.channels);
        segment.fade_out(self.fade_max.min(self.fade_fraction * duration));
        Some(segment)
    }

    /// One slice per music-eligible segment, in order.
    pub fn segments(&mut self, durations: &[f64]) -> Vec<Option<AudioBuffer>> {
        durations.iter().map(|&d| self.next_segment(d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReelError, Result};

    struct FailingSource;

    impl AudioSource for FailingSource {
        fn duration(&self, _path: &Path) -> Result<f64> {
            Err(ReelError::Ffmpeg("unreadable".to_string()))
        }

        fn decode(&self, _path: &Path, _rate: u32, _channels: u16) -> Result<AudioBuffer> {
            Err(ReelError::Ffmpeg("unreadable".to_string()))
        }
    }

    fn ramp_track(seconds: usize, rate: u32) -> AudioBuffer {
        let frames = seconds * rate as usize;
        AudioBuffer::new((0..frames).map(|i| (i % 100) as f32 / 100.0).collect(), rate, 1)
    }

    #[test]
    fn test_cursor_trims_within_track() {
        let mut cursor = MusicCursor::new(100);
        assert_eq!(cursor.advance(30), vec![0..30]);
        assert_eq!(cursor.position, 30);
        assert_eq!(cursor.advance(30), vec![30..60]);
    }

    #[test]
    fn test_cursor_loops_short_track() {
        let mut cursor = MusicCursor::new(10);
        let spans = cursor.advance(25);
        assert_eq!(spans, vec![0..10, 0..10, 0..5]);
        assert_eq!(cursor.position, 5);
    }

    #[test]
    fn test_cursor_wraps_when_exhausted() {
        let mut cursor = MusicCursor::new(10);
        cursor.advance(10);
        assert_eq!(cursor.position, 0);
        assert_eq!(cursor.advance(4), vec![0..4]);
    }

    #[test]
    fn test_cursor_empty_track() {
        let mut cursor = MusicCursor::new(0);
        assert!(cursor.advance(10).is_empty());
    }

    #[test]
    fn test_segment_is_exact_length() {
        let config = RenderConfig::default();
        let mut mixer = AudioMixer::from_buffer(ramp_track(10, 100), 1.0, &config);

        for d in [3.0, 7.25, 25.0] {
            let seg = mixer.next_segment(d).unwrap();
            assert_eq!(seg.frames(), (d * 100.0) as usize);
        }
    }

    #[test]
    fn test_segment_tail_fades_to_silence() {
        let config = RenderConfig::default();
        let track = AudioBuffer::new(vec![0.5; 1000], 100, 1);
        let mut mixer = AudioMixer::from_buffer(track, 1.0, &config);

        let seg = mixer.next_segment(5.0).unwrap();
        // fade = min(2.0, 0.2 * 5.0) = 1.0s = 100 frames
        assert_eq!(seg.samples[399], 0.5);
        assert!(seg.samples[400] < 0.5);
        assert_eq!(*seg.samples.last().unwrap(), 0.0);
    }

    #[test]
    fn test_volume_applied_once() {
        let config = RenderConfig::default();
        let track = AudioBuffer::new(vec![1.0; 1000], 100, 1);
        let mut mixer = AudioMixer::from_buffer(track, 0.3, &config);

        let first = mixer.next_segment(2.0).unwrap();
        let second = mixer.next_segment(2.0).unwrap();
        assert!((first.samples[0] - 0.3).abs() < 1e-6);
        assert!((second.samples[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_unreadable_music_is_silent() {
        let config = RenderConfig::default();
        let mut mixer = AudioMixer::load(
            &FailingSource,
            Some(Path::new("/music/missing.mp3")),
            0.3,
            &config,
        );

        assert!(!mixer.has_music());
        assert_eq!(mixer.segments(&[4.0, 6.0]), vec![None, None]);
    }

    #[test]
    fn test_no_music_path_is_silent() {
        let config = RenderConfig::default();
        let mixer = AudioMixer::load(&FailingSource, None, 0.3, &config);
        assert!(!mixer.has_music());
    }
}
