pub mod mixer;
pub mod wav;

pub use mixer::{AudioMixer, MusicCursor};
pub use wav::{read_wav, write_wav};


/// Interleaved PCM samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Digital silence of the given length.
    pub fn silence(duration: f64, sample_rate: u32, channels: u16) -> Self {
        let frames = frames_for(duration, sample_rate);
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn apply_gain(&mut self, gain: f32) {
        for s in &mut self.samples {
            *s = (*s * gain).clamp(-1.0, 1.0);
        }
    }

    /// Linear ramp to silence over the last `seconds`.
    pub fn fade_out(&mut self, seconds: f64) {
        let total = self.frames();
        let fade_frames = frames_for(seconds, self.sample_rate).min(total);
        if fade_frames == 0 {
            return;
        }
        let ch = self.channels as usize;
        let first = total - fade_frames;
        for frame in first..total {
            let remaining = (total - frame - 1) as f32;
            let gain = remaining / fade_frames as f32;
            for s in &mut self.samples[frame * ch..(frame + 1) * ch] {
                *s *= gain;
            }
        }
    }
}

/// Frame count for a duration, rounded to the nearest frame.
pub fn frames_for(seconds: f64, sample_rate: u32) -> usize {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).round() as usize
}
