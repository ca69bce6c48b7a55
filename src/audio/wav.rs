use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::error::{ReelError, Result};

use super::AudioBuffer;

/// Read a WAV file into normalized `f32` samples.
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(ReelError::FileNotFound(path.display().to_string()));
    }

    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    debug!(
        "Reading WAV {}: {} Hz, {} channels, {} bits",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
}

/// Write 16-bit PCM.
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &buffer.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;

    debug!(
        "Wrote {:.2}s of audio to {}",
        buffer.duration(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bed.wav");

        let buffer = AudioBuffer::new(vec![0.0, 0.5, -0.5, 0.25], 8000, 2);
        write_wav(&path, &buffer).unwrap();

        let read = read_wav(&path).unwrap();
        assert_eq!(read.sample_rate, 8000);
        assert_eq!(read.channels, 2);
        assert_eq!(read.frames(), 2);
        assert!((read.samples[1] - 0.5).abs() < 1e-3);
        assert!((read.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_wav(Path::new("/nonexistent/music.wav"));
        assert!(matches!(result, Err(ReelError::FileNotFound(_))));
    }
}
