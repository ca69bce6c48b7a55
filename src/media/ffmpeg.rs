use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::audio::{read_wav, AudioBuffer};
use crate::config::{RenderConfig, SubtitleStyle};
use crate::error::{ReelError, Result};

use super::probe::{probe_duration, probe_has_audio};
use super::{AudioInput, AudioSource, Fades, FrameSink, Resolution, SegmentSpec, VideoTimeline};

/// Intermediates are re-encoded once more by the final pass, so they favour speed and quality.
const INTERMEDIATE_PRESET: &str = "veryfast";
const INTERMEDIATE_CRF: &str = "16";

fn run_ffmpeg(cmd: &mut Command, what: &str) -> Result<()> {
    debug!("Running {:?}", cmd);
    let output = cmd
        .output()
        .map_err(|e| ReelError::Ffmpeg(format!("Failed to run FFmpeg for {what}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ReelError::Ffmpeg(format!("{what}: {}", stderr_tail(&stderr))));
    }
    Ok(())
}

/// Last few lines of FFmpeg's stderr, which is where the actual error lives.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}

fn ffmpeg() -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);
    cmd
}

fn channel_layout(channels: u16) -> &'static str {
    match channels {
        1 => "mono",
        _ => "stereo",
    }
}

/// Escape a path for use as a quoted filter option value.
pub(crate) fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}

pub(crate) fn subtitles_filter(path: &Path, style: &SubtitleStyle) -> String {
    format!(
        "subtitles=filename='{}':force_style='{}'",
        escape_filter_path(path),
        style.force_style()
    )
}

/// `fade`/`afade` filters for a stretch of `duration` seconds.
pub(crate) fn fade_filters(fades: Fades, duration: f64) -> (Vec<String>, Vec<String>) {
    let mut video = Vec::new();
    let mut audio = Vec::new();

    let fade_in = fades.fade_in.min(duration);
    let fade_out = fades.fade_out.min(duration);

    if fade_in > 0.0 {
        video.push(format!("fade=t=in:st=0:d={:.3}", fade_in));
        audio.push(format!("afade=t=in:st=0:d={:.3}", fade_in));
    }
    if fade_out > 0.0 {
        let start = (duration - fade_out).max(0.0);
        video.push(format!("fade=t=out:st={:.3}:d={:.3}", start, fade_out));
        audio.push(format!("afade=t=out:st={:.3}:d={:.3}", start, fade_out));
    }

    (video, audio)
}

/// Concat demuxer list file body.
pub(crate) fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

/// [`AudioSource`] that converts through FFmpeg to PCM WAV and reads it back with hound.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegAudio;

impl AudioSource for FfmpegAudio {
    fn duration(&self, path: &Path) -> Result<f64> {
        probe_duration(path)
    }

    fn decode(&self, path: &Path, sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
        if !path.exists() {
            return Err(ReelError::FileNotFound(path.display().to_string()));
        }

        let temp = tempfile::Builder::new().prefix("bookreel-decode-").tempdir()?;
        let wav_path = temp.path().join("decoded.wav");

        run_ffmpeg(
            ffmpeg()
                .arg("-i")
                .arg(path)
                .args(["-vn", "-acodec", "pcm_s16le", "-ar"])
                .arg(sample_rate.to_string())
                .arg("-ac")
                .arg(channels.to_string())
                .arg(&wav_path),
            &format!("decoding {}", path.display()),
        )?;

        read_wav(&wav_path)
    }
}

/// [`VideoTimeline`] that shells out to FFmpeg.
pub struct FfmpegTimeline {
    config: RenderConfig,
    show_progress: bool,
}

impl FfmpegTimeline {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            config: config.clone(),
            show_progress: false,
        }
    }

    /// Show a progress bar during the final encode.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn resolution(&self) -> Resolution {
        self.config.resolution
    }

    fn silence_source(&self) -> String {
        format!(
            "anullsrc=r={}:cl={}",
            self.config.audio_sample_rate,
            channel_layout(self.config.audio_channels)
        )
    }

    fn audio_format_filter(&self) -> String {
        format!(
            "aformat=sample_rates={}:channel_layouts={}",
            self.config.audio_sample_rate,
            channel_layout(self.config.audio_channels)
        )
    }

    fn audio_codec_args(&self, cmd: &mut Command) {
        cmd.args(["-c:a", "aac", "-b:a"])
            .arg(&self.config.audio_bitrate)
            .arg("-ar")
            .arg(self.config.audio_sample_rate.to_string())
            .arg("-ac")
            .arg(self.config.audio_channels.to_string());
    }

    fn intermediate_codec_args(&self, cmd: &mut Command) {
        cmd.args([
            "-c:v",
            "libx264",
            "-preset",
            INTERMEDIATE_PRESET,
            "-crf",
            INTERMEDIATE_CRF,
            "-pix_fmt",
            "yuv420p",
            "-r",
        ])
        .arg(self.config.fps.to_string());
        self.audio_codec_args(cmd);
    }

    fn video_chain(&self, mut head: Vec<String>, fades: Fades, duration: f64) -> String {
        let (fade_v, _) = fade_filters(fades, duration);
        head.extend(fade_v);
        head.push("format=yuv420p".to_string());
        head.join(",")
    }

    fn audio_chain(&self, fades: Fades, duration: f64) -> String {
        let (_, fade_a) = fade_filters(fades, duration);
        let mut chain = vec![self.audio_format_filter(), "apad".to_string()];
        chain.extend(fade_a);
        chain.join(",")
    }

    fn run_with_progress(&self, cmd: &mut Command, total: f64, what: &str) -> Result<()> {
        let pb = ProgressBar::new(1000);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(what.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReelError::Ffmpeg(format!("Failed to spawn FFmpeg for {what}: {e}")))?;

        if let Some(stdout) = child.stdout.take() {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(|l| l.ok()) {
                if let Some(us) = line.strip_prefix("out_time_us=") {
                    if let Ok(time_us) = us.parse::<i64>() {
                        if time_us > 0 && total > 0.0 {
                            let progress = (time_us as f64 / 1_000_000.0 / total).min(1.0);
                            pb.set_position((progress * 1000.0) as u64);
                        }
                    }
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| ReelError::Ffmpeg(format!("Failed to wait for FFmpeg: {e}")))?;

        if !output.status.success() {
            pb.abandon_with_message(format!("{what} failed"));
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReelError::Ffmpeg(format!("{what}: {}", stderr_tail(&stderr))));
        }

        pb.finish_with_message(format!("✓ {what}"));
        Ok(())
    }
}

impl VideoTimeline for FfmpegTimeline {
    fn frame_sink(&self, spec: &SegmentSpec) -> Result<Box<dyn FrameSink>> {
        let res = self.resolution();
        let mut cmd = ffmpeg();
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(res.to_string())
            .arg("-r")
            .arg(self.config.fps.to_string())
            .args(["-i", "-"]);

        match &spec.audio {
            AudioInput::File(path) => {
                cmd.arg("-i").arg(path);
            }
            AudioInput::Silence => {
                cmd.args(["-f", "lavfi", "-i"]).arg(self.silence_source());
            }
        }

        let mut head = vec!["setsar=1".to_string()];
        if let Some(ref subs) = spec.subtitles {
            head.push(subtitles_filter(subs, &self.config.subtitle_style));
        }

        cmd.args(["-map", "0:v:0", "-map", "1:a:0", "-vf"])
            .arg(self.video_chain(head, spec.fades, spec.duration))
            .arg("-af")
            .arg(self.audio_chain(spec.fades, spec.duration))
            .arg("-t")
            .arg(format!("{:.3}", spec.duration));
        self.intermediate_codec_args(&mut cmd);
        cmd.arg(&spec.output);

        debug!("Spawning frame encoder {:?}", cmd);
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReelError::Ffmpeg(format!("Failed to spawn FFmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::Ffmpeg("FFmpeg stdin unavailable".to_string()))?;

        Ok(Box::new(FfmpegFrameSink {
            child: Some(child),
            stdin: Some(stdin),
            resolution: res,
            output: spec.output.clone(),
            frames: 0,
        }))
    }

    fn normalize_video(
        &self,
        input: &Path,
        output: &Path,
        duration: f64,
        fades: Fades,
    ) -> Result<()> {
        if !input.exists() {
            return Err(ReelError::FileNotFound(input.display().to_string()));
        }

        let res = self.resolution();
        let has_audio = self.has_audio(input)?;
        if !has_audio {
            warn!(
                "{} has no audio stream, padding with silence",
                input.display()
            );
        }

        let mut cmd = ffmpeg();
        cmd.arg("-i").arg(input);
        if !has_audio {
            cmd.args(["-f", "lavfi", "-i"]).arg(self.silence_source());
        }

        let head = vec![
            format!(
                "scale={}:{}:force_original_aspect_ratio=increase",
                res.width, res.height
            ),
            format!("crop={}:{}", res.width, res.height),
            "setsar=1".to_string(),
            format!("fps={}", self.config.fps),
        ];

        cmd.args(["-map", "0:v:0", "-map"])
            .arg(if has_audio { "0:a:0" } else { "1:a:0" })
            .arg("-vf")
            .arg(self.video_chain(head, fades, duration))
            .arg("-af")
            .arg(self.audio_chain(fades, duration))
            .arg("-t")
            .arg(format!("{:.3}", duration));
        self.intermediate_codec_args(&mut cmd);
        cmd.arg(output);

        run_ffmpeg(&mut cmd, &format!("normalizing {}", input.display()))
    }

    fn solid_card(&self, output: &Path, duration: f64, fade: f64) -> Result<()> {
        let res = self.resolution();
        let mut cmd = ffmpeg();
        cmd.args(["-f", "lavfi", "-i"])
            .arg(format!(
                "color=c={}:s={}:r={}:d={:.3}",
                self.config.transition_color, res, self.config.fps, duration
            ))
            .args(["-f", "lavfi", "-i"])
            .arg(self.silence_source())
            .args(["-map", "0:v:0", "-map", "1:a:0", "-vf"])
            .arg(self.video_chain(Vec::new(), Fades::new(fade, fade), duration))
            .arg("-t")
            .arg(format!("{:.3}", duration));
        self.intermediate_codec_args(&mut cmd);
        cmd.arg(output);

        run_ffmpeg(&mut cmd, "rendering transition card")
    }

    fn has_audio(&self, path: &Path) -> Result<bool> {
        probe_has_audio(path)
    }

    fn reattach_audio(&self, path: &Path, duration: f64) -> Result<()> {
        if self.has_audio(path)? {
            return Ok(());
        }

        warn!(
            "{} lost its audio track, re-attaching silence",
            path.display()
        );

        let patched = path.with_extension("reattached.mp4");
        let mut cmd = ffmpeg();
        cmd.arg("-i")
            .arg(path)
            .args(["-f", "lavfi", "-i"])
            .arg(self.silence_source())
            .args(["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy"])
            .arg("-t")
            .arg(format!("{:.3}", duration));
        self.audio_codec_args(&mut cmd);
        cmd.arg(&patched);

        run_ffmpeg(&mut cmd, &format!("re-attaching audio to {}", path.display()))?;
        std::fs::rename(&patched, path)?;
        Ok(())
    }

    fn concat_encode(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let first = inputs
            .first()
            .ok_or_else(|| ReelError::InvalidInput("Nothing to encode".to_string()))?;

        let list_dir = first.parent().unwrap_or_else(|| Path::new("."));
        let list_path = list_dir.join("concat.txt");
        std::fs::write(&list_path, concat_list(inputs))?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let res = self.resolution();
        let mut cmd = ffmpeg();
        cmd.args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c:v", "libx264", "-preset"])
            .arg(&self.config.preset)
            .arg("-b:v")
            .arg(&self.config.video_bitrate)
            .arg("-s")
            .arg(res.to_string())
            .arg("-r")
            .arg(self.config.fps.to_string())
            .args(["-pix_fmt", "yuv420p"]);
        self.audio_codec_args(&mut cmd);
        cmd.args(["-movflags", "+faststart"]);
        if self.show_progress {
            cmd.args(["-progress", "pipe:1", "-nostats"]);
        }
        cmd.arg(output);

        info!(
            "Encoding {} pieces to {} ({} @ {}fps, {} / {})",
            inputs.len(),
            output.display(),
            res,
            self.config.fps,
            self.config.video_bitrate,
            self.config.audio_bitrate
        );

        let result = if self.show_progress {
            let total: f64 = inputs
                .iter()
                .map(|p| probe_duration(p).unwrap_or(0.0))
                .sum();
            self.run_with_progress(&mut cmd, total, "Encoding final video")
        } else {
            run_ffmpeg(&mut cmd, "final encode")
        };
        result.map_err(|e| ReelError::Encode(e.to_string()))
    }
}

/// Raw RGB frames streamed into FFmpeg's stdin.
struct FfmpegFrameSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    resolution: Resolution,
    output: PathBuf,
    frames: usize,
}

impl FrameSink for FfmpegFrameSink {
    fn push(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.resolution.width, self.resolution.height) {
            return Err(ReelError::InvalidInput(format!(
                "Frame is {}x{}, encoder expects {}",
                frame.width(),
                frame.height(),
                self.resolution
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReelError::Ffmpeg("Frame encoder already closed".to_string()))?;

        stdin.write_all(frame.as_raw()).map_err(|e| {
            ReelError::Ffmpeg(format!(
                "Frame encoder for {} stopped accepting frames: {e}",
                self.output.display()
            ))
        })?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());

        let child = self
            .child
            .take()
            .ok_or_else(|| ReelError::Ffmpeg("Frame encoder already finished".to_string()))?;

        let output = child
            .wait_with_output()
            .map_err(|e| ReelError::Ffmpeg(format!("Failed to wait for FFmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReelError::Ffmpeg(format!(
                "encoding {}: {}",
                self.output.display(),
                stderr_tail(&stderr)
            )));
        }

        debug!("Encoded {} frames to {}", self.frames, self.output.display());
        Ok(())
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
