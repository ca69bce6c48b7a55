use crate::audio::{write_wav, AudioMixer};
use crate::compose::{Section, SectionAudio, SectionComposer, Sidecar};
use crate::config::{Config, Language};
use crate::error::{ReelError, Result};
use crate::media::{
    check_ffmpeg, check_ffprobe, probe_duration, probe_resolution, FfmpegAudio, FfmpegTimeline,
    ImageCrate, MediaAsset,
};
use crate::render::Renderer;
use crate::sequence::plan_sequence;
use crate::subtitle::{SrtFormatter, SubtitleAligner, SubtitleFormatter};
use crate::transcribe::WhisperClient;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

fn default_true() -> bool {
    true
}

fn default_parts() -> Vec<PartSpec> {
    vec![PartSpec::Summary { title: None }]
}

/// Narrated slideshow inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySpec {
    pub narration: PathBuf,
    /// Narration text used for subtitles.
    #[serde(default)]
    pub script: Option<PathBuf>,
    #[serde(default)]
    pub images: Vec<PathBuf>,
    /// Directory scanned (sorted by name) for additional images.
    #[serde(default)]
    pub images_dir: Option<PathBuf>,
}

/// One section of the episode, in playback order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartSpec {
    Summary {
        #[serde(default)]
        title: Option<String>,
    },
    Video {
        path: PathBuf,
        #[serde(default)]
        title: Option<String>,
    },
    Infographic {
        image: PathBuf,
        duration: f64,
        #[serde(default)]
        title: Option<String>,
    },
}

/// Episode job description, read from TOML. `[summary]` may be omitted when
/// no summary part is listed.
///
/// ```toml
/// output = "out/dune.mp4"
/// language = "english"
/// music = "assets/bed.mp3"
///
/// [summary]
/// narration = "tts/dune.mp3"
/// script = "scripts/dune.txt"
/// images_dir = "images/dune"
///
/// [[parts]]
/// kind = "summary"
///
/// [[parts]]
/// kind = "infographic"
/// image = "charts/dune.png"
/// duration = 12.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeManifest {
    pub output: PathBuf,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub music: Option<PathBuf>,
    #[serde(default)]
    pub music_volume: Option<f64>,
    #[serde(default = "default_true")]
    pub subtitles: bool,
    #[serde(default)]
    pub summary: Option<SummarySpec>,
    #[serde(default = "default_parts")]
    pub parts: Vec<PartSpec>,
}

impl EpisodeManifest {
    /// Parse a manifest file. Relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReelError::FileNotFound(path.display().to_string()));
        }
        let contents = fs::read_to_string(path)?;
        let mut manifest: EpisodeManifest = toml::from_str(&contents)?;
        if let Some(base) = path.parent() {
            manifest.resolve_paths(base);
        }
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        resolve(&mut self.output);
        if let Some(music) = self.music.as_mut() {
            resolve(music);
        }
        if let Some(summary) = self.summary.as_mut() {
            resolve(&mut summary.narration);
            if let Some(script) = summary.script.as_mut() {
                resolve(script);
            }
            if let Some(dir) = summary.images_dir.as_mut() {
                resolve(dir);
            }
            summary.images.iter_mut().for_each(resolve);
        }
        for part in &mut self.parts {
            match part {
                PartSpec::Summary { .. } => {}
                PartSpec::Video { path, .. } => resolve(path),
                PartSpec::Infographic { image, .. } => resolve(image),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.parts.is_empty() {
            return Err(ReelError::InvalidInput(
                "Manifest lists no parts, nothing to render".to_string(),
            ));
        }
        let summaries = self
            .parts
            .iter()
            .filter(|p| matches!(p, PartSpec::Summary { .. }))
            .count();
        if summaries > 1 {
            return Err(ReelError::InvalidInput(
                "Manifest lists the summary part more than once".to_string(),
            ));
        }
        if summaries == 1 {
            self.summary_spec()?;
        }
        for part in &self.parts {
            if let PartSpec::Infographic { image, duration, .. } = part {
                if !duration.is_finite() || *duration <= 0.0 {
                    return Err(ReelError::InvalidInput(format!(
                        "Infographic {} needs a positive duration",
                        image.display()
                    )));
                }
            }
        }
        if let Some(volume) = self.music_volume {
            if !(0.0..=1.0).contains(&volume) {
                return Err(ReelError::InvalidInput(format!(
                    "Music volume {} outside [0, 1]",
                    volume
                )));
            }
        }
        Ok(())
    }

    fn has_summary(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, PartSpec::Summary { .. }))
    }

    fn summary_spec(&self) -> Result<&SummarySpec> {
        self.summary.as_ref().ok_or_else(|| {
            ReelError::InvalidInput(
                "Manifest has a summary part but no [summary] table".to_string(),
            )
        })
    }
}

/// Listed images first, then the images directory sorted by file name.
pub fn collect_images(summary: &SummarySpec) -> Result<Vec<PathBuf>> {
    let mut images = summary.images.clone();

    if let Some(dir) = &summary.images_dir {
        if !dir.is_dir() {
            return Err(ReelError::FileNotFound(dir.display().to_string()));
        }
        let mut found: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        found.sort();
        images.extend(found);
    }

    Ok(images)
}

pub fn sidecar_path(output: &Path) -> PathBuf {
    output.with_extension("sections.json")
}

pub fn subtitles_path(output: &Path) -> PathBuf {
    output.with_extension("srt")
}

/// Per-run switches set from the command line.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Replaces the manifest's output path.
    pub output: Option<PathBuf>,
    /// Send narration to speech-to-text for subtitle timing.
    pub use_stt: bool,
    pub show_progress: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output: None,
            use_stt: true,
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub alignment_time: Duration,
    pub render_time: Duration,
    pub narration_duration: f64,
    pub video_duration: f64,
    pub sections: usize,
    pub clips: usize,
    pub frames: usize,
    pub degraded_clips: usize,
    pub subtitle_cues: usize,
    /// Timing strategy that placed the subtitles.
    pub alignment: Option<String>,
}

#[derive(Debug)]
pub struct PipelineResult {
    pub output_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub subtitles_path: Option<PathBuf>,
    pub sidecar: Sidecar,
    pub stats: PipelineStats,
}

/// Owns the run's scratch directory; keeps it for inspection unless the run succeeded.
struct TempCleanupGuard {
    temp_dir: Option<TempDir>,
    keep_on_failure: bool,
    succeeded: bool,
    cancelled: Arc<AtomicBool>,
}

impl TempCleanupGuard {
    fn path(&self) -> Result<&Path> {
        self.temp_dir
            .as_ref()
            .map(|d| d.path())
            .ok_or_else(|| ReelError::InvalidInput("Temp directory already released".to_string()))
    }
}

impl Drop for TempCleanupGuard {
    fn drop(&mut self) {
        let Some(temp_dir) = self.temp_dir.take() else {
            return;
        };

        if self.succeeded {
            debug!("Cleaning up temp directory: {:?}", temp_dir.path());
        } else if self.cancelled.load(Ordering::Relaxed) {
            warn!("Pipeline cancelled, cleaning up temp files: {:?}", temp_dir.path());
        } else if self.keep_on_failure {
            let kept = temp_dir.keep();
            warn!("Render failed, intermediate files kept in {:?}", kept);
        }
    }
}

fn spinner(show: bool, message: &str) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(ReelError::Cancelled);
    }
    Ok(())
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    error!("{} not found: {}", what, path.display());
    Err(ReelError::FileNotFound(path.display().to_string()))
}

fn part_title(title: &Option<String>, path: &Path, fallback: &str) -> String {
    title.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| fallback.to_string())
    })
}

/// Render one episode end to end.
pub async fn render_episode(
    manifest: &EpisodeManifest,
    config: &Config,
    options: PipelineOptions,
) -> Result<PipelineResult> {
    let cancelled = Arc::new(AtomicBool::new(false));
    render_episode_with_cancel(manifest, config, options, cancelled).await
}

/// Render one episode, stopping between stages once `cancelled` is set.
pub async fn render_episode_with_cancel(
    manifest: &EpisodeManifest,
    config: &Config,
    options: PipelineOptions,
    cancelled: Arc<AtomicBool>,
) -> Result<PipelineResult> {
    let start_time = Instant::now();
    let render = &config.render;
    render.validate()?;
    manifest.validate()?;

    let output = options.output.clone().unwrap_or_else(|| manifest.output.clone());

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 1: Preflight
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 1/5: Checking inputs");

    check_ffmpeg()
        .and_then(|_| check_ffprobe())
        .map_err(|_| {
            ReelError::Ffmpeg(
                "FFmpeg/ffprobe not found. Install it with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)".to_string(),
            )
        })
        .inspect_err(|e| error!("Preflight failed: {}", e))?;

    let summary = if manifest.has_summary() {
        Some(manifest.summary_spec()?)
    } else {
        None
    };

    let narration_duration = match summary {
        Some(summary) => {
            require_file(&summary.narration, "Narration audio")?;
            probe_duration(&summary.narration).inspect_err(|e| {
                error!("Narration audio is unreadable: {}", e);
            })?
        }
        None => 0.0,
    };

    let images = if let Some(summary) = summary {
        let images = collect_images(summary)?;
        if images.is_empty() {
            error!("No images found for the summary slideshow");
            return Err(ReelError::InvalidInput(
                "Summary slideshow has no images".to_string(),
            ));
        }
        images
    } else {
        Vec::new()
    };

    for part in &manifest.parts {
        match part {
            PartSpec::Video { path, .. } => require_file(path, "External video")?,
            PartSpec::Infographic { image, .. } if !image.exists() => {
                warn!(
                    "Infographic image {} not found, it will render as a black frame",
                    image.display()
                );
            }
            _ => {}
        }
    }

    let mut guard = TempCleanupGuard {
        temp_dir: Some(tempfile::Builder::new().prefix("bookreel-").tempdir()?),
        keep_on_failure: render.keep_temp_on_failure,
        succeeded: false,
        cancelled: cancelled.clone(),
    };
    let temp_path = guard.path()?.to_path_buf();
    debug!("Using temp directory: {:?}", temp_path);

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 2: Subtitle alignment
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 2/5: Aligning subtitles");
    let alignment_start = Instant::now();

    let script = match summary.filter(|_| manifest.subtitles).map(|s| &s.script) {
        Some(Some(path)) => match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(
                    "Narration script {} unreadable, rendering without subtitles: {}",
                    path.display(),
                    e
                );
                None
            }
        },
        Some(None) => {
            debug!("No narration script given, rendering without subtitles");
            None
        }
        None => None,
    };

    let alignment = match (script, summary) {
        (Some(text), Some(summary)) => {
            let mut aligner = SubtitleAligner::new(render.alignment.clone(), manifest.language);
            match (&config.openai_api_key, options.use_stt) {
                (Some(key), true) => {
                    aligner = aligner.with_transcriber(Arc::new(
                        WhisperClient::new(key.clone()).with_language(manifest.language.code()),
                    ));
                }
                (None, true) => {
                    warn!("OPENAI_API_KEY not set, subtitles will use proportional timing");
                }
                _ => {}
            }

            let pb = spinner(options.show_progress, "Aligning subtitles...");
            let alignment = aligner
                .align(&text, &summary.narration, narration_duration)
                .await;
            if let Some(pb) = pb {
                match &alignment {
                    Some(a) => pb.finish_with_message(format!(
                        "✓ {} cues ({} timing)",
                        a.cues.len(),
                        a.strategy
                    )),
                    None => pb.finish_with_message("No subtitles"),
                }
            }
            alignment
        }
        _ => None,
    };

    let burn_in = match &alignment {
        Some(a) if !a.cues.is_empty() => {
            let path = temp_path.join(format!("summary.{}", SrtFormatter.extension()));
            fs::write(&path, SrtFormatter.format(&a.cues))?;
            Some(path)
        }
        _ => None,
    };
    let alignment_time = alignment_start.elapsed();

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 3: Sections
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 3/5: Planning sections");

    let volume = manifest.music_volume.unwrap_or(render.music_volume);
    let mut mixer = AudioMixer::load(&FfmpegAudio, manifest.music.as_deref(), volume, render);

    let mut sections = Vec::with_capacity(manifest.parts.len());
    let mut clip_count = 0;
    for (i, part) in manifest.parts.iter().enumerate() {
        let section = match part {
            PartSpec::Summary { title } => {
                let clips = plan_sequence(&images, narration_duration, render)?;
                clip_count += clips.len();
                info!(
                    "Summary: {} clips from {} images over {:.1}s",
                    clips.len(),
                    images.len(),
                    narration_duration
                );
                let section = Section::summary(
                    title.clone().unwrap_or_else(|| "Summary".to_string()),
                    clips,
                    &manifest.summary_spec()?.narration,
                );
                match &burn_in {
                    Some(srt) => section.with_subtitles(srt),
                    None => section,
                }
            }
            PartSpec::Video { path, title } => {
                let duration = probe_duration(path).inspect_err(|e| {
                    error!("External video {} is unreadable: {}", path.display(), e);
                })?;
                let resolution = probe_resolution(path).ok();
                if resolution.is_some_and(|r| r != render.resolution) {
                    debug!("{} will be reframed to {}", path.display(), render.resolution);
                }
                Section::external(
                    part_title(title, path, "Video"),
                    MediaAsset::video(path, duration, resolution),
                )
            }
            PartSpec::Infographic {
                image,
                duration,
                title,
            } => {
                let section = Section::infographic(
                    part_title(title, image, "Infographic"),
                    MediaAsset::image(image),
                    *duration,
                );
                match mixer.next_segment(*duration) {
                    Some(slice) => {
                        let path = temp_path.join(format!("music_{:03}.wav", i));
                        write_wav(&path, &slice)?;
                        section.with_audio(SectionAudio::Music(path))
                    }
                    None => section,
                }
            }
        };
        sections.push(section);
    }

    let timeline = SectionComposer::new(render)
        .compose(sections)
        .inspect_err(|e| error!("Section composition failed: {}", e))?;

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 4: Render and encode
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 4/5: Rendering {:.1}s video", timeline.total_duration());
    let render_start = Instant::now();

    let backend = FfmpegTimeline::new(render).with_progress(options.show_progress);
    let report = Renderer::new(&backend, &ImageCrate, render, temp_path.join("pieces"))
        .with_progress(options.show_progress)
        .with_cancel_flag(cancelled.clone())
        .render(&timeline, &output)
        .inspect_err(|e| error!("Render failed: {}", e))?;
    let render_time = render_start.elapsed();

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 5: Sidecars
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 5/5: Writing sidecars");

    let sidecar = timeline.sidecar();
    let sidecar_file = sidecar_path(&output);
    sidecar.write(&sidecar_file).inspect_err(|e| {
        error!("Failed to write sidecar {}: {}", sidecar_file.display(), e);
    })?;

    let subtitles_file = match &alignment {
        Some(a) if !a.cues.is_empty() => {
            let path = subtitles_path(&output);
            fs::write(&path, SrtFormatter.format(&a.cues))?;
            Some(path)
        }
        _ => None,
    };

    guard.succeeded = true;

    let stats = PipelineStats {
        total_time: start_time.elapsed(),
        alignment_time,
        render_time,
        narration_duration,
        video_duration: timeline.total_duration(),
        sections: timeline.sections().count(),
        clips: clip_count,
        frames: report.frames,
        degraded_clips: report.degraded_clips,
        subtitle_cues: alignment.as_ref().map(|a| a.cues.len()).unwrap_or(0),
        alignment: alignment.as_ref().map(|a| a.strategy.to_string()),
    };

    Ok(PipelineResult {
        output_path: output,
        sidecar_path: sidecar_file,
        subtitles_path: subtitles_file,
        sidecar,
        stats,
    })
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                        Episode Render Complete                 ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", result.output_path.display());
    println!("  Sections:   {}", result.sidecar_path.display());
    if let Some(ref srt) = result.subtitles_path {
        println!("  Subtitles:  {}", srt.display());
    }
    println!(
        "  Duration:   {:.1}s video ({:.1}s narration)",
        result.stats.video_duration, result.stats.narration_duration
    );
    println!(
        "  Content:    {} sections, {} clips, {} frames",
        result.stats.sections, result.stats.clips, result.stats.frames
    );
    match result.stats.alignment {
        Some(ref strategy) => println!(
            "  Captions:   {} cues ({} timing)",
            result.stats.subtitle_cues, strategy
        ),
        None => println!("  Captions:   none"),
    }
    if result.stats.degraded_clips > 0 {
        println!(
            "  Warning:    {} clips fell back to static frames",
            result.stats.degraded_clips
        );
    }
    println!();
    println!("  Chapters:");
    for line in result.sidecar.chapters() {
        println!("    {}", line);
    }
    println!();
    println!("  Timing:");
    println!(
        "    Align:       {:.2}s",
        result.stats.alignment_time.as_secs_f64()
    );
    println!(
        "    Render:      {:.2}s",
        result.stats.render_time.as_secs_f64()
    );
    println!(
        "    Total:       {:.2}s",
        result.stats.total_time.as_secs_f64()
    );
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
output = "out/dune.mp4"
language = "korean"
music = "assets/bed.mp3"
music_volume = 0.25

[summary]
narration = "tts/dune.mp3"
script = "scripts/dune.txt"
images = ["covers/front.jpg"]

[[parts]]
kind = "summary"
title = "Dune in ten minutes"

[[parts]]
kind = "video"
path = "/videos/analysis.mp4"

[[parts]]
kind = "infographic"
image = "charts/houses.png"
duration = 12.5
"#;

    #[test]
    fn test_manifest_parsing() {
        let manifest: EpisodeManifest = toml::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.language, Language::Korean);
        assert_eq!(manifest.music_volume, Some(0.25));
        assert!(manifest.subtitles);
        assert_eq!(manifest.parts.len(), 3);
        assert_eq!(
            manifest.parts[2],
            PartSpec::Infographic {
                image: PathBuf::from("charts/houses.png"),
                duration: 12.5,
                title: None,
            }
        );
        manifest.validate().unwrap();
    }

    #[test]
    fn test_manifest_defaults_to_summary_only() {
        let manifest: EpisodeManifest = toml::from_str(
            r#"
output = "a.mp4"
[summary]
narration = "a.mp3"
"#,
        )
        .unwrap();
        assert_eq!(manifest.parts, vec![PartSpec::Summary { title: None }]);
        assert_eq!(manifest.language, Language::English);
    }

    #[test]
    fn test_resolve_paths_relative_to_manifest() {
        let mut manifest: EpisodeManifest = toml::from_str(MANIFEST).unwrap();
        manifest.resolve_paths(Path::new("/jobs/dune"));

        assert_eq!(manifest.output, PathBuf::from("/jobs/dune/out/dune.mp4"));
        let summary = manifest.summary.as_ref().unwrap();
        assert_eq!(summary.images[0], PathBuf::from("/jobs/dune/covers/front.jpg"));
        assert_eq!(summary.narration, PathBuf::from("/jobs/dune/tts/dune.mp3"));
        // Absolute paths are left alone.
        assert_eq!(
            manifest.parts[1],
            PartSpec::Video {
                path: PathBuf::from("/videos/analysis.mp4"),
                title: None,
            }
        );
    }

    #[test]
    fn test_validate_rejects_empty_parts() {
        let mut manifest: EpisodeManifest = toml::from_str(MANIFEST).unwrap();
        manifest.parts.clear();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_summary() {
        let mut manifest: EpisodeManifest = toml::from_str(MANIFEST).unwrap();
        manifest.parts.push(PartSpec::Summary { title: None });
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_summary_table_optional_without_summary_part() {
        let manifest: EpisodeManifest = toml::from_str(
            r#"
output = "a.mp4"
[[parts]]
kind = "infographic"
image = "chart.png"
duration = 5.0
"#,
        )
        .unwrap();
        assert!(manifest.summary.is_none());
        manifest.validate().unwrap();
    }

    #[test]
    fn test_summary_part_requires_summary_table() {
        let manifest: EpisodeManifest = toml::from_str(
            r#"
output = "a.mp4"
[[parts]]
kind = "summary"
"#,
        )
        .unwrap();
        assert!(matches!(manifest.validate(), Err(ReelError::InvalidInput(_))));

        // Default parts are a lone summary, so a bare manifest is rejected too.
        let bare: EpisodeManifest = toml::from_str(r#"output = "a.mp4""#).unwrap();
        assert!(bare.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_infographic_duration() {
        let mut manifest: EpisodeManifest = toml::from_str(MANIFEST).unwrap();
        manifest.parts.push(PartSpec::Infographic {
            image: PathBuf::from("x.png"),
            duration: 0.0,
            title: None,
        });
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_collect_images_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.PNG", "notes.txt", "c.webp"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let summary = SummarySpec {
            narration: PathBuf::from("n.mp3"),
            script: None,
            images: vec![PathBuf::from("/first.jpg")],
            images_dir: Some(dir.path().to_path_buf()),
        };

        let images = collect_images(&summary).unwrap();
        let names: Vec<String> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["first.jpg", "a.PNG", "b.jpg", "c.webp"]);
    }

    #[test]
    fn test_sidecar_and_subtitle_paths() {
        let output = Path::new("/out/dune.mp4");
        assert_eq!(sidecar_path(output), PathBuf::from("/out/dune.sections.json"));
        assert_eq!(subtitles_path(output), PathBuf::from("/out/dune.srt"));
    }

    #[test]
    fn test_part_title_fallbacks() {
        assert_eq!(part_title(&None, Path::new("/v/analysis.mp4"), "Video"), "analysis");
        assert_eq!(
            part_title(&Some("Deep dive".to_string()), Path::new("/v/a.mp4"), "Video"),
            "Deep dive"
        );
    }

    #[test]
    fn test_pipeline_options_default() {
        let options = PipelineOptions::default();
        assert!(options.use_stt);
        assert!(options.show_progress);
        assert!(options.output.is_none());
    }
}
