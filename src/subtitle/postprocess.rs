use tracing::debug;

use super::SubtitleCue;
use crate::config::AlignmentConfig;

/// Make raw cue timings safe to burn in.
///
/// Afterwards every cue lies in `[0, audio_duration]`, has `end > start`,
/// lasts at least `min_cue_duration` where the audio allows, and cues are
/// sorted with no overlap. Overlaps up to `merge_threshold` merge into one
/// cue; larger overlaps are trimmed. Cues separated by a gap, however small,
/// are never merged: the threshold applies to overlap only.
pub fn finalize_cues(
    cues: Vec<SubtitleCue>,
    audio_duration: f64,
    config: &AlignmentConfig,
) -> Vec<SubtitleCue> {
    let audio_duration = audio_duration.max(0.0);
    let min_len = config.min_cue_duration;

    let mut cues: Vec<SubtitleCue> = cues
        .into_iter()
        .filter(|c| c.start.is_finite() && c.end.is_finite())
        .map(|mut c| {
            c.start = c.start.clamp(0.0, audio_duration);
            c.end = c.end.clamp(0.0, audio_duration);
            if c.start > c.end {
                std::mem::swap(&mut c.start, &mut c.end);
            }
            if c.end - c.start < min_len {
                c.end = c.start + min_len;
                if c.end > audio_duration {
                    c.end = audio_duration;
                    c.start = (audio_duration - min_len).max(0.0);
                }
            }
            c
        })
        .collect();

    cues.sort_by(|a, b| a.start.total_cmp(&b.start));

    let before = cues.len();
    // Merge only overlaps of at most `merge_threshold`, or ones whose trimmed
    // remainder would be shorter than `min_len`. Touching or gapped cues stay apart.
    let mut merged: Vec<SubtitleCue> = Vec::with_capacity(cues.len());
    for mut cue in cues {
        let Some(prev) = merged.last_mut() else {
            merged.push(cue);
            continue;
        };

        let overlap = prev.end - cue.start;
        if overlap <= 0.0 {
            merged.push(cue);
            continue;
        }

        let trimmed_too_short = cue.end - prev.end < min_len;
        if overlap <= config.merge_threshold || trimmed_too_short {
            prev.end = prev.end.max(cue.end);
            prev.text = format!("{} {}", prev.text.trim(), cue.text.trim());
        } else {
            cue.start = prev.end;
            merged.push(cue);
        }
    }

    merged.retain(|c| c.end > c.start);
    for (i, cue) in merged.iter_mut().enumerate() {
        cue.index = i + 1;
    }

    if merged.len() != before {
        debug!("Cue cleanup: {} cues -> {}", before, merged.len());
    }
    merged
}
