// SRT subtitle format
use super::{SubtitleCue, SubtitleFormatter};

pub struct SrtFormatter;

impl SubtitleFormatter for SrtFormatter {
    fn format(&self, cues: &[SubtitleCue]) -> String {
        cues.iter()
            .map(|cue| {
                format!(
                    "{}\n{} --> {}\n{}\n",
                    cue.index,
                    format_timestamp(cue.start),
                    format_timestamp(cue.end),
                    cue.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn extension(&self) -> &'static str {
        "srt"
    }
}

pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1.5), "00:00:01,500");
        assert_eq!(format_timestamp(3661.123), "01:01:01,123");
        assert_eq!(format_timestamp(-0.2), "00:00:00,000");
        assert_eq!(format_timestamp(59.9996), "00:01:00,000");
    }

    #[test]
    fn test_srt_format() {
        let cues = vec![
            SubtitleCue {
                index: 1,
                start: 1.5,
                end: 4.0,
                text: "Hello, world!".to_string(),
            },
            SubtitleCue {
                index: 2,
                start: 4.5,
                end: 7.0,
                text: "This is a test.".to_string(),
            },
        ];

        let output = SrtFormatter.format(&cues);

        assert!(output.contains("1\n00:00:01,500 --> 00:00:04,000\nHello, world!"));
        assert!(output.contains("2\n00:00:04,500 --> 00:00:07,000\nThis is a test."));
    }
}
