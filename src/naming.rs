//! Deterministic output file names.
//!
//! Every name is `f_{label}_...` where the label identifies the source, so
//! frames from several videos can share one output directory. Numbers are
//! zero-padded so a plain lexicographic sort of the directory matches
//! stream order.

use std::path::Path;

use crate::{configuration::OutputFormat, decoder::FramePosition};

/// How written frames are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameNaming {
    /// `f_{label}_{sequence:010}.{ext}`, sequence starting at 1.
    #[default]
    Sequence,
    /// `f_{label}_{milliseconds:010}_{sequence:010}.{ext}`. The sequence
    /// suffix keeps names unique when two frames share a millisecond.
    Timestamp,
}

impl FrameNaming {
    /// Build the file name for the `sequence`-th written frame (1-based).
    pub fn file_name(
        self,
        label: &str,
        sequence: u64,
        position: &FramePosition,
        format: OutputFormat,
    ) -> String {
        let extension = format.extension();
        match self {
            FrameNaming::Sequence => format!("f_{label}_{sequence:010}.{extension}"),
            FrameNaming::Timestamp => format!(
                "f_{label}_{:010}_{sequence:010}.{extension}",
                position.timestamp.as_millis()
            ),
        }
    }
}

/// Derive a file-name-safe label from a path or stream URL.
///
/// Local paths use the file stem. URLs use the last non-empty path segment
/// (credentials and query strings are dropped). Characters outside
/// `[A-Za-z0-9_-]` become `_`.
pub fn source_label(location: &str) -> String {
    let raw = if let Some((_, rest)) = location.split_once("://") {
        let without_query = rest.split(['?', '#']).next().unwrap_or(rest);
        let host_and_path = without_query
            .rsplit_once('@')
            .map_or(without_query, |(_, tail)| tail);
        host_and_path
            .split('/')
            .rev()
            .find(|segment| !segment.is_empty())
            .unwrap_or("stream")
            .to_string()
    } else {
        Path::new(location)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string())
    };

    sanitize_label(&raw)
}

/// Replace characters that are awkward in file names.
pub fn sanitize_label(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '-' || character == '_' {
                character
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at(seconds: u64) -> FramePosition {
        FramePosition {
            index: seconds * 25,
            timestamp: Duration::from_secs(seconds),
        }
    }

    #[test]
    fn sequence_names_match_ffmpeg_pattern() {
        let name = FrameNaming::Sequence.file_name("garden", 7, &at(3), OutputFormat::default());
        assert_eq!(name, "f_garden_0000000007.jpg");
    }

    #[test]
    fn timestamp_names_sort_in_stream_order() {
        let names: Vec<String> = [0, 2, 10, 100]
            .iter()
            .enumerate()
            .map(|(sequence, &seconds)| {
                FrameNaming::Timestamp.file_name(
                    "cam",
                    sequence as u64 + 1,
                    &at(seconds),
                    OutputFormat::Png,
                )
            })
            .collect();

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names[1], "f_cam_0000002000_0000000002.png");
    }

    #[test]
    fn sequence_names_keep_order_past_a_million_frames() {
        let names: Vec<String> = [999_999_u64, 1_000_000, 1_000_001]
            .into_iter()
            .map(|sequence| {
                FrameNaming::Sequence.file_name("cam", sequence, &at(0), OutputFormat::default())
            })
            .collect();

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names[1], "f_cam_0001000000.jpg");

        let late = FrameNaming::Timestamp.file_name("cam", 1_000_000, &at(0), OutputFormat::Png);
        let early = FrameNaming::Timestamp.file_name("cam", 999_999, &at(0), OutputFormat::Png);
        assert!(early < late);
    }

    #[test]
    fn labels_from_paths_and_urls() {
        assert_eq!(source_label("/footage/2024-05-01 feeder.mp4"), "2024-05-01_feeder");
        assert_eq!(
            source_label("rtsp://user:p@ss@192.168.12.167:554/stream1"),
            "stream1"
        );
        assert_eq!(source_label("rtsp://10.0.0.2:554/live/ch0/?tcp"), "ch0");
        assert_eq!(source_label("rtsp://10.0.0.2"), "10_0_0_2");
    }
}
