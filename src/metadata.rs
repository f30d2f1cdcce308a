//! Stream metadata.
//!
//! [`VideoMetadata`] is read once when a source is opened and is available
//! from [`FrameDecoder::metadata`](crate::FrameDecoder::metadata) for the
//! whole run.

use std::time::Duration;

/// Metadata for the video stream being sampled.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frame rate. May be approximate for variable-frame-rate
    /// cameras, and `0.0` when the container does not report one.
    pub frames_per_second: f64,
    /// Estimated frame count from duration and frame rate. `0` for live
    /// streams.
    pub frame_count: u64,
    /// Container duration. [`Duration::ZERO`] for live streams.
    pub duration: Duration,
    /// Codec name (e.g. `"h264"`, `"hevc"`).
    pub codec: String,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`, `"rtsp"`).
    pub format: String,
}

impl VideoMetadata {
    /// Whether the source has no known end, such as an RTSP camera feed.
    pub fn is_live(&self) -> bool {
        self.duration.is_zero()
    }

    /// Duration of one frame, when the frame rate is known.
    pub fn frame_duration(&self) -> Option<Duration> {
        (self.frames_per_second > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / self.frames_per_second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(duration: Duration, frames_per_second: f64) -> VideoMetadata {
        VideoMetadata {
            width: 1920,
            height: 1080,
            frames_per_second,
            frame_count: 0,
            duration,
            codec: "h264".to_string(),
            format: "rtsp".to_string(),
        }
    }

    #[test]
    fn zero_duration_means_live() {
        assert!(sample(Duration::ZERO, 15.0).is_live());
        assert!(!sample(Duration::from_secs(10), 15.0).is_live());
    }

    #[test]
    fn frame_duration_requires_a_frame_rate() {
        assert_eq!(
            sample(Duration::ZERO, 25.0).frame_duration(),
            Some(Duration::from_millis(40))
        );
        assert_eq!(sample(Duration::ZERO, 0.0).frame_duration(), None);
    }
}
