//! Internal helpers for pixel copying and timestamp arithmetic.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy plane 0 of a packed frame into a tightly packed buffer.
///
/// FFmpeg rows often carry alignment padding (stride > width × bpp); the
/// `image` crate expects none.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = width as usize * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * height as usize].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            buffer.extend_from_slice(&row[..row_bytes]);
        }
        buffer
    }
}

/// Stream time (PTS units) to a [`Duration`], clamping negatives to zero.
pub(crate) fn pts_to_duration(pts: i64, time_base: Rational) -> Duration {
    if time_base.denominator() == 0 {
        return Duration::ZERO;
    }
    let seconds =
        pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::ZERO)
}

/// A [`Duration`] in AV_TIME_BASE units (microseconds), as expected by
/// container-level seeking.
pub(crate) fn duration_to_seek_timestamp(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

/// Approximate frame index for a timestamp at a constant frame rate.
pub(crate) fn duration_to_frame_index(timestamp: Duration, frames_per_second: f64) -> u64 {
    (timestamp.as_secs_f64() * frames_per_second).round() as u64
}
