//! The decode capability interface.
//!
//! [`FrameDecoder`] is the seam between the extraction loop and whatever
//! actually decompresses video. The FFmpeg software path, the FFmpeg
//! hardware path, and synthetic decoders used in tests all implement it, so
//! [`FrameExtractor`](crate::FrameExtractor) never needs to know which one it
//! is driving.
//!
//! Decoding and conversion are split: [`next_frame`](FrameDecoder::next_frame)
//! only decodes and reports where the frame sits in the stream, and
//! [`current_image`](FrameDecoder::current_image) converts it to pixels.
//! Frames the sampler skips never pay for colour conversion.

use std::time::Duration;

use image::DynamicImage;

use crate::{error::ExtractError, metadata::VideoMetadata};

/// Where a decoded frame sits in the source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FramePosition {
    /// Zero-based count of frames decoded since the source was opened.
    pub index: u64,
    /// Presentation time relative to the start of the stream.
    pub timestamp: Duration,
}

/// A source of decoded video frames.
///
/// Implementations release their native resources on drop. Calling
/// [`close`](FrameDecoder::close) does the same thing earlier, and any
/// later call to [`next_frame`](FrameDecoder::next_frame) returns
/// `Ok(None)`.
pub trait FrameDecoder {
    /// Metadata of the stream being decoded.
    fn metadata(&self) -> &VideoMetadata;

    /// Decode the next frame.
    ///
    /// Returns `Ok(None)` at end of stream. A
    /// [`DecodeFailure`](ExtractError::DecodeFailure) leaves the decoder
    /// usable: the next call continues with the following packet, which is
    /// how corrupt segments are skipped.
    fn next_frame(&mut self) -> Result<Option<FramePosition>, ExtractError>;

    /// Convert the frame most recently returned by
    /// [`next_frame`](FrameDecoder::next_frame) to an image.
    fn current_image(&mut self) -> Result<DynamicImage, ExtractError>;

    /// Reposition the stream near `position`. Decoding resumes from the
    /// nearest preceding keyframe, so frames slightly before `position`
    /// may be returned first.
    fn seek(&mut self, position: Duration) -> Result<(), ExtractError>;

    /// Release native decoder resources. Idempotent.
    fn close(&mut self);

    /// Whether frames are being decoded on a hardware device.
    fn is_hardware_accelerated(&self) -> bool {
        false
    }
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn metadata(&self) -> &VideoMetadata {
        (**self).metadata()
    }

    fn next_frame(&mut self) -> Result<Option<FramePosition>, ExtractError> {
        (**self).next_frame()
    }

    fn current_image(&mut self) -> Result<DynamicImage, ExtractError> {
        (**self).current_image()
    }

    fn seek(&mut self, position: Duration) -> Result<(), ExtractError> {
        (**self).seek(position)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_hardware_accelerated(&self) -> bool {
        (**self).is_hardware_accelerated()
    }
}
