//! User-supplied FFmpeg filter graphs applied to decoded frames.
//!
//! The graph is built lazily from the first frame it sees, because the
//! decoder's reported pixel format before decoding can differ from what it
//! actually produces.

use ffmpeg_next::{Rational, filter::Graph as FilterGraph, frame::Video as VideoFrame};
use ffmpeg_sys_next::AVPixelFormat;

use crate::error::ExtractError;

pub(crate) struct FrameFilter {
    description: String,
    time_base: Rational,
    graph: Option<FilterGraph>,
}

impl FrameFilter {
    pub(crate) fn new(description: impl Into<String>, time_base: Rational) -> Self {
        Self {
            description: description.into(),
            time_base,
            graph: None,
        }
    }

    /// Feed one decoded frame into the graph.
    pub(crate) fn push(&mut self, frame: &VideoFrame) -> Result<(), ExtractError> {
        if self.graph.is_none() {
            self.graph = Some(self.build(frame)?);
        }
        let Some(graph) = self.graph.as_mut() else {
            return Ok(());
        };

        graph
            .get("in")
            .ok_or_else(|| ExtractError::DecodeFailure("Filter 'in' not found".to_string()))?
            .source()
            .add(frame)
            .map_err(|error| ExtractError::DecodeFailure(format!("Failed to feed filter: {error}")))
    }

    /// Take the next filtered frame, if one is ready.
    pub(crate) fn pull(&mut self, output: &mut VideoFrame) -> bool {
        self.graph.as_mut().is_some_and(|graph| {
            graph
                .get("out")
                .is_some_and(|mut sink| sink.sink().frame(output).is_ok())
        })
    }

    /// Signal end of input so buffered frames become available to
    /// [`pull`](FrameFilter::pull).
    pub(crate) fn flush(&mut self) {
        if let Some(mut source) = self.graph.as_mut().and_then(|graph| graph.get("in")) {
            if let Err(error) = source.source().flush() {
                log::debug!("Filter '{}' flush: {error}", self.description);
            }
        }
    }

    /// Forget the current graph. The next pushed frame rebuilds it, which
    /// is needed after a seek.
    pub(crate) fn reset(&mut self) {
        self.graph = None;
    }

    fn build(&self, frame: &VideoFrame) -> Result<FilterGraph, ExtractError> {
        let filter_error = |message: String| ExtractError::DecodeFailure(message);
        let mut graph = FilterGraph::new();

        // Raw AVFrame fields: the safe enum accessors do not round-trip
        // every colour space FFmpeg can report.
        let (color_space, color_range) = unsafe {
            let raw = frame.as_ptr();
            ((*raw).colorspace as i32, (*raw).color_range as i32)
        };
        let buffer_args = format!(
            "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect=1/1:colorspace={}:range={}",
            frame.width(),
            frame.height(),
            AVPixelFormat::from(frame.format()) as i32,
            self.time_base.numerator(),
            self.time_base.denominator().max(1),
            color_space,
            color_range,
        );

        let buffer = ffmpeg_next::filter::find("buffer")
            .ok_or_else(|| filter_error("FFmpeg 'buffer' filter not found".to_string()))?;
        graph
            .add(&buffer, "in", &buffer_args)
            .map_err(|error| filter_error(format!("Failed to add buffer filter: {error}")))?;

        let buffersink = ffmpeg_next::filter::find("buffersink")
            .ok_or_else(|| filter_error("FFmpeg 'buffersink' filter not found".to_string()))?;
        graph
            .add(&buffersink, "out", "")
            .map_err(|error| filter_error(format!("Failed to add buffersink filter: {error}")))?;

        graph
            .output("in", 0)
            .map_err(|error| filter_error(format!("Filter graph output error: {error}")))?
            .input("out", 0)
            .map_err(|error| filter_error(format!("Filter graph input error: {error}")))?
            .parse(&self.description)
            .map_err(|error| {
                filter_error(format!("Invalid filter '{}': {error}", self.description))
            })?;

        graph
            .validate()
            .map_err(|error| filter_error(format!("Filter graph validation: {error}")))?;

        log::debug!("Built filter graph '{}'", self.description);
        Ok(graph)
    }
}
