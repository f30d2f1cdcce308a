//! Sampling policy: which decoded frames get written.
//!
//! [`Sampler`] is fed every decoded [`FramePosition`] in stream order and
//! answers whether that frame should be emitted. It is a pure function of
//! the positions it has seen, so two runs over the same source emit the
//! same frames.
//!
//! Time-based sampling is anchored to a fixed grid `start + k * interval`.
//! A frame is emitted when it is the first one at or past the next grid
//! point, and the grid then skips past it. For a 10 second clip sampled
//! every 2 seconds that gives frames at 0, 2, 4, 6 and 8 seconds,
//! regardless of whether the frame rate divides the interval evenly.

use std::time::Duration;

use crate::{decoder::FramePosition, error::ExtractError};

/// Spacing between extracted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingInterval {
    /// One frame per elapsed stream duration.
    Every(Duration),
    /// One frame out of every `n` decoded frames. `1` keeps all frames.
    EveryNthFrame(u64),
}

impl Default for SamplingInterval {
    fn default() -> Self {
        SamplingInterval::EveryNthFrame(1)
    }
}

impl SamplingInterval {
    /// One frame every `seconds` of stream time.
    ///
    /// # Errors
    ///
    /// [`ExtractError::InvalidInterval`] for zero, negative, or non-finite
    /// values.
    pub fn every_seconds(seconds: f64) -> Result<Self, ExtractError> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(ExtractError::InvalidInterval);
        }
        let duration =
            Duration::try_from_secs_f64(seconds).map_err(|_| ExtractError::InvalidInterval)?;
        let interval = SamplingInterval::Every(duration);
        interval.validate()?;
        Ok(interval)
    }

    /// Reject zero-length intervals.
    pub fn validate(&self) -> Result<(), ExtractError> {
        match self {
            SamplingInterval::Every(interval) if interval.is_zero() => {
                Err(ExtractError::InvalidInterval)
            }
            SamplingInterval::EveryNthFrame(0) => Err(ExtractError::InvalidInterval),
            _ => Ok(()),
        }
    }

    /// Expected number of emitted frames for a clip, used as a progress
    /// total. `None` when the length is unknown (live streams).
    pub fn expected_count(
        &self,
        duration: Duration,
        frames_per_second: f64,
        start: Duration,
    ) -> Option<u64> {
        let remaining = duration.checked_sub(start).filter(|d| !d.is_zero())?;
        match *self {
            SamplingInterval::Every(interval) if !interval.is_zero() => {
                Some(remaining.as_nanos().div_ceil(interval.as_nanos()) as u64)
            }
            SamplingInterval::EveryNthFrame(n) if n > 0 && frames_per_second > 0.0 => {
                let frames = (remaining.as_secs_f64() * frames_per_second).round() as u64;
                Some(frames.div_ceil(n))
            }
            _ => None,
        }
    }
}

/// Stateful decision maker for one extraction run.
#[derive(Debug, Clone)]
pub struct Sampler {
    interval: SamplingInterval,
    start: Duration,
    next_due: Duration,
    first_index: Option<u64>,
}

impl Sampler {
    /// Create a sampler that ignores frames before `start`.
    ///
    /// # Errors
    ///
    /// [`ExtractError::InvalidInterval`] if the interval is zero.
    pub fn new(interval: SamplingInterval, start: Duration) -> Result<Self, ExtractError> {
        interval.validate()?;
        Ok(Self {
            interval,
            start,
            next_due: start,
            first_index: None,
        })
    }

    /// Decide whether the frame at `position` is written.
    ///
    /// Positions must be supplied in decode order.
    pub fn should_emit(&mut self, position: &FramePosition) -> bool {
        if position.timestamp < self.start {
            return false;
        }

        match self.interval {
            SamplingInterval::Every(interval) => {
                if position.timestamp < self.next_due {
                    return false;
                }
                let behind = (position.timestamp - self.next_due).as_nanos();
                let steps = behind / interval.as_nanos() + 1;
                let advance = interval.as_nanos() * steps;
                self.next_due += Duration::from_nanos(u64::try_from(advance).unwrap_or(u64::MAX));
                true
            }
            SamplingInterval::EveryNthFrame(n) => {
                let first = *self.first_index.get_or_insert(position.index);
                position.index.saturating_sub(first) % n == 0
            }
        }
    }

    /// The configured interval.
    pub fn interval(&self) -> SamplingInterval {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(seconds: u64, frames_per_second: u64) -> Vec<FramePosition> {
        (0..seconds * frames_per_second)
            .map(|index| FramePosition {
                index,
                timestamp: Duration::from_nanos(index * 1_000_000_000 / frames_per_second),
            })
            .collect()
    }

    fn emitted(sampler: &mut Sampler, positions: &[FramePosition]) -> Vec<Duration> {
        positions
            .iter()
            .filter(|position| sampler.should_emit(position))
            .map(|position| position.timestamp)
            .collect()
    }

    #[test]
    fn two_second_interval_over_ten_seconds() {
        let mut sampler =
            Sampler::new(SamplingInterval::Every(Duration::from_secs(2)), Duration::ZERO).unwrap();
        let times = emitted(&mut sampler, &timeline(10, 25));
        let expected: Vec<Duration> = [0, 2, 4, 6, 8].map(Duration::from_secs).to_vec();
        assert_eq!(times, expected);
    }

    #[test]
    fn ntsc_frame_rate_stays_on_grid() {
        // 29.97 fps: frame timestamps never land exactly on whole seconds.
        let positions: Vec<FramePosition> = (0..300)
            .map(|index| FramePosition {
                index,
                timestamp: Duration::from_secs_f64(index as f64 * 1001.0 / 30000.0),
            })
            .collect();
        let mut sampler =
            Sampler::new(SamplingInterval::Every(Duration::from_secs(1)), Duration::ZERO).unwrap();
        let times = emitted(&mut sampler, &positions);

        assert_eq!(times.len(), 10);
        for (second, time) in times.iter().enumerate() {
            let offset = time.as_secs_f64() - second as f64;
            assert!((0.0..0.034).contains(&offset), "frame {second} at {time:?}");
        }
    }

    #[test]
    fn gap_in_the_stream_resumes_on_the_grid() {
        let positions = [0u64, 1, 7, 8, 9].map(|second| FramePosition {
            index: second,
            timestamp: Duration::from_secs(second),
        });
        let mut sampler =
            Sampler::new(SamplingInterval::Every(Duration::from_secs(2)), Duration::ZERO).unwrap();
        let times = emitted(&mut sampler, &positions);
        assert_eq!(times, [0, 7, 8].map(Duration::from_secs).to_vec());
    }

    #[test]
    fn nth_frame_counts_from_first_eligible_frame() {
        let positions = timeline(2, 10);
        let mut sampler =
            Sampler::new(SamplingInterval::EveryNthFrame(3), Duration::from_millis(500)).unwrap();
        let indices: Vec<u64> = positions
            .iter()
            .filter(|position| sampler.should_emit(position))
            .map(|position| position.index)
            .collect();
        assert_eq!(indices, vec![5, 8, 11, 14, 17]);
    }

    #[test]
    fn every_frame_keeps_everything() {
        let positions = timeline(1, 30);
        let mut sampler = Sampler::new(SamplingInterval::default(), Duration::ZERO).unwrap();
        assert_eq!(emitted(&mut sampler, &positions).len(), 30);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        assert!(matches!(
            Sampler::new(SamplingInterval::Every(Duration::ZERO), Duration::ZERO),
            Err(ExtractError::InvalidInterval)
        ));
        assert!(matches!(
            Sampler::new(SamplingInterval::EveryNthFrame(0), Duration::ZERO),
            Err(ExtractError::InvalidInterval)
        ));
        assert!(SamplingInterval::every_seconds(-1.0).is_err());
        assert!(SamplingInterval::every_seconds(f64::NAN).is_err());
    }

    #[test]
    fn expected_count_matches_floor_of_duration_over_interval() {
        let interval = SamplingInterval::Every(Duration::from_secs(2));
        assert_eq!(
            interval.expected_count(Duration::from_secs(10), 25.0, Duration::ZERO),
            Some(5)
        );
        assert_eq!(
            SamplingInterval::EveryNthFrame(10).expected_count(
                Duration::from_secs(4),
                25.0,
                Duration::ZERO
            ),
            Some(10)
        );
        assert_eq!(
            interval.expected_count(Duration::ZERO, 25.0, Duration::ZERO),
            None
        );
    }
}
