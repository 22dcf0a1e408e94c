use crate::channels::ChannelSet;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Follows the reference sequence assuming the live stream enters it at a
/// fixed rotation offset.
#[derive(Debug, Clone, Copy)]
struct RotationTracker {
    offset: usize,
    matched_length: usize,
}

impl RotationTracker {
    /// Feeds one live frame, compared on `mask` only. `sequence` is the
    /// reference repeated twice, so `offset + matched_length` never needs
    /// wrapping.
    fn advance(&mut self, frame: &Frame, sequence: &[Frame], mask: ChannelSet) -> bool {
        let n_frames = sequence.len() / 2;
        if frame.equals_masked(&sequence[self.offset + self.matched_length], mask) {
            self.matched_length += 1;
            return self.matched_length == n_frames;
        }

        // A repeat of the frame matched last is a stutter and keeps our
        // progress. Anything else means we lost synchronization.
        if self.matched_length != 0
            && !frame.equals_masked(&sequence[self.offset + self.matched_length - 1], mask)
        {
            self.matched_length = 0;
        }
        false
    }
}

/// Compares a reference screenshot to a stream of frames, signalling when a
/// full match occurred. Only the requested channels are considered.
///
/// If animated, the reference can have less frames than the incoming stream:
/// duplicated frames in the stream are ignored, and the stream does not need
/// to start on the reference's first frame.
#[derive(Debug)]
pub struct ScreenshotMatcher {
    channels: ChannelSet,
    sequence: Vec<Frame>,
    trackers: Vec<RotationTracker>,
    matched: bool,
}

impl ScreenshotMatcher {
    pub fn new(reference: &[Frame], channels: ChannelSet) -> Self {
        let masked: Vec<Frame> = reference.iter().map(|f| f.masked(channels)).collect();
        let n_frames = masked.len();
        let mut sequence = masked.clone();
        sequence.extend(masked);
        let trackers = (0..n_frames)
            .map(|offset| RotationTracker {
                offset,
                matched_length: 0,
            })
            .collect();
        Self {
            channels,
            sequence,
            trackers,
            matched: false,
        }
    }

    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    pub fn is_matched(&self) -> bool {
        self.matched
    }

    /// Feeds the next live frame, whose valid channels are `available`.
    /// Returns `true` once any rotation has been observed in full; the result
    /// stays `true` afterwards.
    pub fn advance(&mut self, frame: &Frame, available: ChannelSet) -> Result<bool> {
        if self.matched {
            return Ok(true);
        }

        // All the channels that we were asked to compare must be available.
        if !available.contains(self.channels) {
            return Err(Error::MissingChannels {
                requested: self.channels,
                available,
            });
        }
        if let Some(expected) = self.sequence.first() {
            if expected.size() != frame.size() {
                return Err(Error::FrameSizeMismatch {
                    expected: expected.size(),
                    actual: frame.size(),
                });
            }
        }

        // Every tracker sees every frame, even after one of them matched.
        let sequence = &self.sequence;
        let mut matched = false;
        for tracker in &mut self.trackers {
            matched |= tracker.advance(frame, sequence, self.channels);
        }
        self.matched = matched;
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(index: u8) -> Frame {
        Frame::new(2, 2, vec![index; 4]).unwrap()
    }

    #[test]
    fn tracker_resets_on_unrelated_frame() {
        let sequence = vec![solid(1), solid(2), solid(3), solid(1), solid(2), solid(3)];
        let mut tracker = RotationTracker {
            offset: 0,
            matched_length: 0,
        };
        let mask = ChannelSet::RGBI;
        assert!(!tracker.advance(&solid(1), &sequence, mask));
        assert!(!tracker.advance(&solid(2), &sequence, mask));
        assert_eq!(tracker.matched_length, 2);
        assert!(!tracker.advance(&solid(2), &sequence, mask));
        assert_eq!(tracker.matched_length, 2);
        assert!(!tracker.advance(&solid(7), &sequence, mask));
        assert_eq!(tracker.matched_length, 0);
    }

    #[test]
    fn tracker_compares_on_mask_only() {
        let sequence = vec![solid(0b1000), solid(0b1000)];
        let mut tracker = RotationTracker {
            offset: 0,
            matched_length: 0,
        };
        // Red with insert equals red once insert is masked out.
        assert!(!tracker.advance(&solid(0b1001), &sequence, ChannelSet::I));
        assert!(tracker.advance(&solid(0b1001), &sequence, ChannelSet::RGB));
    }

    #[test]
    fn one_tracker_per_rotation() {
        let matcher = ScreenshotMatcher::new(&[solid(1), solid(2), solid(3)], ChannelSet::RGBI);
        assert_eq!(matcher.trackers.len(), 3);
        assert_eq!(matcher.sequence.len(), 6);
        let offsets: Vec<usize> = matcher.trackers.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }
}
