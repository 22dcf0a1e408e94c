mod common;

use chipbridge::frame::Frame;
use chipbridge::{ChannelSet, Error, Screenshot};
use common::{pattern, pattern_flipped_insert};

/// Feeds `live` in order and returns the 1-based position of the first full
/// match.
fn first_match(reference: &[Frame], channels: ChannelSet, live: &[Frame]) -> Option<usize> {
    let screenshot = Screenshot::new(reference.to_vec(), ChannelSet::RGBI).unwrap();
    let mut matcher = screenshot.create_matcher(channels);
    for (i, frame) in live.iter().enumerate() {
        if matcher.advance(frame, ChannelSet::RGBI).unwrap() {
            return Some(i + 1);
        }
    }
    None
}

#[test]
fn static_reference_matches_first_equal_frame() {
    let a = pattern(0);
    let b = pattern(5);
    assert_eq!(first_match(&[a.clone()], ChannelSet::RGBI, &[b.clone(), b, a]), Some(3));
}

#[test]
fn any_rotation_matches_within_n_frames() {
    let reference = vec![pattern(0), pattern(3), pattern(6), pattern(9)];
    let n = reference.len();
    for r in 0..n {
        let live: Vec<Frame> = (0..n).map(|k| reference[(r + k) % n].clone()).collect();
        assert_eq!(first_match(&reference, ChannelSet::RGBI, &live), Some(n), "rotation {r}");
    }
}

#[test]
fn duplicated_frames_are_ignored() {
    let a = pattern(0);
    let b = pattern(7);
    let live = [a.clone(), a.clone(), a.clone(), b.clone()];
    assert_eq!(first_match(&[a, b], ChannelSet::RGBI, &live), Some(4));
}

#[test]
fn recovers_after_leading_noise() {
    let a = pattern(0);
    let b = pattern(7);
    let live = [b.clone(), a.clone(), b.clone()];
    let position = first_match(&[a, b], ChannelSet::RGBI, &live);
    assert!(matches!(position, Some(p) if p >= 2 && p <= 3), "{position:?}");
}

#[test]
fn desync_restarts_the_sequence() {
    let a = pattern(0);
    let b = pattern(4);
    let c = pattern(8);
    let noise = pattern(12);
    // a, b then noise breaks the run; the full a, b, c run comes later.
    let live = [a.clone(), b.clone(), noise, a.clone(), b.clone(), c.clone()];
    assert_eq!(first_match(&[a, b, c], ChannelSet::RGBI, &live), Some(6));
}

#[test]
fn out_of_order_stream_never_matches() {
    let a = pattern(0);
    let b = pattern(4);
    let c = pattern(8);
    let live = [a.clone(), c.clone(), b.clone(), a.clone(), c.clone(), b.clone()];
    assert_eq!(first_match(&[a, b, c], ChannelSet::RGBI, &live), None);
}

#[test]
fn masked_out_channel_is_ignored() {
    let reference = pattern(2);
    let live = pattern_flipped_insert(2);
    assert_eq!(first_match(&[reference.clone()], ChannelSet::RGB, &[live.clone()]), Some(1));
    assert_eq!(first_match(&[reference], ChannelSet::RGBI, &[live]), None);
}

#[test]
fn match_is_sticky() {
    let a = pattern(0);
    let screenshot = Screenshot::new(vec![a.clone()], ChannelSet::RGBI).unwrap();
    let mut matcher = screenshot.create_matcher(ChannelSet::RGBI);
    assert!(matcher.advance(&a, ChannelSet::RGBI).unwrap());
    assert!(matcher.advance(&pattern(9), ChannelSet::RGBI).unwrap());
    assert!(matcher.is_matched());
}

#[test]
fn requested_channels_must_be_available() {
    let a = pattern(0);
    let screenshot = Screenshot::new(vec![a.clone()], ChannelSet::RGBI).unwrap();
    let mut matcher = screenshot.create_matcher(ChannelSet::RGBI);
    let err = matcher.advance(&a, ChannelSet::RGB).unwrap_err();
    assert!(matches!(err, Error::MissingChannels { .. }));

    let mut matcher = screenshot.create_matcher(ChannelSet::RGB);
    assert!(matcher.advance(&a, ChannelSet::RGB).unwrap());
}

#[test]
fn size_mismatch_is_an_error() {
    let screenshot = Screenshot::new(vec![pattern(0)], ChannelSet::RGBI).unwrap();
    let mut matcher = screenshot.create_matcher(ChannelSet::RGBI);
    let other = Frame::new(2, 2, vec![0; 4]).unwrap();
    let err = matcher.advance(&other, ChannelSet::RGBI).unwrap_err();
    assert!(matches!(
        err,
        Error::FrameSizeMismatch {
            expected: (4, 3),
            actual: (2, 2)
        }
    ));
}
