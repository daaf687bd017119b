//! Channel normalization for data reads.
//!
//! Renderers request PCM and spectrum data in whatever channel count and
//! resolution suits them; the engine delivers whatever the decoder produced.
//! The functions here bridge the two on every frame, so they stay pure
//! and free of allocation: they only ever write into the caller's
//! buffers.

/// Resizes `src` into `dst` using nearest-neighbor index mapping.
///
/// Equal lengths degenerate to an exact copy. An empty source fills the
/// destination with silence; an empty destination is a no-op.
pub fn interpolate(src: &[f32], dst: &mut [f32]) {
    if dst.is_empty() {
        return;
    }

    if src.is_empty() {
        dst.fill(0.0);
        return;
    }

    if src.len() == dst.len() {
        dst.copy_from_slice(src);
        return;
    }

    let dst_len = dst.len();
    for (i, value) in dst.iter_mut().enumerate() {
        *value = src[i * src.len() / dst_len];
    }
}

/// Averages the left and right channels into `dst`, resampling each to the
/// destination length. A missing (empty) channel contributes silence.
pub fn downmix(left: &[f32], right: &[f32], dst: &mut [f32]) {
    if dst.is_empty() {
        return;
    }

    for i in 0..dst.len() {
        let l = sample_nearest(left, i, dst.len());
        let r = sample_nearest(right, i, dst.len());
        dst[i] = (l + r) / 2.0;
    }
}

fn sample_nearest(src: &[f32], index: usize, dst_len: usize) -> f32 {
    if src.is_empty() {
        0.0
    } else {
        src[index * src.len() / dst_len]
    }
}

/// Fills a set of destination channels from a set of source channels.
///
/// The channel-count contract:
/// - one destination, two or more sources: the destination receives the
///   downmixed center channel;
/// - two destinations, one source: both receive the mono channel
///   independently resampled (duplication, not further mixing);
/// - anything else: channels are resampled pairwise and destinations with
///   no matching source are filled with silence, never left stale.
pub fn fill_channels(src: &[Vec<f32>], dst: &mut [Vec<f32>]) {
    if dst.len() == 1 && src.len() >= 2 {
        downmix(&src[0], &src[1], &mut dst[0]);
        return;
    }

    if dst.len() == 2 && src.len() == 1 {
        let (left, right) = dst.split_at_mut(1);
        interpolate(&src[0], &mut left[0]);
        interpolate(&src[0], &mut right[0]);
        return;
    }

    let shared = src.len().min(dst.len());

    for (source, target) in src.iter().zip(dst.iter_mut()) {
        interpolate(source, target);
    }

    for target in dst.iter_mut().skip(shared) {
        target.fill(0.0);
    }
}
