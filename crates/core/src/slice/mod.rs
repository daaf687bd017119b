use std::time::{Duration, Instant};

/// Ordered per-channel sample data: one inner vector per audio channel.
///
/// Channel vectors within a single slice have equal lengths, but lengths
/// may vary from one engine callback to the next.
pub type Channels = Vec<Vec<f32>>;

/// One immutable timestamped snapshot of the playing stream.
///
/// A slice is created by the producer on every audio-engine callback and
/// never mutated afterwards, so the consumer can hold onto one (via
/// [`std::sync::Arc`]) while the next poll replaces it.
#[derive(Debug, Clone)]
pub struct DataSlice {
    position: f64,
    title: String,
    pcm: Channels,
    spectrum: Channels,
    captured_at: Instant,
}

impl DataSlice {
    /// Creates a snapshot of the stream at `position` seconds.
    pub fn new(
        position: f64,
        title: impl Into<String>,
        pcm: Channels,
        spectrum: Channels,
        captured_at: Instant,
    ) -> Self {
        Self {
            position,
            title: title.into(),
            pcm,
            spectrum,
            captured_at,
        }
    }

    /// Song position in fractional seconds at capture time.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Title of the track the slice was captured from.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn pcm(&self) -> &Channels {
        &self.pcm
    }

    pub fn spectrum(&self) -> &Channels {
        &self.spectrum
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Length of the unresampled PCM data, usable for native-resolution
    /// reads that bypass interpolation entirely.
    pub fn native_pcm_len(&self) -> usize {
        self.pcm.first().map(Vec::len).unwrap_or(0)
    }

    /// Length of the unresampled spectrum data.
    pub fn native_spectrum_len(&self) -> usize {
        self.spectrum.first().map(Vec::len).unwrap_or(0)
    }

    /// How far behind `now` this slice is. Saturates to zero for slices
    /// stamped ahead of the clock by [`SliceStamper`].
    pub fn lag(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.captured_at)
    }
}

/// Spreads out capture timestamps when the engine delivers bursts.
///
/// Some codec decoders hand the engine several callbacks' worth of data at
/// once. Stamping every slice in such a burst with the wall clock would make
/// the whole burst look stale to the catch-up drain, which would then throw
/// most of it away. Instead, each stamp is at least `stride` after the
/// previous one, falling back to the wall clock once it catches up.
#[derive(Debug)]
pub struct SliceStamper {
    stride: Duration,
    last: Option<Instant>,
}

impl SliceStamper {
    pub fn new(stride: Duration) -> Self {
        Self { stride, last: None }
    }

    /// Returns the timestamp to assign to the next slice.
    pub fn stamp(&mut self, now: Instant) -> Instant {
        let stamp = match self.last {
            Some(last) => now.max(last + self.stride),
            None => now,
        };
        self.last = Some(stamp);
        stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice_with_channels(pcm: Channels, spectrum: Channels) -> DataSlice {
        DataSlice::new(0.0, "track", pcm, spectrum, Instant::now())
    }

    #[test]
    fn native_lengths_follow_first_channel() {
        let slice = slice_with_channels(vec![vec![0.0; 512], vec![0.0; 512]], vec![vec![0.0; 256]]);

        assert_eq!(slice.native_pcm_len(), 512);
        assert_eq!(slice.native_spectrum_len(), 256);
    }

    #[test]
    fn native_lengths_are_zero_without_channels() {
        let slice = slice_with_channels(Vec::new(), Vec::new());

        assert_eq!(slice.native_pcm_len(), 0);
        assert_eq!(slice.native_spectrum_len(), 0);
    }

    #[test]
    fn stamper_spreads_bursts_by_stride() {
        let stride = Duration::from_millis(15);
        let mut stamper = SliceStamper::new(stride);
        let now = Instant::now();

        let first = stamper.stamp(now);
        let second = stamper.stamp(now);
        let third = stamper.stamp(now);

        assert_eq!(first, now);
        assert_eq!(second, now + stride);
        assert_eq!(third, now + stride * 2);
    }

    #[test]
    fn stamper_follows_wall_clock_between_bursts() {
        let stride = Duration::from_millis(15);
        let mut stamper = SliceStamper::new(stride);
        let now = Instant::now();

        stamper.stamp(now);
        let later = now + Duration::from_millis(100);

        assert_eq!(stamper.stamp(later), later);
    }

    #[test]
    fn lag_saturates_for_future_stamps() {
        let now = Instant::now();
        let slice = DataSlice::new(
            0.0,
            "track",
            Vec::new(),
            Vec::new(),
            now + Duration::from_millis(30),
        );

        assert_eq!(slice.lag(now), Duration::ZERO);
    }
}
