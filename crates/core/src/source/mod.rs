use std::sync::Arc;
use std::time::Instant;

use crate::buffer::{FrameBuffer, PollTimeout};
use crate::config::PipelineConfig;
use crate::slice::{Channels, DataSlice, SliceStamper};
use crate::{resample, Result, WaveSceneError};

/// Read contract renderers consume: the "current" view of the playing
/// stream.
///
/// All data reads fail with [`WaveSceneError::NoCurrentSlice`] until the
/// first slice has been installed by a successful poll; renderers treat
/// that as "not ready yet" and skip the frame.
pub trait FrameSource {
    /// Requests that the current view be updated, waiting according to
    /// `timeout`. Returns `Ok(true)` if new data was installed.
    fn poll(&mut self, timeout: PollTimeout) -> Result<bool>;

    /// Fills each destination channel with PCM data, normalizing channel
    /// count and resolution per [`resample::fill_channels`].
    fn get_pcm(&self, channels: &mut [Vec<f32>]) -> Result<()>;

    /// Fills each destination channel with spectrum analyzer data; same
    /// normalization contract as [`FrameSource::get_pcm`].
    fn get_spectrum(&self, channels: &mut [Vec<f32>]) -> Result<()>;

    /// Current song position in fractional seconds.
    fn position(&self) -> Result<f64>;

    /// Current song title.
    fn title(&self) -> Result<String>;

    /// Unresampled `(pcm, spectrum)` lengths, so renderers can size
    /// buffers for zero-cost native-resolution reads.
    fn native_lengths(&self) -> Result<(usize, usize)>;

    /// Fills `center` with downmixed single-channel PCM data.
    fn get_pcm_mono(&self, center: &mut Vec<f32>) -> Result<()> {
        let mut channels = [std::mem::take(center)];
        let result = self.get_pcm(&mut channels);
        let [restored] = channels;
        *center = restored;
        result
    }

    /// Fills `left` and `right` with stereo PCM data.
    fn get_pcm_stereo(&self, left: &mut Vec<f32>, right: &mut Vec<f32>) -> Result<()> {
        let mut channels = [std::mem::take(left), std::mem::take(right)];
        let result = self.get_pcm(&mut channels);
        let [l, r] = channels;
        *left = l;
        *right = r;
        result
    }

    /// Fills `center` with downmixed single-channel spectrum data.
    fn get_spectrum_mono(&self, center: &mut Vec<f32>) -> Result<()> {
        let mut channels = [std::mem::take(center)];
        let result = self.get_spectrum(&mut channels);
        let [restored] = channels;
        *center = restored;
        result
    }
}

/// Producer-side handle the audio-engine glue calls on every engine
/// callback.
///
/// Pushing never blocks and never retains borrows into the caller's
/// buffers: the slice takes ownership of its channel data. The sink is
/// `Send` so it can move onto the engine's callback thread; drop it (or
/// stop calling it) before tearing down the consumer side.
#[derive(Debug)]
pub struct FrameSink {
    buffer: Arc<FrameBuffer>,
    stamper: SliceStamper,
}

impl FrameSink {
    /// Builds a slice from one engine callback and offers it to the
    /// buffer. Returns `false` when the slice was dropped (buffer full or
    /// closed), which is backpressure policy rather than an error.
    pub fn push(
        &mut self,
        pcm: Channels,
        spectrum: Channels,
        position: f64,
        title: impl Into<String>,
    ) -> bool {
        let stamp = self.stamper.stamp(Instant::now());
        let slice = DataSlice::new(position, title, pcm, spectrum, stamp);
        self.buffer.push(slice)
    }
}

/// Shared teardown/diagnostics handle for a [`StreamSource`].
///
/// Lets the owner of the consumer loop wake a blocked poll and read the
/// dropped-frame counter after the source itself has been moved into a
/// controller.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    buffer: Arc<FrameBuffer>,
}

impl SourceHandle {
    /// Closes the underlying buffer, releasing any blocked poll.
    pub fn close(&self) {
        self.buffer.close();
    }

    pub fn dropped_frames(&self) -> u64 {
        self.buffer.dropped_frames()
    }
}

/// A [`FrameSource`] fed by a live audio engine through a [`FrameSink`].
///
/// Teardown ordering matters: stop the engine callback (drop the sink)
/// before dropping the source, or call [`SourceHandle::close`] first so a
/// racing push lands in a closed buffer and is dropped rather than racing
/// the consumer.
#[derive(Debug)]
pub struct StreamSource {
    buffer: Arc<FrameBuffer>,
    current: Option<Arc<DataSlice>>,
}

impl StreamSource {
    /// Creates a source with default buffering, returning the consumer
    /// half and the producer sink.
    pub fn new() -> (Self, FrameSink) {
        Self::with_config(&PipelineConfig::default())
    }

    /// Creates a source configured from `config`.
    pub fn with_config(config: &PipelineConfig) -> (Self, FrameSink) {
        let buffer = Arc::new(FrameBuffer::with_settings(
            config.capacity,
            config.skip_threshold(),
        ));

        let sink = FrameSink {
            buffer: Arc::clone(&buffer),
            stamper: SliceStamper::new(config.slice_stride()),
        };

        let source = Self {
            buffer,
            current: None,
        };

        (source, sink)
    }

    pub fn handle(&self) -> SourceHandle {
        SourceHandle {
            buffer: Arc::clone(&self.buffer),
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.buffer.dropped_frames()
    }

    fn current(&self) -> Result<&DataSlice> {
        self.current
            .as_deref()
            .ok_or(WaveSceneError::NoCurrentSlice)
    }
}

impl FrameSource for StreamSource {
    fn poll(&mut self, timeout: PollTimeout) -> Result<bool> {
        let updated = self.buffer.poll(timeout)?;
        if updated {
            self.current = self.buffer.current();
        }
        Ok(updated)
    }

    fn get_pcm(&self, channels: &mut [Vec<f32>]) -> Result<()> {
        resample::fill_channels(self.current()?.pcm(), channels);
        Ok(())
    }

    fn get_spectrum(&self, channels: &mut [Vec<f32>]) -> Result<()> {
        resample::fill_channels(self.current()?.spectrum(), channels);
        Ok(())
    }

    fn position(&self) -> Result<f64> {
        Ok(self.current()?.position())
    }

    fn title(&self) -> Result<String> {
        Ok(self.current()?.title().to_owned())
    }

    fn native_lengths(&self) -> Result<(usize, usize)> {
        let slice = self.current()?;
        Ok((slice.native_pcm_len(), slice.native_spectrum_len()))
    }
}

/// Stand-in source for controllers with no player attached.
///
/// Data reads always succeed with silence, position zero, and an empty
/// title. The poll contract is deliberately asymmetric: any waiting poll
/// reports `true` so blocking consumers are released promptly, while a
/// non-blocking probe reports `false` so tight polling loops do not spin
/// forever. Callers rely on this exact behavior to detect "no data source
/// attached"; implementations replacing this type must preserve it.
#[derive(Debug, Default)]
pub struct NullSource;

impl FrameSource for NullSource {
    fn poll(&mut self, timeout: PollTimeout) -> Result<bool> {
        let would_wait = match timeout {
            PollTimeout::NonBlocking => false,
            PollTimeout::Wait(limit) => !limit.is_zero(),
            PollTimeout::Forever => true,
        };
        Ok(would_wait)
    }

    fn get_pcm(&self, channels: &mut [Vec<f32>]) -> Result<()> {
        for channel in channels {
            channel.fill(0.0);
        }
        Ok(())
    }

    fn get_spectrum(&self, channels: &mut [Vec<f32>]) -> Result<()> {
        for channel in channels {
            channel.fill(0.0);
        }
        Ok(())
    }

    fn position(&self) -> Result<f64> {
        Ok(0.0)
    }

    fn title(&self) -> Result<String> {
        Ok(String::new())
    }

    fn native_lengths(&self) -> Result<(usize, usize)> {
        Ok((0, 0))
    }
}
