//! Core library for the WaveScene visualizer.
//!
//! The crate bridges a playing audio stream to a frame-based renderer:
//! the engine's callback thread pushes timestamped [`slice::DataSlice`]
//! snapshots into a bounded [`buffer::FrameBuffer`], the render thread
//! polls them back out (skipping ahead when it falls behind), channel
//! data is normalized on read by [`resample`], and a
//! [`timeline::Timeline`] fires timed scenes and events against the song
//! position. The [`render::Controller`] owns the loop and the graphics
//! seam; it is the only component that may touch the surface.

pub mod buffer;
pub mod config;
pub mod error;
pub mod preset;
pub mod render;
pub mod resample;
pub mod slice;
pub mod source;
pub mod spectrum;
pub mod timeline;

pub use buffer::{FrameBuffer, PollTimeout};
pub use config::{AppConfig, PipelineConfig, WindowConfig};
pub use error::{Result, WaveSceneError};
pub use preset::{ActionRegistry, EventDoc, EventKindDoc, PresetDoc, RendererDoc};
pub use render::{
    BeatDetector, ControlEvent, Controller, KeyEvent, NullRenderer, OffscreenSurface, Renderable,
    Surface,
};
pub use slice::{Channels, DataSlice, SliceStamper};
pub use source::{FrameSink, FrameSource, NullSource, SourceHandle, StreamSource};
pub use spectrum::SpectrumAnalyzer;
pub use timeline::{
    BeatFlag, EventKind, SceneContext, TimedCallback, TimedEvent, TimedProgram, Timeline,
    TimelineBuilder,
};
