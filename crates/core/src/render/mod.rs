use std::collections::VecDeque;

use crate::buffer::PollTimeout;
use crate::source::{FrameSource, NullSource};
use crate::{Result, WaveSceneError};

/// Anything the controller can drive once per frame.
pub trait Renderable {
    fn render(&mut self, controller: &mut Controller) -> Result<()>;
}

/// A renderable that draws nothing. Useful as the target of an empty
/// preset document.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderable for NullRenderer {
    fn render(&mut self, _controller: &mut Controller) -> Result<()> {
        Ok(())
    }
}

/// Beat information exposed through the controller contract.
pub trait BeatDetector {
    fn is_beat(&self) -> bool;
}

impl BeatDetector for NullSource {
    fn is_beat(&self) -> bool {
        false
    }
}

/// Graphics backend seam. The controller owns exactly one surface and
/// touches it only from the render thread; implementations are free to
/// wrap a real windowing context or stay headless.
pub trait Surface {
    /// Creates the context and window. Called exactly once.
    fn create(&mut self, width: u32, height: u32, title: &str) -> Result<()>;
    /// Re-applies viewport/projection state after a size change.
    fn set_viewport(&mut self, width: u32, height: u32);
    /// Clears the frame.
    fn clear(&mut self);
    /// Makes the finished frame visible.
    fn present(&mut self);
    /// Releases the context.
    fn destroy(&mut self);
}

/// Headless surface that only tracks its dimensions and frame counts.
/// The default backend for tests and offline runs.
#[derive(Debug, Default)]
pub struct OffscreenSurface {
    width: u32,
    height: u32,
    frames_presented: u64,
}

impl OffscreenSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl Surface for OffscreenSurface {
    fn create(&mut self, width: u32, height: u32, _title: &str) -> Result<()> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn clear(&mut self) {}

    fn present(&mut self) {
        self.frames_presented += 1;
    }

    fn destroy(&mut self) {}
}

/// A key press or release observed in the output window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub pressed: bool,
    pub code: u32,
}

/// Window-system notifications delivered to the controller. The windowing
/// glue enqueues these from wherever it runs; the controller drains them
/// synchronously at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Resize { width: u32, height: u32 },
    CloseRequested,
    Key(KeyEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerState {
    Uninitialized,
    Initialized,
    Destroyed,
}

/// Owner of the render loop: one surface, one frame source, one renderer.
///
/// Lifecycle is `initialize` once, then `poll_data` + `render_frame` per
/// loop iteration, then `destroy`. Every method must be called from the
/// single render thread; the surface is not thread-safe and the type is
/// deliberately not `Send`.
pub struct Controller {
    state: ControllerState,
    surface: Box<dyn Surface>,
    source: Box<dyn FrameSource>,
    renderer: Option<Box<dyn Renderable>>,
    beat: Option<Box<dyn BeatDetector>>,
    events: VecDeque<ControlEvent>,
    width: u32,
    height: u32,
    title: String,
    fresh_data: bool,
    closed: bool,
    on_close: Option<Box<dyn FnMut()>>,
    on_key: Option<Box<dyn FnMut(KeyEvent)>>,
}

impl Controller {
    /// Creates a controller over the given surface with no player
    /// attached: reads go to a [`NullSource`] until one is set.
    pub fn new(surface: Box<dyn Surface>, width: u32, height: u32, title: impl Into<String>) -> Self {
        Self {
            state: ControllerState::Uninitialized,
            surface,
            source: Box::new(NullSource),
            renderer: None,
            beat: None,
            events: VecDeque::new(),
            width,
            height,
            title: title.into(),
            fresh_data: false,
            closed: false,
            on_close: None,
            on_key: None,
        }
    }

    /// Creates a headless controller, the configuration used by tests and
    /// offline rendering.
    pub fn offscreen(width: u32, height: u32) -> Self {
        Self::new(Box::new(OffscreenSurface::new()), width, height, "WaveScene")
    }

    /// Creates the rendering context and window. Must be called exactly
    /// once, before the first frame.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != ControllerState::Uninitialized {
            return Err(WaveSceneError::InvalidState(
                "controller is already initialized",
            ));
        }

        self.surface.create(self.width, self.height, &self.title)?;
        self.state = ControllerState::Initialized;
        tracing::debug!(width = self.width, height = self.height, "controller initialized");
        Ok(())
    }

    /// Resizes the output and re-applies viewport state.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.state != ControllerState::Initialized {
            return Err(WaveSceneError::InvalidState(
                "resize requires an initialized controller",
            ));
        }

        if width < 1 || height < 1 {
            return Err(WaveSceneError::invalid_argument(format!(
                "window dimensions must be at least 1x1, got {width}x{height}"
            )));
        }

        self.width = width;
        self.height = height;
        self.surface.set_viewport(width, height);
        Ok(())
    }

    /// Updates the frame source view, waiting according to `timeout`.
    /// Fresh data is remembered so the next [`Controller::render_frame`]
    /// knows whether to invoke the renderer.
    pub fn poll_data(&mut self, timeout: PollTimeout) -> Result<bool> {
        let updated = self.source.poll(timeout)?;
        if updated {
            self.fresh_data = true;
        }
        Ok(updated)
    }

    /// Renders one frame.
    ///
    /// Pending window events are drained synchronously first. The
    /// renderer runs only when fresh data arrived since the last frame;
    /// otherwise the frame is cleared without re-rendering the same data
    /// twice.
    pub fn render_frame(&mut self) -> Result<()> {
        if self.state != ControllerState::Initialized {
            return Err(WaveSceneError::InvalidState(
                "render_frame requires an initialized controller",
            ));
        }

        self.drain_events()?;

        self.surface.clear();

        if self.fresh_data {
            self.fresh_data = false;
            if let Some(mut renderer) = self.renderer.take() {
                let outcome = renderer.render(self);
                self.renderer = Some(renderer);
                outcome?;
            }
        }

        self.surface.present();
        Ok(())
    }

    /// Releases the context. Subsequent frame or resize calls fail with
    /// an invalid-state error.
    pub fn destroy(&mut self) -> Result<()> {
        if self.state != ControllerState::Initialized {
            return Err(WaveSceneError::InvalidState(
                "destroy requires an initialized controller",
            ));
        }

        self.surface.destroy();
        self.state = ControllerState::Destroyed;
        tracing::debug!("controller destroyed");
        Ok(())
    }

    /// Enqueues a window-system event for the next frame.
    pub fn push_event(&mut self, event: ControlEvent) {
        self.events.push_back(event);
    }

    fn drain_events(&mut self) -> Result<()> {
        while let Some(event) = self.events.pop_front() {
            match event {
                ControlEvent::Resize { width, height } => self.resize(width, height)?,
                ControlEvent::CloseRequested => {
                    self.closed = true;
                    if let Some(handler) = &mut self.on_close {
                        handler();
                    }
                }
                ControlEvent::Key(key) => {
                    if let Some(handler) = &mut self.on_key {
                        handler(key);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// True once a close request has been observed. The window does not
    /// close itself; the consumer loop is expected to check this flag.
    pub fn closed(&self) -> bool {
        self.closed
    }

    pub fn frame_source(&self) -> &dyn FrameSource {
        self.source.as_ref()
    }

    pub fn set_frame_source(&mut self, source: Box<dyn FrameSource>) {
        self.source = source;
    }

    pub fn renderer(&self) -> Option<&dyn Renderable> {
        self.renderer.as_deref()
    }

    pub fn set_renderer(&mut self, renderer: Option<Box<dyn Renderable>>) {
        self.renderer = renderer;
    }

    /// True if the attached beat detector reports a beat on the current
    /// frame; false when none is attached.
    pub fn is_beat(&self) -> bool {
        self.beat.as_ref().map(|b| b.is_beat()).unwrap_or(false)
    }

    pub fn set_beat_detector(&mut self, detector: Option<Box<dyn BeatDetector>>) {
        self.beat = detector;
    }

    pub fn set_close_handler(&mut self, handler: impl FnMut() + 'static) {
        self.on_close = Some(Box::new(handler));
    }

    pub fn set_key_handler(&mut self, handler: impl FnMut(KeyEvent) + 'static) {
        self.on_key = Some(Box::new(handler));
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.state == ControllerState::Initialized {
            self.surface.destroy();
            self.state = ControllerState::Destroyed;
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("closed", &self.closed)
            .field("pending_events", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingRenderer {
        frames: Rc<Cell<u32>>,
    }

    impl Renderable for CountingRenderer {
        fn render(&mut self, _controller: &mut Controller) -> Result<()> {
            self.frames.set(self.frames.get() + 1);
            Ok(())
        }
    }

    fn initialized_controller() -> Controller {
        let mut controller = Controller::offscreen(800, 600);
        controller.initialize().unwrap();
        controller
    }

    #[test]
    fn render_before_initialize_is_rejected() {
        let mut controller = Controller::offscreen(800, 600);

        assert!(matches!(
            controller.render_frame(),
            Err(WaveSceneError::InvalidState(_))
        ));
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let mut controller = initialized_controller();

        assert!(matches!(
            controller.initialize(),
            Err(WaveSceneError::InvalidState(_))
        ));
    }

    #[test]
    fn render_after_destroy_is_rejected() {
        let mut controller = initialized_controller();
        controller.destroy().unwrap();

        assert!(matches!(
            controller.render_frame(),
            Err(WaveSceneError::InvalidState(_))
        ));
    }

    #[test]
    fn resize_rejects_degenerate_dimensions() {
        let mut controller = initialized_controller();

        assert!(matches!(
            controller.resize(0, 600),
            Err(WaveSceneError::InvalidArgument(_))
        ));
        assert!(matches!(
            controller.resize(800, 0),
            Err(WaveSceneError::InvalidArgument(_))
        ));
        // State is unchanged on error.
        assert_eq!(controller.width(), 800);
        assert_eq!(controller.height(), 600);
    }

    #[test]
    fn resize_events_apply_before_rendering() {
        let mut controller = initialized_controller();
        controller.push_event(ControlEvent::Resize {
            width: 1024,
            height: 768,
        });

        controller.render_frame().unwrap();

        assert_eq!(controller.width(), 1024);
        assert_eq!(controller.height(), 768);
    }

    #[test]
    fn close_request_sets_flag_and_fires_handler() {
        let mut controller = initialized_controller();
        let observed = Rc::new(Cell::new(false));
        let seen = Rc::clone(&observed);
        controller.set_close_handler(move || seen.set(true));

        controller.push_event(ControlEvent::CloseRequested);
        controller.render_frame().unwrap();

        assert!(controller.closed());
        assert!(observed.get());
    }

    #[test]
    fn key_events_reach_the_handler() {
        let mut controller = initialized_controller();
        let last_code = Rc::new(Cell::new(0_u32));
        let seen = Rc::clone(&last_code);
        controller.set_key_handler(move |key| {
            if key.pressed {
                seen.set(key.code);
            }
        });

        controller.push_event(ControlEvent::Key(KeyEvent {
            pressed: true,
            code: 32,
        }));
        controller.render_frame().unwrap();

        assert_eq!(last_code.get(), 32);
    }

    #[test]
    fn renderer_runs_only_on_fresh_data() {
        let mut controller = initialized_controller();
        let frames = Rc::new(Cell::new(0_u32));
        controller.set_renderer(Some(Box::new(CountingRenderer {
            frames: Rc::clone(&frames),
        })));

        // NullSource: a waiting poll reports fresh data, a probe does not.
        controller.poll_data(PollTimeout::Forever).unwrap();
        controller.render_frame().unwrap();
        assert_eq!(frames.get(), 1);

        controller.poll_data(PollTimeout::NonBlocking).unwrap();
        controller.render_frame().unwrap();
        assert_eq!(frames.get(), 1, "stale data must not re-render");
    }

    #[test]
    fn is_beat_defaults_to_false() {
        let controller = Controller::offscreen(10, 10);
        assert!(!controller.is_beat());
    }
}
