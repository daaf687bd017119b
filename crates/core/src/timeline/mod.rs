use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::render::{BeatDetector, Controller, Renderable};
use crate::{Result, WaveSceneError};

/// Shared beat flag.
///
/// Scene and event callbacks set it; the controller's beat detector (and
/// any effect that consults it) reads it. Cloning yields another handle
/// to the same flag.
#[derive(Debug, Clone, Default)]
pub struct BeatFlag(Arc<AtomicBool>);

impl BeatFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_beat(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl BeatDetector for BeatFlag {
    fn is_beat(&self) -> bool {
        BeatFlag::is_beat(self)
    }
}

/// Everything a timeline callback may touch: the controller driving the
/// frame and the program's beat flag.
pub struct SceneContext<'a> {
    pub controller: &'a mut Controller,
    pub beat: &'a BeatFlag,
}

/// Signature of scene and event callbacks.
pub type TimedCallback = Box<dyn FnMut(&mut SceneContext<'_>)>;

/// Whether a timeline entry fires once or stays active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Remains "active" and is re-invoked every frame until superseded by
    /// the next scene.
    Scene,
    /// Invoked exactly once when crossed going forward.
    Event,
}

/// One entry in the timeline.
pub struct TimedEvent {
    time: f64,
    kind: EventKind,
    callback: TimedCallback,
}

impl TimedEvent {
    /// Creates an entry at `time` fractional seconds. Negative or
    /// non-finite times are rejected.
    pub fn new(
        time: f64,
        kind: EventKind,
        callback: impl FnMut(&mut SceneContext<'_>) + 'static,
    ) -> Result<Self> {
        if !time.is_finite() || time < 0.0 {
            return Err(WaveSceneError::Timeline(format!(
                "event time must be a finite value >= 0, got {time}"
            )));
        }

        Ok(Self {
            time,
            kind,
            callback: Box::new(callback),
        })
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl fmt::Debug for TimedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedEvent")
            .field("time", &self.time)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Registration API for building a [`Timeline`].
///
/// Entries with equal times keep their declaration order: the sort is
/// stable, and later additions at an existing time run after the
/// originals.
#[derive(Default)]
pub struct TimelineBuilder {
    entries: Vec<(f64, EventKind, TimedCallback)>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a scene active from `time` until the next scene.
    pub fn scene(mut self, time: f64, callback: impl FnMut(&mut SceneContext<'_>) + 'static) -> Self {
        self.entries.push((time, EventKind::Scene, Box::new(callback)));
        self
    }

    /// Declares a one-shot event at `time`.
    pub fn event(mut self, time: f64, callback: impl FnMut(&mut SceneContext<'_>) + 'static) -> Self {
        self.entries.push((time, EventKind::Event, Box::new(callback)));
        self
    }

    /// Validates every declaration and produces the sorted timeline.
    /// Fails fast on the first invalid time; nothing is silently dropped.
    pub fn build(self) -> Result<Timeline> {
        let mut events = Vec::with_capacity(self.entries.len());
        for (time, kind, callback) in self.entries {
            events.push(TimedEvent::new(time, kind, callback)?);
        }
        Ok(Timeline::from_events(events))
    }
}

/// Sorted list of timed callbacks advanced by song position.
///
/// The cursor tracks the entry the position last crossed. Moving forward
/// fires `Event`s exactly once and latches the most recent `Scene`;
/// moving backward past the current entry (seek or rewind) resets the
/// cursor so the earlier part of the timeline replays.
pub struct Timeline {
    events: Vec<TimedEvent>,
    current_index: Option<usize>,
    current_scene: Option<usize>,
}

impl Timeline {
    fn from_events(mut events: Vec<TimedEvent>) -> Self {
        // Stable sort: declaration order breaks ties.
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            events,
            current_index: None,
            current_scene: None,
        }
    }

    /// Inserts one entry, keeping the timeline sorted.
    ///
    /// The cursor is reset, so one-shot events at or before the current
    /// song position fire again on the next advance, exactly as they
    /// would after a seek to the same position.
    pub fn add_event(&mut self, event: TimedEvent) {
        self.events.push(event);
        self.events.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.current_index = None;
        self.current_scene = None;
    }

    /// Inserts several entries at once; one sort instead of many.
    pub fn add_events(&mut self, events: impl IntoIterator<Item = TimedEvent>) {
        self.events.extend(events);
        self.events.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.current_index = None;
        self.current_scene = None;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_active_scene(&self) -> bool {
        self.current_scene.is_some()
    }

    /// Synchronizes the cursor with `position`, firing crossed one-shot
    /// events and latching the newest scene.
    pub fn advance(&mut self, position: f64, cx: &mut SceneContext<'_>) {
        if let Some(index) = self.current_index {
            if self.events[index].time > position {
                tracing::trace!(position, "song position moved backward, rewinding timeline");
                self.current_index = None;
                self.current_scene = None;
            }
        }

        loop {
            let next = self.current_index.map_or(0, |index| index + 1);
            if next >= self.events.len() || self.events[next].time > position {
                break;
            }

            self.current_index = Some(next);
            match self.events[next].kind {
                EventKind::Event => {
                    tracing::trace!(time = self.events[next].time, "firing timeline event");
                    (self.events[next].callback)(cx);
                }
                EventKind::Scene => self.current_scene = Some(next),
            }
        }
    }

    /// Invokes the active scene, if any. Called by the owner once per
    /// frame after [`Timeline::advance`]; the scheduler itself never
    /// invokes scenes.
    pub fn run_scene(&mut self, cx: &mut SceneContext<'_>) {
        if let Some(index) = self.current_scene {
            (self.events[index].callback)(cx);
        }
    }
}

impl fmt::Debug for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeline")
            .field("events", &self.events.len())
            .field("current_index", &self.current_index)
            .field("current_scene", &self.current_scene)
            .finish()
    }
}

/// A renderable that drives a [`Timeline`] from the song position.
///
/// Per frame: the beat flag is reset (unless configured otherwise), the
/// optional frame hook runs, the timeline advances to the current song
/// position, and the active scene executes. A source with no current
/// slice yet makes the frame a no-op rather than an error.
pub struct TimedProgram {
    timeline: Timeline,
    beat: BeatFlag,
    reset_beat: bool,
    on_frame: Option<TimedCallback>,
}

impl TimedProgram {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            beat: BeatFlag::new(),
            reset_beat: true,
            on_frame: None,
        }
    }

    /// Another handle to this program's beat flag, e.g. to install as the
    /// controller's beat detector.
    pub fn beat_flag(&self) -> BeatFlag {
        self.beat.clone()
    }

    /// Controls whether the beat flag resets at the start of every frame.
    /// Defaults to true.
    pub fn set_reset_beat(&mut self, reset: bool) {
        self.reset_beat = reset;
    }

    /// Installs a hook that runs every frame before timeline processing,
    /// for per-frame work shared by all scenes.
    pub fn set_frame_hook(&mut self, hook: impl FnMut(&mut SceneContext<'_>) + 'static) {
        self.on_frame = Some(Box::new(hook));
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }
}

impl Renderable for TimedProgram {
    fn render(&mut self, controller: &mut Controller) -> Result<()> {
        let TimedProgram {
            timeline,
            beat,
            reset_beat,
            on_frame,
        } = self;

        if *reset_beat {
            beat.clear();
        }

        let mut cx = SceneContext { controller, beat };

        if let Some(hook) = on_frame {
            hook(&mut cx);
        }

        let position = match cx.controller.frame_source().position() {
            Ok(position) => position,
            Err(WaveSceneError::NoCurrentSlice) => return Ok(()),
            Err(other) => return Err(other),
        };

        timeline.advance(position, &mut cx);
        timeline.run_scene(&mut cx);
        Ok(())
    }
}

impl BeatDetector for TimedProgram {
    fn is_beat(&self) -> bool {
        self.beat.is_beat()
    }
}

impl fmt::Debug for TimedProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedProgram")
            .field("timeline", &self.timeline)
            .field("reset_beat", &self.reset_beat)
            .field("is_beat", &self.beat.is_beat())
            .finish()
    }
}
